use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use tunewatch_core::{group_thousands, DateRange};
use tunewatch_sync::config::timezone_from_env;

#[derive(Debug, Parser)]
#[command(name = "tunewatch")]
#[command(about = "Weekly AI-music engagement report for Twitter/X and Reddit")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch, assemble and save the weekly report.
    Run,
    /// Fetch and assemble, print the report, save nothing.
    Preview,
    /// Print the reporting window for the current date.
    Window,
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tunewatch=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_target(false))
        .init();
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    if let Err(err) = dispatch(cli.command.unwrap_or(Commands::Run)).await {
        error!("error generating report: {err:#}");
        std::process::exit(1);
    }
}

async fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Run => {
            info!("starting AI music weekly report generation");
            let summary = tunewatch_sync::run_report_once_from_env().await?;
            info!("weekly report generated and saved");

            println!("\n=== REPORT SUMMARY ===");
            println!("Week: {} ({})", summary.week_label, summary.window_label);
            println!(
                "Twitter Max Engagement: {}",
                group_thousands(summary.max_score_twitter)
            );
            println!(
                "Reddit Max Engagement: {}",
                group_thousands(summary.max_score_reddit)
            );
            println!(
                "Saved to: {} ({})",
                summary.destination,
                summary.record_id.as_deref().unwrap_or("no record id returned")
            );
            println!("Report sha256: {}", summary.report_sha256);
            println!("Generated at: {}", summary.generated_at);
        }
        Commands::Preview => {
            let draft = tunewatch_sync::preview_report_from_env().await?;
            println!("{}", draft.report.text_content);
        }
        Commands::Window => {
            let range = DateRange::resolve(Utc::now(), timezone_from_env()?);
            println!(
                "{} -> {} ({}, {})",
                range.start_date,
                range.end_date,
                range.week_label(),
                range.display_label
            );
        }
    }

    Ok(())
}
