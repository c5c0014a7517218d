//! Run configuration, read once at startup and passed down by value.

use std::fmt;

use chrono_tz::Tz;
use thiserror::Error;
use tunewatch_adapters::DEFAULT_QUERY;
use tunewatch_core::{parse_timezone, InvalidTimezone};
use tunewatch_storage::DEFAULT_BASE_URL;

pub const ENV_API_KEY: &str = "COMPOSIO_API_KEY";
pub const ENV_DESTINATION: &str = "REPORT_DESTINATION";
pub const ENV_NOTION_DATABASE_ID: &str = "NOTION_DATABASE_ID";
pub const ENV_SHEETS_ID: &str = "GOOGLE_SHEETS_ID";
pub const ENV_SHEETS_RANGE: &str = "GOOGLE_SHEETS_RANGE";
pub const ENV_BASE_URL: &str = "COMPOSIO_BASE_URL";
pub const ENV_TIMEZONE: &str = "REPORT_TIMEZONE";
pub const ENV_QUERY: &str = "REPORT_QUERY";
pub const ENV_HTTP_TIMEOUT_SECS: &str = "TUNEWATCH_HTTP_TIMEOUT_SECS";
pub const ENV_USER_AGENT: &str = "TUNEWATCH_USER_AGENT";
pub const ENV_PERSIST_RETRIES: &str = "TUNEWATCH_PERSIST_RETRIES";

pub const DEFAULT_TIMEZONE: &str = "Asia/Shanghai";
pub const DEFAULT_SHEETS_RANGE: &str = "Sheet1!A1";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {message}")]
    Invalid { name: &'static str, message: String },
    #[error(transparent)]
    Timezone(#[from] InvalidTimezone),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Notion { database_id: String },
    Sheets { spreadsheet_id: String, range: String },
}

/// Which settings a command cannot run without.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Fetch, assemble and persist.
    Full,
    /// Fetch and assemble only; the destination may be absent.
    CredentialOnly,
}

#[derive(Clone)]
pub struct RunConfig {
    pub api_key: String,
    pub destination: Option<Destination>,
    pub base_url: String,
    pub timezone: Tz,
    pub query: String,
    pub http_timeout_secs: u64,
    pub user_agent: String,
    pub persist_retries: usize,
}

impl fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("api_key", &"<redacted>")
            .field("destination", &self.destination)
            .field("base_url", &self.base_url)
            .field("timezone", &self.timezone)
            .field("query", &self.query)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("user_agent", &self.user_agent)
            .field("persist_retries", &self.persist_retries)
            .finish()
    }
}

impl RunConfig {
    pub fn from_env(requirement: Requirement) -> Result<Self, ConfigError> {
        Self::from_lookup(requirement, |key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(requirement: Requirement, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = get(ENV_API_KEY).ok_or(ConfigError::Missing(ENV_API_KEY))?;

        let destination = match get(ENV_DESTINATION)
            .unwrap_or_else(|| "notion".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "notion" => get(ENV_NOTION_DATABASE_ID)
                .map(|database_id| Destination::Notion { database_id })
                .ok_or(ConfigError::Missing(ENV_NOTION_DATABASE_ID)),
            "sheets" | "google_sheets" | "googlesheets" => get(ENV_SHEETS_ID)
                .map(|spreadsheet_id| Destination::Sheets {
                    spreadsheet_id,
                    range: get(ENV_SHEETS_RANGE).unwrap_or_else(|| DEFAULT_SHEETS_RANGE.to_string()),
                })
                .ok_or(ConfigError::Missing(ENV_SHEETS_ID)),
            other => Err(ConfigError::Invalid {
                name: ENV_DESTINATION,
                message: format!("expected `notion` or `sheets`, got `{other}`"),
            }),
        };
        let destination = match (requirement, destination) {
            (_, Ok(destination)) => Some(destination),
            (Requirement::CredentialOnly, Err(ConfigError::Missing(_))) => None,
            (_, Err(err)) => return Err(err),
        };

        let timezone = timezone_from_lookup(&lookup)?;

        Ok(Self {
            api_key,
            destination,
            base_url: get(ENV_BASE_URL).unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            timezone,
            query: get(ENV_QUERY).unwrap_or_else(|| DEFAULT_QUERY.to_string()),
            http_timeout_secs: parse_number(&get, ENV_HTTP_TIMEOUT_SECS, 30)?,
            user_agent: get(ENV_USER_AGENT)
                .unwrap_or_else(|| format!("tunewatch/{}", env!("CARGO_PKG_VERSION"))),
            persist_retries: parse_number(&get, ENV_PERSIST_RETRIES, 0)?,
        })
    }
}

/// The reporting timezone alone, for commands that need nothing else.
pub fn timezone_from_env() -> Result<Tz, ConfigError> {
    timezone_from_lookup(&|key: &str| std::env::var(key).ok())
}

pub fn timezone_from_lookup<F>(lookup: &F) -> Result<Tz, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let name = lookup(ENV_TIMEZONE)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
    Ok(parse_timezone(&name)?)
}

fn parse_number<G, T>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match get(name) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            message: format!("`{raw}`: {e}"),
        }),
    }
}
