use thiserror::Error;
use tracing_subscriber::EnvFilter;

use super::slack::DEFAULT_API_URL;

pub const DEFAULT_COST_EXPLORER_ENDPOINT: &str = "https://ce.us-east-1.amazonaws.com/";
pub const DEFAULT_ORGANIZATIONS_ENDPOINT: &str = "https://organizations.us-east-1.amazonaws.com/";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub slack_token: String,
    pub slack_channel: String,
    pub slack_api_url: String,
    pub cost_explorer_endpoint: String,
    pub organizations_endpoint: String,
    /// SQLite file for the idempotency store; `None` disables it.
    pub database_path: Option<String>,
    pub no_error_report: bool,
    pub font_path: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Reads the process environment, honouring a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| dotenvy::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let slack_token = get("SLACK_TOKEN")
            .or_else(|| get("SLACK_BOT_TOKEN"))
            .ok_or(ConfigError::Missing("SLACK_TOKEN"))?;
        let slack_channel = get("SLACK_CHANNEL").ok_or(ConfigError::Missing("SLACK_CHANNEL"))?;

        let no_error_report = match get("NO_ERROR_REPORT") {
            Some(value) => parse_bool(&value).ok_or(ConfigError::Invalid {
                key: "NO_ERROR_REPORT",
                value,
            })?,
            None => false,
        };

        Ok(Config {
            slack_token,
            slack_channel,
            slack_api_url: get("SLACK_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            cost_explorer_endpoint: get("COST_EXPLORER_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_COST_EXPLORER_ENDPOINT.to_string()),
            organizations_endpoint: get("ORGANIZATIONS_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_ORGANIZATIONS_ENDPOINT.to_string()),
            database_path: get("DATABASE_PATH"),
            no_error_report,
            font_path: get("FONT_PATH"),
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// The filter for `LOG_LEVEL`, falling back to `info` when it does not parse.
    pub fn log_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.log_level).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}
