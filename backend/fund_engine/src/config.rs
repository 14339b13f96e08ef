//! Application configuration loaded from environment variables.

use std::path::PathBuf;

use crate::errors::{FundError, Result};
use crate::money::Percentage;
use crate::split::Percentages;

#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database URL (e.g. `sqlite:./fund_engine.db`)
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// Upper bound of the SQLite connection pool
    pub db_max_connections: u32,
    /// Split applied to new allocations that do not name their own
    pub default_percentages: Percentages,
    /// Whether an advance must be approved before it can be settled
    pub require_advance_approval: bool,
    /// Optional JSON file of display names used by read-side views
    pub directory_file: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup.  `from_env` passes the
    /// process environment; tests pass a map.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let percentage = |key: &str, default: &str| -> Result<Percentage> {
            var(key, default)
                .trim()
                .parse()
                .map_err(|e| FundError::Config(format!("Invalid {key}: {e}")))
        };
        let default_percentages = Percentages::new(
            percentage("DEFAULT_TEAM_PERCENTAGE", "70.00")?,
            percentage("DEFAULT_MENTOR_PERCENTAGE", "20.00")?,
            percentage("DEFAULT_LAB_PERCENTAGE", "10.00")?,
        )
        .map_err(|e| FundError::Config(format!("Invalid default split: {e}")))?;

        Ok(Config {
            database_url: var("DATABASE_URL", "sqlite:./fund_engine.db"),
            api_port: var("API_PORT", "3002")
                .parse()
                .map_err(|_| FundError::Config("Invalid API_PORT".to_string()))?,
            db_max_connections: var("DB_MAX_CONNECTIONS", "5")
                .parse()
                .map_err(|_| FundError::Config("Invalid DB_MAX_CONNECTIONS".to_string()))?,
            default_percentages,
            require_advance_approval: parse_bool(&var("REQUIRE_ADVANCE_APPROVAL", "false"))
                .ok_or_else(|| {
                    FundError::Config("Invalid REQUIRE_ADVANCE_APPROVAL".to_string())
                })?,
            directory_file: lookup("DIRECTORY_FILE")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
        })
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
