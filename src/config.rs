use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

const DEFAULT_SESSION_FILE: &str = ".incident-desk-session";
const DEFAULT_DEBOUNCE_MS: u64 = 300;
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database_url: String,
    pub session_file: PathBuf,
    pub debounce: Duration,
    pub max_connections: u32,
}

impl Config {
    /// Environment settings, with values given on the command line winning.
    pub fn from_env_with(overrides: &HashMap<&str, String>) -> anyhow::Result<Self> {
        Self::from_lookup(|key| overrides.get(key).cloned().or_else(|| env::var(key).ok()))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup("DATABASE_URL")
            .context("DATABASE_URL must be set to the incident reporting Postgres instance")?;

        let session_file = lookup("INCIDENT_DESK_SESSION_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SESSION_FILE));

        let debounce_ms = match lookup("INCIDENT_DESK_DEBOUNCE_MS") {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("INCIDENT_DESK_DEBOUNCE_MS is not a number: {raw}"))?,
            None => DEFAULT_DEBOUNCE_MS,
        };

        let max_connections = match lookup("INCIDENT_DESK_MAX_CONNECTIONS") {
            Some(raw) => raw
                .parse::<u32>()
                .with_context(|| format!("INCIDENT_DESK_MAX_CONNECTIONS is not a number: {raw}"))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        Ok(Self {
            database_url,
            session_file,
            debounce: Duration::from_millis(debounce_ms),
            max_connections,
        })
    }
}
