//! Server configuration read from the environment.

use std::net::SocketAddr;

use anyhow::{anyhow, Context};
use sheetsync_core::sync::{
    DuplicateKeyPolicy, RetrosyncConfig, RETROSYNC_DEFAULT_INTERVAL_SECS, SHEET_MAX_BATCH_SIZE,
};

const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8088";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub db_api_url: String,
    pub db_api_token: Option<String>,
    pub data_dir: String,
    pub listen_addr: SocketAddr,
    pub retrosync: RetrosyncConfig,
    /// Zero disables the background loop.
    pub retrosync_interval_secs: u64,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let db_api_url = var("SHEETSYNC_DB_API_URL")
            .map(|v| v.trim_end_matches('/').to_string())
            .ok_or_else(|| anyhow!("SHEETSYNC_DB_API_URL must be set"))?;

        let listen_addr = var("SHEETSYNC_LISTEN_ADDR")
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string())
            .parse()
            .context("SHEETSYNC_LISTEN_ADDR is not a socket address")?;

        let batch_size = match var("SHEETSYNC_BATCH_SIZE") {
            Some(raw) => raw
                .parse::<usize>()
                .context("SHEETSYNC_BATCH_SIZE is not a number")?,
            None => SHEET_MAX_BATCH_SIZE,
        };

        let retrosync_interval_secs = match var("SHEETSYNC_RETROSYNC_INTERVAL_SECS") {
            Some(raw) => raw
                .parse()
                .context("SHEETSYNC_RETROSYNC_INTERVAL_SECS is not a number")?,
            None => RETROSYNC_DEFAULT_INTERVAL_SECS,
        };

        let strict_natural_keys = var("SHEETSYNC_STRICT_NATURAL_KEYS")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false);
        let duplicate_keys = if strict_natural_keys {
            DuplicateKeyPolicy::Reject
        } else {
            DuplicateKeyPolicy::LastWins
        };
        let retrosync = RetrosyncConfig::new(batch_size, duplicate_keys)
            .context("SHEETSYNC_BATCH_SIZE is out of range")?;

        Ok(Self {
            db_api_url,
            db_api_token: var("SHEETSYNC_DB_API_TOKEN"),
            data_dir: var("SHEETSYNC_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
            listen_addr,
            retrosync,
            retrosync_interval_secs,
        })
    }
}
