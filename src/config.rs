//! Runtime configuration.
//!
//! Priority (highest to lowest): CLI flag > environment variable > built-in
//! default. `clap`'s `env` attribute gives us the middle tier for free.

use std::path::PathBuf;

use clap::Parser;

const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/api";
const DEFAULT_BATCH_SIZE: usize = 10;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_DATA_DIR: &str = "./data/tasksync";
const DEFAULT_LOG: &str = "info";

#[derive(Parser, Debug, Clone)]
#[command(name = "tasksyncd", about = "Offline-first task sync engine")]
pub struct SyncConfig {
    /// Maximum items per outbound batch.
    #[arg(long, env = "SYNC_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Base URL for the remote sync server.
    #[arg(long, env = "API_BASE_URL", default_value = DEFAULT_API_BASE_URL)]
    pub api_base_url: String,

    /// Attempts before an item is dead-lettered.
    #[arg(long, env = "MAX_RETRIES", default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    /// Directory holding the local SQLite database.
    #[arg(long, env = "TASKSYNC_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Log level filter, e.g. "info", "debug", "tasksync=trace".
    #[arg(long, env = "TASKSYNC_LOG", default_value = DEFAULT_LOG)]
    pub log: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            log: DEFAULT_LOG.to_string(),
        }
    }
}
