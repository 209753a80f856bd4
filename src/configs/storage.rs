use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    /// Root directory of the local file backend. One sub-directory per bot identity.
    #[serde(default = "default_sessions_dir")]
    pub sessions_dir: String,
    #[serde(default = "default_local_save_interval_secs")]
    pub local_save_interval_secs: u64,
    #[serde(default = "default_remote_save_interval_secs")]
    pub remote_save_interval_secs: u64,
    /// Unrecoverable snapshots younger than this are kept for the next start.
    #[serde(default = "default_grace_window_hours")]
    pub grace_window_hours: u64,
    #[serde(default)]
    pub remote: Option<RemoteStoreConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RemoteStoreConfig {
    pub url: String,
    pub database: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_remote_timeout_ms")]
    pub timeout_ms: u64,
}

impl StorageConfig {
    pub fn grace_window_ms(&self) -> u64 {
        self.grace_window_hours.saturating_mul(3_600_000)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sessions_dir: default_sessions_dir(),
            local_save_interval_secs: default_local_save_interval_secs(),
            remote_save_interval_secs: default_remote_save_interval_secs(),
            grace_window_hours: default_grace_window_hours(),
            remote: None,
        }
    }
}

fn default_sessions_dir() -> String {
    "./local_database/player_sessions".to_string()
}

fn default_local_save_interval_secs() -> u64 {
    30
}

fn default_remote_save_interval_secs() -> u64 {
    180
}

fn default_grace_window_hours() -> u64 {
    48
}

fn default_remote_timeout_ms() -> u64 {
    10_000
}
