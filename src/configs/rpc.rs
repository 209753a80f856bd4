use serde::{Deserialize, Serialize};

/// Bot-side connection to the relay hub.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RpcClientConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_url")]
    pub url: String,
    /// Require viewer tokens on forwarded updates.
    #[serde(default)]
    pub auth_enabled: bool,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_url(),
            auth_enabled: false,
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

fn default_url() -> String {
    "ws://127.0.0.1:8080/ws".to_string()
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_backoff_max_ms() -> u64 {
    60_000
}
