use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PlayerConfig {
    /// How long a player may sit in a voice channel without listeners.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_idle_check_interval_secs")]
    pub idle_check_interval_secs: u64,
    /// Poll interval while waiting for the platform to confirm a voice join.
    #[serde(default = "default_voice_poll_interval_ms")]
    pub voice_poll_interval_ms: u64,
    /// Overall deadline for the voice confirmation poll. Unset waits forever.
    #[serde(default)]
    pub voice_confirm_timeout_ms: Option<u64>,
    /// Messages scanned when the stored controller message id is stale.
    #[serde(default = "default_history_lookback")]
    pub history_lookback: usize,
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            idle_check_interval_secs: default_idle_check_interval_secs(),
            voice_poll_interval_ms: default_voice_poll_interval_ms(),
            voice_confirm_timeout_ms: None,
            history_lookback: default_history_lookback(),
            max_history: default_max_history(),
        }
    }
}

fn default_idle_timeout_secs() -> u64 {
    180
}

fn default_idle_check_interval_secs() -> u64 {
    15
}

fn default_voice_poll_interval_ms() -> u64 {
    1_000
}

fn default_history_lookback() -> usize {
    20
}

fn default_max_history() -> usize {
    20
}
