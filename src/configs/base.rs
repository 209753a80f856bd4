use serde::{Deserialize, Serialize};

use crate::common::types::AnyResult;
use crate::configs::*;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub rpc: RpcClientConfig,
    pub logging: Option<LoggingConfig>,
}

impl Config {
    pub fn load() -> AnyResult<Self> {
        let config_path = if std::path::Path::new("config.toml").exists() {
            "config.toml"
        } else if std::path::Path::new("config.default.toml").exists() {
            "config.default.toml"
        } else {
            return Err("config.toml or config.default.toml not found".into());
        };

        crate::log_println!("Loading configuration from: {}", config_path);

        let config_str = std::fs::read_to_string(config_path)?;
        Self::from_toml(&config_str).map_err(|e| format!("{}: {}", config_path, e).into())
    }

    pub fn from_toml(config_str: &str) -> AnyResult<Self> {
        if config_str.trim().is_empty() {
            return Err("configuration is empty".into());
        }
        let config: Config = toml::from_str(config_str)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_is_rejected() {
        assert!(Config::from_toml("  \n").is_err());
    }

    #[test]
    fn sections_fall_back_to_defaults() {
        let config = Config::from_toml(
            r#"
            [relay]
            port = 9000

            [storage.remote]
            url = "https://docs.internal:8443"
            database = "pool"
            "#,
        )
        .unwrap();

        assert_eq!(config.relay.port, 9000);
        assert_eq!(config.relay.host, "0.0.0.0");
        assert_eq!(config.storage.local_save_interval_secs, 30);
        let remote = config.storage.remote.unwrap();
        assert_eq!(remote.database, "pool");
        assert!(remote.token.is_none());
        assert!(config.player.voice_confirm_timeout_ms.is_none());
        assert!(!config.rpc.enabled);
    }
}
