use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Top-level client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cooldowns: CooldownConfig,
    #[serde(default)]
    pub timers: TimerConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub limits: LimitConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            cooldowns: CooldownConfig::default(),
            timers: TimerConfig::default(),
            verification: VerificationConfig::default(),
            limits: LimitConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL for the REST handshake, e.g. `https://api.example.com`.
    pub base_url: String,
    /// Base URL for the websocket, e.g. `wss://api.example.com`.
    pub ws_base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.ruckge.com".into(),
            ws_base_url: "wss://api.ruckge.com".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownConfig {
    /// Seconds before the same target handle may be contacted again.
    #[serde(default = "default_notification_secs")]
    pub notification_secs: u64,
    /// Seconds before the trade button for the same order re-arms.
    #[serde(default = "default_trade_button_secs")]
    pub trade_button_secs: u64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            notification_secs: default_notification_secs(),
            trade_button_secs: default_trade_button_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerConfig {
    #[serde(default = "default_reconnect_secs")]
    pub reconnect_secs: u64,
    #[serde(default = "default_location_secs")]
    pub location_secs: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            reconnect_secs: default_reconnect_secs(),
            location_secs: default_location_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Item id of the fungible currency used to settle the price side.
    #[serde(default = "default_currency_item_id")]
    pub currency_item_id: i32,
    /// Whether a seller offer of {item, currency} (giving change)
    /// still counts as correct.
    #[serde(default)]
    pub allow_combined_offer: bool,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            currency_item_id: default_currency_item_id(),
            allow_combined_offer: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitConfig {
    /// Maximum accepted per-item price on locally created orders.
    #[serde(default = "default_max_price_per_item")]
    pub max_price_per_item: i64,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            max_price_per_item: default_max_price_per_item(),
        }
    }
}

fn default_notification_secs() -> u64 {
    60
}

fn default_trade_button_secs() -> u64 {
    5
}

fn default_reconnect_secs() -> u64 {
    15
}

fn default_location_secs() -> u64 {
    2
}

fn default_currency_item_id() -> i32 {
    995
}

fn default_max_price_per_item() -> i64 {
    i32::MAX as i64
}

impl SessionConfig {
    /// Load configuration from a YAML file and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config: SessionConfig = serde_yaml::from_str(&contents)?;
        config.validate()?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.base_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "server.base_url must not be empty".into(),
            ));
        }
        if self.server.ws_base_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "server.ws_base_url must not be empty".into(),
            ));
        }
        if self.timers.reconnect_secs == 0 || self.timers.location_secs == 0 {
            return Err(ConfigError::ValidationError(
                "timer intervals must be positive".into(),
            ));
        }
        if self.limits.max_price_per_item <= 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_price_per_item must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_values() {
        let config = SessionConfig::default();
        assert_eq!(config.cooldowns.notification_secs, 60);
        assert_eq!(config.cooldowns.trade_button_secs, 5);
        assert_eq!(config.timers.reconnect_secs, 15);
        assert_eq!(config.timers.location_secs, 2);
        assert_eq!(config.verification.currency_item_id, 995);
        assert!(!config.verification.allow_combined_offer);
        config.validate().unwrap();
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let config: SessionConfig = serde_yaml::from_str(
            "server:\n  base_url: https://example.test\n  ws_base_url: wss://example.test\nverification:\n  allow_combined_offer: true\n",
        )
        .unwrap();
        assert!(config.verification.allow_combined_offer);
        assert_eq!(config.cooldowns.notification_secs, 60);
        assert_eq!(config.server.base_url, "https://example.test");
    }

    #[test]
    fn zero_timer_rejected() {
        let mut config = SessionConfig::default();
        config.timers.reconnect_secs = 0;
        assert!(config.validate().is_err());
    }
}
