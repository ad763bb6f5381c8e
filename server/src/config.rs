//! Server configuration surface.
//!
//! Loaded from a JSON file (`--config`), with every field defaulting so a
//! bare file or no file at all still yields a runnable server. The action
//! range lives here as the single source of truth; it is broadcast to every
//! client at connection-accept time so the UI clamp can never drift from the
//! value the server validates against.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub max_clients: usize,
    /// 0 means "randomize at startup".
    pub world_seed: i64,
    pub heartbeat_interval_ms: u64,
    pub client_timeout_ms: u64,
    /// Per-client inbound budget within one rate window.
    pub rate_limit_max_messages: u32,
    pub rate_limit_window_ms: u64,
    /// Maximum distance (pixels) of any claimed action from the player's
    /// authoritative position. Boundary inclusive.
    pub max_action_range: f32,
    /// Housekeeping cadence.
    pub tick_interval_ms: u64,
    /// Tree health restored per regeneration pass.
    pub tree_regen_amount: f32,
    /// A tree must sit undamaged this long before it regenerates.
    pub tree_regen_idle_ms: u64,
    /// Planted trees advance one growth stage per this interval.
    pub growth_interval_ms: u64,
    /// Rain zones appear/expire on roughly this cadence.
    pub rain_cycle_ms: u64,
    /// Grid spacing and density for seed-driven initial tree cover.
    pub tree_grid_spacing: f32,
    pub tree_density: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: shared::DEFAULT_PORT,
            max_clients: shared::DEFAULT_MAX_CLIENTS,
            world_seed: 0,
            heartbeat_interval_ms: shared::HEARTBEAT_INTERVAL_MS,
            client_timeout_ms: shared::CLIENT_TIMEOUT_MS,
            rate_limit_max_messages: 120,
            rate_limit_window_ms: 1_000,
            max_action_range: shared::DEFAULT_MAX_ACTION_RANGE,
            tick_interval_ms: 1_000,
            tree_regen_amount: 5.0,
            tree_regen_idle_ms: 30_000,
            growth_interval_ms: 60_000,
            rain_cycle_ms: 45_000,
            tree_grid_spacing: 128.0,
            tree_density: 0.15,
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = ServerConfig::default();
        assert_eq!(config.port, shared::DEFAULT_PORT);
        assert_eq!(config.world_seed, 0);
        assert!(config.client_timeout_ms > config.heartbeat_interval_ms);
        assert!(config.rate_limit_max_messages > 0);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: ServerConfig =
            serde_json::from_str(r#"{"port": 9000, "max_clients": 2}"#).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.max_clients, 2);
        assert_eq!(config.max_action_range, shared::DEFAULT_MAX_ACTION_RANGE);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let result: Result<ServerConfig, _> = serde_json::from_str("{not json");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = ServerConfig::load(Path::new("/nonexistent/wildgrove.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
