//! Server configuration module
//!
//! Handles loading and parsing of server configuration from files and
//! environment variables.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::visibility::range::RangeParameters;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Server name displayed in logs
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// World ID (1-255)
    #[serde(default = "default_world_id")]
    pub world_id: u8,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Maximum connections per IP
    #[serde(default = "default_max_per_ip")]
    pub max_connections_per_ip: u32,

    /// Rollout driver pump interval in milliseconds
    #[serde(default = "default_pump_interval")]
    pub pump_interval_ms: u64,

    /// Visibility range configuration
    #[serde(default)]
    pub visibility: VisibilityConfig,

    /// World grid configuration
    #[serde(default)]
    pub grid: GridConfig,

    /// Development mode flag (boots a simulated population)
    #[serde(default)]
    pub dev_mode: bool,

    /// Enable debug logging
    #[serde(default)]
    pub debug: bool,
}

/// Visibility range configuration
///
/// The radii are validated by type only (non-negative integers); the server
/// applies whatever values are configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisibilityConfig {
    /// Far visibility radius in grid cells
    #[serde(default = "default_radius_far")]
    pub radius_far: u32,

    /// Near visibility radius in grid cells
    #[serde(default = "default_radius_near")]
    pub radius_near: u32,

    /// Window in seconds that range-change rollouts are spread over
    #[serde(default = "default_stagger_secs")]
    pub rollout_stagger_secs: u64,
}

/// World grid configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Grid width in cells
    #[serde(default = "default_grid_width")]
    pub width: u32,

    /// Grid height in cells
    #[serde(default = "default_grid_height")]
    pub height: u32,
}

// Default value functions
fn default_server_name() -> String {
    "Rangecast".to_string()
}

fn default_world_id() -> u8 {
    1
}

fn default_max_connections() -> u32 {
    2000
}

fn default_max_per_ip() -> u32 {
    10
}

fn default_pump_interval() -> u64 {
    100
}

fn default_radius_far() -> u32 {
    8
}

fn default_radius_near() -> u32 {
    4
}

fn default_stagger_secs() -> u64 {
    5
}

fn default_grid_width() -> u32 {
    64
}

fn default_grid_height() -> u32 {
    64
}

impl Default for VisibilityConfig {
    fn default() -> Self {
        Self {
            radius_far: default_radius_far(),
            radius_near: default_radius_near(),
            rollout_stagger_secs: default_stagger_secs(),
        }
    }
}

impl VisibilityConfig {
    /// The configured radii as range parameters
    pub fn parameters(&self) -> RangeParameters {
        RangeParameters::new(self.radius_near, self.radius_far)
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            width: default_grid_width(),
            height: default_grid_height(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config/server.toml"),
            server_name: default_server_name(),
            world_id: default_world_id(),
            max_connections: default_max_connections(),
            max_connections_per_ip: default_max_per_ip(),
            pump_interval_ms: default_pump_interval(),
            visibility: VisibilityConfig::default(),
            grid: GridConfig::default(),
            dev_mode: false,
            debug: false,
        }
    }
}

impl ServerConfig {
    /// Load configuration from file and environment variables
    pub async fn load() -> Result<Self> {
        // Determine config path from environment or use default
        let config_path = env::var("RANGECAST_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/server.toml"));

        let mut config = if config_path.exists() {
            let content = tokio::fs::read_to_string(&config_path)
                .await
                .with_context(|| {
                    format!("Failed to read config file: {}", config_path.display())
                })?;

            match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(
                        "Config file {} is invalid ({}); using defaults",
                        config_path.display(),
                        e
                    );
                    Self::default()
                }
            }
        } else {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                config_path.display()
            );
            Self::default()
        };

        config.config_path = config_path;

        // Override with environment variables
        config.apply_env_overrides();

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("RANGECAST_SERVER_NAME") {
            self.server_name = val;
        }
        if let Ok(val) = env::var("RANGECAST_WORLD_ID") {
            if let Ok(id) = val.parse() {
                self.world_id = id;
            }
        }
        if let Ok(val) = env::var("RANGECAST_MAX_CONNECTIONS") {
            if let Ok(max) = val.parse() {
                self.max_connections = max;
            }
        }
        if let Ok(val) = env::var("RANGECAST_RADIUS_FAR") {
            if let Ok(radius) = val.parse() {
                self.visibility.radius_far = radius;
            }
        }
        if let Ok(val) = env::var("RANGECAST_RADIUS_NEAR") {
            if let Ok(radius) = val.parse() {
                self.visibility.radius_near = radius;
            }
        }
        if let Ok(val) = env::var("RANGECAST_GRID_WIDTH") {
            if let Ok(width) = val.parse() {
                self.grid.width = width;
            }
        }
        if let Ok(val) = env::var("RANGECAST_GRID_HEIGHT") {
            if let Ok(height) = val.parse() {
                self.grid.height = height;
            }
        }
        if let Ok(val) = env::var("RANGECAST_DEV_MODE") {
            self.dev_mode = val.to_lowercase() == "true" || val == "1";
        }
        if let Ok(val) = env::var("RANGECAST_DEBUG") {
            self.debug = val.to_lowercase() == "true" || val == "1";
        }
    }

    /// Validate the configuration
    ///
    /// The visibility radii are intentionally not range-checked; only their
    /// type constrains them.
    fn validate(&self) -> Result<()> {
        // World ID must be 1-255
        if self.world_id == 0 {
            anyhow::bail!("World ID must be between 1 and 255");
        }

        // Max connections must be reasonable
        if self.max_connections == 0 || self.max_connections > 10000 {
            anyhow::bail!("Max connections must be between 1 and 10000");
        }

        // The grid must hold at least one cell
        if self.grid.width == 0 || self.grid.height == 0 {
            anyhow::bail!("Grid dimensions must be at least 1x1");
        }

        // Pump interval must be reasonable
        if self.pump_interval_ms < 10 || self.pump_interval_ms > 10000 {
            anyhow::bail!("Pump interval must be between 10ms and 10000ms");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.server_name, "Rangecast");
        assert_eq!(config.world_id, 1);
        assert_eq!(config.visibility.radius_far, 8);
        assert_eq!(config.visibility.radius_near, 4);
        assert_eq!(config.visibility.rollout_stagger_secs, 5);
        assert_eq!(config.grid.width, 64);
        assert_eq!(config.grid.height, 64);
    }

    #[test]
    fn test_visibility_parameters() {
        let config = VisibilityConfig {
            radius_far: 12,
            radius_near: 3,
            rollout_stagger_secs: 5,
        };
        assert_eq!(config.parameters(), RangeParameters::new(3, 12));
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: ServerConfig = toml::from_str(
            r#"
            server_name = "Test World"

            [visibility]
            radius_far = 16
            "#,
        )
        .unwrap();

        assert_eq!(config.server_name, "Test World");
        assert_eq!(config.visibility.radius_far, 16);
        // Unspecified fields fall back to defaults
        assert_eq!(config.visibility.radius_near, 4);
        assert_eq!(config.grid.width, 64);
    }

    #[test]
    fn test_validation() {
        let mut config = ServerConfig::default();

        // Valid config should pass
        assert!(config.validate().is_ok());

        // Invalid world ID
        config.world_id = 0;
        assert!(config.validate().is_err());
        config.world_id = 1;

        // Degenerate grid
        config.grid.width = 0;
        assert!(config.validate().is_err());
        config.grid.width = 64;

        // Radii are not range-checked
        config.visibility.radius_far = 0;
        config.visibility.radius_near = 9999;
        assert!(config.validate().is_ok());
    }
}
