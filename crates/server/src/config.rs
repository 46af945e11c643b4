//! Server configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Panel daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    pub listen: String,

    /// Data directory (installation store, metrics history)
    pub data_dir: PathBuf,

    /// Telemetry configuration
    pub telemetry: TelemetryConfig,

    /// Container runtime configuration
    pub runtime: RuntimeConfig,

    /// API auth configuration
    pub auth: AuthConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".to_string(),
            data_dir: hostdeck_common::default_data_dir(),
            telemetry: TelemetryConfig::default(),
            runtime: RuntimeConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

/// Telemetry loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Collection period in seconds
    pub interval_secs: u64,

    /// Snapshots retained per day file
    pub history_per_day: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            interval_secs: 2,
            history_per_day: 1000,
        }
    }
}

/// External container runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Deadline for a single runtime command, in seconds
    pub command_timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: 30,
        }
    }
}

/// API auth configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Disable auth entirely (local development)
    #[serde(default)]
    pub disabled: bool,

    /// Fixed bearer token; a random one is generated when unset
    #[serde(default)]
    pub token: Option<String>,
}

impl ServerConfig {
    /// Load configuration from file, falling back to defaults when absent.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Path of the installation store document
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("apps.json")
    }

    /// Directory holding per-day metrics history files
    pub fn metrics_dir(&self) -> PathBuf {
        self.data_dir.join("metrics")
    }

    pub fn collect_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.telemetry.interval_secs.max(1))
    }

    pub fn runtime_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.runtime.command_timeout_secs.max(1))
    }
}
