//! Core types for HostDeck

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Real-time channel carrying telemetry snapshots to subscribed clients.
pub const METRICS_CHANNEL: &str = "metrics:update";

// ============================================================================
// App store
// ============================================================================

/// A catalog entry describing an installable application.
///
/// Definitions are immutable for the life of the process; installing one
/// produces an [`InstallationRecord`] that carries the mutable lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub version: String,
    pub author: String,
    pub category: String,
    /// Container image reference (e.g. "redis:7-alpine")
    pub image: String,
    /// Default published port
    pub port: u16,
    /// Default environment for the backing container
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Volume mounts as "host:container" pairs, applied in order
    #[serde(default)]
    pub volumes: Vec<String>,
    /// Whether the app is backed by a container runtime resource
    #[serde(default)]
    pub requires_runtime: bool,
}

/// Lifecycle status of an installed app
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallStatus {
    Installing,
    Running,
    Stopped,
    Error,
}

impl std::fmt::Display for InstallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstallStatus::Installing => write!(f, "installing"),
            InstallStatus::Running => write!(f, "running"),
            InstallStatus::Stopped => write!(f, "stopped"),
            InstallStatus::Error => write!(f, "error"),
        }
    }
}

/// A persisted installation of a catalog app.
///
/// At most one record per `app_id` exists at a time; the store enforces the
/// constraint at insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationRecord {
    pub id: String,
    pub app_id: String,
    pub name: String,
    pub version: String,
    pub status: InstallStatus,
    pub port: u16,
    #[serde(default)]
    pub config: HashMap<String, serde_json::Value>,
    /// Opaque handle of the backing container, once provisioned
    #[serde(default)]
    pub container_id: Option<String>,
    /// Human-readable reason when status is `error`
    #[serde(default)]
    pub error: Option<String>,
    pub installed_at: DateTime<Utc>,
}

impl InstallationRecord {
    /// Create a new record in the `Installing` state.
    pub fn new(def: &AppDefinition, name: Option<String>, port: Option<u16>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            app_id: def.id.clone(),
            name: name.unwrap_or_else(|| def.name.clone()),
            version: def.version.clone(),
            status: InstallStatus::Installing,
            port: port.unwrap_or(def.port),
            config: HashMap::new(),
            container_id: None,
            error: None,
            installed_at: Utc::now(),
        }
    }
}

// ============================================================================
// Telemetry
// ============================================================================

/// One point-in-time bundle of host telemetry. Immutable once produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    /// Collection time, epoch milliseconds
    pub timestamp: i64,
    pub cpu: CpuTelemetry,
    pub memory: MemoryTelemetry,
    pub disk: Vec<DiskPartition>,
    pub network: NetworkTelemetry,
    pub processes: ProcessTelemetry,
    pub host: HostTelemetry,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuTelemetry {
    /// Aggregate load percentage across all cores
    pub load: f32,
    /// Per-core load percentages
    pub per_core: Vec<f32>,
    pub cores: usize,
    pub frequency_mhz: u64,
    pub brand: String,
    /// 1/5/15 minute load averages
    pub load_avg: [f64; 3],
    /// Degrees Celsius; 0.0 when no sensor is present
    pub temperature: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryTelemetry {
    pub total: u64,
    pub free: u64,
    pub used: u64,
    pub available: u64,
    pub usage_percent: f32,
    pub swap_total: u64,
    pub swap_used: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskPartition {
    pub fs: String,
    pub mount: String,
    pub total: u64,
    pub used: u64,
    pub available: u64,
    pub use_percent: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkTelemetry {
    pub interfaces: Vec<InterfaceTelemetry>,
    pub total: NetworkTotals,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceTelemetry {
    pub name: String,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    /// Receive rate, bytes per second since the previous snapshot
    pub rx_sec: f64,
    /// Transmit rate, bytes per second since the previous snapshot
    pub tx_sec: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkTotals {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_sec: f64,
    pub tx_sec: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessTelemetry {
    pub total: usize,
    pub running: usize,
    /// Top entries by CPU usage
    pub top: Vec<ProcessSample>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSample {
    pub pid: u32,
    pub name: String,
    pub cpu: f32,
    /// Resident memory in bytes
    pub memory: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostTelemetry {
    pub hostname: String,
    pub platform: String,
    pub os_version: String,
    pub kernel: String,
    pub arch: String,
    pub uptime_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&InstallStatus::Installing).unwrap(),
            "\"installing\""
        );
        assert_eq!(InstallStatus::Error.to_string(), "error");
    }

    #[test]
    fn record_wire_shape_is_camel_case() {
        let def = AppDefinition {
            id: "redis".into(),
            name: "Redis".into(),
            description: String::new(),
            version: "7.2.3".into(),
            author: String::new(),
            category: "Databases".into(),
            image: "redis:7-alpine".into(),
            port: 6379,
            env: HashMap::new(),
            volumes: vec![],
            requires_runtime: true,
        };
        let rec = InstallationRecord::new(&def, None, Some(6380));
        let v: serde_json::Value = serde_json::to_value(&rec).unwrap();
        assert_eq!(v["appId"], "redis");
        assert_eq!(v["status"], "installing");
        assert_eq!(v["port"], 6380);
        assert!(v["installedAt"].is_string());
    }
}
