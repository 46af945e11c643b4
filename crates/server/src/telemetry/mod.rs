//! Host telemetry collection and fan-out
//!
//! A single timer drives [`TelemetryCollector`] and [`TelemetryHub`]: each
//! tick collects one snapshot and hands it to the hub, which delivers it to
//! subscribed WebSocket clients and appends it to the on-disk history. Ticks
//! never overlap; when a collection outlives the period the next tick is
//! skipped rather than queued.

pub mod history;

use crate::subscriptions::SubscriptionRegistry;
use history::MetricsHistory;
use chrono::Utc;
use hostdeck_common::{
    CpuTelemetry, DiskPartition, Error, HostTelemetry, InterfaceTelemetry, MemoryTelemetry,
    NetworkTelemetry, NetworkTotals, ProcessSample, ProcessTelemetry, Result, TelemetrySnapshot,
    METRICS_CHANNEL,
};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use sysinfo::{Components, Disks, Networks, ProcessStatus, System};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Gathers one [`TelemetrySnapshot`] per call from the host.
pub struct TelemetryCollector {
    state: Mutex<CollectorState>,
}

struct CollectorState {
    sys: System,
    disks: Disks,
    networks: Networks,
    components: Components,
    /// Cumulative rx/tx per interface at the previous collection
    last_net: HashMap<String, (u64, u64)>,
    last_seen: Option<Instant>,
}

impl TelemetryCollector {
    pub fn new() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();
        Self {
            state: Mutex::new(CollectorState {
                sys,
                disks: Disks::new_with_refreshed_list(),
                networks: Networks::new_with_refreshed_list(),
                components: Components::new_with_refreshed_list(),
                last_net: HashMap::new(),
                last_seen: None,
            }),
        }
    }

    /// Collect a snapshot.
    ///
    /// A hard failure of a required metric family fails the whole snapshot;
    /// absent optional hardware (temperature sensors) degrades to zero so a
    /// sensorless host still gets a dashboard.
    pub fn collect(&self) -> Result<TelemetrySnapshot> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let elapsed = state.last_seen.map(|t| t.elapsed().as_secs_f64());
        state.last_seen = Some(Instant::now());

        state.sys.refresh_cpu_usage();
        state.sys.refresh_memory();
        state.sys.refresh_processes();
        state.disks.refresh_list();
        state.networks.refresh_list();
        state.components.refresh_list();

        let cpu = collect_cpu(&state.sys, &state.components)?;
        let memory = collect_memory(&state.sys);
        let disk = collect_disks(&state.disks);
        let network = collect_network(&state.networks, &mut state.last_net, elapsed);
        let processes = collect_processes(&state.sys, 10);
        let host = collect_host();

        Ok(TelemetrySnapshot {
            timestamp: Utc::now().timestamp_millis(),
            cpu,
            memory,
            disk,
            network,
            processes,
            host,
        })
    }

    /// Process table for the REST view, top `limit` by CPU.
    pub fn top_processes(&self, limit: usize) -> ProcessTelemetry {
        let mut state = self.state.lock();
        state.sys.refresh_processes();
        collect_processes(&state.sys, limit)
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn collect_cpu(sys: &System, components: &Components) -> Result<CpuTelemetry> {
    let cpus = sys.cpus();
    if cpus.is_empty() {
        return Err(Error::Collection("host reported no CPUs".into()));
    }

    let load_avg = System::load_average();

    Ok(CpuTelemetry {
        load: sys.global_cpu_info().cpu_usage(),
        per_core: cpus.iter().map(|c| c.cpu_usage()).collect(),
        cores: cpus.len(),
        frequency_mhz: cpus[0].frequency(),
        brand: cpus[0].brand().trim().to_string(),
        load_avg: [load_avg.one, load_avg.five, load_avg.fifteen],
        temperature: cpu_temperature(components),
    })
}

/// Best CPU-ish sensor reading; 0.0 when the host has none.
fn cpu_temperature(components: &Components) -> f32 {
    let mut fallback = None;
    for component in components.list() {
        let label = component.label().to_ascii_lowercase();
        if label.contains("cpu") || label.contains("core") || label.contains("tctl") {
            return component.temperature();
        }
        fallback.get_or_insert(component.temperature());
    }
    fallback.unwrap_or(0.0)
}

fn collect_memory(sys: &System) -> MemoryTelemetry {
    let total = sys.total_memory();
    let used = sys.used_memory();
    MemoryTelemetry {
        total,
        free: sys.free_memory(),
        used,
        available: sys.available_memory(),
        usage_percent: if total > 0 {
            (used as f32 / total as f32) * 100.0
        } else {
            0.0
        },
        swap_total: sys.total_swap(),
        swap_used: sys.used_swap(),
    }
}

fn collect_disks(disks: &Disks) -> Vec<DiskPartition> {
    disks
        .list()
        .iter()
        .filter(|d| d.total_space() > 0)
        .map(|d| {
            let total = d.total_space();
            let available = d.available_space();
            let used = total.saturating_sub(available);
            DiskPartition {
                fs: d.file_system().to_string_lossy().to_string(),
                mount: d.mount_point().display().to_string(),
                total,
                used,
                available,
                use_percent: (used as f32 / total as f32) * 100.0,
            }
        })
        .collect()
}

fn collect_network(
    networks: &Networks,
    last: &mut HashMap<String, (u64, u64)>,
    elapsed: Option<f64>,
) -> NetworkTelemetry {
    let mut interfaces = Vec::new();
    let mut totals = NetworkTotals::default();
    let mut seen = HashMap::new();

    for (name, data) in networks.list() {
        let rx = data.total_received();
        let tx = data.total_transmitted();
        seen.insert(name.clone(), (rx, tx));

        let (rx_sec, tx_sec) = match (elapsed, last.get(name)) {
            (Some(secs), Some(&(prev_rx, prev_tx))) if secs > 0.0 => (
                rx.saturating_sub(prev_rx) as f64 / secs,
                tx.saturating_sub(prev_tx) as f64 / secs,
            ),
            _ => (0.0, 0.0),
        };

        totals.rx_bytes += rx;
        totals.tx_bytes += tx;
        totals.rx_sec += rx_sec;
        totals.tx_sec += tx_sec;

        interfaces.push(InterfaceTelemetry {
            name: name.clone(),
            rx_bytes: rx,
            tx_bytes: tx,
            rx_sec,
            tx_sec,
        });
    }

    *last = seen;
    NetworkTelemetry {
        interfaces,
        total: totals,
    }
}

fn collect_processes(sys: &System, limit: usize) -> ProcessTelemetry {
    let processes: Vec<_> = sys.processes().values().collect();
    let total = processes.len();
    let running = processes
        .iter()
        .filter(|p| matches!(p.status(), ProcessStatus::Run))
        .count();

    let mut sorted = processes;
    sorted.sort_by(|a, b| {
        b.cpu_usage()
            .partial_cmp(&a.cpu_usage())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    ProcessTelemetry {
        total,
        running,
        top: sorted
            .into_iter()
            .take(limit)
            .map(|p| ProcessSample {
                pid: p.pid().as_u32(),
                name: p.name().to_string(),
                cpu: p.cpu_usage(),
                memory: p.memory(),
            })
            .collect(),
    }
}

fn collect_host() -> HostTelemetry {
    HostTelemetry {
        hostname: System::host_name().unwrap_or_default(),
        platform: System::name().unwrap_or_default(),
        os_version: System::os_version().unwrap_or_default(),
        kernel: System::kernel_version().unwrap_or_default(),
        arch: System::cpu_arch().unwrap_or_default(),
        uptime_secs: System::uptime(),
    }
}

// ============================================================================
// Hub
// ============================================================================

/// Fans each snapshot out to subscribed clients and appends it to history.
///
/// Delivery is the primary contract; the history append is best-effort and
/// never blocks or fails a broadcast.
pub struct TelemetryHub {
    registry: Arc<SubscriptionRegistry>,
    history: MetricsHistory,
    latest: RwLock<Option<TelemetrySnapshot>>,
}

impl TelemetryHub {
    pub fn new(registry: Arc<SubscriptionRegistry>, history: MetricsHistory) -> Self {
        Self {
            registry,
            history,
            latest: RwLock::new(None),
        }
    }

    pub fn on_snapshot(&self, snapshot: TelemetrySnapshot) {
        *self.latest.write() = Some(snapshot.clone());

        match serde_json::to_string(&serde_json::json!({
            "channel": METRICS_CHANNEL,
            "data": snapshot,
        })) {
            Ok(frame) => {
                let delivered = self.registry.broadcast(METRICS_CHANNEL, &frame);
                debug!("Delivered snapshot to {} subscribers", delivered);
            }
            Err(e) => error!("Failed to encode snapshot: {}", e),
        }

        if let Err(e) = self.history.append(&snapshot) {
            warn!("History append failed: {}", e);
        }
    }

    /// Most recent snapshot, for the REST poll fallback.
    pub fn latest(&self) -> Option<TelemetrySnapshot> {
        self.latest.read().clone()
    }

    /// Snapshots within the last `hours`, oldest first.
    pub fn history(&self, hours: u64) -> Vec<TelemetrySnapshot> {
        self.history.window(hours)
    }
}

/// Collection/broadcast loop. Collections run sequentially, so they never
/// overlap; a collection slower than the period causes skipped ticks, not a
/// backlog.
pub async fn run_collector(
    collector: Arc<TelemetryCollector>,
    hub: Arc<TelemetryHub>,
    period: Duration,
) {
    info!("Telemetry collector started ({:?} period)", period);

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;

        let collector = collector.clone();
        // sysinfo refreshes are blocking work; keep them off the async workers.
        match tokio::task::spawn_blocking(move || collector.collect()).await {
            Ok(Ok(snapshot)) => hub.on_snapshot(snapshot),
            Ok(Err(e)) => warn!("Telemetry collection failed, skipping tick: {}", e),
            Err(e) => error!("Telemetry collection task failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn snapshot(timestamp: i64) -> TelemetrySnapshot {
        TelemetrySnapshot {
            timestamp,
            ..Default::default()
        }
    }

    fn hub_with_dir(dir: &std::path::Path) -> (Arc<SubscriptionRegistry>, TelemetryHub) {
        let registry = Arc::new(SubscriptionRegistry::new());
        let hub = TelemetryHub::new(registry.clone(), MetricsHistory::new(dir, 1000));
        (registry, hub)
    }

    #[test]
    fn snapshot_reaches_subscribers_but_not_unsubscribed_clients() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, hub) = hub_with_dir(dir.path());

        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        registry.register("a", tx_a);
        registry.register("b", tx_b);
        registry.subscribe("a", METRICS_CHANNEL);
        registry.subscribe("b", METRICS_CHANNEL);
        registry.unsubscribe("b", METRICS_CHANNEL);

        hub.on_snapshot(snapshot(Utc::now().timestamp_millis()));

        let frame = rx_a.try_recv().unwrap();
        assert!(frame.contains(METRICS_CHANNEL));
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn snapshots_are_delivered_in_collection_order() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, hub) = hub_with_dir(dir.path());

        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register("a", tx);
        registry.subscribe("a", METRICS_CHANNEL);

        let base = Utc::now().timestamp_millis();
        hub.on_snapshot(snapshot(base));
        hub.on_snapshot(snapshot(base + 1));

        let first: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        let second: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(first["data"]["timestamp"], base);
        assert_eq!(second["data"]["timestamp"], base + 1);
        assert!(rx.try_recv().is_err()); // exactly one frame per tick
    }

    #[test]
    fn latest_and_history_track_each_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let (_registry, hub) = hub_with_dir(dir.path());

        assert!(hub.latest().is_none());

        let now = Utc::now().timestamp_millis();
        hub.on_snapshot(snapshot(now));

        assert_eq!(hub.latest().unwrap().timestamp, now);
        let window = hub.history(24);
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].timestamp, now);
    }

    #[test]
    fn delivery_survives_history_append_failure() {
        // history dir path is occupied by a file, so appends cannot succeed
        let dir = tempfile::tempdir().unwrap();
        let blocked = dir.path().join("metrics");
        std::fs::write(&blocked, "not a directory").unwrap();

        let registry = Arc::new(SubscriptionRegistry::new());
        let hub = TelemetryHub::new(registry.clone(), MetricsHistory::new(&blocked, 1000));

        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register("a", tx);
        registry.subscribe("a", METRICS_CHANNEL);

        hub.on_snapshot(snapshot(Utc::now().timestamp_millis()));
        assert!(rx.try_recv().is_ok());
    }
}
