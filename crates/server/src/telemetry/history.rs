//! On-disk telemetry history
//!
//! Snapshots are appended to one JSON file per calendar day
//! (`metrics-YYYY-MM-DD.json`), each trimmed to its most recent N entries.
//! Reads tolerate missing or corrupt files; a bad day file costs at most
//! that day of history.

use chrono::{DateTime, NaiveDate, Utc};
use hostdeck_common::{Result, TelemetrySnapshot};
use std::path::{Path, PathBuf};
use tracing::warn;

const FILE_PREFIX: &str = "metrics-";

/// Bounded per-day snapshot history
pub struct MetricsHistory {
    dir: PathBuf,
    per_day_cap: usize,
}

impl MetricsHistory {
    pub fn new(dir: impl Into<PathBuf>, per_day_cap: usize) -> Self {
        Self {
            dir: dir.into(),
            per_day_cap: per_day_cap.max(1),
        }
    }

    /// Append a snapshot to its day file, evicting the oldest entries past
    /// the per-day cap.
    pub fn append(&self, snapshot: &TelemetrySnapshot) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;

        let day = DateTime::from_timestamp_millis(snapshot.timestamp)
            .map(|dt| dt.date_naive())
            .unwrap_or_else(|| Utc::now().date_naive());
        let path = self.day_file(day);

        let mut entries = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Vec<TelemetrySnapshot>>(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Resetting corrupt history file {:?}: {}", path, e);
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        entries.push(snapshot.clone());
        if entries.len() > self.per_day_cap {
            let excess = entries.len() - self.per_day_cap;
            entries.drain(..excess);
        }

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(&entries)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Snapshots from the last `hours` hours, oldest first.
    ///
    /// Reads back only as many day files as the window needs. Unreadable
    /// files are skipped with a warning, never fatal.
    pub fn window(&self, hours: u64) -> Vec<TelemetrySnapshot> {
        let cutoff = Utc::now().timestamp_millis() - (hours as i64) * 3_600_000;

        let mut files = self.day_files();
        files.sort();
        files.reverse();
        files.truncate((hours as usize).div_ceil(24) + 1);

        let mut snapshots = Vec::new();
        for path in files {
            match read_day_file(&path) {
                Ok(entries) => {
                    snapshots.extend(entries.into_iter().filter(|s| s.timestamp >= cutoff))
                }
                Err(e) => warn!("Skipping history file {:?}: {}", path, e),
            }
        }

        snapshots.sort_by_key(|s| s.timestamp);
        snapshots
    }

    fn day_file(&self, day: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}{}.json", FILE_PREFIX, day.format("%Y-%m-%d")))
    }

    fn day_files(&self) -> Vec<PathBuf> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(FILE_PREFIX) && n.ends_with(".json"))
                    .unwrap_or(false)
            })
            .collect()
    }
}

fn read_day_file(path: &Path) -> Result<Vec<TelemetrySnapshot>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(timestamp: i64) -> TelemetrySnapshot {
        TelemetrySnapshot {
            timestamp,
            ..Default::default()
        }
    }

    #[test]
    fn day_file_keeps_most_recent_entries_only() {
        let dir = tempfile::tempdir().unwrap();
        let history = MetricsHistory::new(dir.path(), 3);

        let base = Utc::now().timestamp_millis();
        for i in 0..5 {
            history.append(&snapshot(base + i)).unwrap();
        }

        let files = history.day_files();
        assert_eq!(files.len(), 1);
        let entries = read_day_file(&files[0]).unwrap();
        assert_eq!(entries.len(), 3);
        // oldest evicted first
        assert_eq!(entries[0].timestamp, base + 2);
        assert_eq!(entries[2].timestamp, base + 4);
    }

    #[test]
    fn window_is_chronological_and_excludes_old_entries() {
        let dir = tempfile::tempdir().unwrap();
        let history = MetricsHistory::new(dir.path(), 1000);

        let now = Utc::now().timestamp_millis();
        let hour = 3_600_000i64;

        history.append(&snapshot(now - 30 * 24 * hour)).unwrap(); // far outside window
        history.append(&snapshot(now - 2 * hour)).unwrap();
        history.append(&snapshot(now - hour)).unwrap();
        history.append(&snapshot(now)).unwrap();

        let window = history.window(24);
        assert_eq!(window.len(), 3);
        assert!(window.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(window[0].timestamp, now - 2 * hour);
    }

    #[test]
    fn snapshots_land_in_their_own_day_files() {
        let dir = tempfile::tempdir().unwrap();
        let history = MetricsHistory::new(dir.path(), 1000);

        let now = Utc::now().timestamp_millis();
        history.append(&snapshot(now)).unwrap();
        history.append(&snapshot(now - 3 * 24 * 3_600_000)).unwrap();

        assert_eq!(history.day_files().len(), 2);
    }

    #[test]
    fn corrupt_file_is_skipped_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let history = MetricsHistory::new(dir.path(), 1000);

        let now = Utc::now().timestamp_millis();
        history.append(&snapshot(now)).unwrap();

        // a corrupt sibling file must not poison the window
        std::fs::write(dir.path().join("metrics-2020-01-01.json"), "{oops").unwrap();

        let window = history.window(24 * 365 * 10);
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn window_with_no_history_dir_is_empty() {
        let history = MetricsHistory::new("/nonexistent/metrics", 1000);
        assert!(history.window(24).is_empty());
    }
}
