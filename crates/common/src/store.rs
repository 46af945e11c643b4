//! Flat-file JSON store for installation records
//!
//! The installation collection is persisted as a single JSON document.
//! Every mutating call performs a full read-modify-write of the document
//! while holding the store's writer lock, so concurrent mutations never
//! interleave. Writes land in a temp file that is renamed over the document,
//! so a failed write never leaves a partial file behind.

use crate::error::{Error, Result};
use crate::types::InstallationRecord;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    apps: Vec<InstallationRecord>,
}

/// Durable mapping from installation id to [`InstallationRecord`].
#[derive(Clone)]
pub struct InstallStore {
    path: Arc<PathBuf>,
    writer: Arc<Mutex<()>>,
}

impl InstallStore {
    /// Open or create the store document at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let store = Self {
            path: Arc::new(path),
            writer: Arc::new(Mutex::new(())),
        };

        if !store.path.exists() {
            store.commit(&StoreDocument::default())?;
        } else {
            // Surface a corrupt document at startup instead of on first use.
            store.load()?;
        }

        info!("Opened installation store at {:?}", store.path);
        Ok(store)
    }

    pub fn get(&self, id: &str) -> Result<Option<InstallationRecord>> {
        let doc = self.load()?;
        Ok(doc.apps.into_iter().find(|a| a.id == id))
    }

    /// All records, oldest installation first.
    pub fn list(&self) -> Result<Vec<InstallationRecord>> {
        let mut apps = self.load()?.apps;
        apps.sort_by_key(|a| a.installed_at);
        Ok(apps)
    }

    /// Insert a record for a not-yet-installed app.
    ///
    /// The duplicate check and the insert happen under the writer lock, so
    /// two racing installs of the same app cannot both commit.
    pub fn insert_new(&self, record: InstallationRecord) -> Result<()> {
        let _guard = self.writer.lock();
        let mut doc = self.load()?;
        if doc.apps.iter().any(|a| a.app_id == record.app_id) {
            return Err(Error::AlreadyInstalled {
                app_id: record.app_id,
            });
        }
        debug!("Inserting installation {} ({})", record.id, record.app_id);
        doc.apps.push(record);
        self.commit(&doc)
    }

    /// Replace the record with the same id, or append it.
    pub fn upsert(&self, record: InstallationRecord) -> Result<()> {
        let _guard = self.writer.lock();
        let mut doc = self.load()?;
        match doc.apps.iter_mut().find(|a| a.id == record.id) {
            Some(existing) => *existing = record,
            None => doc.apps.push(record),
        }
        self.commit(&doc)
    }

    /// Remove a record; returns whether it existed.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let _guard = self.writer.lock();
        let mut doc = self.load()?;
        let before = doc.apps.len();
        doc.apps.retain(|a| a.id != id);
        if doc.apps.len() == before {
            return Ok(false);
        }
        self.commit(&doc)?;
        Ok(true)
    }

    fn load(&self) -> Result<StoreDocument> {
        match std::fs::read_to_string(self.path.as_ref()) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoreDocument::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn commit(&self, doc: &StoreDocument) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(doc)?)?;
        std::fs::rename(&tmp, self.path.as_ref())?;
        Ok(())
    }
}
