//! Installation lifecycle manager
//!
//! Owns every status transition of an [`InstallationRecord`]:
//! `installing -> {running, error}` via the async provisioning task,
//! `running <-> stopped` via start/stop, `error -> running` via start retry,
//! and removal via uninstall. Nothing re-enters `installing`.
//!
//! Same-id operations are serialized through a per-installation mutex; the
//! provisioning task takes the same mutex, so its terminal write cannot
//! interleave with a concurrent start/stop/uninstall. Operations on
//! different installations proceed independently.

use crate::runtime::{ContainerRuntime, ContainerSpec};
use dashmap::DashMap;
use hostdeck_common::{
    AppDefinition, AppRegistry, Error, InstallStatus, InstallStore, InstallationRecord, Result,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Install request payload
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallRequest {
    pub app_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub config: Option<HashMap<String, serde_json::Value>>,
}

/// Drives installation records through their lifecycle against the external
/// container runtime.
#[derive(Clone)]
pub struct InstallationManager {
    registry: Arc<AppRegistry>,
    store: InstallStore,
    runtime: Arc<dyn ContainerRuntime>,
    locks: Arc<DashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    op_timeout: Duration,
}

impl InstallationManager {
    pub fn new(
        registry: Arc<AppRegistry>,
        store: InstallStore,
        runtime: Arc<dyn ContainerRuntime>,
        op_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            store,
            runtime,
            locks: Arc::new(DashMap::new()),
            op_timeout,
        }
    }

    /// Install an app from the catalog.
    ///
    /// The record is persisted as `installing` and returned immediately; a
    /// spawned provisioning task moves it to `running` or `error`.
    pub fn install(&self, req: InstallRequest) -> Result<InstallationRecord> {
        let def = self.registry.get(&req.app_id)?.clone();

        if let Some(name) = &req.name {
            if name.trim().is_empty() {
                return Err(Error::Validation("name must not be empty".into()));
            }
        }
        if req.port == Some(0) {
            return Err(Error::Validation("port must be non-zero".into()));
        }

        let mut record = InstallationRecord::new(&def, req.name, req.port);
        record.config = req.config.unwrap_or_default();

        // The store holds its writer lock across the duplicate check and the
        // insert, so racing installs of the same app cannot both commit.
        self.store.insert_new(record.clone())?;
        info!("Installing {} as {}", record.app_id, record.id);

        let mgr = self.clone();
        let spawned = record.clone();
        tokio::spawn(async move {
            mgr.provision(spawned, def).await;
        });

        Ok(record)
    }

    /// Start a stopped (or errored) installation.
    pub async fn start(&self, id: &str) -> Result<InstallationRecord> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut record = self.fetch(id)?;
        match record.status {
            InstallStatus::Running => Ok(record),
            InstallStatus::Installing => Err(Error::InvalidStateTransition {
                from: record.status.to_string(),
                to: InstallStatus::Running.to_string(),
            }),
            InstallStatus::Stopped | InstallStatus::Error => {
                let def = self.registry.get(&record.app_id)?.clone();
                match self.bring_up(&mut record, &def).await {
                    Ok(()) => {
                        record.status = InstallStatus::Running;
                        record.error = None;
                        self.store.upsert(record.clone())?;
                        Ok(record)
                    }
                    Err(e) => {
                        self.mark_error(record, &e);
                        Err(e)
                    }
                }
            }
        }
    }

    /// Stop a running installation.
    pub async fn stop(&self, id: &str) -> Result<InstallationRecord> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut record = self.fetch(id)?;
        match record.status {
            // Stopping an errored install is a no-op; `start` is the retry path.
            InstallStatus::Stopped | InstallStatus::Error => Ok(record),
            InstallStatus::Installing => Err(Error::InvalidStateTransition {
                from: record.status.to_string(),
                to: InstallStatus::Stopped.to_string(),
            }),
            InstallStatus::Running => {
                if let Some(cid) = record.container_id.clone() {
                    if let Err(e) = self.with_timeout(self.runtime.stop(&cid)).await {
                        self.mark_error(record, &e);
                        return Err(e);
                    }
                }
                record.status = InstallStatus::Stopped;
                self.store.upsert(record.clone())?;
                Ok(record)
            }
        }
    }

    /// Remove an installation and, best-effort, its backing container.
    pub async fn uninstall(&self, id: &str) -> Result<()> {
        let lock = self.lock_for(id);
        let guard = lock.lock().await;

        let record = self.fetch(id)?;
        if let Some(cid) = &record.container_id {
            if let Err(e) = self.with_timeout(self.runtime.remove(cid)).await {
                warn!(
                    "Runtime teardown of {} failed, removing record anyway: {}",
                    record.app_id, e
                );
            }
        }

        self.store.remove(id)?;
        drop(guard);
        self.locks.remove(id);
        info!("Uninstalled {} ({})", record.app_id, id);
        Ok(())
    }

    /// All installations, oldest first.
    pub fn list(&self) -> Result<Vec<InstallationRecord>> {
        self.store.list()
    }

    /// Provisioning task spawned by [`install`]: the only path from
    /// `installing` to a terminal status.
    async fn provision(&self, record: InstallationRecord, def: AppDefinition) {
        let lock = self.lock_for(&record.id);
        let _guard = lock.lock().await;

        // The record may have been uninstalled while we waited for the lock.
        let mut record = match self.store.get(&record.id) {
            Ok(Some(r)) if r.status == InstallStatus::Installing => r,
            Ok(_) => return,
            Err(e) => {
                error!("Provisioning {}: store unreadable: {}", record.id, e);
                return;
            }
        };

        match self.bring_up(&mut record, &def).await {
            Ok(()) => {
                record.status = InstallStatus::Running;
                record.error = None;
                if let Err(e) = self.store.upsert(record.clone()) {
                    error!("Provisioning {}: persist failed: {}", record.id, e);
                    return;
                }
                info!("{} provisioned as {}", record.app_id, record.id);
            }
            Err(e) => {
                warn!("Provisioning {} failed: {}", record.app_id, e);
                self.mark_error(record, &e);
            }
        }
    }

    /// Create the backing container if needed, then start it. On success the
    /// record carries the container id; the caller persists the new status.
    async fn bring_up(&self, record: &mut InstallationRecord, def: &AppDefinition) -> Result<()> {
        if !def.requires_runtime {
            return Ok(());
        }

        if record.container_id.is_none() {
            let spec = container_spec(def, record);
            let cid = self.with_timeout(self.runtime.create(&spec)).await?;
            record.container_id = Some(cid.clone());
            // Persist the handle before starting so a crash between the two
            // runtime calls cannot orphan the container.
            self.store.upsert(record.clone())?;
        }

        let cid = record.container_id.clone().expect("container id just set");
        self.with_timeout(self.runtime.start(&cid)).await
    }

    /// Persist an `error` status, keeping the record visible and retryable.
    fn mark_error(&self, mut record: InstallationRecord, cause: &Error) {
        record.status = InstallStatus::Error;
        record.error = Some(cause.to_string());
        if let Err(e) = self.store.upsert(record) {
            error!("Failed to persist error status: {}", e);
        }
    }

    fn fetch(&self, id: &str) -> Result<InstallationRecord> {
        self.store
            .get(id)?
            .ok_or_else(|| Error::not_found("installation", id))
    }

    fn lock_for(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    async fn with_timeout<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::RuntimeTimeout {
                seconds: self.op_timeout.as_secs(),
            }),
        }
    }
}

fn container_spec(def: &AppDefinition, record: &InstallationRecord) -> ContainerSpec {
    let mut env: Vec<(String, String)> = def
        .env
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    env.sort();

    ContainerSpec {
        name: format!("hostdeck-{}", record.app_id),
        image: def.image.clone(),
        host_port: record.port,
        container_port: def.port,
        env,
        volumes: def.volumes.clone(),
    }
}
