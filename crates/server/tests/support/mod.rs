//! Shared test fixtures: a scripted container runtime and a manager harness.

#![allow(dead_code)]

use async_trait::async_trait;
use hostdeck_common::{AppRegistry, Error, InstallStatus, InstallStore, InstallationRecord};
use hostdeck_server::apps::{InstallRequest, InstallationManager};
use hostdeck_server::runtime::{
    ContainerRuntime, ContainerSpec, ContainerState, ContainerSummary, RuntimeInfo,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Scripted runtime: records calls, fails or stalls on demand.
#[derive(Default)]
pub struct FakeRuntime {
    pub calls: Mutex<Vec<String>>,
    pub fail_create: AtomicBool,
    pub fail_start: AtomicBool,
    pub fail_remove: AtomicBool,
    pub stall_start: Mutex<Option<Duration>>,
}

impl FakeRuntime {
    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn create(&self, spec: &ContainerSpec) -> hostdeck_common::Result<String> {
        self.record(format!("create {}", spec.name));
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Error::Runtime("image pull failed".into()));
        }
        Ok(format!("ctr-{}", spec.name))
    }

    async fn start(&self, id: &str) -> hostdeck_common::Result<()> {
        let stall = *self.stall_start.lock();
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }
        self.record(format!("start {}", id));
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(Error::Runtime("container refused to start".into()));
        }
        Ok(())
    }

    async fn stop(&self, id: &str) -> hostdeck_common::Result<()> {
        self.record(format!("stop {}", id));
        Ok(())
    }

    async fn remove(&self, id: &str) -> hostdeck_common::Result<()> {
        self.record(format!("remove {}", id));
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(Error::Runtime("engine unreachable".into()));
        }
        Ok(())
    }

    async fn inspect(&self, _id: &str) -> hostdeck_common::Result<ContainerState> {
        Ok(ContainerState::Running)
    }

    async fn info(&self) -> hostdeck_common::Result<RuntimeInfo> {
        Ok(RuntimeInfo {
            server_version: "0.0-test".into(),
            operating_system: "testos".into(),
            architecture: "test64".into(),
            containers: 0,
            containers_running: 0,
            images: 0,
        })
    }

    async fn list_containers(&self) -> hostdeck_common::Result<Vec<ContainerSummary>> {
        Ok(Vec::new())
    }
}

pub struct Harness {
    pub manager: InstallationManager,
    pub runtime: Arc<FakeRuntime>,
    pub dir: tempfile::TempDir,
}

pub fn harness() -> Harness {
    harness_with_timeout(Duration::from_secs(5))
}

pub fn harness_with_timeout(timeout: Duration) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = InstallStore::open(dir.path().join("apps.json")).unwrap();
    let runtime = Arc::new(FakeRuntime::default());
    let manager = InstallationManager::new(
        Arc::new(AppRegistry::builtin()),
        store,
        runtime.clone(),
        timeout,
    );
    Harness {
        manager,
        runtime,
        dir,
    }
}

pub fn install(
    manager: &InstallationManager,
    app_id: &str,
) -> hostdeck_common::Result<InstallationRecord> {
    manager.install(InstallRequest {
        app_id: app_id.to_string(),
        ..Default::default()
    })
}

pub async fn wait_for_status(
    manager: &InstallationManager,
    id: &str,
    status: InstallStatus,
) -> InstallationRecord {
    for _ in 0..200 {
        let record = manager
            .list()
            .unwrap()
            .into_iter()
            .find(|r| r.id == id)
            .unwrap_or_else(|| panic!("installation {} vanished", id));
        if record.status == status {
            return record;
        }
        assert_ne!(
            record.status,
            InstallStatus::Stopped,
            "no direct installing -> stopped transition"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("installation {} never reached {}", id, status);
}
