//! Container runtime adapter
//!
//! The panel treats the container engine as an opaque external collaborator:
//! [`ContainerRuntime`] is the seam the installation manager and the docker
//! routes talk through, and [`CliRuntime`] implements it by shelling out to
//! the `docker`/`podman` CLI with JSON-formatted output.

use async_trait::async_trait;
use hostdeck_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::process::Command;
use tokio::process::Command as AsyncCommand;
use tracing::debug;

/// Container runtime detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    Docker,
    Podman,
}

impl RuntimeKind {
    /// Detect an available container runtime. Docker is preferred when both
    /// are installed; the built-in catalog targets docker images.
    pub fn detect() -> Option<Self> {
        if Command::new("docker").arg("--version").output().is_ok() {
            return Some(Self::Docker);
        }
        if Command::new("podman").arg("--version").output().is_ok() {
            return Some(Self::Podman);
        }
        None
    }

    /// Get the CLI command name
    pub fn command(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Podman => "podman",
        }
    }
}

/// Everything the runtime needs to create a backing container.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    /// Container name (derived from the installation, not user-supplied)
    pub name: String,
    pub image: String,
    /// Published port, mapped host:container on the same number the app
    /// definition exposes
    pub host_port: u16,
    pub container_port: u16,
    pub env: Vec<(String, String)>,
    /// "host:container" bind mounts, applied in order
    pub volumes: Vec<String>,
}

impl ContainerSpec {
    /// CLI arguments for `docker create`, minus the subcommand itself.
    pub fn create_args(&self) -> Vec<String> {
        let mut args = vec![
            "create".to_string(),
            "--name".to_string(),
            self.name.clone(),
            "-p".to_string(),
            format!("{}:{}", self.host_port, self.container_port),
        ];
        for volume in &self.volumes {
            args.push("-v".to_string());
            args.push(volume.clone());
        }
        for (key, value) in &self.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.push(self.image.clone());
        args
    }
}

/// Observed container state, from inspect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Created,
    Running,
    Paused,
    Exited,
    Dead,
    Unknown,
}

impl From<&str> for ContainerState {
    fn from(s: &str) -> Self {
        match s {
            "created" => Self::Created,
            "running" => Self::Running,
            "paused" => Self::Paused,
            "exited" => Self::Exited,
            "dead" => Self::Dead,
            _ => Self::Unknown,
        }
    }
}

/// Engine-level facts for the panel's runtime status view
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeInfo {
    pub server_version: String,
    pub operating_system: String,
    pub architecture: String,
    pub containers: i64,
    pub containers_running: i64,
    pub images: i64,
}

/// A container as listed by the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub image: String,
    pub state: String,
    pub status: String,
    pub ports: String,
    pub created: String,
}

/// Opaque external container engine.
///
/// `create` returns the engine's container id; every other call addresses a
/// container by that id.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn create(&self, spec: &ContainerSpec) -> Result<String>;
    async fn start(&self, id: &str) -> Result<()>;
    async fn stop(&self, id: &str) -> Result<()>;
    /// Force-remove; also stops a running container.
    async fn remove(&self, id: &str) -> Result<()>;
    async fn inspect(&self, id: &str) -> Result<ContainerState>;

    async fn info(&self) -> Result<RuntimeInfo>;
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>>;
}

/// CLI-backed runtime (docker or podman)
pub struct CliRuntime {
    kind: RuntimeKind,
}

impl CliRuntime {
    pub fn new(kind: RuntimeKind) -> Self {
        Self { kind }
    }

    /// Detect and wrap the local engine, if any.
    pub fn detect() -> Option<Self> {
        RuntimeKind::detect().map(Self::new)
    }

    pub fn kind(&self) -> RuntimeKind {
        self.kind
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        debug!("{} {}", self.kind.command(), args.join(" "));
        let output = AsyncCommand::new(self.kind.command())
            .args(args)
            .output()
            .await
            .map_err(|e| Error::Runtime(e.to_string()))?;

        if !output.status.success() {
            return Err(Error::Runtime(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl ContainerRuntime for CliRuntime {
    async fn create(&self, spec: &ContainerSpec) -> Result<String> {
        let args = spec.create_args();
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let stdout = self.run(&arg_refs).await?;
        let id = stdout.trim().to_string();
        if id.is_empty() {
            return Err(Error::Runtime("engine returned no container id".into()));
        }
        Ok(id)
    }

    async fn start(&self, id: &str) -> Result<()> {
        self.run(&["start", id]).await.map(|_| ())
    }

    async fn stop(&self, id: &str) -> Result<()> {
        self.run(&["stop", id]).await.map(|_| ())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.run(&["rm", "-f", id]).await.map(|_| ())
    }

    async fn inspect(&self, id: &str) -> Result<ContainerState> {
        let stdout = self
            .run(&["inspect", "--format", "{{json .State}}", id])
            .await?;
        let state: InspectStateJson = serde_json::from_str(stdout.trim())?;
        Ok(ContainerState::from(
            state.Status.unwrap_or_default().as_str(),
        ))
    }

    async fn info(&self) -> Result<RuntimeInfo> {
        let stdout = self.run(&["info", "--format", "{{json .}}"]).await?;
        let info: EngineInfoJson = serde_json::from_str(stdout.trim())?;
        Ok(RuntimeInfo {
            server_version: info.ServerVersion.unwrap_or_default(),
            operating_system: info.OperatingSystem.unwrap_or_default(),
            architecture: info.Architecture.unwrap_or_default(),
            containers: info.Containers.unwrap_or(0),
            containers_running: info.ContainersRunning.unwrap_or(0),
            images: info.Images.unwrap_or(0),
        })
    }

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        let stdout = self
            .run(&["ps", "-a", "--format", "{{json .}}"])
            .await?;

        let mut containers = Vec::new();
        for line in stdout.lines() {
            if line.trim().is_empty() {
                continue;
            }
            // Parse JSON line
            if let Ok(row) = serde_json::from_str::<PsJson>(line) {
                containers.push(ContainerSummary {
                    id: row.ID.unwrap_or_default(),
                    name: row.Names.unwrap_or_default(),
                    image: row.Image.unwrap_or_default(),
                    state: row.State.unwrap_or_default(),
                    status: row.Status.unwrap_or_default(),
                    ports: row.Ports.unwrap_or_default(),
                    created: row.CreatedAt.unwrap_or_default(),
                });
            }
        }

        Ok(containers)
    }
}

/// Stand-in used when no engine is installed. Every call fails the same way
/// the CLI adapter does when the engine is missing, so installs surface a
/// clear reason instead of a spawn error.
pub struct NullRuntime;

fn no_runtime() -> Error {
    Error::Runtime("no container runtime available".into())
}

#[async_trait]
impl ContainerRuntime for NullRuntime {
    async fn create(&self, _spec: &ContainerSpec) -> Result<String> {
        Err(no_runtime())
    }

    async fn start(&self, _id: &str) -> Result<()> {
        Err(no_runtime())
    }

    async fn stop(&self, _id: &str) -> Result<()> {
        Err(no_runtime())
    }

    async fn remove(&self, _id: &str) -> Result<()> {
        Err(no_runtime())
    }

    async fn inspect(&self, _id: &str) -> Result<ContainerState> {
        Err(no_runtime())
    }

    async fn info(&self) -> Result<RuntimeInfo> {
        Err(no_runtime())
    }

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        Err(no_runtime())
    }
}

// Internal JSON parsing structs (docker/podman output)
#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct InspectStateJson {
    Status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct EngineInfoJson {
    ServerVersion: Option<String>,
    OperatingSystem: Option<String>,
    Architecture: Option<String>,
    Containers: Option<i64>,
    ContainersRunning: Option<i64>,
    Images: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct PsJson {
    ID: Option<String>,
    Names: Option<String>,
    Image: Option<String>,
    State: Option<String>,
    Status: Option<String>,
    Ports: Option<String>,
    CreatedAt: Option<String>,
}
