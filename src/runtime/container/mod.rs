//! Container runtime contract shared by the Docker and Kubernetes
//! providers (spec §4.10). This is the heart of the system.

pub mod docker;
pub mod hijack;
pub mod kubernetes;

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::action::manifest::{BuildDefinition, ContainerRuntimeManifest};
use crate::cancel::CancelToken;
use crate::error::Result;
use crate::streams::Streams;

#[derive(Debug, Clone)]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,
}

/// Everything a container provider needs to create and run one container.
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    pub image: String,
    pub build: Option<BuildDefinition>,
    pub entrypoint: Option<Vec<String>>,
    pub command: Vec<String>,
    pub working_dir: Option<String>,
    pub user: Option<String>,
    /// `K=V` pairs.
    pub env: Vec<String>,
    pub extra_hosts: Vec<String>,
    pub volumes: Vec<VolumeMount>,
    /// Local-only host bind mounts (`host:container[:ro]`).
    pub binds: Vec<String>,
    pub hostname: Option<String>,
    pub network_mode: Option<String>,
    pub attach_stdin: bool,
    pub attach_stdout: bool,
    pub attach_stderr: bool,
    pub tty: bool,
    pub no_cache: bool,
    pub force_rebuild: bool,
}

impl ContainerSpec {
    pub fn from_manifest(manifest: &ContainerRuntimeManifest, host_cwd: &PathBuf, action_dir: &PathBuf) -> Self {
        let mut volumes = vec![
            VolumeMount { name: host_cwd.display().to_string(), mount_path: "/host".into() },
            VolumeMount { name: action_dir.display().to_string(), mount_path: "/action".into() },
        ];
        volumes.extend(manifest.volumes.iter().map(|v| VolumeMount {
            name: v.name.clone(),
            mount_path: v.mount_path.clone(),
        }));
        Self {
            image: manifest.image.clone().unwrap_or_default(),
            build: manifest.build.clone(),
            entrypoint: manifest.entrypoint.clone(),
            command: manifest.command.clone(),
            working_dir: manifest.working_dir.clone(),
            user: manifest.user.clone(),
            env: manifest.env.as_kv_strings(),
            extra_hosts: manifest.extra_hosts.clone(),
            volumes,
            binds: Vec::new(),
            hostname: None,
            network_mode: manifest.network_mode.clone(),
            attach_stdin: true,
            attach_stdout: true,
            attach_stderr: true,
            tty: false,
            no_cache: false,
            force_rebuild: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageStatus {
    Exists,
    Pulled,
    Built,
    /// The provider defers acquisition to `ContainerStart` (the Kubernetes
    /// path, via a Buildah sidecar).
    Postponed,
    UnexpectedError(String),
}

/// A progress line from an image pull or build, streamed to the terminal.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct FileStat {
    pub name: String,
    pub size: u64,
    /// Platform-independent mode flags translated from the remote encoding.
    pub mode: u32,
    pub mtime: i64,
    pub link_target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitStatus {
    Exited(i32),
    Detached,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StopOptions {
    pub timeout_secs: u64,
}

impl StopOptions {
    pub fn default_timeout() -> Self {
        Self { timeout_secs: 10 }
    }
}

/// A live duplex connection to a running container. Consumed by
/// [`hijack::drive`], which needs to own the stdin writer and the output
/// stream independently so it can select over both concurrently.
pub trait AttachedIo: Send {
    #[allow(clippy::type_complexity)]
    fn into_parts(
        self: Box<Self>,
    ) -> (
        std::pin::Pin<Box<dyn tokio::io::AsyncWrite + Send>>,
        std::pin::Pin<Box<dyn futures_util::Stream<Item = std::io::Result<hijack::DemuxFrame>> + Send>>,
    );
}

/// Operations implemented by the Docker and Kubernetes providers (spec
/// §4.10 contract).
#[async_trait]
pub trait ContainerProvider: Send + Sync {
    async fn info(&self) -> Result<String>;

    async fn image_ensure(&self, spec: &ContainerSpec, progress: mpsc::Sender<ProgressEvent>) -> Result<ImageStatus>;

    async fn image_remove(&self, image: &str) -> Result<()>;

    async fn container_create(&self, spec: &ContainerSpec) -> Result<String>;

    /// Starts the container and returns a status-wait future plus the
    /// hijacked I/O handle (`None` for a container not attached).
    async fn container_start(
        &self,
        cid: &str,
        spec: &ContainerSpec,
    ) -> Result<(mpsc::Receiver<ExitStatus>, Option<Box<dyn AttachedIo>>)>;

    async fn container_stop(&self, cid: &str, opts: StopOptions) -> Result<()>;

    async fn container_kill(&self, cid: &str, signal: &str) -> Result<()>;

    async fn container_remove(&self, cid: &str) -> Result<()>;

    async fn copy_to_container(&self, cid: &str, dest_path: &str, data: Vec<u8>) -> Result<()>;

    async fn copy_from_container(&self, cid: &str, src_path: &str) -> Result<Vec<u8>>;

    async fn container_stat_path(&self, cid: &str, path: &str) -> Result<FileStat>;

    async fn container_resize(&self, cid: &str, rows: u16, cols: u16) -> Result<()>;
}

/// Which provider backs container actions (spec §9 / SPEC_FULL §B.3: the
/// default is Docker when a socket answers `Info`, else Kubernetes;
/// `--remote-runtime` forces Kubernetes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Docker,
    Kubernetes,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Docker => "docker",
            ProviderKind::Kubernetes => "kubernetes",
        }
    }
}

pub struct ContainerExecutor {
    pub provider: std::sync::Arc<dyn ContainerProvider>,
    pub kind: ProviderKind,
    pub spec: ContainerSpec,
    pub remove_after: bool,
}

impl ContainerExecutor {
    pub async fn execute(&self, streams: &Streams, cancel: CancelToken) -> Result<i32> {
        let (tx, mut rx) = mpsc::channel(32);
        // `image_ensure` blocks on `tx.send()` once the channel fills, so the
        // drain has to run concurrently with it rather than after — otherwise
        // a build/pull emitting more than the channel's capacity deadlocks.
        let (image_status, ()) = tokio::join!(self.provider.image_ensure(&self.spec, tx), drain_progress(&mut rx, streams));
        let image_status = image_status?;
        tracing::debug!(provider = self.kind.as_str(), ?image_status, "image ensured");

        let cid = self.provider.container_create(&self.spec).await?;
        let (status_rx, io) = self.provider.container_start(&cid, &self.spec).await?;

        let outcome = hijack::drive(io, status_rx, streams, cancel.clone(), &self.provider, &cid).await?;

        let code = match outcome {
            ExitStatus::Exited(code) => code,
            ExitStatus::Detached => {
                tracing::info!(id = %cid, "detached");
                return Ok(0);
            }
        };

        if self.remove_after {
            self.provider.container_remove(&cid).await?;
        }
        Ok(code)
    }
}

async fn drain_progress(rx: &mut mpsc::Receiver<ProgressEvent>, streams: &Streams) {
    while let Some(event) = rx.recv().await {
        streams.print_err(&format!("{}\n", event.message));
    }
}
