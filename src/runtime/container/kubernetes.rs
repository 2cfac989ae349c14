//! The remote provider: runs actions as ephemeral Kubernetes pods. Selected
//! when no local Docker socket answers, or when `--remote-runtime` is
//! passed (SPEC_FULL §B.3).
//!
//! IDs are synthesized as `namespace/pod/container` so the generic
//! `ContainerProvider` contract (a single string handle) still works; the
//! container component names the *ephemeral* container carrying the user's
//! command, not the pod's long-lived sleep container.

use std::collections::HashMap;
use std::io::Cursor;
use std::pin::Pin;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, AttachParams, DeleteParams, Patch, PatchParams, PostParams, TerminalSize};
use kube::Client;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::error::{Error, Result};

use super::hijack::DemuxFrame;
use super::{
    AttachedIo, ContainerProvider, ContainerSpec, ExitStatus, FileStat, ImageStatus,
    ProgressEvent, StopOptions,
};

const SLEEP_CONTAINER: &str = "sleep";
/// Touched by the ephemeral container's wrapper script once it has received
/// USR1, so the gate is resilient to the signal arriving before the script
/// has even installed the trap.
const GATE_FILE: &str = "/tmp/.launchr-go";
const EPHEMERAL_READY_TIMEOUT: Duration = Duration::from_secs(60);
const POD_READY_TIMEOUT: Duration = Duration::from_secs(120);

pub struct KubernetesProvider {
    client: Client,
    namespace: String,
    /// One resize sink per live attach, keyed by the synthesized container
    /// id, so `ContainerResize` (which only gets a cid) can reach the stream
    /// `ContainerStart` opened (spec §4.10 Kubernetes specifics).
    resize_sinks: AsyncMutex<HashMap<String, Pin<Box<dyn Sink<TerminalSize, Error = futures_channel::mpsc::SendError> + Send>>>>,
}

impl KubernetesProvider {
    pub async fn connect(namespace: impl Into<String>) -> Result<Self> {
        let client = Client::try_default().await.map_err(runtime_err("connecting to kubernetes"))?;
        Ok(Self { client, namespace: namespace.into(), resize_sinks: AsyncMutex::new(HashMap::new()) })
    }

    fn pods(&self) -> Api<Pod> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn split_id(id: &str) -> Result<(&str, &str, &str)> {
        let mut parts = id.splitn(3, '/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(ns), Some(pod), Some(container)) => Ok((ns, pod, container)),
            _ => Err(Error::RuntimeFailure { message: format!("malformed kubernetes container id {id:?}"), source: None }),
        }
    }
}

fn runtime_err(message: &'static str) -> impl Fn(kube::Error) -> Error {
    move |source| Error::RuntimeFailure {
        message: message.into(),
        source: Some(source.into()),
    }
}

/// The pod's sole container at creation time: a long-lived sleep that keeps
/// the pod running while the user's command is attached later as an
/// ephemeral container (spec §4.10 Kubernetes specifics).
fn pod_manifest(pod_name: &str) -> Pod {
    use k8s_openapi::api::core::v1::{Container, PodSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    Pod {
        metadata: ObjectMeta { name: Some(pod_name.to_string()), ..Default::default() },
        spec: Some(PodSpec {
            restart_policy: Some("Never".into()),
            containers: vec![Container {
                name: SLEEP_CONTAINER.into(),
                image: Some("busybox:stable".into()),
                command: Some(vec!["sleep".into(), "infinity".into()]),
                ..Default::default()
            }],
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Wraps the user's real command in a script that blocks on USR1 before
/// `exec`ing it, so the attach has a chance to connect before the command
/// starts emitting output (spec §4.10 Kubernetes specifics).
fn gated_command(spec: &ContainerSpec) -> (Vec<String>, Vec<String>) {
    let real: Vec<String> = spec.entrypoint.clone().unwrap_or_default().into_iter().chain(spec.command.clone()).collect();
    let script = format!(
        "trap 'touch {gate}' USR1; while [ ! -f {gate} ]; do sleep 0.05; done; exec \"$@\"",
        gate = GATE_FILE
    );
    // `--` becomes $0 inside the script; `args` (appended after `command` by
    // the pod spec) become $1.. so `exec "$@"` runs the real command itself
    // rather than one argument short.
    (vec!["sh".into(), "-c".into(), script, "--".into()], real)
}

fn ephemeral_container(container_name: &str, spec: &ContainerSpec) -> k8s_openapi::api::core::v1::EphemeralContainer {
    use k8s_openapi::api::core::v1::EphemeralContainer;

    let env = spec
        .env
        .iter()
        .filter_map(|kv| kv.split_once('='))
        .map(|(name, value)| k8s_openapi::api::core::v1::EnvVar {
            name: name.to_string(),
            value: Some(value.to_string()),
            ..Default::default()
        })
        .collect();
    let (command, args) = gated_command(spec);

    EphemeralContainer {
        name: container_name.to_string(),
        image: Some(spec.image.clone()),
        command: Some(command),
        args: Some(args),
        working_dir: spec.working_dir.clone(),
        env: Some(env),
        stdin: Some(spec.attach_stdin),
        tty: Some(spec.tty),
        target_container_name: Some(SLEEP_CONTAINER.to_string()),
        ..Default::default()
    }
}

async fn add_ephemeral_container(pods: &Api<Pod>, pod_name: &str, container: k8s_openapi::api::core::v1::EphemeralContainer) -> Result<()> {
    let patch = serde_json::json!({ "spec": { "ephemeralContainers": [container] } });
    pods.patch_subresource("ephemeralcontainers", pod_name, &PatchParams::default(), &Patch::Strategic(patch))
        .await
        .map_err(runtime_err("adding ephemeral container"))?;
    Ok(())
}

async fn await_pod_running(pods: &Api<Pod>, pod_name: &str) -> Result<()> {
    use kube::runtime::wait::{await_condition, conditions};
    let cond = conditions::is_pod_running();
    tokio::time::timeout(POD_READY_TIMEOUT, await_condition(pods.clone(), pod_name, cond))
        .await
        .map_err(|_| Error::RuntimeFailure { message: format!("pod {pod_name} did not become ready in time"), source: None })?
        .map_err(|e| Error::RuntimeFailure { message: "waiting for pod readiness".into(), source: Some(e.into()) })?;
    Ok(())
}

async fn await_ephemeral_running(pods: &Api<Pod>, pod_name: &str, container_name: &str) -> Result<()> {
    tokio::time::timeout(EPHEMERAL_READY_TIMEOUT, async {
        loop {
            let pod = pods.get_status(pod_name).await?;
            let running = pod
                .status
                .and_then(|s| s.ephemeral_container_statuses)
                .unwrap_or_default()
                .into_iter()
                .find(|cs| cs.name == container_name)
                .and_then(|cs| cs.state)
                .and_then(|s| s.running)
                .is_some();
            if running {
                return Ok::<(), kube::Error>(());
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
    })
    .await
    .map_err(|_| Error::RuntimeFailure { message: format!("ephemeral container {container_name} did not start in time"), source: None })?
    .map_err(|e| Error::RuntimeFailure { message: "waiting for ephemeral container readiness".into(), source: Some(e.into()) })?;
    Ok(())
}

async fn wait_for_ephemeral_completion(pods: &Api<Pod>, pod_name: &str, container_name: &str) -> Result<i32> {
    loop {
        let pod = pods.get_status(pod_name).await.map_err(runtime_err("polling ephemeral container status"))?;
        if let Some(terminated) = pod
            .status
            .and_then(|s| s.ephemeral_container_statuses)
            .unwrap_or_default()
            .into_iter()
            .find(|cs| cs.name == container_name)
            .and_then(|cs| cs.state)
            .and_then(|s| s.terminated)
        {
            return Ok(terminated.exit_code);
        }
        tokio::time::sleep(Duration::from_millis(300)).await;
    }
}

#[async_trait::async_trait]
impl ContainerProvider for KubernetesProvider {
    async fn info(&self) -> Result<String> {
        let version = self.client.apiserver_version().await.map_err(runtime_err("kubernetes version"))?;
        Ok(format!("{}.{}", version.major, version.minor))
    }

    async fn image_ensure(&self, _spec: &ContainerSpec, _progress: mpsc::Sender<ProgressEvent>) -> Result<ImageStatus> {
        // Image acquisition happens kubelet-side once the ephemeral container
        // is added in container_start; builds from a local context aren't
        // supported against a remote cluster.
        Ok(ImageStatus::Postponed)
    }

    async fn image_remove(&self, _image: &str) -> Result<()> {
        Ok(())
    }

    async fn container_create(&self, _spec: &ContainerSpec) -> Result<String> {
        let pod_name = format!("launchr-{}", uuid::Uuid::new_v4());
        let container_name = "action";
        self.pods()
            .create(&PostParams::default(), &pod_manifest(&pod_name))
            .await
            .map_err(runtime_err("creating pod"))?;
        Ok(format!("{}/{}/{}", self.namespace, pod_name, container_name))
    }

    async fn container_start(
        &self,
        cid: &str,
        spec: &ContainerSpec,
    ) -> Result<(mpsc::Receiver<ExitStatus>, Option<Box<dyn AttachedIo>>)> {
        let (_, pod_name, container_name) = Self::split_id(cid)?;
        let pods = self.pods();

        await_pod_running(&pods, pod_name).await?;
        add_ephemeral_container(&pods, pod_name, ephemeral_container(container_name, spec)).await?;
        await_ephemeral_running(&pods, pod_name, container_name).await?;

        let params = AttachParams::default()
            .container(container_name)
            .stdin(spec.attach_stdin)
            .stdout(spec.attach_stdout)
            .stderr(spec.attach_stderr)
            .tty(spec.tty);
        let mut attached = pods.attach(pod_name, &params).await.map_err(runtime_err("attaching to ephemeral container"))?;

        if let Some(sink) = attached.terminal_size() {
            self.resize_sinks.lock().await.insert(cid.to_string(), Box::pin(sink));
        }

        let stdin = attached.stdin().map(Box::new).map(|b| b as Box<dyn AsyncWrite + Unpin + Send>);
        let stdout = attached.stdout().map(|r| Box::pin(r) as Pin<Box<dyn AsyncRead + Send>>);
        let stderr = attached.stderr().map(|r| Box::pin(r) as Pin<Box<dyn AsyncRead + Send>>);

        // Now that the attach is live, release the script's USR1 gate so the
        // real command starts without losing its early output.
        let _ = exec_capture_stdout(&pods, pod_name, container_name, vec!["sh".into(), "-c".into(), "kill -USR1 1".into()]).await;

        let (tx, rx) = mpsc::channel(1);
        let pods_for_wait = pods.clone();
        let pod_name_owned = pod_name.to_string();
        let container_name_owned = container_name.to_string();
        tokio::spawn(async move {
            let code = wait_for_ephemeral_completion(&pods_for_wait, &pod_name_owned, &container_name_owned).await.unwrap_or(1);
            let _ = tx.send(ExitStatus::Exited(code)).await;
        });

        let io: Option<Box<dyn AttachedIo>> = stdin.map(|stdin| {
            Box::new(K8sAttachedIo { stdin, stdout, stderr }) as Box<dyn AttachedIo>
        });
        Ok((rx, io))
    }

    async fn container_stop(&self, cid: &str, opts: StopOptions) -> Result<()> {
        let (_, pod_name, container_name) = Self::split_id(cid)?;
        let pods = self.pods();
        exec_capture_stdout(&pods, pod_name, container_name, vec!["kill".into(), "-TERM".into(), "1".into()]).await.ok();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(opts.timeout_secs);
        loop {
            let pod = pods.get_status(pod_name).await.map_err(runtime_err("polling pod status while stopping"))?;
            let terminated = pod
                .status
                .and_then(|s| s.ephemeral_container_statuses)
                .unwrap_or_default()
                .into_iter()
                .find(|cs| cs.name == container_name)
                .and_then(|cs| cs.state)
                .and_then(|s| s.terminated)
                .is_some();
            if terminated || tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        exec_capture_stdout(&pods, pod_name, container_name, vec!["kill".into(), "-KILL".into(), "1".into()]).await.ok();
        Ok(())
    }

    async fn container_kill(&self, cid: &str, signal: &str) -> Result<()> {
        let (_, pod_name, container_name) = Self::split_id(cid)?;
        let posix_name = signal.trim_start_matches("SIG");
        exec_capture_stdout(&self.pods(), pod_name, container_name, vec!["kill".into(), format!("-{posix_name}"), "1".into()])
            .await
            .map(|_| ())
    }

    async fn container_remove(&self, cid: &str) -> Result<()> {
        let (_, pod_name, _) = Self::split_id(cid)?;
        self.resize_sinks.lock().await.remove(cid);
        match self.pods().delete(pod_name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
            Err(e) => Err(runtime_err("removing pod")(e)),
        }
    }

    async fn copy_to_container(&self, cid: &str, dest_path: &str, data: Vec<u8>) -> Result<()> {
        let (_, pod_name, container_name) = Self::split_id(cid)?;
        let mut tar_bytes = Vec::new();
        {
            let mut builder = tar::Builder::new(&mut tar_bytes);
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, dest_path.trim_start_matches('/'), Cursor::new(data))
                .map_err(|e| Error::RuntimeFailure { message: "packing copy-to-container tar".into(), source: Some(e.into()) })?;
            builder.finish().map_err(|e| Error::RuntimeFailure { message: "finishing copy-to-container tar".into(), source: Some(e.into()) })?;
        }
        exec_with_stdin(&self.pods(), pod_name, container_name, vec!["tar".into(), "xf".into(), "-".into(), "-C".into(), "/".into()], tar_bytes)
            .await
            .map(|_| ())
    }

    async fn copy_from_container(&self, cid: &str, src_path: &str) -> Result<Vec<u8>> {
        let (_, pod_name, container_name) = Self::split_id(cid)?;
        let dir = std::path::Path::new(src_path).parent().map(|p| p.display().to_string()).unwrap_or_else(|| "/".into());
        let base = std::path::Path::new(src_path).file_name().map(|f| f.to_string_lossy().to_string()).unwrap_or_default();
        exec_capture_tar_stdout(&self.pods(), pod_name, container_name, vec!["tar".into(), "cf".into(), "-".into(), "-C".into(), dir, base]).await
    }

    async fn container_stat_path(&self, cid: &str, path: &str) -> Result<FileStat> {
        let (_, pod_name, container_name) = Self::split_id(cid)?;
        let pods = self.pods();
        let output = exec_capture_stdout(&pods, pod_name, container_name, vec!["stat".into(), "-c".into(), "%n|%s|%f|%Y".into(), path.into()]).await?;
        let text = String::from_utf8_lossy(&output);
        let mut parts = text.trim_end().split('|');
        let name = parts.next().unwrap_or_default().to_string();
        let size = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        let raw_mode = parts.next().and_then(|s| u32::from_str_radix(s, 16).ok()).unwrap_or(0);
        let mtime = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        let mode = translate_linux_mode(raw_mode);

        let link_target = if mode & MODE_SYMLINK != 0 {
            exec_capture_stdout(&pods, pod_name, container_name, vec!["readlink".into(), path.into()])
                .await
                .ok()
                .map(|bytes| String::from_utf8_lossy(&bytes).trim_end().to_string())
        } else {
            None
        };

        Ok(FileStat { name, size, mode, mtime, link_target })
    }

    async fn container_resize(&self, cid: &str, rows: u16, cols: u16) -> Result<()> {
        let mut sinks = self.resize_sinks.lock().await;
        if let Some(sink) = sinks.get_mut(cid) {
            let _ = sink.send(TerminalSize { height: rows, width: cols }).await;
        }
        Ok(())
    }
}

/// Linux `st_mode`'s type nibble, translated into platform-independent flags
/// the rest of the crate can branch on without knowing the remote OS (spec
/// §4.10 Kubernetes specifics).
const MODE_DIR: u32 = 1 << 31;
const MODE_SYMLINK: u32 = 1 << 30;
const MODE_NAMED_PIPE: u32 = 1 << 29;
const MODE_SOCKET: u32 = 1 << 28;
const MODE_DEVICE: u32 = 1 << 27;
const MODE_CHAR_DEVICE: u32 = 1 << 26;
const PERM_MASK: u32 = 0o7777;

fn translate_linux_mode(raw: u32) -> u32 {
    const S_IFMT: u32 = 0o170000;
    const S_IFDIR: u32 = 0o040000;
    const S_IFCHR: u32 = 0o020000;
    const S_IFBLK: u32 = 0o060000;
    const S_IFIFO: u32 = 0o010000;
    const S_IFLNK: u32 = 0o120000;
    const S_IFSOCK: u32 = 0o140000;

    let perm = raw & PERM_MASK;
    let type_flag = match raw & S_IFMT {
        S_IFDIR => MODE_DIR,
        S_IFLNK => MODE_SYMLINK,
        S_IFIFO => MODE_NAMED_PIPE,
        S_IFSOCK => MODE_SOCKET,
        S_IFBLK => MODE_DEVICE,
        S_IFCHR => MODE_DEVICE | MODE_CHAR_DEVICE,
        _ => 0,
    };
    perm | type_flag
}

struct K8sAttachedIo {
    stdin: Box<dyn AsyncWrite + Unpin + Send>,
    stdout: Option<Pin<Box<dyn AsyncRead + Send>>>,
    stderr: Option<Pin<Box<dyn AsyncRead + Send>>>,
}

impl AttachedIo for K8sAttachedIo {
    fn into_parts(
        self: Box<Self>,
    ) -> (
        Pin<Box<dyn AsyncWrite + Send>>,
        Pin<Box<dyn Stream<Item = std::io::Result<DemuxFrame>> + Send>>,
    ) {
        let stdout = self.stdout.map(|r| chunked_stream(r, DemuxFrame::Stdout as fn(Vec<u8>) -> DemuxFrame));
        let stderr = self.stderr.map(|r| chunked_stream(r, DemuxFrame::Stderr as fn(Vec<u8>) -> DemuxFrame));
        let merged: Pin<Box<dyn Stream<Item = std::io::Result<DemuxFrame>> + Send>> = match (stdout, stderr) {
            (Some(o), Some(e)) => Box::pin(futures_util::stream::select(o, e)),
            (Some(o), None) => Box::pin(o),
            (None, Some(e)) => Box::pin(e),
            (None, None) => Box::pin(futures_util::stream::empty()),
        };
        (Box::pin(self.stdin), merged)
    }
}

/// Turns a raw byte stream into a stream of tagged chunks, polling the
/// reader in a loop since `kube`'s attach streams don't implement
/// `futures::Stream` directly.
fn chunked_stream(
    reader: Pin<Box<dyn AsyncRead + Send>>,
    tag: fn(Vec<u8>) -> DemuxFrame,
) -> Pin<Box<dyn Stream<Item = std::io::Result<DemuxFrame>> + Send>> {
    Box::pin(futures_util::stream::unfold(reader, move |mut reader| async move {
        let mut buf = vec![0u8; 4096];
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => None,
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(tag(buf)), reader))
            }
        }
    }))
}

async fn exec_with_stdin(pods: &Api<Pod>, pod_name: &str, container_name: &str, command: Vec<String>, stdin_data: Vec<u8>) -> Result<Vec<u8>> {
    let params = AttachParams::default().container(container_name).stdin(true).stdout(true).stderr(false);
    let mut proc = pods.exec(pod_name, command, &params).await.map_err(runtime_err("exec into pod"))?;
    if let Some(mut writer) = proc.stdin() {
        use tokio::io::AsyncWriteExt;
        writer.write_all(&stdin_data).await.map_err(|e| Error::RuntimeFailure { message: "writing exec stdin".into(), source: Some(e.into()) })?;
    }
    let mut out = Vec::new();
    if let Some(mut reader) = proc.stdout() {
        reader.read_to_end(&mut out).await.map_err(|e| Error::RuntimeFailure { message: "reading exec stdout".into(), source: Some(e.into()) })?;
    }
    let _ = proc.join().await;
    Ok(out)
}

async fn exec_capture_stdout(pods: &Api<Pod>, pod_name: &str, container_name: &str, command: Vec<String>) -> Result<Vec<u8>> {
    exec_with_stdin(pods, pod_name, container_name, command, Vec::new()).await
}

const TAR_BLOCK: usize = 512;

/// Reads an exec stdout that is streaming a tar archive. The remote `tar`
/// keeps writing NUL bytes after its own end-of-archive marker (two
/// consecutive zero blocks) rather than closing the pipe, so this stops as
/// soon as it sees that marker instead of waiting on a close that may never
/// come.
async fn exec_capture_tar_stdout(pods: &Api<Pod>, pod_name: &str, container_name: &str, command: Vec<String>) -> Result<Vec<u8>> {
    let params = AttachParams::default().container(container_name).stdin(false).stdout(true).stderr(false);
    let mut proc = pods.exec(pod_name, command, &params).await.map_err(runtime_err("exec into pod"))?;
    let out = match proc.stdout() {
        Some(reader) => read_until_tar_eof(reader).await,
        None => Vec::new(),
    };
    let _ = proc.join().await;
    Ok(out)
}

async fn read_until_tar_eof<R: AsyncRead + Unpin>(mut reader: R) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) | Err(_) => return out,
            Ok(n) => n,
        };
        out.extend_from_slice(&buf[..n]);
        if let Some(offset) = tar_eof_offset(&out) {
            out.truncate(offset);
            return out;
        }
    }
}

/// Byte offset just past the second consecutive all-zero 512-byte block, if
/// one has appeared in `data` yet.
fn tar_eof_offset(data: &[u8]) -> Option<usize> {
    let mut zero_blocks = 0usize;
    for (i, chunk) in data.chunks(TAR_BLOCK).enumerate() {
        if chunk.len() == TAR_BLOCK && chunk.iter().all(|&b| b == 0) {
            zero_blocks += 1;
            if zero_blocks >= 2 {
                return Some((i + 1) * TAR_BLOCK);
            }
        } else {
            zero_blocks = 0;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_id_separates_namespace_pod_and_container() {
        let (ns, pod, container) = KubernetesProvider::split_id("default/launchr-abc/action").unwrap();
        assert_eq!(ns, "default");
        assert_eq!(pod, "launchr-abc");
        assert_eq!(container, "action");
    }

    #[test]
    fn split_id_rejects_malformed_input() {
        assert!(KubernetesProvider::split_id("no-slashes").is_err());
    }

    #[test]
    fn translate_linux_mode_flags_directories_and_permissions() {
        // 0o040755: S_IFDIR | rwxr-xr-x
        let mode = translate_linux_mode(0o040755);
        assert_eq!(mode & MODE_DIR, MODE_DIR);
        assert_eq!(mode & PERM_MASK, 0o755);
    }

    #[test]
    fn translate_linux_mode_flags_symlinks() {
        let mode = translate_linux_mode(0o120777);
        assert_eq!(mode & MODE_SYMLINK, MODE_SYMLINK);
    }

    #[test]
    fn tar_eof_offset_finds_the_end_of_archive_marker() {
        let mut payload = vec![1u8; TAR_BLOCK];
        payload.extend(std::iter::repeat(0u8).take(TAR_BLOCK * 2));
        // simulate the remote process continuing to stream NULs forever
        // after the archive's logical end.
        payload.extend(std::iter::repeat(0u8).take(TAR_BLOCK * 50));
        assert_eq!(tar_eof_offset(&payload), Some(TAR_BLOCK * 3));
    }

    #[test]
    fn tar_eof_offset_is_none_without_two_consecutive_zero_blocks() {
        let payload = vec![1u8; TAR_BLOCK * 4];
        assert_eq!(tar_eof_offset(&payload), None);
    }
}
