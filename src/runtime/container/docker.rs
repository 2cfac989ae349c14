//! The default container provider: talks to a local Docker daemon over its
//! UNIX socket via `bollard`.

use std::io::Cursor;

use bollard::container::{
    AttachContainerOptions, AttachContainerResults, Config, CreateContainerOptions,
    DownloadFromContainerOptions, KillContainerOptions, RemoveContainerOptions,
    StopContainerOptions, UploadToContainerOptions, WaitContainerOptions,
};
use bollard::image::{BuildImageOptions, CreateImageOptions};
use bollard::Docker;
use futures_util::stream::StreamExt;
use tokio::sync::mpsc;

use crate::error::{Error, Result};

use super::{
    AttachedIo, ContainerProvider, ContainerSpec, ExitStatus, FileStat, ImageStatus,
    ProgressEvent, StopOptions,
};

pub struct DockerProvider {
    client: Docker,
}

impl DockerProvider {
    pub fn connect() -> Result<Self> {
        let client = Docker::connect_with_local_defaults().map_err(runtime_err("connecting to docker"))?;
        Ok(Self { client })
    }

    /// Cheap reachability probe used by the default-provider selection
    /// (SPEC_FULL §B.3): a live daemon answers `info` quickly.
    pub async fn is_reachable() -> bool {
        match Docker::connect_with_local_defaults() {
            Ok(client) => client.info().await.is_ok(),
            Err(_) => false,
        }
    }

    fn container_config(spec: &ContainerSpec) -> Config<String> {
        let env = (!spec.env.is_empty()).then(|| spec.env.clone());
        let cmd = (!spec.command.is_empty()).then(|| spec.command.clone());
        let binds: Vec<String> = spec
            .volumes
            .iter()
            .map(|v| format!("{}:{}", v.name, v.mount_path))
            .chain(spec.binds.iter().cloned())
            .collect();

        Config {
            image: Some(spec.image.clone()),
            entrypoint: spec.entrypoint.clone(),
            cmd,
            env,
            working_dir: spec.working_dir.clone(),
            user: spec.user.clone(),
            hostname: spec.hostname.clone(),
            tty: Some(spec.tty),
            attach_stdin: Some(spec.attach_stdin),
            attach_stdout: Some(spec.attach_stdout),
            attach_stderr: Some(spec.attach_stderr),
            open_stdin: Some(spec.attach_stdin),
            host_config: Some(bollard::models::HostConfig {
                binds: Some(binds),
                extra_hosts: Some(spec.extra_hosts.clone()),
                network_mode: spec.network_mode.clone(),
                auto_remove: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

fn runtime_err(message: &'static str) -> impl Fn(bollard::errors::Error) -> Error {
    move |source| Error::RuntimeFailure {
        message: message.into(),
        source: Some(source.into()),
    }
}

#[async_trait::async_trait]
impl ContainerProvider for DockerProvider {
    async fn info(&self) -> Result<String> {
        let info = self.client.info().await.map_err(runtime_err("docker info"))?;
        Ok(info.server_version.unwrap_or_else(|| "unknown".into()))
    }

    async fn image_ensure(&self, spec: &ContainerSpec, progress: mpsc::Sender<ProgressEvent>) -> Result<ImageStatus> {
        if self.client.inspect_image(&spec.image).await.is_ok() && !spec.force_rebuild {
            return Ok(ImageStatus::Exists);
        }

        if let Some(build) = &spec.build {
            let tar = build_context_tar(&build.context, build.buildfile.as_deref())?;
            let options = BuildImageOptions {
                dockerfile: build.buildfile.clone().unwrap_or_else(|| "Dockerfile".into()),
                t: build.tags.first().cloned().unwrap_or_else(|| spec.image.clone()),
                buildargs: build.args.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                nocache: spec.no_cache,
                rm: true,
                ..Default::default()
            };
            let mut stream = self.client.build_image(options, None, Some(tar.into()));
            while let Some(chunk) = stream.next().await {
                let info = chunk.map_err(runtime_err("building image"))?;
                if let Some(line) = info.stream {
                    let _ = progress.send(ProgressEvent { message: line }).await;
                }
            }
            return Ok(ImageStatus::Built);
        }

        let options = CreateImageOptions {
            from_image: spec.image.clone(),
            ..Default::default()
        };
        let mut stream = self.client.create_image(Some(options), None, None);
        while let Some(chunk) = stream.next().await {
            let info = chunk.map_err(runtime_err("pulling image"))?;
            if let Some(status) = info.status {
                let _ = progress.send(ProgressEvent { message: status }).await;
            }
        }
        Ok(ImageStatus::Pulled)
    }

    async fn image_remove(&self, image: &str) -> Result<()> {
        self.client
            .remove_image(image, None, None)
            .await
            .map_err(runtime_err("removing image"))?;
        Ok(())
    }

    async fn container_create(&self, spec: &ContainerSpec) -> Result<String> {
        let name = format!("launchr-{}", uuid::Uuid::new_v4());
        let options = CreateContainerOptions { name, platform: None };
        let response = self
            .client
            .create_container(Some(options), Self::container_config(spec))
            .await
            .map_err(runtime_err("creating container"))?;
        Ok(response.id)
    }

    async fn container_start(
        &self,
        cid: &str,
        spec: &ContainerSpec,
    ) -> Result<(mpsc::Receiver<ExitStatus>, Option<Box<dyn AttachedIo>>)> {
        let AttachContainerResults { output, input } = self
            .client
            .attach_container(
                cid,
                Some(AttachContainerOptions::<String> {
                    stdin: Some(spec.attach_stdin),
                    stdout: Some(spec.attach_stdout),
                    stderr: Some(spec.attach_stderr),
                    stream: Some(true),
                    logs: Some(false),
                    ..Default::default()
                }),
            )
            .await
            .map_err(runtime_err("attaching to container"))?;

        self.client
            .start_container::<String>(cid, None)
            .await
            .map_err(runtime_err("starting container"))?;

        let (tx, rx) = mpsc::channel(1);
        let client = self.client.clone();
        let cid_owned = cid.to_string();
        tokio::spawn(async move {
            let mut wait_stream = client.wait_container(&cid_owned, None::<WaitContainerOptions<String>>);
            let code = match wait_stream.next().await {
                Some(Ok(body)) => body.status_code as i32,
                Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => code as i32,
                _ => 1,
            };
            let _ = tx.send(ExitStatus::Exited(code)).await;
        });

        let io: Box<dyn AttachedIo> = Box::new(super::hijack::DockerAttachedIo::new(output, input));
        Ok((rx, Some(io)))
    }

    async fn container_stop(&self, cid: &str, opts: StopOptions) -> Result<()> {
        self.client
            .stop_container(cid, Some(StopContainerOptions { t: opts.timeout_secs as i64 }))
            .await
            .map_err(runtime_err("stopping container"))?;
        Ok(())
    }

    async fn container_kill(&self, cid: &str, signal: &str) -> Result<()> {
        self.client
            .kill_container(cid, Some(KillContainerOptions { signal: signal.to_string() }))
            .await
            .map_err(runtime_err("killing container"))?;
        Ok(())
    }

    async fn container_remove(&self, cid: &str) -> Result<()> {
        self.client
            .remove_container(cid, Some(RemoveContainerOptions { force: true, v: true, ..Default::default() }))
            .await
            .map_err(runtime_err("removing container"))?;
        Ok(())
    }

    async fn copy_to_container(&self, cid: &str, dest_path: &str, data: Vec<u8>) -> Result<()> {
        self.client
            .upload_to_container(
                cid,
                Some(UploadToContainerOptions { path: dest_path.to_string(), ..Default::default() }),
                data.into(),
            )
            .await
            .map_err(runtime_err("copying into container"))?;
        Ok(())
    }

    async fn copy_from_container(&self, cid: &str, src_path: &str) -> Result<Vec<u8>> {
        let mut stream = self.client.download_from_container(
            cid,
            Some(DownloadFromContainerOptions { path: src_path.to_string() }),
        );
        let mut buf = Vec::new();
        while let Some(chunk) = stream.next().await {
            buf.extend_from_slice(&chunk.map_err(runtime_err("copying from container"))?);
        }
        Ok(buf)
    }

    async fn container_resize(&self, cid: &str, rows: u16, cols: u16) -> Result<()> {
        self.client
            .resize_container_tty(cid, bollard::container::ResizeContainerTtyOptions { height: rows, width: cols })
            .await
            .map_err(runtime_err("resizing container tty"))?;
        Ok(())
    }

    async fn container_stat_path(&self, cid: &str, path: &str) -> Result<FileStat> {
        let raw = self.copy_from_container(cid, path).await?;
        let mut archive = tar::Archive::new(Cursor::new(raw));
        let mut entries = archive.entries().map_err(runtime_err("reading stat archive"))?;
        let entry = entries
            .next()
            .ok_or_else(|| Error::RuntimeFailure { message: format!("{path} not found in container"), source: None })?
            .map_err(runtime_err("reading stat entry"))?;
        let header = entry.header();
        Ok(FileStat {
            name: entry.path().map_err(runtime_err("decoding entry path"))?.display().to_string(),
            size: header.size().unwrap_or(0),
            mode: header.mode().unwrap_or(0),
            mtime: header.mtime().unwrap_or(0) as i64,
            link_target: header.link_name().ok().flatten().map(|p| p.display().to_string()),
        })
    }
}

/// Builds a tar archive of the build context for `docker build`-style
/// image construction.
fn build_context_tar(context_dir: &str, _buildfile: Option<&str>) -> Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    builder
        .append_dir_all(".", context_dir)
        .map_err(|e| Error::RuntimeFailure {
            message: format!("packing build context {context_dir}"),
            source: Some(e.into()),
        })?;
    builder.into_inner().map_err(|e| Error::RuntimeFailure {
        message: "finalizing build context archive".into(),
        source: Some(e.into()),
    })
}

