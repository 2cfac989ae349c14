//! Executes the host command, inheriting env and stdio (spec §4.8).

use std::path::PathBuf;

use crate::action::manifest::ShellRuntimeManifest;
use crate::cancel::CancelToken;
use crate::error::{Error, Result};

pub struct ShellExecutor {
    command: Vec<String>,
    working_dir: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl ShellExecutor {
    pub fn new(manifest: &ShellRuntimeManifest, action_working_dir: PathBuf) -> Self {
        Self {
            command: manifest.command.clone(),
            working_dir: manifest.working_dir.clone().map(PathBuf::from).or(Some(action_working_dir)),
            env: manifest.env.0.clone(),
        }
    }

    /// Runs `command[0] command[1..]` with `env = process-env + action.env`.
    /// Cancellation kills the whole process group; the exit code is
    /// forwarded verbatim.
    pub async fn execute(&self, mut cancel: CancelToken) -> Result<i32> {
        let (program, args) = self.command.split_first().ok_or_else(|| Error::RuntimeFailure {
            message: "shell action has an empty command".into(),
            source: None,
        })?;

        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        for (k, v) in &self.env {
            cmd.env(k, v);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().map_err(|e| Error::RuntimeFailure {
            message: format!("spawning {program}"),
            source: Some(e.into()),
        })?;

        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|e| Error::RuntimeFailure {
                    message: "waiting for shell process".into(),
                    source: Some(e.into()),
                })?;
                Ok(status.code().unwrap_or(1))
            }
            _ = cancel.cancelled() => {
                kill_process_group(&child);
                let _ = child.wait().await;
                Err(Error::Cancelled)
            }
        }
    }
}

#[cfg(unix)]
fn kill_process_group(child: &tokio::process::Child) {
    if let Some(pid) = child.id() {
        let pgid = nix::unistd::Pid::from_raw(pid as i32);
        let _ = nix::sys::signal::killpg(pgid, nix::sys::signal::Signal::SIGTERM);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &tokio::process::Child) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::manifest::EnvSlice;

    #[tokio::test]
    async fn echoes_expected_stdout() {
        let manifest = ShellRuntimeManifest {
            command: vec!["sh".into(), "-c".into(), "echo hi there".into()],
            working_dir: None,
            env: EnvSlice::default(),
        };
        let executor = ShellExecutor::new(&manifest, std::env::temp_dir());
        let (_handle, token) = crate::cancel::channel();
        let code = executor.execute(token).await.unwrap();
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn forwards_nonzero_exit_code() {
        let manifest = ShellRuntimeManifest {
            command: vec!["sh".into(), "-c".into(), "exit 7".into()],
            working_dir: None,
            env: EnvSlice::default(),
        };
        let executor = ShellExecutor::new(&manifest, std::env::temp_dir());
        let (_handle, token) = crate::cancel::channel();
        let code = executor.execute(token).await.unwrap();
        assert_eq!(code, 7);
    }

    #[tokio::test]
    async fn empty_command_is_a_runtime_failure() {
        let manifest = ShellRuntimeManifest {
            command: vec![],
            working_dir: None,
            env: EnvSlice::default(),
        };
        let executor = ShellExecutor::new(&manifest, std::env::temp_dir());
        let (_handle, token) = crate::cancel::channel();
        assert!(executor.execute(token).await.is_err());
    }
}
