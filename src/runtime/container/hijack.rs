//! Stream hijacking: pumps stdin into the container, demuxes stdout/stderr
//! back out, forwards terminal resizes and signals, and watches for the
//! Ctrl-P Ctrl-Q detach sequence when attached to a TTY (spec §4.10,
//! "Attached I/O").

use std::pin::Pin;
use std::sync::Arc;

use bollard::container::LogOutput;
use futures_util::{Stream, StreamExt};
use nix::sys::signal::Signal;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::streams::Streams;

use super::{AttachedIo, ContainerProvider, ExitStatus};

#[derive(Debug, Clone)]
pub enum DemuxFrame {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
}

const DETACH_SEQUENCE: [u8; 2] = [0x10, 0x11]; // Ctrl-P, Ctrl-Q

pub struct DockerAttachedIo {
    input: Pin<Box<dyn AsyncWrite + Send>>,
    output: Pin<Box<dyn Stream<Item = std::io::Result<DemuxFrame>> + Send>>,
}

impl DockerAttachedIo {
    pub fn new(
        output: impl Stream<Item = std::result::Result<LogOutput, bollard::errors::Error>> + Send + 'static,
        input: Pin<Box<dyn AsyncWrite + Send>>,
    ) -> Self {
        let mapped = output.filter_map(|item| async move {
            match item {
                Ok(LogOutput::StdOut { message }) => Some(Ok(DemuxFrame::Stdout(message.to_vec()))),
                Ok(LogOutput::StdErr { message }) => Some(Ok(DemuxFrame::Stderr(message.to_vec()))),
                Ok(LogOutput::Console { message }) => Some(Ok(DemuxFrame::Stdout(message.to_vec()))),
                Ok(LogOutput::StdIn { .. }) => None,
                Err(e) => Some(Err(std::io::Error::other(e.to_string()))),
            }
        });
        Self { input, output: Box::pin(mapped) }
    }
}

impl AttachedIo for DockerAttachedIo {
    fn into_parts(
        self: Box<Self>,
    ) -> (
        Pin<Box<dyn AsyncWrite + Send>>,
        Pin<Box<dyn Stream<Item = std::io::Result<DemuxFrame>> + Send>>,
    ) {
        (self.input, self.output)
    }
}

/// Runs the concurrent pumps (stdin-in, stdout/stderr-out, resize-on-SIGWINCH,
/// signal forwarding) until the container exits, is cancelled, or the
/// operator detaches with Ctrl-P Ctrl-Q.
pub async fn drive(
    io: Option<Box<dyn AttachedIo>>,
    mut status_rx: mpsc::Receiver<ExitStatus>,
    streams: &Streams,
    mut cancel: CancelToken,
    provider: &Arc<dyn ContainerProvider>,
    cid: &str,
) -> Result<ExitStatus> {
    let Some(io) = io else {
        return status_rx.recv().await.ok_or(Error::RuntimeFailure {
            message: "container exited without reporting a status".into(),
            source: None,
        });
    };

    let restore_guard = raw_mode_guard();
    let (mut stdin_writer, mut output) = io.into_parts();
    let mut winch = signal(SignalKind::window_change()).ok();
    let mut sig_rx = spawn_signal_forwarder();

    let mut stdin_task = Box::pin(async move {
        let mut input = tokio::io::stdin();
        let mut buf = [0u8; 4096];
        let mut detach_watch = [0u8; 2];
        loop {
            let n = match tokio::io::AsyncReadExt::read(&mut input, &mut buf).await {
                Ok(0) | Err(_) => return None,
                Ok(n) => n,
            };
            for &byte in &buf[..n] {
                detach_watch[0] = detach_watch[1];
                detach_watch[1] = byte;
                if detach_watch == DETACH_SEQUENCE {
                    return Some(());
                }
            }
            if stdin_writer.write_all(&buf[..n]).await.is_err() {
                return None;
            }
        }
    });

    loop {
        tokio::select! {
            frame = output.next() => {
                match frame {
                    Some(Ok(DemuxFrame::Stdout(bytes))) => streams.write_out_bytes(&bytes),
                    Some(Ok(DemuxFrame::Stderr(bytes))) => streams.write_err_bytes(&bytes),
                    Some(Err(_)) | None => {}
                }
            }
            status = status_rx.recv() => {
                drop(restore_guard);
                return status.ok_or(Error::RuntimeFailure { message: "status channel closed".into(), source: None });
            }
            detached = &mut stdin_task => {
                if detached.is_some() {
                    drop(restore_guard);
                    return Ok(ExitStatus::Detached);
                }
            }
            resized = async {
                match winch.as_mut() {
                    Some(w) => w.recv().await,
                    None => std::future::pending().await,
                }
            } => {
                if resized.is_some() {
                    if let Ok((cols, rows)) = crossterm::terminal::size() {
                        let _ = provider.container_resize(cid, rows, cols).await;
                    }
                }
            }
            sig = sig_rx.recv() => {
                if let Some(name) = sig {
                    let _ = provider.container_kill(cid, name).await;
                }
            }
            _ = cancel.cancelled() => {
                drop(restore_guard);
                return Err(Error::Cancelled);
            }
        }
    }
}

/// Every signal except SIGCHLD, SIGPIPE, and SIGURG is forwarded to the
/// container as-is (spec §4.10 Signals subsystem); SIGWINCH is handled
/// separately to drive a resize rather than a kill, and SIGKILL/SIGSTOP
/// can't be caught at all.
const UNFORWARDED_SIGNALS: [Signal; 3] = [Signal::SIGCHLD, Signal::SIGPIPE, Signal::SIGURG];

fn spawn_signal_forwarder() -> mpsc::Receiver<&'static str> {
    let (tx, rx) = mpsc::channel(16);
    for sig in Signal::iterator() {
        if sig == Signal::SIGKILL || sig == Signal::SIGSTOP || sig == Signal::SIGWINCH || UNFORWARDED_SIGNALS.contains(&sig) {
            continue;
        }
        let Ok(mut stream) = signal(SignalKind::from_raw(sig as i32)) else {
            continue;
        };
        let tx = tx.clone();
        tokio::spawn(async move {
            while stream.recv().await.is_some() {
                if tx.send(sig.as_str()).await.is_err() {
                    break;
                }
            }
        });
    }
    rx
}

/// Enables raw mode for the duration of the attach and guarantees restore
/// via `Drop`, mirroring a `sync.Once`-guarded terminal reset.
struct RawModeGuard {
    active: bool,
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.active {
            let _ = crossterm::terminal::disable_raw_mode();
        }
    }
}

fn raw_mode_guard() -> RawModeGuard {
    use std::io::IsTerminal;
    if std::io::stdin().is_terminal() && crossterm::terminal::enable_raw_mode().is_ok() {
        RawModeGuard { active: true }
    } else {
        RawModeGuard { active: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detach_sequence_is_ctrl_p_ctrl_q() {
        assert_eq!(DETACH_SEQUENCE, [0x10, 0x11]);
    }

    #[test]
    fn sigwinch_and_the_excluded_signals_are_never_forwarded() {
        assert!(!UNFORWARDED_SIGNALS.contains(&Signal::SIGTERM));
        assert!(UNFORWARDED_SIGNALS.contains(&Signal::SIGCHLD));
        assert!(UNFORWARDED_SIGNALS.contains(&Signal::SIGPIPE));
        assert!(UNFORWARDED_SIGNALS.contains(&Signal::SIGURG));
    }
}
