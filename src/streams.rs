//! In/Out/Err stream abstraction with TTY state and a masked/noop variant.

use std::io::{self, IsTerminal, Read, Write};
use std::sync::Mutex;

/// Input stream: wraps a reader, exposes raw-terminal control.
pub trait InStream: Read + Send {
    fn set_raw_terminal(&mut self) -> io::Result<()>;
    fn restore_terminal(&mut self) -> io::Result<()>;
    fn is_terminal(&self) -> bool;
}

/// Output stream: wraps a writer, exposes tty size and raw-terminal control.
pub trait OutStream: Write + Send {
    fn tty_size(&self) -> Option<(u16, u16)>;
    fn is_terminal(&self) -> bool;
    fn set_raw_terminal(&mut self) -> io::Result<()> {
        Ok(())
    }
    fn restore_terminal(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Stdin wrapper. Raw mode is process-global (crossterm toggles the real
/// terminal), so `set_raw_terminal`/`restore_terminal` are no-ops when stdin
/// isn't a tty.
pub struct Stdin {
    raw: bool,
}

impl Stdin {
    pub fn new() -> Self {
        Self { raw: false }
    }
}

impl Default for Stdin {
    fn default() -> Self {
        Self::new()
    }
}

impl Read for Stdin {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::stdin().read(buf)
    }
}

impl InStream for Stdin {
    fn set_raw_terminal(&mut self) -> io::Result<()> {
        if self.is_terminal() {
            crossterm::terminal::enable_raw_mode()?;
            self.raw = true;
        }
        Ok(())
    }

    fn restore_terminal(&mut self) -> io::Result<()> {
        if self.raw {
            crossterm::terminal::disable_raw_mode()?;
            self.raw = false;
        }
        Ok(())
    }

    fn is_terminal(&self) -> bool {
        io::stdin().is_terminal()
    }
}

/// Stdout/Stderr wrapper sharing the same tty-size logic.
pub struct StdWriter {
    target: StdTarget,
}

enum StdTarget {
    Out,
    Err,
}

impl StdWriter {
    pub fn out() -> Self {
        Self {
            target: StdTarget::Out,
        }
    }

    pub fn err() -> Self {
        Self {
            target: StdTarget::Err,
        }
    }
}

impl Write for StdWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.target {
            StdTarget::Out => io::stdout().write(buf),
            StdTarget::Err => io::stderr().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.target {
            StdTarget::Out => io::stdout().flush(),
            StdTarget::Err => io::stderr().flush(),
        }
    }
}

impl OutStream for StdWriter {
    fn tty_size(&self) -> Option<(u16, u16)> {
        if !self.is_terminal() {
            return None;
        }
        crossterm::terminal::size().ok().map(|(cols, rows)| (rows, cols))
    }

    fn is_terminal(&self) -> bool {
        match self.target {
            StdTarget::Out => io::stdout().is_terminal(),
            StdTarget::Err => io::stderr().is_terminal(),
        }
    }
}

/// Wraps a writer, replacing any registered sensitive substring with `***`
/// before it reaches the underlying sink.
pub struct MaskedWriter<W: Write> {
    inner: W,
    secrets: Vec<String>,
}

impl<W: Write> MaskedWriter<W> {
    pub fn new(inner: W, secrets: Vec<String>) -> Self {
        Self { inner, secrets }
    }

    pub fn register_secret(&mut self, secret: impl Into<String>) {
        let secret = secret.into();
        if !secret.is_empty() {
            self.secrets.push(secret);
        }
    }
}

impl<W: Write> Write for MaskedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.secrets.is_empty() {
            return self.inner.write(buf);
        }
        let mut text = String::from_utf8_lossy(buf).into_owned();
        for secret in &self.secrets {
            if !secret.is_empty() {
                text = text.replace(secret.as_str(), "***");
            }
        }
        self.inner.write_all(text.as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl OutStream for MaskedWriter<StdWriter> {
    fn tty_size(&self) -> Option<(u16, u16)> {
        self.inner.tty_size()
    }

    fn is_terminal(&self) -> bool {
        self.inner.is_terminal()
    }
}

/// Discards everything; selected when `--quiet` is on.
#[derive(Default)]
pub struct NoopWriter;

impl Write for NoopWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl OutStream for NoopWriter {
    fn tty_size(&self) -> Option<(u16, u16)> {
        None
    }
    fn is_terminal(&self) -> bool {
        false
    }
}

pub struct NoopReader;

impl Read for NoopReader {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Ok(0)
    }
}

impl InStream for NoopReader {
    fn set_raw_terminal(&mut self) -> io::Result<()> {
        Ok(())
    }
    fn restore_terminal(&mut self) -> io::Result<()> {
        Ok(())
    }
    fn is_terminal(&self) -> bool {
        false
    }
}

/// The three-channel stream bundle the rest of launchr is built against.
pub struct Streams {
    pub is_in: Mutex<Box<dyn InStream>>,
    pub out: Mutex<Box<dyn OutStream>>,
    pub err: Mutex<Box<dyn OutStream>>,
}

impl Streams {
    /// Standard OS streams with platform-aware terminal emulation.
    pub fn standard() -> Self {
        Self {
            is_in: Mutex::new(Box::new(Stdin::new())),
            out: Mutex::new(Box::new(StdWriter::out())),
            err: Mutex::new(Box::new(StdWriter::err())),
        }
    }

    /// All channels discarded; used when `--quiet` is set.
    pub fn noop() -> Self {
        Self {
            is_in: Mutex::new(Box::new(NoopReader)),
            out: Mutex::new(Box::new(NoopWriter)),
            err: Mutex::new(Box::new(NoopWriter)),
        }
    }

    pub fn print_out(&self, text: &str) {
        let mut out = self.out.lock().expect("streams out poisoned");
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }

    pub fn print_err(&self, text: &str) {
        let mut err = self.err.lock().expect("streams err poisoned");
        let _ = err.write_all(text.as_bytes());
        let _ = err.flush();
    }

    /// Raw byte write used by the container hijack driver, which forwards
    /// whatever the remote process emits without assuming UTF-8.
    pub fn write_out_bytes(&self, bytes: &[u8]) {
        let mut out = self.out.lock().expect("streams out poisoned");
        let _ = out.write_all(bytes);
        let _ = out.flush();
    }

    pub fn write_err_bytes(&self, bytes: &[u8]) {
        let mut err = self.err.lock().expect("streams err poisoned");
        let _ = err.write_all(bytes);
        let _ = err.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_streams_discard_everything() {
        let s = Streams::noop();
        s.print_out("hello");
        s.print_err("world");
        // No panic, nothing observable; the point is they don't touch stdio.
    }

    #[test]
    fn masked_writer_hides_registered_secret() {
        let mut buf = Vec::new();
        {
            let mut masked = MaskedWriter::new(&mut buf, vec!["s3cr3t".to_string()]);
            masked.write_all(b"token=s3cr3t;ok").unwrap();
        }
        assert_eq!(String::from_utf8(buf).unwrap(), "token=***;ok");
    }
}
