//! Render bridge: runs the adapter process for one template and reads its output back.

use crate::{
    BridgeConfig, Error, FailureMode, RenderRequest, Result, ScratchFile, TemplateContext,
    FATAL_TEMPLATE_ERROR,
};
use log::{debug, warn};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

/// Renders templates by invoking `<template_dir>/<adapter_name>`.
///
/// The bridge holds no per-call state, so one instance can serve any number
/// of threads concurrently.
#[derive(Debug, Clone)]
pub struct RenderBridge {
    template_dir: PathBuf,
    config: BridgeConfig,
}

impl RenderBridge {
    /// Create a bridge for the templates (and adapter) in `template_dir`.
    ///
    /// The directory itself is not checked; a missing adapter surfaces as
    /// `Error::Launch` on the first render.
    pub fn new(template_dir: impl Into<PathBuf>, config: BridgeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            template_dir: template_dir.into(),
            config,
        })
    }

    pub fn template_dir(&self) -> &Path {
        &self.template_dir
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Path of the adapter executable used for renders in `template_dir`.
    pub fn adapter_path(&self) -> PathBuf {
        self.template_dir.join(&self.config.adapter_name)
    }

    /// Render `template_name` from this bridge's template directory.
    pub fn render(&self, template_name: &str, context: &TemplateContext) -> Result<Vec<u8>> {
        self.run(&self.template_dir, template_name, context)
    }

    /// Render a request that carries its own template directory.
    pub fn render_request(&self, request: &RenderRequest) -> Result<Vec<u8>> {
        self.run(
            request.template_dir(),
            request.template_name(),
            request.context(),
        )
    }

    fn run(
        &self,
        template_dir: &Path,
        template_name: &str,
        context: &TemplateContext,
    ) -> Result<Vec<u8>> {
        // Encode first so a bad context never spawns anything
        let payload = serde_json::to_vec(context)?;

        // Removed on every return path below
        let scratch = ScratchFile::create_in(&self.config.scratch_dir())?;

        let program = template_dir.join(&self.config.adapter_name);
        debug!(
            "launching adapter {} for template {} -> {}",
            program.display(),
            template_name,
            scratch.path().display()
        );

        let mut command = Command::new(&program);
        command
            .arg(template_dir)
            .arg(template_name)
            .arg(scratch.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        // Own process group, so a timeout also takes down background children
        #[cfg(unix)]
        std::os::unix::process::CommandExt::process_group(&mut command, 0);

        let started = Instant::now();
        let mut child = command.spawn().map_err(|source| Error::Launch {
            program: program.clone(),
            source,
        })?;

        let writer = child
            .stdin
            .take()
            .map(|stdin| spawn_piped(move || write_context(stdin, &payload)));
        let limit = self.config.stderr_limit;
        let stderr_buf = Arc::new(Mutex::new(Vec::new()));
        let reader = child.stderr.take().map(|stderr| {
            let buf = stderr_buf.clone();
            spawn_piped(move || collect_stderr(stderr, limit, &buf))
        });

        // Pipe threads are never joined on error: background children of the
        // adapter may still hold the pipes open.
        let status = self.wait(&mut child)?;

        // The adapter has exited. Anything still holding its pipes is a
        // background child, so the pipes get a short, bounded drain window.
        let drain_until = match self.config.timeout() {
            Some(deadline) => {
                let left = deadline.saturating_sub(started.elapsed());
                Instant::now() + left.min(PIPE_DRAIN_GRACE)
            }
            None => Instant::now() + PIPE_DRAIN_GRACE,
        };
        if let Some(done) = writer {
            finish_stdin_writer(&done, drain_until);
        }
        if let Some(done) = reader {
            if let Err(RecvTimeoutError::Timeout) =
                done.recv_timeout(drain_until.saturating_duration_since(Instant::now()))
            {
                warn!("adapter left a background process holding stderr, not waiting for it");
            }
        }
        let stderr = stderr_buf
            .lock()
            .map(|kept| String::from_utf8_lossy(&kept).into_owned())
            .unwrap_or_default();

        debug!(
            "adapter for {} exited with {} ({} bytes of stderr)",
            template_name,
            status,
            stderr.len()
        );
        self.settle(template_name, status, stderr, &scratch)
    }

    /// Wait for the adapter, killing it when the deadline passes.
    fn wait(&self, child: &mut Child) -> Result<ExitStatus> {
        let Some(deadline) = self.config.timeout() else {
            return Ok(child.wait()?);
        };

        match child.wait_timeout(deadline) {
            Ok(Some(status)) => Ok(status),
            Ok(None) => {
                warn!(
                    "adapter pid {} exceeded {}ms, killing it",
                    child.id(),
                    self.config.timeout_ms
                );
                kill_and_reap(child);
                Err(Error::Timeout(self.config.timeout_ms))
            }
            Err(e) => {
                kill_and_reap(child);
                Err(Error::Io(e))
            }
        }
    }

    /// Map the exit status and scratch contents to the render result.
    fn settle(
        &self,
        template_name: &str,
        status: ExitStatus,
        stderr: String,
        scratch: &ScratchFile,
    ) -> Result<Vec<u8>> {
        let strict = self.config.failure_mode == FailureMode::Strict;

        if !status.success() {
            if strict {
                return Err(Error::RenderFailure {
                    status: status.code(),
                    stderr,
                });
            }
            warn!(
                "adapter exited with {} while rendering {}: {}",
                status,
                template_name,
                stderr.trim()
            );
        }

        match scratch.read() {
            Ok(output) => Ok(output),
            Err(e) if strict => {
                debug!("scratch file {} unreadable: {}", scratch.path().display(), e);
                Err(Error::RenderFailure {
                    status: status.code(),
                    stderr,
                })
            }
            Err(e) => {
                warn!(
                    "no output for {} ({}), returning fatal template error",
                    template_name, e
                );
                Ok(FATAL_TEMPLATE_ERROR.to_vec())
            }
        }
    }
}

/// How long pipe threads may keep running once the adapter itself has exited.
const PIPE_DRAIN_GRACE: Duration = Duration::from_millis(250);

// Runs `job` on its own thread; the receiver yields its result once done.
fn spawn_piped<T, F>(job: F) -> Receiver<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(job());
    });
    rx
}

// Writes the context then drops stdin so the adapter sees EOF.
fn write_context(mut stdin: ChildStdin, payload: &[u8]) -> io::Result<()> {
    stdin.write_all(payload)?;
    stdin.flush()
}

fn finish_stdin_writer(done: &Receiver<io::Result<()>>, until: Instant) {
    match done.recv_timeout(until.saturating_duration_since(Instant::now())) {
        Ok(Ok(())) => {}
        // Adapter exited without consuming its input
        Ok(Err(e)) if e.kind() == io::ErrorKind::BrokenPipe => {
            debug!("adapter closed stdin before reading the full context")
        }
        Ok(Err(e)) => warn!("failed to write context to adapter: {}", e),
        Err(RecvTimeoutError::Timeout) => {
            warn!("adapter left a background process holding stdin, not waiting for it")
        }
        Err(RecvTimeoutError::Disconnected) => warn!("context writer thread panicked"),
    }
}

// Keeps the first `limit` bytes in `kept` and drains the rest so the adapter
// never blocks on a full pipe.
fn collect_stderr(mut stderr: impl Read, limit: usize, kept: &Mutex<Vec<u8>>) {
    let mut chunk = [0u8; 8192];
    loop {
        match stderr.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                if let Ok(mut kept) = kept.lock() {
                    let room = limit.saturating_sub(kept.len());
                    kept.extend_from_slice(&chunk[..n.min(room)]);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!("stopped reading adapter stderr: {}", e);
                break;
            }
        }
    }
}

fn kill_and_reap(child: &mut Child) {
    #[cfg(unix)]
    {
        // SAFETY: the adapter leads its own group and is not reaped yet, so its
        // pid still names that group.
        let pgid = child.id() as libc::pid_t;
        if unsafe { libc::killpg(pgid, libc::SIGKILL) } != 0 {
            warn!(
                "failed to kill adapter process group {}: {}",
                pgid,
                io::Error::last_os_error()
            );
            if let Err(e) = child.kill() {
                warn!("failed to kill adapter pid {}: {}", child.id(), e);
            }
        }
    }
    #[cfg(not(unix))]
    if let Err(e) = child.kill() {
        warn!("failed to kill adapter pid {}: {}", child.id(), e);
    }
    if let Err(e) = child.wait() {
        warn!("failed to reap adapter pid {}: {}", child.id(), e);
    }
}
