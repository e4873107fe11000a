//! Server management - spawning, watching and stopping the server under test

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::error::{HarnessError, HarnessResult};

/// How long to wait for the output readers to drain once the child is gone
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Lifecycle of one server instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    NotStarted,
    Starting,
    Running,
    Terminating,
    Stopped,
    Failed,
}

impl ProcessState {
    pub fn can_transition_to(self, next: ProcessState) -> bool {
        use ProcessState::*;
        matches!(
            (self, next),
            (NotStarted, Starting)
                | (Starting, Running)
                | (Starting, Terminating)
                | (Starting, Failed)
                | (Running, Terminating)
                | (Running, Failed)
                | (Terminating, Stopped)
                | (Terminating, Failed)
        )
    }

    /// Stopped and Failed release the port
    pub fn is_terminal(self) -> bool {
        matches!(self, ProcessState::Stopped | ProcessState::Failed)
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessState::NotStarted => "not-started",
            ProcessState::Starting => "starting",
            ProcessState::Running => "running",
            ProcessState::Terminating => "terminating",
            ProcessState::Stopped => "stopped",
            ProcessState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Configuration for spawning a server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Path to the tenrankai binary; relative paths resolve against
    /// `site_dir` on some platforms, so prefer an absolute path
    pub binary_path: PathBuf,

    /// Working directory for the server (the site checkout)
    pub site_dir: PathBuf,

    /// Configuration file, passed through as-is
    pub config_path: PathBuf,

    /// Port to listen on
    pub port: u16,

    /// Ask the server to exit on its own after this long
    pub quit_after: Option<Duration>,

    /// Subcommand selecting server mode
    pub subcommand: String,

    /// Time allowed between SIGTERM and SIGKILL
    pub grace_period: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            binary_path: PathBuf::from("tenrankai/target/release/tenrankai"),
            site_dir: PathBuf::from("tenrankai-dot-com"),
            config_path: PathBuf::from("config.toml"),
            port: 3456,
            quit_after: None,
            subcommand: "serve".to_string(),
            grace_period: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    /// Command-line arguments passed to the binary
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            self.subcommand.clone(),
            "--config".to_string(),
            self.config_path.to_string_lossy().into_owned(),
            "--port".to_string(),
            self.port.to_string(),
        ];
        if let Some(quit_after) = self.quit_after {
            args.push("--quit-after".to_string());
            args.push(quit_after.as_secs().to_string());
        }
        args
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }
}

/// Combined stdout/stderr of a server, line by line
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    lines: Arc<Mutex<Vec<String>>>,
}

impl OutputBuffer {
    pub fn push(&self, line: impl Into<String>) {
        self.lines.lock().push(line.into());
    }

    /// Last `n` lines
    pub fn tail(&self, n: usize) -> Vec<String> {
        let lines = self.lines.lock();
        let start = lines.len().saturating_sub(n);
        lines[start..].to_vec()
    }

    pub fn text(&self) -> String {
        self.lines.lock().join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }
}

/// Handle to one server process
pub struct ServerProcess {
    config: ServerConfig,
    child: Option<Child>,
    state: ProcessState,
    output: OutputBuffer,
    readers: Vec<JoinHandle<()>>,
    exit_status: Option<ExitStatus>,
}

impl ServerProcess {
    /// Spawn the server. Must be called from within a tokio runtime.
    pub fn start(config: ServerConfig) -> HarnessResult<Self> {
        let args = config.args();
        info!(
            "Starting {} {} (in {})",
            config.binary_path.display(),
            args.join(" "),
            config.site_dir.display()
        );

        let mut cmd = Command::new(&config.binary_path);
        cmd.args(&args)
            .current_dir(&config.site_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            HarnessError::StartupFailure(format!(
                "failed to spawn {}: {}",
                config.binary_path.display(),
                e
            ))
        })?;

        let output = OutputBuffer::default();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(capture(stdout, output.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(capture(stderr, output.clone()));
        }

        let mut process = Self {
            config,
            child: Some(child),
            state: ProcessState::NotStarted,
            output,
            readers,
            exit_status: None,
        };
        process.transition(ProcessState::Starting)?;
        debug!("Server pid {:?} on port {}", process.pid(), process.port());
        Ok(process)
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    pub fn base_url(&self) -> String {
        self.config.base_url()
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.id())
    }

    pub fn output(&self) -> &OutputBuffer {
        &self.output
    }

    /// Called once the readiness probe has seen the server answer
    pub fn mark_running(&mut self) -> HarnessResult<()> {
        self.transition(ProcessState::Running)
    }

    fn transition(&mut self, next: ProcessState) -> HarnessResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(HarnessError::InvalidStateTransition {
                from: self.state,
                to: next,
            });
        }
        debug!("Server on port {}: {} -> {}", self.config.port, self.state, next);
        self.state = next;
        Ok(())
    }

    /// Non-blocking check for an exited process. An exit observed before
    /// teardown moves the process to `Failed`.
    pub fn has_exited(&mut self) -> bool {
        if self.exit_status.is_some() {
            return true;
        }
        let Some(child) = self.child.as_mut() else {
            return true;
        };

        match child.try_wait() {
            Ok(Some(status)) => {
                warn!("Server on port {} exited unexpectedly: {}", self.config.port, status);
                self.exit_status = Some(status);
                if matches!(self.state, ProcessState::Starting | ProcessState::Running) {
                    self.state = ProcessState::Failed;
                }
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!("Could not poll server process: {}", e);
                false
            }
        }
    }

    /// Wait for the server to exit on its own
    pub async fn wait(&mut self) -> Option<ExitStatus> {
        if let Some(child) = self.child.as_mut() {
            match child.wait().await {
                Ok(status) => self.exit_status = Some(status),
                Err(e) => warn!("Waiting on server failed: {}", e),
            }
        }
        self.exit_status
    }

    /// Stop the server: SIGTERM, wait up to the grace period, then SIGKILL.
    /// Idempotent and infallible; problems are logged and appended to the
    /// captured output.
    pub async fn stop(&mut self) -> ProcessState {
        if self.child.is_none() {
            return self.state;
        }

        if self.state.is_terminal() || self.has_exited() {
            self.release().await;
            return self.state;
        }

        if let Err(e) = self.transition(ProcessState::Terminating) {
            warn!("{}", e);
        }
        info!("Stopping server (pid: {:?})", self.pid());

        self.request_shutdown();

        let grace = self.config.grace_period;
        let graceful = match self.child.as_mut() {
            Some(child) => timeout(grace, child.wait()).await,
            None => return self.state,
        };

        match graceful {
            Ok(Ok(status)) => {
                self.exit_status = Some(status);
                if !is_clean_exit(&status) {
                    self.note(format!("server exited with {} during shutdown", status));
                }
                self.state = ProcessState::Stopped;
            }
            Ok(Err(e)) => {
                self.note(format!("waiting for server shutdown failed: {}", e));
                self.force_kill().await;
            }
            Err(_) => {
                self.note(format!(
                    "server did not stop within {:?}, sending SIGKILL",
                    grace
                ));
                self.force_kill().await;
            }
        }

        self.release().await;
        self.state
    }

    #[cfg(unix)]
    fn request_shutdown(&mut self) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = self.pid() {
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                self.note(format!("SIGTERM to pid {} failed: {}", pid, e));
            }
        }
    }

    #[cfg(not(unix))]
    fn request_shutdown(&mut self) {
        if let Some(child) = self.child.as_mut() {
            if let Err(e) = child.start_kill() {
                self.note(format!("terminate request failed: {}", e));
            }
        }
    }

    async fn force_kill(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let killed = child.kill().await;
            if let Ok(Some(status)) = child.try_wait() {
                self.exit_status = Some(status);
            }
            if let Err(e) = killed {
                error!("Failed to kill server: {}", e);
                self.note(format!("SIGKILL failed: {}", e));
            }
        }
        self.state = ProcessState::Failed;
    }

    /// Drain the output readers and drop the child
    async fn release(&mut self) {
        for reader in self.readers.drain(..) {
            let abort = reader.abort_handle();
            if timeout(DRAIN_TIMEOUT, reader).await.is_err() {
                abort.abort();
            }
        }
        self.child = None;
    }

    /// Record a supervisor-side message alongside the server's own output
    fn note(&self, message: String) {
        warn!("{}", message);
        self.output.push(format!("[harness] {}", message));
    }
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
        }
    }
}

fn capture<R>(reader: R, output: OutputBuffer) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(target: "tenrankai", "{}", line);
            output.push(line);
        }
    })
}

/// Exit code 0, or death by our own SIGTERM
fn is_clean_exit(status: &ExitStatus) -> bool {
    if status.success() {
        return true;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if status.signal() == Some(nix::sys::signal::Signal::SIGTERM as i32) {
            return true;
        }
    }
    false
}

/// Find a free port to use
pub fn find_free_port() -> HarnessResult<u16> {
    use std::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}
