//! Launching and stopping agent processes.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use agentbox_topology::{JoinTopology, Node};
use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::args::AgentCommand;
use crate::error::{Error, Result};

/// Starts and stops cluster agents.
#[async_trait]
pub trait Supervisor
where
    Self: Send + Sync + 'static,
{
    /// Launches the agent for `node` and returns its pid.
    async fn start(&self, node: &Node, join: &JoinTopology) -> Result<u32>;

    /// Whether `pid` still names a live process.
    fn is_alive(&self, pid: u32) -> bool;

    /// Interrupts `pid` and waits until it is gone.
    async fn stop(&self, pid: u32) -> Result<()>;

    /// Waits for background work tied to started agents.
    async fn finish(&self) {}
}

/// Options for [`ProcessSupervisor`].
#[derive(Clone, Debug)]
pub struct SupervisorOptions {
    /// Agent executable.
    pub binary: PathBuf,

    /// Echo agent output through tracing.
    pub log_output: bool,

    /// Level handed to agents when output is echoed.
    pub log_level: String,

    /// Delay between pid lookups after spawning.
    pub pid_poll: Duration,

    /// Number of pid lookups before giving up.
    pub pid_poll_attempts: u32,

    /// Pause after each server start.
    pub server_settle: Duration,

    /// Delay between liveness checks while stopping.
    pub stop_poll: Duration,

    /// Escalate to SIGKILL once a stop takes this long.
    pub stop_timeout: Option<Duration>,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("/usr/bin/nomad"),
            log_output: false,
            log_level: "INFO".to_string(),
            pid_poll: Duration::from_millis(100),
            pid_poll_attempts: 50,
            server_settle: Duration::from_secs(3),
            stop_poll: Duration::from_secs(3),
            stop_timeout: None,
        }
    }
}

/// Supervises agents as direct child processes.
#[derive(Debug)]
pub struct ProcessSupervisor {
    options: SupervisorOptions,
    output: TaskTracker,
}

impl ProcessSupervisor {
    /// Creates a supervisor.
    #[must_use]
    pub fn new(options: SupervisorOptions) -> Self {
        Self {
            options,
            output: TaskTracker::new(),
        }
    }

    fn log_level(&self) -> Option<&str> {
        self.options
            .log_output
            .then_some(self.options.log_level.as_str())
    }

    fn drain<R>(&self, name: Arc<str>, stream: R)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let echo = self.options.log_output;
        self.output.spawn(async move {
            let mut lines = BufReader::new(stream).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if echo {
                    info!(target: "agent", node = %name, "{line}");
                }
            }
        });
    }
}

#[async_trait]
impl Supervisor for ProcessSupervisor {
    async fn start(&self, node: &Node, join: &JoinTopology) -> Result<u32> {
        let command = AgentCommand::for_node(&self.options.binary, node, join, self.log_level())?;
        debug!(node = %node.name, "launching {command}");

        let mut cmd = Command::new(command.program());
        cmd.args(command.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Io("failed to spawn agent", e))?;

        let mut pid = child.id();
        let mut attempts = 1;
        while pid.is_none() && attempts < self.options.pid_poll_attempts {
            tokio::time::sleep(self.options.pid_poll).await;
            pid = child.id();
            attempts += 1;
        }
        let pid =
            pid.ok_or_else(|| Error::SpawnProcess(format!("no pid available for {}", node.name)))?;
        let name: Arc<str> = Arc::from(node.name.as_str());

        if let Some(stdout) = child.stdout.take() {
            self.drain(Arc::clone(&name), stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            self.drain(Arc::clone(&name), stderr);
        }

        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => {
                    info!(node = %name, pid, "agent exited: {status}");
                }
                Ok(status) => warn!(node = %name, pid, "agent exited: {status}"),
                Err(e) => error!(node = %name, pid, "failed to wait for agent: {e}"),
            }
        });

        info!(node = %node.name, pid, "started {} agent", node.role);

        if node.is_server() {
            tokio::time::sleep(self.options.server_settle).await;
        }

        Ok(pid)
    }

    fn is_alive(&self, pid: u32) -> bool {
        is_alive(pid)
    }

    async fn stop(&self, pid: u32) -> Result<()> {
        let target = to_pid(pid)?;

        match signal::kill(target, Signal::SIGINT) {
            Ok(()) => debug!(pid, "sent SIGINT"),
            Err(Errno::ESRCH) => {
                debug!(pid, "process already gone");
                return Ok(());
            }
            Err(e) => warn!(pid, "failed to interrupt process: {e}"),
        }

        let started = Instant::now();
        let mut killed = false;

        while is_alive(pid) {
            let overdue = self
                .options
                .stop_timeout
                .is_some_and(|timeout| started.elapsed() >= timeout);

            if overdue && !killed {
                warn!(pid, "process ignored SIGINT, sending SIGKILL");
                if let Err(e) = signal::kill(target, Signal::SIGKILL) {
                    warn!(pid, "failed to kill process: {e}");
                }
                killed = true;
            }

            tokio::time::sleep(self.options.stop_poll).await;
        }

        debug!(pid, "process stopped");
        Ok(())
    }

    async fn finish(&self) {
        self.output.close();
        self.output.wait().await;
    }
}

/// Whether `pid` names a live process.
///
/// Lookup errors other than "no such process" count as alive. Pid 0 is never
/// alive.
#[must_use]
pub fn is_alive(pid: u32) -> bool {
    let Ok(target) = to_pid(pid) else {
        return false;
    };

    match signal::kill(target, None::<Signal>) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false,
        Err(e) => {
            debug!(pid, "liveness check failed: {e}");
            true
        }
    }
}

fn to_pid(pid: u32) -> Result<Pid> {
    match i32::try_from(pid) {
        Ok(raw) if raw > 0 => Ok(Pid::from_raw(raw)),
        _ => Err(Error::InvalidPid(pid)),
    }
}
