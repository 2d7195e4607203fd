//! Server process supervision.

mod control;
mod supervisor;

#[cfg(target_os = "windows")]
pub(crate) mod win_api;

use std::time::Duration;

use tokio::sync::watch;

pub use control::{check_port_available, force_kill, graceful_shutdown, is_process_alive};
pub use supervisor::{spawn_server, stop_server};

/// Substring of the server's startup output that signals it is accepting
/// connections. Matched anywhere in a line, not line-exact.
pub const READY_MARKER: &str = "Started.";

/// Default time to wait for the readiness marker before giving up.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for graceful shutdown before force killing.
const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(60);

/// Handle to a supervised server subprocess.
///
/// Holds the child's pid for signalling and a watch flag flipped by the
/// background wait task when the child is reaped.
#[derive(Debug)]
pub struct ServerHandle {
    pid: u32,
    exited: watch::Receiver<bool>,
}

impl ServerHandle {
    pub(crate) fn new(pid: u32, exited: watch::Receiver<bool>) -> Self {
        Self { pid, exited }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Whether the child has been reaped.
    pub fn is_exited(&self) -> bool {
        *self.exited.borrow()
    }

    /// Suspend until the child exits. Returns immediately if it already has.
    pub async fn wait_exited(&mut self) {
        let _ = self.exited.wait_for(|exited| *exited).await;
    }
}
