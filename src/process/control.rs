//! Platform-agnostic process control functions.

use std::time::{Duration, Instant};

use super::GRACEFUL_SHUTDOWN_TIMEOUT;
use crate::error::{NeoError, Result};

/// Check if a process is alive by PID.
#[cfg(target_os = "windows")]
pub fn is_process_alive(pid: u32) -> bool {
    super::win_api::is_process_alive(pid)
}

/// Check if a process is alive by PID.
#[cfg(not(target_os = "windows"))]
pub fn is_process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    kill(Pid::from_raw(pid as i32), None).is_ok()
}

/// Ask a server process to shut down. Windows console servers have no
/// usable close signal from another process, so termination is forced.
#[cfg(target_os = "windows")]
pub(super) fn graceful_signal(pid: u32) -> Result<()> {
    force_kill(pid)
}

/// Send a graceful shutdown signal to a process.
#[cfg(not(target_os = "windows"))]
pub(super) fn graceful_signal(pid: u32) -> Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
        .map_err(|e| NeoError::stop(format!("failed to send SIGTERM to PID {pid}: {e}")))
}

#[cfg(target_os = "windows")]
pub fn force_kill(pid: u32) -> Result<()> {
    let output = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .output()
        .map_err(|e| NeoError::stop(format!("failed to run taskkill: {e}")))?;

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let detail = stderr.trim();
        let detail = if detail.is_empty() {
            stdout.trim()
        } else {
            detail
        };
        Err(NeoError::stop(format!(
            "taskkill failed for pid {}: {}",
            pid,
            if detail.is_empty() {
                "(no output)"
            } else {
                detail
            }
        )))
    }
}

#[cfg(not(target_os = "windows"))]
pub fn force_kill(pid: u32) -> Result<()> {
    use nix::sys::signal::{kill, killpg, Signal};
    use nix::unistd::{getpgid, Pid};

    let target = Pid::from_raw(pid as i32);
    match getpgid(Some(target)) {
        Ok(pgid) => killpg(pgid, Signal::SIGKILL).map_err(|e| {
            NeoError::stop(format!(
                "failed to kill process group {} (from pid {}): {}",
                pgid.as_raw(),
                pid,
                e
            ))
        }),
        Err(e) => kill(target, Signal::SIGKILL).map_err(|kill_err| {
            NeoError::stop(format!(
                "failed to kill process {pid} (getpgid failed: {e}): {kill_err}"
            ))
        }),
    }
}

/// Send graceful signal to each PID, wait up to the timeout for all to exit,
/// then force kill any that remain. Blocking.
pub fn graceful_shutdown(pids: &[u32]) {
    let mut failed_signal_pids = Vec::new();

    for &pid in pids {
        if is_process_alive(pid) {
            if let Err(e) = graceful_signal(pid) {
                log::warn!(
                    "Graceful signal failed for PID {pid}: {e}, will force kill immediately"
                );
                failed_signal_pids.push(pid);
            }
        }
    }

    for &pid in &failed_signal_pids {
        if is_process_alive(pid) {
            if let Err(e) = force_kill(pid) {
                log::error!("Failed to force kill PID {pid}: {e}");
            }
        }
    }

    let signalled_pids: Vec<u32> = pids
        .iter()
        .copied()
        .filter(|pid| !failed_signal_pids.contains(pid))
        .collect();

    if signalled_pids.is_empty() || signalled_pids.iter().all(|&pid| !is_process_alive(pid)) {
        return;
    }

    let deadline = Instant::now() + GRACEFUL_SHUTDOWN_TIMEOUT;
    while Instant::now() < deadline {
        if signalled_pids.iter().all(|&pid| !is_process_alive(pid)) {
            return;
        }
        std::thread::sleep(Duration::from_millis(500));
    }

    for &pid in &signalled_pids {
        if is_process_alive(pid) {
            log::warn!(
                "PID {pid} did not exit within {}s, force killing",
                GRACEFUL_SHUTDOWN_TIMEOUT.as_secs()
            );
            if let Err(e) = force_kill(pid) {
                log::error!("Failed to force kill PID {pid}: {e}");
            }
        }
    }
}

/// Verify a listen port can be bound before handing it to the server.
pub fn check_port_available(port: u16) -> Result<()> {
    std::net::TcpListener::bind(("127.0.0.1", port))
        .map_err(|_| NeoError::port_occupied(port))?;
    Ok(())
}
