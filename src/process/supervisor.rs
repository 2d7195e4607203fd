//! Spawning and readiness supervision of the server subprocess.

use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt as _, BufReader};
use tokio::process::Command;
use tokio::sync::{oneshot, watch};

use crate::error::{NeoError, Result};

use super::control::{force_kill, graceful_signal, is_process_alive};
use super::{ServerHandle, GRACEFUL_SHUTDOWN_TIMEOUT, READY_MARKER};

/// How long to wait for exit confirmation after a SIGKILL.
const KILL_CONFIRM_TIMEOUT: Duration = Duration::from_secs(10);

/// Spawn the server binary and wait until it reports readiness on stdout.
///
/// The child is pointed at the instance's private configuration through
/// `NEO4J_CONF` and runs in `console` mode so its lifetime is tied to the
/// returned handle. Resolves on the first of: the readiness marker seen
/// (success), child exit (premature-exit error naming the version), or the
/// startup timeout elapsing (child is killed, timeout error).
pub async fn spawn_server(
    bin: &Path,
    conf_dir: &Path,
    version: &str,
    startup_timeout: Duration,
) -> Result<ServerHandle> {
    if !bin.is_file() {
        return Err(NeoError::spawn(format!(
            "server binary not found: {}",
            bin.display()
        )));
    }
    make_executable(bin)?;

    let mut cmd = Command::new(bin);
    cmd.arg("console")
        .env("NEO4J_CONF", conf_dir)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped());

    #[cfg(unix)]
    {
        cmd.process_group(0);
    }

    #[cfg(target_os = "windows")]
    {
        use windows::Win32::System::Threading::CREATE_NO_WINDOW;
        cmd.creation_flags(CREATE_NO_WINDOW.0);
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| NeoError::spawn(format!("failed to start {version} server: {e}")))?;

    let pid = child
        .id()
        .ok_or_else(|| NeoError::spawn("failed to get process id"))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| NeoError::spawn("failed to capture stdout"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| NeoError::spawn("failed to capture stderr"))?;

    // Drain stderr for the life of the process; an unread pipe eventually
    // stalls the child. Lines are diagnostic only, never fatal.
    let mut stderr_reader = BufReader::new(stderr).lines();
    tokio::spawn(async move {
        while let Ok(Some(line)) = stderr_reader.next_line().await {
            log::warn!("[neo4j {pid} stderr] {line}");
        }
    });

    // Scan stdout for the readiness marker, then keep draining.
    let (ready_tx, ready_rx) = oneshot::channel::<()>();
    let mut ready_tx = Some(ready_tx);
    let mut stdout_reader = BufReader::new(stdout).lines();
    tokio::spawn(async move {
        while let Ok(Some(line)) = stdout_reader.next_line().await {
            log::debug!("[neo4j {pid} stdout] {line}");
            if line.contains(READY_MARKER) {
                if let Some(sender) = ready_tx.take() {
                    let _ = sender.send(());
                }
            }
        }
    });

    let (exit_tx, exit_rx) = watch::channel(false);
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => log::info!("neo4j process {pid} exited with {status}"),
            Err(e) => log::warn!("failed to wait on neo4j process {pid}: {e}"),
        }
        let _ = exit_tx.send(true);
    });

    let mut exit_watch = exit_rx.clone();
    tokio::select! {
        // When marker and exit race (server prints `Started.` then dies,
        // or the harness observes both in one poll), readiness wins.
        biased;

        res = ready_rx => match res {
            Ok(()) => Ok(ServerHandle::new(pid, exit_rx)),
            // The stdout task drops its sender only once the pipe closes,
            // which means the child is gone without having become ready.
            Err(_) => Err(NeoError::premature_exit(version)),
        },
        _ = exit_watch.wait_for(|exited| *exited) => {
            Err(NeoError::premature_exit(version))
        }
        () = tokio::time::sleep(startup_timeout) => {
            log::warn!(
                "{version} server did not report readiness within {}s, killing pid {pid}",
                startup_timeout.as_secs()
            );
            if let Err(e) = force_kill(pid) {
                log::warn!("failed to kill timed-out server {pid}: {e}");
            }
            Err(NeoError::startup_timeout(version, startup_timeout.as_secs()))
        }
    }
}

/// Terminate a running server and wait for exit confirmation. Calling this
/// after the process is already gone is a no-op.
pub async fn stop_server(handle: &mut ServerHandle) -> Result<()> {
    let pid = handle.pid();
    if handle.is_exited() {
        return Ok(());
    }

    if is_process_alive(pid) {
        if let Err(e) = graceful_signal(pid) {
            log::warn!("graceful signal failed for pid {pid}: {e}, force killing");
            force_kill(pid)?;
        }
    }

    if tokio::time::timeout(GRACEFUL_SHUTDOWN_TIMEOUT, handle.wait_exited())
        .await
        .is_ok()
    {
        return Ok(());
    }

    log::warn!(
        "pid {pid} did not exit within {}s, force killing",
        GRACEFUL_SHUTDOWN_TIMEOUT.as_secs()
    );
    force_kill(pid)?;
    tokio::time::timeout(KILL_CONFIRM_TIMEOUT, handle.wait_exited())
        .await
        .map_err(|_| NeoError::stop(format!("process {pid} did not exit after SIGKILL")))
}

#[cfg(unix)]
fn make_executable(bin: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt as _;

    std::fs::set_permissions(bin, std::fs::Permissions::from_mode(0o755)).map_err(|e| {
        NeoError::spawn(format!("failed to make {} executable: {e}", bin.display()))
    })
}

#[cfg(not(unix))]
fn make_executable(_bin: &Path) -> Result<()> {
    Ok(())
}
