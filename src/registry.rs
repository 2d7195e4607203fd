//! Process-wide tracking of live instances for best-effort shutdown.
//!
//! Every started instance registers itself here; on host exit (Ctrl-C,
//! SIGTERM) the hook stops everything that is still alive so no server
//! subprocess outlives its parent. The registry is an explicit object
//! rather than ambient global state, so tests can drive `stop_all`
//! deterministically with a private registry and no real signal.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock, RwLock};

use crate::process::graceful_shutdown;

/// A live instance as seen by the shutdown hook.
#[derive(Debug, Clone)]
pub struct RegisteredInstance {
    pub pid: u32,
    pub http_port: u16,
    pub workspace: PathBuf,
    pub persist_data: bool,
}

/// Registry of running instances, keyed by http port.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    instances: RwLock<HashMap<u16, RegisteredInstance>>,
}

static SHARED: OnceLock<Arc<ProcessRegistry>> = OnceLock::new();
static EXIT_HOOK: OnceLock<()> = OnceLock::new();

impl ProcessRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The process-wide registry used by instances that were not handed a
    /// private one.
    pub fn shared() -> Arc<Self> {
        Arc::clone(SHARED.get_or_init(|| Arc::new(Self::default())))
    }

    pub fn register(&self, entry: RegisteredInstance) {
        let mut instances = self.instances.write().unwrap_or_else(|e| e.into_inner());
        instances.insert(entry.http_port, entry);
    }

    pub fn unregister(&self, http_port: u16) -> Option<RegisteredInstance> {
        let mut instances = self.instances.write().unwrap_or_else(|e| e.into_inner());
        instances.remove(&http_port)
    }

    /// Http ports of all currently tracked instances.
    pub fn tracked_ports(&self) -> Vec<u16> {
        let instances = self.instances.read().unwrap_or_else(|e| e.into_inner());
        instances.keys().copied().collect()
    }

    /// Stop every tracked instance: graceful signal, bounded wait, force
    /// kill stragglers, then purge the workspaces of instances that do not
    /// persist data. Blocking.
    pub fn stop_all(&self) {
        let entries: Vec<RegisteredInstance> = {
            let mut instances = self.instances.write().unwrap_or_else(|e| e.into_inner());
            instances.drain().map(|(_, entry)| entry).collect()
        };

        if entries.is_empty() {
            return;
        }

        for entry in &entries {
            log::info!(
                "Stopping instance on port {} (pid: {})",
                entry.http_port,
                entry.pid
            );
        }

        let pids: Vec<u32> = entries.iter().map(|entry| entry.pid).collect();
        graceful_shutdown(&pids);

        for entry in entries {
            if entry.persist_data {
                continue;
            }
            match std::fs::remove_dir_all(&entry.workspace) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => log::warn!("Failed to purge workspace {:?}: {}", entry.workspace, e),
            }
        }
    }
}

/// Install the host-exit hook for a registry. Installed at most once per
/// process; later calls are no-ops. Must be called from within a tokio
/// runtime.
pub fn install_exit_hook(registry: &Arc<ProcessRegistry>) {
    EXIT_HOOK.get_or_init(|| {
        let registry = Arc::clone(registry);
        tokio::spawn(async move {
            let code = wait_for_shutdown_signal().await;
            log::info!("Shutdown signal received, stopping all instances...");
            let result =
                tokio::task::spawn_blocking(move || registry.stop_all()).await;
            if let Err(e) = result {
                log::error!("Shutdown cleanup task failed: {e}");
            }
            std::process::exit(code);
        });
    });
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> i32 {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            log::warn!("Failed to install SIGTERM handler: {e}");
            let _ = tokio::signal::ctrl_c().await;
            return 130;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => 130,
        _ = term.recv() => 143,
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> i32 {
    let _ = tokio::signal::ctrl_c().await;
    130
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(http_port: u16, pid: u32, workspace: PathBuf) -> RegisteredInstance {
        RegisteredInstance {
            pid,
            http_port,
            workspace,
            persist_data: false,
        }
    }

    #[test]
    fn register_unregister_roundtrip() {
        let registry = ProcessRegistry::new();
        registry.register(entry(7474, 1, PathBuf::from("/nonexistent/7474")));
        registry.register(entry(7475, 2, PathBuf::from("/nonexistent/7475")));

        let mut ports = registry.tracked_ports();
        ports.sort_unstable();
        assert_eq!(ports, vec![7474, 7475]);

        let removed = registry.unregister(7474).unwrap();
        assert_eq!(removed.pid, 1);
        assert_eq!(registry.tracked_ports(), vec![7475]);
        assert!(registry.unregister(7474).is_none());
    }

    #[test]
    fn stop_all_drains_and_purges_non_persistent_workspaces() {
        let tmp = tempfile::tempdir().unwrap();
        let kept = tmp.path().join("kept");
        let purged = tmp.path().join("purged");
        std::fs::create_dir_all(&kept).unwrap();
        std::fs::create_dir_all(&purged).unwrap();

        let registry = ProcessRegistry::new();
        // Pids far above any default pid_max: graceful_shutdown sees them
        // as already gone and only the workspace cleanup runs.
        registry.register(RegisteredInstance {
            pid: 3_999_999,
            http_port: 7474,
            workspace: purged.clone(),
            persist_data: false,
        });
        registry.register(RegisteredInstance {
            pid: 3_999_998,
            http_port: 7475,
            workspace: kept.clone(),
            persist_data: true,
        });

        registry.stop_all();

        assert!(registry.tracked_ports().is_empty());
        assert!(!purged.exists());
        assert!(kept.exists());
    }
}
