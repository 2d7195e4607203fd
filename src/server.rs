//! The instance lifecycle façade.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::cache;
use crate::conf;
use crate::error::{NeoError, Result};
use crate::paths;
use crate::process::{self, check_port_available, ServerHandle, DEFAULT_STARTUP_TIMEOUT};
use crate::registry::{install_exit_hook, ProcessRegistry, RegisteredInstance};
use crate::workspace;

/// Server version used when none is requested.
pub const DEFAULT_VERSION: &str = "4.4.10";

/// Construction options for [`NeoDb`].
#[derive(Debug, Clone)]
pub struct Options {
    /// Distribution version to provision.
    pub version: String,
    /// Keep the instance's data directory across `stop` and host exit.
    pub persist_data: bool,
    /// How long `start` waits for the readiness marker.
    pub startup_timeout: Duration,
    /// Root of the cache/state tree; defaults to `~/.neo-ondemand`.
    pub home_dir: Option<PathBuf>,
    /// Registry used for host-exit cleanup; defaults to the process-wide one.
    pub registry: Option<Arc<ProcessRegistry>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            version: DEFAULT_VERSION.to_string(),
            persist_data: false,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            home_dir: None,
            registry: None,
        }
    }
}

/// One logical database server: a (httpPort, boltPort, version) triple that
/// can be started and stopped repeatedly.
///
/// Construction performs no I/O. `start` provisions the distribution,
/// stages a private workspace, rewrites the instance config and launches
/// the server; `stop` terminates it and, unless `persist_data` is set,
/// removes every trace of the instance from disk.
pub struct NeoDb {
    http_port: u16,
    bolt_port: u16,
    version: String,
    persist_data: bool,
    startup_timeout: Duration,
    home: PathBuf,
    registry: Arc<ProcessRegistry>,
    uses_shared_registry: bool,
    handle: Option<ServerHandle>,
}

impl NeoDb {
    pub fn new(http_port: u16, bolt_port: u16, options: Options) -> Self {
        let uses_shared_registry = options.registry.is_none();
        Self {
            http_port,
            bolt_port,
            version: options.version,
            persist_data: options.persist_data,
            startup_timeout: options.startup_timeout,
            home: options.home_dir.unwrap_or_else(paths::default_home_dir),
            registry: options.registry.unwrap_or_else(ProcessRegistry::shared),
            uses_shared_registry,
            handle: None,
        }
    }

    /// Provision and launch the server, resolving once it accepts
    /// connections.
    ///
    /// Sequence: ensure the distribution is cached → stage the workspace →
    /// materialize the instance config → spawn and await readiness. Any
    /// step's failure aborts the sequence and is returned unmodified; no
    /// retry is attempted here.
    pub async fn start(&mut self) -> Result<()> {
        if let Some(handle) = &self.handle {
            if !handle.is_exited() {
                return Err(NeoError::instance_running(self.http_port));
            }
            // The previous process died externally; re-stage from scratch.
            self.handle = None;
        }

        check_port_available(self.http_port)?;
        check_port_available(self.bolt_port)?;

        paths::ensure_data_dirs(&self.home)?;
        let dist = cache::ensure_dist(&self.home, &self.version).await?;
        let workspace_dir = workspace::stage(&self.home, self.http_port, &dist)?;

        let conf_path = paths::instance_conf_path(&self.home, self.http_port);
        let overrides = conf::instance_overrides(
            &paths::instance_store_dir(&self.home, self.http_port),
            self.http_port,
            self.bolt_port,
        );
        conf::apply_overrides(&conf_path, &conf_path, &overrides)?;

        let bin = paths::server_bin_path(&self.home, self.http_port);
        let conf_dir = paths::instance_conf_dir(&self.home, self.http_port);
        let handle =
            match process::spawn_server(&bin, &conf_dir, &self.version, self.startup_timeout)
                .await
            {
                Ok(handle) => handle,
                Err(e) => {
                    self.cleanup_after_failed_start();
                    return Err(e);
                }
            };

        self.registry.register(RegisteredInstance {
            pid: handle.pid(),
            http_port: self.http_port,
            workspace: workspace_dir,
            persist_data: self.persist_data,
        });
        if self.uses_shared_registry {
            install_exit_hook(&self.registry);
        }

        self.handle = Some(handle);
        log::info!(
            "neo4j {} ready on http:{} bolt:{}",
            self.version,
            self.http_port,
            self.bolt_port
        );
        Ok(())
    }

    /// Terminate the server and clean up.
    ///
    /// Never fails for "nothing was running": stopping a never-started or
    /// already-stopped instance is a no-op, and a second `stop` in a row is
    /// harmless.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(mut handle) = self.handle.take() {
            if let Err(e) = process::stop_server(&mut handle).await {
                // Keep the handle so a later stop can retry the kill.
                self.handle = Some(handle);
                return Err(e);
            }
        }

        if !self.persist_data {
            workspace::purge(&self.home, self.http_port)?;
        }
        self.registry.unregister(self.http_port);
        Ok(())
    }

    /// Whether this instance currently owns a live server process.
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_exited())
            .unwrap_or(false)
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn bolt_port(&self) -> u16 {
        self.bolt_port
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn http_url(&self) -> String {
        format!("http://localhost:{}", self.http_port)
    }

    pub fn bolt_url(&self) -> String {
        format!("bolt://localhost:{}", self.bolt_port)
    }

    fn cleanup_after_failed_start(&self) {
        if self.persist_data {
            return;
        }
        if let Err(e) = workspace::purge(&self.home, self.http_port) {
            log::warn!(
                "Failed to purge workspace for port {} after failed start: {e}",
                self.http_port
            );
        }
    }
}

impl Drop for NeoDb {
    /// Best-effort leak prevention: an instance dropped while its server is
    /// still alive kills the process outright. Orderly teardown (including
    /// the data purge) belongs to `stop`.
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            if !handle.is_exited() {
                log::warn!(
                    "Instance on port {} dropped while running, killing pid {}",
                    self.http_port,
                    handle.pid()
                );
                if let Err(e) = process::force_kill(handle.pid()) {
                    log::warn!("Failed to kill pid {}: {e}", handle.pid());
                }
                self.registry.unregister(self.http_port);
            }
        }
    }
}
