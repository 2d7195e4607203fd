//! Ephemeral Neo4j Community Edition servers for local development and
//! automated tests.
//!
//! Point an instance at a version and a port pair and `start` it: the
//! matching distribution is downloaded and cached on first use (under
//! `~/.neo-ondemand` by default), a private workspace is staged for the
//! instance, its `neo4j.conf` is rewritten for the requested ports, and the
//! server process is launched and awaited until it reports readiness.
//! `stop` terminates the process and, unless `persist_data` is set, removes
//! the instance's data from disk. Instances still alive when the host
//! process receives Ctrl-C or SIGTERM are stopped by the registry's exit
//! hook.
//!
//! ```no_run
//! use neo_ondemand::{NeoDb, Options};
//!
//! # async fn demo() -> neo_ondemand::Result<()> {
//! let mut db = NeoDb::new(7474, 7687, Options::default());
//! db.start().await?;
//! assert_eq!(db.bolt_url(), "bolt://localhost:7687");
//! // ... run queries against the server ...
//! db.stop().await?;
//! # Ok(())
//! # }
//! ```

mod archive;
pub mod cache;
pub mod conf;
mod error;
pub mod paths;
pub mod platform;
pub mod process;
pub mod registry;
mod server;
pub mod workspace;

pub use error::{ErrorKind, NeoError, Result};
pub use registry::{ProcessRegistry, RegisteredInstance};
pub use server::{NeoDb, Options, DEFAULT_VERSION};
