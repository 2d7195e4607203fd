//! End-to-end lifecycle tests against fake distributions.
//!
//! A "distribution" here is a pre-seeded cache entry whose launch script
//! behaves like the real server: it checks the `console` argument and the
//! `NEO4J_CONF` environment, prints the readiness marker to stdout and then
//! idles until it is signalled. Shell-script based, so unix only.

#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use neo_ondemand::{ErrorKind, NeoDb, Options, ProcessRegistry};

const TEST_VERSION: &str = "0.0.1-test";

const READY_SCRIPT: &str = r#"#!/bin/sh
if [ "$1" != "console" ]; then
    echo "expected console argument, got: $1" >&2
    exit 64
fi
if [ ! -f "$NEO4J_CONF/neo4j.conf" ]; then
    echo "NEO4J_CONF does not point at a config directory" >&2
    exit 65
fi
echo "Starting Neo4j."
echo "======== Neo4j ========"
echo "Started."
trap 'exit 143' TERM INT
while :; do sleep 0.2; done
"#;

const CRASH_SCRIPT: &str = r#"#!/bin/sh
echo "Starting Neo4j."
echo "a fatal startup problem" >&2
exit 1
"#;

const SILENT_SCRIPT: &str = r#"#!/bin/sh
trap 'exit 143' TERM INT
while :; do sleep 0.2; done
"#;

const BASE_CONF: &str = "\
# Fake distribution defaults
dbms.memory.heap.initial_size=512m
dbms.connector.https.enabled=true
dbms.connector.http.listen_address=:7474
#dbms.default_database=neo4j
";

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Seed the artifact cache in `home` with a fake distribution using the
/// given launch script.
fn install_dist(home: &Path, script: &str) -> PathBuf {
    init_logging();
    let dist = home
        .join("versions")
        .join(format!("neo4j-community-{TEST_VERSION}"));
    fs::create_dir_all(dist.join("bin")).expect("Failed to create dist bin dir");
    fs::create_dir_all(dist.join("conf")).expect("Failed to create dist conf dir");
    fs::write(dist.join("conf").join("neo4j.conf"), BASE_CONF).expect("Failed to write base conf");

    let bin = dist.join("bin").join("neo4j");
    fs::write(&bin, script).expect("Failed to write launch script");
    {
        use std::os::unix::fs::PermissionsExt as _;
        fs::set_permissions(&bin, fs::Permissions::from_mode(0o755))
            .expect("Failed to chmod launch script");
    }
    dist
}

fn test_options(home: &Path) -> Options {
    Options {
        version: TEST_VERSION.to_string(),
        startup_timeout: Duration::from_secs(10),
        home_dir: Some(home.to_path_buf()),
        registry: Some(ProcessRegistry::new()),
        ..Options::default()
    }
}

fn pick_port_pair() -> (u16, u16) {
    let http = portpicker::pick_unused_port().expect("no free port");
    loop {
        let bolt = portpicker::pick_unused_port().expect("no free port");
        if bolt != http {
            return (http, bolt);
        }
    }
}

#[tokio::test]
async fn start_then_stop_leaves_no_trace() {
    let tmp = tempfile::tempdir().unwrap();
    let home = tmp.path();
    install_dist(home, READY_SCRIPT);
    let (http, bolt) = pick_port_pair();

    let mut db = NeoDb::new(http, bolt, test_options(home));
    db.start().await.expect("start should succeed");
    assert!(db.is_running());
    assert_eq!(db.http_url(), format!("http://localhost:{http}"));
    assert_eq!(db.bolt_url(), format!("bolt://localhost:{bolt}"));

    // The staged config carries the per-instance overrides, with unrelated
    // base lines intact.
    let workspace = home.join("instance-data").join(http.to_string());
    let conf = fs::read_to_string(workspace.join("conf").join("neo4j.conf")).unwrap();
    assert!(conf.contains(&format!("dbms.connector.http.listen_address=:{http}")));
    assert!(conf.contains(&format!("dbms.connector.bolt.listen_address=:{bolt}")));
    assert!(conf.contains("dbms.security.auth_enabled=false"));
    assert!(conf.contains("dbms.connector.https.enabled=false"));
    assert!(conf.contains("dbms.memory.heap.initial_size=512m"));
    assert!(!conf.contains("dbms.connector.https.enabled=true"));

    db.stop().await.expect("stop should succeed");
    assert!(!db.is_running());
    assert!(
        !workspace.exists(),
        "workspace should be purged when persist_data is false"
    );
}

#[tokio::test]
async fn premature_exit_rejects_instead_of_hanging() {
    let tmp = tempfile::tempdir().unwrap();
    let home = tmp.path();
    install_dist(home, CRASH_SCRIPT);
    let (http, bolt) = pick_port_pair();

    let mut db = NeoDb::new(http, bolt, test_options(home));
    let result = tokio::time::timeout(Duration::from_secs(5), db.start())
        .await
        .expect("start must resolve well before the startup timeout");

    let err = result.expect_err("start should fail when the server dies");
    assert_eq!(err.kind(), ErrorKind::PrematureExit);
    assert!(
        err.to_string().contains(TEST_VERSION),
        "error should name the version: {err}"
    );
    assert!(!db.is_running());
    assert!(!home.join("instance-data").join(http.to_string()).exists());
}

#[tokio::test]
async fn startup_timeout_kills_the_silent_server() {
    let tmp = tempfile::tempdir().unwrap();
    let home = tmp.path();
    install_dist(home, SILENT_SCRIPT);
    let (http, bolt) = pick_port_pair();

    let mut options = test_options(home);
    options.startup_timeout = Duration::from_secs(1);

    let mut db = NeoDb::new(http, bolt, options);
    let err = db.start().await.expect_err("silent server must time out");
    assert_eq!(err.kind(), ErrorKind::StartupTimeout);
    assert!(!db.is_running());
}

#[tokio::test]
async fn stop_twice_is_a_noop() {
    let tmp = tempfile::tempdir().unwrap();
    let home = tmp.path();
    install_dist(home, READY_SCRIPT);
    let (http, bolt) = pick_port_pair();

    let mut db = NeoDb::new(http, bolt, test_options(home));
    db.start().await.unwrap();
    db.stop().await.expect("first stop should succeed");
    db.stop().await.expect("second stop must be a no-op");

    // Stopping an instance that was never started is equally harmless.
    let (http2, bolt2) = pick_port_pair();
    let mut never_started = NeoDb::new(http2, bolt2, test_options(home));
    never_started.stop().await.expect("stop without start is ok");
}

#[tokio::test]
async fn instance_is_reusable_after_stop() {
    let tmp = tempfile::tempdir().unwrap();
    let home = tmp.path();
    install_dist(home, READY_SCRIPT);
    let (http, bolt) = pick_port_pair();

    let mut db = NeoDb::new(http, bolt, test_options(home));
    db.start().await.unwrap();
    db.stop().await.unwrap();

    db.start().await.expect("restart should re-stage and succeed");
    assert!(db.is_running());
    db.stop().await.unwrap();
}

#[tokio::test]
async fn start_while_running_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let home = tmp.path();
    install_dist(home, READY_SCRIPT);
    let (http, bolt) = pick_port_pair();

    let mut db = NeoDb::new(http, bolt, test_options(home));
    db.start().await.unwrap();

    let err = db.start().await.expect_err("second start must fail");
    assert_eq!(err.kind(), ErrorKind::InstanceRunning);
    assert!(db.is_running(), "the original process must be unaffected");
    db.stop().await.unwrap();
}

#[tokio::test]
async fn two_instances_are_independent() {
    let tmp = tempfile::tempdir().unwrap();
    let home = tmp.path();
    install_dist(home, READY_SCRIPT);
    let (http_a, bolt_a) = pick_port_pair();
    let (http_b, bolt_b) = loop {
        let pair = pick_port_pair();
        if pair.0 != http_a && pair.1 != bolt_a {
            break pair;
        }
    };

    let mut a = NeoDb::new(http_a, bolt_a, test_options(home));
    let mut b = NeoDb::new(http_b, bolt_b, test_options(home));
    tokio::try_join!(a.start(), b.start()).expect("concurrent starts should succeed");

    let ws_a = home.join("instance-data").join(http_a.to_string());
    let ws_b = home.join("instance-data").join(http_b.to_string());
    assert!(ws_a.is_dir() && ws_b.is_dir());

    a.stop().await.unwrap();
    assert!(!ws_a.exists());
    assert!(b.is_running(), "stopping one instance must not affect the other");
    assert!(ws_b.is_dir());

    b.stop().await.unwrap();
    assert!(!ws_b.exists());
}

#[tokio::test]
async fn persist_data_keeps_the_workspace() {
    let tmp = tempfile::tempdir().unwrap();
    let home = tmp.path();
    install_dist(home, READY_SCRIPT);
    let (http, bolt) = pick_port_pair();

    let mut options = test_options(home);
    options.persist_data = true;

    let mut db = NeoDb::new(http, bolt, options);
    db.start().await.unwrap();
    db.stop().await.unwrap();

    let workspace = home.join("instance-data").join(http.to_string());
    assert!(
        workspace.join("data").is_dir(),
        "persist_data must keep the data directory across stop"
    );
}

#[tokio::test]
async fn occupied_port_fails_before_any_spawn() {
    let tmp = tempfile::tempdir().unwrap();
    let home = tmp.path();
    install_dist(home, READY_SCRIPT);
    let (http, bolt) = pick_port_pair();

    let _listener = std::net::TcpListener::bind(("127.0.0.1", http)).unwrap();

    let mut db = NeoDb::new(http, bolt, test_options(home));
    let err = db.start().await.expect_err("occupied port must fail start");
    assert_eq!(err.kind(), ErrorKind::PortOccupied);
    assert!(
        !home.join("instance-data").join(http.to_string()).exists(),
        "nothing should have been staged"
    );
}

#[tokio::test]
async fn registry_stop_all_tears_down_live_instances() {
    let tmp = tempfile::tempdir().unwrap();
    let home = tmp.path();
    install_dist(home, READY_SCRIPT);
    let (http, bolt) = pick_port_pair();

    let registry = ProcessRegistry::new();
    let mut options = test_options(home);
    options.registry = Some(std::sync::Arc::clone(&registry));

    let mut db = NeoDb::new(http, bolt, options);
    db.start().await.unwrap();
    assert_eq!(registry.tracked_ports(), vec![http]);

    let blocking_registry = std::sync::Arc::clone(&registry);
    tokio::task::spawn_blocking(move || blocking_registry.stop_all())
        .await
        .unwrap();

    assert!(registry.tracked_ports().is_empty());
    let workspace = home.join("instance-data").join(http.to_string());
    assert!(
        !workspace.exists(),
        "stop_all must purge non-persistent workspaces"
    );

    // The supervisor notices the exit shortly after the signal lands.
    for _ in 0..50 {
        if !db.is_running() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(!db.is_running());
    db.stop().await.expect("stop after stop_all is a no-op");
}
