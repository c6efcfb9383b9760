//! Node bootstrap and teardown.
//!
//! Test flow:
//! 1) Start a node against a scratch directory with a shutdown future.
//! 2) Resolve the shutdown future.
//!
//! Verification:
//! - The node returns cleanly and removes its store directory.
//! - Invalid configuration is rejected before anything is opened.

use clap::Parser;
use vault_store::node::run_node_with_shutdown;
use vault_store::NodeArgs;

fn args(data_dir: &std::path::Path, extra: &[&str]) -> NodeArgs {
    let data_dir = data_dir.to_string_lossy().into_owned();
    let mut argv = vec!["vault-node".to_string(), "--data-dir".to_string(), data_dir];
    argv.extend(extra.iter().map(|s| s.to_string()));
    NodeArgs::try_parse_from(argv).expect("parse args")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn node_removes_store_on_shutdown() {
    let dir = tempfile::tempdir().expect("tempdir");
    let data_dir = dir.path().join("node");
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let node = tokio::spawn(run_node_with_shutdown(
        args(&data_dir, &["--sweep-interval-ms", "10"]),
        async move {
            let _ = rx.await;
            Ok::<(), std::io::Error>(())
        },
    ));

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
    while !data_dir.exists() {
        assert!(std::time::Instant::now() < deadline, "store directory never appeared");
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    tx.send(()).expect("signal shutdown");
    node.await.expect("join node").expect("node result");
    assert!(!data_dir.exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn invalid_layout_fails_fast() {
    let dir = tempfile::tempdir().expect("tempdir");
    let data_dir = dir.path().join("node");
    let result = run_node_with_shutdown(
        args(&data_dir, &["--prefix-width", "0"]),
        async { Ok::<(), std::io::Error>(()) },
    )
    .await;
    assert!(result.is_err());
    assert!(!data_dir.exists());
}
