//! Node bootstrap shared by the binary and tests.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use crate::accounts::AccountHandler;
use crate::config::NodeArgs;
use crate::store::PartitionedStore;
use crate::worker::{self, AccountEvent};

/// Open the store and run the account worker until ctrl-c.
pub async fn run_node(args: NodeArgs) -> anyhow::Result<()> {
    run_node_with_shutdown(args, tokio::signal::ctrl_c()).await
}

/// Open the store and run the account worker until `shutdown` resolves.
///
/// The store directory is destroyed before this returns.
pub async fn run_node_with_shutdown<F>(args: NodeArgs, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = Result<(), std::io::Error>> + Send,
{
    let layout = args.key_layout().context("key layout")?;
    let ledger_config = args.ledger_config().context("ledger config")?;
    let worker_config = args.worker_config().context("worker config")?;
    let group_config = args.group_config().context("group config")?;

    let store = PartitionedStore::open(&args.data_dir, layout)
        .with_context(|| format!("open store at {}", args.data_dir.display()))?;
    let store = Arc::new(store);
    info!(
        quorum = ledger_config.quorum(),
        stale_after_ms = ledger_config.stale_after().as_millis() as u64,
        group_size = group_config.group_size(),
        proximal_size = group_config.proximal_size(),
        "vault node ready"
    );

    let handler = AccountHandler::new(Arc::clone(&store), ledger_config);
    let (handle, mut events, task) = worker::spawn(handler, worker_config);

    let events_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                AccountEvent::Committed(commit) => info!(
                    owner = ?commit.owner,
                    account_id = commit.account_id,
                    key = ?commit.notice.key,
                    kind = ?commit.notice.kind,
                    cost = commit.notice.cost,
                    reporters = commit.notice.reporters,
                    "commit notice"
                ),
                AccountEvent::Evicted(evicted) => warn!(
                    owner = ?evicted.owner,
                    key = ?evicted.eviction.key,
                    kind = ?evicted.eviction.kind,
                    reporters = evicted.eviction.reporters,
                    "action evicted without quorum"
                ),
            }
        }
    });

    if let Err(err) = shutdown.await {
        warn!(error = ?err, "shutdown signal failed; stopping");
    }
    info!("shutting down vault node");

    handle.shutdown().await.context("stop account worker")?;
    task.await.context("join account worker")?;
    events_task.await.context("join account event task")?;

    match Arc::try_unwrap(store) {
        Ok(store) => store.close(),
        Err(_) => warn!("store still shared at shutdown; directory removed on last drop"),
    }
    Ok(())
}
