//! Single task that owns the account handler.
//!
//! Callers talk to it through a bounded queue. A full queue rejects the
//! request with `Backpressure` instead of blocking the caller. The same loop
//! periodically sweeps stale pending actions. Commits and evictions are both
//! forwarded on the event channel so the originating path can acknowledge a
//! commit or re-initiate an evicted action.

use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use vault_group::{Identity, NodeId};

use crate::accounts::{AccountCommit, AccountEviction, AccountHandler};
use crate::error::{Result, VaultError};
use crate::keys::DataKey;
use crate::ledger::{Action, MergeOutcome};

#[derive(Clone, Copy, Debug)]
pub struct WorkerConfig {
    pub queue_capacity: usize,
    pub notify_capacity: usize,
    pub sweep_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            notify_capacity: 1024,
            sweep_interval: Duration::from_secs(1),
        }
    }
}

/// Outcome forwarded from the worker to its consumer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccountEvent {
    Committed(AccountCommit),
    /// A pending action dropped without reaching quorum.
    Evicted(AccountEviction),
}

/// One replica's report of a mutation to an owner's data.
#[derive(Clone, Debug)]
pub struct Report {
    pub owner: Identity,
    pub key: DataKey,
    pub action: Action,
    pub cost: u64,
    pub reporter: NodeId,
}

enum Request {
    Report {
        report: Report,
        tx: oneshot::Sender<Result<MergeOutcome>>,
    },
    RemoveAccount {
        owner: Identity,
        tx: oneshot::Sender<Result<bool>>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

#[derive(Clone)]
pub struct WorkerHandle {
    tx: mpsc::Sender<Request>,
}

impl WorkerHandle {
    pub async fn report(&self, report: Report) -> Result<MergeOutcome> {
        let (tx, rx) = oneshot::channel();
        self.enqueue(Request::Report { report, tx })?;
        rx.await.map_err(|_| VaultError::WorkerStopped)?
    }

    pub async fn remove_account(&self, owner: Identity) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.enqueue(Request::RemoveAccount { owner, tx })?;
        rx.await.map_err(|_| VaultError::WorkerStopped)?
    }

    /// Stop the worker once every request queued ahead of this one is handled.
    pub async fn shutdown(&self) -> Result<()> {
        let (done, rx) = oneshot::channel();
        self.tx
            .send(Request::Shutdown { done })
            .await
            .map_err(|_| VaultError::WorkerStopped)?;
        rx.await.map_err(|_| VaultError::WorkerStopped)
    }

    fn enqueue(&self, request: Request) -> Result<()> {
        self.tx.try_send(request).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => VaultError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => VaultError::WorkerStopped,
        })
    }
}

/// Start the worker on the current tokio runtime.
///
/// The task ends after `shutdown` or once every handle has been dropped.
pub fn spawn(
    handler: AccountHandler,
    config: WorkerConfig,
) -> (WorkerHandle, mpsc::Receiver<AccountEvent>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
    let (notify_tx, notify_rx) = mpsc::channel(config.notify_capacity.max(1));
    let task = tokio::spawn(run(handler, config, rx, notify_tx));
    (WorkerHandle { tx }, notify_rx, task)
}

async fn run(
    mut handler: AccountHandler,
    config: WorkerConfig,
    mut rx: mpsc::Receiver<Request>,
    notify_tx: mpsc::Sender<AccountEvent>,
) {
    let mut ticker = tokio::time::interval(config.sweep_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!(
        queue_capacity = config.queue_capacity,
        sweep_interval_ms = config.sweep_interval.as_millis() as u64,
        "account worker started"
    );

    loop {
        tokio::select! {
            maybe = rx.recv() => {
                match maybe {
                    Some(Request::Report { report, tx }) => {
                        let owner = report.owner;
                        let result = handler.report(
                            report.owner,
                            report.key,
                            report.action,
                            report.cost,
                            report.reporter,
                        );
                        match &result {
                            Ok(MergeOutcome::Committed(notice)) => {
                                if let Some(account_id) = handler.account_id(&owner) {
                                    notify(&notify_tx, AccountEvent::Committed(AccountCommit {
                                        owner,
                                        account_id,
                                        notice: notice.clone(),
                                    }));
                                }
                            }
                            Ok(_) => {}
                            Err(err) => warn!(?owner, error = ?err, "report failed"),
                        }
                        let _ = tx.send(result);
                    }
                    Some(Request::RemoveAccount { owner, tx }) => {
                        let _ = tx.send(handler.remove_account(&owner));
                    }
                    Some(Request::Shutdown { done }) => {
                        let _ = done.send(());
                        break;
                    }
                    None => break,
                }
            }
            _ = ticker.tick() => {
                for eviction in handler.sweep(Instant::now()) {
                    notify(&notify_tx, AccountEvent::Evicted(eviction));
                }
            }
        }
    }

    info!(pending = handler.pending_len(), "account worker stopped");
}

fn notify(notify_tx: &mpsc::Sender<AccountEvent>, event: AccountEvent) {
    match notify_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(event)) => {
            warn!(?event, "account event dropped: consumer lagging");
        }
        // Nobody is listening; commits still apply.
        Err(mpsc::error::TrySendError::Closed(_)) => {}
    }
}
