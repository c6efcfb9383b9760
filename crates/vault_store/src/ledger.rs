//! Pending-action ledger that merges replica corroborations.
//!
//! Each member of a replica group independently reports the puts and deletes
//! it has seen for an account. The ledger counts distinct reporters per
//! `(key, kind)` and applies the action to the store once a quorum agrees,
//! exactly once.
//!
//! Field accumulation:
//! - `payload` (puts only): the latest report wins.
//! - `cost`: the maximum reported value, so the result does not depend on
//!   arrival order.
//! - reporters: a set; repeated reports from one peer are ignored.
//!
//! Put/delete interaction:
//! - A delete report only counts if the key is currently stored.
//! - Puts and deletes for the same key pend independently.
//! - A delete reaching quorum removes the key and discards any pending put for
//!   it. A put reaching quorum leaves a pending delete in place.
//! - A peer that reports both kinds for the same key while both are pending is
//!   contradicting itself; the second report fails with `ConflictingAction`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vault_group::{GroupConfig, NodeId};

use crate::error::{Result, VaultError};
use crate::keys::{AccountId, DataKey, StoredValue};
use crate::store::PartitionedStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActionKind {
    Put,
    Delete,
}

impl ActionKind {
    pub fn opposing(self) -> Self {
        match self {
            ActionKind::Put => ActionKind::Delete,
            ActionKind::Delete => ActionKind::Put,
        }
    }
}

/// One reported mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Put(StoredValue),
    Delete,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Put(_) => ActionKind::Put,
            Action::Delete => ActionKind::Delete,
        }
    }
}

/// The store operations the ledger is allowed to perform.
pub trait LedgerStore {
    fn contains(&self, key: &DataKey) -> Result<bool>;
    fn put(&self, key: &DataKey, value: &StoredValue) -> Result<()>;
    fn delete(&self, key: &DataKey) -> Result<()>;
}

/// One account's view of the partitioned store.
#[derive(Clone)]
pub struct AccountScope {
    store: Arc<PartitionedStore>,
    account_id: AccountId,
}

impl AccountScope {
    pub fn new(store: Arc<PartitionedStore>, account_id: AccountId) -> Self {
        Self { store, account_id }
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }
}

impl LedgerStore for AccountScope {
    fn contains(&self, key: &DataKey) -> Result<bool> {
        self.store.contains(self.account_id, key)
    }

    fn put(&self, key: &DataKey, value: &StoredValue) -> Result<()> {
        self.store.put(self.account_id, key, value)
    }

    fn delete(&self, key: &DataKey) -> Result<()> {
        self.store.delete(self.account_id, key)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LedgerConfig {
    quorum: usize,
    stale_after: Duration,
}

impl LedgerConfig {
    /// Quorum taken from the replica group's majority.
    pub fn for_group(group: &GroupConfig, stale_after: Duration) -> Result<Self> {
        Self::new(group.quorum(), stale_after)
    }

    pub fn new(quorum: usize, stale_after: Duration) -> Result<Self> {
        if quorum == 0 {
            return Err(VaultError::Config("ledger quorum must be at least 1".to_string()));
        }
        if stale_after.is_zero() {
            return Err(VaultError::Config("ledger stale window must be non-zero".to_string()));
        }
        Ok(Self {
            quorum,
            stale_after,
        })
    }

    /// Distinct reporters required before an action is applied.
    pub fn quorum(&self) -> usize {
        self.quorum
    }

    /// Pending actions older than this are dropped; commit records expire too.
    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            quorum: 3,
            stale_after: Duration::from_secs(30),
        }
    }
}

/// Sent upstream once an action has been applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitNotice {
    pub key: DataKey,
    pub kind: ActionKind,
    pub cost: u64,
    /// Zero for deletes.
    pub payload_len: usize,
    pub reporters: usize,
    /// Pending reporters of the opposing kind discarded by this commit.
    pub superseded: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Counted; still short of quorum.
    Pending { reporters: usize, quorum: usize },
    /// This reporter was already counted for the action.
    Duplicate,
    Committed(CommitNotice),
    /// The action was applied recently; late reports change nothing.
    AlreadyCommitted,
    /// Delete reported for a key the account does not hold.
    DeleteRejected,
}

/// A pending action dropped for lack of corroboration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Eviction {
    pub key: DataKey,
    pub kind: ActionKind,
    pub reporters: usize,
    pub age: Duration,
}

#[derive(Debug)]
struct PendingAction {
    payload: Option<StoredValue>,
    cost: u64,
    reporters: BTreeSet<NodeId>,
    first_seen: Instant,
}

type Slot = (DataKey, ActionKind);

/// Lazily evicted entries kept for the next `sweep`; the oldest go first.
const MAX_BUFFERED_EVICTIONS: usize = 4096;

/// Callers that drive the ledger directly should `sweep` periodically: lazily
/// evicted entries wait in a bounded buffer until then.
pub struct ActionMergeLedger<S> {
    store: S,
    config: LedgerConfig,
    pending: BTreeMap<Slot, PendingAction>,
    committed: BTreeMap<Slot, Instant>,
    evicted: Vec<Eviction>,
}

impl<S: LedgerStore> ActionMergeLedger<S> {
    pub fn new(store: S, config: LedgerConfig) -> Self {
        Self {
            store,
            config,
            pending: BTreeMap::new(),
            committed: BTreeMap::new(),
            evicted: Vec::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// True iff the key is currently stored, i.e. a delete for it is plausible.
    pub fn allow_delete(&self, key: &DataKey) -> Result<bool> {
        self.store.contains(key)
    }

    pub fn report(
        &mut self,
        key: DataKey,
        action: Action,
        cost: u64,
        reporter: NodeId,
    ) -> Result<MergeOutcome> {
        self.report_at(Instant::now(), key, action, cost, reporter)
    }

    pub fn report_at(
        &mut self,
        now: Instant,
        key: DataKey,
        action: Action,
        cost: u64,
        reporter: NodeId,
    ) -> Result<MergeOutcome> {
        let evicted = self.evict_stale(now);
        self.buffer_evictions(evicted);

        let kind = action.kind();
        let slot = (key, kind);
        if self.committed.contains_key(&slot) {
            debug!(?key, ?kind, ?reporter, "late report for committed action");
            return Ok(MergeOutcome::AlreadyCommitted);
        }

        if let Some(opposing) = self.pending.get(&(key, kind.opposing())) {
            if opposing.reporters.contains(&reporter) {
                return Err(VaultError::ConflictingAction(format!(
                    "{reporter:?} reported both put and delete for {key:?}"
                )));
            }
        }

        if kind == ActionKind::Delete && !self.allow_delete(&key)? {
            debug!(?key, ?reporter, "delete rejected: key not held");
            return Ok(MergeOutcome::DeleteRejected);
        }

        let quorum = self.config.quorum;
        let entry = self.pending.entry(slot).or_insert_with(|| PendingAction {
            payload: None,
            cost: 0,
            reporters: BTreeSet::new(),
            first_seen: now,
        });
        let counted = entry.reporters.insert(reporter);
        if counted {
            if let Action::Put(value) = action {
                entry.payload = Some(value);
            }
            entry.cost = entry.cost.max(cost);
        }

        let reporters = entry.reporters.len();
        if reporters < quorum {
            if !counted {
                return Ok(MergeOutcome::Duplicate);
            }
            return Ok(MergeOutcome::Pending { reporters, quorum });
        }
        if !counted {
            // Quorum was reached earlier but applying the action failed.
            debug!(?key, ?kind, ?reporter, "retrying commit");
        }

        let notice = self.commit(now, slot)?;
        Ok(MergeOutcome::Committed(notice))
    }

    /// Drop pending actions and commit records older than the stale window.
    pub fn evict_stale(&mut self, now: Instant) -> Vec<Eviction> {
        let stale_after = self.config.stale_after;
        let mut evicted = Vec::new();
        self.pending.retain(|(key, kind), action| {
            let age = now.saturating_duration_since(action.first_seen);
            if age < stale_after {
                return true;
            }
            warn!(
                ?key,
                ?kind,
                reporters = action.reporters.len(),
                age_ms = age.as_millis() as u64,
                "evicting uncorroborated action"
            );
            evicted.push(Eviction {
                key: *key,
                kind: *kind,
                reporters: action.reporters.len(),
                age,
            });
            false
        });
        self.committed
            .retain(|_, at| now.saturating_duration_since(*at) < stale_after);
        evicted
    }

    /// Evict stale entries and hand back everything evicted since the last call.
    pub fn sweep(&mut self, now: Instant) -> Vec<Eviction> {
        let evicted = self.evict_stale(now);
        let mut out = std::mem::take(&mut self.evicted);
        out.extend(evicted);
        out
    }

    fn buffer_evictions(&mut self, evicted: Vec<Eviction>) {
        self.evicted.extend(evicted);
        if self.evicted.len() > MAX_BUFFERED_EVICTIONS {
            let dropped = self.evicted.len() - MAX_BUFFERED_EVICTIONS;
            self.evicted.drain(..dropped);
            warn!(dropped, "eviction buffer full; call sweep more often");
        }
    }

    fn commit(&mut self, now: Instant, slot: Slot) -> Result<CommitNotice> {
        let (key, kind) = slot;
        let Some(action) = self.pending.get(&slot) else {
            return Err(VaultError::ConflictingAction(format!(
                "no pending {kind:?} for {key:?}"
            )));
        };

        // Apply before forgetting the pending entry so a storage failure
        // leaves it in place for the next report to retry.
        match (kind, &action.payload) {
            (ActionKind::Put, Some(value)) => self.store.put(&key, value)?,
            (ActionKind::Put, None) => return Err(VaultError::EmptyValue),
            (ActionKind::Delete, _) => self.store.delete(&key)?,
        }

        let cost = action.cost;
        let payload_len = action.payload.as_ref().map_or(0, StoredValue::len);
        let reporters = action.reporters.len();
        self.pending.remove(&slot);

        let superseded = match kind {
            ActionKind::Delete => self
                .pending
                .remove(&(key, ActionKind::Put))
                .map_or(0, |put| put.reporters.len()),
            ActionKind::Put => 0,
        };
        self.committed.remove(&(key, kind.opposing()));
        self.committed.insert(slot, now);

        info!(?key, ?kind, reporters, cost, superseded, "action committed");
        Ok(CommitNotice {
            key,
            kind,
            cost,
            payload_len,
            reporters,
            superseded,
        })
    }
}
