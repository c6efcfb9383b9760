//! Maps data owners to their account and pending-action ledger.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};
use vault_group::{Identity, NodeId};

use crate::error::Result;
use crate::keys::{AccountId, DataKey};
use crate::ledger::{
    AccountScope, Action, ActionKind, ActionMergeLedger, CommitNotice, Eviction, LedgerConfig,
    MergeOutcome,
};
use crate::store::PartitionedStore;

/// A commit attributed to the owner whose account it touched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountCommit {
    pub owner: Identity,
    pub account_id: AccountId,
    pub notice: CommitNotice,
}

/// An eviction attributed to its owner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountEviction {
    pub owner: Identity,
    pub eviction: Eviction,
}

pub struct AccountHandler {
    store: Arc<PartitionedStore>,
    ledger_config: LedgerConfig,
    ledgers: BTreeMap<Identity, ActionMergeLedger<AccountScope>>,
}

impl AccountHandler {
    pub fn new(store: Arc<PartitionedStore>, ledger_config: LedgerConfig) -> Self {
        Self {
            store,
            ledger_config,
            ledgers: BTreeMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<PartitionedStore> {
        &self.store
    }

    pub fn account_id(&self, owner: &Identity) -> Option<AccountId> {
        self.ledgers
            .get(owner)
            .map(|ledger| ledger.store().account_id())
    }

    pub fn owner_count(&self) -> usize {
        self.ledgers.len()
    }

    pub fn report(
        &mut self,
        owner: Identity,
        key: DataKey,
        action: Action,
        cost: u64,
        reporter: NodeId,
    ) -> Result<MergeOutcome> {
        self.report_at(Instant::now(), owner, key, action, cost, reporter)
    }

    /// Route a report to the owner's ledger.
    ///
    /// The first put for an unknown owner registers a new account. A delete
    /// for an unknown owner cannot refer to stored data and is rejected.
    pub fn report_at(
        &mut self,
        now: Instant,
        owner: Identity,
        key: DataKey,
        action: Action,
        cost: u64,
        reporter: NodeId,
    ) -> Result<MergeOutcome> {
        if !self.ledgers.contains_key(&owner) {
            if action.kind() == ActionKind::Delete {
                debug!(?owner, ?key, "delete for owner without an account");
                return Ok(MergeOutcome::DeleteRejected);
            }
            let account_id = self.store.register_account()?;
            info!(?owner, account_id, "created account for owner");
            let scope = AccountScope::new(Arc::clone(&self.store), account_id);
            self.ledgers
                .insert(owner, ActionMergeLedger::new(scope, self.ledger_config));
        }

        match self.ledgers.get_mut(&owner) {
            Some(ledger) => ledger.report_at(now, key, action, cost, reporter),
            None => Ok(MergeOutcome::DeleteRejected),
        }
    }

    /// Drop the owner's ledger and every entry in its account.
    pub fn remove_account(&mut self, owner: &Identity) -> Result<bool> {
        let Some(ledger) = self.ledgers.get(owner) else {
            return Ok(false);
        };
        let account_id = ledger.store().account_id();
        self.store.unregister_account(account_id)?;
        self.ledgers.remove(owner);
        info!(?owner, account_id, "removed account for owner");
        Ok(true)
    }

    /// Evict stale pending actions across every ledger, then release the
    /// accounts of owners left with nothing pending and nothing stored.
    pub fn sweep(&mut self, now: Instant) -> Vec<AccountEviction> {
        let mut out = Vec::new();
        for (owner, ledger) in &mut self.ledgers {
            out.extend(ledger.sweep(now).into_iter().map(|eviction| AccountEviction {
                owner: *owner,
                eviction,
            }));
        }
        self.reclaim_idle();
        out
    }

    fn reclaim_idle(&mut self) {
        let idle = self
            .ledgers
            .iter()
            .filter(|(_, ledger)| ledger.pending_len() == 0)
            .map(|(owner, ledger)| (*owner, ledger.store().account_id()))
            .collect::<Vec<_>>();

        for (owner, account_id) in idle {
            let released = self.store.is_account_empty(account_id).and_then(|empty| {
                if empty {
                    self.store.unregister_account(account_id)
                } else {
                    Ok(false)
                }
            });
            match released {
                Ok(true) => {
                    self.ledgers.remove(&owner);
                    debug!(?owner, account_id, "released idle account");
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(?owner, account_id, error = ?err, "failed to release idle account")
                }
            }
        }
    }

    pub fn pending_len(&self) -> usize {
        self.ledgers.values().map(ActionMergeLedger::pending_len).sum()
    }
}
