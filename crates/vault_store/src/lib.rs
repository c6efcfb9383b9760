//! Per-node storage for vault accounts.
//!
//! A single fjall keyspace holds every account in its own contiguous key
//! range. Replica reports flow through a bounded worker into per-owner
//! ledgers, which apply a put or delete once a quorum of peers agrees.

pub mod accounts;
pub mod config;
pub mod error;
pub mod keys;
pub mod ledger;
pub mod node;
pub mod store;
pub mod worker;

pub use accounts::{AccountCommit, AccountEviction, AccountHandler};
pub use config::NodeArgs;
pub use error::{Result, VaultError};
pub use keys::{AccountId, DataKey, DataTag, KeyLayout, StoredValue};
pub use ledger::{
    AccountScope, Action, ActionKind, ActionMergeLedger, CommitNotice, Eviction, LedgerConfig,
    LedgerStore, MergeOutcome,
};
pub use store::PartitionedStore;
pub use worker::{AccountEvent, Report, WorkerConfig, WorkerHandle};
