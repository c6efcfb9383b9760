//! Quorum commits against the real store.
//!
//! Test flow:
//! 1) Five replicas report the same put for one account with quorum three.
//! 2) The same replicas then report a delete for the key.
//!
//! Verification:
//! - The store sees exactly one write; reports after quorum change nothing.
//! - The delete is only counted once the key exists, and removes it.

mod common;

use std::time::{Duration, Instant};

use common::{id, open_store, value};
use vault_group::GroupConfig;
use vault_store::{
    AccountScope, Action, ActionKind, ActionMergeLedger, DataKey, DataTag, KeyLayout,
    LedgerConfig, MergeOutcome, VaultError,
};

#[test]
fn put_then_delete_through_quorum() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir, KeyLayout::default());
    let account = store.register_account().expect("register");
    let group = GroupConfig::new(4, 16).expect("group config");
    let config = LedgerConfig::for_group(&group, Duration::from_secs(60)).expect("config");
    let mut ledger = ActionMergeLedger::new(AccountScope::new(store.clone(), account), config);

    let key = DataKey::new(id(42), DataTag::ImmutableData);
    let now = Instant::now();

    let early = ledger
        .report_at(now, key, Action::Delete, 0, id(1))
        .expect("early delete");
    assert_eq!(early, MergeOutcome::DeleteRejected);

    let mut committed = 0;
    for reporter in 1..=5 {
        let outcome = ledger
            .report_at(now, key, Action::Put(value("chunk")), 16, id(reporter))
            .expect("put report");
        match outcome {
            MergeOutcome::Committed(notice) => {
                committed += 1;
                assert_eq!(notice.reporters, 3);
                assert_eq!(notice.kind, ActionKind::Put);
            }
            MergeOutcome::Pending { .. } => assert!(reporter < 3),
            MergeOutcome::AlreadyCommitted => assert!(reporter > 3),
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert_eq!(committed, 1);
    assert_eq!(store.get(account, &key).expect("stored"), value("chunk"));

    for reporter in 1..=3 {
        ledger
            .report_at(now, key, Action::Delete, 0, id(reporter))
            .expect("delete report");
    }
    assert!(matches!(store.get(account, &key), Err(VaultError::NotFound)));
    assert!(!ledger.allow_delete(&key).expect("allow delete"));
    assert_eq!(ledger.pending_len(), 0);
}

#[test]
fn unregistered_account_surfaces_on_commit() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir, KeyLayout::default());
    let account = store.register_account().expect("register");
    let config = LedgerConfig::new(1, Duration::from_secs(60)).expect("config");
    let mut ledger = ActionMergeLedger::new(AccountScope::new(store.clone(), account), config);
    store.unregister_account(account).expect("unregister");

    let key = DataKey::new(id(1), DataTag::Maid);
    let err = ledger
        .report(key, Action::Put(value("x")), 1, id(1))
        .expect_err("account is gone");
    assert!(matches!(err, VaultError::UnknownAccount(a) if a == account));
}
