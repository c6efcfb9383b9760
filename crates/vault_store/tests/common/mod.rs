#![allow(dead_code)]

use std::sync::Arc;

use tempfile::TempDir;
use vault_group::{Identity, IDENTITY_SIZE};
use vault_store::{KeyLayout, PartitionedStore, StoredValue};

/// Identity whose first and last bytes are `seed`.
pub fn id(seed: u8) -> Identity {
    let mut bytes = [0u8; IDENTITY_SIZE];
    bytes[0] = seed;
    bytes[IDENTITY_SIZE - 1] = seed;
    Identity::new(bytes)
}

pub fn value(text: &str) -> StoredValue {
    StoredValue::new(text.as_bytes().to_vec()).expect("non-empty value")
}

pub fn open_store(dir: &TempDir, layout: KeyLayout) -> Arc<PartitionedStore> {
    let store = PartitionedStore::open(dir.path().join("store"), layout).expect("open store");
    Arc::new(store)
}
