//! Account-partitioned ordered key-value store on fjall.
//!
//! Every account owns the contiguous key range that starts at its fixed-width
//! prefix. Range scans are bounded by the prefix of the next *registered*
//! account above it (or unbounded for the highest one), never by `id + 1`.
//!
//! Locking: a single `RwLock` guards the account registry. Registration and
//! unregistration take it exclusively; point reads/writes and full-account
//! scans share it. Point operations therefore run concurrently with each
//! other but never interleave with an in-flight unregistration, so a write
//! cannot race the bulk range delete.
//!
//! The store is ephemeral per process: `open` wipes the directory and
//! dropping (or `close`) removes it again.

use std::collections::BTreeSet;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::JoinHandle;

use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle};
use rand::Rng;
use tracing::{debug, info, warn};

use crate::error::{Result, VaultError};
use crate::keys::{AccountId, DataKey, KeyLayout, StoredValue};

const DATA_PARTITION: &str = "account_data";
/// Upper bound on deletes per atomic batch during unregistration.
const CHUNK_ITEMS: usize = 10_000;

pub struct PartitionedStore {
    layout: KeyLayout,
    accounts: RwLock<BTreeSet<AccountId>>,
    compactions: Mutex<Vec<JoinHandle<()>>>,
    keyspace: Keyspace,
    data: PartitionHandle,
    // Declared last so the directory outlives every engine handle above.
    dir: StoreDir,
}

impl PartitionedStore {
    /// Open a fresh store under `path`, discarding anything already there.
    pub fn open(path: impl AsRef<Path>, layout: KeyLayout) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            warn!(path = %path.display(), "removing existing store directory");
            std::fs::remove_dir_all(&path)?;
        }
        std::fs::create_dir_all(&path)?;

        let keyspace = fjall::Config::new(&path).open()?;
        let data = keyspace.open_partition(DATA_PARTITION, PartitionCreateOptions::default())?;
        info!(
            path = %path.display(),
            prefix_width = layout.prefix_width(),
            suffix_width = layout.suffix_width(),
            "opened partitioned store"
        );

        Ok(Self {
            layout,
            accounts: RwLock::new(BTreeSet::new()),
            compactions: Mutex::new(Vec::new()),
            keyspace,
            data,
            dir: StoreDir { path },
        })
    }

    /// Close the store and delete its directory.
    pub fn close(self) {
        drop(self);
    }

    pub fn path(&self) -> &Path {
        &self.dir.path
    }

    pub fn layout(&self) -> &KeyLayout {
        &self.layout
    }

    /// Allocate a random unused account id.
    pub fn register_account(&self) -> Result<AccountId> {
        let mut accounts = self.write_registry()?;
        if accounts.len() >= self.layout.usable_accounts() {
            return Err(VaultError::AddressSpaceExhausted {
                live: accounts.len(),
            });
        }

        // Rejection sampling over [0, sentinel); the sentinel is never drawn.
        let upper = self.layout.sentinel();
        let mut rng = rand::thread_rng();
        loop {
            let candidate = rng.gen_range(0..upper);
            if accounts.insert(candidate) {
                debug!(account_id = candidate, live = accounts.len(), "account registered");
                return Ok(candidate);
            }
        }
    }

    /// Remove an account and every entry in its range.
    ///
    /// Unknown ids are a no-op and return `false`. All deletes are committed
    /// before the id leaves the registry, so a failure part-way through leaves
    /// the account registered and the call can be retried.
    pub fn unregister_account(&self, account_id: AccountId) -> Result<bool> {
        let mut accounts = self.write_registry()?;
        if !accounts.contains(&account_id) {
            debug!(account_id, "ignoring unregister of unknown account");
            return Ok(false);
        }

        let keys = self
            .scan_range(&accounts, account_id)?
            .into_iter()
            .map(|(key, _)| key)
            .collect::<Vec<_>>();
        let removed = keys.len();

        let mut batch = self.keyspace.batch();
        let mut queued = 0usize;
        for key in keys {
            batch.remove(&self.data, key);
            queued += 1;
            if queued >= CHUNK_ITEMS {
                batch.commit()?;
                batch = self.keyspace.batch();
                queued = 0;
            }
        }
        if queued > 0 {
            batch.commit()?;
        }

        accounts.remove(&account_id);
        drop(accounts);

        info!(account_id, removed, "account unregistered");
        if removed > 0 {
            self.schedule_compaction();
        }
        Ok(true)
    }

    /// Upsert `key` under `account_id`; last write wins.
    pub fn put(&self, account_id: AccountId, key: &DataKey, value: &StoredValue) -> Result<()> {
        let accounts = self.read_registry()?;
        ensure_live(&accounts, account_id)?;
        let db_key = self.layout.serialise(account_id, key);
        self.data.insert(db_key, value.as_bytes().to_vec())?;
        Ok(())
    }

    /// Remove `key` under `account_id`. Deleting an absent key succeeds.
    pub fn delete(&self, account_id: AccountId, key: &DataKey) -> Result<()> {
        let accounts = self.read_registry()?;
        ensure_live(&accounts, account_id)?;
        let db_key = self.layout.serialise(account_id, key);
        self.data.remove(db_key)?;
        Ok(())
    }

    pub fn get(&self, account_id: AccountId, key: &DataKey) -> Result<StoredValue> {
        let accounts = self.read_registry()?;
        ensure_live(&accounts, account_id)?;
        let db_key = self.layout.serialise(account_id, key);
        let bytes = self.data.get(&db_key)?.ok_or(VaultError::NotFound)?;
        StoredValue::new(bytes.to_vec())
    }

    pub fn contains(&self, account_id: AccountId, key: &DataKey) -> Result<bool> {
        let accounts = self.read_registry()?;
        ensure_live(&accounts, account_id)?;
        let db_key = self.layout.serialise(account_id, key);
        Ok(self.data.get(&db_key)?.is_some())
    }

    /// Every entry of one account, ordered by name then type tag.
    pub fn get_all(&self, account_id: AccountId) -> Result<Vec<(DataKey, StoredValue)>> {
        let accounts = self.read_registry()?;
        ensure_live(&accounts, account_id)?;

        let mut out = Vec::new();
        for (raw_key, raw_value) in self.scan_range(&accounts, account_id)? {
            let (owner, key) = self.layout.parse(&raw_key)?;
            if owner != account_id {
                return Err(VaultError::InvalidKeyEncoding(format!(
                    "key for account {owner} found in range of account {account_id}"
                )));
            }
            out.push((key, StoredValue::new(raw_value)?));
        }
        Ok(out)
    }

    pub fn is_registered(&self, account_id: AccountId) -> Result<bool> {
        Ok(self.read_registry()?.contains(&account_id))
    }

    pub fn account_count(&self) -> Result<usize> {
        Ok(self.read_registry()?.len())
    }

    pub fn accounts(&self) -> Result<Vec<AccountId>> {
        Ok(self.read_registry()?.iter().copied().collect())
    }

    /// True when the account is live and holds no entries.
    pub fn is_account_empty(&self, account_id: AccountId) -> Result<bool> {
        let accounts = self.read_registry()?;
        ensure_live(&accounts, account_id)?;
        match self.range_iter(&accounts, account_id).next() {
            Some(item) => {
                item?;
                Ok(false)
            }
            None => Ok(true),
        }
    }

    /// Iterator over one account's raw range. Callers hold the registry lock.
    fn range_iter(
        &self,
        accounts: &BTreeSet<AccountId>,
        account_id: AccountId,
    ) -> Box<dyn DoubleEndedIterator<Item = fjall::Result<fjall::KvPair>>> {
        let start = self.layout.account_prefix(account_id);
        let end = accounts
            .range((Bound::Excluded(account_id), Bound::Unbounded))
            .next()
            .map(|next| self.layout.account_prefix(*next));

        match end {
            Some(end) => Box::new(self.data.range(start..end)),
            None => Box::new(self.data.range(start..)),
        }
    }

    /// Snapshot one account's raw range. Callers hold the registry lock.
    fn scan_range(
        &self,
        accounts: &BTreeSet<AccountId>,
        account_id: AccountId,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::new();
        for item in self.range_iter(accounts, account_id) {
            let (key, value) = item?;
            out.push((key.to_vec(), value.to_vec()));
        }
        Ok(out)
    }

    fn schedule_compaction(&self) {
        let data = self.data.clone();
        let spawned = std::thread::Builder::new()
            .name("vault-compaction".to_string())
            .spawn(move || {
                if let Err(err) = data.major_compact() {
                    warn!(error = ?err, "account range compaction failed");
                }
            });
        match spawned {
            Ok(handle) => {
                if let Ok(mut running) = self.compactions.lock() {
                    running.retain(|h| !h.is_finished());
                    running.push(handle);
                }
            }
            Err(err) => warn!(error = ?err, "failed to spawn compaction thread"),
        }
    }

    fn read_registry(&self) -> Result<RwLockReadGuard<'_, BTreeSet<AccountId>>> {
        self.accounts.read().map_err(|_| VaultError::LockPoisoned)
    }

    fn write_registry(&self) -> Result<RwLockWriteGuard<'_, BTreeSet<AccountId>>> {
        self.accounts.write().map_err(|_| VaultError::LockPoisoned)
    }
}

impl Drop for PartitionedStore {
    fn drop(&mut self) {
        let running = match self.compactions.get_mut() {
            Ok(running) => std::mem::take(running),
            Err(poisoned) => std::mem::take(poisoned.into_inner()),
        };
        for handle in running {
            let _ = handle.join();
        }
    }
}

fn ensure_live(accounts: &BTreeSet<AccountId>, account_id: AccountId) -> Result<()> {
    if accounts.contains(&account_id) {
        Ok(())
    } else {
        Err(VaultError::UnknownAccount(account_id))
    }
}

/// Removes the store directory once every engine handle has been dropped.
struct StoreDir {
    path: PathBuf,
}

impl Drop for StoreDir {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_dir_all(&self.path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = ?err, "failed to destroy store directory");
            }
        }
    }
}
