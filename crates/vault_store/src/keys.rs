//! Physical key layout for the account-partitioned store.
//!
//! A serialised key is `account_id ++ name ++ type_tag`, each part fixed-width
//! and big-endian, so byte order equals (account, name, tag) order and every
//! account owns one contiguous range starting at its prefix.

use serde::{Deserialize, Serialize};
use vault_group::{Identity, IDENTITY_SIZE};

use crate::error::{Result, VaultError};

/// Handle of one logical account inside the store.
pub type AccountId = u32;

/// Data types that can be held in an account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum DataTag {
    Anmaid = 0,
    Ansmid = 1,
    Antmid = 2,
    Anmpid = 3,
    Maid = 4,
    Smid = 5,
    Tmid = 6,
    Mpid = 7,
    ImmutableData = 8,
    OwnerDirectory = 9,
    GroupDirectory = 10,
    WorldDirectory = 11,
}

impl DataTag {
    pub const ALL: [DataTag; 12] = [
        DataTag::Anmaid,
        DataTag::Ansmid,
        DataTag::Antmid,
        DataTag::Anmpid,
        DataTag::Maid,
        DataTag::Smid,
        DataTag::Tmid,
        DataTag::Mpid,
        DataTag::ImmutableData,
        DataTag::OwnerDirectory,
        DataTag::GroupDirectory,
        DataTag::WorldDirectory,
    ];

    pub fn value(self) -> u8 {
        self as u8
    }

    pub fn from_value(value: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| u64::from(tag.value()) == value)
    }
}

/// Identifies one stored object within an account.
///
/// Field order matters: the derived ordering (name, then tag) is the order in
/// which an account's entries come back from a range scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataKey {
    pub name: Identity,
    pub tag: DataTag,
}

impl DataKey {
    pub fn new(name: Identity, tag: DataTag) -> Self {
        Self { name, tag }
    }
}

/// Opaque, non-empty stored blob.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct StoredValue(Vec<u8>);

impl StoredValue {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(VaultError::EmptyValue);
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

impl std::fmt::Debug for StoredValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StoredValue({} bytes)", self.0.len())
    }
}

/// Widths of the account prefix and type-tag suffix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyLayout {
    prefix_width: usize,
    suffix_width: usize,
}

impl Default for KeyLayout {
    fn default() -> Self {
        Self {
            prefix_width: 2,
            suffix_width: 1,
        }
    }
}

impl KeyLayout {
    pub fn new(prefix_width: usize, suffix_width: usize) -> Result<Self> {
        // AccountId is a u32, so the prefix can span at most four bytes.
        if !(1..=4).contains(&prefix_width) {
            return Err(VaultError::Config(format!(
                "account prefix width must be 1..=4 bytes, got {prefix_width}"
            )));
        }
        if !(1..=8).contains(&suffix_width) {
            return Err(VaultError::Config(format!(
                "type tag width must be 1..=8 bytes, got {suffix_width}"
            )));
        }
        Ok(Self {
            prefix_width,
            suffix_width,
        })
    }

    pub fn prefix_width(&self) -> usize {
        self.prefix_width
    }

    pub fn suffix_width(&self) -> usize {
        self.suffix_width
    }

    /// Number of distinct account ids the prefix can express.
    pub fn address_space(&self) -> u64 {
        1u64 << (8 * self.prefix_width)
    }

    /// Reserved "no accounts" value; never handed out.
    pub fn sentinel(&self) -> AccountId {
        (self.address_space() - 1) as AccountId
    }

    /// Ids available to live accounts (the address space minus the sentinel).
    pub fn usable_accounts(&self) -> usize {
        (self.address_space() - 1) as usize
    }

    pub fn key_len(&self) -> usize {
        self.prefix_width + IDENTITY_SIZE + self.suffix_width
    }

    pub fn account_prefix(&self, account_id: AccountId) -> Vec<u8> {
        encode_fixed(u64::from(account_id), self.prefix_width)
    }

    pub fn serialise(&self, account_id: AccountId, key: &DataKey) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.key_len());
        out.extend_from_slice(&self.account_prefix(account_id));
        out.extend_from_slice(key.name.as_bytes());
        out.extend_from_slice(&encode_fixed(u64::from(key.tag.value()), self.suffix_width));
        out
    }

    pub fn parse(&self, serialised: &[u8]) -> Result<(AccountId, DataKey)> {
        if serialised.len() != self.key_len() {
            return Err(VaultError::InvalidKeyEncoding(format!(
                "expected {} bytes, got {}",
                self.key_len(),
                serialised.len()
            )));
        }
        let (prefix, rest) = serialised.split_at(self.prefix_width);
        let (name, suffix) = rest.split_at(IDENTITY_SIZE);

        let account_id = decode_fixed(prefix) as AccountId;
        let name = Identity::from_slice(name).ok_or_else(|| {
            VaultError::InvalidKeyEncoding("name is not a full identity".to_string())
        })?;
        let tag_value = decode_fixed(suffix);
        let tag = DataTag::from_value(tag_value).ok_or_else(|| {
            VaultError::InvalidKeyEncoding(format!("unknown data tag {tag_value}"))
        })?;
        Ok((account_id, DataKey::new(name, tag)))
    }
}

fn encode_fixed(value: u64, width: usize) -> Vec<u8> {
    debug_assert!(width == 8 || value < (1u64 << (8 * width)));
    value.to_be_bytes()[8 - width..].to_vec()
}

fn decode_fixed(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte))
}
