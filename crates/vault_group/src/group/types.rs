//! Shared identifier and configuration types.
//!
//! Node identifiers and data names live in the same 64-byte address space, so
//! a single `Identity` type serves both; `NodeId` is an alias used where the
//! value names a peer.

use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;

/// Size in bytes of node identifiers and content-address names.
pub const IDENTITY_SIZE: usize = 64;

/// Fixed-length identity in the network address space.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity([u8; IDENTITY_SIZE]);

/// Identity of a peer vault.
pub type NodeId = Identity;

impl Identity {
    pub const fn new(bytes: [u8; IDENTITY_SIZE]) -> Self {
        Self(bytes)
    }

    pub const fn zero() -> Self {
        Self([0u8; IDENTITY_SIZE])
    }

    /// Build an identity from a slice; `None` unless the slice is exactly
    /// `IDENTITY_SIZE` bytes long.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; IDENTITY_SIZE] = bytes.try_into().ok()?;
        Some(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; IDENTITY_SIZE] {
        &self.0
    }

    /// Compare the XOR distance of `self` and `other` to `target`.
    ///
    /// Distinct identities never tie under XOR against a common target, but
    /// the raw identifiers break ties anyway so the order stays total.
    pub fn distance_cmp(&self, other: &Self, target: &Self) -> Ordering {
        for ((lhs, rhs), t) in self.0.iter().zip(other.0.iter()).zip(target.0.iter()) {
            match (lhs ^ t).cmp(&(rhs ^ t)) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        self.0.cmp(&other.0)
    }
}

impl From<[u8; IDENTITY_SIZE]> for Identity {
    fn from(bytes: [u8; IDENTITY_SIZE]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Identity(")?;
        for byte in &self.0[..4] {
            write!(f, "{byte:02x}")?;
        }
        f.write_str("..")?;
        for byte in &self.0[IDENTITY_SIZE - 2..] {
            write!(f, "{byte:02x}")?;
        }
        f.write_str(")")
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// True when `lhs` is strictly closer to `target` than `rhs`.
pub fn closer_to_target(lhs: &NodeId, rhs: &NodeId, target: &Identity) -> bool {
    lhs.distance_cmp(rhs, target) == Ordering::Less
}

/// Replica-group sizing used by the proximity classifier.
///
/// `group_size` is the number of closest nodes responsible for an address;
/// `proximal_size` is the wider neighbourhood that still tracks it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct GroupConfig {
    group_size: usize,
    proximal_size: usize,
}

impl GroupConfig {
    pub const DEFAULT_GROUP_SIZE: usize = 4;
    pub const DEFAULT_PROXIMAL_SIZE: usize = 16;

    pub fn new(group_size: usize, proximal_size: usize) -> Result<Self, ClassifyError> {
        if group_size == 0 {
            return Err(ClassifyError::InvalidConfig(
                "group_size must be greater than zero".to_string(),
            ));
        }
        if proximal_size <= group_size {
            return Err(ClassifyError::InvalidConfig(format!(
                "proximal_size ({proximal_size}) must exceed group_size ({group_size})"
            )));
        }
        Ok(Self {
            group_size,
            proximal_size,
        })
    }

    pub fn group_size(&self) -> usize {
        self.group_size
    }

    pub fn proximal_size(&self) -> usize {
        self.proximal_size
    }

    /// Strict majority of the replica group.
    pub fn quorum(&self) -> usize {
        (self.group_size / 2) + 1
    }
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            group_size: Self::DEFAULT_GROUP_SIZE,
            proximal_size: Self::DEFAULT_PROXIMAL_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifyError {
    #[error("new membership snapshot is empty")]
    EmptySnapshot,

    #[error("invalid group configuration: {0}")]
    InvalidConfig(String),
}
