use thiserror::Error;

use crate::keys::AccountId;

pub type Result<T> = std::result::Result<T, VaultError>;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("storage engine error: {0}")]
    Storage(#[from] fjall::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("key not found")]
    NotFound,

    #[error("account address space exhausted ({live} live accounts)")]
    AddressSpaceExhausted { live: usize },

    #[error("unknown account: {0}")]
    UnknownAccount(AccountId),

    #[error("invalid key encoding: {0}")]
    InvalidKeyEncoding(String),

    #[error("conflicting action: {0}")]
    ConflictingAction(String),

    #[error("stored values must be non-empty")]
    EmptyValue,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("request queue is full")]
    Backpressure,

    #[error("account worker has stopped")]
    WorkerStopped,

    #[error("account registry lock poisoned")]
    LockPoisoned,
}
