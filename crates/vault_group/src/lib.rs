//! Replica-group types for vault nodes.
//!
//! This crate is intentionally small and free of I/O: it defines the 64-byte
//! identifiers shared by nodes and data, the XOR closer-to-target ordering,
//! and the classifier that turns two membership snapshots into holder changes
//! plus this node's proximity to a target address.

pub mod group;

pub use group::{
    check_holders, closer_to_target, sort_by_distance, ClassifyError, GroupConfig, HolderChange,
    Identity, NodeId, ProximityStatus, IDENTITY_SIZE,
};
