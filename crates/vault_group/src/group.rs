//! Group module wiring.
//!
//! `types` holds the identifier and configuration types, `proximity` the
//! holder/proximity classifier computed on every membership change.

mod proximity;
mod types;

pub use proximity::{check_holders, sort_by_distance, HolderChange, ProximityStatus};
pub use types::{
    closer_to_target, ClassifyError, GroupConfig, Identity, NodeId, IDENTITY_SIZE,
};
