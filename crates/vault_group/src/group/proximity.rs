//! Holder/proximity classification for membership changes.
//!
//! Honest peers observing the same pair of snapshots must reach the same
//! answer, so everything here is a pure function of its inputs: snapshots are
//! sorted by distance to the target and de-duplicated before any set
//! arithmetic, making the caller's ordering irrelevant.

use std::cmp::Ordering;

use serde::Serialize;

use super::types::{ClassifyError, GroupConfig, Identity, NodeId};

/// Where this node sits relative to the closest nodes for a target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ProximityStatus {
    /// Inside the closest `group_size` nodes.
    InRange,
    /// Outside the group but inside the closest `proximal_size` nodes.
    InProximalRange,
    OutwithRange,
}

/// Result of comparing two membership snapshots for one target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HolderChange {
    /// Peers present in the new snapshot only, closest first.
    pub new_holders: Vec<NodeId>,
    /// Peers present in the old snapshot only, closest first.
    pub old_holders: Vec<NodeId>,
    pub proximity: ProximityStatus,
}

/// Sort `nodes` closest-first relative to `target` and drop duplicates.
pub fn sort_by_distance(nodes: &[NodeId], target: &Identity) -> Vec<NodeId> {
    let mut sorted = nodes.to_vec();
    sorted.sort_by(|lhs, rhs| lhs.distance_cmp(rhs, target));
    sorted.dedup();
    sorted
}

/// Compute added/removed holders and this node's proximity status.
///
/// Proximity is judged against `new_snapshot` only. A node equal to the
/// boundary peer counts as inside that boundary.
pub fn check_holders(
    old_snapshot: &[NodeId],
    new_snapshot: &[NodeId],
    self_id: &NodeId,
    target: &Identity,
    config: &GroupConfig,
) -> Result<HolderChange, ClassifyError> {
    if new_snapshot.is_empty() {
        return Err(ClassifyError::EmptySnapshot);
    }

    let old_sorted = sort_by_distance(old_snapshot, target);
    let new_sorted = sort_by_distance(new_snapshot, target);

    let new_holders = sorted_difference(&new_sorted, &old_sorted, target);
    let old_holders = sorted_difference(&old_sorted, &new_sorted, target);
    let proximity = classify(&new_sorted, self_id, target, config);

    Ok(HolderChange {
        new_holders,
        old_holders,
        proximity,
    })
}

fn classify(
    sorted: &[NodeId],
    self_id: &NodeId,
    target: &Identity,
    config: &GroupConfig,
) -> ProximityStatus {
    let within = |boundary: usize| {
        sorted.len() <= boundary
            || self_id.distance_cmp(&sorted[boundary - 1], target) != Ordering::Greater
    };

    if within(config.group_size()) {
        ProximityStatus::InRange
    } else if within(config.proximal_size()) {
        ProximityStatus::InProximalRange
    } else {
        ProximityStatus::OutwithRange
    }
}

/// Elements of `lhs` not in `rhs`; both inputs sorted by distance to `target`.
fn sorted_difference(lhs: &[NodeId], rhs: &[NodeId], target: &Identity) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut r = 0usize;
    for node in lhs {
        while r < rhs.len() && rhs[r].distance_cmp(node, target) == Ordering::Less {
            r += 1;
        }
        if r < rhs.len() && rhs[r] == *node {
            r += 1;
            continue;
        }
        out.push(*node);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::types::IDENTITY_SIZE;

    /// Node whose XOR distance to the all-zero target is `rank`.
    fn peer(rank: u8) -> NodeId {
        let mut bytes = [0u8; IDENTITY_SIZE];
        bytes[IDENTITY_SIZE - 1] = rank;
        NodeId::new(bytes)
    }

    fn target() -> Identity {
        Identity::zero()
    }

    fn config(group: usize, proximal: usize) -> GroupConfig {
        GroupConfig::new(group, proximal).expect("valid config")
    }

    #[test]
    fn holder_changes_follow_distance_order() {
        let old = [6, 1, 4, 3, 2, 5].map(peer);
        let new = [9, 1, 8, 2, 7, 3, 5].map(peer);
        // Ranks 1..=9 map to P1..P9; self sits between P5 and P7.
        let self_id = peer(6);

        let change =
            check_holders(&old, &new, &self_id, &target(), &config(4, 8)).expect("classify");

        assert_eq!(change.new_holders, vec![peer(7), peer(8), peer(9)]);
        assert_eq!(change.old_holders, vec![peer(4), peer(6)]);
        assert_eq!(change.proximity, ProximityStatus::InProximalRange);
    }

    #[test]
    fn self_ranked_fifth_is_proximal() {
        let old = [1, 2, 3, 4, 5, 6].map(peer);
        let new = [1, 2, 3, 5, 7, 8, 9].map(peer);
        // P7 is fifth in the new snapshot.
        let change =
            check_holders(&old, &new, &peer(7), &target(), &config(4, 8)).expect("classify");
        assert_eq!(change.proximity, ProximityStatus::InProximalRange);
    }

    #[test]
    fn small_snapshot_is_always_in_range() {
        let new = [10, 20, 30].map(peer);
        let change =
            check_holders(&[], &new, &peer(200), &target(), &config(4, 8)).expect("classify");
        assert_eq!(change.proximity, ProximityStatus::InRange);
        assert_eq!(change.new_holders, vec![peer(10), peer(20), peer(30)]);
        assert!(change.old_holders.is_empty());
    }

    #[test]
    fn boundary_peer_counts_as_inside() {
        let new = [1, 2, 3, 4, 5, 6].map(peer);
        let at_boundary =
            check_holders(&[], &new, &peer(4), &target(), &config(4, 8)).expect("classify");
        assert_eq!(at_boundary.proximity, ProximityStatus::InRange);

        let past_boundary =
            check_holders(&[], &new, &peer(5), &target(), &config(4, 5)).expect("classify");
        assert_eq!(past_boundary.proximity, ProximityStatus::InProximalRange);
    }

    #[test]
    fn far_node_is_outwith_range() {
        let new = (1..=12).map(peer).collect::<Vec<_>>();
        let change =
            check_holders(&[], &new, &peer(100), &target(), &config(4, 8)).expect("classify");
        assert_eq!(change.proximity, ProximityStatus::OutwithRange);
    }

    #[test]
    fn input_order_and_duplicates_do_not_matter() {
        let old = [3, 1, 2, 2].map(peer);
        let new_a = [5, 1, 4, 1].map(peer);
        let new_b = [4, 5, 1].map(peer);
        let a = check_holders(&old, &new_a, &peer(2), &target(), &config(2, 3)).expect("a");
        let b = check_holders(&old, &new_b, &peer(2), &target(), &config(2, 3)).expect("b");
        assert_eq!(a, b);
        assert_eq!(a.new_holders, vec![peer(4), peer(5)]);
        assert_eq!(a.old_holders, vec![peer(2), peer(3)]);
    }

    #[test]
    fn empty_new_snapshot_is_rejected() {
        let old = [1, 2].map(peer);
        let err = check_holders(&old, &[], &peer(1), &target(), &config(4, 8))
            .expect_err("empty snapshot");
        assert_eq!(err, ClassifyError::EmptySnapshot);
    }

    #[test]
    fn distance_uses_target_not_raw_order() {
        let mut target_bytes = [0u8; IDENTITY_SIZE];
        target_bytes[IDENTITY_SIZE - 1] = 0xff;
        let target = Identity::new(target_bytes);
        // Against 0xff, 0xfe (distance 1) is closer than 0x01 (distance 0xfe).
        let sorted = sort_by_distance(&[peer(0x01), peer(0xfe)], &target);
        assert_eq!(sorted, vec![peer(0xfe), peer(0x01)]);
        assert!(crate::closer_to_target(&peer(0xfe), &peer(0x01), &target));
    }

    #[test]
    fn config_rejects_degenerate_sizes() {
        assert!(GroupConfig::new(0, 4).is_err());
        assert!(GroupConfig::new(4, 4).is_err());
        assert_eq!(config(4, 16).quorum(), 3);
    }
}
