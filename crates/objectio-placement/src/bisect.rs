//! Score Bisector: finds the lowest `picker_score` ceiling at which
//! `Allocator::fill_in_group` can still complete the group, via binary
//! search over the sorted, deduplicated scores of usable disks.

use crate::allocator::{Allocator, Group, UndoLog};

/// Returns the filled group at the minimal feasible score ceiling, or
/// `None` if no ceiling (including "no ceiling at all") admits a complete
/// fill.
pub(crate) fn find_minimal_group(allocator: &mut Allocator, group: &mut Group) -> Option<Group> {
    let mut scores: Vec<u32> = (0..allocator.registry.len() as u32)
        .filter(|&idx| allocator.disk_is_usable(idx))
        .map(|idx| allocator.registry.get(idx).picker_score())
        .collect();
    scores.sort_unstable();
    scores.dedup();

    if scores.is_empty() {
        return None;
    }

    let mut lo = 0usize;
    let mut hi = scores.len();
    let mut best: Option<Group> = None;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let mut undo = UndoLog::default();
        if allocator.fill_in_group(scores[mid], &mut undo, group) {
            best = Some(group.clone());
            allocator.revert_all(&mut undo, group);
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use super::*;
    use crate::domain::{DomainMapper, Location};
    use crate::ids::PDiskId;
    use crate::registry::{PDiskRecord, Registry};
    use crate::topology::GroupGeometry;

    fn record(node: u32, num_slots: u32, realm: &str, domain: &str) -> PDiskRecord {
        PDiskRecord {
            pdisk_id: PDiskId::new(node, 0),
            location: Location { realm_group: "dc1".into(), realm: realm.into(), domain: domain.into() },
            usable: true,
            decommitted: false,
            operational: true,
            num_slots,
            max_slots: 10,
            space_available: 1_000_000,
            groups: Vec::new(),
        }
    }

    #[test]
    fn picks_least_loaded_disks_first() {
        let mut registry = Registry::new();
        let mut mapper = DomainMapper::new();
        for realm in 0..2u32 {
            for domain in 0..2u32 {
                let node = realm * 10 + domain;
                let num_slots = if node == 0 { 5 } else { 0 };
                registry.register_pdisk(record(node, num_slots, &format!("r{realm}"), &format!("d{realm}-{domain}")), &mut mapper);
            }
        }
        registry.ensure_sorted();
        let geometry = GroupGeometry::new(2, 2, 1);
        let mut group: Group = vec![None; geometry.total_vdisks()];
        let mut allocator = Allocator::new(&registry, geometry, 0, false, HashSet::new(), &HashMap::new(), false);
        let result = find_minimal_group(&mut allocator, &mut group).expect("cluster is large enough to fill");
        assert!(result.iter().all(Option::is_some));
    }
}
