//! Group Layout Scorer: ranks candidate placements by how well they spread
//! VDisks across realm-groups, realms, and domains.

use std::collections::{HashMap, HashSet};

use crate::domain::PDiskLayoutPosition;
use crate::ids::{EntityId, VDiskId};
use crate::topology::GroupGeometry;

/// Misplacement counts at realm-group, realm, and domain level, worst first
/// so the tuple's natural ascending order is "better" — zero everywhere
/// means no misplacement at all. `Default` is [`Self::WORST`], not the
/// all-zero tuple a derive would give: a fresh, empty layout must compare
/// as worse than any real candidate until something is actually placed.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct GroupLayoutScore(u32, u32, u32);

impl GroupLayoutScore {
    pub const WORST: Self = Self(u32::MAX, u32::MAX, u32::MAX);

    #[must_use]
    pub fn better_than(&self, other: &Self) -> bool {
        self < other
    }

    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        self == other
    }
}

impl Default for GroupLayoutScore {
    fn default() -> Self {
        Self::WORST
    }
}

/// Minimum (under `better_than`) of `scores`, or [`GroupLayoutScore::WORST`]
/// if the iterator is empty — an empty partial group imposes no
/// admission constraint on the first disk placed into it.
pub(crate) fn worst_of(mut scores: impl Iterator<Item = GroupLayoutScore>) -> GroupLayoutScore {
    match scores.next() {
        None => GroupLayoutScore::WORST,
        Some(first) => scores.fold(first, |worst, s| if s.better_than(&worst) { worst } else { s }),
    }
}

/// Tracks which VDisk currently occupies which physical position, and scores
/// tentative placements against that state without mutating it.
#[derive(Clone)]
pub(crate) struct GroupLayout {
    topology: GroupGeometry,
    slots: Vec<Option<(VDiskId, PDiskLayoutPosition)>>,
}

impl GroupLayout {
    pub(crate) fn new(topology: GroupGeometry) -> Self {
        Self { slots: vec![None; topology.total_vdisks()], topology }
    }

    pub(crate) fn add_disk(&mut self, position: PDiskLayoutPosition, order_number: usize) {
        self.slots[order_number] = Some((self.topology.vdisk_id(order_number), position));
    }

    pub(crate) fn remove_disk(&mut self, order_number: usize) {
        self.slots[order_number] = None;
    }

    /// Score as if `position` were assigned to the vdisk at `order_number`,
    /// without mutating the tracked layout.
    pub(crate) fn get_candidate_score(&self, position: PDiskLayoutPosition, order_number: usize) -> GroupLayoutScore {
        let vdisk = self.topology.vdisk_id(order_number);
        Self::score_of(self.slots.iter().enumerate().map(|(i, slot)| if i == order_number { Some((vdisk, position)) } else { *slot }))
    }

    /// Score as if the disk currently at `order_number` were removed.
    pub(crate) fn get_excluded_disk_score(&self, order_number: usize) -> GroupLayoutScore {
        Self::score_of(self.slots.iter().enumerate().map(|(i, slot)| if i == order_number { None } else { *slot }))
    }

    fn score_of(entries: impl Iterator<Item = Option<(VDiskId, PDiskLayoutPosition)>>) -> GroupLayoutScore {
        let mut realm_groups: HashSet<EntityId> = HashSet::new();
        let mut realm_occupants: HashMap<EntityId, HashSet<u8>> = HashMap::new();
        let mut domain_occupants: HashMap<EntityId, HashSet<(u8, u8)>> = HashMap::new();

        for (vdisk, position) in entries.flatten() {
            realm_groups.insert(position.realm_group);
            realm_occupants.entry(position.realm).or_default().insert(vdisk.fail_realm);
            domain_occupants.entry(position.domain).or_default().insert((vdisk.fail_realm, vdisk.fail_domain));
        }

        let realm_group_spread = realm_groups.len().saturating_sub(1) as u32;
        let realm_collisions: u32 = realm_occupants.values().map(|occupants| occupants.len() as u32 - 1).sum();
        let domain_collisions: u32 = domain_occupants.values().map(|occupants| occupants.len() as u32 - 1).sum();
        GroupLayoutScore(realm_group_spread, realm_collisions, domain_collisions)
    }
}
