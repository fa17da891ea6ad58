//! Allocator and Entity Allocation Engine: fills the empty slots of a
//! partial group under a fixed score ceiling, backtracking through nested
//! realm-group / realm / domain / disk entities via an undo log.

use std::collections::{HashMap, HashSet};

use crate::domain::PDiskLayoutPosition;
use crate::error::MapperError;
use crate::ids::{EntityId, PDiskId, VDiskId};
use crate::registry::Registry;
use crate::scorer::{worst_of, GroupLayout, GroupLayoutScore};
use crate::topology::{GroupDefinition, GroupGeometry};

use entity::Allocatable;

/// Disk indices occupying each dense VDisk slot; `None` means still empty.
pub(crate) type Group = Vec<Option<u32>>;

/// Dense bitmap of forbidden [`EntityId`]s, sized once by
/// `DomainMapper::id_count()`. A hand-rolled `Vec<u64>` rather than a
/// `HashSet`, since this is checked on every candidate in the hot scan loop.
pub(crate) struct ForbiddenBitmap {
    bits: Vec<u64>,
}

impl ForbiddenBitmap {
    pub(crate) fn new(id_count: usize) -> Self {
        Self { bits: vec![0u64; id_count.div_ceil(64).max(1)] }
    }

    pub(crate) fn set(&mut self, id: EntityId) {
        let i = id.index();
        self.bits[i / 64] |= 1 << (i % 64);
    }

    pub(crate) fn get(&self, id: EntityId) -> bool {
        let i = id.index();
        (self.bits[i / 64] >> (i % 64)) & 1 != 0
    }
}

/// Append-only log of `(slot_index, disk_index)` assignments, so a failed
/// branch of the search can be undone back to any earlier checkpoint.
#[derive(Default)]
pub(crate) struct UndoLog {
    entries: Vec<(usize, u32)>,
}

impl UndoLog {
    pub(crate) fn checkpoint(&self) -> usize {
        self.entries.len()
    }
}

/// Per-call derived state for one disk: whether it currently qualifies as a
/// candidate under the active score ceiling, and how many more matching
/// disks remain in the same realm-group/realm/domain from this point on
/// (lets the scan jump past an entire forbidden scope in one step). Kept
/// separate from the registry's long-lived [`crate::registry::PDiskRecord`]
/// since it is recomputed from scratch on every allocation attempt.
#[derive(Clone, Copy, Default)]
struct DiskWorkingState {
    matching: bool,
    num_domain_matching_disks: u32,
    skip_to_next_realm_group: u32,
    skip_to_next_realm: u32,
    skip_to_next_domain: u32,
}

/// Half-open `[from, to)` bounds into `Allocator::candidates`.
type DiskRange = (usize, usize);

pub struct Allocator<'r> {
    pub(crate) registry: &'r Registry,
    pub(crate) topology: GroupGeometry,
    required_space: i64,
    require_operational: bool,
    forbidden_disks: HashSet<PDiskId>,
    old_group_content: HashSet<PDiskId>,
    locality_factor: HashMap<u32, u32>,
    group_layout: GroupLayout,
    worst_score: Option<GroupLayoutScore>,
    disk_state: Vec<DiskWorkingState>,
    candidates: Vec<(PDiskLayoutPosition, u32)>,
    randomize: bool,
}

impl<'r> Allocator<'r> {
    pub(crate) fn new(
        registry: &'r Registry,
        topology: GroupGeometry,
        required_space: i64,
        require_operational: bool,
        forbidden_disks: HashSet<PDiskId>,
        replaced_disks: &HashMap<VDiskId, PDiskId>,
        randomize: bool,
    ) -> Self {
        let n = registry.len();
        let old_group_content: HashSet<PDiskId> = replaced_disks.values().copied().collect();
        Self {
            registry,
            topology,
            required_space,
            require_operational,
            forbidden_disks,
            old_group_content,
            locality_factor: HashMap::new(),
            group_layout: GroupLayout::new(topology),
            worst_score: None,
            disk_state: vec![DiskWorkingState::default(); n],
            candidates: Vec::new(),
            randomize,
        }
    }

    fn invalidate_worst_score(&mut self) {
        self.worst_score = None;
    }

    fn worst_score(&mut self, group: &Group) -> GroupLayoutScore {
        if let Some(score) = self.worst_score {
            return score;
        }
        let group_layout = &self.group_layout;
        let registry = self.registry;
        let score = worst_of(group.iter().enumerate().filter_map(|(order, occupant)| {
            let idx = (*occupant)?;
            if registry.get(idx).record.decommitted {
                return None;
            }
            Some(group_layout.get_excluded_disk_score(order))
        }));
        self.worst_score = Some(score);
        score
    }

    fn add_used_disk(&mut self, idx: u32) {
        for &group_id in &self.registry.get(idx).record.groups {
            *self.locality_factor.entry(group_id).or_insert(0) += 1;
        }
    }

    fn remove_used_disk(&mut self, idx: u32) {
        for &group_id in &self.registry.get(idx).record.groups {
            if let Some(count) = self.locality_factor.get_mut(&group_id) {
                *count -= 1;
                if *count == 0 {
                    self.locality_factor.remove(&group_id);
                }
            }
        }
    }

    fn locality_factor_of(&self, idx: u32) -> u32 {
        self.registry.get(idx).record.groups.iter().filter_map(|g| self.locality_factor.get(g)).sum()
    }

    /// Walks the caller-supplied (possibly partial) group, validating every
    /// occupied slot's PDiskId is registered and appears only once, and
    /// folding its non-decommitted disks into locality/layout accounting.
    pub(crate) fn process_existing_group(&mut self, group: &GroupDefinition) -> Result<Group, MapperError> {
        let mut result: Group = vec![None; self.topology.total_vdisks()];
        for (realm_idx, realm) in group.iter().enumerate() {
            for (domain_idx, domain) in realm.iter().enumerate() {
                for (vdisk_idx, occupant) in domain.iter().enumerate() {
                    let Some(pdisk_id) = occupant else { continue };
                    let idx = self.registry.find_index(*pdisk_id).ok_or(MapperError::MissingPDisk(*pdisk_id))?;
                    if !self.old_group_content.insert(*pdisk_id) {
                        return Err(MapperError::DuplicatePDisk(*pdisk_id));
                    }
                    let order = self.topology.order_number(VDiskId::new(realm_idx as u8, domain_idx as u8, vdisk_idx as u8));
                    result[order] = Some(idx);
                    if !self.registry.get(idx).record.decommitted {
                        self.add_used_disk(idx);
                        self.group_layout.add_disk(self.registry.get(idx).position, order);
                    }
                }
            }
        }
        Ok(result)
    }

    pub(crate) fn disk_is_usable(&self, idx: u32) -> bool {
        let info = self.registry.get(idx);
        info.is_usable()
            && !self.old_group_content.contains(&info.record.pdisk_id)
            && !self.forbidden_disks.contains(&info.record.pdisk_id)
            && (!self.require_operational || info.record.operational)
            && info.record.space_available >= self.required_space
    }

    /// `DiskIsBetter`: the one and only tie-break among disks sharing the
    /// best score seen for a slot. Fewer occupied slots wins outright;
    /// failing that, locality/quota preference; failing that, more
    /// already-matching siblings in the same domain; failing that, the
    /// lower PDiskId, for determinism.
    fn disk_is_better(&self, pretender: u32, king: u32) -> bool {
        let p = self.registry.get(pretender);
        let k = self.registry.get(king);
        if p.record.num_slots != k.record.num_slots {
            return p.record.num_slots < k.record.num_slots;
        }
        let p_locality = self.locality_factor_of(pretender);
        let k_locality = self.locality_factor_of(king);
        if p_locality != k_locality {
            return if self.randomize { p_locality < k_locality } else { p_locality > k_locality };
        }
        if p.record.space_available != k.record.space_available {
            return p.record.space_available < k.record.space_available;
        }
        let p_state = self.disk_state[pretender as usize];
        let k_state = self.disk_state[king as usize];
        if p_state.num_domain_matching_disks != k_state.num_domain_matching_disks {
            return p_state.num_domain_matching_disks > k_state.num_domain_matching_disks;
        }
        p.record.pdisk_id < k.record.pdisk_id
    }

    fn add_disk_via_undo(&mut self, undo: &mut UndoLog, group: &mut Group, slot: usize, idx: u32) {
        undo.entries.push((slot, idx));
        group[slot] = Some(idx);
        self.add_used_disk(idx);
        self.group_layout.add_disk(self.registry.get(idx).position, slot);
        self.invalidate_worst_score();
    }

    fn revert(&mut self, undo: &mut UndoLog, group: &mut Group, until: usize) {
        while undo.entries.len() > until {
            let (slot, idx) = undo.entries.pop().expect("checked non-empty above");
            group[slot] = None;
            self.remove_used_disk(idx);
            self.group_layout.remove_disk(slot);
        }
        self.invalidate_worst_score();
    }

    /// Reverts every entry logged in `undo`, back to an empty log. Used by
    /// the bisector between probes at different score ceilings.
    pub(crate) fn revert_all(&mut self, undo: &mut UndoLog, group: &mut Group) {
        self.revert(undo, group, 0);
    }

    /// One pass over the sorted position index: marks each disk as
    /// currently matching (usable and under `max_score`), and computes the
    /// skip-ahead counts the leaf scan uses to jump over a whole forbidden
    /// scope without visiting every disk in it.
    fn setup_matching_disks(&mut self, max_score: u32) {
        let mut candidates: Vec<(PDiskLayoutPosition, u32)> = Vec::with_capacity(self.registry.len());
        let mut realm_group_begin = 0usize;
        let mut realm_begin = 0usize;
        let mut domain_begin = 0usize;
        let mut prev: Option<PDiskLayoutPosition> = None;
        let mut matching_in_domain: HashMap<EntityId, u32> = HashMap::new();

        for &(position, idx) in self.registry.position_index() {
            let matching = self.disk_is_usable(idx) && self.registry.get(idx).picker_score() <= max_score;
            self.disk_state[idx as usize].matching = matching;
            if !matching {
                continue;
            }
            let changed_realm_group = prev.is_none_or(|p| p.realm_group != position.realm_group);
            let changed_realm = prev.is_none_or(|p| p.realm_group != position.realm_group || p.realm != position.realm);
            let changed_domain = changed_realm || prev.is_some_and(|p| p.domain != position.domain);

            if changed_realm_group {
                Self::flush_skip(&candidates, &mut realm_group_begin, &mut self.disk_state, |s| &mut s.skip_to_next_realm_group);
            }
            if changed_realm {
                Self::flush_skip(&candidates, &mut realm_begin, &mut self.disk_state, |s| &mut s.skip_to_next_realm);
            }
            if changed_domain {
                Self::flush_skip(&candidates, &mut domain_begin, &mut self.disk_state, |s| &mut s.skip_to_next_domain);
            }

            prev = Some(position);
            *matching_in_domain.entry(position.domain).or_insert(0) += 1;
            candidates.push((position, idx));
        }
        Self::flush_skip(&candidates, &mut realm_group_begin, &mut self.disk_state, |s| &mut s.skip_to_next_realm_group);
        Self::flush_skip(&candidates, &mut realm_begin, &mut self.disk_state, |s| &mut s.skip_to_next_realm);
        Self::flush_skip(&candidates, &mut domain_begin, &mut self.disk_state, |s| &mut s.skip_to_next_domain);

        for &(position, idx) in &candidates {
            self.disk_state[idx as usize].num_domain_matching_disks = matching_in_domain[&position.domain];
        }
        self.candidates = candidates;
    }

    fn flush_skip(
        candidates: &[(PDiskLayoutPosition, u32)],
        begin: &mut usize,
        disk_state: &mut [DiskWorkingState],
        field: impl Fn(&mut DiskWorkingState) -> &mut u32,
    ) {
        while *begin < candidates.len() {
            let skip = (candidates.len() - *begin) as u32;
            let idx = candidates[*begin].1;
            *field(&mut disk_state[idx as usize]) = skip;
            *begin += 1;
        }
    }

    /// Tries to fill every still-empty slot of `group` using only disks
    /// whose `picker_score()` (= `num_slots`) is at most `max_score`.
    /// Reverts fully and returns `false` if any slot proves unfillable.
    ///
    /// First classifies the group into empty / partially-empty regions, then
    /// dispatches each region to the narrowest entity kind that covers it
    /// (`WholeGroup`, `WholeRealm`, `WholeDomain`, or a lone `SingleDisk`),
    /// so backtracking only ever searches the scope that actually needs it.
    pub(crate) fn fill_in_group(&mut self, max_score: u32, undo: &mut UndoLog, group: &mut Group) -> bool {
        self.setup_matching_disks(max_score);

        let mut is_empty_group = true;
        let mut is_empty_realm = vec![true; self.topology.num_fail_realms as usize];
        let mut is_empty_domain = vec![true; self.topology.total_fail_domains()];
        for (order, occupant) in group.iter().enumerate() {
            if occupant.is_some() {
                let vdisk = self.topology.vdisk_id(order);
                is_empty_group = false;
                is_empty_realm[vdisk.fail_realm as usize] = false;
                is_empty_domain[self.topology.fail_domain_order_number(vdisk)] = false;
            }
        }

        if is_empty_group {
            return self.allocate_entity::<entity::WholeGroup>(0, undo, group);
        }

        let num_fail_domains_per_realm = self.topology.num_fail_domains_per_realm;
        let num_vdisks_per_domain = self.topology.num_vdisks_per_domain;
        let mut domain_order_number = 0u32;
        let mut order_number = 0u32;

        for fail_realm_idx in 0..is_empty_realm.len() as u32 {
            if is_empty_realm[fail_realm_idx as usize] {
                if !self.allocate_entity::<entity::WholeRealm>(fail_realm_idx, undo, group) {
                    return false;
                }
                domain_order_number += num_fail_domains_per_realm;
                order_number += num_vdisks_per_domain * num_fail_domains_per_realm;
                continue;
            }

            for _fail_domain_idx in 0..num_fail_domains_per_realm {
                if is_empty_domain[domain_order_number as usize] {
                    if !self.allocate_entity::<entity::WholeDomain>(domain_order_number, undo, group) {
                        return false;
                    }
                    order_number += num_vdisks_per_domain;
                } else {
                    for _vdisk_idx in 0..num_vdisks_per_domain {
                        if group[order_number as usize].is_none() && !self.allocate_entity::<entity::SingleDisk>(order_number, undo, group) {
                            return false;
                        }
                        order_number += 1;
                    }
                }
                domain_order_number += 1;
            }
        }

        debug_assert_eq!(domain_order_number as usize, self.topology.total_fail_domains());
        debug_assert_eq!(order_number as usize, self.topology.total_vdisks());
        true
    }

    /// Allocates one top-level entity (a realm, a domain, a disk, or the
    /// whole group) against a fresh forbidden-entity set, reverting the
    /// whole undo log on failure.
    fn allocate_entity<T: Allocatable>(&mut self, index: u32, undo: &mut UndoLog, group: &mut Group) -> bool {
        let mut forbidden = ForbiddenBitmap::new(self.id_count());
        let full_range = (0, self.candidates.len());
        if T::allocate(self, group, undo, index, full_range, &mut forbidden).is_none() {
            self.revert(undo, group, 0);
            return false;
        }
        true
    }

    fn id_count(&self) -> usize {
        self.candidates.iter().map(|(p, _)| p.realm_group.index().max(p.realm.index()).max(p.domain.index())).max().map_or(1, |m| m + 1)
    }

    fn find_matching_disk_based_on_score(&mut self, order_number: usize, range: DiskRange, forbidden: &ForbiddenBitmap, group: &Group) -> Option<u32> {
        let worst = self.worst_score(group);
        let mut best_score = worst;
        let mut tied: Vec<u32> = Vec::new();
        let (mut i, end) = range;

        while i < end {
            let (position, idx) = self.candidates[i];
            let state = self.disk_state[idx as usize];
            if !state.matching {
                i += 1;
                continue;
            }
            if forbidden.get(position.realm_group) {
                i += state.skip_to_next_realm_group.max(1) as usize;
                continue;
            }
            if forbidden.get(position.realm) {
                i += state.skip_to_next_realm.max(1) as usize;
                continue;
            }
            if forbidden.get(position.domain) {
                i += state.skip_to_next_domain.max(1) as usize;
                continue;
            }
            let score = self.group_layout.get_candidate_score(position, order_number);
            if score.better_than(&best_score) {
                tied.clear();
                best_score = score;
            }
            if score.same_as(&best_score) {
                tied.push(idx);
            }
            i += 1;
        }

        tied.into_iter().reduce(|king, pretender| if self.disk_is_better(pretender, king) { pretender } else { king })
    }

    fn narrow(&self, range: DiskRange, min: PDiskLayoutPosition, max: PDiskLayoutPosition) -> DiskRange {
        let (from, to) = range;
        let slice = &self.candidates[from..to];
        let new_from = from + slice.partition_point(|c| c.0 < min);
        let slice = &self.candidates[new_from..to];
        let new_to = new_from + slice.partition_point(|c| c.0 <= max);
        (new_from, new_to)
    }
}

/// The four entity kinds of the allocation hierarchy, dispatched by
/// monomorphization rather than `dyn` dispatch: `WholeGroup` recurses into
/// `WholeRealm`, into `WholeDomain`, into the leaf `SingleDisk`.
mod entity {
    use super::{Allocator, DiskRange, ForbiddenBitmap, Group, UndoLog};
    use crate::domain::PDiskLayoutPosition;
    use crate::ids::EntityId;
    use crate::topology::GroupGeometry;

    pub(super) trait Allocatable {
        fn allocate(
            allocator: &mut Allocator,
            group: &mut Group,
            undo: &mut UndoLog,
            parent_entity_index: u32,
            range: DiskRange,
            forbidden: &mut ForbiddenBitmap,
        ) -> Option<PDiskLayoutPosition>;
    }

    pub(super) trait ParentEntity: Allocatable {
        type Nested: Allocatable;
        fn child_count(topology: &GroupGeometry) -> u32;
        fn make_range(pos: PDiskLayoutPosition) -> (EntityId, PDiskLayoutPosition, PDiskLayoutPosition);
    }

    pub(super) struct WholeGroup;
    pub(super) struct WholeRealm;
    pub(super) struct WholeDomain;
    pub(super) struct SingleDisk;

    impl ParentEntity for WholeGroup {
        type Nested = WholeRealm;
        fn child_count(topology: &GroupGeometry) -> u32 {
            topology.num_fail_realms
        }
        fn make_range(pos: PDiskLayoutPosition) -> (EntityId, PDiskLayoutPosition, PDiskLayoutPosition) {
            let (min, max) = PDiskLayoutPosition::realm_group_range(pos.realm_group);
            (pos.realm_group, min, max)
        }
    }

    impl ParentEntity for WholeRealm {
        type Nested = WholeDomain;
        fn child_count(topology: &GroupGeometry) -> u32 {
            topology.num_fail_domains_per_realm
        }
        fn make_range(pos: PDiskLayoutPosition) -> (EntityId, PDiskLayoutPosition, PDiskLayoutPosition) {
            let (min, max) = PDiskLayoutPosition::realm_range(pos.realm_group, pos.realm);
            (pos.realm, min, max)
        }
    }

    impl ParentEntity for WholeDomain {
        type Nested = SingleDisk;
        fn child_count(topology: &GroupGeometry) -> u32 {
            topology.num_vdisks_per_domain
        }
        fn make_range(pos: PDiskLayoutPosition) -> (EntityId, PDiskLayoutPosition, PDiskLayoutPosition) {
            let (min, max) = PDiskLayoutPosition::domain_range(pos.realm_group, pos.realm, pos.domain);
            (pos.domain, min, max)
        }
    }

    impl<T: ParentEntity> Allocatable for T {
        fn allocate(
            allocator: &mut Allocator,
            group: &mut Group,
            undo: &mut UndoLog,
            parent_entity_index: u32,
            range: DiskRange,
            forbidden: &mut ForbiddenBitmap,
        ) -> Option<PDiskLayoutPosition> {
            let child_count = T::child_count(&allocator.topology);
            let base = parent_entity_index * child_count;
            let checkpoint = undo.checkpoint();

            'retry: loop {
                let (mut from, mut to) = range;
                let mut scope = EntityId::MIN;
                let mut index = 0u32;
                while index < child_count {
                    match T::Nested::allocate(allocator, group, undo, base + index, (from, to), forbidden) {
                        Some(pos) => {
                            if index == 0 {
                                let (s, min, max) = T::make_range(pos);
                                scope = s;
                                (from, to) = allocator.narrow(range, min, max);
                            }
                            if index + 1 == child_count {
                                forbidden.set(scope);
                                return Some(pos);
                            }
                        }
                        None => {
                            if index == 0 {
                                return None;
                            }
                            forbidden.set(scope);
                            allocator.revert(undo, group, checkpoint);
                            continue 'retry;
                        }
                    }
                    index += 1;
                }
                unreachable!("loop returns once index + 1 == child_count on the path above");
            }
        }
    }

    impl Allocatable for SingleDisk {
        fn allocate(
            allocator: &mut Allocator,
            group: &mut Group,
            undo: &mut UndoLog,
            slot_index: u32,
            range: DiskRange,
            forbidden: &mut ForbiddenBitmap,
        ) -> Option<PDiskLayoutPosition> {
            debug_assert!(group[slot_index as usize].is_none());
            let best = allocator.find_matching_disk_based_on_score(slot_index as usize, range, forbidden, group)?;
            let position = allocator.registry.get(best).position;
            allocator.add_disk_via_undo(undo, group, slot_index as usize, best);
            allocator.disk_state[best as usize].matching = false;
            Some(position)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DomainMapper, Location};
    use crate::registry::PDiskRecord;

    fn record(node: u32, dc: &str, rack: &str, disk_label: &str) -> PDiskRecord {
        PDiskRecord {
            pdisk_id: PDiskId::new(node, 0),
            location: Location { realm_group: dc.into(), realm: rack.into(), domain: disk_label.into() },
            usable: true,
            decommitted: false,
            operational: true,
            num_slots: 0,
            max_slots: 4,
            space_available: 1_000_000,
            groups: Vec::new(),
        }
    }

    fn small_cluster() -> (Registry, DomainMapper) {
        let mut registry = Registry::new();
        let mut mapper = DomainMapper::new();
        for realm in 0..3 {
            for domain in 0..3 {
                let node = realm * 10 + domain;
                registry.register_pdisk(record(node, "dc1", &format!("r{realm}"), &format!("d{realm}-{domain}")), &mut mapper);
            }
        }
        (registry, mapper)
    }

    #[test]
    fn fills_a_fresh_group_completely() {
        let (mut registry, _mapper) = small_cluster();
        registry.ensure_sorted();
        let geometry = GroupGeometry::new(3, 3, 1);
        let mut group: Group = vec![None; geometry.total_vdisks()];
        let mut allocator = Allocator::new(&registry, geometry, 0, false, HashSet::new(), &HashMap::new(), false);
        let mut undo = UndoLog::default();
        assert!(allocator.fill_in_group(u32::MAX, &mut undo, &mut group));
        assert!(group.iter().all(Option::is_some));
    }

    #[test]
    fn randomize_inverts_the_locality_tie_break() {
        // Disk 0 already hosts group 7, which the under-construction group's
        // peers also host (locality factor 5); disk 1 has no overlap
        // (locality factor 0). Everything else `disk_is_better` compares
        // ties (same num_slots, space, domain), so the locality step alone
        // must decide.
        let mut registry = Registry::new();
        let mut mapper = DomainMapper::new();
        let mut disk0 = record(0, "dc1", "r0", "d0");
        disk0.groups = vec![7];
        registry.register_pdisk(disk0, &mut mapper);
        registry.register_pdisk(record(1, "dc1", "r0", "d0"), &mut mapper);
        registry.ensure_sorted();
        let geometry = GroupGeometry::new(3, 3, 1);

        let mut non_random = Allocator::new(&registry, geometry, 0, false, HashSet::new(), &HashMap::new(), false);
        non_random.locality_factor.insert(7, 5);
        assert!(non_random.disk_is_better(0, 1), "non-randomized: higher locality factor should win");

        let mut randomized = Allocator::new(&registry, geometry, 0, false, HashSet::new(), &HashMap::new(), true);
        randomized.locality_factor.insert(7, 5);
        assert!(!randomized.disk_is_better(0, 1), "randomized: higher locality factor should lose");
        assert!(randomized.disk_is_better(1, 0), "randomized: lower locality factor should win");
    }

    /// A group with one individual gap in an otherwise-filled domain, one
    /// entirely empty domain in an otherwise-filled realm, and one entirely
    /// empty realm, exercises all three non-leaf dispatch paths of the
    /// pre-placement scan (`SingleDisk`, `WholeDomain`, `WholeRealm`) in a
    /// single `fill_in_group` call.
    #[test]
    fn fills_mixed_gaps_via_every_entity_kind() {
        let mut registry = Registry::new();
        let mut mapper = DomainMapper::new();
        for realm in 0..2 {
            for domain in 0..2 {
                for disk in 0..2 {
                    let node = realm * 100 + domain * 10 + disk;
                    registry.register_pdisk(record(node, "dc1", &format!("r{realm}"), &format!("d{realm}-{domain}")), &mut mapper);
                }
            }
        }
        registry.ensure_sorted();
        let geometry = GroupGeometry::new(2, 2, 2);
        let mut group: Group = vec![None; geometry.total_vdisks()];
        let mut allocator = Allocator::new(&registry, geometry, 0, false, HashSet::new(), &HashMap::new(), false);

        let first_idx = registry.find_index(PDiskId::new(0, 0)).expect("registered above");
        let mut seed_undo = UndoLog::default();
        allocator.add_disk_via_undo(&mut seed_undo, &mut group, 0, first_idx);

        let mut undo = UndoLog::default();
        assert!(allocator.fill_in_group(u32::MAX, &mut undo, &mut group));
        assert!(group.iter().all(Option::is_some));
        let mut seen = HashSet::new();
        for idx in group.iter().flatten() {
            assert!(seen.insert(*idx), "disk {idx} used twice in the completed group");
        }
    }

    #[test]
    fn fails_when_too_few_usable_disks() {
        let mut registry = Registry::new();
        let mut mapper = DomainMapper::new();
        registry.register_pdisk(record(1, "dc1", "r0", "d0"), &mut mapper);
        registry.ensure_sorted();
        let geometry = GroupGeometry::new(3, 3, 1);
        let mut group: Group = vec![None; geometry.total_vdisks()];
        let mut allocator = Allocator::new(&registry, geometry, 0, false, HashSet::new(), &HashMap::new(), false);
        let mut undo = UndoLog::default();
        assert!(!allocator.fill_in_group(u32::MAX, &mut undo, &mut group));
        assert!(group.iter().all(Option::is_none));
    }
}
