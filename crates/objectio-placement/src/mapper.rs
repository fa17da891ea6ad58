//! Public Façade: the only entry point callers outside this crate need.
//! Owns the registry and domain mapper, and wraps a single
//! `allocate_group` attempt end to end: resize, validate, bisect, commit.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, instrument, warn};

use crate::allocator::Allocator;
use crate::bisect;
use crate::domain::{DomainMapper, Location, PDiskLayoutPosition};
use crate::error::MapperError;
use crate::ids::{PDiskId, VDiskId};
use crate::registry::{PDiskRecord, Registry};
use crate::topology::{GroupDefinition, GroupGeometry};

/// Owns every registered PDisk and the fixed group geometry callers
/// allocate against. There is no persistence, no RPC, and no background
/// work here: every public method runs to completion synchronously.
pub struct GroupMapper {
    geometry: GroupGeometry,
    domain_mapper: DomainMapper,
    registry: Registry,
    randomize: bool,
}

impl GroupMapper {
    #[must_use]
    pub fn new(geometry: GroupGeometry) -> Self {
        Self { geometry, domain_mapper: DomainMapper::new(), registry: Registry::new(), randomize: false }
    }

    #[must_use]
    pub fn geometry(&self) -> GroupGeometry {
        self.geometry
    }

    /// Inverts the locality tie-breaker (distilled spec §4.1/§4.5.1): when
    /// `false` (the default), disks already sharing groups with the
    /// under-construction group's peers are preferred, to keep failure
    /// blast radii small. When `true`, that preference is inverted to
    /// spread the new group away from its peers instead. Affects only that
    /// one tie-break step; everything else stays deterministic regardless.
    pub fn set_randomize(&mut self, randomize: bool) {
        self.randomize = randomize;
    }

    #[must_use]
    pub fn randomize(&self) -> bool {
        self.randomize
    }

    /// Registers a PDisk. Returns `false` if its id is already known.
    #[instrument(skip(self, record), fields(pdisk_id = %record.pdisk_id))]
    pub fn register_pdisk(&mut self, record: PDiskRecord) -> bool {
        let ok = self.registry.register_pdisk(record, &mut self.domain_mapper);
        if ok {
            debug!("registered pdisk");
        } else {
            warn!("pdisk already registered");
        }
        ok
    }

    #[instrument(skip(self))]
    pub fn unregister_pdisk(&mut self, pdisk_id: PDiskId) {
        self.registry.unregister_pdisk(pdisk_id);
        debug!("unregistered pdisk");
    }

    pub fn adjust_space_available(&mut self, pdisk_id: PDiskId, delta: i64) {
        self.registry.adjust_space_available(pdisk_id, delta);
    }

    /// Fills every empty slot of `group` with a PDisk, honoring
    /// `replaced_disks` (slots being repaired away from a known disk),
    /// `forbidden` (disks that must not be used at all), `required_space`,
    /// and `require_operational`. On success `group` holds the complete
    /// layout. On failure `group` is left exactly as it was passed in.
    #[instrument(skip_all, fields(group_id))]
    pub fn allocate_group(
        &mut self,
        group_id: u32,
        group: &mut GroupDefinition,
        replaced_disks: &HashMap<VDiskId, PDiskId>,
        forbidden: &HashSet<PDiskId>,
        required_space: i64,
        require_operational: bool,
    ) -> Result<(), MapperError> {
        self.registry.ensure_sorted();
        if !self.geometry.resize_group(group) {
            return Err(MapperError::IncorrectExistingGroup);
        }

        let mut allocator =
            Allocator::new(&self.registry, self.geometry, required_space, require_operational, forbidden.clone(), replaced_disks, self.randomize);
        let mut working_group = allocator.process_existing_group(group)?;

        if working_group.iter().all(Option::is_some) {
            info!("group already fully allocated, nothing to do");
            return Ok(());
        }

        let Some(result_group) = bisect::find_minimal_group(&mut allocator, &mut working_group) else {
            let diagnostics = format_diagnostics(&self.registry, forbidden, required_space, require_operational);
            return Err(MapperError::NoGroupOptions(diagnostics));
        };

        self.commit(group_id, group, &working_group, &result_group, replaced_disks);
        info!("group allocation committed");
        Ok(())
    }

    fn commit(
        &mut self,
        group_id: u32,
        group: &mut GroupDefinition,
        before: &[Option<u32>],
        after: &[Option<u32>],
        replaced_disks: &HashMap<VDiskId, PDiskId>,
    ) {
        for &pdisk_id in replaced_disks.values() {
            let idx = self.registry.find_index(pdisk_id).expect("replaced disk must be registered");
            self.registry.remove_from_group(idx, group_id);
        }

        let mut newly_filled = 0usize;
        for (order, (before_slot, after_slot)) in before.iter().zip(after.iter()).enumerate() {
            if before_slot.is_none() {
                newly_filled += 1;
                let idx = after_slot.expect("bisector returns a fully filled group");
                self.registry.add_to_group(idx, group_id);
            }
            let _ = order;
        }
        let preserved = before.iter().filter(|slot| slot.is_some()).count();
        debug_assert_eq!(
            newly_filled,
            self.geometry.total_vdisks() - preserved,
            "every slot not already filled before the call must be filled exactly once by it"
        );

        for order in 0..after.len() {
            let vdisk = self.geometry.vdisk_id(order);
            let idx = after[order].expect("bisector returns a fully filled group");
            group[vdisk.fail_realm as usize][vdisk.fail_domain as usize][vdisk.v_disk as usize] = Some(self.registry.pdisk_id_of(idx));
        }
    }
}

/// Diagnostic dump of every registered PDisk grouped by realm-group, realm,
/// and domain, annotated with why each one would or wouldn't be usable for
/// this allocation. Only ever produced on the `NoGroupOptions` error path;
/// kept entirely separate from the scoring/allocation kernel above.
fn format_diagnostics(registry: &Registry, forbidden: &HashSet<PDiskId>, required_space: i64, require_operational: bool) -> String {
    let mut out = String::from("PDisks# {[(");
    let mut prev: Option<PDiskLayoutPosition> = None;

    for &(position, idx) in registry.position_index() {
        let info = registry.get_for_diagnostics(idx);
        match prev {
            None => {}
            Some(p) if p == position => unreachable!("position index has no duplicate positions"),
            Some(p) => {
                out.push(')');
                let realm_changed = p.realm != position.realm || p.realm_group != position.realm_group;
                if realm_changed {
                    out.push(']');
                    if p.realm_group != position.realm_group {
                        out.push_str("} {");
                    } else {
                        out.push(' ');
                    }
                    out.push('[');
                } else {
                    out.push(' ');
                }
                out.push('(');
            }
        }

        out.push_str(&info.pdisk_id.to_string());
        out.push_str(&disk_flags(info, forbidden, required_space, require_operational));
        prev = Some(position);
    }
    out.push_str(")]}");
    out
}

struct DiagnosticDisk {
    pdisk_id: PDiskId,
    usable: bool,
    decommitted: bool,
    operational: bool,
    num_slots: u32,
    max_slots: u32,
    space_available: i64,
    in_old_group: bool,
}

fn disk_flags(info: DiagnosticDisk, forbidden: &HashSet<PDiskId>, required_space: i64, require_operational: bool) -> String {
    if info.in_old_group {
        return "*".to_owned();
    }

    let mut flags = String::new();
    if !info.usable {
        flags.push('u');
    }
    if forbidden.contains(&info.pdisk_id) {
        flags.push('f');
    }
    if info.decommitted {
        flags.push('d');
    }
    if info.num_slots >= info.max_slots {
        flags.push_str(&format!("s[{}/{}]", info.num_slots, info.max_slots));
    }
    if info.space_available < required_space {
        flags.push('v');
    }
    if require_operational && !info.operational {
        flags.push('o');
    }

    if flags.is_empty() {
        "+".to_owned()
    } else {
        format!("-{flags}")
    }
}

impl Registry {
    fn get_for_diagnostics(&self, idx: u32) -> DiagnosticDisk {
        let info = self.get(idx);
        DiagnosticDisk {
            pdisk_id: info.record.pdisk_id,
            usable: info.record.usable,
            decommitted: info.record.decommitted,
            operational: info.record.operational,
            num_slots: info.record.num_slots,
            max_slots: info.record.max_slots,
            space_available: info.record.space_available,
            in_old_group: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(node: u32, realm: &str, domain: &str) -> PDiskRecord {
        PDiskRecord {
            pdisk_id: PDiskId::new(node, 0),
            location: Location { realm_group: "dc1".into(), realm: realm.into(), domain: domain.into() },
            usable: true,
            decommitted: false,
            operational: true,
            num_slots: 0,
            max_slots: 4,
            space_available: 1_000_000,
            groups: Vec::new(),
        }
    }

    fn populated_mapper(realms: u32, domains: u32) -> GroupMapper {
        let mut mapper = GroupMapper::new(GroupGeometry::new(realms, domains, 1));
        for realm in 0..realms {
            for domain in 0..domains {
                let node = realm * 100 + domain;
                assert!(mapper.register_pdisk(record(node, &format!("r{realm}"), &format!("d{realm}-{domain}"))));
            }
        }
        mapper
    }

    #[test]
    fn allocates_a_fresh_group() {
        let mut mapper = populated_mapper(3, 3);
        let mut group = GroupDefinition::new();
        let result = mapper.allocate_group(1, &mut group, &HashMap::new(), &HashSet::new(), 0, false);
        assert!(result.is_ok());
        for realm in &group {
            for domain in realm {
                for occupant in domain {
                    assert!(occupant.is_some());
                }
            }
        }
    }

    #[test]
    fn reports_no_group_options_when_infeasible() {
        let mut mapper = populated_mapper(1, 1);
        let mut group = GroupDefinition::new();
        let err = mapper.allocate_group(1, &mut group, &HashMap::new(), &HashSet::new(), 0, false).unwrap_err();
        match err {
            MapperError::NoGroupOptions(diagnostics) => assert!(diagnostics.starts_with("PDisks# ")),
            other => panic!("expected NoGroupOptions, got {other:?}"),
        }
    }

    #[test]
    fn reports_no_group_options_flags_insufficient_space() {
        let mut mapper = populated_mapper(3, 3);
        let mut group = GroupDefinition::new();
        let err = mapper.allocate_group(1, &mut group, &HashMap::new(), &HashSet::new(), 1_000_000_000, false).unwrap_err();
        match err {
            MapperError::NoGroupOptions(diagnostics) => assert!(diagnostics.contains("-v"), "expected a '-v' flag: {diagnostics}"),
            other => panic!("expected NoGroupOptions, got {other:?}"),
        }
    }

    /// Replacing a disk must free its slot, exclude the old disk from
    /// re-selection, and decrement its `num_slots` once the repair commits.
    #[test]
    fn replaces_a_disk_without_reusing_the_old_one() {
        let mut mapper = populated_mapper(3, 3);
        // A spare disk beyond the one-per-slot minimum, so a replacement has
        // somewhere to land once the old disk is excluded.
        assert!(mapper.register_pdisk(record(999, "r0", "d0-0")));
        let mut group = GroupDefinition::new();
        mapper.allocate_group(1, &mut group, &HashMap::new(), &HashSet::new(), 0, false).expect("fresh group allocates");

        let old_pdisk = group[0][0][0].expect("slot was filled by the fresh allocation");
        group[0][0][0] = None;
        let mut replaced = HashMap::new();
        replaced.insert(VDiskId::new(0, 0, 0), old_pdisk);

        mapper.allocate_group(1, &mut group, &replaced, &HashSet::new(), 0, false).expect("repair finds a replacement");

        let new_pdisk = group[0][0][0].expect("replacement slot was refilled");
        assert_ne!(new_pdisk, old_pdisk, "the replaced disk must not be re-selected for its own slot");

        let old_idx = mapper.registry.find_index(old_pdisk).expect("old disk stays registered");
        assert!(!mapper.registry.get(old_idx).record.groups.contains(&1), "old disk must be dropped from the group's membership");
    }

    /// The bisector must settle on the lowest score threshold that admits a
    /// full layout: given disks at distinct occupancy levels, it must never
    /// reach for a more-loaded disk while a less-loaded one still qualifies.
    #[test]
    fn bisection_prefers_the_least_loaded_admissible_disks() {
        let mut mapper = GroupMapper::new(GroupGeometry::new(1, 1, 1));
        for (node, num_slots) in [(0, 0u32), (1, 3)] {
            let mut r = record(node, "r0", "d0");
            r.num_slots = num_slots;
            assert!(mapper.register_pdisk(r));
        }
        let mut group = GroupDefinition::new();
        mapper.allocate_group(1, &mut group, &HashMap::new(), &HashSet::new(), 0, false).expect("cluster is large enough");
        assert_eq!(group[0][0][0], Some(PDiskId::new(0, 0)), "the least-loaded disk must be chosen");
    }

    #[test]
    fn rejects_group_with_wrong_geometry() {
        let mut mapper = populated_mapper(2, 2);
        let mut group: GroupDefinition = vec![vec![vec![None; 1]; 1]; 1];
        let err = mapper.allocate_group(1, &mut group, &HashMap::new(), &HashSet::new(), 0, false).unwrap_err();
        assert!(matches!(err, MapperError::IncorrectExistingGroup));
    }

    fn record_in_groups(node: u32, groups: Vec<u32>) -> PDiskRecord {
        let mut r = record(node, "r0", "d0");
        r.groups = groups;
        r
    }

    /// Two disks tie on every score/occupancy field for the one remaining
    /// slot; only their locality factor (shared membership in group 7, which
    /// the already-placed peer disk also hosts) differs. `randomize=false`
    /// must prefer the overlapping disk; `randomize=true` must avoid it.
    #[test]
    fn randomize_flag_inverts_which_tied_disk_is_chosen() {
        let geometry = GroupGeometry::new(1, 1, 2);
        let peer_id = PDiskId::new(0, 0);
        let overlapping_id = PDiskId::new(1, 0);
        let disjoint_id = PDiskId::new(2, 0);

        let build = |randomize: bool| {
            let mut mapper = GroupMapper::new(geometry);
            mapper.set_randomize(randomize);
            assert!(mapper.register_pdisk(record_in_groups(0, vec![7])));
            assert!(mapper.register_pdisk(record_in_groups(1, vec![7])));
            assert!(mapper.register_pdisk(record_in_groups(2, vec![])));
            mapper
        };

        let mut group: GroupDefinition = vec![vec![vec![Some(peer_id), None]]];
        let mut non_random = build(false);
        non_random.allocate_group(1, &mut group, &HashMap::new(), &HashSet::new(), 0, false).unwrap();
        assert_eq!(group[0][0][1], Some(overlapping_id));

        let mut group: GroupDefinition = vec![vec![vec![Some(peer_id), None]]];
        let mut randomized = build(true);
        randomized.allocate_group(1, &mut group, &HashMap::new(), &HashSet::new(), 0, false).unwrap();
        assert_eq!(group[0][0][1], Some(disjoint_id));
    }
}
