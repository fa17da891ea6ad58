//! The PDisk Registry: owns every known PDisk's configuration and mutable
//! accounting, and keeps a Position Index sorted by [`PDiskLayoutPosition`]
//! for the allocator's range scans.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::{DomainMapper, Location, PDiskLayoutPosition};
use crate::ids::PDiskId;

/// A PDisk as registered by the caller: immutable identity and
/// configuration, plus mutable accounting the registry updates as groups
/// are allocated against it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PDiskRecord {
    pub pdisk_id: PDiskId,
    pub location: Location,
    pub usable: bool,
    pub decommitted: bool,
    pub operational: bool,
    pub num_slots: u32,
    pub max_slots: u32,
    pub space_available: i64,
    pub groups: Vec<u32>,
}

/// Internal, registry-owned view of a [`PDiskRecord`] with its derived
/// position. The entity engine keeps its own per-call working state
/// (matching flags, skip pointers) separately in `allocator.rs`, rather than
/// mutating this record on every allocation attempt.
#[derive(Clone, Debug)]
pub(crate) struct PDiskInfo {
    pub record: PDiskRecord,
    pub position: PDiskLayoutPosition,
}

impl PDiskInfo {
    pub(crate) fn is_usable(&self) -> bool {
        self.record.usable && !self.record.decommitted && self.record.num_slots < self.record.max_slots
    }

    pub(crate) fn picker_score(&self) -> u32 {
        self.record.num_slots
    }

    fn insert_group(&mut self, group_id: u32) {
        if let Err(at) = self.record.groups.binary_search(&group_id) {
            self.record.groups.insert(at, group_id);
        }
    }

    fn erase_group(&mut self, group_id: u32) {
        if let Ok(at) = self.record.groups.binary_search(&group_id) {
            self.record.groups.remove(at);
        }
    }
}

/// Dense table of every registered PDisk, plus a position index sorted
/// lazily (only just before an allocation needs it).
#[derive(Default)]
pub struct Registry {
    pub(crate) disks: Vec<PDiskInfo>,
    index_of: HashMap<PDiskId, u32>,
    position_index: Vec<(PDiskLayoutPosition, u32)>,
    dirty: bool,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.disks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.disks.is_empty()
    }

    /// Registers `record`, deriving its position via `domain_mapper`.
    /// Returns `false` (no change made) if the id is already registered.
    pub fn register_pdisk(&mut self, mut record: PDiskRecord, domain_mapper: &mut DomainMapper) -> bool {
        if self.index_of.contains_key(&record.pdisk_id) {
            return false;
        }
        record.groups.sort_unstable();
        let position = domain_mapper.position(&record.location, record.pdisk_id);
        let idx = self.disks.len() as u32;
        self.index_of.insert(record.pdisk_id, idx);
        self.position_index.push((position, idx));
        self.disks.push(PDiskInfo { record, position });
        self.dirty = true;
        true
    }

    /// Removes `pdisk_id` from the registry. Panics if it was never
    /// registered: that is a programmer error, not a caller precondition
    /// violation (distilled spec's open question 3 territory).
    pub fn unregister_pdisk(&mut self, pdisk_id: PDiskId) {
        let idx = self.index_of.remove(&pdisk_id).expect("unregister_pdisk: unknown PDiskId");
        self.position_index.retain(|&(_, i)| i != idx);
        let last = (self.disks.len() - 1) as u32;
        self.disks.swap_remove(idx as usize);
        if idx != last {
            let moved_id = self.disks[idx as usize].record.pdisk_id;
            self.index_of.insert(moved_id, idx);
            for entry in &mut self.position_index {
                if entry.1 == last {
                    entry.1 = idx;
                }
            }
        }
    }

    pub fn adjust_space_available(&mut self, pdisk_id: PDiskId, delta: i64) {
        let idx = self.index_of[&pdisk_id];
        self.disks[idx as usize].record.space_available += delta;
    }

    #[must_use]
    pub(crate) fn find_index(&self, pdisk_id: PDiskId) -> Option<u32> {
        self.index_of.get(&pdisk_id).copied()
    }

    pub(crate) fn get(&self, idx: u32) -> &PDiskInfo {
        &self.disks[idx as usize]
    }

    pub(crate) fn pdisk_id_of(&self, idx: u32) -> PDiskId {
        self.disks[idx as usize].record.pdisk_id
    }

    /// Sorts the position index if any registration happened since the
    /// last sort. Removals never need a re-sort: they only drop entries,
    /// never break relative order.
    pub(crate) fn ensure_sorted(&mut self) {
        if self.dirty {
            self.position_index.sort_unstable_by_key(|&(pos, _)| pos);
            self.dirty = false;
        }
    }

    pub(crate) fn position_index(&self) -> &[(PDiskLayoutPosition, u32)] {
        &self.position_index
    }

    /// Adds `group_id` to the disk's hosted-groups list. Used by the
    /// façade's commit step after a successful allocation.
    pub(crate) fn add_to_group(&mut self, idx: u32, group_id: u32) {
        self.disks[idx as usize].insert_group(group_id);
        self.disks[idx as usize].record.num_slots += 1;
    }

    /// Removes `group_id` from the disk's hosted-groups list, for disks
    /// replaced by a repair allocation.
    pub(crate) fn remove_from_group(&mut self, idx: u32, group_id: u32) {
        self.disks[idx as usize].erase_group(group_id);
        self.disks[idx as usize].record.num_slots = self.disks[idx as usize].record.num_slots.saturating_sub(1);
    }
}
