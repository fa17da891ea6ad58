//! Identifiers used throughout the placement solver.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque handle for a physical disk: the node that owns it plus a
/// disk-local index. Ordering is node-then-disk, which doubles as the
/// deterministic tie-break of last resort in [`crate::allocator`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default, Serialize, Deserialize)]
pub struct PDiskId {
    pub node_id: u32,
    pub disk_id: u32,
}

impl PDiskId {
    #[must_use]
    pub const fn new(node_id: u32, disk_id: u32) -> Self {
        Self { node_id, disk_id }
    }

    /// Open lower range endpoint, for position-range scans.
    pub const MIN: Self = Self { node_id: 0, disk_id: 0 };
    /// Open upper range endpoint, for position-range scans.
    pub const MAX: Self = Self { node_id: u32::MAX, disk_id: u32::MAX };
}

impl fmt::Display for PDiskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node_id, self.disk_id)
    }
}

/// A slot within a group: which fail realm, which fail domain inside it, and
/// which vdisk inside that domain. Its dense 0-based "order number" is
/// derived from a [`crate::topology::GroupGeometry`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct VDiskId {
    pub fail_realm: u8,
    pub fail_domain: u8,
    pub v_disk: u8,
}

impl VDiskId {
    #[must_use]
    pub const fn new(fail_realm: u8, fail_domain: u8, v_disk: u8) -> Self {
        Self { fail_realm, fail_domain, v_disk }
    }
}

/// Dense id assigned by the [`crate::domain::DomainMapper`] to a distinct
/// textual location label at one level of the failure-domain hierarchy.
/// Ids are never reused across levels and define the total order used for
/// range scans over the position index.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct EntityId(pub u32);

impl EntityId {
    /// Open range endpoint below every real id.
    pub const MIN: Self = Self(0);
    /// Open range endpoint above every real id.
    pub const MAX: Self = Self(u32::MAX);

    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::MIN
    }
}
