//! Group geometry: shapes a [`GroupDefinition`] and converts between a
//! [`VDiskId`] and its dense 0-based order number within the group.

use serde::{Deserialize, Serialize};

use crate::ids::{PDiskId, VDiskId};

/// A group's shape: how many fail realms, how many fail domains per realm,
/// and how many vdisks per fail domain. Fixed for the lifetime of a group.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct GroupGeometry {
    pub num_fail_realms: u32,
    pub num_fail_domains_per_realm: u32,
    pub num_vdisks_per_domain: u32,
}

/// `realm -> domain -> vdisk -> occupant`. Resized to match a
/// [`GroupGeometry`] by [`GroupGeometry::resize_group`] before use.
pub type GroupDefinition = Vec<Vec<Vec<Option<PDiskId>>>>;

impl GroupGeometry {
    #[must_use]
    pub const fn new(num_fail_realms: u32, num_fail_domains_per_realm: u32, num_vdisks_per_domain: u32) -> Self {
        Self { num_fail_realms, num_fail_domains_per_realm, num_vdisks_per_domain }
    }

    #[must_use]
    pub fn total_fail_domains(&self) -> usize {
        (self.num_fail_realms * self.num_fail_domains_per_realm) as usize
    }

    #[must_use]
    pub fn total_vdisks(&self) -> usize {
        self.total_fail_domains() * self.num_vdisks_per_domain as usize
    }

    /// Dense 0-based position of `vdisk` within the group, ordered
    /// realm-major, then domain, then vdisk.
    #[must_use]
    pub fn order_number(&self, vdisk: VDiskId) -> usize {
        let domain_order = u32::from(vdisk.fail_realm) * self.num_fail_domains_per_realm + u32::from(vdisk.fail_domain);
        (domain_order * self.num_vdisks_per_domain + u32::from(vdisk.v_disk)) as usize
    }

    /// Dense 0-based position of the fail domain that owns `vdisk`.
    #[must_use]
    pub fn fail_domain_order_number(&self, vdisk: VDiskId) -> usize {
        (u32::from(vdisk.fail_realm) * self.num_fail_domains_per_realm + u32::from(vdisk.fail_domain)) as usize
    }

    /// Inverse of [`Self::order_number`].
    #[must_use]
    pub fn vdisk_id(&self, order_number: usize) -> VDiskId {
        let order_number = order_number as u32;
        let v_disk = order_number % self.num_vdisks_per_domain;
        let domain_order = order_number / self.num_vdisks_per_domain;
        let fail_domain = domain_order % self.num_fail_domains_per_realm;
        let fail_realm = domain_order / self.num_fail_domains_per_realm;
        VDiskId::new(fail_realm as u8, fail_domain as u8, v_disk as u8)
    }

    /// Shapes `group` to match this geometry. An empty group is filled with
    /// empty slots; a non-empty group must already have matching dimensions,
    /// otherwise `false` is returned and `group` is left untouched.
    pub fn resize_group(&self, group: &mut GroupDefinition) -> bool {
        if group.is_empty() {
            *group = vec![
                vec![vec![None; self.num_vdisks_per_domain as usize]; self.num_fail_domains_per_realm as usize];
                self.num_fail_realms as usize
            ];
            return true;
        }
        if group.len() != self.num_fail_realms as usize {
            return false;
        }
        for realm in group.iter() {
            if realm.len() != self.num_fail_domains_per_realm as usize {
                return false;
            }
            for domain in realm.iter() {
                if domain.len() != self.num_vdisks_per_domain as usize {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geom() -> GroupGeometry {
        GroupGeometry::new(3, 3, 2)
    }

    #[test]
    fn order_number_round_trips() {
        let g = geom();
        for order in 0..g.total_vdisks() {
            let vdisk = g.vdisk_id(order);
            assert_eq!(g.order_number(vdisk), order);
        }
    }

    #[test]
    fn resize_group_fills_empty() {
        let g = geom();
        let mut group: GroupDefinition = Vec::new();
        assert!(g.resize_group(&mut group));
        assert_eq!(group.len(), 3);
        assert_eq!(group[0].len(), 3);
        assert_eq!(group[0][0].len(), 2);
    }

    #[test]
    fn resize_group_rejects_mismatch() {
        let g = geom();
        let mut group: GroupDefinition = vec![vec![vec![None; 2]; 3]; 2];
        assert!(!g.resize_group(&mut group));
    }
}
