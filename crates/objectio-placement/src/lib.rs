//! ObjectIO Placement - group placement solver
//!
//! This crate decides which PDisks should host the VDisks of a storage
//! group so that the group survives correlated failures. Given the current
//! PDisk inventory, a group's geometry (fail realms × fail domains per realm
//! × vdisks per domain), an optional partially-filled layout, and a set of
//! constraints (forbidden disks, required free space, operational-only,
//! disks being replaced), [`GroupMapper::allocate_group`] produces a
//! complete `VDiskSlot -> PDiskId` mapping with minimal failure-domain skew,
//! or a diagnostic error describing why no placement exists.
//!
//! The solver is synchronous, single-threaded, and deterministic: it does
//! no I/O, no RPC, and keeps no state beyond one [`GroupMapper`] instance.
//!
//! # Example
//! ```
//! use std::collections::{HashMap, HashSet};
//! use objectio_placement::{GroupGeometry, GroupMapper, Location, PDiskId, PDiskRecord};
//!
//! let mut mapper = GroupMapper::new(GroupGeometry::new(3, 3, 1));
//! for realm in 0..3u32 {
//!     for domain in 0..3u32 {
//!         let node = realm * 10 + domain;
//!         mapper.register_pdisk(PDiskRecord {
//!             pdisk_id: PDiskId::new(node, 0),
//!             location: Location {
//!                 realm_group: "dc1".into(),
//!                 realm: format!("r{realm}"),
//!                 domain: format!("d{realm}-{domain}"),
//!             },
//!             usable: true,
//!             decommitted: false,
//!             operational: true,
//!             num_slots: 0,
//!             max_slots: 4,
//!             space_available: 1_000_000,
//!             groups: Vec::new(),
//!         });
//!     }
//! }
//!
//! let mut group = Vec::new();
//! mapper
//!     .allocate_group(1, &mut group, &HashMap::new(), &HashSet::new(), 0, false)
//!     .expect("cluster is large enough to fill a 3x3x1 group");
//! ```

mod allocator;
mod bisect;
mod domain;
mod error;
mod ids;
mod mapper;
mod registry;
mod scorer;
mod topology;

pub use domain::Location;
pub use error::{MapperError, Result};
pub use ids::{EntityId, PDiskId, VDiskId};
pub use mapper::GroupMapper;
pub use registry::PDiskRecord;
pub use topology::{GroupDefinition, GroupGeometry};
