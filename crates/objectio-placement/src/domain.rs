//! Interns textual failure-domain labels into dense [`EntityId`]s and
//! derives a [`PDiskLayoutPosition`] for each registered PDisk.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ids::{EntityId, PDiskId};

/// A PDisk's place in the failure-domain hierarchy, as the textual labels a
/// caller supplies at registration time.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub realm_group: String,
    pub realm: String,
    pub domain: String,
}

/// A PDisk's place in the failure-domain hierarchy, as dense ids. Ordered
/// field-by-field (realm-group, then realm, then domain, then disk), which
/// is the order the position index and every range scan rely on.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct PDiskLayoutPosition {
    pub realm_group: EntityId,
    pub realm: EntityId,
    pub domain: EntityId,
    pub pdisk_id: PDiskId,
}

impl PDiskLayoutPosition {
    #[must_use]
    pub const fn domain_range(realm_group: EntityId, realm: EntityId, domain: EntityId) -> (Self, Self) {
        (
            Self { realm_group, realm, domain, pdisk_id: PDiskId::MIN },
            Self { realm_group, realm, domain, pdisk_id: PDiskId::MAX },
        )
    }

    #[must_use]
    pub const fn realm_range(realm_group: EntityId, realm: EntityId) -> (Self, Self) {
        (
            Self { realm_group, realm, domain: EntityId::MIN, pdisk_id: PDiskId::MIN },
            Self { realm_group, realm, domain: EntityId::MAX, pdisk_id: PDiskId::MAX },
        )
    }

    #[must_use]
    pub const fn realm_group_range(realm_group: EntityId) -> (Self, Self) {
        (
            Self { realm_group, realm: EntityId::MIN, domain: EntityId::MIN, pdisk_id: PDiskId::MIN },
            Self { realm_group, realm: EntityId::MAX, domain: EntityId::MAX, pdisk_id: PDiskId::MAX },
        )
    }
}

/// Interns `(level, parent, label)` triples into dense, never-reused
/// [`EntityId`]s. Two PDisks with identical labels under identical parents
/// share the same id at that level; a label reused under a different parent
/// gets a distinct id, since the map keys on the parent too.
#[derive(Default)]
pub struct DomainMapper {
    next_id: u32,
    realm_groups: HashMap<String, EntityId>,
    realms: HashMap<(EntityId, String), EntityId>,
    domains: HashMap<(EntityId, EntityId, String), EntityId>,
}

impl DomainMapper {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Upper bound (exclusive) on ids handed out so far, for sizing a
    /// forbidden-entity bitmap that must address every level at once.
    #[must_use]
    pub fn id_count(&self) -> usize {
        self.next_id as usize
    }

    fn next(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    fn intern_realm_group(&mut self, label: &str) -> EntityId {
        if let Some(&id) = self.realm_groups.get(label) {
            return id;
        }
        let id = self.next();
        self.realm_groups.insert(label.to_owned(), id);
        id
    }

    fn intern_realm(&mut self, realm_group: EntityId, label: &str) -> EntityId {
        let key = (realm_group, label.to_owned());
        if let Some(&id) = self.realms.get(&key) {
            return id;
        }
        let id = self.next();
        self.realms.insert(key, id);
        id
    }

    fn intern_domain(&mut self, realm_group: EntityId, realm: EntityId, label: &str) -> EntityId {
        let key = (realm_group, realm, label.to_owned());
        if let Some(&id) = self.domains.get(&key) {
            return id;
        }
        let id = self.next();
        self.domains.insert(key, id);
        id
    }

    /// Derives (interning as needed) the dense position of `pdisk_id` at
    /// `location`.
    pub fn position(&mut self, location: &Location, pdisk_id: PDiskId) -> PDiskLayoutPosition {
        let realm_group = self.intern_realm_group(&location.realm_group);
        let realm = self.intern_realm(realm_group, &location.realm);
        let domain = self.intern_domain(realm_group, realm, &location.domain);
        PDiskLayoutPosition { realm_group, realm, domain, pdisk_id }
    }
}
