//! Entity identifiers, allocation and the entity index.
//!
//! An [`EntityId`] is an opaque 64-bit handle. Ids are handed out
//! monotonically starting at 1 and are never recycled, so a deleted id stays
//! dead for the lifetime of the world.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::archetype::ArchetypeId;
use crate::EcsError;

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// A unique entity identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// Raw `u64` representation.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }

    /// Reconstruct from a raw `u64`.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// EntityAllocator
// ---------------------------------------------------------------------------

/// Hands out fresh [`EntityId`]s.
#[derive(Debug)]
pub struct EntityAllocator {
    /// `None` once `u64::MAX` has been handed out or reserved.
    next: Option<u64>,
}

impl EntityAllocator {
    pub fn new() -> Self {
        Self { next: Some(1) }
    }

    /// Allocate the next unused id.
    pub fn allocate(&mut self) -> Result<EntityId, EcsError> {
        let raw = self.next.ok_or(EcsError::EntityIdsExhausted)?;
        self.next = raw.checked_add(1);
        Ok(EntityId(raw))
    }

    /// Record that `id` was supplied externally, so that [`allocate`] never
    /// returns it or anything below it.
    ///
    /// Returns `true` if the allocator had to advance.
    ///
    /// [`allocate`]: EntityAllocator::allocate
    pub fn reserve(&mut self, id: EntityId) -> bool {
        match self.next {
            Some(next) if id.0 >= next => {
                self.next = id.0.checked_add(1);
                true
            }
            _ => false,
        }
    }
}

impl Default for EntityAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// EntityIndex
// ---------------------------------------------------------------------------

/// Where an entity's row currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityLocation {
    pub archetype: ArchetypeId,
    pub row: usize,
}

/// Maps every live entity to its archetype and row.
#[derive(Debug, Default)]
pub struct EntityIndex {
    locations: HashMap<EntityId, EntityLocation>,
}

impl EntityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, entity: EntityId) -> Option<EntityLocation> {
        self.locations.get(&entity).copied()
    }

    pub(crate) fn get_mut(&mut self, entity: EntityId) -> Option<&mut EntityLocation> {
        self.locations.get_mut(&entity)
    }

    pub(crate) fn insert(&mut self, entity: EntityId, location: EntityLocation) {
        self.locations.insert(entity, location);
    }

    pub(crate) fn remove(&mut self, entity: EntityId) -> Option<EntityLocation> {
        self.locations.remove(&entity)
    }

    /// Point `entity` at `row` after a swap-removal moved it.
    pub(crate) fn set_row(&mut self, entity: EntityId, row: usize) {
        match self.locations.get_mut(&entity) {
            Some(location) => location.row = row,
            None => crate::invariant_violation(format_args!(
                "moved entity {entity:?} is missing from the entity index"
            )),
        }
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.locations.contains_key(&entity)
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, EntityLocation)> + '_ {
        self.locations.iter().map(|(e, loc)| (*e, *loc))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_is_monotonic_from_one() {
        let mut alloc = EntityAllocator::new();
        let ids: Vec<u64> = (0..5).map(|_| alloc.allocate().unwrap().to_raw()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn reserve_bumps_past_injected_id() {
        let mut alloc = EntityAllocator::new();
        assert!(alloc.reserve(EntityId::from_raw(10)));
        assert_eq!(alloc.allocate().unwrap(), EntityId::from_raw(11));
        // Ids below the counter do not move it back.
        assert!(!alloc.reserve(EntityId::from_raw(3)));
        assert_eq!(alloc.allocate().unwrap(), EntityId::from_raw(12));
    }

    #[test]
    fn top_id_is_issued_once_then_exhausted() {
        let mut alloc = EntityAllocator::new();
        assert!(alloc.reserve(EntityId::from_raw(u64::MAX - 1)));
        assert_eq!(alloc.allocate().unwrap(), EntityId::from_raw(u64::MAX));
        assert!(matches!(
            alloc.allocate(),
            Err(EcsError::EntityIdsExhausted)
        ));
        // Nothing left to advance past.
        assert!(!alloc.reserve(EntityId::from_raw(u64::MAX)));
    }

    #[test]
    fn index_tracks_rows() {
        let mut index = EntityIndex::new();
        let e = EntityId::from_raw(1);
        index.insert(
            e,
            EntityLocation {
                archetype: ArchetypeId(2),
                row: 0,
            },
        );
        index.set_row(e, 5);
        assert_eq!(index.get(e).map(|l| l.row), Some(5));
        assert!(index.contains(e));
        assert_eq!(index.remove(e).map(|l| l.archetype), Some(ArchetypeId(2)));
        assert!(index.is_empty());
    }

    #[test]
    fn entity_id_roundtrip() {
        let id = EntityId::from_raw(42);
        assert_eq!(EntityId::from_raw(id.to_raw()), id);
        assert_eq!(format!("{id}"), "#42");
        assert_eq!(format!("{id:?}"), "EntityId(42)");
    }
}
