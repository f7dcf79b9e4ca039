//! The [`World`] is the top-level container for the ECS. It owns the entity
//! allocator, the component registry, all archetype storage, and the
//! resource and event stores.
//!
//! Every structural change (create, add, remove, delete) is a synchronous,
//! complete state transition on `&mut World`; there is no deferred phase
//! unless the caller opts into one through [`crate::command`].

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::archetype::{Archetype, ArchetypeId, StagedRow, StagedValue};
use crate::component::{
    Component, ComponentInfo, ComponentMask, ComponentTypeId, Storage, TypeRegistry,
};
use crate::config::WorldConfig;
use crate::entity::{EntityAllocator, EntityId, EntityIndex, EntityLocation};
use crate::event::EventQueue;
use crate::resource::ResourceStore;
use crate::EcsError;

// ---------------------------------------------------------------------------
// ComponentBundle
// ---------------------------------------------------------------------------

type RegisterFn = fn(&mut TypeRegistry) -> Result<ComponentTypeId, EcsError>;

struct BundleEntry {
    register: RegisterFn,
    value: StagedValue,
}

/// A heterogeneous set of component values used to create or extend an
/// entity in one placement.
///
/// Bundles do not need a registry to be built: each value carries the means
/// to register its own type, which happens when the bundle is consumed by the
/// world. That also makes bundles `Send`, so they can be built on worker
/// threads and handed over through a [`crate::command::CommandQueue`].
///
/// Tuples of up to six components convert into bundles, so most call sites
/// read `world.create_entity((Position { .. }, Velocity { .. }))`.
#[derive(Default)]
pub struct ComponentBundle {
    entries: Vec<BundleEntry>,
}

impl ComponentBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a component value. If the bundle already holds a value of the
    /// same type, the later one wins when the bundle is applied.
    pub fn add<T: Component>(&mut self, value: T) -> &mut Self {
        self.entries.push(BundleEntry {
            register: TypeRegistry::register::<T>,
            value: <T::Storage as Storage<T>>::stage(value),
        });
        self
    }

    /// Builder-style [`add`](Self::add).
    pub fn with<T: Component>(mut self, value: T) -> Self {
        self.add(value);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register every type in the bundle and collect the values into a row
    /// sorted by type id.
    pub(crate) fn into_staged(self, registry: &mut TypeRegistry) -> Result<StagedRow, EcsError> {
        let mut row = StagedRow::new();
        for entry in self.entries {
            let id = (entry.register)(registry)?;
            row.insert(id, entry.value);
        }
        Ok(row)
    }
}

impl std::fmt::Debug for ComponentBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentBundle")
            .field("len", &self.entries.len())
            .finish()
    }
}

impl From<()> for ComponentBundle {
    fn from(_: ()) -> Self {
        Self::new()
    }
}

macro_rules! impl_bundle_from_tuple {
    ($($name:ident),+) => {
        impl<$($name: Component),+> From<($($name,)+)> for ComponentBundle {
            #[allow(non_snake_case)]
            fn from(($($name,)+): ($($name,)+)) -> Self {
                let mut bundle = ComponentBundle::new();
                $( bundle.add($name); )+
                bundle
            }
        }
    };
}

impl_bundle_from_tuple!(A);
impl_bundle_from_tuple!(A, B);
impl_bundle_from_tuple!(A, B, C);
impl_bundle_from_tuple!(A, B, C, D);
impl_bundle_from_tuple!(A, B, C, D, E);
impl_bundle_from_tuple!(A, B, C, D, E, F);

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// The central ECS container.
///
/// Owns all entities, component storage (via archetypes), the component type
/// registry, resources and events.
pub struct World {
    config: WorldConfig,
    allocator: EntityAllocator,
    registry: TypeRegistry,
    /// Indexed by `ArchetypeId`. Archetype 0 is the empty-mask archetype.
    archetypes: Vec<Archetype>,
    archetype_index: HashMap<ComponentMask, ArchetypeId>,
    entities: EntityIndex,
    resources: ResourceStore,
    events: EventQueue,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("entity_count", &self.entities.len())
            .field("archetype_count", &self.archetypes.len())
            .field("component_types", &self.registry.len())
            .field("resources", &self.resources.len())
            .finish()
    }
}

impl World {
    /// Create a new, empty world with the default configuration.
    pub fn new() -> Self {
        Self::build(WorldConfig::default())
    }

    /// Create a new, empty world.
    ///
    /// # Errors
    ///
    /// [`EcsError::InvalidConfig`] if `config` fails validation.
    pub fn with_config(config: WorldConfig) -> Result<Self, EcsError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: WorldConfig) -> Self {
        let empty = Archetype::new(ArchetypeId::EMPTY, &[], config.initial_capacity);
        let mut archetype_index = HashMap::new();
        archetype_index.insert(ComponentMask::EMPTY, ArchetypeId::EMPTY);
        Self {
            allocator: EntityAllocator::new(),
            registry: TypeRegistry::new(config.max_component_types),
            archetypes: vec![empty],
            archetype_index,
            entities: EntityIndex::new(),
            resources: ResourceStore::new(),
            events: EventQueue::new(),
            config,
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Read-only access to the component type registry.
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Register a component type ahead of first use. Optional: every
    /// operation that takes a component value registers its type on demand.
    pub fn register_component<T: Component>(&mut self) -> Result<ComponentTypeId, EcsError> {
        self.registry.register::<T>()
    }

    // -- archetype management -----------------------------------------------

    /// Find or create the archetype for `mask`. Every bit in `mask` must
    /// belong to a registered type.
    fn get_or_create_archetype(&mut self, mask: ComponentMask) -> ArchetypeId {
        if let Some(&id) = self.archetype_index.get(&mask) {
            return id;
        }
        let id = ArchetypeId(self.archetypes.len() as u32);
        let infos: Vec<&ComponentInfo> = mask
            .iter()
            .map(|tid| match self.registry.info(tid) {
                Some(info) => info,
                None => crate::invariant_violation(format_args!(
                    "archetype mask {mask:?} names unregistered type {tid:?}"
                )),
            })
            .collect();
        let archetype = Archetype::new(id, &infos, self.config.initial_capacity);
        let names: Vec<&str> = infos.iter().map(|info| info.name).collect();
        debug!(archetype = id.0, mask = ?mask, components = ?names, "created archetype");
        self.archetypes.push(archetype);
        self.archetype_index.insert(mask, id);
        id
    }

    /// Insert a fresh entity with the given row into the archetype matching
    /// the row's types.
    fn place(&mut self, entity: EntityId, row: StagedRow) {
        let archetype = self.get_or_create_archetype(row.mask());
        let index = self.archetypes[archetype.index()].insert(entity, row);
        self.entities
            .insert(entity, EntityLocation { archetype, row: index });
    }

    /// Move `entity` out of its current archetype into the one for
    /// `new_mask`.
    ///
    /// The source row is taken out into a staging record, `edit` adjusts the
    /// staged values, and the result is inserted into the destination. The
    /// entity swapped into the vacated source row (if any) has its index
    /// entry fixed up.
    fn migrate(
        &mut self,
        entity: EntityId,
        from: EntityLocation,
        new_mask: ComponentMask,
        edit: impl FnOnce(&mut StagedRow),
    ) {
        let destination = self.get_or_create_archetype(new_mask);

        let (mut staged, moved) = self.archetypes[from.archetype.index()].take_row(from.row);
        if let Some(moved) = moved {
            self.entities.set_row(moved, from.row);
        }

        edit(&mut staged);
        if staged.mask() != new_mask {
            crate::invariant_violation(format_args!(
                "migration of {entity:?} staged {:?}, expected {new_mask:?}",
                staged.mask()
            ));
        }

        let row = self.archetypes[destination.index()].insert(entity, staged);
        match self.entities.get_mut(entity) {
            Some(location) => {
                *location = EntityLocation {
                    archetype: destination,
                    row,
                }
            }
            None => crate::invariant_violation(format_args!(
                "migrated entity {entity:?} is missing from the entity index"
            )),
        }
        trace!(
            entity = %entity,
            from = from.archetype.0,
            to = destination.0,
            "migrated entity"
        );
    }

    /// Overlay `staged` onto an existing entity: types it already holds are
    /// overwritten in place, new types cause a single migration.
    fn merge(&mut self, entity: EntityId, staged: StagedRow) -> Result<(), EcsError> {
        let location = self.locate(entity)?;
        let current = self.archetypes[location.archetype.index()].mask();
        let new_mask = current.union(staged.mask());

        if new_mask == current {
            let archetype = &mut self.archetypes[location.archetype.index()];
            for (type_id, value) in staged {
                archetype.replace(location.row, type_id, value);
            }
            return Ok(());
        }

        self.migrate(entity, location, new_mask, |row| {
            for (type_id, value) in staged {
                row.insert(type_id, value);
            }
        });
        Ok(())
    }

    fn locate(&self, entity: EntityId) -> Result<EntityLocation, EcsError> {
        self.entities
            .get(entity)
            .ok_or(EcsError::MissingEntity { entity })
    }

    // -- entity lifecycle ---------------------------------------------------

    /// Create an entity holding `components`.
    ///
    /// All initial components are placed into the destination archetype at
    /// once. An empty bundle (`()`) creates a bare entity in the empty-mask
    /// archetype.
    pub fn create_entity(
        &mut self,
        components: impl Into<ComponentBundle>,
    ) -> Result<EntityId, EcsError> {
        let staged = components.into().into_staged(&mut self.registry)?;
        let entity = self.allocator.allocate()?;
        self.place(entity, staged);
        Ok(entity)
    }

    /// Upsert an entity under a caller-supplied id.
    ///
    /// If `entity` exists, each component is added as by
    /// [`add_component`](Self::add_component). Otherwise the entity is created
    /// with that id and the allocator is advanced past it.
    pub fn add_entity(
        &mut self,
        entity: EntityId,
        components: impl Into<ComponentBundle>,
    ) -> Result<(), EcsError> {
        let staged = components.into().into_staged(&mut self.registry)?;
        if self.entities.contains(entity) {
            return self.merge(entity, staged);
        }
        if self.allocator.reserve(entity) {
            debug!(entity = %entity, "allocator advanced past injected entity id");
        }
        debug!(entity = %entity, components = staged.len(), "injected entity");
        self.place(entity, staged);
        Ok(())
    }

    /// Delete an entity and all of its components.
    pub fn delete_entity(&mut self, entity: EntityId) -> Result<(), EcsError> {
        let location = self
            .entities
            .remove(entity)
            .ok_or(EcsError::MissingEntity { entity })?;
        let moved = self.archetypes[location.archetype.index()].remove(location.row);
        if let Some(moved) = moved {
            self.entities.set_row(moved, location.row);
        }
        Ok(())
    }

    // -- component mutation -------------------------------------------------

    /// Attach `value` to `entity`. Overwrites in place if the entity already
    /// has a `T`; otherwise migrates the entity to the archetype that adds
    /// `T`.
    pub fn add_component<T: Component>(
        &mut self,
        entity: EntityId,
        value: T,
    ) -> Result<(), EcsError> {
        self.locate(entity)?;
        let type_id = self.registry.register::<T>()?;
        let mut staged = StagedRow::new();
        staged.insert(type_id, <T::Storage as Storage<T>>::stage(value));
        self.merge(entity, staged)
    }

    /// Detach `T` from `entity`, dropping the value. A no-op if the entity
    /// has no `T`.
    pub fn remove_component<T: Component>(&mut self, entity: EntityId) -> Result<(), EcsError> {
        let location = self.locate(entity)?;
        let Some(type_id) = self.registry.lookup::<T>() else {
            return Ok(());
        };
        let current = self.archetypes[location.archetype.index()].mask();
        if !current.contains_type(type_id) {
            return Ok(());
        }
        self.migrate(entity, location, current.difference(type_id.mask()), |row| {
            drop(row.remove(type_id));
        });
        Ok(())
    }

    /// Overwrite an existing `T` on `entity` in place.
    ///
    /// # Errors
    ///
    /// [`EcsError::MissingEntity`] for unknown ids and
    /// [`EcsError::MissingComponent`] if the entity holds no `T`; use
    /// [`add_component`](Self::add_component) to attach a new type.
    pub fn mutate_component<T: Component>(
        &mut self,
        entity: EntityId,
        value: T,
    ) -> Result<(), EcsError> {
        let location = self.locate(entity)?;
        let missing = EcsError::MissingComponent {
            entity,
            component: std::any::type_name::<T>(),
        };
        let Some(type_id) = self.registry.lookup::<T>() else {
            return Err(missing);
        };
        self.archetypes[location.archetype.index()]
            .replace(
                location.row,
                type_id,
                <T::Storage as Storage<T>>::stage(value),
            )
            .map(drop)
            .ok_or(missing)
    }

    // -- component access ---------------------------------------------------

    /// The `T` attached to `entity`, or `None` if it has none.
    ///
    /// # Errors
    ///
    /// [`EcsError::MissingEntity`] if the id is unknown.
    pub fn component<T: Component>(&self, entity: EntityId) -> Result<Option<&T>, EcsError> {
        let location = self.locate(entity)?;
        Ok(self
            .registry
            .lookup::<T>()
            .and_then(|tid| self.archetypes[location.archetype.index()].get::<T>(location.row, tid)))
    }

    /// Mutable access to the `T` attached to `entity`.
    pub fn component_mut<T: Component>(
        &mut self,
        entity: EntityId,
    ) -> Result<Option<&mut T>, EcsError> {
        let location = self.locate(entity)?;
        let Some(type_id) = self.registry.lookup::<T>() else {
            return Ok(None);
        };
        Ok(self.archetypes[location.archetype.index()].get_mut::<T>(location.row, type_id))
    }

    /// Whether `entity` has a `T`. `false` for unknown entities.
    pub fn has<T: Component>(&self, entity: EntityId) -> bool {
        let (Some(location), Some(type_id)) =
            (self.entities.get(entity), self.registry.lookup::<T>())
        else {
            return false;
        };
        self.archetypes[location.archetype.index()].has_component(type_id)
    }

    /// Whether `entity` is alive.
    pub fn contains(&self, entity: EntityId) -> bool {
        self.entities.contains(entity)
    }

    // -- introspection ------------------------------------------------------

    /// Total number of live entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Iterate all live entity ids, in no particular order.
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.iter().map(|(entity, _)| entity)
    }

    /// Number of archetypes, including the empty one.
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    pub fn archetype(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id.index())
    }

    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    pub(crate) fn archetypes_mut(&mut self) -> &mut [Archetype] {
        &mut self.archetypes
    }

    /// The archetype with exactly `mask`, if one has been created.
    pub fn archetype_for_mask(&self, mask: ComponentMask) -> Option<&Archetype> {
        self.archetype_index
            .get(&mask)
            .and_then(|id| self.archetypes.get(id.index()))
    }

    pub fn location(&self, entity: EntityId) -> Option<EntityLocation> {
        self.entities.get(entity)
    }

    /// Cross-check archetype storage against the entity index.
    ///
    /// # Panics
    ///
    /// Panics with an invariant violation on any desynchronization.
    pub fn check_invariants(&self) {
        let mut stored = 0;
        for archetype in &self.archetypes {
            archetype.check_invariants();
            if self.archetype_index.get(&archetype.mask()) != Some(&archetype.id()) {
                crate::invariant_violation(format_args!(
                    "archetype {:?} is not indexed under its mask {:?}",
                    archetype.id(),
                    archetype.mask()
                ));
            }
            for (row, &entity) in archetype.entities().iter().enumerate() {
                let expected = EntityLocation {
                    archetype: archetype.id(),
                    row,
                };
                if self.entities.get(entity) != Some(expected) {
                    crate::invariant_violation(format_args!(
                        "{entity:?} stored at {expected:?} but indexed at {:?}",
                        self.entities.get(entity)
                    ));
                }
            }
            stored += archetype.len();
        }
        if stored != self.entities.len() {
            crate::invariant_violation(format_args!(
                "archetypes hold {stored} rows but {} entities are indexed",
                self.entities.len()
            ));
        }
    }

    // -- resources ----------------------------------------------------------

    /// Insert a resource, returning the instance it replaced.
    pub fn add_resource<T: Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.resources.insert(value)
    }

    pub fn get_resource<T: Send + Sync + 'static>(&self) -> Result<&T, EcsError> {
        self.resources.get::<T>()
    }

    pub fn get_resource_mut<T: Send + Sync + 'static>(&mut self) -> Result<&mut T, EcsError> {
        self.resources.get_mut::<T>()
    }

    pub fn try_resource<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.resources.try_get::<T>()
    }

    /// Replace an existing resource, returning the previous value.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnregisteredResource`] if no `T` was added before.
    pub fn mutate_resource<T: Send + Sync + 'static>(&mut self, value: T) -> Result<T, EcsError> {
        self.resources.replace(value)
    }

    pub fn remove_resource<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.resources.remove::<T>()
    }

    pub fn has_resource<T: Send + Sync + 'static>(&self) -> bool {
        self.resources.contains::<T>()
    }

    // -- events -------------------------------------------------------------

    pub fn emit_event<E: Send + Sync + 'static>(&mut self, event: E) {
        self.events.emit(event);
    }

    /// Drain and return every pending `E`. A second call in the same step
    /// returns an empty list.
    pub fn get_events<E: Send + Sync + 'static>(&mut self) -> Vec<E> {
        self.events.drain::<E>()
    }

    /// Pending `E` events without draining them.
    pub fn peek_events<E: Send + Sync + 'static>(&self) -> &[E] {
        self.events.peek::<E>()
    }

    pub fn pending_events<E: Send + Sync + 'static>(&self) -> usize {
        self.events.pending::<E>()
    }

    /// Discard every pending event of every type.
    pub fn clear_events(&mut self) {
        self.events.clear();
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
