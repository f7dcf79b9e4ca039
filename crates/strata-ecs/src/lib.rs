//! Strata ECS -- in-memory columnar archetype storage for entities and
//! components.
//!
//! Entities are grouped into archetypes, one per distinct set of component
//! types, and stored Structure-of-Arrays style: one column per component type
//! plus a row-to-entity list. Plain numeric components declare a field schema
//! and live in dense packed columns that can be handed out as `&[T]` for bulk
//! processing; all other components live in a per-archetype arena of boxed
//! values.
//!
//! # Quick Start
//!
//! ```
//! use strata_ecs::prelude::*;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
//! #[repr(C)]
//! struct Position { x: f32, y: f32 }
//!
//! impl Component for Position { type Storage = Packed; }
//! impl PackedComponent for Position {
//!     const FIELDS: &'static [FieldDesc] = &[
//!         FieldDesc::scalar("x", Primitive::F32),
//!         FieldDesc::scalar("y", Primitive::F32),
//!     ];
//! }
//!
//! #[derive(Debug, PartialEq)]
//! struct Name(String);
//! impl Component for Name { type Storage = Boxed; }
//!
//! let mut world = World::new();
//! let entity = world.create_entity((Position { x: 0.0, y: 0.0 }, Name("probe".into())))?;
//!
//! for batch in world.get_batch_mut::<(Position,)>() {
//!     let (positions,) = batch.columns;
//!     for p in positions {
//!         p.x += 1.0;
//!     }
//! }
//!
//! assert_eq!(world.component::<Position>(entity)?, Some(&Position { x: 1.0, y: 0.0 }));
//! # Ok::<(), strata_ecs::EcsError>(())
//! ```

#![deny(unsafe_code)]

pub mod archetype;
pub mod command;
pub mod component;
pub mod config;
pub mod entity;
pub mod event;
pub mod query;
pub mod resource;
pub mod world;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by ECS operations.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// The entity has no entry in the entity index.
    #[error("entity {entity:?} does not exist")]
    MissingEntity { entity: entity::EntityId },

    /// `mutate_component` on a type the entity does not hold.
    #[error("entity {entity:?} has no component '{component}'")]
    MissingComponent {
        entity: entity::EntityId,
        component: &'static str,
    },

    #[error("resource '{resource}' has not been added")]
    MissingResource { resource: &'static str },

    /// `mutate_resource` before any `add_resource` of that type.
    #[error("resource '{resource}' must be added before it can be mutated")]
    UnregisteredResource { resource: &'static str },

    #[error("cannot register component '{component}': limit of {limit} component types reached")]
    TooManyComponentTypes {
        component: &'static str,
        limit: usize,
    },

    /// A packed component's field schema does not describe its memory layout.
    #[error("invalid packed layout for '{component}': {reason}")]
    InvalidPackedLayout {
        component: &'static str,
        reason: String,
    },

    /// Every id up to `u64::MAX` has been allocated or injected.
    #[error("entity id space exhausted")]
    EntityIdsExhausted,

    #[error("invalid world configuration: {reason}")]
    InvalidConfig { reason: String },

    /// The receiving [`command::CommandQueue`] has been dropped.
    #[error("command queue has been closed")]
    CommandQueueClosed,
}

/// Abort on storage desynchronization. Never returned as an error: it means
/// a bug in this crate, not a usage mistake.
#[cold]
#[track_caller]
pub(crate) fn invariant_violation(args: std::fmt::Arguments<'_>) -> ! {
    panic!("invariant violation: {args}")
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::archetype::{Archetype, ArchetypeId};
    pub use crate::command::{ApplyReport, Command, CommandQueue, CommandSender};
    pub use crate::component::{
        Boxed, BoxedSlice, BoxedSliceMut, Component, ComponentMask, ComponentTypeId, FieldDesc,
        Packed, PackedComponent, Primitive,
    };
    pub use crate::config::WorldConfig;
    pub use crate::entity::EntityId;
    pub use crate::query::{Batch, ComponentSet};
    pub use crate::world::{ComponentBundle, World};
    pub use crate::EcsError;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    // -- test component types -----------------------------------------------

    #[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    #[repr(C)]
    struct Position {
        x: f32,
        y: f32,
    }

    impl Component for Position {
        type Storage = Packed;
    }

    impl PackedComponent for Position {
        const FIELDS: &'static [FieldDesc] = &[
            FieldDesc::scalar("x", Primitive::F32),
            FieldDesc::scalar("y", Primitive::F32),
        ];
    }

    #[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    #[repr(C)]
    struct Velocity {
        dx: f32,
        dy: f32,
    }

    impl Component for Velocity {
        type Storage = Packed;
    }

    impl PackedComponent for Velocity {
        const FIELDS: &'static [FieldDesc] = &[
            FieldDesc::scalar("dx", Primitive::F32),
            FieldDesc::scalar("dy", Primitive::F32),
        ];
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Health(u32);

    impl Component for Health {
        type Storage = Boxed;
    }

    // -- scenarios -----------------------------------------------------------

    #[test]
    fn add_component_keeps_existing_values() {
        let mut world = World::new();
        let e = world.create_entity((Position { x: 1.0, y: 2.0 },)).unwrap();
        world
            .add_component(e, Velocity { dx: 3.0, dy: 4.0 })
            .unwrap();

        assert_eq!(
            world.component::<Position>(e).unwrap(),
            Some(&Position { x: 1.0, y: 2.0 })
        );
        assert_eq!(
            world.component::<Velocity>(e).unwrap(),
            Some(&Velocity { dx: 3.0, dy: 4.0 })
        );
    }

    #[test]
    fn remove_component_leaves_the_rest() {
        let mut world = World::new();
        let e = world
            .create_entity((Position { x: 0.0, y: 0.0 }, Velocity { dx: 1.0, dy: 1.0 }))
            .unwrap();
        world.remove_component::<Position>(e).unwrap();

        assert!(!world.has::<Position>(e));
        assert!(world.has::<Velocity>(e));
    }

    #[test]
    fn join_yields_only_full_matches() {
        let mut world = World::new();
        let e1 = world
            .create_entity((Position { x: 0.0, y: 0.0 }, Velocity { dx: 0.0, dy: 0.0 }))
            .unwrap();
        let _e2 = world.create_entity((Position { x: 1.0, y: 1.0 },)).unwrap();

        let rows: Vec<_> = world
            .join::<(Position, Velocity)>()
            .map(|(e, (p, v))| (e, *p, *v))
            .collect();
        assert_eq!(
            rows,
            vec![(
                e1,
                Position { x: 0.0, y: 0.0 },
                Velocity { dx: 0.0, dy: 0.0 }
            )]
        );
    }

    #[test]
    fn delete_middle_entity_keeps_neighbours() {
        let mut world = World::new();
        let e1 = world
            .create_entity((Position { x: 1.0, y: 1.0 }, Health(1)))
            .unwrap();
        let e2 = world
            .create_entity((Position { x: 2.0, y: 2.0 }, Health(2)))
            .unwrap();
        let e3 = world
            .create_entity((Position { x: 3.0, y: 3.0 }, Health(3)))
            .unwrap();

        world.delete_entity(e2).unwrap();

        let mut rows: Vec<_> = world
            .join::<(Position, Health)>()
            .map(|(e, (p, h))| (e, p.x, h.0))
            .collect();
        rows.sort_by_key(|(e, _, _)| *e);
        assert_eq!(rows, vec![(e1, 1.0, 1), (e3, 3.0, 3)]);
        world.check_invariants();
    }

    #[test]
    fn mutate_unknown_entity_fails() {
        let mut world = World::new();
        let unknown = EntityId::from_raw(12345);
        let err = world
            .mutate_component(unknown, Position { x: 0.0, y: 0.0 })
            .unwrap_err();
        assert!(matches!(err, EcsError::MissingEntity { entity } if entity == unknown));
    }

    // -- properties ----------------------------------------------------------

    #[test]
    fn archetype_mask_is_union_of_type_masks() {
        let mut world = World::new();
        let e = world
            .create_entity((Position { x: 0.0, y: 0.0 }, Health(5)))
            .unwrap();
        let expected = world.registry().mask_of::<Position>().unwrap()
            | world.registry().mask_of::<Health>().unwrap();
        let location = world.location(e).unwrap();
        assert_eq!(world.archetype(location.archetype).unwrap().mask(), expected);
        assert_eq!(world.archetype_for_mask(expected).unwrap().len(), 1);
    }

    #[test]
    fn migration_round_trip_preserves_unrelated_data() {
        let mut world = World::new();
        let e = world
            .create_entity((Position { x: 4.0, y: 5.0 }, Health(9)))
            .unwrap();
        world.add_component(e, Velocity { dx: 1.0, dy: 2.0 }).unwrap();
        world.remove_component::<Health>(e).unwrap();

        assert_eq!(
            world.component::<Position>(e).unwrap(),
            Some(&Position { x: 4.0, y: 5.0 })
        );
        assert_eq!(
            world.component::<Velocity>(e).unwrap(),
            Some(&Velocity { dx: 1.0, dy: 2.0 })
        );
        assert!(!world.has::<Health>(e));
        world.check_invariants();
    }

    #[test]
    fn missing_resource_fails_fast() {
        let world = World::new();
        assert!(matches!(
            world.get_resource::<Health>(),
            Err(EcsError::MissingResource { .. })
        ));
        assert!(world.try_resource::<Health>().is_none());
    }

    #[test]
    fn registry_limit_from_config() {
        let mut world = World::with_config(WorldConfig {
            max_component_types: 2,
            ..WorldConfig::default()
        })
        .unwrap();
        world.create_entity((Position { x: 0.0, y: 0.0 }, Health(1))).unwrap();
        let err = world
            .create_entity((Velocity { dx: 0.0, dy: 0.0 },))
            .unwrap_err();
        assert!(matches!(err, EcsError::TooManyComponentTypes { limit: 2, .. }));
        // A failed creation does not allocate an entity.
        assert_eq!(world.entity_count(), 1);
    }

    #[test]
    fn world_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<World>();
        assert_send_sync::<ComponentBundle>();
    }
}
