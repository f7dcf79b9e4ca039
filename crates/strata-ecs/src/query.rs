//! Query system for iterating entities by component set.
//!
//! Queries resolve which archetypes contain the required components and
//! iterate them in one of two modes:
//!
//! - [`World::join`] yields `(EntityId, (&C1, &C2, ...))` for each matching
//!   row. Packed values are viewed in place through their declared layout;
//!   boxed values are downcast from the archetype arena.
//! - [`World::get_batch`] and [`World::get_batch_mut`] yield one [`Batch`]
//!   per non-empty matching archetype, carrying the `[0, count)` region of
//!   every requested column. Packed columns come out as plain `&[T]` /
//!   `&mut [T]`.
//!
//! Every item borrows the world, so no structural change can happen while a
//! row reference or batch slice is alive.

use std::marker::PhantomData;

use crate::archetype::{disjoint_columns_mut, Archetype, Column};
use crate::component::{Component, ComponentMask, ComponentTypeId, Storage, TypeRegistry};
use crate::entity::EntityId;
use crate::world::World;

// ---------------------------------------------------------------------------
// ComponentSet
// ---------------------------------------------------------------------------

/// A tuple of component types that can be queried together: `(A,)`,
/// `(A, B)`, up to four types.
pub trait ComponentSet: 'static {
    /// Per-row references, `(&A, &B, ...)`.
    type Refs<'a>;
    /// Per-archetype read-only column views.
    type Slices<'a>;
    /// Per-archetype mutable column views.
    type SlicesMut<'a>;

    /// Ids of the requested types in request order, or `None` if any of them
    /// was never registered.
    fn type_ids(registry: &TypeRegistry) -> Option<Vec<ComponentTypeId>>;

    /// `cols[i]` is the archetype column index of the i-th requested type.
    fn fetch<'a>(columns: &'a [Column], cols: &[usize], row: usize) -> Self::Refs<'a>;

    fn slices<'a>(columns: &'a [Column], cols: &[usize], count: usize) -> Self::Slices<'a>;

    fn slices_mut<'a>(
        columns: &'a mut [Column],
        cols: &[usize],
        count: usize,
    ) -> Self::SlicesMut<'a>;
}

fn fetch_one<T: Component>(columns: &[Column], col: usize, row: usize) -> &T {
    match <T::Storage as Storage<T>>::get(&columns[col], row) {
        Some(value) => value,
        None => crate::invariant_violation(format_args!(
            "row {row} of column {col} does not hold a {}",
            std::any::type_name::<T>()
        )),
    }
}

macro_rules! impl_component_set {
    ($(($name:ident, $var:ident, $idx:tt)),+) => {
        impl<$($name: Component),+> ComponentSet for ($($name,)+) {
            type Refs<'a> = ($(&'a $name,)+);
            type Slices<'a> = ($(<$name::Storage as Storage<$name>>::Slice<'a>,)+);
            type SlicesMut<'a> = ($(<$name::Storage as Storage<$name>>::SliceMut<'a>,)+);

            fn type_ids(registry: &TypeRegistry) -> Option<Vec<ComponentTypeId>> {
                Some(vec![$(registry.lookup::<$name>()?),+])
            }

            fn fetch<'a>(columns: &'a [Column], cols: &[usize], row: usize) -> Self::Refs<'a> {
                ($(fetch_one::<$name>(columns, cols[$idx], row),)+)
            }

            fn slices<'a>(columns: &'a [Column], cols: &[usize], count: usize) -> Self::Slices<'a> {
                ($(<$name::Storage as Storage<$name>>::slice(&columns[cols[$idx]], count),)+)
            }

            fn slices_mut<'a>(
                columns: &'a mut [Column],
                cols: &[usize],
                count: usize,
            ) -> Self::SlicesMut<'a> {
                let [$($var),+] = disjoint_columns_mut(columns, [$(cols[$idx]),+]);
                ($(<$name::Storage as Storage<$name>>::slice_mut($var, count),)+)
            }
        }
    };
}

impl_component_set!((A, a, 0));
impl_component_set!((A, a, 0), (B, b, 1));
impl_component_set!((A, a, 0), (B, b, 1), (C, c, 2));
impl_component_set!((A, a, 0), (B, b, 1), (C, c, 2), (D, d, 3));

/// Resolved ids and combined mask of a query, or `None` if it can match
/// nothing.
struct Plan {
    type_ids: Vec<ComponentTypeId>,
    mask: ComponentMask,
}

impl Plan {
    fn new<Q: ComponentSet>(registry: &TypeRegistry) -> Option<Self> {
        let type_ids = Q::type_ids(registry)?;
        let mask = registry.mask_of_set(&type_ids);
        Some(Self { type_ids, mask })
    }

    fn matches(&self, archetype: &Archetype) -> bool {
        archetype.mask().contains(self.mask)
    }

    fn columns_of(&self, archetype: &Archetype) -> Vec<usize> {
        self.type_ids
            .iter()
            .map(|&type_id| match archetype.column_index(type_id) {
                Some(idx) => idx,
                None => crate::invariant_violation(format_args!(
                    "archetype {:?} matched a query but has no column for {type_id:?}",
                    archetype.id()
                )),
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// JoinIter
// ---------------------------------------------------------------------------

/// Row-by-row iterator returned by [`World::join`].
pub struct JoinIter<'w, Q: ComponentSet> {
    archetypes: std::slice::Iter<'w, Archetype>,
    plan: Option<Plan>,
    current: Option<(&'w Archetype, Vec<usize>)>,
    row: usize,
    _marker: PhantomData<fn() -> Q>,
}

impl<'w, Q: ComponentSet> Iterator for JoinIter<'w, Q> {
    type Item = (EntityId, Q::Refs<'w>);

    fn next(&mut self) -> Option<Self::Item> {
        let plan = self.plan.as_ref()?;
        loop {
            if let Some((archetype, cols)) = &self.current {
                let archetype: &'w Archetype = *archetype;
                if self.row < archetype.len() {
                    let row = self.row;
                    self.row += 1;
                    return Some((
                        archetype.entities()[row],
                        Q::fetch(archetype.columns(), cols, row),
                    ));
                }
            }
            let next = self.archetypes.find(|a| plan.matches(a))?;
            self.current = Some((next, plan.columns_of(next)));
            self.row = 0;
        }
    }
}

// ---------------------------------------------------------------------------
// Batches
// ---------------------------------------------------------------------------

/// The live rows of one matching archetype.
#[derive(Debug)]
pub struct Batch<'w, S> {
    /// Number of rows; every slice in `columns` has this length.
    pub count: usize,
    /// Row -> entity.
    pub entities: &'w [EntityId],
    /// One view per requested type, in request order.
    pub columns: S,
}

/// Iterator returned by [`World::get_batch`].
pub struct BatchIter<'w, Q: ComponentSet> {
    archetypes: std::slice::Iter<'w, Archetype>,
    plan: Option<Plan>,
    _marker: PhantomData<fn() -> Q>,
}

impl<'w, Q: ComponentSet> Iterator for BatchIter<'w, Q> {
    type Item = Batch<'w, Q::Slices<'w>>;

    fn next(&mut self) -> Option<Self::Item> {
        let plan = self.plan.as_ref()?;
        let archetype: &'w Archetype = self
            .archetypes
            .find(|a| !a.is_empty() && plan.matches(a))?;
        let cols = plan.columns_of(archetype);
        let count = archetype.len();
        Some(Batch {
            count,
            entities: archetype.entities(),
            columns: Q::slices(archetype.columns(), &cols, count),
        })
    }
}

/// Iterator returned by [`World::get_batch_mut`].
pub struct BatchIterMut<'w, Q: ComponentSet> {
    archetypes: std::slice::IterMut<'w, Archetype>,
    plan: Option<Plan>,
    _marker: PhantomData<fn() -> Q>,
}

impl<'w, Q: ComponentSet> Iterator for BatchIterMut<'w, Q> {
    type Item = Batch<'w, Q::SlicesMut<'w>>;

    fn next(&mut self) -> Option<Self::Item> {
        let plan = self.plan.as_ref()?;
        let archetype: &'w mut Archetype = self
            .archetypes
            .find(|a| !a.is_empty() && plan.matches(a))?;
        let cols = plan.columns_of(archetype);
        let count = archetype.len();
        let (entities, columns) = archetype.split_mut();
        Some(Batch {
            count,
            entities,
            columns: Q::slices_mut(columns, &cols, count),
        })
    }
}

// ---------------------------------------------------------------------------
// World query methods
// ---------------------------------------------------------------------------

impl World {
    /// Iterate every entity that has all of `Q`'s component types.
    ///
    /// ```
    /// use strata_ecs::prelude::*;
    ///
    /// #[derive(Debug, PartialEq)]
    /// struct Name(&'static str);
    /// impl Component for Name { type Storage = Boxed; }
    ///
    /// let mut world = World::new();
    /// let e = world.create_entity((Name("probe"),)).unwrap();
    /// let rows: Vec<_> = world.join::<(Name,)>().collect();
    /// assert_eq!(rows, vec![(e, (&Name("probe"),))]);
    /// ```
    pub fn join<Q: ComponentSet>(&self) -> JoinIter<'_, Q> {
        JoinIter {
            archetypes: self.archetypes().iter(),
            plan: Plan::new::<Q>(self.registry()),
            current: None,
            row: 0,
            _marker: PhantomData,
        }
    }

    /// Iterate the non-empty archetypes that have all of `Q`'s component
    /// types, as column slices.
    pub fn get_batch<Q: ComponentSet>(&self) -> BatchIter<'_, Q> {
        BatchIter {
            archetypes: self.archetypes().iter(),
            plan: Plan::new::<Q>(self.registry()),
            _marker: PhantomData,
        }
    }

    /// Like [`get_batch`](Self::get_batch), with mutable column slices.
    ///
    /// # Panics
    ///
    /// Panics if `Q` names the same component type more than once.
    pub fn get_batch_mut<Q: ComponentSet>(&mut self) -> BatchIterMut<'_, Q> {
        let plan = Plan::new::<Q>(self.registry());
        if let Some(plan) = &plan {
            if plan.mask.count() != plan.type_ids.len() {
                panic!("query requests the same component type more than once");
            }
        }
        BatchIterMut {
            archetypes: self.archetypes_mut().iter_mut(),
            plan,
            _marker: PhantomData,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Boxed, FieldDesc, Packed, PackedComponent, Primitive};

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
    struct Tag(&'static str);

    impl Component for Tag {
        type Storage = Boxed;
    }

    fn setup_world() -> (World, Vec<EntityId>) {
        let mut world = World::new();
        let ids = vec![
            world
                .create_entity((Position { x: 0.0, y: 0.0 }, Velocity { dx: 1.0, dy: 0.0 }))
                .unwrap(),
            world
                .create_entity((Position { x: 1.0, y: 0.0 }, Velocity { dx: 0.0, dy: 1.0 }, Tag("t")))
                .unwrap(),
            world.create_entity((Position { x: 2.0, y: 0.0 },)).unwrap(),
            world.create_entity((Tag("only"),)).unwrap(),
        ];
        (world, ids)
    }

    #[test]
    fn join_matches_supersets_only() {
        let (world, ids) = setup_world();
        let mut hits: Vec<EntityId> = world
            .join::<(Position, Velocity)>()
            .map(|(e, _)| e)
            .collect();
        hits.sort();
        assert_eq!(hits, vec![ids[0], ids[1]]);
        assert_eq!(world.join::<(Position,)>().count(), 3);
    }

    #[test]
    fn join_reconstructs_values() {
        let (world, ids) = setup_world();
        let (_, (pos, tag)) = world
            .join::<(Position, Tag)>()
            .next()
            .expect("one match");
        assert_eq!(*pos, Position { x: 1.0, y: 0.0 });
        assert_eq!(*tag, Tag("t"));
        assert_eq!(world.join::<(Tag,)>().count(), 2);
        assert!(world.contains(ids[3]));
    }

    #[test]
    fn unregistered_type_matches_nothing() {
        #[derive(Debug)]
        struct Never;
        impl Component for Never {
            type Storage = Boxed;
        }
        let (world, _) = setup_world();
        assert_eq!(world.join::<(Position, Never)>().count(), 0);
        assert_eq!(world.get_batch::<(Never,)>().count(), 0);
    }

    #[test]
    fn get_batch_yields_packed_slices() {
        let (world, _) = setup_world();
        let mut total = 0;
        for batch in world.get_batch::<(Position, Velocity)>() {
            let (positions, velocities) = batch.columns;
            assert_eq!(positions.len(), batch.count);
            assert_eq!(velocities.len(), batch.count);
            assert_eq!(batch.entities.len(), batch.count);
            total += batch.count;
        }
        assert_eq!(total, 2);
    }

    #[test]
    fn packed_bytes_match_batch_slice() {
        let (world, _) = setup_world();
        let position = world.registry().lookup::<Position>().unwrap();
        for batch in world.get_batch::<(Position,)>() {
            let (positions,) = batch.columns;
            let location = world.location(batch.entities[0]).unwrap();
            let archetype = world.archetype(location.archetype).unwrap();
            let bytes = archetype.packed_bytes(position).unwrap();
            assert_eq!(bytes, bytemuck::cast_slice::<Position, u8>(positions));

            let column = archetype.column(position).unwrap().as_packed().unwrap();
            assert_eq!(bytes.len(), column.layout().size * batch.count);
            assert_eq!(column.layout().field("y").map(|f| f.offset), Some(4));
        }
    }

    #[test]
    fn get_batch_skips_empty_archetypes() {
        let (mut world, ids) = setup_world();
        world.delete_entity(ids[2]).unwrap();
        // The {Position} archetype still exists but is empty now.
        assert!(world
            .get_batch::<(Position,)>()
            .all(|batch| batch.count > 0));
        assert_eq!(world.get_batch::<(Position,)>().count(), 2);
    }

    #[test]
    fn get_batch_mut_updates_in_place() {
        let (mut world, ids) = setup_world();
        for batch in world.get_batch_mut::<(Position, Velocity)>() {
            let (positions, velocities) = batch.columns;
            for (p, v) in positions.iter_mut().zip(velocities.iter()) {
                p.x += v.dx;
                p.y += v.dy;
            }
        }
        assert_eq!(
            world.component::<Position>(ids[0]).unwrap(),
            Some(&Position { x: 1.0, y: 0.0 })
        );
        assert_eq!(
            world.component::<Position>(ids[1]).unwrap(),
            Some(&Position { x: 1.0, y: 1.0 })
        );
        assert_eq!(
            world.component::<Position>(ids[2]).unwrap(),
            Some(&Position { x: 2.0, y: 0.0 })
        );
    }

    #[test]
    fn get_batch_mut_on_boxed_columns() {
        let (mut world, _) = setup_world();
        for batch in world.get_batch_mut::<(Tag,)>() {
            let (mut tags,) = batch.columns;
            for tag in tags.iter_mut() {
                tag.0 = "seen";
            }
        }
        assert!(world.join::<(Tag,)>().all(|(_, (tag,))| tag.0 == "seen"));
    }

    #[test]
    #[should_panic(expected = "same component type more than once")]
    fn get_batch_mut_rejects_duplicate_types() {
        let (mut world, _) = setup_world();
        let _ = world.get_batch_mut::<(Position, Position)>();
    }

    #[test]
    fn join_and_batch_agree() {
        let (world, _) = setup_world();
        let mut from_join: Vec<(EntityId, f32)> = world
            .join::<(Position,)>()
            .map(|(e, (p,))| (e, p.x))
            .collect();
        let mut from_batch: Vec<(EntityId, f32)> = world
            .get_batch::<(Position,)>()
            .flat_map(|batch| {
                let (positions,) = batch.columns;
                batch
                    .entities
                    .iter()
                    .copied()
                    .zip(positions.iter().map(|p| p.x))
            })
            .collect();
        from_join.sort_by_key(|(e, _)| *e);
        from_batch.sort_by_key(|(e, _)| *e);
        assert_eq!(from_join, from_batch);
    }
}
