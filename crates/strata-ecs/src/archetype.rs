//! Archetype storage for the ECS.
//!
//! An [`Archetype`] stores all entities that share the exact same set of
//! component types. Within each archetype, components are laid out in a
//! Structure-of-Arrays (SoA) pattern: one [`Column`] per component type, plus
//! a parallel `Vec<EntityId>` that maps row index to entity.
//!
//! Columns come in two kinds. A [`PackedColumn`] is a dense, 16-byte aligned
//! byte buffer holding one fixed-width stride per row; it is what makes
//! zero-copy `&[T]` batch views possible. A [`BoxedColumn`] is an arena of
//! boxed values owned by the archetype.
//!
//! Rows `[0, len)` are live. The archetype tracks a logical `capacity` that
//! doubles whenever an insert finds it full; packed columns keep their backing
//! buffer sized to that capacity, with unused rows zeroed.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::component::{
    ColumnKind, Component, ComponentInfo, ComponentMask, ComponentTypeId, FieldLayout,
    PackedLayout, Storage,
};
use crate::entity::EntityId;

type BoxedValue = Box<dyn Any + Send + Sync>;

/// Bytes per backing word of a packed column. Using `u128` words gives every
/// column the alignment of `u128`.
const WORD: usize = std::mem::size_of::<u128>();

// ---------------------------------------------------------------------------
// ArchetypeId
// ---------------------------------------------------------------------------

/// Identifies an archetype within the world. Indices into `World::archetypes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArchetypeId(pub(crate) u32);

impl ArchetypeId {
    /// The archetype every entity is born into.
    pub const EMPTY: ArchetypeId = ArchetypeId(0);

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ---------------------------------------------------------------------------
// Staging
// ---------------------------------------------------------------------------

/// One component value in transit between a caller and a column, or between
/// two archetypes during migration.
pub enum StagedValue {
    /// The raw bytes of a packed component (`size_of::<T>()` long).
    Packed(Vec<u8>),
    Boxed(BoxedValue),
}

impl fmt::Debug for StagedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StagedValue::Packed(bytes) => write!(f, "Packed({} bytes)", bytes.len()),
            StagedValue::Boxed(_) => f.write_str("Boxed(..)"),
        }
    }
}

/// A complete set of component values for one row, sorted by
/// [`ComponentTypeId`].
#[derive(Debug, Default)]
pub struct StagedRow {
    values: Vec<(ComponentTypeId, StagedValue)>,
}

impl StagedRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing (and returning) any value already staged for
    /// the same type.
    pub fn insert(&mut self, id: ComponentTypeId, value: StagedValue) -> Option<StagedValue> {
        match self.values.binary_search_by_key(&id, |(tid, _)| *tid) {
            Ok(idx) => Some(std::mem::replace(&mut self.values[idx].1, value)),
            Err(idx) => {
                self.values.insert(idx, (id, value));
                None
            }
        }
    }

    /// Remove the value staged for `id`, if any.
    pub fn remove(&mut self, id: ComponentTypeId) -> Option<StagedValue> {
        let idx = self
            .values
            .binary_search_by_key(&id, |(tid, _)| *tid)
            .ok()?;
        Some(self.values.remove(idx).1)
    }

    pub fn contains(&self, id: ComponentTypeId) -> bool {
        self.values
            .binary_search_by_key(&id, |(tid, _)| *tid)
            .is_ok()
    }

    /// Mask of every staged type.
    pub fn mask(&self) -> ComponentMask {
        self.values
            .iter()
            .fold(ComponentMask::EMPTY, |acc, (id, _)| acc.union(id.mask()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn type_ids(&self) -> impl Iterator<Item = ComponentTypeId> + '_ {
        self.values.iter().map(|(id, _)| *id)
    }
}

impl IntoIterator for StagedRow {
    type Item = (ComponentTypeId, StagedValue);
    type IntoIter = std::vec::IntoIter<(ComponentTypeId, StagedValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

// ---------------------------------------------------------------------------
// PackedColumn
// ---------------------------------------------------------------------------

/// Dense fixed-stride storage for one packed component type.
pub struct PackedColumn {
    layout: Arc<PackedLayout>,
    /// Backing buffer sized to the archetype's capacity.
    words: Vec<u128>,
    /// Number of live rows.
    len: usize,
}

impl PackedColumn {
    fn with_capacity(layout: Arc<PackedLayout>, capacity: usize) -> Self {
        let mut column = Self {
            layout,
            words: Vec::new(),
            len: 0,
        };
        column.grow(capacity);
        column
    }

    /// Schema of the stored component.
    pub fn layout(&self) -> &PackedLayout {
        &self.layout
    }

    /// Bytes per row.
    #[inline]
    pub fn stride(&self) -> usize {
        self.layout.size
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of rows the backing buffer can hold.
    pub fn capacity(&self) -> usize {
        self.words.len() * WORD / self.stride()
    }

    /// The live rows `[0, len)` as raw bytes.
    pub fn bytes(&self) -> &[u8] {
        let live = self.len * self.stride();
        &bytemuck::cast_slice::<u128, u8>(&self.words)[..live]
    }

    /// The live rows `[0, len)` as mutable raw bytes.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        let live = self.len * self.stride();
        &mut bytemuck::cast_slice_mut::<u128, u8>(&mut self.words)[..live]
    }

    pub fn row_bytes(&self, row: usize) -> Option<&[u8]> {
        if row >= self.len {
            return None;
        }
        let stride = self.stride();
        Some(&self.bytes()[row * stride..(row + 1) * stride])
    }

    pub fn row_bytes_mut(&mut self, row: usize) -> Option<&mut [u8]> {
        if row >= self.len {
            return None;
        }
        let stride = self.stride();
        Some(&mut self.bytes_mut()[row * stride..(row + 1) * stride])
    }

    /// Read one field of every live row, using the offsets precomputed from
    /// the component's schema. `P` must be exactly as wide as the field
    /// (e.g. `f32` for a scalar `F32` field, `[f64; 3]` for a 3-wide `F64`
    /// field); otherwise `None` is returned.
    pub fn field_values<P: bytemuck::Pod>(&self, name: &str) -> Option<Vec<P>> {
        let field: &FieldLayout = self.layout.field(name)?;
        if field.width() != std::mem::size_of::<P>() {
            return None;
        }
        let stride = self.stride();
        let bytes = self.bytes();
        Some(
            (0..self.len)
                .map(|row| {
                    let start = row * stride + field.offset;
                    bytemuck::pod_read_unaligned(&bytes[start..start + field.width()])
                })
                .collect(),
        )
    }

    /// Resize the backing buffer to hold `capacity` rows. Never shrinks below
    /// the live rows.
    fn grow(&mut self, capacity: usize) {
        let bytes = capacity.max(self.len) * self.stride();
        let words = bytes.div_ceil(WORD);
        if words > self.words.len() {
            self.words.resize(words, 0);
        }
    }

    fn push(&mut self, bytes: &[u8]) {
        let stride = self.stride();
        if bytes.len() != stride {
            crate::invariant_violation(format_args!(
                "staged value for {} is {} bytes, expected {stride}",
                self.layout.type_name,
                bytes.len()
            ));
        }
        if self.len == self.capacity() {
            self.grow((self.len * 2).max(1));
        }
        let start = self.len * stride;
        bytemuck::cast_slice_mut::<u128, u8>(&mut self.words)[start..start + stride]
            .copy_from_slice(bytes);
        self.len += 1;
    }

    fn overwrite(&mut self, row: usize, bytes: &[u8]) -> Vec<u8> {
        let type_name = self.layout.type_name;
        let Some(slot) = self.row_bytes_mut(row) else {
            crate::invariant_violation(format_args!(
                "row {row} out of bounds in packed column {type_name}"
            ));
        };
        let old = slot.to_vec();
        slot.copy_from_slice(bytes);
        old
    }

    /// Swap-remove `row`, returning its bytes. The last row is copied into
    /// the freed slot and the vacated tail row is zeroed.
    fn swap_remove(&mut self, row: usize) -> Vec<u8> {
        debug_assert!(row < self.len);
        let stride = self.stride();
        let last = self.len - 1;
        let all = bytemuck::cast_slice_mut::<u128, u8>(&mut self.words);
        let removed = all[row * stride..(row + 1) * stride].to_vec();
        if row != last {
            all.copy_within(last * stride..(last + 1) * stride, row * stride);
        }
        all[last * stride..(last + 1) * stride].fill(0);
        self.len -= 1;
        removed
    }
}

impl fmt::Debug for PackedColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackedColumn")
            .field("type", &self.layout.type_name)
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .field("stride", &self.stride())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// BoxedColumn
// ---------------------------------------------------------------------------

/// Arena of individually boxed component values, one slot per row.
#[derive(Default)]
pub struct BoxedColumn {
    values: Vec<BoxedValue>,
}

impl BoxedColumn {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, row: usize) -> Option<&(dyn Any + Send + Sync)> {
        self.values.get(row).map(|b| b.as_ref())
    }

    pub fn get_mut(&mut self, row: usize) -> Option<&mut (dyn Any + Send + Sync)> {
        self.values.get_mut(row).map(|b| b.as_mut())
    }

    pub(crate) fn values(&self) -> &[BoxedValue] {
        &self.values
    }

    pub(crate) fn values_mut(&mut self) -> &mut [BoxedValue] {
        &mut self.values
    }
}

impl fmt::Debug for BoxedColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxedColumn")
            .field("len", &self.values.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Column
// ---------------------------------------------------------------------------

/// Storage for one component type within an archetype.
#[derive(Debug)]
pub enum Column {
    Packed(PackedColumn),
    Boxed(BoxedColumn),
}

impl Column {
    fn new(kind: &ColumnKind, capacity: usize) -> Self {
        match kind {
            ColumnKind::Packed(layout) => {
                Column::Packed(PackedColumn::with_capacity(Arc::clone(layout), capacity))
            }
            ColumnKind::Boxed => Column::Boxed(BoxedColumn::with_capacity(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Packed(c) => c.len(),
            Column::Boxed(c) => c.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_packed(&self) -> Option<&PackedColumn> {
        match self {
            Column::Packed(c) => Some(c),
            Column::Boxed(_) => None,
        }
    }

    pub fn as_packed_mut(&mut self) -> Option<&mut PackedColumn> {
        match self {
            Column::Packed(c) => Some(c),
            Column::Boxed(_) => None,
        }
    }

    pub fn as_boxed(&self) -> Option<&BoxedColumn> {
        match self {
            Column::Boxed(c) => Some(c),
            Column::Packed(_) => None,
        }
    }

    pub fn as_boxed_mut(&mut self) -> Option<&mut BoxedColumn> {
        match self {
            Column::Boxed(c) => Some(c),
            Column::Packed(_) => None,
        }
    }

    fn grow(&mut self, capacity: usize) {
        match self {
            Column::Packed(c) => c.grow(capacity),
            Column::Boxed(c) => {
                let additional = capacity.saturating_sub(c.values.len());
                c.values.reserve_exact(additional);
            }
        }
    }

    fn push(&mut self, value: StagedValue) {
        match (self, value) {
            (Column::Packed(c), StagedValue::Packed(bytes)) => c.push(&bytes),
            (Column::Boxed(c), StagedValue::Boxed(value)) => c.values.push(value),
            (column, value) => crate::invariant_violation(format_args!(
                "cannot push {value:?} into {column:?}"
            )),
        }
    }

    fn replace(&mut self, row: usize, value: StagedValue) -> StagedValue {
        match (self, value) {
            (Column::Packed(c), StagedValue::Packed(bytes)) => {
                StagedValue::Packed(c.overwrite(row, &bytes))
            }
            (Column::Boxed(c), StagedValue::Boxed(value)) => match c.values.get_mut(row) {
                Some(slot) => StagedValue::Boxed(std::mem::replace(slot, value)),
                None => crate::invariant_violation(format_args!(
                    "row {row} out of bounds in boxed column"
                )),
            },
            (column, value) => crate::invariant_violation(format_args!(
                "cannot store {value:?} into {column:?}"
            )),
        }
    }

    fn swap_remove(&mut self, row: usize) -> StagedValue {
        match self {
            Column::Packed(c) => StagedValue::Packed(c.swap_remove(row)),
            Column::Boxed(c) => StagedValue::Boxed(c.values.swap_remove(row)),
        }
    }
}

/// Borrow several distinct columns mutably at once.
///
/// # Panics
///
/// Panics if an index is repeated or out of range.
pub(crate) fn disjoint_columns_mut<const N: usize>(
    columns: &mut [Column],
    indices: [usize; N],
) -> [&mut Column; N] {
    let mut slots: [Option<&mut Column>; N] = std::array::from_fn(|_| None);
    for (i, column) in columns.iter_mut().enumerate() {
        if let Some(pos) = indices.iter().position(|&j| j == i) {
            slots[pos] = Some(column);
        }
    }
    slots.map(|slot| match slot {
        Some(column) => column,
        None => panic!("query requests the same component type more than once"),
    })
}

// ---------------------------------------------------------------------------
// Archetype
// ---------------------------------------------------------------------------

/// An archetype stores all entities that share the exact same set of
/// component types. Components are laid out SoA-style: one [`Column`] per
/// type, plus a parallel entity ID vector.
///
/// Columns are stored in a `Vec` sorted by `ComponentTypeId` for
/// deterministic iteration order and binary-search lookups.
#[derive(Debug)]
pub struct Archetype {
    /// Unique identifier of this archetype.
    id: ArchetypeId,
    /// OR of the masks of every type in the archetype.
    mask: ComponentMask,
    /// Sorted list of component types in this archetype.
    component_types: Vec<ComponentTypeId>,
    /// Invariant: `columns[i]` stores `component_types[i]`.
    columns: Vec<Column>,
    /// Row -> entity.
    entities: Vec<EntityId>,
    /// Rows reserved in every column. Always `>= entities.len()`.
    capacity: usize,
}

impl Archetype {
    /// Create a new, empty archetype for the given component types. `infos`
    /// must be sorted by id.
    pub fn new(id: ArchetypeId, infos: &[&ComponentInfo], initial_capacity: usize) -> Self {
        let capacity = initial_capacity.max(1);
        debug_assert!(infos.windows(2).all(|w| w[0].id < w[1].id));
        Self {
            id,
            mask: infos
                .iter()
                .fold(ComponentMask::EMPTY, |acc, info| acc.union(info.mask)),
            component_types: infos.iter().map(|info| info.id).collect(),
            columns: infos
                .iter()
                .map(|info| Column::new(&info.kind, capacity))
                .collect(),
            entities: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Binary search for a column by ComponentTypeId.
    #[inline]
    pub(crate) fn column_index(&self, type_id: ComponentTypeId) -> Option<usize> {
        self.component_types.binary_search(&type_id).ok()
    }

    #[inline]
    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    #[inline]
    pub fn mask(&self) -> ComponentMask {
        self.mask
    }

    /// The sorted set of component type IDs that define this archetype.
    #[inline]
    pub fn component_types(&self) -> &[ComponentTypeId] {
        &self.component_types
    }

    #[inline]
    pub fn has_component(&self, type_id: ComponentTypeId) -> bool {
        self.mask.contains_type(type_id)
    }

    /// Number of entities stored in this archetype (`count`).
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Rows reserved before the next growth.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The entity IDs stored in this archetype, indexed by row.
    #[inline]
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    pub fn column(&self, type_id: ComponentTypeId) -> Option<&Column> {
        self.column_index(type_id).map(|idx| &self.columns[idx])
    }

    /// Raw bytes of the `[0, len)` rows of a packed column. `None` for boxed
    /// or absent types.
    pub fn packed_bytes(&self, type_id: ComponentTypeId) -> Option<&[u8]> {
        self.column(type_id)?.as_packed().map(PackedColumn::bytes)
    }

    pub(crate) fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Split into the entity list and the mutable columns.
    pub(crate) fn split_mut(&mut self) -> (&[EntityId], &mut [Column]) {
        (&self.entities, &mut self.columns)
    }

    /// Append a row for `entity`. `row` must hold exactly one value for every
    /// component type of this archetype. Returns the new row index.
    ///
    /// Doubles the capacity first when the archetype is full; rows
    /// `[0, len)` are preserved.
    pub fn insert(&mut self, entity: EntityId, row: StagedRow) -> usize {
        if !row.type_ids().eq(self.component_types.iter().copied()) {
            crate::invariant_violation(format_args!(
                "staged row {:?} does not match archetype {:?} types {:?}",
                row.mask(),
                self.id,
                self.component_types
            ));
        }
        if self.entities.len() == self.capacity {
            self.grow(self.capacity * 2);
        }
        let index = self.entities.len();
        self.entities.push(entity);
        for ((_, value), column) in row.into_iter().zip(&mut self.columns) {
            column.push(value);
        }
        index
    }

    /// Remove the entity at `row`, using swap-remove to keep storage dense.
    ///
    /// Returns the entity that was moved into `row` (the previous last entity)
    /// if any swap occurred, or `None` if the removed entity was the last.
    pub fn remove(&mut self, row: usize) -> Option<EntityId> {
        let (removed, moved) = self.take_row(row);
        drop(removed);
        moved
    }

    /// Swap-remove the entity at `row`, moving its component values out into
    /// a [`StagedRow`] instead of dropping them.
    ///
    /// Returns the staged values and the entity swapped into `row`, if any.
    pub fn take_row(&mut self, row: usize) -> (StagedRow, Option<EntityId>) {
        let last = self.entities.len() - 1;
        self.entities.swap_remove(row);
        let mut staged = StagedRow::new();
        for (type_id, column) in self.component_types.iter().zip(&mut self.columns) {
            staged.values.push((*type_id, column.swap_remove(row)));
        }
        let moved = (row < last).then(|| self.entities[row]);
        (staged, moved)
    }

    /// Get a reference to a component value.
    pub fn get<T: Component>(&self, row: usize, type_id: ComponentTypeId) -> Option<&T> {
        let column = self.column(type_id)?;
        <T::Storage as Storage<T>>::get(column, row)
    }

    /// Get a mutable reference to a component value.
    pub fn get_mut<T: Component>(&mut self, row: usize, type_id: ComponentTypeId) -> Option<&mut T> {
        let idx = self.column_index(type_id)?;
        <T::Storage as Storage<T>>::get_mut(&mut self.columns[idx], row)
    }

    /// Overwrite the value of `type_id` at `row` in place, returning the old
    /// value, or `None` if the archetype has no such column.
    pub fn replace(
        &mut self,
        row: usize,
        type_id: ComponentTypeId,
        value: StagedValue,
    ) -> Option<StagedValue> {
        let idx = self.column_index(type_id)?;
        Some(self.columns[idx].replace(row, value))
    }

    fn grow(&mut self, capacity: usize) {
        tracing::trace!(
            archetype = self.id.0,
            from = self.capacity,
            to = capacity,
            "growing archetype"
        );
        for column in &mut self.columns {
            column.grow(capacity);
        }
        self.entities.reserve_exact(capacity - self.entities.len());
        self.capacity = capacity;
    }

    /// Verify that every column has exactly one value per entity and that
    /// capacity covers the live rows.
    ///
    /// # Panics
    ///
    /// Panics with an invariant violation otherwise.
    pub fn check_invariants(&self) {
        let count = self.entities.len();
        if self.capacity < count {
            crate::invariant_violation(format_args!(
                "archetype {:?} holds {count} rows but capacity is {}",
                self.id, self.capacity
            ));
        }
        for (type_id, column) in self.component_types.iter().zip(&self.columns) {
            if column.len() != count {
                crate::invariant_violation(format_args!(
                    "archetype {:?} column {type_id:?} has {} rows, expected {count}",
                    self.id,
                    column.len()
                ));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
