//! Component type registration, storage schemas and masks.
//!
//! Every component type is assigned a small [`ComponentTypeId`] and a matching
//! single-bit [`ComponentMask`] by the world's [`TypeRegistry`] the first time
//! it is used. Masks compose by bitwise OR; an archetype is identified by the
//! OR of all of its component types' masks.
//!
//! Components pick one of two storage representations through
//! [`Component::Storage`]:
//!
//! - [`Packed`]: plain-old-data records (`bytemuck::Pod`) that declare an
//!   explicit field schema via [`PackedComponent::FIELDS`]. They live in a
//!   dense byte column, one fixed-width stride per row, and can be viewed as a
//!   contiguous `&[T]` for bulk processing.
//! - [`Boxed`]: everything else. Values are owned by a per-archetype arena of
//!   boxed slots.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{BitAnd, BitOr};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::archetype::{Column, StagedValue};
use crate::EcsError;

/// Width of [`ComponentMask`] in bits, and therefore the hard upper bound on
/// the number of distinct component types a registry can hold.
pub const MAX_COMPONENT_TYPES: usize = 128;

// ---------------------------------------------------------------------------
// ComponentTypeId
// ---------------------------------------------------------------------------

/// Opaque, lightweight identifier for a registered component type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentTypeId(pub(crate) u32);

impl ComponentTypeId {
    /// Registration order of this type (0 for the first type registered).
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// The single-bit mask for this type.
    #[inline]
    pub fn mask(self) -> ComponentMask {
        ComponentMask(1u128 << self.0)
    }
}

impl fmt::Debug for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentTypeId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// ComponentMask
// ---------------------------------------------------------------------------

/// A bit set of component types, one bit per registered type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ComponentMask(u128);

impl ComponentMask {
    /// The mask of the empty component set.
    pub const EMPTY: ComponentMask = ComponentMask(0);

    #[inline]
    pub fn from_bits(bits: u128) -> Self {
        Self(bits)
    }

    #[inline]
    pub fn bits(self) -> u128 {
        self.0
    }

    /// `self | other`.
    #[inline]
    pub fn union(self, other: ComponentMask) -> Self {
        Self(self.0 | other.0)
    }

    /// `self & !other`.
    #[inline]
    pub fn difference(self, other: ComponentMask) -> Self {
        Self(self.0 & !other.0)
    }

    /// Whether every type in `other` is also in `self`.
    #[inline]
    pub fn contains(self, other: ComponentMask) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn contains_type(self, id: ComponentTypeId) -> bool {
        self.contains(id.mask())
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of component types in the set.
    #[inline]
    pub fn count(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Iterate the component types in the set in ascending id order.
    pub fn iter(self) -> impl Iterator<Item = ComponentTypeId> {
        let mut bits = self.0;
        std::iter::from_fn(move || {
            if bits == 0 {
                return None;
            }
            let index = bits.trailing_zeros();
            bits &= bits - 1;
            Some(ComponentTypeId(index))
        })
    }
}

impl BitOr for ComponentMask {
    type Output = ComponentMask;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

impl BitAnd for ComponentMask {
    type Output = ComponentMask;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Debug for ComponentMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentMask({:#b})", self.0)
    }
}

// ---------------------------------------------------------------------------
// Packed schema descriptors
// ---------------------------------------------------------------------------

/// Primitive slot type of a packed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Primitive {
    U8,
    I32,
    U32,
    F32,
    I64,
    U64,
    F64,
}

impl Primitive {
    /// Size of one slot in bytes.
    pub const fn size(self) -> usize {
        match self {
            Primitive::U8 => 1,
            Primitive::I32 | Primitive::U32 | Primitive::F32 => 4,
            Primitive::I64 | Primitive::U64 | Primitive::F64 => 8,
        }
    }
}

/// Declared layout of one field of a packed component: a name, a primitive
/// slot type and a vector arity (1 for scalars).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDesc {
    pub name: &'static str,
    pub primitive: Primitive,
    pub arity: usize,
}

impl FieldDesc {
    pub const fn scalar(name: &'static str, primitive: Primitive) -> Self {
        Self {
            name,
            primitive,
            arity: 1,
        }
    }

    pub const fn vector(name: &'static str, primitive: Primitive, arity: usize) -> Self {
        Self {
            name,
            primitive,
            arity,
        }
    }

    /// Width of the field in bytes.
    pub const fn width(&self) -> usize {
        self.primitive.size() * self.arity
    }
}

/// A [`FieldDesc`] resolved to its byte offset within the component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    pub name: &'static str,
    pub primitive: Primitive,
    pub arity: usize,
    /// Byte offset from the start of the component.
    pub offset: usize,
}

impl FieldLayout {
    pub fn width(&self) -> usize {
        self.primitive.size() * self.arity
    }
}

/// Validated storage layout of a packed component type.
///
/// Field offsets are computed once, at registration, from the declared
/// [`FieldDesc`] list in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedLayout {
    pub type_name: &'static str,
    /// `size_of::<T>()`, the stride of one row in the column.
    pub size: usize,
    pub align: usize,
    pub fields: Vec<FieldLayout>,
}

impl PackedLayout {
    /// Build and validate the layout of `T`.
    ///
    /// The declared fields must tile the type exactly: their widths must sum
    /// to `size_of::<T>()`, names must be unique, and no field may be empty.
    pub fn of<T: PackedComponent>() -> Result<Self, EcsError> {
        let type_name = std::any::type_name::<T>();
        let size = std::mem::size_of::<T>();
        let align = std::mem::align_of::<T>();
        let invalid = |reason: String| EcsError::InvalidPackedLayout {
            component: type_name,
            reason,
        };

        if size == 0 {
            return Err(invalid(
                "zero-sized types cannot be packed; use boxed storage for tags".to_owned(),
            ));
        }
        if align > std::mem::align_of::<u128>() {
            return Err(invalid(format!(
                "alignment {align} exceeds the column alignment of {}",
                std::mem::align_of::<u128>()
            )));
        }

        let mut fields = Vec::with_capacity(T::FIELDS.len());
        let mut offset = 0;
        for desc in T::FIELDS {
            if desc.arity == 0 {
                return Err(invalid(format!("field '{}' has arity 0", desc.name)));
            }
            if fields.iter().any(|f: &FieldLayout| f.name == desc.name) {
                return Err(invalid(format!("field '{}' is declared twice", desc.name)));
            }
            fields.push(FieldLayout {
                name: desc.name,
                primitive: desc.primitive,
                arity: desc.arity,
                offset,
            });
            offset += desc.width();
        }

        if offset != size {
            return Err(invalid(format!(
                "declared fields cover {offset} bytes but the type is {size} bytes"
            )));
        }

        Ok(Self {
            type_name,
            size,
            align,
            fields,
        })
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldLayout> {
        self.fields.iter().find(|f| f.name == name)
    }
}

// ---------------------------------------------------------------------------
// Component traits
// ---------------------------------------------------------------------------

/// A type that can be attached to entities.
///
/// ```
/// use strata_ecs::prelude::*;
///
/// #[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
/// #[repr(C)]
/// struct Position { x: f32, y: f32 }
///
/// impl Component for Position {
///     type Storage = Packed;
/// }
///
/// impl PackedComponent for Position {
///     const FIELDS: &'static [FieldDesc] = &[
///         FieldDesc::scalar("x", Primitive::F32),
///         FieldDesc::scalar("y", Primitive::F32),
///     ];
/// }
///
/// #[derive(Debug, PartialEq)]
/// struct Name(String);
///
/// impl Component for Name {
///     type Storage = Boxed;
/// }
/// ```
pub trait Component: Send + Sync + Sized + 'static {
    /// How the component is laid out inside an archetype.
    type Storage: Storage<Self>;
}

/// A fixed-layout numeric component stored in a dense packed column.
pub trait PackedComponent: Component + bytemuck::Pod {
    /// Explicit field schema, in memory order.
    ///
    /// Entries must follow the `#[repr(C)]` declaration order of the struct.
    /// Registration only checks that the widths add up to the type's size,
    /// so swapping two fields of equal width goes unnoticed and per-field
    /// reads return the neighbour's bytes.
    const FIELDS: &'static [FieldDesc];
}

/// Storage marker for [`PackedComponent`]s.
#[derive(Debug, Clone, Copy)]
pub struct Packed;

/// Storage marker for components held as individually boxed values.
#[derive(Debug, Clone, Copy)]
pub struct Boxed;

/// Column kind recorded at registration and used to build archetype columns.
#[derive(Debug, Clone)]
pub enum ColumnKind {
    Packed(Arc<PackedLayout>),
    Boxed,
}

/// Per-representation access to archetype columns.
///
/// Implemented by the [`Packed`] and [`Boxed`] markers; user code selects one
/// through [`Component::Storage`] and never calls these directly.
pub trait Storage<T: Component>: 'static {
    /// Read-only view of the `[0, count)` rows of a column.
    type Slice<'a>;
    /// Mutable view of the `[0, count)` rows of a column.
    type SliceMut<'a>;

    fn column_kind() -> Result<ColumnKind, EcsError>;
    fn stage(value: T) -> StagedValue;
    fn get(column: &Column, row: usize) -> Option<&T>;
    fn get_mut(column: &mut Column, row: usize) -> Option<&mut T>;
    fn slice(column: &Column, count: usize) -> Self::Slice<'_>;
    fn slice_mut(column: &mut Column, count: usize) -> Self::SliceMut<'_>;
}

impl<T: PackedComponent> Storage<T> for Packed {
    type Slice<'a> = &'a [T];
    type SliceMut<'a> = &'a mut [T];

    fn column_kind() -> Result<ColumnKind, EcsError> {
        Ok(ColumnKind::Packed(Arc::new(PackedLayout::of::<T>()?)))
    }

    fn stage(value: T) -> StagedValue {
        StagedValue::Packed(bytemuck::bytes_of(&value).to_vec())
    }

    fn get(column: &Column, row: usize) -> Option<&T> {
        let bytes = column.as_packed()?.row_bytes(row)?;
        Some(bytemuck::from_bytes(bytes))
    }

    fn get_mut(column: &mut Column, row: usize) -> Option<&mut T> {
        let bytes = column.as_packed_mut()?.row_bytes_mut(row)?;
        Some(bytemuck::from_bytes_mut(bytes))
    }

    fn slice(column: &Column, count: usize) -> &[T] {
        match column.as_packed() {
            Some(packed) => bytemuck::cast_slice(&packed.bytes()[..count * packed.stride()]),
            None => crate::invariant_violation(format_args!(
                "packed component {} stored in a boxed column",
                std::any::type_name::<T>()
            )),
        }
    }

    fn slice_mut(column: &mut Column, count: usize) -> &mut [T] {
        match column.as_packed_mut() {
            Some(packed) => {
                let stride = packed.stride();
                bytemuck::cast_slice_mut(&mut packed.bytes_mut()[..count * stride])
            }
            None => crate::invariant_violation(format_args!(
                "packed component {} stored in a boxed column",
                std::any::type_name::<T>()
            )),
        }
    }
}

impl<T: Component> Storage<T> for Boxed {
    type Slice<'a> = BoxedSlice<'a, T>;
    type SliceMut<'a> = BoxedSliceMut<'a, T>;

    fn column_kind() -> Result<ColumnKind, EcsError> {
        Ok(ColumnKind::Boxed)
    }

    fn stage(value: T) -> StagedValue {
        StagedValue::Boxed(Box::new(value))
    }

    fn get(column: &Column, row: usize) -> Option<&T> {
        column.as_boxed()?.get(row)?.downcast_ref::<T>()
    }

    fn get_mut(column: &mut Column, row: usize) -> Option<&mut T> {
        column.as_boxed_mut()?.get_mut(row)?.downcast_mut::<T>()
    }

    fn slice(column: &Column, count: usize) -> BoxedSlice<'_, T> {
        match column.as_boxed() {
            Some(boxed) => BoxedSlice {
                values: &boxed.values()[..count],
                _marker: PhantomData,
            },
            None => crate::invariant_violation(format_args!(
                "boxed component {} stored in a packed column",
                std::any::type_name::<T>()
            )),
        }
    }

    fn slice_mut(column: &mut Column, count: usize) -> BoxedSliceMut<'_, T> {
        match column.as_boxed_mut() {
            Some(boxed) => BoxedSliceMut {
                values: &mut boxed.values_mut()[..count],
                _marker: PhantomData,
            },
            None => crate::invariant_violation(format_args!(
                "boxed component {} stored in a packed column",
                std::any::type_name::<T>()
            )),
        }
    }
}

type BoxedValue = Box<dyn Any + Send + Sync>;

fn downcast_slot<T: 'static>(value: &BoxedValue) -> &T {
    match value.downcast_ref::<T>() {
        Some(v) => v,
        None => crate::invariant_violation(format_args!(
            "boxed slot does not hold a {}",
            std::any::type_name::<T>()
        )),
    }
}

fn downcast_slot_mut<T: 'static>(value: &mut BoxedValue) -> &mut T {
    match value.downcast_mut::<T>() {
        Some(v) => v,
        None => crate::invariant_violation(format_args!(
            "boxed slot does not hold a {}",
            std::any::type_name::<T>()
        )),
    }
}

/// Read-only view over the boxed arena of one archetype column.
pub struct BoxedSlice<'a, T> {
    values: &'a [BoxedValue],
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T: 'static> BoxedSlice<'a, T> {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, row: usize) -> Option<&'a T> {
        let values: &'a [BoxedValue] = self.values;
        values.get(row).map(downcast_slot::<T>)
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a T> + 'a {
        let values: &'a [BoxedValue] = self.values;
        values.iter().map(downcast_slot::<T>)
    }
}

impl<T> fmt::Debug for BoxedSlice<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxedSlice")
            .field("len", &self.values.len())
            .finish()
    }
}

/// Mutable view over the boxed arena of one archetype column.
pub struct BoxedSliceMut<'a, T> {
    values: &'a mut [BoxedValue],
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> BoxedSliceMut<'_, T> {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, row: usize) -> Option<&T> {
        self.values.get(row).map(downcast_slot::<T>)
    }

    pub fn get_mut(&mut self, row: usize) -> Option<&mut T> {
        self.values.get_mut(row).map(downcast_slot_mut::<T>)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.values.iter().map(downcast_slot::<T>)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> + '_ {
        self.values.iter_mut().map(downcast_slot_mut::<T>)
    }
}

impl<T> fmt::Debug for BoxedSliceMut<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxedSliceMut")
            .field("len", &self.values.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ComponentInfo
// ---------------------------------------------------------------------------

/// Metadata about a registered component type.
#[derive(Debug, Clone)]
pub struct ComponentInfo {
    /// Unique ID assigned at registration time.
    pub id: ComponentTypeId,
    /// `std::any::type_name::<T>()`.
    pub name: &'static str,
    /// Single-bit mask, `1 << id`.
    pub mask: ComponentMask,
    /// Column representation for this type.
    pub kind: ColumnKind,
    /// Rust `TypeId` for runtime type checking.
    pub type_id: TypeId,
}

// ---------------------------------------------------------------------------
// TypeRegistry
// ---------------------------------------------------------------------------

/// Assigns ids and mask bits to component types on first use.
///
/// Registration is idempotent: registering a type again returns the id it
/// already has. There is no un-registration; the n-th distinct type always
/// keeps bit `1 << n`.
#[derive(Debug)]
pub struct TypeRegistry {
    /// TypeId -> ComponentTypeId for dedup.
    by_type: HashMap<TypeId, ComponentTypeId>,
    /// Indexed by ComponentTypeId.0.
    infos: Vec<ComponentInfo>,
    max_types: usize,
}

impl TypeRegistry {
    /// Create an empty registry accepting at most `max_types` types (clamped
    /// to [`MAX_COMPONENT_TYPES`]).
    pub fn new(max_types: usize) -> Self {
        Self {
            by_type: HashMap::new(),
            infos: Vec::new(),
            max_types: max_types.min(MAX_COMPONENT_TYPES),
        }
    }

    /// Register `T`, or return its existing id.
    ///
    /// # Errors
    ///
    /// [`EcsError::TooManyComponentTypes`] once the registry is full, and
    /// [`EcsError::InvalidPackedLayout`] if a packed type's field schema does
    /// not describe its memory layout.
    pub fn register<T: Component>(&mut self) -> Result<ComponentTypeId, EcsError> {
        let rust_type_id = TypeId::of::<T>();
        if let Some(&existing) = self.by_type.get(&rust_type_id) {
            return Ok(existing);
        }

        let name = std::any::type_name::<T>();
        if self.infos.len() >= self.max_types {
            return Err(EcsError::TooManyComponentTypes {
                component: name,
                limit: self.max_types,
            });
        }
        let kind = <T::Storage as Storage<T>>::column_kind()?;

        let id = ComponentTypeId(self.infos.len() as u32);
        self.infos.push(ComponentInfo {
            id,
            name,
            mask: id.mask(),
            kind,
            type_id: rust_type_id,
        });
        self.by_type.insert(rust_type_id, id);
        tracing::debug!(component = name, id = id.0, "registered component type");
        Ok(id)
    }

    /// Look up a component type by its Rust `TypeId`.
    pub fn lookup<T: 'static>(&self) -> Option<ComponentTypeId> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    /// The mask bit of `T`, if it has been registered.
    pub fn mask_of<T: 'static>(&self) -> Option<ComponentMask> {
        self.lookup::<T>().map(ComponentTypeId::mask)
    }

    /// OR of the masks of `ids`.
    pub fn mask_of_set(&self, ids: &[ComponentTypeId]) -> ComponentMask {
        ids.iter()
            .fold(ComponentMask::EMPTY, |acc, id| acc.union(id.mask()))
    }

    /// Get the [`ComponentInfo`] for a registered component type ID.
    pub fn info(&self, id: ComponentTypeId) -> Option<&ComponentInfo> {
        self.infos.get(id.index())
    }

    /// Total number of registered component types.
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Whether any component types have been registered.
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Maximum number of types this registry accepts.
    pub fn capacity(&self) -> usize {
        self.max_types
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new(MAX_COMPONENT_TYPES)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    #[repr(C)]
    struct Pos {
        x: f32,
        y: f32,
    }

    impl Component for Pos {
        type Storage = Packed;
    }

    impl PackedComponent for Pos {
        const FIELDS: &'static [FieldDesc] = &[
            FieldDesc::scalar("x", Primitive::F32),
            FieldDesc::scalar("y", Primitive::F32),
        ];
    }

    #[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    #[repr(C)]
    struct Transform {
        pos: [f64; 3],
        scale: [f64; 3],
        layer: u64,
    }

    impl Component for Transform {
        type Storage = Packed;
    }

    impl PackedComponent for Transform {
        const FIELDS: &'static [FieldDesc] = &[
            FieldDesc::vector("pos", Primitive::F64, 3),
            FieldDesc::vector("scale", Primitive::F64, 3),
            FieldDesc::scalar("layer", Primitive::U64),
        ];
    }

    // Declares one field too few.
    #[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    #[repr(C)]
    struct Truncated {
        a: f32,
        b: f32,
    }

    impl Component for Truncated {
        type Storage = Packed;
    }

    impl PackedComponent for Truncated {
        const FIELDS: &'static [FieldDesc] = &[FieldDesc::scalar("a", Primitive::F32)];
    }

    #[derive(Debug)]
    struct Label(String);

    impl Component for Label {
        type Storage = Boxed;
    }

    #[test]
    fn register_is_idempotent() {
        let mut reg = TypeRegistry::default();
        let id1 = reg.register::<Pos>().unwrap();
        let id2 = reg.register::<Pos>().unwrap();
        assert_eq!(id1, id2);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.lookup::<Pos>(), Some(id1));
    }

    #[test]
    fn nth_type_gets_nth_bit() {
        let mut reg = TypeRegistry::default();
        let p = reg.register::<Pos>().unwrap();
        let l = reg.register::<Label>().unwrap();
        let t = reg.register::<Transform>().unwrap();
        assert_eq!(p.mask().bits(), 1);
        assert_eq!(l.mask().bits(), 1 << 1);
        assert_eq!(t.mask().bits(), 1 << 2);
        assert_eq!(reg.mask_of_set(&[p, t]).bits(), 0b101);
    }

    #[test]
    fn masks_are_disjoint_and_compose() {
        let mut reg = TypeRegistry::default();
        let p = reg.register::<Pos>().unwrap().mask();
        let l = reg.register::<Label>().unwrap().mask();
        assert!((p & l).is_empty());
        let both = p | l;
        assert!(both.contains(p));
        assert!(both.contains(l));
        assert_eq!(both.count(), 2);
        assert_eq!(both.difference(l), p);
    }

    #[test]
    fn mask_iter_yields_ascending_ids() {
        let mask = ComponentMask::from_bits(0b1010_0001);
        let ids: Vec<usize> = mask.iter().map(ComponentTypeId::index).collect();
        assert_eq!(ids, vec![0, 5, 7]);
    }

    #[test]
    fn packed_layout_offsets() {
        let layout = PackedLayout::of::<Transform>().unwrap();
        assert_eq!(layout.size, 56);
        let scale = layout.field("scale").unwrap();
        assert_eq!(scale.offset, 24);
        assert_eq!(scale.arity, 3);
        assert_eq!(layout.field("layer").unwrap().offset, 48);
        assert!(layout.field("vel").is_none());
    }

    #[test]
    fn packed_layout_rejects_incomplete_schema() {
        let mut reg = TypeRegistry::default();
        let err = reg.register::<Truncated>().unwrap_err();
        assert!(matches!(err, EcsError::InvalidPackedLayout { .. }));
        // A failed registration does not consume a slot.
        assert!(reg.is_empty());
    }

    #[test]
    fn registry_overflow_fails_loudly() {
        let mut reg = TypeRegistry::new(2);
        reg.register::<Pos>().unwrap();
        reg.register::<Label>().unwrap();
        let err = reg.register::<Transform>().unwrap_err();
        assert!(matches!(
            err,
            EcsError::TooManyComponentTypes { limit: 2, .. }
        ));
        // Already-registered types still resolve.
        assert!(reg.register::<Pos>().is_ok());
    }

    #[test]
    fn info_correctness() {
        let mut reg = TypeRegistry::default();
        let id = reg.register::<Label>().unwrap();
        let info = reg.info(id).unwrap();
        assert_eq!(info.id, id);
        assert_eq!(info.mask, id.mask());
        assert_eq!(info.type_id, TypeId::of::<Label>());
        assert!(matches!(info.kind, ColumnKind::Boxed));
    }
}
