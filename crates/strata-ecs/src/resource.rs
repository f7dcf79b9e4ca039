//! Type-keyed singleton storage.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use crate::EcsError;

/// Holds at most one value per Rust type.
#[derive(Debug, Default)]
pub struct ResourceStore {
    values: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl ResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `value`, returning the instance it replaced.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.values
            .insert(TypeId::of::<T>(), Box::new(value))
            .map(unbox::<T>)
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Result<&T, EcsError> {
        self.try_get::<T>().ok_or(EcsError::MissingResource {
            resource: std::any::type_name::<T>(),
        })
    }

    pub fn get_mut<T: Send + Sync + 'static>(&mut self) -> Result<&mut T, EcsError> {
        self.values
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut::<T>())
            .ok_or(EcsError::MissingResource {
                resource: std::any::type_name::<T>(),
            })
    }

    pub fn try_get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Overwrite an existing resource, returning the previous value.
    ///
    /// Fails with [`EcsError::UnregisteredResource`] if there is none, which
    /// keeps "first insertion" and "update" distinguishable.
    pub fn replace<T: Send + Sync + 'static>(&mut self, value: T) -> Result<T, EcsError> {
        match self.get_mut::<T>() {
            Ok(slot) => Ok(std::mem::replace(slot, value)),
            Err(_) => Err(EcsError::UnregisteredResource {
                resource: std::any::type_name::<T>(),
            }),
        }
    }

    pub fn remove<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.values.remove(&TypeId::of::<T>()).map(unbox::<T>)
    }

    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.values.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn unbox<T: 'static>(value: Box<dyn Any + Send + Sync>) -> T {
    match value.downcast::<T>() {
        Ok(value) => *value,
        Err(_) => crate::invariant_violation(format_args!(
            "resource slot does not hold a {}",
            std::any::type_name::<T>()
        )),
    }
}
