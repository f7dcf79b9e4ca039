//! Per-type event queues.
//!
//! Events accumulate in emission order until drained. [`EventQueue::drain`]
//! hands the whole batch to one consumer and leaves the queue empty;
//! [`EventQueue::peek`] lets additional readers observe the same batch first.

use std::any::{Any, TypeId};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct EventQueue {
    /// Each value is a `Vec<E>` for the `E` its key names.
    queues: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit<E: Send + Sync + 'static>(&mut self, event: E) {
        let queue = self
            .queues
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Box::new(Vec::<E>::new()));
        match queue.downcast_mut::<Vec<E>>() {
            Some(queue) => queue.push(event),
            None => crate::invariant_violation(format_args!(
                "event queue for {} holds the wrong type",
                std::any::type_name::<E>()
            )),
        }
    }

    /// Take every pending `E`, oldest first.
    pub fn drain<E: Send + Sync + 'static>(&mut self) -> Vec<E> {
        self.queues
            .get_mut(&TypeId::of::<E>())
            .and_then(|queue| queue.downcast_mut::<Vec<E>>())
            .map(std::mem::take)
            .unwrap_or_default()
    }

    pub fn peek<E: Send + Sync + 'static>(&self) -> &[E] {
        self.queues
            .get(&TypeId::of::<E>())
            .and_then(|queue| queue.downcast_ref::<Vec<E>>())
            .map_or(&[], Vec::as_slice)
    }

    pub fn pending<E: Send + Sync + 'static>(&self) -> usize {
        self.peek::<E>().len()
    }

    /// Drop all pending events of every type.
    pub fn clear(&mut self) {
        self.queues.clear();
    }
}
