//! Deferred structural changes handed over from other threads.
//!
//! Structural mutation of a [`World`] happens on one logical thread. Worker
//! threads that produce entities or components (content loaders, network
//! handlers) instead push [`Command`]s through a cloneable [`CommandSender`].
//! The owner of the world drains the [`CommandQueue`] once per step with
//! [`World::apply_commands`], before any query runs.
//!
//! Commands are applied in FIFO order. A failing command is logged and
//! counted in the [`ApplyReport`]; it never aborts the drain.
//!
//! # Example
//!
//! ```
//! use strata_ecs::prelude::*;
//!
//! #[derive(Debug, PartialEq)]
//! struct Label(String);
//! impl Component for Label { type Storage = Boxed; }
//!
//! let mut world = World::new();
//! let queue = CommandQueue::new();
//! let sender = queue.sender();
//!
//! std::thread::spawn(move || {
//!     sender.create_entity((Label("loaded".to_owned()),)).unwrap();
//! })
//! .join()
//! .unwrap();
//!
//! let report = world.apply_commands(&queue);
//! assert_eq!(report.success_count, 1);
//! let entity = report.created[0];
//! assert_eq!(world.component::<Label>(entity).unwrap(), Some(&Label("loaded".to_owned())));
//! ```

use crossbeam_channel::{Receiver, Sender};
use tracing::warn;

use crate::component::Component;
use crate::entity::EntityId;
use crate::world::{ComponentBundle, World};
use crate::EcsError;

type DeferredFn = Box<dyn FnOnce(&mut World) -> Result<(), EcsError> + Send>;

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// A single deferred mutation.
pub enum Command {
    /// Create a new entity; the id is reported in [`ApplyReport::created`].
    Create(ComponentBundle),
    /// Create or extend the entity with a caller-chosen id.
    Upsert {
        entity: EntityId,
        components: ComponentBundle,
    },
    Delete(EntityId),
    /// Any other world operation. `label` names it in logs.
    Apply {
        label: &'static str,
        op: DeferredFn,
    },
}

impl Command {
    fn label(&self) -> &'static str {
        match self {
            Command::Create(_) => "create_entity",
            Command::Upsert { .. } => "add_entity",
            Command::Delete(_) => "delete_entity",
            Command::Apply { label, .. } => *label,
        }
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Create(components) => f.debug_tuple("Create").field(components).finish(),
            Command::Upsert { entity, components } => f
                .debug_struct("Upsert")
                .field("entity", entity)
                .field("components", components)
                .finish(),
            Command::Delete(entity) => f.debug_tuple("Delete").field(entity).finish(),
            Command::Apply { label, .. } => f.debug_struct("Apply").field("label", label).finish(),
        }
    }
}

// ---------------------------------------------------------------------------
// ApplyReport
// ---------------------------------------------------------------------------

/// Summary of one [`World::apply_commands`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Number of commands that applied successfully.
    pub success_count: usize,
    /// Number of commands that failed to apply.
    pub failed_count: usize,
    /// Ids of entities created by [`Command::Create`], in application order.
    pub created: Vec<EntityId>,
}

// ---------------------------------------------------------------------------
// CommandQueue / CommandSender
// ---------------------------------------------------------------------------

/// Receiving end of the hand-off boundary, owned next to the world.
#[derive(Debug)]
pub struct CommandQueue {
    sender: Sender<Command>,
    receiver: Receiver<Command>,
}

impl CommandQueue {
    /// Create an unbounded queue.
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self { sender, receiver }
    }

    /// A new handle for producers. Handles can be cloned freely and moved to
    /// other threads.
    pub fn sender(&self) -> CommandSender {
        CommandSender {
            sender: self.sender.clone(),
        }
    }

    /// Number of commands waiting to be applied.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer handle for a [`CommandQueue`].
///
/// Every method fails with [`EcsError::CommandQueueClosed`] once the queue
/// has been dropped.
#[derive(Debug, Clone)]
pub struct CommandSender {
    sender: Sender<Command>,
}

impl CommandSender {
    pub fn send(&self, command: Command) -> Result<(), EcsError> {
        self.sender
            .send(command)
            .map_err(|_| EcsError::CommandQueueClosed)
    }

    pub fn create_entity(&self, components: impl Into<ComponentBundle>) -> Result<(), EcsError> {
        self.send(Command::Create(components.into()))
    }

    pub fn add_entity(
        &self,
        entity: EntityId,
        components: impl Into<ComponentBundle>,
    ) -> Result<(), EcsError> {
        self.send(Command::Upsert {
            entity,
            components: components.into(),
        })
    }

    pub fn delete_entity(&self, entity: EntityId) -> Result<(), EcsError> {
        self.send(Command::Delete(entity))
    }

    pub fn add_component<T: Component>(&self, entity: EntityId, value: T) -> Result<(), EcsError> {
        self.send(Command::Apply {
            label: "add_component",
            op: Box::new(move |world| world.add_component(entity, value)),
        })
    }

    pub fn remove_component<T: Component>(&self, entity: EntityId) -> Result<(), EcsError> {
        self.send(Command::Apply {
            label: "remove_component",
            op: Box::new(move |world| world.remove_component::<T>(entity)),
        })
    }

    pub fn emit_event<E: Send + Sync + 'static>(&self, event: E) -> Result<(), EcsError> {
        self.send(Command::Apply {
            label: "emit_event",
            op: Box::new(move |world| {
                world.emit_event(event);
                Ok(())
            }),
        })
    }

    pub fn add_resource<T: Send + Sync + 'static>(&self, value: T) -> Result<(), EcsError> {
        self.send(Command::Apply {
            label: "add_resource",
            op: Box::new(move |world| {
                world.add_resource(value);
                Ok(())
            }),
        })
    }
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

impl World {
    /// Apply every command currently pending in `queue`, oldest first.
    ///
    /// Commands sent while the drain is running may or may not be included;
    /// they are never lost.
    pub fn apply_commands(&mut self, queue: &CommandQueue) -> ApplyReport {
        let mut report = ApplyReport::default();
        for (index, command) in queue.receiver.try_iter().enumerate() {
            let label = command.label();
            let result = match command {
                Command::Create(components) => self.create_entity(components).map(|entity| {
                    report.created.push(entity);
                }),
                Command::Upsert { entity, components } => self.add_entity(entity, components),
                Command::Delete(entity) => self.delete_entity(entity),
                Command::Apply { op, .. } => op(self),
            };
            match result {
                Ok(()) => report.success_count += 1,
                Err(e) => {
                    report.failed_count += 1;
                    warn!(
                        command_index = index,
                        command = label,
                        error = %e,
                        "deferred command failed"
                    );
                }
            }
        }
        report
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
