//! Persistence events.
//!
//! The [`EventBus`] is owned by a [`Database`](crate::Database). Listeners
//! register against a type name; dispatch walks the entity's lineage from
//! its own type up to the root and calls the listeners registered at each
//! level, so a listener on a base type sees every subtype.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::entity::Entity;
use crate::value::Document;

/// Persistence lifecycle points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// Before insert.
    PreAdd,
    /// After insert.
    PostAdd,
    /// Before update.
    PreUpdate,
    /// After update.
    PostUpdate,
    /// Before delete.
    PreDelete,
    /// After delete.
    PostDelete,
}

impl Event {
    /// Every event, in lifecycle order.
    pub const ALL: [Self; 6] = [
        Self::PreAdd,
        Self::PostAdd,
        Self::PreUpdate,
        Self::PostUpdate,
        Self::PreDelete,
        Self::PostDelete,
    ];

    /// Returns the snake-case event name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PreAdd => "pre_add",
            Self::PostAdd => "post_add",
            Self::PreUpdate => "pre_update",
            Self::PostUpdate => "post_update",
            Self::PreDelete => "pre_delete",
            Self::PostDelete => "post_delete",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callback receiving the entity, the event and, for `post_*` events, the
/// driver result.
pub type Listener = Arc<dyn Fn(&Entity, Event, Option<&Document>) + Send + Sync>;

/// Scoped event registry.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<FxHashMap<(Event, String), Vec<Listener>>>,
}

impl EventBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for `events` on `type_name` and its subtypes.
    pub fn listen<F>(&self, type_name: &str, events: &[Event], listener: F)
    where
        F: Fn(&Entity, Event, Option<&Document>) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        let mut map = self.listeners.write();
        for event in events {
            map.entry((*event, type_name.to_string()))
                .or_default()
                .push(Arc::clone(&listener));
        }
    }

    /// Number of listeners registered directly on `type_name` for `event`.
    #[must_use]
    pub fn listener_count(&self, type_name: &str, event: Event) -> usize {
        self.listeners
            .read()
            .get(&(event, type_name.to_string()))
            .map_or(0, Vec::len)
    }

    /// Removes every listener.
    pub fn clear(&self) {
        self.listeners.write().clear();
    }

    /// Calls the listeners for `event` along the entity's lineage, most
    /// derived type first.
    pub fn dispatch(&self, entity: &Entity, event: Event, result: Option<&Document>) {
        // The lock is released before any listener runs.
        let matched: Vec<Listener> = {
            let map = self.listeners.read();
            entity
                .entity_type()
                .lineage()
                .filter_map(|name| map.get(&(event, name.to_string())))
                .flatten()
                .cloned()
                .collect()
        };
        if !matched.is_empty() {
            tracing::trace!(%event, entity = %entity, listeners = matched.len(), "dispatching event");
        }
        for listener in matched {
            listener(entity, event, result);
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("registrations", &self.listeners.read().len())
            .finish()
    }
}
