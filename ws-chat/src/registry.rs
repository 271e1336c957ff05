//! Per-connection mapping from event kind to its listeners.

use std::{collections::HashMap, fmt, sync::Arc};

use crate::envelope::{ChatEvent, EventKind};

/// Callback invoked for every event of the kind it is registered under.
///
/// Identity is the allocation: register and remove the same `Listener` clone.
pub type Listener = Arc<dyn Fn(&ChatEvent) -> anyhow::Result<()> + Send + Sync>;

/// Wraps a closure as a [`Listener`].
pub fn listener<F>(callback: F) -> Listener
where
    F: Fn(&ChatEvent) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(callback)
}

#[derive(Default)]
pub struct HandlerRegistry {
    slots: HashMap<EventKind, Vec<Listener>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `listener` unless it is already registered for `kind`.
    pub fn insert(&mut self, kind: EventKind, listener: &Listener) -> bool {
        let slot = self.slots.entry(kind).or_default();
        if slot.iter().any(|existing| Arc::ptr_eq(existing, listener)) {
            return false;
        }
        slot.push(Arc::clone(listener));
        true
    }

    pub fn remove(&mut self, kind: EventKind, listener: &Listener) -> bool {
        let Some(slot) = self.slots.get_mut(&kind) else {
            return false;
        };
        let before = slot.len();
        slot.retain(|existing| !Arc::ptr_eq(existing, listener));
        let removed = slot.len() != before;
        if slot.is_empty() {
            self.slots.remove(&kind);
        }
        removed
    }

    /// Listeners for `kind` in registration order, detached from later edits.
    pub fn snapshot(&self, kind: EventKind) -> Vec<Listener> {
        self.slots.get(&kind).cloned().unwrap_or_default()
    }

    pub fn len(&self, kind: EventKind) -> usize {
        self.slots.get(&kind).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for kind in EventKind::ALL {
            let count = self.len(kind);
            if count > 0 {
                map.entry(&kind.as_str(), &count);
            }
        }
        map.finish()
    }
}
