//! Sub-prefab overrides.
//!
//! An embedded sub-prefab starts out identical to its source. Editing one of
//! its properties records an override: the `(object, property)` pair keeps
//! its local value across saves instead of following the source.
//!
//! - [`OverrideTable`]: the per-instance record of overridden properties
//! - [`OverrideEditor`]: add/remove, revert to the source, apply to the source
//! - [`TemplateCache`]: live copies of source prefabs that revert reads from
//!   and apply writes into
//!
//! # Example
//!
//! ```ignore
//! let mut cache = TemplateCache::new();
//! let mut editor = engine.overrides(&mut cache);
//! world.set_property(label, "text", Value::from("local"))?;
//! editor.track_changes(&mut world, &mut state);
//! editor.revert(&mut world, &mut state, label, &["text"])?;
//! ```

mod copy;
mod editor;

use std::collections::BTreeSet;

use indexmap::IndexMap;
use tessera_world::{ObjectId, World};

pub use editor::{OverrideEditor, TemplateCache};

/// Overridden property names per object of one sub-prefab instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideTable {
    entries: IndexMap<ObjectId, BTreeSet<String>>,
}

impl OverrideTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the pair was not tracked yet.
    pub fn add(&mut self, object: ObjectId, property: &str) -> bool {
        self.entries
            .entry(object)
            .or_default()
            .insert(property.to_string())
    }

    /// Removes one pair. The object's entry goes away with its last name.
    pub fn remove(&mut self, object: ObjectId, property: &str) -> bool {
        let Some(names) = self.entries.get_mut(&object) else {
            return false;
        };
        let removed = names.remove(property);
        if names.is_empty() {
            self.entries.shift_remove(&object);
        }
        removed
    }

    pub fn contains(&self, object: ObjectId, property: &str) -> bool {
        self.entries
            .get(&object)
            .is_some_and(|names| names.contains(property))
    }

    pub fn contains_object(&self, object: ObjectId) -> bool {
        self.entries.contains_key(&object)
    }

    /// Overridden names of `object`, sorted.
    pub fn names(&self, object: ObjectId) -> Vec<String> {
        self.entries
            .get(&object)
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Tracked objects in insertion order.
    pub fn objects(&self) -> Vec<ObjectId> {
        self.entries.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &BTreeSet<String>)> + '_ {
        self.entries.iter().map(|(object, names)| (*object, names))
    }

    /// Drops entries whose object no longer exists.
    pub fn prune(&mut self, world: &World) -> usize {
        let before = self.entries.len();
        self.entries.retain(|object, _| {
            let alive = world.is_alive(*object);
            if !alive {
                log::debug!("pruning overrides of dead {object}");
            }
            alive
        });
        before - self.entries.len()
    }

    /// Total number of tracked `(object, property)` pairs.
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
