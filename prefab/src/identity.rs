//! Stable-id bookkeeping.
//!
//! - [`IdentityMap`]: session-scoped, bidirectional `StableId <-> ObjectId`.
//! - [`RemapTable`]: translation between a parent graph's ids and the ids an
//!   embedded sub-graph uses internally.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tessera_world::{ObjectId, World};

use crate::id::StableId;

/// Bidirectional mapping between stable ids and live objects.
///
/// Iteration follows insertion order, which keeps anything derived from the
/// map deterministic.
#[derive(Debug, Clone, Default)]
pub struct IdentityMap {
    objects: IndexMap<StableId, ObjectId>,
    ids: HashMap<ObjectId, StableId>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `id` to `object`, replacing any previous pairing of either side.
    pub fn insert(&mut self, id: StableId, object: ObjectId) {
        if let Some(previous) = self.ids.insert(object, id)
            && previous != id
        {
            self.objects.shift_remove(&previous);
        }
        if let Some(previous) = self.objects.insert(id, object)
            && previous != object
        {
            self.ids.remove(&previous);
        }
    }

    pub fn object(&self, id: StableId) -> Option<ObjectId> {
        self.objects.get(&id).copied()
    }

    pub fn id_of(&self, object: ObjectId) -> Option<StableId> {
        self.ids.get(&object).copied()
    }

    pub fn contains_object(&self, object: ObjectId) -> bool {
        self.ids.contains_key(&object)
    }

    pub fn remove_object(&mut self, object: ObjectId) -> Option<StableId> {
        let id = self.ids.remove(&object)?;
        self.objects.shift_remove(&id);
        Some(id)
    }

    /// Drops every pairing whose object is no longer alive in `world`.
    ///
    /// Returns how many pairings were dropped.
    pub fn retain_alive(&mut self, world: &World) -> usize {
        let before = self.objects.len();
        self.objects.retain(|_, object| world.is_alive(*object));
        self.ids.retain(|object, _| world.is_alive(*object));
        before - self.objects.len()
    }

    /// `(id, object)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (StableId, ObjectId)> + '_ {
        self.objects.iter().map(|(id, object)| (*id, *object))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Pairs of `(parent id, sub-graph id)` for one embedded sub-graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<(StableId, StableId)>", into = "Vec<(StableId, StableId)>")]
pub struct RemapTable {
    to_sub: IndexMap<StableId, StableId>,
    to_parent: HashMap<StableId, StableId>,
}

impl RemapTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, parent: StableId, sub: StableId) {
        if let Some(previous) = self.to_parent.insert(sub, parent)
            && previous != parent
        {
            self.to_sub.shift_remove(&previous);
        }
        if let Some(previous) = self.to_sub.insert(parent, sub)
            && previous != sub
        {
            self.to_parent.remove(&previous);
        }
    }

    /// The parent-space id of sub-graph id `sub`.
    pub fn parent_of(&self, sub: StableId) -> Option<StableId> {
        self.to_parent.get(&sub).copied()
    }

    /// The sub-graph id of parent-space id `parent`.
    pub fn sub_of(&self, parent: StableId) -> Option<StableId> {
        self.to_sub.get(&parent).copied()
    }

    /// `(parent, sub)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (StableId, StableId)> + '_ {
        self.to_sub.iter().map(|(parent, sub)| (*parent, *sub))
    }

    pub fn len(&self) -> usize {
        self.to_sub.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_sub.is_empty()
    }
}

impl From<Vec<(StableId, StableId)>> for RemapTable {
    fn from(pairs: Vec<(StableId, StableId)>) -> Self {
        let mut table = Self::new();
        for (parent, sub) in pairs {
            table.insert(parent, sub);
        }
        table
    }
}

impl From<RemapTable> for Vec<(StableId, StableId)> {
    fn from(table: RemapTable) -> Self {
        table.to_sub.into_iter().collect()
    }
}
