use std::hash::{Hash, Hasher};

use bitflags::bitflags;

/// A generational handle to an object living in a [`World`](crate::World).
///
/// Layout: `u32 index` + `u64 spawn_tick`.
///
/// - **index**: slot index in the object allocator
/// - **spawn_tick**: world tick when this object was spawned. A recycled slot
///   gets a new tick, so stale handles never alias the new occupant.
///
/// Handles are process-local. Persisted data refers to objects through
/// stable ids assigned by the prefab layer, never through `ObjectId`.
#[derive(Clone, Copy, PartialOrd, Ord)]
pub struct ObjectId {
    index: u32,
    spawn_tick: u64,
}

impl ObjectId {
    pub(crate) fn new(index: u32, spawn_tick: u64) -> Self {
        Self { index, spawn_tick }
    }

    /// Returns the slot index of this object.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Returns the spawn tick of this object.
    pub fn spawn_tick(&self) -> u64 {
        self.spawn_tick
    }
}

impl PartialEq for ObjectId {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.spawn_tick == other.spawn_tick
    }
}

impl Eq for ObjectId {}

impl Hash for ObjectId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.spawn_tick.hash(state);
    }
}

impl std::fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Object({}@{})", self.index, self.spawn_tick)
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Object({}@{})", self.index, self.spawn_tick)
    }
}

bitflags! {
    /// Per-object state bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ObjectFlags: u32 {
        /// Never written to a prefab payload.
        const TRANSIENT = 1 << 0;
        /// Kept for editing, stripped from compact payloads.
        const EDITOR_ONLY = 1 << 1;
        /// Hidden in tooling views.
        const HIDDEN = 1 << 2;
        /// Locked against selection in tooling views.
        const LOCKED = 1 << 3;
        /// Created by the runtime from a class template rather than explicitly.
        const DEFAULT_SUBOBJECT = 1 << 4;
    }
}

impl ObjectFlags {
    /// Bits that survive a save/load cycle.
    pub const PERSISTENT: Self = Self::EDITOR_ONLY.union(Self::HIDDEN).union(Self::LOCKED);

    /// Returns only the persistent subset of these flags.
    pub fn persistent(self) -> Self {
        self & Self::PERSISTENT
    }
}

/// Allocates and recycles object slots with spawn-tick tracking.
///
/// When an object is despawned its slot goes to a free list. The next spawn
/// reuses the slot with a fresh tick, invalidating old handles.
pub(crate) struct ObjectAllocator {
    /// Spawn tick for each slot. Index = object index.
    spawn_ticks: Vec<u64>,
    /// Alive flag per slot.
    alive: Vec<bool>,
    /// Free list of recyclable indices (LIFO stack).
    free_list: Vec<u32>,
    /// Total number of currently alive objects.
    count: u32,
    /// Monotonic tick handed to every new object.
    tick: u64,
}

impl ObjectAllocator {
    pub fn new() -> Self {
        Self {
            spawn_ticks: Vec::new(),
            alive: Vec::new(),
            free_list: Vec::new(),
            count: 0,
            tick: 0,
        }
    }

    /// Allocates a new object handle, reusing a recycled slot if available.
    pub fn allocate(&mut self) -> ObjectId {
        self.count += 1;
        self.tick += 1;
        let tick = self.tick;

        if let Some(index) = self.free_list.pop() {
            let idx = index as usize;
            self.alive[idx] = true;
            self.spawn_ticks[idx] = tick;
            ObjectId::new(index, tick)
        } else {
            let index = self.spawn_ticks.len() as u32;
            self.spawn_ticks.push(tick);
            self.alive.push(true);
            ObjectId::new(index, tick)
        }
    }

    /// Releases a handle. Returns false if already dead or the tick mismatches.
    pub fn deallocate(&mut self, object: ObjectId) -> bool {
        if !self.is_alive(object) {
            return false;
        }
        let idx = object.index() as usize;
        self.alive[idx] = false;
        self.free_list.push(object.index());
        self.count -= 1;
        true
    }

    pub fn is_alive(&self, object: ObjectId) -> bool {
        let idx = object.index() as usize;
        idx < self.alive.len() && self.alive[idx] && self.spawn_ticks[idx] == object.spawn_tick()
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Iterates over all currently alive handles in slot order.
    pub fn iter_alive(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.alive
            .iter()
            .enumerate()
            .filter(|(_, alive)| **alive)
            .map(|(idx, _)| ObjectId::new(idx as u32, self.spawn_ticks[idx]))
    }
}

impl Default for ObjectAllocator {
    fn default() -> Self {
        Self::new()
    }
}
