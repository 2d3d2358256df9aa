use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A 128-bit identifier naming one object inside a saved graph.
///
/// Payloads refer to objects only through stable ids, so a payload is
/// self-contained and independent of the process that wrote it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StableId(Uuid);

impl StableId {
    /// The all-zero id. Never assigned to an object.
    pub const NIL: Self = Self(Uuid::nil());

    /// A fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// A deterministic id for `id` scoped under `namespace`.
    ///
    /// Used to give sub-graph objects a parent-space id that stays the same
    /// across reloads even when no remap entry was recorded for them.
    pub fn derive(namespace: StableId, id: StableId) -> Self {
        Self(Uuid::new_v5(&namespace.0, id.0.as_bytes()))
    }

    pub const fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    pub fn as_u128(&self) -> u128 {
        self.0.as_u128()
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl std::fmt::Debug for StableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StableId({})", self.0.simple())
    }
}

impl std::fmt::Display for StableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}
