//! Shared asset handles.
//!
//! An [`AssetRef`] points at data living outside any [`World`](crate::World):
//! textures, fonts, or whole prefab assets. Equality and hashing follow the
//! handle's identity, never the payload contents, so two handles are equal
//! only when they point at the same allocation.

use std::any::Any;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

struct AssetEntry {
    path: String,
    payload: RwLock<Box<dyn Any + Send + Sync>>,
}

/// A cheaply clonable, identity-compared handle to a shared asset.
#[derive(Clone)]
pub struct AssetRef(Arc<AssetEntry>);

impl AssetRef {
    /// Wraps `payload` in a new asset registered under `path`.
    pub fn new<T: Any + Send + Sync>(path: impl Into<String>, payload: T) -> Self {
        Self(Arc::new(AssetEntry {
            path: path.into(),
            payload: RwLock::new(Box::new(payload)),
        }))
    }

    /// The path this asset was created with.
    pub fn path(&self) -> &str {
        &self.0.path
    }

    /// Returns `true` if the payload is a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.0.payload.read().is::<T>()
    }

    /// Read-locks the payload as a `T`, or returns `None` for another type.
    pub fn read<T: Any>(&self) -> Option<MappedRwLockReadGuard<'_, T>> {
        RwLockReadGuard::try_map(self.0.payload.read(), |payload| payload.downcast_ref::<T>()).ok()
    }

    /// Write-locks the payload as a `T`, or returns `None` for another type.
    pub fn write<T: Any>(&self) -> Option<MappedRwLockWriteGuard<'_, T>> {
        RwLockWriteGuard::try_map(self.0.payload.write(), |payload| payload.downcast_mut::<T>()).ok()
    }

    /// Returns `true` if both handles point at the same asset.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for AssetRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for AssetRef {}

impl Hash for AssetRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.0), state);
    }
}

impl std::fmt::Debug for AssetRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AssetRef({})", self.0.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_equality() {
        let a = AssetRef::new("ui/font", 12u32);
        let b = AssetRef::new("ui/font", 12u32);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn typed_access() {
        let asset = AssetRef::new("counter", 1u32);
        assert!(asset.is::<u32>());
        assert!(asset.read::<String>().is_none());
        *asset.write::<u32>().unwrap() += 4;
        assert_eq!(*asset.read::<u32>().unwrap(), 5);
    }
}
