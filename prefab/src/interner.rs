//! Deduplicating reference tables.
//!
//! Payloads never inline assets, class names or property names. Each one is
//! stored once in an [`Interner`] and addressed by its `i32` index, with
//! [`NONE_INDEX`] standing for "no value".

use std::collections::HashMap;
use std::hash::Hash;

use tessera_world::AssetRef;

/// The index that resolves to nothing.
pub const NONE_INDEX: i32 = -1;

/// An append-only table assigning each distinct item a stable index.
///
/// Tables only grow within one session; there is no removal.
#[derive(Debug, Clone)]
pub struct Interner<T> {
    items: Vec<T>,
    lookup: HashMap<T, i32>,
}

impl<T: Eq + Hash + Clone> Interner<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            lookup: HashMap::new(),
        }
    }

    /// Rebuilds a table from a stored list, keeping every index.
    ///
    /// Duplicate items keep their first index.
    pub fn from_vec(items: Vec<T>) -> Self {
        let mut lookup = HashMap::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            lookup.entry(item.clone()).or_insert(index as i32);
        }
        Self { items, lookup }
    }

    /// Returns the index of `item`, appending it first if absent.
    pub fn find_or_add(&mut self, item: &T) -> i32 {
        if let Some(&index) = self.lookup.get(item) {
            return index;
        }
        let index = self.items.len() as i32;
        self.items.push(item.clone());
        self.lookup.insert(item.clone(), index);
        index
    }

    pub fn find(&self, item: &T) -> Option<i32> {
        self.lookup.get(item).copied()
    }

    /// Bounds-checked lookup. [`NONE_INDEX`] and out-of-range indices give `None`.
    pub fn resolve(&self, index: i32) -> Option<&T> {
        if index < 0 {
            return None;
        }
        self.items.get(index as usize)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}

impl<T: Eq + Hash + Clone> Default for Interner<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The three reference lists of one serialization session.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    /// Asset handles, compared by identity.
    pub assets: Interner<AssetRef>,
    /// Class names.
    pub classes: Interner<String>,
    /// Property and display names.
    pub names: Interner<String>,
}

impl ReferenceTable {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_or_add_deduplicates() {
        let mut names = Interner::new();
        let a = names.find_or_add(&"title".to_string());
        let b = names.find_or_add(&"size".to_string());
        let c = names.find_or_add(&"title".to_string());
        assert_eq!((a, b, c), (0, 1, 0));
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn resolve_is_bounds_checked() {
        let mut names = Interner::new();
        names.find_or_add(&"only".to_string());
        assert_eq!(names.resolve(0).map(String::as_str), Some("only"));
        assert_eq!(names.resolve(NONE_INDEX), None);
        assert_eq!(names.resolve(1), None);
        assert_eq!(names.resolve(-7), None);
    }

    #[test]
    fn assets_intern_by_identity() {
        let mut table = ReferenceTable::new();
        let first = AssetRef::new("ui/font", 1u8);
        let twin = AssetRef::new("ui/font", 1u8);
        assert_eq!(table.assets.find_or_add(&first), 0);
        assert_eq!(table.assets.find_or_add(&twin), 1);
        assert_eq!(table.assets.find_or_add(&first.clone()), 0);
    }

    #[test]
    fn from_vec_keeps_indices() {
        let mut names = Interner::from_vec(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(names.find(&"b".to_string()), Some(1));
        assert_eq!(names.find_or_add(&"c".to_string()), 2);
        assert_eq!(names.into_vec(), vec!["a", "b", "c"]);
    }
}
