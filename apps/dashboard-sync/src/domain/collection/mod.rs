//! Bounded Collections
//!
//! Client-visible lists maintained by reconcilers.
//!
//! # Invariants
//!
//! - No two items share an id.
//! - Items are ordered newest-first.
//! - Length never exceeds the capacity; overflow evicts from the tail.

use std::collections::{HashSet, VecDeque};

/// An item with a stable identity.
pub trait Identified {
    /// Stable id used for lookup and deduplication.
    fn id(&self) -> &str;
}

// =============================================================================
// Bounded Collection
// =============================================================================

/// Newest-first, capped, duplicate-free list of entities.
///
/// # Example
///
/// ```rust
/// use dashboard_sync::domain::collection::{BoundedCollection, Identified};
///
/// #[derive(Debug, Clone)]
/// struct Item(String);
///
/// impl Identified for Item {
///     fn id(&self) -> &str {
///         &self.0
///     }
/// }
///
/// let mut items = BoundedCollection::new(2);
/// items.prepend(Item("a".into())).unwrap();
/// items.prepend(Item("b".into())).unwrap();
///
/// // Third insert evicts the oldest entry.
/// let evicted = items.prepend(Item("c".into())).unwrap();
/// assert_eq!(evicted.map(|item| item.0), Some("a".to_string()));
///
/// // Duplicate ids are rejected.
/// assert!(items.prepend(Item("c".into())).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct BoundedCollection<T> {
    items: VecDeque<T>,
    ids: HashSet<String>,
    capacity: usize,
}

impl<T: Identified> BoundedCollection<T> {
    /// Create an empty collection. A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            ids: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert an item at the head.
    ///
    /// Returns the evicted tail item if the collection overflowed.
    ///
    /// # Errors
    ///
    /// Returns the item back if its id is already present.
    pub fn prepend(&mut self, item: T) -> Result<Option<T>, T> {
        if self.ids.contains(item.id()) {
            return Err(item);
        }
        self.ids.insert(item.id().to_string());
        self.items.push_front(item);

        if self.items.len() > self.capacity {
            let evicted = self.items.pop_back();
            if let Some(evicted) = &evicted {
                self.ids.remove(evicted.id());
            }
            return Ok(evicted);
        }
        Ok(None)
    }

    /// Insert an item ahead of the first item it is newer than, keeping
    /// the collection ordered by `is_newer`. Ties go behind existing items.
    ///
    /// Returns the evicted tail item if the collection overflowed.
    ///
    /// # Errors
    ///
    /// Returns the item back if its id is already present or it would land
    /// past the tail of a full collection.
    pub fn insert_ordered<F>(&mut self, item: T, is_newer: F) -> Result<Option<T>, T>
    where
        F: Fn(&T, &T) -> bool,
    {
        if self.ids.contains(item.id()) {
            return Err(item);
        }
        let index = self
            .items
            .iter()
            .position(|existing| is_newer(&item, existing))
            .unwrap_or(self.items.len());
        if index >= self.capacity {
            return Err(item);
        }

        self.ids.insert(item.id().to_string());
        self.items.insert(index, item);
        if self.items.len() > self.capacity {
            let evicted = self.items.pop_back();
            if let Some(evicted) = &evicted {
                self.ids.remove(evicted.id());
            }
            return Ok(evicted);
        }
        Ok(None)
    }

    /// Append an item at the tail (older than everything present).
    ///
    /// Returns `false` if the id is present or the collection is full.
    pub fn push_back(&mut self, item: T) -> bool {
        if self.items.len() >= self.capacity || self.ids.contains(item.id()) {
            return false;
        }
        self.ids.insert(item.id().to_string());
        self.items.push_back(item);
        true
    }

    /// Remove an item by id.
    pub fn remove(&mut self, id: &str) -> Option<T> {
        if !self.ids.remove(id) {
            return None;
        }
        let index = self.items.iter().position(|item| item.id() == id)?;
        self.items.remove(index)
    }

    /// Get an item by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&T> {
        if !self.ids.contains(id) {
            return None;
        }
        self.items.iter().find(|item| item.id() == id)
    }

    /// Get a mutable item by id.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut T> {
        if !self.ids.contains(id) {
            return None;
        }
        self.items.iter_mut().find(|item| item.id() == id)
    }

    /// Check if an id is present.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Replace the contents with `items`, given newest-first.
    ///
    /// Duplicate ids keep their first (newest) occurrence; anything past
    /// the capacity is dropped.
    pub fn replace_all(&mut self, items: impl IntoIterator<Item = T>) {
        self.clear();
        for item in items {
            if self.items.len() >= self.capacity {
                break;
            }
            self.push_back(item);
        }
    }

    /// Remove every item.
    pub fn clear(&mut self) {
        self.items.clear();
        self.ids.clear();
    }

    /// Get the number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the collection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Get the maximum number of items.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate newest-first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Iterate the ids newest-first.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(Identified::id)
    }
}

impl<T: Identified + Clone> BoundedCollection<T> {
    /// Copy the items out, newest-first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

// =============================================================================
// Seen Ids
// =============================================================================

/// Bounded set of ids already delivered to a consumer.
///
/// Remembers up to `capacity` ids; the oldest id is forgotten first. The
/// capacity should be comfortably larger than the collection it guards so
/// an id evicted from the collection is still recognised as seen.
#[derive(Debug, Clone)]
pub struct SeenIds {
    order: VecDeque<String>,
    ids: HashSet<String>,
    capacity: usize,
}

impl SeenIds {
    /// Create an empty set.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            order: VecDeque::with_capacity(capacity),
            ids: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// Record an id. Returns `false` if it was already seen.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        if self.order.len() >= self.capacity
            && let Some(oldest) = self.order.pop_front()
        {
            self.ids.remove(&oldest);
        }
        self.ids.insert(id.to_string());
        self.order.push_back(id.to_string());
        true
    }

    /// Check if an id was seen.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Get the number of remembered ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Check if nothing was seen.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Forget every id.
    pub fn clear(&mut self) {
        self.order.clear();
        self.ids.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: String,
        value: u32,
    }

    impl Item {
        fn new(id: &str, value: u32) -> Self {
            Self {
                id: id.to_string(),
                value,
            }
        }
    }

    impl Identified for Item {
        fn id(&self) -> &str {
            &self.id
        }
    }

    #[test]
    fn prepend_orders_newest_first() {
        let mut items = BoundedCollection::new(10);
        items.prepend(Item::new("a", 1)).unwrap();
        items.prepend(Item::new("b", 2)).unwrap();
        items.prepend(Item::new("c", 3)).unwrap();

        assert_eq!(items.ids().collect::<Vec<_>>(), vec!["c", "b", "a"]);
    }

    #[test]
    fn prepend_duplicate_rejected() {
        let mut items = BoundedCollection::new(10);
        items.prepend(Item::new("a", 1)).unwrap();

        let rejected = items.prepend(Item::new("a", 2)).unwrap_err();

        assert_eq!(rejected.value, 2);
        assert_eq!(items.len(), 1);
        assert_eq!(items.get("a").unwrap().value, 1);
    }

    #[test]
    fn overflow_evicts_tail() {
        let mut items = BoundedCollection::new(2);
        items.prepend(Item::new("a", 1)).unwrap();
        items.prepend(Item::new("b", 2)).unwrap();

        let evicted = items.prepend(Item::new("c", 3)).unwrap();

        assert_eq!(evicted, Some(Item::new("a", 1)));
        assert!(!items.contains("a"));
        assert_eq!(items.len(), 2);

        // The evicted id can come back.
        items.prepend(Item::new("a", 4)).unwrap();
        assert_eq!(items.ids().collect::<Vec<_>>(), vec!["a", "c"]);
    }

    #[test]
    fn insert_ordered_places_by_value() {
        let newer = |a: &Item, b: &Item| a.value > b.value;
        let mut items = BoundedCollection::new(3);
        items.insert_ordered(Item::new("a", 5), newer).unwrap();
        items.insert_ordered(Item::new("b", 1), newer).unwrap();
        items.insert_ordered(Item::new("c", 3), newer).unwrap();

        assert_eq!(items.ids().collect::<Vec<_>>(), vec!["a", "c", "b"]);

        let evicted = items.insert_ordered(Item::new("d", 9), newer).unwrap();
        assert_eq!(evicted, Some(Item::new("b", 1)));
        assert_eq!(items.ids().collect::<Vec<_>>(), vec!["d", "a", "c"]);
    }

    #[test]
    fn insert_ordered_rejects_duplicates_and_items_past_full_tail() {
        let newer = |a: &Item, b: &Item| a.value > b.value;
        let mut items = BoundedCollection::new(2);
        items.insert_ordered(Item::new("a", 5), newer).unwrap();
        items.insert_ordered(Item::new("b", 4), newer).unwrap();

        assert!(items.insert_ordered(Item::new("a", 9), newer).is_err());
        let rejected = items.insert_ordered(Item::new("c", 1), newer).unwrap_err();

        assert_eq!(rejected.id, "c");
        assert_eq!(items.ids().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut items = BoundedCollection::new(4);
        items.prepend(Item::new("a", 1)).unwrap();

        assert!(items.remove("a").is_some());
        assert!(items.remove("a").is_none());
        assert!(items.is_empty());
    }

    #[test]
    fn get_mut_updates_in_place() {
        let mut items = BoundedCollection::new(4);
        items.prepend(Item::new("a", 1)).unwrap();

        items.get_mut("a").unwrap().value = 9;

        assert_eq!(items.get("a").unwrap().value, 9);
        assert!(items.get_mut("missing").is_none());
    }

    #[test]
    fn push_back_respects_capacity_and_ids() {
        let mut items = BoundedCollection::new(2);
        assert!(items.push_back(Item::new("a", 1)));
        assert!(!items.push_back(Item::new("a", 2)));
        assert!(items.push_back(Item::new("b", 3)));
        assert!(!items.push_back(Item::new("c", 4)));

        assert_eq!(items.ids().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn replace_all_dedups_and_truncates() {
        let mut items = BoundedCollection::new(2);
        items.prepend(Item::new("old", 0)).unwrap();

        items.replace_all(vec![
            Item::new("a", 1),
            Item::new("a", 2),
            Item::new("b", 3),
            Item::new("c", 4),
        ]);

        assert_eq!(items.to_vec(), vec![Item::new("a", 1), Item::new("b", 3)]);
        assert!(!items.contains("old"));
    }

    #[test]
    fn zero_capacity_raised_to_one() {
        let mut items = BoundedCollection::new(0);
        items.prepend(Item::new("a", 1)).unwrap();

        assert_eq!(items.capacity(), 1);
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn seen_ids_rejects_repeats() {
        let mut seen = SeenIds::new(8);

        assert!(seen.insert("a"));
        assert!(!seen.insert("a"));
        assert!(seen.contains("a"));
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn seen_ids_forgets_oldest() {
        let mut seen = SeenIds::new(2);
        seen.insert("a");
        seen.insert("b");
        seen.insert("c");

        assert!(!seen.contains("a"));
        assert!(seen.contains("b"));
        assert!(seen.contains("c"));
        assert_eq!(seen.len(), 2);
    }
}
