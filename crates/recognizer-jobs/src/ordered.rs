//! Insertion-ordered map with O(1) removal by key.
//!
//! Backs the per-tier worker queues, the per-worker pending work and the
//! pipeline's task queue: all need FIFO order plus cancellation by key.
//! Built on an unbounded [`LruCache`], which already pairs a hash map with
//! an intrusive linked list. Only the non-promoting `peek`/`push` side of
//! its API is used, so entries never move once inserted.

use std::hash::Hash;

use lru::LruCache;

pub struct FifoMap<K: Hash + Eq, V> {
    inner: LruCache<K, V>,
}

impl<K: Hash + Eq, V> FifoMap<K, V> {
    pub fn new() -> Self {
        Self {
            inner: LruCache::unbounded(),
        }
    }

    /// Append `key` at the back. Returns `false`, leaving the existing entry
    /// and its position untouched, if the key is already present.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        if self.inner.contains(&key) {
            return false;
        }
        self.inner.push(key, value);
        true
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.inner.peek(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.contains(key)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.inner.pop(key)
    }

    /// Oldest entry.
    pub fn front(&self) -> Option<(&K, &V)> {
        self.inner.peek_lru()
    }

    pub fn pop_front(&mut self) -> Option<(K, V)> {
        self.inner.pop_lru()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Entries oldest first.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.inner.iter().rev()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(k, _)| k)
    }

    /// Remove every entry, oldest first.
    pub fn drain(&mut self) -> Vec<(K, V)> {
        let mut drained = Vec::with_capacity(self.len());
        while let Some(entry) = self.inner.pop_lru() {
            drained.push(entry);
        }
        drained
    }
}

impl<K: Hash + Eq, V> Default for FifoMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq + std::fmt::Debug, V> std::fmt::Debug for FifoMap<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut map = FifoMap::new();
        map.insert("a", 1);
        map.insert("b", 2);
        map.insert("c", 3);

        assert_eq!(map.front(), Some((&"a", &1)));
        assert_eq!(map.keys().copied().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(map.pop_front(), Some(("a", 1)));
        assert_eq!(map.pop_front(), Some(("b", 2)));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_duplicate_insert_keeps_position_and_value() {
        let mut map = FifoMap::new();
        assert!(map.insert("a", 1));
        map.insert("b", 2);
        assert!(!map.insert("a", 10));

        assert_eq!(map.get(&"a"), Some(&1));
        assert_eq!(map.front(), Some((&"a", &1)));
    }

    #[test]
    fn test_remove_from_middle() {
        let mut map = FifoMap::new();
        for (i, key) in ["a", "b", "c", "d"].into_iter().enumerate() {
            map.insert(key, i);
        }

        assert_eq!(map.remove(&"b"), Some(1));
        assert_eq!(map.remove(&"b"), None);
        assert!(!map.contains(&"b"));
        assert_eq!(map.keys().copied().collect::<Vec<_>>(), vec!["a", "c", "d"]);
    }

    #[test]
    fn test_get_does_not_reorder() {
        let mut map = FifoMap::new();
        map.insert(1, "one");
        map.insert(2, "two");
        let _ = map.get(&1);

        assert_eq!(map.pop_front(), Some((1, "one")));
    }

    #[test]
    fn test_drain_is_oldest_first() {
        let mut map = FifoMap::new();
        map.insert(3, ());
        map.insert(1, ());
        map.insert(2, ());

        let keys: Vec<_> = map.drain().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![3, 1, 2]);
        assert!(map.is_empty());
    }
}
