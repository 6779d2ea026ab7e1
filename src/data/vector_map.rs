//! This module contains the definition of a map-like structure that is based on
//! a contiguous vector. It uses the fact that its keys must implement
//! [`ToUniqueIndex`] to store them in contiguous memory.
//!
//! It is only suitable for keys that the library allocates itself from a
//! counter, such as merge region identities. Identities chosen by the engine
//! may be arbitrarily sparse and must be kept in ordinary maps instead.

use std::marker::PhantomData;

use derivative::Derivative;

/// A map-like structure based on a vector that works over key types that
/// implement [`ToUniqueIndex`].
///
/// # Memory Usage
///
/// The `VectorMap` will take up _at least_ `mem::size_of::<Option<V>>() * n`
/// bytes where `n` is the largest unique index stored in it.
#[derive(Derivative)]
#[derivative(
    Clone(bound = "V: std::clone::Clone"),
    Debug(bound = "V: std::fmt::Debug"),
    Eq(bound = "V: std::cmp::Eq"),
    PartialEq(bound = "V: std::cmp::PartialEq")
)]
pub struct VectorMap<K, V>
where
    K: ToUniqueIndex,
{
    /// A retainer for the key type `K` such that it remains part of the map's
    /// type.
    #[derivative(Debug = "ignore")]
    phantom: PhantomData<K>,

    /// The actual data stored in the container.
    data: Vec<Option<V>>,

    /// The number of items currently inserted into the map.
    size: usize,
}

impl<K, V> VectorMap<K, V>
where
    K: ToUniqueIndex,
{
    /// Creates a new, empty, `VectorMap`.
    #[must_use]
    pub fn new() -> Self {
        let phantom = PhantomData;
        let data = Vec::new();
        let size = 0;
        Self {
            phantom,
            data,
            size,
        }
    }

    /// Inserts the provided `value` into the map at the `key`s
    /// [`ToUniqueIndex::index`], returning the value previously stored there.
    ///
    /// # Complexity
    ///
    /// Complexity of an insertion at `key.index` is `O(1)` when `key.index <
    /// max_key_index` or `O(n)` where `n = key.index - max_key_index`.
    pub fn insert(&mut self, key: &K, value: V) -> Option<V> {
        let index = key.index();
        if index >= self.data.len() {
            self.data.resize_with(index + 1, || None);
        }

        let previous = self.data[index].replace(value);
        if previous.is_none() {
            self.size += 1;
        }

        previous
    }

    /// Gets the value in the map for the provided `key` or [`None`] if there is
    /// no entry for `key` in the map.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.data.get(key.index()).and_then(Option::as_ref)
    }

    /// Gets the value in the map for the provided `key` or [`None`] if there is
    /// no entry for `key` in the map.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.data.get_mut(key.index()).and_then(Option::as_mut)
    }

    /// Checks whether the map holds an entry for `key`.
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Removes a key from the map, returning the value at the key if the key
    /// was previously in the map.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let value = self.data.get_mut(key.index()).and_then(Option::take);
        if value.is_some() {
            self.size -= 1;
        }

        value
    }

    /// Gets the number of items currently inserted into the map.
    #[must_use]
    pub fn len(&self) -> usize {
        self.size
    }

    /// Checks whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// An iterator visiting all index-value pairs in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &V)> {
        self.data
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_ref().map(|v| (i, v)))
    }

    /// An iterator visiting all values in ascending index order.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.data.iter().filter_map(Option::as_ref)
    }

    /// An iterator visiting all values mutably in ascending index order.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.data.iter_mut().filter_map(Option::as_mut)
    }
}

impl<K, V> VectorMap<K, V>
where
    K: ToUniqueIndex + FromUniqueIndex,
{
    /// An iterator visiting all keys in ascending index order.
    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.iter().map(|(i, _)| K::from_index(i))
    }
}

impl<K, V> Default for VectorMap<K, V>
where
    K: ToUniqueIndex,
{
    fn default() -> Self {
        Self::new()
    }
}

/// A trait representing objects that can be mapped to unique indices.
pub trait ToUniqueIndex {
    /// Gets the unique index for `self`.
    fn index(&self) -> usize;
}

impl ToUniqueIndex for usize {
    fn index(&self) -> usize {
        *self
    }
}

/// A trait representing objects that can be constructed from their unique
/// indices.
pub trait FromUniqueIndex {
    fn from_index(index: usize) -> Self;
}

impl FromUniqueIndex for usize {
    fn from_index(index: usize) -> Self {
        index
    }
}

#[cfg(test)]
mod test {
    use itertools::Itertools;

    use crate::data::vector_map::VectorMap;

    #[test]
    fn insert_counts_only_new_keys() {
        let mut map: VectorMap<usize, usize> = VectorMap::new();
        assert!(map.is_empty());

        assert_eq!(map.insert(&0, 10), None);
        assert_eq!(map.insert(&10, 20), None);
        assert_eq!(map.len(), 2);

        // Overwriting must not change the size.
        assert_eq!(map.insert(&10, 30), Some(20));
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&10), Some(&30));
    }

    #[test]
    fn remove_ignores_missing_keys() {
        let mut map: VectorMap<usize, usize> = VectorMap::new();
        map.insert(&0, 10);
        map.insert(&1, 20);

        assert_eq!(map.remove(&0), Some(10));
        assert_eq!(map.remove(&0), None);
        assert_eq!(map.remove(&500), None);
        assert_eq!(map.len(), 1);
        assert!(!map.contains_key(&0));
        assert!(map.contains_key(&1));
    }

    #[test]
    fn values_can_be_edited_in_place() {
        let mut map: VectorMap<usize, usize> = VectorMap::new();
        map.insert(&4, 1);
        map.insert(&7, 5);
        if let Some(value) = map.get_mut(&4) {
            *value += 1;
        }
        assert_eq!(map.get(&4), Some(&2));
        assert!(map.get_mut(&3).is_none());

        for value in map.values_mut() {
            *value *= 10;
        }
        assert_eq!(map.values().copied().collect_vec(), vec![20, 50]);
    }

    #[test]
    fn keys_are_ordered_by_index() {
        let mut map: VectorMap<usize, usize> = VectorMap::new();
        for i in [8, 2, 6, 4] {
            map.insert(&i, i * 10);
        }

        assert_eq!(map.keys().collect_vec(), vec![2, 4, 6, 8]);
        assert_eq!(map.values().copied().collect_vec(), vec![20, 40, 60, 80]);
    }
}
