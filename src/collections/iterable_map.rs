//! Iterable persistent map.

use std::marker::PhantomData;

use borsh::{BorshDeserialize, BorshSerialize};

use super::{Collection, Entries, Iter, Keys, Sequence, Values};
use crate::key::{Prefix, StorageKey};
use crate::meta::{self, CollectionKind};
use crate::{Error, OptionExt, Result, StorageRead, StorageWrite};

/// An iterable persistent key-value store.
///
/// Lookup semantics and costs match [`LookupMap`](crate::LookupMap); in
/// addition a companion key-index [`Sequence`] under
/// `prefix ‖ INDEX_SEP` records the currently present keys, which is what
/// enables enumeration and a deep [`clear`]. A reverse index under
/// `prefix ‖ REVERSE_SEP` maps each key to its slot position, keeping
/// removal at a constant number of host operations.
///
/// Removal swaps the removed key's index slot with the last one, so the
/// iteration order is NOT preserved across removals.
///
/// [`clear`]: IterableMap::clear
#[derive(Clone, Debug)]
pub struct IterableMap<K, V> {
    prefix: Prefix,
    phantom_k: PhantomData<K>,
    phantom_v: PhantomData<V>,
}

impl<K, V> Collection for IterableMap<K, V> {
    const KIND: CollectionKind = CollectionKind::IterableMap;

    fn open(prefix: Prefix) -> Self {
        Self {
            prefix,
            phantom_k: PhantomData,
            phantom_v: PhantomData,
        }
    }

    fn prefix(&self) -> &Prefix {
        &self.prefix
    }
}

impl<K, V> IterableMap<K, V>
where
    K: StorageKey + BorshSerialize + BorshDeserialize,
    V: BorshSerialize + BorshDeserialize,
{
    fn key_index(&self) -> Sequence<K> {
        Sequence::open(self.prefix.index_prefix())
    }

    fn entry_key(&self, encoded_key: &[u8]) -> Vec<u8> {
        self.prefix.entry_key(encoded_key)
    }

    fn reverse_key(&self, encoded_key: &[u8]) -> Vec<u8> {
        self.prefix.reverse_prefix().entry_key(encoded_key)
    }

    /// Returns the value corresponding to the key, if any.
    pub fn get<S: StorageRead>(
        &self,
        storage: &S,
        key: &K,
    ) -> Result<Option<V>> {
        storage.read(&self.entry_key(&key.to_key_bytes()))
    }

    /// Returns the value corresponding to the key, failing with
    /// [`Error::KeyAbsent`](crate::Error::KeyAbsent) when there is none.
    pub fn try_get<S: StorageRead>(&self, storage: &S, key: &K) -> Result<V> {
        self.get(storage, key)?.ok_or_absent(&key.to_key_bytes())
    }

    /// Returns whether the map contains the key.
    pub fn contains<S: StorageRead>(
        &self,
        storage: &S,
        key: &K,
    ) -> Result<bool> {
        storage.has_key(&self.entry_key(&key.to_key_bytes()))
    }

    /// Insert a key-value pair into the map.
    ///
    /// A new key is appended to the key index; overwriting an existing key
    /// only touches the payload entry. Returns the replaced value, if any.
    pub fn insert<S>(
        &self,
        storage: &mut S,
        key: K,
        value: V,
    ) -> Result<Option<V>>
    where
        S: StorageRead + StorageWrite,
    {
        let mut header =
            meta::load_or_new(storage, &self.prefix, Self::KIND)?;
        let encoded = key.to_key_bytes();
        let entry_key = self.entry_key(&encoded);
        let previous = storage.read(&entry_key)?;
        if previous.is_none() {
            let position = header.length;
            self.key_index().push(storage, key)?;
            storage.write(&self.reverse_key(&encoded), &position)?;
            header.length += 1;
        }
        storage.write(&entry_key, &value)?;
        header.generation += 1;
        meta::store(storage, &self.prefix, &header)?;
        Ok(previous)
    }

    /// Update the value under the key with the given function. The closure
    /// receives `None` when the key is absent.
    pub fn update<S, F>(&self, storage: &mut S, key: K, f: F) -> Result<()>
    where
        S: StorageRead + StorageWrite,
        F: FnOnce(Option<V>) -> V,
    {
        let current = self.get(storage, &key)?;
        let new = f(current);
        self.insert(storage, key, new)?;
        Ok(())
    }

    /// Remove a key from the map, returning the value if the key was
    /// present. Removing an absent key mutates nothing.
    ///
    /// The removed key's index slot is filled by swapping in the last one,
    /// whose reverse entry is repointed.
    pub fn remove<S>(&self, storage: &mut S, key: &K) -> Result<Option<V>>
    where
        S: StorageRead + StorageWrite,
    {
        let mut header =
            meta::load_or_new(storage, &self.prefix, Self::KIND)?;
        let encoded = key.to_key_bytes();
        let reverse_key = self.reverse_key(&encoded);
        let Some(position) = storage.read::<u64>(&reverse_key)? else {
            return Ok(None);
        };
        let entry_key = self.entry_key(&encoded);
        let value = storage
            .read(&entry_key)?
            .ok_or_else(|| Error::missing_entry(&entry_key))?;
        storage.delete(&entry_key)?;
        storage.delete(&reverse_key)?;

        let index = self.key_index();
        index.swap_remove(storage, position)?;
        let last = header.length.saturating_sub(1);
        if position != last {
            let slot_key = index.prefix().entry_key(&position.to_be_bytes());
            let moved: K = index
                .get(storage, position)?
                .ok_or_else(|| Error::missing_entry(&slot_key))?;
            storage
                .write(&self.reverse_key(&moved.to_key_bytes()), &position)?;
        }

        header.length = last;
        header.generation += 1;
        meta::store(storage, &self.prefix, &header)?;
        Ok(Some(value))
    }

    /// Remove a key from the map, failing with
    /// [`Error::KeyAbsent`](crate::Error::KeyAbsent) if it was not present.
    pub fn try_remove<S>(&self, storage: &mut S, key: &K) -> Result<V>
    where
        S: StorageRead + StorageWrite,
    {
        self.remove(storage, key)?.ok_or_absent(&key.to_key_bytes())
    }

    /// Remove every entry, the whole key index and all reverse entries.
    ///
    /// Unlike [`LookupMap::clear`](crate::LookupMap::clear) this leaves no
    /// orphans: the key index knows every present key. Costs a constant
    /// number of host operations per element; large maps can be drained
    /// across several receipts with `remove` instead.
    pub fn clear<S>(&self, storage: &mut S) -> Result<()>
    where
        S: StorageRead + StorageWrite,
    {
        let Some(mut header) = self.header(storage)? else {
            return Ok(());
        };
        let index = self.key_index();
        for position in 0..header.length {
            let slot_key = index.prefix().entry_key(&position.to_be_bytes());
            let key: K = index
                .get(storage, position)?
                .ok_or_else(|| Error::missing_entry(&slot_key))?;
            let encoded = key.to_key_bytes();
            storage.delete(&self.entry_key(&encoded))?;
            storage.delete(&self.reverse_key(&encoded))?;
        }
        index.purge(storage)?;
        header.length = 0;
        header.generation += 1;
        meta::store(storage, &self.prefix, &header)
    }

    /// Length of the companion key index. Always equal to
    /// [`len`](Collection::len) when the map's bookkeeping is intact;
    /// exposed as a cross-check.
    pub fn index_len<S: StorageRead>(&self, storage: &S) -> Result<u64> {
        self.key_index().len(storage)
    }

    /// Detached cursor over the keys, in key-index order.
    pub fn keys_cursor<S: StorageRead>(&self, storage: &S) -> Result<Keys<K>> {
        let header = self.header(storage)?;
        let len = header.map(|h| h.length).unwrap_or_default();
        Ok(Keys::new(self.prefix.clone(), Self::KIND, header, 0, len))
    }

    /// Detached cursor over `(key, value)` entries.
    pub fn entries_cursor<S: StorageRead>(
        &self,
        storage: &S,
    ) -> Result<Entries<K, V>> {
        Ok(Entries::new(self.keys_cursor(storage)?))
    }

    /// An iterator visiting all keys in key-index order.
    pub fn keys<'a, S: StorageRead>(
        &self,
        storage: &'a S,
    ) -> Result<Iter<'a, S, Keys<K>>> {
        Ok(Iter::new(self.keys_cursor(storage)?, storage))
    }

    /// An iterator visiting all values, in the same order as
    /// [`keys`](IterableMap::keys).
    pub fn values<'a, S: StorageRead>(
        &self,
        storage: &'a S,
    ) -> Result<Iter<'a, S, Values<K, V>>> {
        Ok(Iter::new(
            Values::new(self.keys_cursor(storage)?),
            storage,
        ))
    }

    /// An iterator visiting all `(key, value)` entries.
    pub fn iter<'a, S: StorageRead>(
        &self,
        storage: &'a S,
    ) -> Result<Iter<'a, S, Entries<K, V>>> {
        Ok(Iter::new(self.entries_cursor(storage)?, storage))
    }

    /// An iterator over the entries starting at the given key-index
    /// offset. Together with `Iterator::take` this pages through a large
    /// map across several view calls.
    pub fn iter_from<'a, S: StorageRead>(
        &self,
        storage: &'a S,
        offset: u64,
    ) -> Result<Iter<'a, S, Entries<K, V>>> {
        let header = self.header(storage)?;
        let len = header.map(|h| h.length).unwrap_or_default();
        let keys = Keys::new(
            self.prefix.clone(),
            Self::KIND,
            header,
            offset.min(len),
            len,
        );
        Ok(Iter::new(Entries::new(keys), storage))
    }
}

#[cfg(test)]
mod test {
    use std::collections::BTreeMap;

    use super::*;
    use crate::collections::Cursor;
    use crate::testing::TestStorage;

    fn open(name: &str) -> IterableMap<String, u64> {
        IterableMap::open(name.parse().unwrap())
    }

    #[test]
    fn test_iterable_map_basics() -> Result<()> {
        let mut storage = TestStorage::default();
        let map = open("test");

        assert!(map.is_empty(&storage)?);
        assert!(map.keys(&storage)?.next().is_none());
        assert!(map.get(&storage, &"a".to_string())?.is_none());

        map.insert(&mut storage, "a".to_string(), 1)?;
        map.insert(&mut storage, "b".to_string(), 2)?;
        assert_eq!(map.insert(&mut storage, "a".to_string(), 10)?, Some(1));
        assert_eq!(map.len(&storage)?, 2);
        assert!(map.contains(&storage, &"a".to_string())?);

        // Insertion order, overwrites do not reorder
        let keys: Vec<String> =
            map.keys(&storage)?.collect::<Result<_>>()?;
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
        let values: Vec<u64> =
            map.values(&storage)?.collect::<Result<_>>()?;
        assert_eq!(values, vec![10, 2]);
        let entries: Vec<(String, u64)> =
            map.iter(&storage)?.collect::<Result<_>>()?;
        assert_eq!(
            entries,
            vec![("a".to_string(), 10), ("b".to_string(), 2)]
        );

        Ok(())
    }

    #[test]
    fn test_remove_swaps_the_last_key() -> Result<()> {
        let mut storage = TestStorage::default();
        let map = open("test");

        for (key, value) in [("a", 1), ("b", 2), ("c", 3), ("d", 4)] {
            map.insert(&mut storage, key.to_string(), value)?;
        }

        // "a" is removed, "d" takes its slot
        assert_eq!(map.remove(&mut storage, &"a".to_string())?, Some(1));
        let keys: Vec<String> =
            map.keys(&storage)?.collect::<Result<_>>()?;
        assert_eq!(
            keys,
            vec!["d".to_string(), "b".to_string(), "c".to_string()]
        );
        assert_eq!(map.len(&storage)?, 3);

        // The swapped key is still removable through its new slot
        assert_eq!(map.remove(&mut storage, &"d".to_string())?, Some(4));
        let keys: Vec<String> =
            map.keys(&storage)?.collect::<Result<_>>()?;
        assert_eq!(keys, vec!["c".to_string(), "b".to_string()]);

        assert!(map.remove(&mut storage, &"a".to_string())?.is_none());
        assert_eq!(map.len(&storage)?, 2);

        Ok(())
    }

    #[test]
    fn test_every_mutation_invalidates_cursors() -> Result<()> {
        let mut storage = TestStorage::default();
        let map = open("test");
        map.insert(&mut storage, "k1".to_string(), 1)?;

        // A fresh insert invalidates
        let mut keys = map.keys_cursor(&storage)?;
        map.insert(&mut storage, "k2".to_string(), 2)?;
        assert!(matches!(
            keys.step(&storage),
            Err(Error::InvalidatedIter)
        ));

        // An overwrite of an existing key invalidates too
        let mut entries = map.entries_cursor(&storage)?;
        map.insert(&mut storage, "k1".to_string(), 10)?;
        assert!(matches!(
            entries.step(&storage),
            Err(Error::InvalidatedIter)
        ));

        // As does a removal
        let mut keys = map.keys_cursor(&storage)?;
        map.remove(&mut storage, &"k2".to_string())?;
        assert!(matches!(
            keys.step(&storage),
            Err(Error::InvalidatedIter)
        ));

        Ok(())
    }

    #[test]
    fn test_clear_leaves_no_storage_behind() -> Result<()> {
        let mut storage = TestStorage::default();
        let map = open("test");

        for (key, value) in [("a", 1), ("b", 2), ("c", 3)] {
            map.insert(&mut storage, key.to_string(), value)?;
        }
        map.clear(&mut storage)?;

        assert_eq!(map.len(&storage)?, 0);
        assert!(map.iter(&storage)?.next().is_none());
        assert!(!map.contains(&storage, &"a".to_string())?);
        // Payload, key index and reverse entries are all gone; only the
        // map's own header remains
        assert_eq!(storage.len(), 1);

        // The map is usable again afterwards
        map.insert(&mut storage, "x".to_string(), 9)?;
        assert_eq!(map.len(&storage)?, 1);

        Ok(())
    }

    #[test]
    fn test_iteration_matches_contains() -> Result<()> {
        let mut storage = TestStorage::default();
        let map = open("test");

        for (key, value) in
            [("a", 1), ("b", 2), ("c", 3), ("d", 4), ("e", 5)]
        {
            map.insert(&mut storage, key.to_string(), value)?;
        }
        map.remove(&mut storage, &"b".to_string())?;
        map.remove(&mut storage, &"e".to_string())?;
        map.insert(&mut storage, "f".to_string(), 6)?;

        let entries: BTreeMap<String, u64> =
            map.iter(&storage)?.collect::<Result<_>>()?;
        let expected: BTreeMap<String, u64> = [
            ("a".to_string(), 1),
            ("c".to_string(), 3),
            ("d".to_string(), 4),
            ("f".to_string(), 6),
        ]
        .into_iter()
        .collect();
        assert_eq!(entries, expected);
        assert_eq!(map.len(&storage)?, 4);
        assert_eq!(map.index_len(&storage)?, 4);
        for key in entries.keys() {
            assert!(map.contains(&storage, key)?);
        }

        Ok(())
    }

    #[test]
    fn test_iter_from_pages_through() -> Result<()> {
        let mut storage = TestStorage::default();
        let map = open("test");

        for (key, value) in [("a", 1), ("b", 2), ("c", 3), ("d", 4)] {
            map.insert(&mut storage, key.to_string(), value)?;
        }

        let page: Vec<(String, u64)> = map
            .iter_from(&storage, 1)?
            .take(2)
            .collect::<Result<_>>()?;
        assert_eq!(
            page,
            vec![("b".to_string(), 2), ("c".to_string(), 3)]
        );

        // An offset past the end yields nothing
        assert!(map.iter_from(&storage, 10)?.next().is_none());

        Ok(())
    }

    #[test]
    fn test_nested_maps_via_child_prefixes() -> Result<()> {
        let mut storage = TestStorage::default();
        let accounts: Prefix = "accounts".parse()?;

        let alice =
            IterableMap::<String, u64>::open(accounts.child("alice")?);
        let bob = IterableMap::<String, u64>::open(accounts.child("bob")?);

        alice.insert(&mut storage, "token".to_string(), 1)?;
        bob.insert(&mut storage, "token".to_string(), 2)?;

        assert_eq!(alice.get(&storage, &"token".to_string())?, Some(1));
        assert_eq!(bob.get(&storage, &"token".to_string())?, Some(2));
        bob.clear(&mut storage)?;
        assert_eq!(alice.len(&storage)?, 1);
        assert_eq!(bob.len(&storage)?, 0);

        Ok(())
    }
}
