//! Iterable persistent set.

use std::marker::PhantomData;

use borsh::{BorshDeserialize, BorshSerialize};

use super::{Collection, Iter, Keys, Sequence};
use crate::key::{Prefix, StorageKey};
use crate::meta::{self, CollectionKind};
use crate::{Error, Result, StorageRead, StorageWrite};

/// An iterable persistent set.
///
/// Same shape as [`IterableMap`](crate::IterableMap) with the payload fixed
/// to an empty marker: members are enumerable through the key index, and
/// [`clear`](IterableSet::clear) removes everything without leaving
/// orphans. Removal swaps index slots, so the member order is NOT preserved
/// across removals.
#[derive(Clone, Debug)]
pub struct IterableSet<K> {
    prefix: Prefix,
    phantom: PhantomData<K>,
}

impl<K> Collection for IterableSet<K> {
    const KIND: CollectionKind = CollectionKind::IterableSet;

    fn open(prefix: Prefix) -> Self {
        Self {
            prefix,
            phantom: PhantomData,
        }
    }

    fn prefix(&self) -> &Prefix {
        &self.prefix
    }
}

impl<K> IterableSet<K>
where
    K: StorageKey + BorshSerialize + BorshDeserialize,
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

    /// Returns whether the set contains the value.
    pub fn contains<S: StorageRead>(
        &self,
        storage: &S,
        value: &K,
    ) -> Result<bool> {
        storage.has_key(&self.entry_key(&value.to_key_bytes()))
    }

    /// Add a value to the set and track it for iteration. Returns whether
    /// it was newly added; adding a present value mutates nothing.
    pub fn add<S>(&self, storage: &mut S, value: K) -> Result<bool>
    where
        S: StorageRead + StorageWrite,
    {
        let mut header =
            meta::load_or_new(storage, &self.prefix, Self::KIND)?;
        let encoded = value.to_key_bytes();
        let entry_key = self.entry_key(&encoded);
        if storage.has_key(&entry_key)? {
            return Ok(false);
        }
        let position = header.length;
        storage.write(&entry_key, &())?;
        self.key_index().push(storage, value)?;
        storage.write(&self.reverse_key(&encoded), &position)?;
        header.length += 1;
        header.generation += 1;
        meta::store(storage, &self.prefix, &header)?;
        Ok(true)
    }

    /// Remove a value from the set, returning whether it was present.
    pub fn remove<S>(&self, storage: &mut S, value: &K) -> Result<bool>
    where
        S: StorageRead + StorageWrite,
    {
        let mut header =
            meta::load_or_new(storage, &self.prefix, Self::KIND)?;
        let encoded = value.to_key_bytes();
        let reverse_key = self.reverse_key(&encoded);
        let Some(position) = storage.read::<u64>(&reverse_key)? else {
            return Ok(false);
        };
        storage.delete(&self.entry_key(&encoded))?;
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
        Ok(true)
    }

    /// Remove a value, failing with
    /// [`Error::KeyAbsent`](crate::Error::KeyAbsent) if it was not in the
    /// set.
    pub fn try_remove<S>(&self, storage: &mut S, value: &K) -> Result<()>
    where
        S: StorageRead + StorageWrite,
    {
        if self.remove(storage, value)? {
            Ok(())
        } else {
            Err(Error::key_absent(&value.to_key_bytes()))
        }
    }

    /// Remove every member, the whole key index and all reverse entries,
    /// leaving no orphans.
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
            let value: K = index
                .get(storage, position)?
                .ok_or_else(|| Error::missing_entry(&slot_key))?;
            let encoded = value.to_key_bytes();
            storage.delete(&self.entry_key(&encoded))?;
            storage.delete(&self.reverse_key(&encoded))?;
        }
        index.purge(storage)?;
        header.length = 0;
        header.generation += 1;
        meta::store(storage, &self.prefix, &header)
    }

    /// Length of the companion key index. Always equal to
    /// [`len`](Collection::len) when the set's bookkeeping is intact;
    /// exposed as a cross-check.
    pub fn index_len<S: StorageRead>(&self, storage: &S) -> Result<u64> {
        self.key_index().len(storage)
    }

    /// Detached cursor over the members, in key-index order.
    pub fn values_cursor<S: StorageRead>(
        &self,
        storage: &S,
    ) -> Result<Keys<K>> {
        let header = self.header(storage)?;
        let len = header.map(|h| h.length).unwrap_or_default();
        Ok(Keys::new(self.prefix.clone(), Self::KIND, header, 0, len))
    }

    /// An iterator visiting the members in key-index order.
    pub fn values<'a, S: StorageRead>(
        &self,
        storage: &'a S,
    ) -> Result<Iter<'a, S, Keys<K>>> {
        Ok(Iter::new(self.values_cursor(storage)?, storage))
    }

    /// An iterator over the members starting at the given key-index
    /// offset, for paging across view calls.
    pub fn iter_from<'a, S: StorageRead>(
        &self,
        storage: &'a S,
        offset: u64,
    ) -> Result<Iter<'a, S, Keys<K>>> {
        let header = self.header(storage)?;
        let len = header.map(|h| h.length).unwrap_or_default();
        let keys = Keys::new(
            self.prefix.clone(),
            Self::KIND,
            header,
            offset.min(len),
            len,
        );
        Ok(Iter::new(keys, storage))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::collections::Cursor;
    use crate::testing::TestStorage;

    fn open(name: &str) -> IterableSet<String> {
        IterableSet::open(name.parse().unwrap())
    }

    #[test]
    fn test_iterable_set_basics() -> Result<()> {
        let mut storage = TestStorage::default();
        let set = open("test");

        assert!(set.is_empty(&storage)?);
        assert!(set.values(&storage)?.next().is_none());

        assert!(set.add(&mut storage, "x".to_string())?);
        assert!(set.add(&mut storage, "y".to_string())?);
        assert!(!set.add(&mut storage, "x".to_string())?);
        assert_eq!(set.len(&storage)?, 2);
        assert!(set.contains(&storage, &"x".to_string())?);

        let members: Vec<String> =
            set.values(&storage)?.collect::<Result<_>>()?;
        assert_eq!(members, vec!["x".to_string(), "y".to_string()]);

        assert!(set.remove(&mut storage, &"x".to_string())?);
        assert!(!set.remove(&mut storage, &"x".to_string())?);
        assert!(!set.contains(&storage, &"x".to_string())?);
        assert_eq!(set.len(&storage)?, 1);

        Ok(())
    }

    #[test]
    fn test_remove_swaps_members() -> Result<()> {
        let mut storage = TestStorage::default();
        let set = open("test");

        for member in ["a", "b", "c"] {
            set.add(&mut storage, member.to_string())?;
        }
        set.remove(&mut storage, &"a".to_string())?;
        let members: Vec<String> =
            set.values(&storage)?.collect::<Result<_>>()?;
        assert_eq!(members, vec!["c".to_string(), "b".to_string()]);

        Ok(())
    }

    #[test]
    fn test_cursor_invalidation() -> Result<()> {
        let mut storage = TestStorage::default();
        let set = open("test");
        set.add(&mut storage, "x".to_string())?;

        let mut cursor = set.values_cursor(&storage)?;
        set.add(&mut storage, "y".to_string())?;
        assert!(matches!(
            cursor.step(&storage),
            Err(Error::InvalidatedIter)
        ));

        Ok(())
    }

    #[test]
    fn test_deep_clear() -> Result<()> {
        let mut storage = TestStorage::default();
        let set = open("test");

        for member in ["a", "b", "c"] {
            set.add(&mut storage, member.to_string())?;
        }
        set.clear(&mut storage)?;

        assert_eq!(set.len(&storage)?, 0);
        assert!(set.values(&storage)?.next().is_none());
        assert!(!set.contains(&storage, &"a".to_string())?);
        // Only the set's own header is left
        assert_eq!(storage.len(), 1);

        Ok(())
    }
}
