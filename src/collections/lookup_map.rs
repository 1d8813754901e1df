//! Non-iterable persistent map.

use std::marker::PhantomData;

use borsh::{BorshDeserialize, BorshSerialize};

use super::Collection;
use crate::key::{Prefix, StorageKey};
use crate::meta::{self, CollectionKind};
use crate::{OptionExt, Result, StorageRead, StorageWrite};

/// A non-iterable persistent key-value store.
///
/// The cheapest map kind: every operation touches a constant number of
/// storage keys and nothing tracks which keys exist. The price is that the
/// map cannot enumerate its contents, and [`clear`] can only reset the
/// bookkeeping. Entries written before a `clear` remain in host storage
/// until they are overwritten through the same keys or removed one by one
/// (see [`drain_known_keys`]), and `contains` keeps returning `true` for
/// them. Use [`IterableMap`](crate::IterableMap) when wholesale clearing
/// or enumeration is needed.
///
/// [`clear`]: LookupMap::clear
/// [`drain_known_keys`]: LookupMap::drain_known_keys
#[derive(Clone, Debug)]
pub struct LookupMap<K, V> {
    prefix: Prefix,
    phantom_k: PhantomData<K>,
    phantom_v: PhantomData<V>,
}

impl<K, V> Collection for LookupMap<K, V> {
    const KIND: CollectionKind = CollectionKind::LookupMap;

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

impl<K, V> LookupMap<K, V>
where
    K: StorageKey,
    V: BorshSerialize + BorshDeserialize,
{
    /// Full storage key of the entry for a given logical key.
    pub fn entry_key(&self, key: &K) -> Vec<u8> {
        self.prefix.entry_key(&key.to_key_bytes())
    }

    /// Returns the value corresponding to the key, if any.
    pub fn get<S: StorageRead>(
        &self,
        storage: &S,
        key: &K,
    ) -> Result<Option<V>> {
        storage.read(&self.entry_key(key))
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
        storage.has_key(&self.entry_key(key))
    }

    /// Insert a key-value pair into the map.
    ///
    /// If the map did not have this key present, `None` is returned,
    /// otherwise the value is replaced and the old value returned.
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
        let entry_key = self.entry_key(&key);
        let previous = storage.read(&entry_key)?;
        storage.write(&entry_key, &value)?;
        if previous.is_none() {
            header.length += 1;
        }
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
        let mut header =
            meta::load_or_new(storage, &self.prefix, Self::KIND)?;
        let entry_key = self.entry_key(&key);
        let current = storage.read(&entry_key)?;
        let was_present = current.is_some();
        storage.write(&entry_key, &f(current))?;
        if !was_present {
            header.length += 1;
        }
        header.generation += 1;
        meta::store(storage, &self.prefix, &header)
    }

    /// Remove a key from the map, returning the value if the key was
    /// present. Removing an absent key mutates nothing.
    pub fn remove<S>(&self, storage: &mut S, key: &K) -> Result<Option<V>>
    where
        S: StorageRead + StorageWrite,
    {
        let mut header =
            meta::load_or_new(storage, &self.prefix, Self::KIND)?;
        let entry_key = self.entry_key(key);
        let Some(value) = storage.read(&entry_key)? else {
            return Ok(None);
        };
        storage.delete(&entry_key)?;
        // Entries orphaned by a shallow clear are no longer counted
        header.length = header.length.saturating_sub(1);
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

    /// Reset the map's bookkeeping to empty WITHOUT touching its entries.
    ///
    /// The map kind does not track its keys, so the entries themselves
    /// cannot be found and removed here; they stay in storage, and
    /// `contains` keeps answering `true` for them, until they are
    /// overwritten or removed through the same keys. Callers that need the
    /// deposits back must remove the keys they know about, e.g. with
    /// [`drain_known_keys`](LookupMap::drain_known_keys).
    pub fn clear<S: StorageWrite>(&self, storage: &mut S) -> Result<()> {
        storage.delete(&self.prefix.meta_key())
    }

    /// Remove every given key, returning how many were actually present.
    ///
    /// The explicit counterpart of a deep clear for this kind: the caller
    /// supplies the keys, typically remembered off-chain or chunked across
    /// several receipts, and nothing is iterated implicitly.
    pub fn drain_known_keys<S, I>(&self, storage: &mut S, keys: I) -> Result<u64>
    where
        S: StorageRead + StorageWrite,
        I: IntoIterator<Item = K>,
    {
        let mut removed = 0;
        for key in keys {
            if self.remove(storage, &key)?.is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::TestStorage;
    use crate::{Error, Sequence};

    fn open(name: &str) -> LookupMap<String, String> {
        LookupMap::open(name.parse().unwrap())
    }

    #[test]
    fn test_lookup_map_basics() -> Result<()> {
        let mut storage = TestStorage::default();
        let map = open("test");

        assert!(map.is_empty(&storage)?);
        assert!(map.get(&storage, &"k1".to_string())?.is_none());
        assert!(!map.contains(&storage, &"k1".to_string())?);
        assert!(map.remove(&mut storage, &"k1".to_string())?.is_none());

        map.insert(&mut storage, "k1".to_string(), "v1".to_string())?;
        map.insert(&mut storage, "k2".to_string(), "v2".to_string())?;
        // Overwriting does not change the length
        let old =
            map.insert(&mut storage, "k1".to_string(), "v1'".to_string())?;
        assert_eq!(old, Some("v1".to_string()));
        assert_eq!(map.len(&storage)?, 2);

        assert_eq!(
            map.remove(&mut storage, &"k2".to_string())?,
            Some("v2".to_string())
        );
        assert_eq!(
            map.get(&storage, &"k1".to_string())?,
            Some("v1'".to_string())
        );
        assert_eq!(map.len(&storage)?, 1);

        // Idempotent remove
        assert!(map.remove(&mut storage, &"k2".to_string())?.is_none());
        assert_eq!(map.len(&storage)?, 1);

        Ok(())
    }

    #[test]
    fn test_strict_lookups() -> Result<()> {
        let mut storage = TestStorage::default();
        let map = open("test");

        assert!(matches!(
            map.try_get(&storage, &"missing".to_string()),
            Err(Error::KeyAbsent { .. })
        ));
        assert!(matches!(
            map.try_remove(&mut storage, &"missing".to_string()),
            Err(Error::KeyAbsent { .. })
        ));

        map.insert(&mut storage, "k".to_string(), "v".to_string())?;
        assert_eq!(map.try_get(&storage, &"k".to_string())?, "v");
        assert_eq!(map.try_remove(&mut storage, &"k".to_string())?, "v");

        Ok(())
    }

    #[test]
    fn test_update() -> Result<()> {
        let mut storage = TestStorage::default();
        let map = LookupMap::<String, u64>::open("test".parse()?);

        map.update(&mut storage, "counter".to_string(), |current| {
            assert!(current.is_none());
            1
        })?;
        map.update(&mut storage, "counter".to_string(), |current| {
            current.unwrap_or_default() + 1
        })?;
        assert_eq!(map.get(&storage, &"counter".to_string())?, Some(2));
        assert_eq!(map.len(&storage)?, 1);

        Ok(())
    }

    #[test]
    fn test_clear_orphans_entries() -> Result<()> {
        let mut storage = TestStorage::default();
        let map = open("test");

        map.insert(&mut storage, "k".to_string(), "v".to_string())?;
        map.clear(&mut storage)?;

        // The length resets but the entry is orphaned in storage
        assert_eq!(map.len(&storage)?, 0);
        assert!(map.contains(&storage, &"k".to_string())?);
        assert_eq!(
            map.get(&storage, &"k".to_string())?,
            Some("v".to_string())
        );

        // Removing the orphan works and the length stays at zero
        assert_eq!(
            map.remove(&mut storage, &"k".to_string())?,
            Some("v".to_string())
        );
        assert_eq!(map.len(&storage)?, 0);

        Ok(())
    }

    #[test]
    fn test_drain_known_keys() -> Result<()> {
        let mut storage = TestStorage::default();
        let map = open("test");

        for key in ["a", "b", "c"] {
            map.insert(&mut storage, key.to_string(), key.to_string())?;
        }
        let removed = map.drain_known_keys(
            &mut storage,
            ["a".to_string(), "b".to_string(), "missing".to_string()],
        )?;
        assert_eq!(removed, 2);
        assert_eq!(map.len(&storage)?, 1);
        assert!(map.contains(&storage, &"c".to_string())?);

        Ok(())
    }

    #[test]
    fn test_kind_guard() -> Result<()> {
        let mut storage = TestStorage::default();
        let seq = Sequence::<u32>::open("shared".parse()?);
        seq.push(&mut storage, 1)?;

        // A different kind under the same prefix is refused on the first
        // header read, before anything is written
        let map = LookupMap::<String, u32>::open("shared".parse()?);
        let err = map
            .insert(&mut storage, "k".to_string(), 2)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::KindMismatch {
                expected: CollectionKind::LookupMap,
                found: CollectionKind::Sequence,
                ..
            }
        ));
        let err = map.len(&storage).unwrap_err();
        assert!(matches!(err, Error::KindMismatch { .. }));

        // The original collection is intact
        assert_eq!(seq.len(&storage)?, 1);

        Ok(())
    }
}
