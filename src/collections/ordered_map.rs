//! Key-sorted persistent map.

use std::marker::PhantomData;
use std::ops::{Bound, RangeBounds};

use borsh::{BorshDeserialize, BorshSerialize};

use super::{Collection, Entries, Iter, Keys, Sequence, Values};
use crate::key::{Prefix, StorageKey};
use crate::meta::{self, CollectionKind};
use crate::{Error, OptionExt, Result, StorageRead, StorageWrite};

/// A persistent map whose keys are kept in ascending order.
///
/// The companion key index under `prefix ‖ INDEX_SEP` is a [`Sequence`]
/// maintained in sorted order by the `Ord` of `K`, which for every
/// [`StorageKey`] impl in this crate coincides with lexicographic order
/// over the encoded key bytes. That buys `floor`/`ceiling`/`min`/`max`
/// and half-open range scans on top of the usual map operations, and makes
/// [`keys`]/[`values`]/[`iter`] yield strictly ascending keys.
///
/// Keys are located by binary search over the stored index, a logarithmic
/// number of host reads. Inserting or removing a key shifts the index
/// slots behind its position, which costs host operations linear in the
/// number of greater keys; overwriting an existing key's value leaves the
/// index untouched.
///
/// [`keys`]: OrderedMap::keys
/// [`values`]: OrderedMap::values
/// [`iter`]: OrderedMap::iter
#[derive(Clone, Debug)]
pub struct OrderedMap<K, V> {
    prefix: Prefix,
    phantom_k: PhantomData<K>,
    phantom_v: PhantomData<V>,
}

impl<K, V> Collection for OrderedMap<K, V> {
    const KIND: CollectionKind = CollectionKind::OrderedMap;

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

impl<K, V> OrderedMap<K, V>
where
    K: StorageKey + BorshSerialize + BorshDeserialize + Ord,
    V: BorshSerialize + BorshDeserialize,
{
    fn key_index(&self) -> Sequence<K> {
        Sequence::open(self.prefix.index_prefix())
    }

    fn entry_key(&self, encoded_key: &[u8]) -> Vec<u8> {
        self.prefix.entry_key(encoded_key)
    }

    fn index_slot<S: StorageRead>(
        &self,
        storage: &S,
        index: &Sequence<K>,
        position: u64,
    ) -> Result<K> {
        let slot_key = index.prefix().entry_key(&position.to_be_bytes());
        index
            .get(storage, position)?
            .ok_or_else(|| Error::missing_entry(&slot_key))
    }

    /// Position of the first stored key that is `>= probe`, or `len` when
    /// every key is smaller.
    fn lower_bound<S: StorageRead>(
        &self,
        storage: &S,
        len: u64,
        probe: &K,
    ) -> Result<u64> {
        let index = self.key_index();
        let (mut lo, mut hi) = (0, len);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.index_slot(storage, &index, mid)? < *probe {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo)
    }

    /// Position of the first stored key that is `> probe`.
    fn upper_bound<S: StorageRead>(
        &self,
        storage: &S,
        len: u64,
        probe: &K,
    ) -> Result<u64> {
        let index = self.key_index();
        let (mut lo, mut hi) = (0, len);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.index_slot(storage, &index, mid)? <= *probe {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo)
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

    /// Insert a key-value pair into the map, returning the replaced value
    /// if the key was already present.
    ///
    /// A new key is placed into the index at its sorted position, found by
    /// binary search; the slots behind it shift one to the right.
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
            let position =
                self.lower_bound(storage, header.length, &key)?;
            self.key_index().insert_at(storage, position, &key)?;
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
    /// present. The index slots behind it shift one to the left, so the
    /// remaining keys stay sorted.
    pub fn remove<S>(&self, storage: &mut S, key: &K) -> Result<Option<V>>
    where
        S: StorageRead + StorageWrite,
    {
        let mut header =
            meta::load_or_new(storage, &self.prefix, Self::KIND)?;
        let encoded = key.to_key_bytes();
        let entry_key = self.entry_key(&encoded);
        let Some(value) = storage.read(&entry_key)? else {
            return Ok(None);
        };
        storage.delete(&entry_key)?;
        let position = self.lower_bound(storage, header.length, key)?;
        self.key_index().remove_at(storage, position)?;
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

    /// Length of the companion key index. Always equal to
    /// [`len`](Collection::len) when the map's bookkeeping is intact;
    /// exposed as a cross-check.
    pub fn index_len<S: StorageRead>(&self, storage: &S) -> Result<u64> {
        self.key_index().len(storage)
    }

    /// The smallest key in the map, if any.
    pub fn min_key<S: StorageRead>(&self, storage: &S) -> Result<Option<K>> {
        self.key_index().front(storage)
    }

    /// The greatest key in the map, if any.
    pub fn max_key<S: StorageRead>(&self, storage: &S) -> Result<Option<K>> {
        self.key_index().back(storage)
    }

    /// The greatest stored key that is `<= probe`, if any.
    pub fn floor_key<S: StorageRead>(
        &self,
        storage: &S,
        probe: &K,
    ) -> Result<Option<K>> {
        let len = self.len(storage)?;
        let position = self.upper_bound(storage, len, probe)?;
        if position == 0 {
            return Ok(None);
        }
        let key =
            self.index_slot(storage, &self.key_index(), position - 1)?;
        Ok(Some(key))
    }

    /// The smallest stored key that is `>= probe`, if any.
    pub fn ceiling_key<S: StorageRead>(
        &self,
        storage: &S,
        probe: &K,
    ) -> Result<Option<K>> {
        let len = self.len(storage)?;
        let position = self.lower_bound(storage, len, probe)?;
        if position == len {
            return Ok(None);
        }
        let key = self.index_slot(storage, &self.key_index(), position)?;
        Ok(Some(key))
    }

    /// Detached cursor over the keys falling within the given bounds, in
    /// ascending order.
    ///
    /// Bounds are honored exactly as given; a range whose start lies
    /// behind its end yields an empty cursor, never an error, and
    /// `..` (unbounded on both sides) is equivalent to
    /// [`keys_cursor`](OrderedMap::keys_cursor).
    pub fn range_cursor<S, R>(&self, storage: &S, bounds: R) -> Result<Keys<K>>
    where
        S: StorageRead,
        R: RangeBounds<K>,
    {
        let header = self.header(storage)?;
        let len = header.map(|h| h.length).unwrap_or_default();
        let start = match bounds.start_bound() {
            Bound::Included(key) => self.lower_bound(storage, len, key)?,
            Bound::Excluded(key) => self.upper_bound(storage, len, key)?,
            Bound::Unbounded => 0,
        };
        let end = match bounds.end_bound() {
            Bound::Included(key) => self.upper_bound(storage, len, key)?,
            Bound::Excluded(key) => self.lower_bound(storage, len, key)?,
            Bound::Unbounded => len,
        };
        let end = end.max(start);
        Ok(Keys::new(
            self.prefix.clone(),
            Self::KIND,
            header,
            start,
            end,
        ))
    }

    /// An iterator over the keys falling within the given bounds, in
    /// ascending order; see [`range_cursor`](OrderedMap::range_cursor).
    pub fn range<'a, S, R>(
        &self,
        storage: &'a S,
        bounds: R,
    ) -> Result<Iter<'a, S, Keys<K>>>
    where
        S: StorageRead,
        R: RangeBounds<K>,
    {
        Ok(Iter::new(self.range_cursor(storage, bounds)?, storage))
    }

    /// Detached cursor over all keys, in ascending order.
    pub fn keys_cursor<S: StorageRead>(&self, storage: &S) -> Result<Keys<K>> {
        let header = self.header(storage)?;
        let len = header.map(|h| h.length).unwrap_or_default();
        Ok(Keys::new(self.prefix.clone(), Self::KIND, header, 0, len))
    }

    /// An iterator visiting all keys in ascending order.
    pub fn keys<'a, S: StorageRead>(
        &self,
        storage: &'a S,
    ) -> Result<Iter<'a, S, Keys<K>>> {
        Ok(Iter::new(self.keys_cursor(storage)?, storage))
    }

    /// An iterator visiting all values, ordered by their keys ascending.
    pub fn values<'a, S: StorageRead>(
        &self,
        storage: &'a S,
    ) -> Result<Iter<'a, S, Values<K, V>>> {
        Ok(Iter::new(
            Values::new(self.keys_cursor(storage)?),
            storage,
        ))
    }

    /// An iterator visiting all `(key, value)` entries in ascending key
    /// order.
    pub fn iter<'a, S: StorageRead>(
        &self,
        storage: &'a S,
    ) -> Result<Iter<'a, S, Entries<K, V>>> {
        Ok(Iter::new(
            Entries::new(self.keys_cursor(storage)?),
            storage,
        ))
    }

    /// Remove every entry and the whole key index, leaving no orphans.
    pub fn clear<S>(&self, storage: &mut S) -> Result<()>
    where
        S: StorageRead + StorageWrite,
    {
        let Some(mut header) = self.header(storage)? else {
            return Ok(());
        };
        let index = self.key_index();
        for position in 0..header.length {
            let key = self.index_slot(storage, &index, position)?;
            storage.delete(&self.entry_key(&key.to_key_bytes()))?;
        }
        index.purge(storage)?;
        header.length = 0;
        header.generation += 1;
        meta::store(storage, &self.prefix, &header)
    }
}
