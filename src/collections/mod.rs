//! Lazy data structures for contract storage where elements are not all
//! loaded into memory. Each collection is a stateless handle over a storage
//! [`Prefix`]; elements are read and written individually under composed
//! sub-keys, so the cost of an operation follows the elements it touches
//! and not the size of the collection.
//!
//! Iteration is driven by explicit cursors. A cursor captures the
//! collection's length and generation counter when it is created and
//! advances one stored element per step; if the collection is mutated while
//! a cursor is live, the next step fails with
//! [`Error::InvalidatedIter`](crate::Error::InvalidatedIter) instead of
//! skipping or repeating elements.

use std::marker::PhantomData;

use borsh::BorshDeserialize;

use crate::key::{Prefix, StorageKey};
use crate::meta::{self, CollectionKind, Header};
use crate::{Error, Result, StorageRead};

pub mod iterable_map;
pub mod iterable_set;
pub mod lookup_map;
pub mod lookup_set;
pub mod ordered_map;
pub mod sequence;

pub use iterable_map::IterableMap;
pub use iterable_set::IterableSet;
pub use lookup_map::LookupMap;
pub use lookup_set::LookupSet;
pub use ordered_map::OrderedMap;
pub use sequence::Sequence;

/// Shared surface of every persistent collection.
///
/// A handle is a plain value; `open` touches no storage. The header-derived
/// queries below behave as if the collection were empty when no header
/// exists yet, and fail with
/// [`Error::KindMismatch`](crate::Error::KindMismatch) when the prefix
/// already holds a collection of a different kind.
pub trait Collection {
    /// Kind tag pinned into the collection's header.
    const KIND: CollectionKind;

    /// Create or use an existing collection under the given storage prefix.
    fn open(prefix: Prefix) -> Self;

    /// The storage prefix this collection owns.
    fn prefix(&self) -> &Prefix;

    /// Read the collection's header, if it was created already.
    fn header<S: StorageRead>(&self, storage: &S) -> Result<Option<Header>> {
        meta::load(storage, self.prefix(), Self::KIND)
    }

    /// Number of elements in the collection.
    fn len<S: StorageRead>(&self, storage: &S) -> Result<u64> {
        Ok(self.header(storage)?.map(|h| h.length).unwrap_or_default())
    }

    /// Whether the collection contains no elements.
    fn is_empty<S: StorageRead>(&self, storage: &S) -> Result<bool> {
        Ok(self.len(storage)? == 0)
    }

    /// Current value of the mutation counter captured by iterators.
    fn generation<S: StorageRead>(&self, storage: &S) -> Result<u64> {
        Ok(self
            .header(storage)?
            .map(|h| h.generation)
            .unwrap_or_default())
    }
}

/// One step of a lazy iteration.
///
/// A cursor is detached from the storage it walks: each [`step`] borrows
/// the backend afresh, so a cursor can outlive mutable borrows of the
/// storage. This is also what makes invalidation observable; see
/// [`Error::InvalidatedIter`](crate::Error::InvalidatedIter).
///
/// [`step`]: Cursor::step
pub trait Cursor {
    /// The element the cursor yields.
    type Item;

    /// Advance by one element. `Ok(None)` marks the end of the iteration.
    fn step<S: StorageRead>(&mut self, storage: &S)
        -> Result<Option<Self::Item>>;
}

/// Borrowing [`Iterator`] adapter over a [`Cursor`].
///
/// The item type is `Result<_>` because every step crosses the storage
/// boundary and may fail with a decode error or an invalidated iteration.
#[derive(Debug)]
pub struct Iter<'a, S, C> {
    storage: &'a S,
    cursor: C,
}

impl<'a, S, C> Iter<'a, S, C> {
    pub(crate) fn new(cursor: C, storage: &'a S) -> Self {
        Self { storage, cursor }
    }

    /// Detach the underlying cursor from the storage borrow.
    pub fn into_cursor(self) -> C {
        self.cursor
    }
}

impl<S, C> Iterator for Iter<'_, S, C>
where
    S: StorageRead,
    C: Cursor,
{
    type Item = Result<C::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.step(self.storage).transpose()
    }
}

/// Cursor over the logical keys of an iterable or ordered collection,
/// walking its key-index sequence between two slot positions.
#[derive(Debug)]
pub struct Keys<K> {
    collection: Prefix,
    index: Prefix,
    kind: CollectionKind,
    generation: u64,
    position: u64,
    end: u64,
    phantom: PhantomData<K>,
}

impl<K> Keys<K> {
    pub(crate) fn new(
        collection: Prefix,
        kind: CollectionKind,
        header: Option<Header>,
        start: u64,
        end: u64,
    ) -> Self {
        let index = collection.index_prefix();
        Self {
            collection,
            index,
            kind,
            generation: header.map(|h| h.generation).unwrap_or_default(),
            position: start,
            end,
            phantom: PhantomData,
        }
    }

    /// The generation counter must not have moved since the cursor was
    /// created; a swap-removal under a live cursor would otherwise repeat
    /// or skip elements silently.
    fn guard<S: StorageRead>(&self, storage: &S) -> Result<()> {
        let header = meta::load(storage, &self.collection, self.kind)?;
        let generation = header.map(|h| h.generation).unwrap_or_default();
        if generation != self.generation {
            return Err(Error::InvalidatedIter);
        }
        Ok(())
    }
}

impl<K> Cursor for Keys<K>
where
    K: BorshDeserialize,
{
    type Item = K;

    fn step<S: StorageRead>(&mut self, storage: &S) -> Result<Option<K>> {
        self.guard(storage)?;
        if self.position >= self.end {
            return Ok(None);
        }
        let slot_key = self.index.entry_key(&self.position.to_be_bytes());
        let key = storage
            .read(&slot_key)?
            .ok_or_else(|| Error::missing_entry(&slot_key))?;
        self.position += 1;
        Ok(Some(key))
    }
}

/// Cursor over `(key, value)` entries, pairing each key-index slot with its
/// payload entry.
#[derive(Debug)]
pub struct Entries<K, V> {
    keys: Keys<K>,
    phantom: PhantomData<V>,
}

impl<K, V> Entries<K, V> {
    pub(crate) fn new(keys: Keys<K>) -> Self {
        Self {
            keys,
            phantom: PhantomData,
        }
    }
}

impl<K, V> Cursor for Entries<K, V>
where
    K: StorageKey + BorshDeserialize,
    V: BorshDeserialize,
{
    type Item = (K, V);

    fn step<S: StorageRead>(
        &mut self,
        storage: &S,
    ) -> Result<Option<(K, V)>> {
        let Some(key) = self.keys.step(storage)? else {
            return Ok(None);
        };
        let entry_key = self.keys.collection.entry_key(&key.to_key_bytes());
        let value = storage
            .read(&entry_key)?
            .ok_or_else(|| Error::missing_entry(&entry_key))?;
        Ok(Some((key, value)))
    }
}

/// Cursor over the values of an iterable or ordered map.
#[derive(Debug)]
pub struct Values<K, V> {
    entries: Entries<K, V>,
}

impl<K, V> Values<K, V> {
    pub(crate) fn new(keys: Keys<K>) -> Self {
        Self {
            entries: Entries::new(keys),
        }
    }
}

impl<K, V> Cursor for Values<K, V>
where
    K: StorageKey + BorshDeserialize,
    V: BorshDeserialize,
{
    type Item = V;

    fn step<S: StorageRead>(&mut self, storage: &S) -> Result<Option<V>> {
        Ok(self.entries.step(storage)?.map(|(_key, value)| value))
    }
}
