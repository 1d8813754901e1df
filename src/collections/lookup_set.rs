//! Non-iterable persistent set.

use std::marker::PhantomData;

use super::Collection;
use crate::key::{Prefix, StorageKey};
use crate::meta::{self, CollectionKind};
use crate::{Error, Result, StorageRead, StorageWrite};

/// A non-iterable persistent set.
///
/// Same storage and cost profile as [`LookupMap`](crate::LookupMap) with
/// the value fixed to an empty presence marker, and the same caveat:
/// [`clear`](LookupSet::clear) resets the bookkeeping without touching the
/// markers, so members added before a clear keep answering `contains`
/// until they are removed through the same keys.
#[derive(Clone, Debug)]
pub struct LookupSet<K> {
    prefix: Prefix,
    phantom: PhantomData<K>,
}

impl<K> Collection for LookupSet<K> {
    const KIND: CollectionKind = CollectionKind::LookupSet;

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

impl<K> LookupSet<K>
where
    K: StorageKey,
{
    fn entry_key(&self, value: &K) -> Vec<u8> {
        self.prefix.entry_key(&value.to_key_bytes())
    }

    /// Returns whether the set contains the value.
    pub fn contains<S: StorageRead>(
        &self,
        storage: &S,
        value: &K,
    ) -> Result<bool> {
        storage.has_key(&self.entry_key(value))
    }

    /// Add a value to the set. Returns whether it was newly added; adding
    /// a present value mutates nothing.
    pub fn add<S>(&self, storage: &mut S, value: K) -> Result<bool>
    where
        S: StorageRead + StorageWrite,
    {
        let mut header =
            meta::load_or_new(storage, &self.prefix, Self::KIND)?;
        let entry_key = self.entry_key(&value);
        if storage.has_key(&entry_key)? {
            return Ok(false);
        }
        storage.write(&entry_key, &())?;
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
        let entry_key = self.entry_key(value);
        if !storage.has_key(&entry_key)? {
            return Ok(false);
        }
        storage.delete(&entry_key)?;
        header.length = header.length.saturating_sub(1);
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

    /// Reset the set's bookkeeping to empty WITHOUT touching its markers;
    /// see [`LookupMap::clear`](crate::LookupMap::clear) for the orphaning
    /// consequence.
    pub fn clear<S: StorageWrite>(&self, storage: &mut S) -> Result<()> {
        storage.delete(&self.prefix.meta_key())
    }

    /// Remove every given value, returning how many were actually present.
    pub fn drain_known_keys<S, I>(&self, storage: &mut S, values: I) -> Result<u64>
    where
        S: StorageRead + StorageWrite,
        I: IntoIterator<Item = K>,
    {
        let mut removed = 0;
        for value in values {
            if self.remove(storage, &value)? {
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

    #[test]
    fn test_lookup_set_basics() -> Result<()> {
        let mut storage = TestStorage::default();
        let set = LookupSet::<String>::open("test".parse()?);

        assert!(!set.contains(&storage, &"x".to_string())?);
        assert!(set.add(&mut storage, "x".to_string())?);
        assert!(!set.add(&mut storage, "x".to_string())?);
        assert!(set.contains(&storage, &"x".to_string())?);
        assert_eq!(set.len(&storage)?, 1);

        assert!(set.remove(&mut storage, &"x".to_string())?);
        assert!(!set.remove(&mut storage, &"x".to_string())?);
        assert!(matches!(
            set.try_remove(&mut storage, &"x".to_string()),
            Err(Error::KeyAbsent { .. })
        ));
        assert_eq!(set.len(&storage)?, 0);

        Ok(())
    }

    #[test]
    fn test_clear_orphans_markers() -> Result<()> {
        let mut storage = TestStorage::default();
        let set = LookupSet::<String>::open("test".parse()?);

        set.add(&mut storage, "x".to_string())?;
        set.clear(&mut storage)?;

        // The documented contract: the length resets, the marker stays
        assert_eq!(set.len(&storage)?, 0);
        assert!(set.contains(&storage, &"x".to_string())?);

        // A re-add of an orphan is not double counted
        assert!(!set.add(&mut storage, "x".to_string())?);
        assert_eq!(set.len(&storage)?, 0);

        Ok(())
    }

    #[test]
    fn test_integer_members() -> Result<()> {
        let mut storage = TestStorage::default();
        let set = LookupSet::<i64>::open("test".parse()?);

        set.add(&mut storage, -5)?;
        set.add(&mut storage, 5)?;
        assert!(set.contains(&storage, &-5)?);
        assert!(set.contains(&storage, &5)?);
        assert!(!set.contains(&storage, &0)?);
        assert_eq!(set.len(&storage)?, 2);

        Ok(())
    }
}
