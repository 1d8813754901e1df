//! In-memory storage backend for tests.

use std::collections::BTreeMap;

use crate::{Result, StorageRead, StorageWrite};

/// Storage backed by a `BTreeMap`, mirroring the host's flat byte keyspace.
///
/// Tests construct collections over this backend and exercise the same code
/// paths a real host would; the raw inspection methods let them assert on
/// the persisted key layout directly.
#[derive(Clone, Debug, Default)]
pub struct TestStorage {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl TestStorage {
    /// Number of stored keys across all collections.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether nothing at all is stored.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether the exact full key is present.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.data.contains_key(key)
    }

    /// All stored full keys, in lexicographic order.
    pub fn raw_keys(&self) -> impl Iterator<Item = &[u8]> {
        self.data.keys().map(Vec::as_slice)
    }
}

impl StorageRead for TestStorage {
    fn read_bytes(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.get(key).cloned())
    }

    fn has_key(&self, key: &[u8]) -> Result<bool> {
        Ok(self.data.contains_key(key))
    }
}

impl StorageWrite for TestStorage {
    fn write_bytes(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.data.remove(key);
        Ok(())
    }
}
