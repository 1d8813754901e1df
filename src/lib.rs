//! Persistent collections for smart-contract storage.
//!
//! The only durable primitive a contract runtime offers is a flat
//! byte-keyed key/value store, and every byte written to it is paid for.
//! The collections in this crate keep their elements externally in that
//! store and load them lazily: no operation materializes a whole
//! collection in memory unless the caller explicitly iterates it to the
//! end. Handles are plain values holding a storage [`Prefix`]; opening one
//! allocates no host resources, and all state lives behind the
//! [`StorageRead`]/[`StorageWrite`] boundary passed into every operation.
//!
//! Available kinds:
//!
//! - [`Sequence`]: indexed, append-friendly ordered container
//! - [`LookupMap`] / [`LookupSet`]: non-iterable key-value and key-only
//!   stores with O(1) operations
//! - [`IterableMap`] / [`IterableSet`]: the same lookup semantics plus a
//!   companion key index enabling enumeration and wholesale clearing
//! - [`OrderedMap`]: key-sorted map with `floor`/`ceiling`/`range` queries
//!
//! ```
//! use plinth::{Collection, IterableMap, Prefix};
//! use plinth::testing::TestStorage;
//!
//! # fn main() -> plinth::Result<()> {
//! let mut storage = TestStorage::default();
//! let balances = IterableMap::<String, u64>::open(Prefix::new("balances")?);
//!
//! balances.insert(&mut storage, "alice".to_string(), 100)?;
//! balances.insert(&mut storage, "bob".to_string(), 50)?;
//! assert_eq!(balances.get(&storage, &"alice".to_string())?, Some(100));
//! assert_eq!(balances.len(&storage)?, 2);
//!
//! for entry in balances.iter(&storage)? {
//!     let (account, amount) = entry?;
//!     assert!(amount <= 100, "{account} holds too much");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Iterators over a collection capture its generation counter at creation
//! and fail with [`Error::InvalidatedIter`] if the collection is mutated
//! underneath them; restarting the iteration recovers. See the
//! [`collections`] module for the cursor protocol.

pub mod codec;
pub mod collections;
mod error;
pub mod key;
pub mod meta;
pub mod testing;

pub use collections::{
    Collection, IterableMap, IterableSet, LookupMap, LookupSet, OrderedMap,
    Sequence,
};
pub use error::{Error, OptionExt, Result};
pub use key::{Prefix, StorageKey};
pub use meta::{CollectionKind, Header};

use borsh::{BorshDeserialize, BorshSerialize};

/// Read interface of the storage backend.
///
/// This is the only surface through which any part of the crate reads the
/// host; a backend is selected at the call site, which is what lets tests
/// drive the exact production code paths against an in-memory store (see
/// [`testing::TestStorage`]). Host failures must be reported through
/// [`Error::Host`] and are never caught by the library.
pub trait StorageRead {
    /// Read the raw bytes stored under a full key, if any.
    fn read_bytes(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Check whether any value is stored under a full key.
    fn has_key(&self, key: &[u8]) -> Result<bool>;

    /// Read and decode the value stored under a full key, if any.
    fn read<T: BorshDeserialize>(&self, key: &[u8]) -> Result<Option<T>> {
        match self.read_bytes(key)? {
            Some(bytes) => Ok(Some(codec::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }
}

/// Write interface of the storage backend.
pub trait StorageWrite {
    /// Store raw bytes under a full key, overwriting any prior value.
    fn write_bytes(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Remove the value stored under a full key, if any.
    fn delete(&mut self, key: &[u8]) -> Result<()>;

    /// Encode and store a value under a full key.
    fn write<T: BorshSerialize>(&mut self, key: &[u8], value: &T) -> Result<()> {
        let bytes = codec::to_bytes(value)?;
        self.write_bytes(key, &bytes)
    }
}
