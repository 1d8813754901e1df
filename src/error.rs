//! Error types shared across the collections.

use data_encoding::HEXLOWER;
use thiserror::Error;

use crate::key::Prefix;
use crate::meta::CollectionKind;

/// Alias of a `Result` with the crate's [`enum@Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by collection operations.
///
/// Every variant is a distinct, matchable condition; nothing is retried
/// inside the library. Host failures pass through untouched in
/// [`Error::Host`].
#[derive(Error, Debug)]
pub enum Error {
    /// An index outside of a sequence's current bounds.
    #[error("index {index} is out of range, the length is {len}")]
    IndexOutOfRange {
        /// The offending index
        index: u64,
        /// The length of the collection at the time of the call
        len: u64,
    },

    /// A removal was requested from a collection with no elements.
    #[error("the collection is empty")]
    Empty,

    /// A strict lookup or removal found no entry under the key.
    #[error("no entry under the key {key}")]
    KeyAbsent {
        /// Hex rendering of the key's canonical storage bytes
        key: String,
    },

    /// The prefix already holds a collection of a different kind.
    #[error("the prefix \"{prefix}\" holds a {found}, expected a {expected}")]
    KindMismatch {
        /// Prefix under which the header was found
        prefix: Prefix,
        /// Kind declared by the handle
        expected: CollectionKind,
        /// Kind recorded in storage
        found: CollectionKind,
    },

    /// A value could not be serialized for storage.
    #[error("cannot encode a value for storage: {0}")]
    Encode(String),

    /// Stored bytes could not be deserialized. Indicates corruption or a
    /// schema drift and is fatal to the operation that hit it.
    #[error("cannot decode stored bytes: {0}")]
    Decode(String),

    /// The collection was mutated after the iterator captured its
    /// generation. Recoverable: restart the iteration.
    #[error("iterator invalidated by a mutation of the underlying collection")]
    InvalidatedIter,

    /// A prefix or child tag with no bytes in it.
    #[error("a collection prefix or tag must not be empty")]
    EmptyPrefix,

    /// A prefix or child tag carrying a byte from the reserved band.
    #[error(
        "byte {byte:#04x} at offset {offset} is reserved for storage key \
         composition"
    )]
    ReservedPrefixByte {
        /// The reserved byte
        byte: u8,
        /// Its offset within the rejected segment
        offset: usize,
    },

    /// An entry that the collection's bookkeeping promises to exist was
    /// absent from storage.
    #[error("a tracked entry was unexpectedly missing at key {key}")]
    MissingEntry {
        /// Hex rendering of the full storage key
        key: String,
    },

    /// Passthrough of a storage host failure.
    #[error("host storage failure: {0}")]
    Host(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wrap a backend failure for passthrough.
    pub fn host<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Host(error.into())
    }

    pub(crate) fn key_absent(encoded_key: &[u8]) -> Self {
        Self::KeyAbsent {
            key: HEXLOWER.encode(encoded_key),
        }
    }

    pub(crate) fn missing_entry(full_key: &[u8]) -> Self {
        Self::MissingEntry {
            key: HEXLOWER.encode(full_key),
        }
    }
}

/// Extension to turn an absent optional into a strict lookup failure.
pub trait OptionExt<T> {
    /// Transforms `Option<T>` into `Result<T>`, mapping `None` to
    /// [`Error::KeyAbsent`] carrying the given encoded key.
    fn ok_or_absent(self, encoded_key: &[u8]) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_absent(self, encoded_key: &[u8]) -> Result<T> {
        self.ok_or_else(|| Error::key_absent(encoded_key))
    }
}
