//! Storage prefixes and canonical key encoding.
//!
//! The host exposes a single flat byte keyspace, so prefix discipline is the
//! only mechanism keeping collections apart. A [`Prefix`] is a validated
//! byte string owning everything stored under it; the reserved separator
//! bytes below structure that ownership. All separators live in the band
//! `0xF5..=0xFF`, which no UTF-8 text can contain, so any textual prefix or
//! tag is automatically valid.

use std::fmt::{self, Display};
use std::str::FromStr;

use borsh::{BorshDeserialize, BorshSerialize};
use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Marks a collection's header record: `prefix ‖ META_SEP`.
pub const META_SEP: u8 = 0xFF;
/// Marks an entry payload: `prefix ‖ ENTRY_SEP ‖ encoded-key`.
pub const ENTRY_SEP: u8 = 0xFE;
/// Marks the key-index sequence of an iterable collection:
/// `prefix ‖ INDEX_SEP` is the index's own prefix.
pub const INDEX_SEP: u8 = 0xFD;
/// Marks the reverse (key to slot position) index of an iterable map or
/// set: `prefix ‖ REVERSE_SEP ‖ ENTRY_SEP ‖ encoded-key`.
pub const REVERSE_SEP: u8 = 0xFC;
/// Joins a parent prefix with a child tag: `parent ‖ CHILD_SEP ‖ tag`.
pub const CHILD_SEP: u8 = 0xFB;

/// The lowest reserved byte. User-supplied prefix bytes and child tags must
/// all be below this value.
pub const RESERVED_BAND: u8 = 0xF5;

/// A byte-string namespace identifying one collection's storage.
///
/// Two handles with equal prefixes denote the same stored collection.
/// A prefix exclusively owns every full key composed from it; nothing else
/// may write under it.
#[derive(
    Clone,
    BorshSerialize,
    BorshDeserialize,
    Debug,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Serialize,
    Deserialize,
)]
pub struct Prefix {
    bytes: Vec<u8>,
}

impl Prefix {
    /// Create a prefix from the given bytes.
    ///
    /// Fails with [`Error::EmptyPrefix`] on empty input and
    /// [`Error::ReservedPrefixByte`] if any byte falls into the reserved
    /// band.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        validate_segment(&bytes)?;
        Ok(Self { bytes })
    }

    /// Derive a child prefix for nesting one collection under another,
    /// e.g. a per-account sequence inside a registry of accounts.
    ///
    /// Children derived from the same parent with different tags are
    /// byte-disjoint from each other and from the parent's own entries.
    /// The tag is validated like a prefix.
    pub fn child(&self, tag: impl AsRef<[u8]>) -> Result<Self> {
        let tag = tag.as_ref();
        validate_segment(tag)?;
        let mut bytes =
            Vec::with_capacity(self.bytes.len() + 1 + tag.len());
        bytes.extend_from_slice(&self.bytes);
        bytes.push(CHILD_SEP);
        bytes.extend_from_slice(tag);
        Ok(Self { bytes })
    }

    /// The raw prefix bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Full key of this collection's header.
    pub(crate) fn meta_key(&self) -> Vec<u8> {
        self.compose(META_SEP, &[])
    }

    /// Full key of the entry stored under the given encoded logical key.
    pub(crate) fn entry_key(&self, encoded_key: &[u8]) -> Vec<u8> {
        self.compose(ENTRY_SEP, encoded_key)
    }

    /// Prefix of the companion key-index sequence.
    pub(crate) fn index_prefix(&self) -> Self {
        let mut bytes = self.bytes.clone();
        bytes.push(INDEX_SEP);
        Self { bytes }
    }

    /// Prefix of the reverse (key to slot position) index.
    pub(crate) fn reverse_prefix(&self) -> Self {
        let mut bytes = self.bytes.clone();
        bytes.push(REVERSE_SEP);
        Self { bytes }
    }

    fn compose(&self, separator: u8, suffix: &[u8]) -> Vec<u8> {
        let mut key =
            Vec::with_capacity(self.bytes.len() + 1 + suffix.len());
        key.extend_from_slice(&self.bytes);
        key.push(separator);
        key.extend_from_slice(suffix);
        key
    }
}

fn validate_segment(bytes: &[u8]) -> Result<()> {
    if bytes.is_empty() {
        return Err(Error::EmptyPrefix);
    }
    if let Some(offset) = bytes.iter().position(|b| *b >= RESERVED_BAND) {
        return Err(Error::ReservedPrefixByte {
            byte: bytes[offset],
            offset,
        });
    }
    Ok(())
}

impl TryFrom<&str> for Prefix {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value.as_bytes().to_vec())
    }
}

impl FromStr for Prefix {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.try_into()
    }
}

impl Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.bytes.split(|b| *b == CHILD_SEP).enumerate()
        {
            if i > 0 {
                write!(f, "/")?;
            }
            match std::str::from_utf8(segment) {
                Ok(text) => write!(f, "{}", text)?,
                Err(_) => write!(f, "0x{}", HEXLOWER.encode(segment))?,
            }
        }
        Ok(())
    }
}

/// A logical collection key with a canonical byte encoding.
///
/// Equal keys must produce byte-equal encodings regardless of how they were
/// obtained, and the encoding must be stable across process restarts. For
/// types that are also used as [`OrderedMap`] keys, the mapping must
/// preserve the ordering of `Self`: `a < b` exactly when
/// `a.to_key_bytes() < b.to_key_bytes()` lexicographically. Every impl
/// provided by this crate upholds that law; custom impls must too, or
/// ordered iteration breaks.
///
/// [`OrderedMap`]: crate::OrderedMap
pub trait StorageKey: Sized {
    /// Encode into canonical storage bytes.
    fn to_key_bytes(&self) -> Vec<u8>;

    /// Decode from canonical storage bytes.
    fn from_key_bytes(bytes: &[u8]) -> Result<Self>;
}

impl StorageKey for String {
    fn to_key_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    fn from_key_bytes(bytes: &[u8]) -> Result<Self> {
        String::from_utf8(bytes.to_vec())
            .map_err(|err| Error::Decode(err.to_string()))
    }
}

impl StorageKey for Vec<u8> {
    fn to_key_bytes(&self) -> Vec<u8> {
        self.clone()
    }

    fn from_key_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bytes.to_vec())
    }
}

impl StorageKey for bool {
    fn to_key_bytes(&self) -> Vec<u8> {
        vec![u8::from(*self)]
    }

    fn from_key_bytes(bytes: &[u8]) -> Result<Self> {
        match bytes {
            [0] => Ok(false),
            [1] => Ok(true),
            _ => Err(Error::Decode(
                "expected a single boolean byte".to_string(),
            )),
        }
    }
}

/// Implement [`StorageKey`] for an integer pair via fixed-width big-endian
/// bytes. The unsigned form is its big-endian representation; the signed
/// form is complemented with the type's minimum before encoding so that
/// lexicographic byte order keeps matching numeric order.
macro_rules! impl_int_storage_key {
    ($unsigned:ty, $signed:ty, $len:literal) => {
        impl StorageKey for $unsigned {
            fn to_key_bytes(&self) -> Vec<u8> {
                self.to_be_bytes().to_vec()
            }

            fn from_key_bytes(bytes: &[u8]) -> Result<Self> {
                let fixed: [u8; $len] = bytes.try_into().map_err(|_| {
                    Error::Decode(format!(
                        "expected {} key bytes, got {}",
                        $len,
                        bytes.len()
                    ))
                })?;
                Ok(<$unsigned>::from_be_bytes(fixed))
            }
        }

        impl StorageKey for $signed {
            fn to_key_bytes(&self) -> Vec<u8> {
                #[allow(clippy::cast_sign_loss)]
                let complemented = (*self ^ <$signed>::MIN) as $unsigned;
                complemented.to_key_bytes()
            }

            fn from_key_bytes(bytes: &[u8]) -> Result<Self> {
                let complemented = <$unsigned>::from_key_bytes(bytes)?;
                #[allow(clippy::cast_possible_wrap)]
                let signed = (complemented as $signed) ^ <$signed>::MIN;
                Ok(signed)
            }
        }
    };
}

impl_int_storage_key!(u8, i8, 1);
impl_int_storage_key!(u16, i16, 2);
impl_int_storage_key!(u32, i32, 4);
impl_int_storage_key!(u64, i64, 8);
impl_int_storage_key!(u128, i128, 16);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_prefix_validation() {
        assert!(Prefix::new("balances".as_bytes().to_vec()).is_ok());
        assert!(matches!(Prefix::new(vec![]), Err(Error::EmptyPrefix)));
        let err = Prefix::new(vec![b'a', CHILD_SEP, b'b']).unwrap_err();
        assert!(matches!(
            err,
            Error::ReservedPrefixByte {
                byte: CHILD_SEP,
                offset: 1
            }
        ));
    }

    #[test]
    fn test_child_prefixes_are_disjoint() {
        let parent: Prefix = "accounts".parse().unwrap();
        let alice = parent.child("alice").unwrap();
        let bob = parent.child("bob").unwrap();
        assert_ne!(alice, bob);
        assert_ne!(alice, parent);
        // A child's keys never collide with the parent's own entries
        assert_ne!(
            alice.meta_key(),
            parent.entry_key("alice".as_bytes())
        );
        assert!(parent.child("").is_err());
        assert!(parent.child([0xFF]).is_err());
    }

    #[test]
    fn test_composed_keys_are_distinct() {
        let prefix: Prefix = "p".parse().unwrap();
        let meta = prefix.meta_key();
        let entry = prefix.entry_key(b"k");
        let index_meta = prefix.index_prefix().meta_key();
        let reverse = prefix.reverse_prefix().entry_key(b"k");
        let keys = [&meta, &entry, &index_meta, &reverse];
        for (i, a) in keys.iter().enumerate() {
            for b in keys.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_int_keys_preserve_order() {
        let unsigned: Vec<u64> = vec![0, 1, 9, 10, 255, 256, u64::MAX];
        let encoded: Vec<_> =
            unsigned.iter().map(|x| x.to_key_bytes()).collect();
        let mut sorted = encoded.clone();
        sorted.sort();
        assert_eq!(encoded, sorted);

        let signed: Vec<i64> = vec![i64::MIN, -256, -1, 0, 1, 256, i64::MAX];
        let encoded: Vec<_> =
            signed.iter().map(|x| x.to_key_bytes()).collect();
        let mut sorted = encoded.clone();
        sorted.sort();
        assert_eq!(encoded, sorted);
    }

    #[test]
    fn test_int_keys_round_trip() {
        for value in [i32::MIN, -7, 0, 7, i32::MAX] {
            let bytes = value.to_key_bytes();
            assert_eq!(i32::from_key_bytes(&bytes).unwrap(), value);
        }
        assert!(u64::from_key_bytes(&[0; 4]).is_err());
    }
}
