//! Collection headers.
//!
//! Every collection keeps a small fixed record under `prefix ‖ META_SEP`
//! holding its length, kind tag, generation counter and codec version. The
//! header is created by the first mutating operation; read-only operations
//! on an absent collection observe length and generation zero.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::codec::CODEC_VERSION;
use crate::key::Prefix;
use crate::{Error, Result, StorageRead, StorageWrite};

/// Kind tag pinned into a collection's header on first creation. A prefix
/// keeps its kind for as long as its header exists; opening a handle of a
/// different kind fails on the first header read.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize,
)]
pub enum CollectionKind {
    /// Indexed sequence of values
    Sequence,
    /// Non-iterable key-value map
    LookupMap,
    /// Non-iterable set
    LookupSet,
    /// Iterable key-value map
    IterableMap,
    /// Iterable set
    IterableSet,
    /// Key-sorted iterable map
    OrderedMap,
}

impl CollectionKind {
    fn to_byte(self) -> u8 {
        match self {
            Self::Sequence => 1,
            Self::LookupMap => 2,
            Self::LookupSet => 3,
            Self::IterableMap => 4,
            Self::IterableSet => 5,
            Self::OrderedMap => 6,
        }
    }

    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Sequence),
            2 => Some(Self::LookupMap),
            3 => Some(Self::LookupSet),
            4 => Some(Self::IterableMap),
            5 => Some(Self::IterableSet),
            6 => Some(Self::OrderedMap),
            _ => None,
        }
    }
}

impl Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sequence => "sequence",
            Self::LookupMap => "lookup map",
            Self::LookupSet => "lookup set",
            Self::IterableMap => "iterable map",
            Self::IterableSet => "iterable set",
            Self::OrderedMap => "ordered map",
        };
        write!(f, "{}", name)
    }
}

/// Length of the serialized header record.
pub const HEADER_LEN: usize = 19;

/// A collection's header record.
///
/// The wire layout is fixed:
/// `length: u64-be ‖ kind: u8 ‖ generation: u64-be ‖ codec-version: u16-be`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Header {
    /// Number of elements in the collection
    pub length: u64,
    /// Kind tag pinned at creation
    pub kind: CollectionKind,
    /// Counter bumped by every mutation, captured by iterators
    pub generation: u64,
    /// Version of the value codec the entries were written with
    pub codec_version: u16,
}

impl Header {
    pub(crate) fn new(kind: CollectionKind) -> Self {
        Self {
            length: 0,
            kind,
            generation: 0,
            codec_version: CODEC_VERSION,
        }
    }

    pub(crate) fn to_bytes(self) -> [u8; HEADER_LEN] {
        let mut bytes = [0; HEADER_LEN];
        bytes[0..8].copy_from_slice(&self.length.to_be_bytes());
        bytes[8] = self.kind.to_byte();
        bytes[9..17].copy_from_slice(&self.generation.to_be_bytes());
        bytes[17..19].copy_from_slice(&self.codec_version.to_be_bytes());
        bytes
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let fixed: &[u8; HEADER_LEN] = bytes.try_into().map_err(|_| {
            Error::Decode(format!(
                "expected a {} byte header, got {} bytes",
                HEADER_LEN,
                bytes.len()
            ))
        })?;
        let kind = CollectionKind::from_byte(fixed[8]).ok_or_else(|| {
            Error::Decode(format!("unknown collection kind {:#04x}", fixed[8]))
        })?;
        let codec_version =
            u16::from_be_bytes(fixed[17..19].try_into().unwrap());
        if codec_version != CODEC_VERSION {
            return Err(Error::Decode(format!(
                "incompatible codec version {}, this build supports {}",
                codec_version, CODEC_VERSION
            )));
        }
        Ok(Self {
            length: u64::from_be_bytes(fixed[0..8].try_into().unwrap()),
            kind,
            generation: u64::from_be_bytes(fixed[9..17].try_into().unwrap()),
            codec_version,
        })
    }
}

/// Read the header under `prefix`, enforcing the kind pin.
pub(crate) fn load<S>(
    storage: &S,
    prefix: &Prefix,
    expected: CollectionKind,
) -> Result<Option<Header>>
where
    S: StorageRead + ?Sized,
{
    let Some(raw) = storage.read_bytes(&prefix.meta_key())? else {
        return Ok(None);
    };
    let header = Header::from_bytes(&raw)?;
    if header.kind != expected {
        return Err(Error::KindMismatch {
            prefix: prefix.clone(),
            expected,
            found: header.kind,
        });
    }
    Ok(Some(header))
}

/// Read the header under `prefix` or start a fresh one for the first
/// mutation of the collection.
pub(crate) fn load_or_new<S>(
    storage: &S,
    prefix: &Prefix,
    kind: CollectionKind,
) -> Result<Header>
where
    S: StorageRead + ?Sized,
{
    Ok(load(storage, prefix, kind)?.unwrap_or_else(|| Header::new(kind)))
}

/// Write the header back. Callers bump the generation before storing.
pub(crate) fn store<S>(
    storage: &mut S,
    prefix: &Prefix,
    header: &Header,
) -> Result<()>
where
    S: StorageWrite + ?Sized,
{
    storage.write_bytes(&prefix.meta_key(), &header.to_bytes())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_header_wire_layout() {
        let header = Header {
            length: 3,
            kind: CollectionKind::OrderedMap,
            generation: 17,
            codec_version: CODEC_VERSION,
        };
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(&bytes[0..8], &3_u64.to_be_bytes());
        assert_eq!(bytes[8], 6);
        assert_eq!(&bytes[9..17], &17_u64.to_be_bytes());
        assert_eq!(Header::from_bytes(&bytes).unwrap(), header);
    }

    #[test]
    fn test_header_decode_failures() {
        let header = Header::new(CollectionKind::Sequence);
        let bytes = header.to_bytes();

        assert!(matches!(
            Header::from_bytes(&bytes[..HEADER_LEN - 1]),
            Err(Error::Decode(_))
        ));

        let mut bad_kind = bytes;
        bad_kind[8] = 0xAA;
        assert!(matches!(
            Header::from_bytes(&bad_kind),
            Err(Error::Decode(_))
        ));

        let mut bad_version = header.to_bytes();
        bad_version[17..19].copy_from_slice(&999_u16.to_be_bytes());
        assert!(matches!(
            Header::from_bytes(&bad_version),
            Err(Error::Decode(_))
        ));
    }
}
