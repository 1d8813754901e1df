//! Value serialization boundary.
//!
//! Every value that crosses into storage is encoded here, and every stored
//! byte string is decoded here. The encoding is borsh: deterministic,
//! canonical over the supported type universe, and stable across process
//! restarts, which is what makes stored entries comparable and replayable
//! across contract invocations.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::{Error, Result};

/// Version tag recorded in every collection header. Bumped when the value
/// encoding changes incompatibly; headers carrying a different version are
/// refused at decode time.
pub const CODEC_VERSION: u16 = 1;

/// Encode a value into its canonical storage bytes.
pub fn to_bytes<T: BorshSerialize>(value: &T) -> Result<Vec<u8>> {
    borsh::to_vec(value).map_err(|err| Error::Encode(err.to_string()))
}

/// Decode a value from stored bytes.
pub fn from_bytes<T: BorshDeserialize>(bytes: &[u8]) -> Result<T> {
    T::try_from_slice(bytes).map_err(|err| Error::Decode(err.to_string()))
}
