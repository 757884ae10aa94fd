//! The packed string tensor format: a whole batch of strings in one `u8` buffer.
//!
//! All integers are 32 bit signed, in host byte order:
//!
//! ```text
//! [0..4)          batch size N
//! [4..8)          begin offset of the first string, 0 when encoded
//! [8..8+4N)       end offset of each string
//! [8+4N..)        the character bytes, up to the last end offset
//! ```
//!
//! String `i` begins where string `i - 1` ends, so only batches whose strings are laid out back
//! to back can be represented.  Encoding therefore copies the strings into a fresh contiguous
//! pool; any gaps between the ranges of a decomposed batch, and any bytes outside every range,
//! are dropped.
use snafu::{ensure, OptionExt};
use tracing::*;

use crate::batch::{offset, DecomposedStrings};
use crate::error::*;

/// Size of the batch size header
pub const HEADER_LEN: usize = 4;

const OFFSET_LEN: usize = std::mem::size_of::<i32>();

/// An encoded batch of strings.  Always holds a well formed buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackedStrings {
    bytes: Vec<u8>,
}

impl PackedStrings {
    /// Take ownership of a buffer, checking that it is in the packed format.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        decode(&bytes)?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn batch_size(&self) -> usize {
        read_i32(&self.bytes[..HEADER_LEN]) as usize
    }

    /// Decode into a view that borrows the character bytes of this buffer
    pub fn decode(&self) -> Result<DecomposedStrings<'_>> {
        decode(&self.bytes)
    }
}

/// Encode a batch into the packed format.
///
/// Fails if the repacked character pool, or the number of strings, doesn't fit in an `i32`.
pub fn encode(strings: &DecomposedStrings<'_>) -> Result<PackedStrings> {
    let batch_size = offset(strings.len())?;
    let total = strings.total_len();
    offset(total)?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + OFFSET_LEN * (strings.len() + 1) + total);
    bytes.extend_from_slice(&batch_size.to_ne_bytes());
    bytes.extend_from_slice(&0i32.to_ne_bytes());

    let mut end = 0;
    for string in strings.iter() {
        end += string.len();
        // Bounded by `total`, which was checked above
        bytes.extend_from_slice(&(end as i32).to_ne_bytes());
    }
    for string in strings.iter() {
        bytes.extend_from_slice(string);
    }

    trace!(batch_size, total, "Packed strings");
    Ok(PackedStrings { bytes })
}

/// Decode a packed buffer without copying the character bytes.
///
/// Bytes after the final end offset are ignored.
pub fn decode(bytes: &[u8]) -> Result<DecomposedStrings<'_>> {
    let header = bytes
        .get(..HEADER_LEN)
        .context(TruncatedHeaderSnafu { len: bytes.len() })?;
    let batch_size = read_i32(header);
    ensure!(batch_size >= 0, NegativeBatchSizeSnafu { batch_size });

    let batch_size = batch_size as usize;
    if batch_size == 0 {
        return Ok(DecomposedStrings::empty());
    }

    let required = HEADER_LEN + OFFSET_LEN * (batch_size + 1);
    ensure!(
        bytes.len() >= required,
        TruncatedOffsetsSnafu {
            batch_size,
            required,
            actual: bytes.len(),
        }
    );

    let offsets = bytes[HEADER_LEN..required]
        .chunks_exact(OFFSET_LEN)
        .map(read_i32)
        .collect::<Vec<_>>();
    let chars = &bytes[required..];

    let num_chars = offsets[batch_size];
    ensure!(
        num_chars >= 0,
        InvalidRangeSnafu {
            index: batch_size - 1,
            begin: offsets[batch_size - 1],
            end: num_chars,
        }
    );
    let num_chars = num_chars as usize;
    ensure!(
        num_chars <= chars.len(),
        TruncatedCharsSnafu {
            required: num_chars,
            actual: chars.len(),
        }
    );

    let begins = offsets[..batch_size].to_vec();
    let mut ends = offsets;
    ends.remove(0);

    DecomposedStrings::new(begins, ends, &chars[..num_chars])
}

fn read_i32(bytes: &[u8]) -> i32 {
    let mut word = [0u8; OFFSET_LEN];
    word.copy_from_slice(bytes);
    i32::from_ne_bytes(word)
}
