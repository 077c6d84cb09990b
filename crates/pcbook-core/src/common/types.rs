//! # Shared Catalog Constants and Conversions
//!
//! Constants and helpers that both the server and clients must agree on.
//!
//! - [`MAX_IMAGE_SIZE`] - default upper bound for an uploaded image payload
//! - [`DEFAULT_CHUNK_SIZE`] - chunk size clients use when streaming an image
//! - [`memory_to_bits`] - normalizes a [`Memory`] to bits so values with
//!   different units compare correctly

use crate::proto::{Memory, memory::Unit};

/// Default maximum size (in bytes) of an uploaded image: 2 MiB.
pub const MAX_IMAGE_SIZE: usize = 2 << 20;

/// Number of payload bytes a client packs into each `UploadImage` chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Converts a [`Memory`] value to bits, saturating at `u64::MAX`.
///
/// Unknown units count as zero bits, so they never satisfy a lower bound
/// unless the bound is zero as well.
pub fn memory_to_bits(memory: &Memory) -> u64 {
    let shift = match memory.unit() {
        Unit::Bit => 0,
        Unit::Byte => 3,
        Unit::Kilobyte => 13,
        Unit::Megabyte => 23,
        Unit::Gigabyte => 33,
        Unit::Terabyte => 43,
        Unit::Unknown => return 0,
    };

    if memory.value == 0 {
        return 0;
    }
    if memory.value.leading_zeros() < shift {
        return u64::MAX;
    }
    memory.value << shift
}
