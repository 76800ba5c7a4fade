//! CRC-32/MPEG-2 checksum primitive (ISO/IEC 13818-1, Annex B).
//!
//! Table-driven, seeded with all-ones, no final complement. The lookup
//! table is generated once and is immutable afterwards, so it is safe to
//! share across any number of concurrent engine instances.

use crc::{CRC_32_MPEG_2, Crc, Digest};

/// Size of the CRC-32 trailer in bytes.
pub const SIZE: usize = 4;

static CRC_MPEG: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

/// One-shot checksum over a byte slice.
pub fn checksum(data: &[u8]) -> u32 {
    CRC_MPEG.checksum(data)
}

/// Returns a running digest for incremental computation: feed successive
/// byte ranges with `update` and read the accumulator with `finalize`.
pub fn digest() -> Digest<'static, u32> {
    CRC_MPEG.digest()
}
