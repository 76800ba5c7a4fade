//! Program Specific Information (ISO/IEC 13818-1, 2.4.4): reassembly of
//! CRC-protected sections from TS packets, and the inverse packetization.

mod assembler;
mod packetizer;

pub use assembler::PsiAssembler;
pub use packetizer::{Packetizer, SectionBuilder, SectionItem};

use thiserror::Error;

/// First 3 bytes of a PSI section: table id and section length.
pub const PSI_HEADER_SIZE: usize = 3;

/// The maximum number of bytes in an ISO 13818-1 defined table section is
/// 1024; a private section may reach 4096. Includes [`PSI_HEADER_SIZE`].
pub const PSI_MAX_SIZE: usize = 4096;

/// Per-section assembly failure. All variants are locally recoverable: the
/// assembler resets and resumes on the next payload unit start.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PsiError {
    /// PUSI pointer field reaches past the packet payload.
    #[error("psi: pointer field out of range")]
    PointerRange,

    /// Continuity counter broke the +1 mod 16 sequence.
    #[error("psi: discontinuity received")]
    Discontinuity,

    /// Declared section length exceeds the maximum, or the pointer-delimited
    /// bytes did not exactly complete the section in progress.
    #[error("psi: assemble failed")]
    Assemble,

    /// Section envelope violates the bounds of its well-known table id.
    #[error("psi: invalid format")]
    Format,

    /// CRC-32 trailer does not match. The section identity fields remain
    /// populated for diagnostics.
    #[error("psi: checksum not match (expected {expected:#010X}, actual {actual:#010X})")]
    Checksum { expected: u32, actual: u32 },
}

#[cfg(test)]
pub(crate) mod testing {
    use super::packetizer::{SectionBuilder, SectionItem};
    use crate::crc32;

    /// Minimal single-section table for tests: a fixed 8-byte header with
    /// one descriptor block as the only content.
    pub(crate) struct TestTable {
        pub header: [u8; 8],
        pub body: Vec<u8>,
    }

    impl TestTable {
        pub fn new(table_id: u8, version: u8, body: Vec<u8>) -> TestTable {
            let mut header = [0u8; 8];
            header[0] = table_id;
            header[1] = 0xF0;
            header[3] = 0xAA; // table id extension
            header[4] = 0xBB;
            header[5] = 0xC0 | (version << 1) | 0x01;
            TestTable { header, body }
        }

        pub fn section_len(&self) -> usize {
            self.header.len() + self.body.len() + crc32::SIZE
        }
    }

    impl SectionBuilder for TestTable {
        fn section_size(&self, item: SectionItem) -> usize {
            match item {
                SectionItem::Descriptors => self.section_len(),
                SectionItem::Item(_) => 0,
            }
        }

        fn section_header(&mut self, _item: SectionItem) -> &[u8] {
            &self.header
        }

        fn section_item(&mut self, item: SectionItem) -> Option<&[u8]> {
            match item {
                SectionItem::Descriptors => Some(&self.body),
                SectionItem::Item(_) => None,
            }
        }
    }
}
