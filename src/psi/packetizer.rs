//! Section packetization into TS packets.

use std::mem;

use crc::Digest;

use crate::crc32;
use crate::packet::{PACKET_SIZE, TsPacket};

use super::{PSI_HEADER_SIZE, PSI_MAX_SIZE};

/// Position within a table's section content: the table-level descriptor
/// block first, then numbered items shared across all sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionItem {
    /// The leading descriptor block of a section run (may be empty).
    Descriptors,
    /// Numbered content items.
    Item(usize),
}

impl SectionItem {
    fn advance(self) -> SectionItem {
        match self {
            SectionItem::Descriptors => SectionItem::Item(0),
            SectionItem::Item(n) => SectionItem::Item(n + 1),
        }
    }
}

/// Section content contract implemented by table encoders and consumed by
/// [`Packetizer`].
pub trait SectionBuilder {
    /// Size in bytes of the section that starts at `item`, including the
    /// header and the CRC trailer. Zero ends packetization.
    fn section_size(&self, item: SectionItem) -> usize;

    /// Fixed-position header bytes (everything before the content) of the
    /// section starting at `item`. The implementation should reset the
    /// section number for `Descriptors` and advance it for later starts;
    /// the 12-bit section length subfield is patched by the packetizer.
    fn section_header(&mut self, item: SectionItem) -> &[u8];

    /// Content chunk at `item`: the descriptor block for `Descriptors`, an
    /// item body otherwise. `None` ends the content of the current section.
    /// A chunk interrupted by a packet boundary is requested again with the
    /// same `item` and must return the same bytes.
    fn section_item(&mut self, item: SectionItem) -> Option<&[u8]>;
}

/// Splits the sections of a [`SectionBuilder`] across TS packets.
///
/// Call [`next_packet`](Packetizer::next_packet) with the same packet until
/// it returns `false`; the packetizer sets the payload flag, the payload
/// unit start indicator, the PUSI pointer, and advances the continuity
/// counter from whatever initial value the packet carries.
pub struct Packetizer<B> {
    inner: B,
    item: SectionItem,
    skip: usize,
    fill: usize,
    size: usize,
    digest: Digest<'static, u32>,
    crc: u32,
    started: bool,
}

impl<B: std::fmt::Debug> std::fmt::Debug for Packetizer<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packetizer")
            .field("inner", &self.inner)
            .field("item", &self.item)
            .field("fill", &self.fill)
            .field("size", &self.size)
            .finish()
    }
}

impl<B: SectionBuilder> Packetizer<B> {
    pub fn new(inner: B) -> Packetizer<B> {
        Packetizer {
            inner,
            item: SectionItem::Descriptors,
            skip: 0,
            fill: 0,
            size: 0,
            digest: crc32::digest(),
            crc: 0,
            started: false,
        }
    }

    pub fn get_ref(&self) -> &B {
        &self.inner
    }

    pub fn into_inner(self) -> B {
        self.inner
    }

    /// Fills `packet` with the next 188 bytes of section data. Returns
    /// `false`, leaving the packet untouched, once the builder reports no
    /// further sections.
    pub fn next_packet(&mut self, packet: &mut TsPacket) -> bool {
        let mut packet_skip = 4;

        if self.fill == self.size {
            // start the next section
            let size = self.inner.section_size(self.item);
            if size == 0 {
                return false;
            }

            debug_assert!(
                (PSI_HEADER_SIZE + crc32::SIZE..=PSI_MAX_SIZE).contains(&size),
                "section size {size} out of range",
            );

            self.size = size;
            self.fill = 0;

            if self.started {
                packet.increment_cc();
            }
            packet.set_pusi();
            packet.set_payload();
            packet.as_mut_bytes()[4] = 0; // PUSI pointer
            packet_skip = 5;

            let header_len = {
                let header = self.inner.section_header(self.item);
                debug_assert!(header.len() >= PSI_HEADER_SIZE);
                debug_assert!(header.len() <= PACKET_SIZE - packet_skip);
                packet.as_mut_bytes()[packet_skip..packet_skip + header.len()]
                    .copy_from_slice(header);
                header.len()
            };

            // patch the 12-bit section length, preserving the flag bits
            let length = ((self.size - PSI_HEADER_SIZE) & 0x0FFF) as u16;
            let buf = packet.as_mut_bytes();
            buf[packet_skip + 1] = (buf[packet_skip + 1] & 0xF0) | (length >> 8) as u8;
            buf[packet_skip + 2] = length as u8;

            self.digest = crc32::digest();
            self.digest.update(&buf[packet_skip..packet_skip + header_len]);

            self.fill += header_len;
            packet_skip += header_len;
        } else {
            packet.increment_cc();
            packet.clear_pusi();
        }

        let Packetizer {
            inner,
            item,
            skip,
            fill,
            size,
            digest,
            crc,
            started,
        } = self;
        let buf = packet.as_mut_bytes();

        loop {
            if packet_skip == PACKET_SIZE {
                *started = true;
                return true;
            }

            // content complete: append the CRC trailer
            if *fill + crc32::SIZE == *size {
                if *skip == 0 {
                    *crc = mem::replace(digest, crc32::digest()).finalize();
                }

                while *skip < crc32::SIZE && packet_skip < PACKET_SIZE {
                    buf[packet_skip] = (*crc >> (24 - 8 * *skip)) as u8;
                    packet_skip += 1;
                    *skip += 1;
                }

                if *skip < crc32::SIZE {
                    // trailer continues in the next packet
                    *started = true;
                    return true;
                }

                *fill = *size;
                *skip = 0;

                // a section that ended inside its descriptor block still
                // starts the next one at the first item
                if let SectionItem::Descriptors = *item {
                    *item = SectionItem::Item(0);
                }

                if packet_skip == PACKET_SIZE {
                    *started = true;
                    return true;
                }

                break;
            }

            let Some(data) = inner.section_item(*item) else {
                break;
            };

            if data.is_empty() {
                *item = item.advance();
                continue;
            }

            if *skip == 0 {
                digest.update(data);
            }

            let n = (data.len() - *skip).min(PACKET_SIZE - packet_skip);
            buf[packet_skip..packet_skip + n].copy_from_slice(&data[*skip..*skip + n]);
            *skip += n;
            *fill += n;
            packet_skip += n;
            debug_assert!(*fill + crc32::SIZE <= *size, "section content overflow");

            if *skip == data.len() {
                *skip = 0;
                *item = item.advance();
            }
        }

        // stuff the remainder of the final packet of the section
        if packet_skip < PACKET_SIZE {
            buf[packet_skip..].copy_from_slice(&TsPacket::NULL.as_bytes()[packet_skip..]);
        }

        *started = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOCK_HEADER_SIZE: usize = 10;

    enum Layout {
        Single,
        FullPacket,
        TwoSections,
    }

    struct SectionMock {
        layout: Layout,
        header: [u8; MOCK_HEADER_SIZE],
        desc: Vec<u8>,
        items: Vec<Vec<u8>>,
    }

    impl SectionMock {
        fn new(layout: Layout) -> SectionMock {
            let (desc, items) = match layout {
                Layout::Single => (
                    vec![0x40, 0x03, 0xAA, 0xBB, 0xCC],
                    vec![(0..10u8).map(|z| 0xA0 + z).collect()],
                ),
                Layout::FullPacket => (
                    Vec::new(),
                    vec![(0..171u8).map(|z| 0x50 + z).collect()],
                ),
                Layout::TwoSections => (
                    Vec::new(),
                    vec![
                        (0..200u8).map(|z| 0x10 + z).collect(),
                        (0..200u8).map(|z| 0x20 + z).collect(),
                    ],
                ),
            };
            SectionMock {
                layout,
                header: [0; MOCK_HEADER_SIZE],
                desc,
                items,
            }
        }
    }

    impl SectionBuilder for SectionMock {
        fn section_size(&self, item: SectionItem) -> usize {
            match (&self.layout, item) {
                (Layout::Single, SectionItem::Descriptors) => {
                    MOCK_HEADER_SIZE + 5 + 10 + crc32::SIZE
                }
                (Layout::Single, SectionItem::Item(1)) => 0,
                (Layout::FullPacket, SectionItem::Descriptors) => {
                    MOCK_HEADER_SIZE + (183 - MOCK_HEADER_SIZE - 2) + crc32::SIZE
                }
                (Layout::FullPacket, SectionItem::Item(1)) => 0,
                (Layout::TwoSections, SectionItem::Descriptors)
                | (Layout::TwoSections, SectionItem::Item(1)) => {
                    MOCK_HEADER_SIZE + 200 + crc32::SIZE
                }
                (Layout::TwoSections, SectionItem::Item(2)) => 0,
                _ => unreachable!(),
            }
        }

        fn section_header(&mut self, item: SectionItem) -> &[u8] {
            match item {
                SectionItem::Descriptors => {
                    for (i, b) in self.header.iter_mut().enumerate() {
                        *b = (i + 10) as u8;
                    }
                    self.header[1] = 0xF0;
                    self.header[2] = 0x00;
                    self.header[6] = 0;
                    self.header[7] = 0;
                    self.header[8] = 0xF0;
                    self.header[9] = match self.layout {
                        Layout::Single => 0x05,
                        _ => 0x00,
                    };
                    if let Layout::TwoSections = self.layout {
                        self.header[7] = 1;
                    }
                }
                SectionItem::Item(_) => {
                    self.header[6] += 1;
                    self.header[8] = 0xF0;
                    self.header[9] = 0x00;
                }
            }
            &self.header
        }

        fn section_item(&mut self, item: SectionItem) -> Option<&[u8]> {
            match item {
                SectionItem::Descriptors => Some(&self.desc),
                SectionItem::Item(n) => self.items.get(n).map(|v| &v[..]),
            }
        }
    }

    fn start_packet(cc: u8) -> TsPacket {
        let mut packet = TsPacket::new(4455);
        packet.set_cc(cc);
        packet
    }

    #[test]
    fn test_single_packet_section() {
        let mut packetizer = Packetizer::new(SectionMock::new(Layout::Single));
        let mut packet = start_packet(1);

        assert!(packetizer.next_packet(&mut packet));

        let total = MOCK_HEADER_SIZE + 5 + 10 + crc32::SIZE;
        let mut expected = vec![
            0x47, 0x51, 0x67, 0x11, // PUSI, pid 4455, cc 1
            0x00, // pointer
            10, 0xF0, 0x00, 13, 14, 15, 0, 0, 0xF0, 0x05, // header
            0x40, 0x03, 0xAA, 0xBB, 0xCC, // descriptors
            0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6, 0xA7, 0xA8, 0xA9, // item
            0x00, 0x00, 0x00, 0x00, // crc
        ];
        expected[7] = (total - PSI_HEADER_SIZE) as u8;
        let crc = crc32::checksum(&expected[5..5 + total - crc32::SIZE]);
        expected[5 + total - crc32::SIZE..].copy_from_slice(&crc.to_be_bytes());

        assert_eq!(&packet.as_bytes()[..expected.len()], &expected[..]);
        assert!(packet.as_bytes()[expected.len()..].iter().all(|&b| b == 0xFF));

        assert!(!packetizer.next_packet(&mut packet));
    }

    #[test]
    fn test_trailer_split_across_packets() {
        let mut packetizer = Packetizer::new(SectionMock::new(Layout::FullPacket));
        let mut packet = start_packet(1);

        let total = MOCK_HEADER_SIZE + (183 - MOCK_HEADER_SIZE - 2) + crc32::SIZE;

        let mut expected1 = vec![0u8; PACKET_SIZE];
        expected1[..5].copy_from_slice(&[0x47, 0x51, 0x67, 0x11, 0x00]);
        expected1[5..15].copy_from_slice(&[10, 0xF0, 0x00, 13, 14, 15, 0, 0, 0xF0, 0x00]);
        expected1[7] = (total - PSI_HEADER_SIZE) as u8;
        for z in 0..171u8 {
            expected1[15 + z as usize] = 0x50 + z;
        }
        let crc = crc32::checksum(&expected1[5..PACKET_SIZE - 2]);
        expected1[186] = (crc >> 24) as u8;
        expected1[187] = (crc >> 16) as u8;

        assert!(packetizer.next_packet(&mut packet));
        assert_eq!(packet.as_bytes(), &expected1[..]);

        // last two trailer bytes land in a continuation packet
        let mut expected2 = vec![0xFFu8; PACKET_SIZE];
        expected2[..6].copy_from_slice(&[0x47, 0x11, 0x67, 0x12, (crc >> 8) as u8, crc as u8]);

        assert!(packetizer.next_packet(&mut packet));
        assert_eq!(packet.as_bytes(), &expected2[..]);

        assert!(!packetizer.next_packet(&mut packet));
    }

    #[test]
    fn test_two_sections() {
        let mut packetizer = Packetizer::new(SectionMock::new(Layout::TwoSections));
        let mut packet = start_packet(1);

        let total = MOCK_HEADER_SIZE + 200 + crc32::SIZE;

        // first section, first packet: header and 173 item bytes
        let mut expected11 = vec![0u8; PACKET_SIZE];
        expected11[..5].copy_from_slice(&[0x47, 0x51, 0x67, 0x11, 0x00]);
        expected11[5..15].copy_from_slice(&[10, 0xF0, 0x00, 13, 14, 15, 0, 1, 0xF0, 0x00]);
        expected11[7] = (total - PSI_HEADER_SIZE) as u8;
        for z in 0..173u8 {
            expected11[15 + z as usize] = 0x10 + z;
        }

        // first section, second packet: 27 item bytes and the trailer
        let mut expected12 = vec![0xFFu8; PACKET_SIZE];
        expected12[..4].copy_from_slice(&[0x47, 0x11, 0x67, 0x12]);
        for z in 0..27u8 {
            expected12[4 + z as usize] = 0x10 + 173 + z;
        }
        let mut digest = crc32::digest();
        digest.update(&expected11[5..]);
        digest.update(&expected12[4..31]);
        let crc = digest.finalize();
        expected12[31..35].copy_from_slice(&crc.to_be_bytes());

        // second section, same shape with the section number advanced
        let mut expected21 = vec![0u8; PACKET_SIZE];
        expected21[..5].copy_from_slice(&[0x47, 0x51, 0x67, 0x13, 0x00]);
        expected21[5..15].copy_from_slice(&[10, 0xF0, 0x00, 13, 14, 15, 1, 1, 0xF0, 0x00]);
        expected21[7] = (total - PSI_HEADER_SIZE) as u8;
        for z in 0..173u8 {
            expected21[15 + z as usize] = 0x20 + z;
        }

        let mut expected22 = vec![0xFFu8; PACKET_SIZE];
        expected22[..4].copy_from_slice(&[0x47, 0x11, 0x67, 0x14]);
        for z in 0..27u8 {
            expected22[4 + z as usize] = 0x20 + 173 + z;
        }
        let mut digest = crc32::digest();
        digest.update(&expected21[5..]);
        digest.update(&expected22[4..31]);
        let crc = digest.finalize();
        expected22[31..35].copy_from_slice(&crc.to_be_bytes());

        for expected in [&expected11, &expected12, &expected21, &expected22] {
            assert!(packetizer.next_packet(&mut packet));
            assert_eq!(packet.as_bytes(), &expected[..]);
        }

        assert!(!packetizer.next_packet(&mut packet));
    }
}
