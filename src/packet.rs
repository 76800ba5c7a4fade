//! Transport Stream packet accessor layer.
//!
//! Bit-exact read/write of the fixed-position header fields of a 188-octet
//! TS packet (ISO/IEC 13818-1, 2.4.3), with no heap allocation.

use crate::clock::Pcr;

/// Size of a TS packet in bytes.
pub const PACKET_SIZE: usize = 188;

/// TS packet sync byte.
pub const SYNC_BYTE: u8 = 0x47;

/// Highest valid PID value. 8192 is reserved as "no PID".
pub const MAX_PID: u16 = 8191;

/// Transport Scrambling Control field values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScramblingControl {
    NotScrambled,
    ScrambledEvenKey, // 10
    ScrambledOddKey,  // 11
}

/// Borrowed, read-only view of one 188-byte TS packet.
///
/// Wraps a caller-owned buffer without copying; the slicer hands these out
/// directly over its input chunks.
#[derive(Clone, Copy)]
pub struct TsRef<'a> {
    data: &'a [u8],
}

impl<'a> TsRef<'a> {
    /// Wraps a raw packet buffer.
    ///
    /// # Panics
    ///
    /// Panics if `data` is not exactly [`PACKET_SIZE`] bytes. Packet indices
    /// are fixed by the wire format, so a short buffer is a programming
    /// error, not a recoverable condition.
    pub fn new(data: &'a [u8]) -> TsRef<'a> {
        assert_eq!(data.len(), PACKET_SIZE, "TS packet must be 188 bytes");
        TsRef { data }
    }

    /// Returns the raw packet bytes.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Returns the 13-bit packet identifier.
    pub fn pid(&self) -> u16 {
        u16::from_be_bytes([self.data[1], self.data[2]]) & 0x1FFF
    }

    /// Returns the 4-bit continuity counter.
    pub fn cc(&self) -> u8 {
        self.data[3] & 0x0F
    }

    /// Checks the continuity counter against the previous value.
    /// True iff the counter equals `previous + 1` mod 16.
    pub fn check_cc(&self, previous: u8) -> bool {
        self.cc() == (previous + 1) & 0x0F
    }

    /// Payload Unit Start Indicator: a new section or PES packet begins in
    /// this packet's payload.
    pub fn has_pusi(&self) -> bool {
        (self.data[1] & 0x40) != 0
    }

    /// Transport Error Indicator.
    pub fn has_tei(&self) -> bool {
        (self.data[1] & 0x80) != 0
    }

    /// Adaptation field flag.
    pub fn has_af(&self) -> bool {
        (self.data[3] & 0x20) != 0
    }

    /// Payload flag.
    pub fn has_payload(&self) -> bool {
        (self.data[3] & 0x10) != 0
    }

    /// Size of the packet header: 4 bytes, or 5 plus the adaptation field
    /// length when the adaptation field flag is set.
    pub fn header_size(&self) -> usize {
        if !self.has_af() {
            4
        } else {
            4 + 1 + self.data[4] as usize
        }
    }

    /// Returns the payload, or `None` when the payload flag is clear, the
    /// error indicator is set, or the adaptation field overruns the packet.
    pub fn payload(&self) -> Option<&'a [u8]> {
        if !self.has_payload() || self.has_tei() {
            return None;
        }

        let s = self.header_size();
        if s >= PACKET_SIZE {
            return None;
        }

        Some(&self.data[s..PACKET_SIZE])
    }

    /// Returns the adaptation field without its length byte.
    pub fn af(&self) -> Option<&'a [u8]> {
        let s = self.header_size();
        if s == 4 || s > PACKET_SIZE {
            return None;
        }

        Some(&self.data[5..s])
    }

    /// Decodes the 2-bit Transport Scrambling Control field.
    pub fn tsc(&self) -> ScramblingControl {
        match (self.data[3] & 0xC0) >> 6 {
            2 => ScramblingControl::ScrambledEvenKey,
            3 => ScramblingControl::ScrambledOddKey,
            _ => ScramblingControl::NotScrambled,
        }
    }

    /// True if the PCR flag is set in the adaptation field.
    /// The packet must carry an adaptation field of at least one byte.
    pub fn has_pcr(&self) -> bool {
        (self.data[5] & 0x10) != 0
    }

    /// Reads the PCR value from the adaptation field.
    /// The packet must carry an adaptation field with the PCR fields present.
    pub fn pcr(&self) -> Pcr {
        let d = self.data;
        let base = ((d[6] as u64) << 25)
            | ((d[7] as u64) << 17)
            | ((d[8] as u64) << 9)
            | ((d[9] as u64) << 1)
            | ((d[10] as u64) >> 7);
        let ext = (((d[10] & 0x01) as u64) << 8) | d[11] as u64;

        Pcr(base * 300 + ext)
    }
}

/// Owned, writable 188-byte TS packet buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct TsPacket {
    data: [u8; PACKET_SIZE],
}

impl TsPacket {
    /// The null packet: PID 0x1FFF, payload all stuffing bytes.
    pub const NULL: TsPacket = {
        let mut data = [0xFF_u8; PACKET_SIZE];
        data[0] = SYNC_BYTE;
        data[1] = 0x1F;
        data[2] = 0xFF;
        data[3] = 0x10;
        TsPacket { data }
    };

    /// Allocates a new zeroed packet with the sync byte and PID set.
    pub fn new(pid: u16) -> TsPacket {
        let mut packet = TsPacket {
            data: [0; PACKET_SIZE],
        };
        packet.data[0] = SYNC_BYTE;
        packet.set_pid(pid);
        packet
    }

    /// Read-only view of this packet.
    pub fn view(&self) -> TsRef<'_> {
        TsRef { data: &self.data }
    }

    pub fn as_bytes(&self) -> &[u8; PACKET_SIZE] {
        &self.data
    }

    /// Raw mutable access for writers that lay out payload bytes directly,
    /// such as the section packetizer.
    pub fn as_mut_bytes(&mut self) -> &mut [u8; PACKET_SIZE] {
        &mut self.data
    }

    pub fn pid(&self) -> u16 {
        self.view().pid()
    }

    /// Sets the PID, preserving the top 3 bits of the containing octet.
    pub fn set_pid(&mut self, pid: u16) {
        let v = (pid & 0x1FFF) | ((self.data[1] & 0xE0) as u16) << 8;
        self.data[1..3].copy_from_slice(&v.to_be_bytes());
    }

    pub fn cc(&self) -> u8 {
        self.view().cc()
    }

    pub fn set_cc(&mut self, cc: u8) {
        self.data[3] = (self.data[3] & 0xF0) | (cc & 0x0F);
    }

    /// Increments the continuity counter mod 16.
    pub fn increment_cc(&mut self) {
        let cc = self.cc() + 1;
        self.set_cc(cc);
    }

    pub fn has_pusi(&self) -> bool {
        self.view().has_pusi()
    }

    pub fn set_pusi(&mut self) {
        self.data[1] |= 0x40;
    }

    pub fn clear_pusi(&mut self) {
        self.data[1] &= !0x40;
    }

    pub fn has_payload(&self) -> bool {
        self.view().has_payload()
    }

    pub fn set_payload(&mut self) {
        self.data[3] |= 0x10;
    }

    pub fn has_af(&self) -> bool {
        self.view().has_af()
    }

    pub fn set_af(&mut self) {
        self.data[3] |= 0x20;
    }

    pub fn clear_af(&mut self) {
        self.data[3] &= !0x20;
    }

    pub fn header_size(&self) -> usize {
        self.view().header_size()
    }

    pub fn payload(&self) -> Option<&[u8]> {
        self.view().payload()
    }

    /// Sets the PCR flag and writes the PCR value into the adaptation field.
    /// The packet must already carry an adaptation field of sufficient length.
    pub fn set_pcr(&mut self, value: Pcr) {
        self.data[5] |= 0x10; // PCR_flag

        let base = value.0 / 300;
        let ext = value.0 % 300;

        self.data[6] = (base >> 25) as u8;
        self.data[7] = (base >> 17) as u8;
        self.data[8] = (base >> 9) as u8;
        self.data[9] = (base >> 1) as u8;
        self.data[10] = (((base << 7) & 0x80) as u8) | 0x7E | (((ext >> 8) & 0x01) as u8);
        self.data[11] = ext as u8;
    }

    /// Fills an incomplete packet with adaptation field stuffing bytes.
    ///
    /// `size` is the number of bytes currently used (header plus payload).
    /// The payload is right-justified against the end of the packet and the
    /// gap is covered by an adaptation field of 0xFF stuffing, extending an
    /// existing adaptation field if present. Mutates in place; calling it
    /// twice on the same buffer is not meaningful.
    pub fn fill(&mut self, size: usize) {
        let mut header_size = self.header_size();

        let payload_size = size - header_size;
        let offset = PACKET_SIZE - payload_size;
        self.data.copy_within(header_size..size, offset);

        if header_size == 4 {
            // Synthesize an adaptation field
            self.data[3] |= 0x20;
            header_size += 1;

            if header_size < offset {
                self.data[5] = 0x00;
                header_size += 1;
            }
        }

        for b in &mut self.data[header_size..offset] {
            *b = 0xFF;
        }

        self.data[4] = (PACKET_SIZE - 4 - 1 - payload_size) as u8;
    }
}

impl std::fmt::Debug for TsPacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TsPacket")
            .field("pid", &self.pid())
            .field("cc", &self.cc())
            .field("pusi", &self.has_pusi())
            .finish()
    }
}
