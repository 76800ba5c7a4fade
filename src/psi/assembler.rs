//! Section reassembly from TS packets.

use crate::crc32;
use crate::packet::TsRef;

use super::{PSI_HEADER_SIZE, PSI_MAX_SIZE, PsiError};

/// Envelope bounds for well-known table ids: minimum header size (without
/// the CRC trailer) and maximum total section size. Unknown table ids skip
/// the envelope check.
fn envelope_bounds(table_id: u8) -> Option<(usize, usize)> {
    match table_id {
        0x00 => Some((8, 1024)),        // PAT
        0x01 => Some((12, 1024)),       // CAT
        0x02 => Some((12, 1024)),       // PMT
        0x42 | 0x46 => Some((11, 1024)), // SDT actual/other
        _ => None,
    }
}

/// Stateful per-PID section assembler.
///
/// Feed packets of one PID in arrival order with
/// [`assemble`](PsiAssembler::assemble); the callback fires exactly once per
/// completed section attempt, with either a verified section available
/// through [`payload`](PsiAssembler::payload) or the reason it was dropped.
pub struct PsiAssembler {
    table_id: u8,
    version: u8,
    section_number: u8,
    last_section_number: u8,
    crc: u32,
    cc: u8,
    fill: usize,
    size: usize,
    buffer: [u8; PSI_MAX_SIZE],
}

impl Default for PsiAssembler {
    fn default() -> Self {
        PsiAssembler {
            table_id: 0,
            version: 0,
            section_number: 0,
            last_section_number: 0,
            crc: 0,
            cc: 0,
            fill: 0,
            size: 0,
            buffer: [0; PSI_MAX_SIZE],
        }
    }
}

impl std::fmt::Debug for PsiAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PsiAssembler")
            .field("table_id", &self.table_id)
            .field("version", &self.version)
            .field("section_number", &self.section_number)
            .field("last_section_number", &self.last_section_number)
            .field("fill", &self.fill)
            .field("size", &self.size)
            .finish()
    }
}

impl PsiAssembler {
    pub fn new() -> PsiAssembler {
        PsiAssembler::default()
    }

    /// Table id of the most recently completed section attempt.
    pub fn table_id(&self) -> u8 {
        self.table_id
    }

    /// Version number of the most recently completed section attempt.
    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn section_number(&self) -> u8 {
        self.section_number
    }

    pub fn last_section_number(&self) -> u8 {
        self.last_section_number
    }

    /// Computed CRC-32 of the most recently completed section attempt.
    pub fn crc(&self) -> u32 {
        self.crc
    }

    /// The assembled section bytes, including header and CRC trailer.
    /// Valid inside the callback; empty once assembly restarts.
    pub fn payload(&self) -> &[u8] {
        &self.buffer[..self.size.min(self.fill)]
    }

    /// Drops any partially assembled section.
    pub fn clear(&mut self) {
        self.fill = 0;
        self.size = 0;
    }

    /// Consumes one packet. The callback receives the assembler itself and
    /// the outcome of every section attempt that concludes inside this
    /// packet; there may be zero, one, or two such attempts.
    pub fn assemble<F>(&mut self, packet: TsRef<'_>, mut f: F)
    where
        F: FnMut(&PsiAssembler, Result<(), PsiError>),
    {
        let Some(payload) = packet.payload() else {
            return;
        };
        let mut payload = payload;

        if packet.has_pusi() {
            let pointer = payload[0] as usize;
            payload = &payload[1..];

            if pointer >= payload.len() {
                self.conclude(&mut f, Err(PsiError::PointerRange));
                return;
            }

            // the pointer-delimited bytes must exactly finish the section
            // in progress, if any
            if self.fill != 0 {
                if !packet.check_cc(self.cc) {
                    self.conclude(&mut f, Err(PsiError::Discontinuity));
                } else if let Err(e) = self.push(&payload[..pointer]) {
                    self.conclude(&mut f, Err(e));
                } else if self.size != 0 && self.fill == self.size {
                    let result = self.validate();
                    self.conclude(&mut f, result);
                } else {
                    self.conclude(&mut f, Err(PsiError::Assemble));
                }
            }

            payload = &payload[pointer..];
        } else {
            if self.fill == 0 {
                return;
            }

            if !packet.check_cc(self.cc) {
                self.conclude(&mut f, Err(PsiError::Discontinuity));
                return;
            }
        }

        if let Err(e) = self.push(payload) {
            self.conclude(&mut f, Err(e));
            return;
        }

        if self.size != 0 && self.fill == self.size {
            let result = self.validate();
            self.conclude(&mut f, result);
        }

        self.cc = packet.cc();
    }

    fn conclude<F>(&mut self, f: &mut F, result: Result<(), PsiError>)
    where
        F: FnMut(&PsiAssembler, Result<(), PsiError>),
    {
        f(self, result);
        self.clear();
    }

    fn push(&mut self, mut payload: &[u8]) -> Result<(), PsiError> {
        // accumulate the 3-byte header first to learn the section size
        if self.size == 0 {
            let n = (PSI_HEADER_SIZE - self.fill).min(payload.len());
            self.buffer[self.fill..self.fill + n].copy_from_slice(&payload[..n]);
            self.fill += n;

            if self.fill < PSI_HEADER_SIZE {
                return Ok(());
            }

            self.size = PSI_HEADER_SIZE
                + (u16::from_be_bytes([self.buffer[1], self.buffer[2]]) & 0x0FFF) as usize;
            if self.size > PSI_MAX_SIZE {
                return Err(PsiError::Assemble);
            }

            payload = &payload[n..];
        }

        let n = (self.size - self.fill).min(payload.len());
        self.buffer[self.fill..self.fill + n].copy_from_slice(&payload[..n]);
        self.fill += n;
        Ok(())
    }

    /// Populates the identity fields from the finished section, then checks
    /// the CRC trailer and the table envelope.
    fn validate(&mut self) -> Result<(), PsiError> {
        if self.size < PSI_HEADER_SIZE + crc32::SIZE {
            return Err(PsiError::Format);
        }

        self.table_id = self.buffer[0];
        if self.size >= 8 {
            self.version = (self.buffer[5] >> 1) & 0x1F;
            self.section_number = self.buffer[6];
            self.last_section_number = self.buffer[7];
        } else {
            self.version = 0;
            self.section_number = 0;
            self.last_section_number = 0;
        }

        let body = self.size - crc32::SIZE;
        self.crc = crc32::checksum(&self.buffer[..body]);

        let expected = u32::from_be_bytes([
            self.buffer[body],
            self.buffer[body + 1],
            self.buffer[body + 2],
            self.buffer[body + 3],
        ]);
        if self.crc != expected {
            return Err(PsiError::Checksum {
                expected,
                actual: self.crc,
            });
        }

        if let Some((header_size, max_size)) = envelope_bounds(self.table_id) {
            if self.size < header_size + crc32::SIZE || self.size > max_size {
                return Err(PsiError::Format);
            }
            if self.section_number > self.last_section_number {
                return Err(PsiError::Format);
            }
        }

        Ok(())
    }
}
