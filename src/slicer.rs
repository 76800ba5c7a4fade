//! Byte-stream resynchronizer.
//!
//! Splits arbitrarily-chunked input (file or socket reads) into 188-byte
//! TS packets. Aligned packets are zero-copy slices of the caller's chunk;
//! a trailing sub-packet remainder is carried in an internal scratch buffer
//! and completed from the next chunk.

use bytes::Bytes;
use memchr::memchr;

use crate::packet::{PACKET_SIZE, SYNC_BYTE};

/// Terminal state of a chunk after iteration ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceStatus {
    /// All input consumed, no bytes carried over.
    Clean,
    /// All input consumed; a partial packet is buffered for the next chunk.
    Partial,
    /// No sync byte found in the chunk; extraction from it was abandoned.
    SyncLost,
}

/// Splits a stream of byte chunks into TS packets.
#[derive(Debug, Default)]
pub struct Slicer {
    partial: Partial,
    buffer: Bytes,
    skip: usize,
    sync_lost: bool,
}

struct Partial {
    packet: [u8; PACKET_SIZE],
    fill: usize,
}

impl Default for Partial {
    fn default() -> Self {
        Partial {
            packet: [0; PACKET_SIZE],
            fill: 0,
        }
    }
}

impl std::fmt::Debug for Partial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Partial").field("fill", &self.fill).finish()
    }
}

impl Slicer {
    pub fn new() -> Slicer {
        Slicer::default()
    }

    /// Feeds the next input chunk and returns an iterator over the packets
    /// it contains. Check [`status`](Slicer::status) once the iterator is
    /// exhausted.
    pub fn feed(&mut self, chunk: Bytes) -> Packets<'_> {
        let first = self.begin(chunk);
        Packets {
            slicer: self,
            first: Some(first),
        }
    }

    /// Terminal state of the most recent chunk. Meaningful after the
    /// iterator returned by [`feed`](Slicer::feed) has been exhausted.
    pub fn status(&self) -> SliceStatus {
        if self.sync_lost {
            SliceStatus::SyncLost
        } else if self.partial.fill != 0 {
            SliceStatus::Partial
        } else {
            SliceStatus::Clean
        }
    }

    fn begin(&mut self, chunk: Bytes) -> Option<Bytes> {
        self.buffer = chunk;
        self.skip = 0;
        self.sync_lost = false;

        // complete a partial packet carried over from the previous chunk
        if self.partial.fill != 0 {
            let n = (PACKET_SIZE - self.partial.fill).min(self.buffer.len());
            self.partial.packet[self.partial.fill..self.partial.fill + n]
                .copy_from_slice(&self.buffer[..n]);
            self.partial.fill += n;
            self.skip += n;

            if self.partial.fill != PACKET_SIZE {
                return None;
            }

            self.partial.fill = 0;
            return Some(Bytes::copy_from_slice(&self.partial.packet));
        }

        if self.buffer.is_empty() {
            return None;
        }

        match memchr(SYNC_BYTE, &self.buffer) {
            Some(pos) => {
                self.skip = pos;
                self.next_packet()
            }
            None => {
                self.sync_lost = true;
                self.skip = self.buffer.len();
                None
            }
        }
    }

    fn next_packet(&mut self) -> Option<Bytes> {
        let next = self.skip + PACKET_SIZE;
        if self.buffer.len() >= next {
            let packet = self.buffer.slice(self.skip..next);
            self.skip = next;
            return Some(packet);
        }

        if self.buffer.len() > self.skip {
            let rest = &self.buffer[self.skip..];
            self.partial.packet[..rest.len()].copy_from_slice(rest);
            self.partial.fill = rest.len();
            self.skip += rest.len();
        }

        None
    }
}

/// Iterator over the packets of one input chunk.
pub struct Packets<'a> {
    slicer: &'a mut Slicer,
    first: Option<Option<Bytes>>,
}

impl Iterator for Packets<'_> {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        match self.first.take() {
            Some(first) => first,
            None => self.slicer.next_packet(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_packets() -> Vec<u8> {
        let mut data = vec![0u8; PACKET_SIZE * 2];
        let header = [0x47, 0x1F, 0xFF, 0x10];
        data[..4].copy_from_slice(&header);
        data[PACKET_SIZE..PACKET_SIZE + 4].copy_from_slice(&header);
        for i in 4..PACKET_SIZE {
            data[i] = (i - 4) as u8;
            data[i + PACKET_SIZE] = (187 - i) as u8;
        }
        data
    }

    #[test]
    fn test_single_packet() {
        let data = test_packets();
        let mut slicer = Slicer::new();

        let packets: Vec<Bytes> = slicer
            .feed(Bytes::copy_from_slice(&data[..PACKET_SIZE]))
            .collect();

        assert_eq!(packets.len(), 1);
        assert_eq!(&packets[0][..], &data[..PACKET_SIZE]);
        assert_eq!(slicer.status(), SliceStatus::Clean);
    }

    #[test]
    fn test_two_packets() {
        let data = test_packets();
        let mut slicer = Slicer::new();

        let packets: Vec<Bytes> = slicer.feed(Bytes::copy_from_slice(&data)).collect();

        assert_eq!(packets.len(), 2);
        assert_eq!(&packets[0][..], &data[..PACKET_SIZE]);
        assert_eq!(&packets[1][..], &data[PACKET_SIZE..]);
        assert_eq!(slicer.status(), SliceStatus::Clean);
    }

    #[test]
    fn test_partial_two_parts() {
        let data = test_packets();
        let mut slicer = Slicer::new();

        let packets: Vec<Bytes> = slicer.feed(Bytes::copy_from_slice(&data[..50])).collect();
        assert!(packets.is_empty());
        assert_eq!(slicer.status(), SliceStatus::Partial);

        let packets: Vec<Bytes> = slicer
            .feed(Bytes::copy_from_slice(&data[50..PACKET_SIZE]))
            .collect();
        assert_eq!(packets.len(), 1);
        assert_eq!(&packets[0][..], &data[..PACKET_SIZE]);
        assert_eq!(slicer.status(), SliceStatus::Clean);
    }

    #[test]
    fn test_partial_three_parts() {
        let data = test_packets();
        let mut slicer = Slicer::new();

        assert!(slicer.feed(Bytes::copy_from_slice(&data[..50])).next().is_none());
        assert_eq!(slicer.status(), SliceStatus::Partial);

        assert!(slicer.feed(Bytes::copy_from_slice(&data[50..100])).next().is_none());
        assert_eq!(slicer.status(), SliceStatus::Partial);

        let packets: Vec<Bytes> = slicer
            .feed(Bytes::copy_from_slice(&data[100..PACKET_SIZE]))
            .collect();
        assert_eq!(packets.len(), 1);
        assert_eq!(&packets[0][..], &data[..PACKET_SIZE]);
        assert_eq!(slicer.status(), SliceStatus::Clean);
    }

    #[test]
    fn test_partial_after_full_packet() {
        let data = test_packets();
        let mut slicer = Slicer::new();

        let packets: Vec<Bytes> = slicer
            .feed(Bytes::copy_from_slice(&data[..PACKET_SIZE + 4]))
            .collect();
        assert_eq!(packets.len(), 1);
        assert_eq!(&packets[0][..], &data[..PACKET_SIZE]);
        assert_eq!(slicer.status(), SliceStatus::Partial);

        // remainder of the second packet
        let packets: Vec<Bytes> = slicer
            .feed(Bytes::copy_from_slice(&data[PACKET_SIZE + 4..]))
            .collect();
        assert_eq!(packets.len(), 1);
        assert_eq!(&packets[0][..], &data[PACKET_SIZE..]);
        assert_eq!(slicer.status(), SliceStatus::Clean);
    }

    #[test]
    fn test_skip_unexpected_bytes() {
        let data = test_packets();
        let mut slicer = Slicer::new();

        let packets: Vec<Bytes> = slicer
            .feed(Bytes::copy_from_slice(&data[PACKET_SIZE - 4..]))
            .collect();
        assert_eq!(packets.len(), 1);
        assert_eq!(&packets[0][..], &data[PACKET_SIZE..]);
        assert_eq!(slicer.status(), SliceStatus::Clean);
    }

    #[test]
    fn test_sync_lost() {
        let mut slicer = Slicer::new();

        let packets: Vec<Bytes> = slicer.feed(Bytes::from(vec![0xAA; 400])).collect();
        assert!(packets.is_empty());
        assert_eq!(slicer.status(), SliceStatus::SyncLost);

        // recovers on the next chunk
        let data = test_packets();
        let packets: Vec<Bytes> = slicer
            .feed(Bytes::copy_from_slice(&data[..PACKET_SIZE]))
            .collect();
        assert_eq!(packets.len(), 1);
        assert_eq!(slicer.status(), SliceStatus::Clean);
    }

    #[test]
    fn test_empty_chunk() {
        let mut slicer = Slicer::new();
        assert!(slicer.feed(Bytes::new()).next().is_none());
        assert_eq!(slicer.status(), SliceStatus::Clean);
    }
}
