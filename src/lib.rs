//! MPEG-2 Transport Stream framing primitives (ISO/IEC 13818-1): packet
//! accessors, byte-stream resynchronization, PSI section assembly and
//! packetization, and wraparound-safe clock arithmetic. Table octet layouts
//! and descriptors are out of scope; tables reach the packetizer through the
//! [`psi::SectionBuilder`] contract.

pub mod clock;
pub mod crc32;
pub mod monitor;
pub mod network;
pub mod packet;
pub mod psi;
pub mod slicer;

pub use clock::{Pcr, Timestamp};
pub use packet::{PACKET_SIZE, TsPacket, TsRef};
pub use psi::{PsiAssembler, PsiError};
pub use slicer::{SliceStatus, Slicer};
