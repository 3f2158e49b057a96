//! core data types for the 802.15.4 transceiver emulation

pub mod crc;
pub mod packet;
pub mod types;

pub use crc::{crc16, crc16_add};
pub use packet::{ConvertedPacket, RadioPacket};
pub use types::*;
