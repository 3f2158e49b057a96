//! Conversion between logical packets and 802.15.4 PHY protocol data units.
//!
//! Layout: 4 zero preamble octets, the start-of-frame delimiter, one length
//! octet (payload + FCS), the payload and a little-endian CRC16.

use bytes::{BufMut, Bytes, BytesMut};
use emu802154_core::{crc16, ConvertedPacket, RadioPacket, FCS_LEN, MAX_PAYLOAD_LEN};

use crate::RadioError;

pub const PREAMBLE_LEN: usize = 4;
pub const SFD: u8 = 0x7A;
/// Preamble, delimiter and length octet.
pub const PHY_HEADER_LEN: usize = PREAMBLE_LEN + 2;
pub const LENGTH_OFFSET: usize = PHY_HEADER_LEN - 1;

pub fn encode(payload: &[u8]) -> Result<Bytes, RadioError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(RadioError::PayloadTooLarge(payload.len()));
    }

    let mut ppdu = BytesMut::with_capacity(PHY_HEADER_LEN + payload.len() + FCS_LEN);
    ppdu.put_bytes(0, PREAMBLE_LEN);
    ppdu.put_u8(SFD);
    ppdu.put_u8((payload.len() + FCS_LEN) as u8);
    ppdu.put_slice(payload);
    ppdu.put_u16_le(crc16(payload));

    Ok(ppdu.freeze())
}

/// Length of the PPDU `encode` produces for a payload of `payload_len` bytes.
pub fn encoded_len(payload_len: usize) -> usize {
    PHY_HEADER_LEN + payload_len + FCS_LEN
}

/// Strips the PHY header and FCS off `ppdu`.
///
/// Preamble and delimiter are skipped without being checked. A length octet
/// too small to hold the FCS is not an error: the returned packet is empty and
/// `raw` keeps whatever the length octet covered.
pub fn decode(ppdu: &[u8]) -> Result<ConvertedPacket, RadioError> {
    if ppdu.len() < PHY_HEADER_LEN {
        return Err(RadioError::TruncatedFrame {
            needed: PHY_HEADER_LEN,
            actual: ppdu.len(),
        });
    }

    let frame_len = ppdu[LENGTH_OFFSET] as usize;
    let end = PHY_HEADER_LEN + frame_len;
    if ppdu.len() < end {
        return Err(RadioError::TruncatedFrame {
            needed: end,
            actual: ppdu.len(),
        });
    }

    let raw = Bytes::copy_from_slice(&ppdu[PHY_HEADER_LEN..end]);
    let packet = match frame_len.checked_sub(FCS_LEN) {
        Some(payload_len) => RadioPacket::new(raw.slice(..payload_len)),
        None => {
            log::debug!("no payload in PHY frame: length field {} is shorter than the FCS", frame_len);
            RadioPacket::empty()
        }
    };

    Ok(ConvertedPacket { packet, raw })
}

/// Whether the FCS trailing a converted frame matches its payload.
pub fn fcs_matches(converted: &ConvertedPacket) -> bool {
    if converted.is_malformed() {
        return false;
    }
    let payload = converted.packet.data();
    let fcs = &converted.raw[payload.len()..];
    u16::from_le_bytes([fcs[0], fcs[1]]) == crc16(payload)
}
