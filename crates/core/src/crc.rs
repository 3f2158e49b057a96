//! CRC16 used for the 802.15.4 frame check sequence.
//!
//! This is the CCITT polynomial in its reflected form, updated one octet at a
//! time from a zero seed (CRC-16/KERMIT).

/// Folds one byte into the running checksum.
pub fn crc16_add(byte: u8, acc: u16) -> u16 {
    let mut acc = acc ^ byte as u16;
    acc = acc.rotate_left(8);
    acc ^= (acc & 0xff00) << 4;
    acc ^= (acc >> 8) >> 4;
    acc ^= (acc & 0xff00) >> 5;
    acc
}

pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0, |acc, &b| crc16_add(b, acc))
}
