//! CRC-16/CCITT as used by GT06-class trackers.
//!
//! This is the X.25 reflection of polynomial 0x1021 (init 0xFFFF, final
//! complement), matching deployed firmware. The algorithm is a compatibility
//! surface: hardware rejects responses computed any other way.

/// Reflected form of polynomial 0x1021.
const POLY_REFLECTED: u16 = 0x8408;

/// Compute the checksum over `data`.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ POLY_REFLECTED;
            } else {
                crc >>= 1;
            }
        }
    }
    !crc
}
