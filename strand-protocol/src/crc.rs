//! CRC-16 used to guard firmware responses
//!
//! CRC-16/CCITT-FALSE: polynomial 0x1021, initial value 0xFFFF, no
//! reflection, no final XOR. The bootloader uses the same checksum for its
//! per-page flash CRC readout.

/// Initial value for an incremental CRC computation
pub const CRC16_INIT: u16 = 0xFFFF;

const POLY: u16 = 0x1021;

/// Feed `data` into a running CRC
pub fn crc16_update(crc: u16, data: &[u8]) -> u16 {
    let mut crc = crc;

    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ POLY;
            } else {
                crc <<= 1;
            }
        }
    }

    crc
}

/// CRC over a complete buffer
pub fn crc16(data: &[u8]) -> u16 {
    crc16_update(CRC16_INIT, data)
}
