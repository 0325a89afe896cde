//! Bootloader sub-protocol
//!
//! While in its bootloader the controller answers flash and EEPROM
//! maintenance requests. Requests use the common frame envelope; replies
//! are raw: either the requested data or a single acknowledge byte equal
//! to the request opcode.

use crate::frame::{Frame, FrameError, MAX_PAYLOAD_SIZE};

// Opcodes
pub const BL_INFO: u8 = 0x00;
pub const BL_READ_FLASH: u8 = 0x01;
pub const BL_READ_CRC: u8 = 0x02;
pub const BL_ERASE_FLASH: u8 = 0x03;
pub const BL_WRITE_FLASH: u8 = 0x04;
pub const BL_READ_EEPROM: u8 = 0x05;
pub const BL_WRITE_EEPROM: u8 = 0x06;
pub const BL_RUN_APP: u8 = 0x08;

/// Acknowledge byte for a flash page erase
pub const ACK_ERASE_FLASH: u8 = BL_ERASE_FLASH;
/// Acknowledge byte for a flash write
pub const ACK_WRITE_FLASH: u8 = BL_WRITE_FLASH;
/// Acknowledge byte for an EEPROM write
pub const ACK_WRITE_EEPROM: u8 = BL_WRITE_EEPROM;

/// Size of the bootloader info record
pub const BOOT_INFO_LEN: usize = 8;

/// Address + length header of a write request
const WRITE_HEADER_LEN: usize = 6;

/// Largest data block a single write request can carry
pub const MAX_WRITE_BLOCK: usize = MAX_PAYLOAD_SIZE - WRITE_HEADER_LEN;

/// Bootloader identification record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BootInfo {
    /// First flash address owned by the bootloader
    pub boot_boundary: u32,
    pub version_major: u8,
    pub version_minor: u8,
    /// Device family identifier
    pub family_id: u16,
}

impl BootInfo {
    /// Parse the info record; anything but an exact-size record is invalid
    pub fn parse(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() != BOOT_INFO_LEN {
            return Err(FrameError::InvalidFrame);
        }
        Ok(Self {
            boot_boundary: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            version_major: bytes[4],
            version_minor: bytes[5],
            family_id: u16::from_le_bytes([bytes[6], bytes[7]]),
        })
    }

    /// Encode the info record
    pub fn encode(&self) -> [u8; BOOT_INFO_LEN] {
        let mut out = [0u8; BOOT_INFO_LEN];
        out[..4].copy_from_slice(&self.boot_boundary.to_le_bytes());
        out[4] = self.version_major;
        out[5] = self.version_minor;
        out[6..].copy_from_slice(&self.family_id.to_le_bytes());
        out
    }
}

/// Requests understood by the bootloader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootloaderRequest<'a> {
    /// Read the [`BootInfo`] record
    Info,
    /// Read `len` bytes of flash
    ReadFlash { address: u32, len: u16 },
    /// Read one CRC-16 per erase page for `num_pages` pages
    ReadCrc { address: u32, num_pages: u16 },
    /// Erase `num_pages` pages, the last of which contains `end_address`
    EraseFlash { end_address: u32, num_pages: u8 },
    /// Program a block of flash
    WriteFlash { address: u32, data: &'a [u8] },
    /// Read `len` bytes of EEPROM
    ReadEeprom { address: u32, len: u16 },
    /// Program a block of EEPROM
    WriteEeprom { address: u32, data: &'a [u8] },
    /// Leave the bootloader and start the application
    RunApp,
}

impl<'a> BootloaderRequest<'a> {
    /// Request opcode
    pub fn opcode(&self) -> u8 {
        match self {
            BootloaderRequest::Info => BL_INFO,
            BootloaderRequest::ReadFlash { .. } => BL_READ_FLASH,
            BootloaderRequest::ReadCrc { .. } => BL_READ_CRC,
            BootloaderRequest::EraseFlash { .. } => BL_ERASE_FLASH,
            BootloaderRequest::WriteFlash { .. } => BL_WRITE_FLASH,
            BootloaderRequest::ReadEeprom { .. } => BL_READ_EEPROM,
            BootloaderRequest::WriteEeprom { .. } => BL_WRITE_EEPROM,
            BootloaderRequest::RunApp => BL_RUN_APP,
        }
    }

    /// Encode into a request frame
    pub fn to_frame(&self) -> Result<Frame, FrameError> {
        let mut payload = [0u8; MAX_PAYLOAD_SIZE];
        let len = match *self {
            BootloaderRequest::Info | BootloaderRequest::RunApp => 0,
            BootloaderRequest::ReadFlash { address, len }
            | BootloaderRequest::ReadEeprom { address, len } => {
                payload[..4].copy_from_slice(&address.to_le_bytes());
                payload[4..6].copy_from_slice(&len.to_le_bytes());
                6
            }
            BootloaderRequest::ReadCrc { address, num_pages } => {
                payload[..4].copy_from_slice(&address.to_le_bytes());
                payload[4..6].copy_from_slice(&num_pages.to_le_bytes());
                6
            }
            BootloaderRequest::EraseFlash {
                end_address,
                num_pages,
            } => {
                payload[..4].copy_from_slice(&end_address.to_le_bytes());
                payload[4] = num_pages;
                5
            }
            BootloaderRequest::WriteFlash { address, data }
            | BootloaderRequest::WriteEeprom { address, data } => {
                if data.len() > MAX_WRITE_BLOCK {
                    return Err(FrameError::PayloadTooLarge);
                }
                payload[..4].copy_from_slice(&address.to_le_bytes());
                payload[4..6].copy_from_slice(&(data.len() as u16).to_le_bytes());
                payload[6..6 + data.len()].copy_from_slice(data);
                WRITE_HEADER_LEN + data.len()
            }
        };
        Frame::new(self.opcode(), &payload[..len])
    }

    /// Parse a request frame (bootloader side, or for simulation)
    pub fn from_frame(frame: &'a Frame) -> Result<Self, FrameError> {
        let p = frame.payload.as_slice();
        let address = || -> Result<u32, FrameError> {
            let b = p.get(..4).ok_or(FrameError::Incomplete)?;
            Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        };
        let count = || -> Result<u16, FrameError> {
            let b = p.get(4..6).ok_or(FrameError::Incomplete)?;
            Ok(u16::from_le_bytes([b[0], b[1]]))
        };

        let request = match frame.command {
            BL_INFO => BootloaderRequest::Info,
            BL_RUN_APP => BootloaderRequest::RunApp,
            BL_READ_FLASH => BootloaderRequest::ReadFlash {
                address: address()?,
                len: count()?,
            },
            BL_READ_EEPROM => BootloaderRequest::ReadEeprom {
                address: address()?,
                len: count()?,
            },
            BL_READ_CRC => BootloaderRequest::ReadCrc {
                address: address()?,
                num_pages: count()?,
            },
            BL_ERASE_FLASH => BootloaderRequest::EraseFlash {
                end_address: address()?,
                num_pages: *p.get(4).ok_or(FrameError::Incomplete)?,
            },
            BL_WRITE_FLASH | BL_WRITE_EEPROM => {
                let address = address()?;
                let len = count()? as usize;
                let data = p
                    .get(WRITE_HEADER_LEN..WRITE_HEADER_LEN + len)
                    .ok_or(FrameError::Incomplete)?;
                if frame.command == BL_WRITE_FLASH {
                    BootloaderRequest::WriteFlash { address, data }
                } else {
                    BootloaderRequest::WriteEeprom { address, data }
                }
            }
            other => return Err(FrameError::UnknownCommand(other)),
        };
        Ok(request)
    }
}
