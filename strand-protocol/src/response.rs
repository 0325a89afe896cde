//! Firmware responses
//!
//! Response body layout:
//! - COMMAND (1 byte): echo of the request command
//! - STATE (1 byte): see [`ResponseState`]
//! - DATA (0-250 bytes): command-specific
//! - CRC (2 bytes, big endian): CRC-16 over COMMAND, STATE and DATA

use heapless::Vec;

use crate::crc::crc16;
use crate::frame::{FrameError, MAX_BODY_SIZE};

/// Bytes in a response body besides DATA
pub const RESPONSE_OVERHEAD: usize = 4;

/// Maximum response data size
pub const MAX_RESPONSE_DATA: usize = MAX_BODY_SIZE - RESPONSE_OVERHEAD;

// State codes
pub const STATE_OK: u8 = 0x00;
pub const STATE_SCRIPT_BUFFER_FULL: u8 = 0x01;
pub const STATE_BAD_COMMAND: u8 = 0x02;

/// Outcome reported by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResponseState {
    /// Command accepted
    Ok,
    /// Script buffer had no room, the command was dropped
    ScriptBufferFull,
    /// Controller did not understand the command
    BadCommand,
    /// State code this client does not know
    Unknown(u8),
}

impl ResponseState {
    /// Parse a state from its wire byte
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            STATE_OK => ResponseState::Ok,
            STATE_SCRIPT_BUFFER_FULL => ResponseState::ScriptBufferFull,
            STATE_BAD_COMMAND => ResponseState::BadCommand,
            other => ResponseState::Unknown(other),
        }
    }

    /// Convert to wire byte
    pub fn to_byte(self) -> u8 {
        match self {
            ResponseState::Ok => STATE_OK,
            ResponseState::ScriptBufferFull => STATE_SCRIPT_BUFFER_FULL,
            ResponseState::BadCommand => STATE_BAD_COMMAND,
            ResponseState::Unknown(byte) => byte,
        }
    }
}

/// A parsed firmware response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Echoed command code
    pub command: u8,
    /// Controller state
    pub state: ResponseState,
    /// Command-specific data
    pub data: Vec<u8, MAX_RESPONSE_DATA>,
    /// Whether the received CRC matched
    pub crc_valid: bool,
}

impl Response {
    /// Build a response (controller side, or for simulation)
    pub fn new(command: u8, state: ResponseState, data: &[u8]) -> Result<Self, FrameError> {
        let mut data_vec = Vec::new();
        data_vec
            .extend_from_slice(data)
            .map_err(|_| FrameError::PayloadTooLarge)?;
        Ok(Self {
            command,
            state,
            data: data_vec,
            crc_valid: true,
        })
    }

    /// Parse a response body
    ///
    /// A body too short to hold the fixed fields is an error; a CRC
    /// mismatch is not, it is reported through `crc_valid` so the caller
    /// can decide to retry.
    pub fn parse(body: &[u8]) -> Result<Self, FrameError> {
        if body.len() < RESPONSE_OVERHEAD {
            return Err(FrameError::Incomplete);
        }

        let (content, crc_bytes) = body.split_at(body.len() - 2);
        let received = u16::from_be_bytes([crc_bytes[0], crc_bytes[1]]);

        let mut response = Self::new(content[0], ResponseState::from_byte(content[1]), &content[2..])?;
        response.crc_valid = crc16(content) == received;
        Ok(response)
    }

    /// Encode the response body including its CRC
    ///
    /// Returns the number of bytes written
    pub fn encode_body(&self, buffer: &mut [u8]) -> Result<usize, FrameError> {
        let content_len = 2 + self.data.len();
        let total = content_len + 2;
        if buffer.len() < total {
            return Err(FrameError::BufferTooSmall);
        }

        buffer[0] = self.command;
        buffer[1] = self.state.to_byte();
        buffer[2..content_len].copy_from_slice(&self.data);
        let crc = crc16(&buffer[..content_len]);
        buffer[content_len..total].copy_from_slice(&crc.to_be_bytes());

        Ok(total)
    }

    /// Returns true if the controller reported a full script buffer
    pub fn is_script_buffer_full(&self) -> bool {
        self.state == ResponseState::ScriptBufferFull
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_parse_with_data() {
        let response = Response::new(0x0C, ResponseState::Ok, b"1.0.42\0").unwrap();
        let mut buffer = [0u8; 32];
        let len = response.encode_body(&mut buffer).unwrap();
        assert_eq!(len, 4 + 7);

        let parsed = Response::parse(&buffer[..len]).unwrap();
        assert!(parsed.crc_valid);
        assert_eq!(parsed, response);
    }

    #[test]
    fn test_corrupted_crc_is_flagged() {
        let response = Response::new(0x02, ResponseState::Ok, &[]).unwrap();
        let mut buffer = [0u8; 8];
        let len = response.encode_body(&mut buffer).unwrap();
        buffer[1] ^= 0x01;

        let parsed = Response::parse(&buffer[..len]).unwrap();
        assert!(!parsed.crc_valid);
    }

    #[test]
    fn test_script_buffer_full_flag() {
        let response = Response::new(0x03, ResponseState::ScriptBufferFull, &[]).unwrap();
        let mut buffer = [0u8; 8];
        let len = response.encode_body(&mut buffer).unwrap();

        let parsed = Response::parse(&buffer[..len]).unwrap();
        assert!(parsed.is_script_buffer_full());
        assert_eq!(buffer[1], STATE_SCRIPT_BUFFER_FULL);
    }

    #[test]
    fn test_short_body() {
        assert_eq!(Response::parse(&[0x02, 0x00, 0x12]), Err(FrameError::Incomplete));
    }

    #[test]
    fn test_unknown_state_roundtrip() {
        assert_eq!(ResponseState::from_byte(0x7E), ResponseState::Unknown(0x7E));
        assert_eq!(ResponseState::Unknown(0x7E).to_byte(), 0x7E);
    }
}
