//! Frame encoding and decoding
//!
//! Frame format:
//! - LENGTH (1 byte): total frame size including the LENGTH byte itself
//! - BODY (LENGTH - 1 bytes)
//!
//! A request body is `[command][payload…]`, which makes LENGTH equal to the
//! payload size plus two.

use heapless::Vec;

/// Largest frame the one-byte length prefix can describe
pub const MAX_FRAME_SIZE: usize = 255;

/// Maximum body size (everything after LENGTH)
pub const MAX_BODY_SIZE: usize = MAX_FRAME_SIZE - 1;

/// Maximum request payload size (body minus the command byte)
pub const MAX_PAYLOAD_SIZE: usize = MAX_BODY_SIZE - 1;

/// Frame body as delivered by [`FrameParser`]
pub type Body = Vec<u8, MAX_BODY_SIZE>;

/// Errors that can occur during frame parsing or encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Payload exceeds maximum allowed size
    PayloadTooLarge,
    /// Frame is incomplete (need more bytes)
    Incomplete,
    /// Invalid frame structure
    InvalidFrame,
    /// Command code is not known
    UnknownCommand(u8),
    /// Buffer too small for encoding
    BufferTooSmall,
}

/// A request frame: command code plus payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Command or bootloader opcode
    pub command: u8,
    /// Payload data
    pub payload: Vec<u8, MAX_PAYLOAD_SIZE>,
}

impl Frame {
    /// Create a new frame with the given command and payload
    pub fn new(command: u8, payload: &[u8]) -> Result<Self, FrameError> {
        let mut payload_vec = Vec::new();
        payload_vec
            .extend_from_slice(payload)
            .map_err(|_| FrameError::PayloadTooLarge)?;

        Ok(Self {
            command,
            payload: payload_vec,
        })
    }

    /// Create a frame with no payload
    pub fn empty(command: u8) -> Self {
        Self {
            command,
            payload: Vec::new(),
        }
    }

    /// Rebuild a request frame from a received body
    pub fn from_body(body: &[u8]) -> Result<Self, FrameError> {
        let (&command, payload) = body.split_first().ok_or(FrameError::InvalidFrame)?;
        Self::new(command, payload)
    }

    /// Value of the LENGTH byte for this frame
    pub fn length(&self) -> u8 {
        (self.payload.len() + 2) as u8
    }

    /// Encode this frame into a byte buffer
    ///
    /// Returns the number of bytes written
    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize, FrameError> {
        let frame_len = self.payload.len() + 2;
        if buffer.len() < frame_len {
            return Err(FrameError::BufferTooSmall);
        }

        buffer[0] = self.length();
        buffer[1] = self.command;
        buffer[2..frame_len].copy_from_slice(&self.payload);

        Ok(frame_len)
    }

    /// Encode this frame into a heapless Vec
    pub fn encode_to_vec(&self) -> Result<Vec<u8, MAX_FRAME_SIZE>, FrameError> {
        let mut buffer = [0u8; MAX_FRAME_SIZE];
        let len = self.encode(&mut buffer)?;
        let mut vec = Vec::new();
        vec.extend_from_slice(&buffer[..len])
            .map_err(|_| FrameError::BufferTooSmall)?;
        Ok(vec)
    }
}

/// Wrap an arbitrary body (e.g. a response) in the length envelope
///
/// Returns the number of bytes written
pub fn encode_body(body: &[u8], buffer: &mut [u8]) -> Result<usize, FrameError> {
    if body.is_empty() {
        return Err(FrameError::InvalidFrame);
    }
    if body.len() > MAX_BODY_SIZE {
        return Err(FrameError::PayloadTooLarge);
    }
    let frame_len = body.len() + 1;
    if buffer.len() < frame_len {
        return Err(FrameError::BufferTooSmall);
    }

    buffer[0] = frame_len as u8;
    buffer[1..frame_len].copy_from_slice(body);
    Ok(frame_len)
}

/// State machine for splitting a byte stream into frame bodies
#[derive(Debug, Clone)]
pub struct FrameParser {
    state: ParseState,
    buffer: Body,
    expected_length: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    /// Waiting for LENGTH
    WaitingForLength,
    /// Reading body bytes
    ReadingBody,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser {
    /// Create a new frame parser
    pub fn new() -> Self {
        Self {
            state: ParseState::WaitingForLength,
            buffer: Vec::new(),
            expected_length: 0,
        }
    }

    /// Reset the parser state
    pub fn reset(&mut self) {
        self.state = ParseState::WaitingForLength;
        self.buffer.clear();
        self.expected_length = 0;
    }

    /// True while a frame has been started but not completed
    pub fn in_frame(&self) -> bool {
        self.state == ParseState::ReadingBody
    }

    /// Feed a single byte to the parser
    ///
    /// Returns `Ok(Some(body))` when a complete frame is parsed,
    /// `Ok(None)` when more bytes are needed, or `Err` on parse error.
    pub fn feed(&mut self, byte: u8) -> Result<Option<Body>, FrameError> {
        match self.state {
            ParseState::WaitingForLength => {
                // A frame needs at least one body byte
                if byte < 2 {
                    return Err(FrameError::InvalidFrame);
                }
                self.expected_length = byte as usize - 1;
                self.buffer.clear();
                self.state = ParseState::ReadingBody;
                Ok(None)
            }
            ParseState::ReadingBody => {
                // Cannot overflow: expected_length <= MAX_BODY_SIZE
                let _ = self.buffer.push(byte);
                if self.buffer.len() < self.expected_length {
                    return Ok(None);
                }

                let body = self.buffer.clone();
                self.reset();
                Ok(Some(body))
            }
        }
    }

    /// Feed multiple bytes to the parser
    ///
    /// Returns the first complete body together with the number of bytes
    /// consumed. Bytes after a complete frame are not consumed.
    pub fn feed_bytes(&mut self, bytes: &[u8]) -> Result<(Option<Body>, usize), FrameError> {
        for (i, &byte) in bytes.iter().enumerate() {
            if let Some(body) = self.feed(byte)? {
                return Ok((Some(body), i + 1));
            }
        }
        Ok((None, bytes.len()))
    }
}
