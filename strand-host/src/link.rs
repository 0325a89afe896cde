//! Framed request/response exchange over a [`Transport`]

use std::time::{Duration, Instant};

use log::{trace, warn};
use strand_hal::{Transport, TransportError};
use strand_protocol::frame::Body;
use strand_protocol::{Frame, FrameError, FrameParser, Response, MAX_BODY_SIZE};

use crate::error::LinkError;

/// Attempts of a checked exchange before giving up
pub const MAX_CRC_ATTEMPTS: usize = 5;

/// How [`DeviceLink::send`] matches the reply to the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMode {
    /// Drop stale input first, then take the next complete frame
    Sync,
    /// Skip frames whose first body byte is not the request command
    Tolerant,
}

/// One controller connection
///
/// Owns the transport and the receive state. Only one request is ever in
/// flight: every method takes `&mut self`.
pub struct DeviceLink<T> {
    transport: T,
    timeout: Duration,
    parser: FrameParser,
    /// Bytes received past the last complete frame
    pending: Vec<u8>,
}

impl<T: Transport> DeviceLink<T> {
    /// Create a link that waits up to `timeout` for each reply
    pub fn new(transport: T, timeout: Duration) -> Self {
        Self {
            transport,
            timeout,
            parser: FrameParser::new(),
            pending: Vec::new(),
        }
    }

    /// Send `request` and copy the body of the reply into `out`
    ///
    /// Returns the number of body bytes written.
    pub fn send(&mut self, request: &Frame, out: &mut [u8], mode: SendMode) -> Result<usize, LinkError> {
        let encoded = request.encode_to_vec()?;

        if mode == SendMode::Sync {
            self.transport.drain()?;
            self.parser.reset();
            self.pending.clear();
        }

        trace!("tx {:02x?}", encoded.as_slice());
        self.transport.send(&encoded)?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let body = self.next_body(deadline)?;
            if mode == SendMode::Tolerant && body.first() != Some(&request.command) {
                trace!("skipping unrelated frame {:02x?}", body.as_slice());
                continue;
            }

            trace!("rx {:02x?}", body.as_slice());
            let dst = out
                .get_mut(..body.len())
                .ok_or(LinkError::Frame(FrameError::BufferTooSmall))?;
            dst.copy_from_slice(&body);
            return Ok(body.len());
        }
    }

    /// Exchange a firmware command, resending it until a reply passes
    /// its CRC check
    ///
    /// A timeout, an unparsable reply and a CRC mismatch each use up one
    /// of [`MAX_CRC_ATTEMPTS`] attempts. A dead transport fails at once.
    pub fn exchange_checked(&mut self, request: &Frame) -> Result<Response, LinkError> {
        let mut buf = [0u8; MAX_BODY_SIZE];

        for attempt in 1..=MAX_CRC_ATTEMPTS {
            let received = match self.send(request, &mut buf, SendMode::Tolerant) {
                Ok(n) => n,
                Err(LinkError::Transport(TransportError::Disconnected)) => {
                    return Err(LinkError::Transport(TransportError::Disconnected));
                }
                Err(e) => {
                    warn!(
                        "command 0x{:02x} attempt {}/{}: {}",
                        request.command, attempt, MAX_CRC_ATTEMPTS, e
                    );
                    continue;
                }
            };

            match Response::parse(&buf[..received]) {
                Ok(response) if response.crc_valid => return Ok(response),
                Ok(_) => warn!(
                    "command 0x{:02x} attempt {}/{}: CRC mismatch",
                    request.command, attempt, MAX_CRC_ATTEMPTS
                ),
                Err(e) => warn!(
                    "command 0x{:02x} attempt {}/{}: malformed response {:?}",
                    request.command, attempt, MAX_CRC_ATTEMPTS, e
                ),
            }
        }

        Err(LinkError::NoResponse {
            attempts: MAX_CRC_ATTEMPTS,
        })
    }

    /// Access the transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Access the transport mutably
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Release the transport
    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Read until the parser yields a complete frame body
    fn next_body(&mut self, deadline: Instant) -> Result<Body, LinkError> {
        loop {
            if !self.pending.is_empty() {
                let pending = std::mem::take(&mut self.pending);
                if let Some(body) = self.parse(&pending) {
                    return Ok(body);
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.parser.reset();
                return Err(LinkError::Timeout);
            }

            let mut chunk = [0u8; 64];
            match self.transport.receive(&mut chunk, remaining) {
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(TransportError::Timeout) => {
                    self.parser.reset();
                    return Err(LinkError::Timeout);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Feed `bytes` to the parser, keeping whatever follows a complete
    /// frame for the next call
    fn parse(&mut self, bytes: &[u8]) -> Option<Body> {
        let mut offset = 0;
        while offset < bytes.len() {
            match self.parser.feed_bytes(&bytes[offset..]) {
                Ok((Some(body), used)) => {
                    self.pending.extend_from_slice(&bytes[offset + used..]);
                    return Some(body);
                }
                Ok((None, used)) => offset += used,
                Err(e) => {
                    // Length byte was invalid; resync on the next byte
                    warn!("dropping byte 0x{:02x}: {:?}", bytes[offset], e);
                    self.parser.reset();
                    offset += 1;
                }
            }
        }
        None
    }
}
