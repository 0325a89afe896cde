//! Byte-stream transport abstractions
//!
//! The host talks to a controller over an opaque byte stream (a TCP or
//! UDP socket to the WiFi module, or a serial port on the bench). The
//! transport only moves bytes and enforces timeouts; framing lives in
//! `strand-protocol`.

use core::time::Duration;

/// Errors from transport operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// No data arrived before the timeout elapsed
    Timeout,
    /// Connection is closed or was never opened
    Disconnected,
    /// Lower-level I/O failure
    Io,
}

/// Bidirectional byte-stream link
pub trait Transport {
    /// Write all of `data` to the link
    fn send(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Read whatever is available into `buf`
    ///
    /// Blocks for at most `timeout`. Returns the number of bytes read,
    /// which is at least one on success.
    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError>;

    /// Discard any bytes already received but not yet read
    fn drain(&mut self) -> Result<(), TransportError> {
        let mut scratch = [0u8; 32];
        loop {
            match self.receive(&mut scratch, Duration::ZERO) {
                Ok(_) => continue,
                Err(TransportError::Timeout) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        (**self).send(data)
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        (**self).receive(buf, timeout)
    }

    fn drain(&mut self) -> Result<(), TransportError> {
        (**self).drain()
    }
}
