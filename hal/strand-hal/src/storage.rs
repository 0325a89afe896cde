//! Persistent storage abstractions
//!
//! Provides a trait for byte-addressed non-volatile storage (on-chip
//! EEPROM or an emulated EEPROM region). Every write is expected to be
//! durable once the call returns; callers persist state one field at a
//! time so an interrupted sequence always leaves a re-derivable state.

/// Errors from persistent storage operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    /// Address range lies outside the storage
    OutOfRange,
    /// Device reported a write failure
    WriteFailed,
    /// Device reported a read failure
    ReadFailed,
}

/// Byte-addressed persistent storage
///
/// Addresses are absolute offsets from the start of the storage.
pub trait Eeprom {
    /// Total number of addressable bytes
    fn capacity(&self) -> usize;

    /// Read `buf.len()` bytes starting at `address`
    fn read_block(&mut self, address: u16, buf: &mut [u8]) -> Result<(), StorageError>;

    /// Write `data` starting at `address`
    ///
    /// Returns once the data is committed.
    fn write_block(&mut self, address: u16, data: &[u8]) -> Result<(), StorageError>;

    /// Read a single byte
    fn read_byte(&mut self, address: u16) -> Result<u8, StorageError> {
        let mut buf = [0u8; 1];
        self.read_block(address, &mut buf)?;
        Ok(buf[0])
    }

    /// Write a single byte
    fn write_byte(&mut self, address: u16, value: u8) -> Result<(), StorageError> {
        self.write_block(address, &[value])
    }
}

impl<T: Eeprom + ?Sized> Eeprom for &mut T {
    fn capacity(&self) -> usize {
        (**self).capacity()
    }

    fn read_block(&mut self, address: u16, buf: &mut [u8]) -> Result<(), StorageError> {
        (**self).read_block(address, buf)
    }

    fn write_block(&mut self, address: u16, data: &[u8]) -> Result<(), StorageError> {
        (**self).write_block(address, data)
    }
}
