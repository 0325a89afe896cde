//! Firmware images
//!
//! Image file parsing (Intel hex and friends) lives outside this crate;
//! the bootloader client only needs byte lookup by address.

use std::collections::BTreeMap;

use crate::error::ImageError;

/// Length of the version string stored at the end of a firmware image
pub const VERSION_LEN: usize = 7;

/// Sparse firmware image
pub trait FirmwareImage {
    /// Byte at `address`, or `None` for a hole
    fn data(&self, address: u32) -> Option<u8>;

    /// Lowest address holding data
    fn start_address(&self) -> Option<u32>;

    /// Highest address holding data
    fn end_address(&self) -> Option<u32>;
}

impl<I: FirmwareImage + ?Sized> FirmwareImage for &I {
    fn data(&self, address: u32) -> Option<u8> {
        (**self).data(address)
    }

    fn start_address(&self) -> Option<u32> {
        (**self).start_address()
    }

    fn end_address(&self) -> Option<u32> {
        (**self).end_address()
    }
}

/// In-memory image built from address/data records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryImage {
    bytes: BTreeMap<u32, u8>,
}

impl MemoryImage {
    /// Create an empty image
    pub fn new() -> Self {
        Self::default()
    }

    /// Place `data` at `address`, overwriting earlier records
    pub fn insert(&mut self, address: u32, data: &[u8]) {
        for (offset, &byte) in data.iter().enumerate() {
            self.bytes.insert(address + offset as u32, byte);
        }
    }

    /// Image holding `data` from address 0
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut image = Self::new();
        image.insert(0, data);
        image
    }

    /// Number of bytes with data
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if the image holds no data
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl FirmwareImage for MemoryImage {
    fn data(&self, address: u32) -> Option<u8> {
        self.bytes.get(&address).copied()
    }

    fn start_address(&self) -> Option<u32> {
        self.bytes.keys().next().copied()
    }

    fn end_address(&self) -> Option<u32> {
        self.bytes.keys().next_back().copied()
    }
}

/// Version string of a firmware image
///
/// The build places the string right before the image end; the final
/// byte is its terminator. Holes read as 0.
pub fn image_firmware_version<I: FirmwareImage>(image: &I) -> Result<String, ImageError> {
    let end = image.end_address().ok_or(ImageError::Empty)?;
    let start = end
        .checked_sub(VERSION_LEN as u32)
        .ok_or(ImageError::NoVersion)?;

    let bytes: Vec<u8> = (start..end).map(|a| image.data(a).unwrap_or(0)).collect();
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
