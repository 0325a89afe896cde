//! Host-side clients for Strand LED controllers
//!
//! A [`Control`] session owns the byte-stream [`Transport`] to one
//! controller and hands out two protocol clients:
//!
//! - [`FirmwareClient`]: LED and script commands for the running firmware
//! - [`BootloaderClient`]: flash and EEPROM maintenance, firmware updates
//!
//! ```text
//! FirmwareClient ──┐
//!                  ├──► DeviceLink ──► Transport ──► controller
//! BootloaderClient ┘    (framing, CRC retry)
//! ```
//!
//! [`Transport`]: strand_hal::Transport

#![deny(unsafe_code)]

pub mod bootloader;
pub mod config;
pub mod control;
pub mod error;
pub mod firmware;
pub mod image;
pub mod link;

pub use bootloader::BootloaderClient;
pub use config::DeviceProfile;
pub use control::Control;
pub use error::{BootloaderError, ConfigError, FirmwareError, ImageError, LinkError, ValidationError};
pub use firmware::FirmwareClient;
pub use image::{image_firmware_version, FirmwareImage, MemoryImage};
pub use link::{DeviceLink, SendMode, MAX_CRC_ATTEMPTS};
