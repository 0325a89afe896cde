//! Device profile
//!
//! Memory geometry and timing of one controller model. The defaults
//! describe the reference board; other boards load a profile from TOML:
//!
//! ```toml
//! flash_size = 65536
//! flash_write_block = 32
//! calibration_ms = 10
//! ```
//!
//! Keys that are left out keep their default value.

use std::time::Duration;

use serde::Deserialize;
use strand_protocol::bootloader::MAX_WRITE_BLOCK;
use strand_protocol::MAX_BODY_SIZE;

use crate::error::ConfigError;

/// Memory sizes, transfer block sizes and timing of a controller
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceProfile {
    /// Program flash size in bytes
    pub flash_size: usize,
    /// EEPROM size in bytes
    pub eeprom_size: usize,
    /// Bytes per flash read request
    pub flash_read_block: usize,
    /// Bytes per EEPROM read request
    pub eeprom_read_block: usize,
    /// Bytes per flash write request, also the flash write granularity
    pub flash_write_block: usize,
    /// Bytes per EEPROM write request
    pub eeprom_write_block: usize,
    /// Flash erase page size in bytes
    pub erase_page_size: usize,
    /// Pages per erase request
    pub max_erase_pages: u8,
    /// Pages per flash CRC request
    pub max_crc_pages: u16,
    /// Milliseconds per controller tick, used to convert fade and wait times
    pub calibration_ms: u32,
    /// How long to wait for a response
    pub response_timeout_ms: u64,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            flash_size: 0x2_0000,
            eeprom_size: 1024,
            flash_read_block: 64,
            eeprom_read_block: 64,
            flash_write_block: 64,
            eeprom_write_block: 32,
            erase_page_size: 64,
            max_erase_pages: 8,
            max_crc_pages: 32,
            calibration_ms: 5,
            response_timeout_ms: 1000,
        }
    }
}

impl DeviceProfile {
    /// Parse and validate a profile from TOML
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let profile: Self = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        profile.validate()?;
        Ok(profile)
    }

    /// Check that every value can be used on the wire
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flash_size == 0 || self.eeprom_size == 0 {
            return Err(ConfigError::Invalid("memory sizes must be non-zero"));
        }
        if self.flash_read_block == 0 || self.eeprom_read_block == 0 {
            return Err(ConfigError::Invalid("read blocks must be non-zero"));
        }
        if self.flash_read_block > MAX_BODY_SIZE || self.eeprom_read_block > MAX_BODY_SIZE {
            return Err(ConfigError::Invalid("read blocks must fit a frame"));
        }
        if self.flash_write_block == 0 || self.eeprom_write_block == 0 {
            return Err(ConfigError::Invalid("write blocks must be non-zero"));
        }
        if self.flash_write_block > MAX_WRITE_BLOCK || self.eeprom_write_block > MAX_WRITE_BLOCK {
            return Err(ConfigError::Invalid("write blocks must fit a frame"));
        }
        if self.flash_write_block > self.flash_size {
            return Err(ConfigError::Invalid("flash write block larger than flash"));
        }
        if self.erase_page_size == 0 || self.max_erase_pages == 0 {
            return Err(ConfigError::Invalid("erase geometry must be non-zero"));
        }
        // Two CRC bytes per page
        if self.max_crc_pages == 0 || self.max_crc_pages as usize * 2 > MAX_BODY_SIZE {
            return Err(ConfigError::Invalid("CRC pages must be non-zero and fit a frame"));
        }
        if self.calibration_ms == 0 {
            return Err(ConfigError::Invalid("calibration must be non-zero"));
        }
        Ok(())
    }

    /// Response timeout as a duration
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Address of the autostart cell, the last EEPROM byte
    pub fn autostart_address(&self) -> u32 {
        self.eeprom_size as u32 - 1
    }
}
