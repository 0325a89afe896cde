//! Error types for strand-host

use core::fmt;

use strand_hal::TransportError;
use strand_protocol::FrameError;

/// Failure of a single request/response exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// Transport reported an error
    Transport(TransportError),
    /// Request could not be encoded, or the reply did not fit
    Frame(FrameError),
    /// No complete reply arrived before the deadline
    Timeout,
    /// Every attempt of a checked exchange failed
    NoResponse { attempts: usize },
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::Transport(e) => write!(f, "Transport error: {:?}", e),
            LinkError::Frame(e) => write!(f, "Frame error: {:?}", e),
            LinkError::Timeout => write!(f, "Timed out waiting for a response"),
            LinkError::NoResponse { attempts } => {
                write!(f, "No valid response after {} attempts", attempts)
            }
        }
    }
}

impl std::error::Error for LinkError {}

impl From<TransportError> for LinkError {
    fn from(e: TransportError) -> Self {
        LinkError::Transport(e)
    }
}

impl From<FrameError> for LinkError {
    fn from(e: FrameError) -> Self {
        LinkError::Frame(e)
    }
}

/// Request rejected before anything was sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    /// `address + len` exceeds the memory
    OutOfRange { address: u32, len: usize, size: usize },
    /// Page count of an erase request is zero or above the device limit
    PageCount { requested: u8, max: u8 },
    /// Device reports a boot boundary outside its flash
    BoundaryBeyondFlash { boundary: u32, flash_size: usize },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::OutOfRange { address, len, size } => write!(
                f,
                "Range 0x{:x}+{} exceeds memory size 0x{:x}",
                address, len, size
            ),
            ValidationError::PageCount { requested, max } => {
                write!(f, "Page count {} not in 1..={}", requested, max)
            }
            ValidationError::BoundaryBeyondFlash {
                boundary,
                flash_size,
            } => write!(
                f,
                "Boot boundary 0x{:x} is outside flash (size 0x{:x})",
                boundary, flash_size
            ),
        }
    }
}

/// Firmware image cannot be used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageError {
    /// Image holds no data
    Empty,
    /// Image does not start at address 0
    NotAtZero,
    /// Application vector bytes missing from the image
    MissingVector { address: u32 },
    /// Image reaches into the bootloader area
    InBootloaderArea { end: u32, boundary: u32 },
    /// Image reaches past the end of flash
    BeyondFlash { end: u32, flash_size: usize },
    /// Image reaches into the block holding the application vector
    InVectorBlock { end: u32, vector_block: u32 },
    /// Image too short to hold a version string
    NoVersion,
}

impl fmt::Display for ImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageError::Empty => write!(f, "Image is empty"),
            ImageError::NotAtZero => write!(f, "Program code does not start at address 0"),
            ImageError::MissingVector { address } => {
                write!(f, "Application vector missing at 0x{:x}", address)
            }
            ImageError::InBootloaderArea { end, boundary } => write!(
                f,
                "Image end 0x{:x} is in the bootloader area (boundary 0x{:x})",
                end, boundary
            ),
            ImageError::BeyondFlash { end, flash_size } => write!(
                f,
                "Image end 0x{:x} is outside flash (size 0x{:x})",
                end, flash_size
            ),
            ImageError::InVectorBlock { end, vector_block } => write!(
                f,
                "Image end 0x{:x} overlaps the vector block at 0x{:x}",
                end, vector_block
            ),
            ImageError::NoVersion => write!(f, "Image holds no version string"),
        }
    }
}

impl std::error::Error for ImageError {}

/// Error type for bootloader operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootloaderError {
    /// Arguments rejected, nothing was sent
    Validation(ValidationError),
    /// Missing, short or unexpected reply to a request
    NoResponse { opcode: u8 },
    /// No version string found in flash
    VersionNotFound,
    /// Firmware image rejected
    Image(ImageError),
    /// Link failure other than a missing reply
    Link(LinkError),
}

impl fmt::Display for BootloaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootloaderError::Validation(e) => write!(f, "Validation error: {}", e),
            BootloaderError::NoResponse { opcode } => {
                write!(f, "No response to bootloader request 0x{:02x}", opcode)
            }
            BootloaderError::VersionNotFound => write!(f, "Firmware version not found"),
            BootloaderError::Image(e) => write!(f, "Image error: {}", e),
            BootloaderError::Link(e) => write!(f, "Link error: {}", e),
        }
    }
}

impl std::error::Error for BootloaderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BootloaderError::Image(e) => Some(e),
            BootloaderError::Link(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ValidationError> for BootloaderError {
    fn from(e: ValidationError) -> Self {
        BootloaderError::Validation(e)
    }
}

impl From<ImageError> for BootloaderError {
    fn from(e: ImageError) -> Self {
        BootloaderError::Image(e)
    }
}

/// Error type for firmware commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareError {
    /// No valid response after all retries, or response too short
    NoResponse { command: u8 },
    /// Controller dropped the command, its script buffer is full
    ScriptBufferFull { command: u8 },
    /// Controller answered with a failure state
    Rejected { command: u8, state: u8 },
    /// Link failure other than a missing reply
    Link(LinkError),
}

impl fmt::Display for FirmwareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FirmwareError::NoResponse { command } => {
                write!(f, "No response to command 0x{:02x}", command)
            }
            FirmwareError::ScriptBufferFull { command } => {
                write!(f, "Script buffer full, command 0x{:02x} dropped", command)
            }
            FirmwareError::Rejected { command, state } => write!(
                f,
                "Command 0x{:02x} rejected with state 0x{:02x}",
                command, state
            ),
            FirmwareError::Link(e) => write!(f, "Link error: {}", e),
        }
    }
}

impl std::error::Error for FirmwareError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FirmwareError::Link(e) => Some(e),
            _ => None,
        }
    }
}

/// Error loading a device profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// TOML could not be parsed into a profile
    Parse(String),
    /// A value is out of its valid range
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Parse(msg) => write!(f, "Config parse error: {}", msg),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
