//! Bootloader client
//!
//! Flash and EEPROM maintenance while the controller sits in its
//! bootloader. Bootloader replies carry no checksum, so every request is
//! a single synchronous round trip: a short or unexpected reply aborts
//! the operation. Multi-request operations are not rolled back when a
//! later chunk fails.

use log::{debug, info, trace};
use strand_hal::Transport;
use strand_protocol::bootloader::{
    ACK_ERASE_FLASH, ACK_WRITE_EEPROM, ACK_WRITE_FLASH, BOOT_INFO_LEN,
};
use strand_protocol::commands::CMD_RUN_APP;
use strand_protocol::{BootInfo, BootloaderRequest, MAX_BODY_SIZE};

use crate::config::DeviceProfile;
use crate::error::{BootloaderError, ImageError, LinkError, ValidationError};
use crate::image::{FirmwareImage, VERSION_LEN};
use crate::link::{DeviceLink, SendMode};

/// Bytes per probe while searching for the version string
const PROBE_BLOCK: u32 = 32;

/// Size of the application vector at address 0
const VECTOR_LEN: usize = 4;

/// Value of erased flash and EEPROM
const ERASED: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Memory {
    Flash,
    Eeprom,
}

/// Client for the bootloader protocol
///
/// Borrows the link for its lifetime, so no firmware request can
/// interleave with a bootloader operation.
pub struct BootloaderClient<'a, T> {
    link: &'a mut DeviceLink<T>,
    profile: &'a DeviceProfile,
}

impl<'a, T: Transport> BootloaderClient<'a, T> {
    /// Create a client over `link` for a device described by `profile`
    pub fn new(link: &'a mut DeviceLink<T>, profile: &'a DeviceProfile) -> Self {
        Self { link, profile }
    }

    /// Read the bootloader identification record
    pub fn read_info(&mut self) -> Result<BootInfo, BootloaderError> {
        let mut buf = [0u8; BOOT_INFO_LEN];
        self.read_exact(&BootloaderRequest::Info, &mut buf)?;
        let info = BootInfo::parse(&buf).map_err(|_| BootloaderError::NoResponse {
            opcode: BootloaderRequest::Info.opcode(),
        })?;
        debug!(
            "bootloader {}.{} family 0x{:04x} boundary 0x{:x}",
            info.version_major, info.version_minor, info.family_id, info.boot_boundary
        );
        Ok(info)
    }

    /// Read `len` bytes of flash starting at `address`
    pub fn read_flash(&mut self, address: u32, len: usize) -> Result<Vec<u8>, BootloaderError> {
        self.read_memory(Memory::Flash, address, len)
    }

    /// Read `len` bytes of EEPROM starting at `address`
    pub fn read_eeprom(&mut self, address: u32, len: usize) -> Result<Vec<u8>, BootloaderError> {
        self.read_memory(Memory::Eeprom, address, len)
    }

    /// Program `data` into flash at `address`
    ///
    /// Flash must have been erased first.
    pub fn write_flash(&mut self, address: u32, data: &[u8]) -> Result<(), BootloaderError> {
        self.write_memory(Memory::Flash, address, data)
    }

    /// Program `data` into EEPROM at `address`
    pub fn write_eeprom(&mut self, address: u32, data: &[u8]) -> Result<(), BootloaderError> {
        self.write_memory(Memory::Eeprom, address, data)
    }

    /// Erase flash from `end_address` down to address 0
    ///
    /// Each request erases `num_pages` pages ending at the current
    /// address, walking backward; the last request covers whatever is
    /// left below.
    pub fn erase_flash_range(&mut self, end_address: u32, num_pages: u8) -> Result<(), BootloaderError> {
        check_range(end_address, 1, self.profile.flash_size)?;
        if num_pages == 0 || num_pages > self.profile.max_erase_pages {
            return Err(ValidationError::PageCount {
                requested: num_pages,
                max: self.profile.max_erase_pages,
            }
            .into());
        }

        let page = self.profile.erase_page_size as u32;
        let chunk = num_pages as u32 * page;
        let mut address = end_address;

        while address >= chunk {
            self.erase_pages(address, num_pages)?;
            address -= chunk;
        }
        // Remaining pages: the one holding `address` and everything below
        self.erase_pages(address, (address / page + 1) as u8)
    }

    /// Erase the whole application area below the bootloader
    pub fn erase_flash(&mut self) -> Result<(), BootloaderError> {
        let info = self.read_info()?;
        self.erase_application(info.boot_boundary)
    }

    /// Erase the whole EEPROM (including the script buffer)
    pub fn erase_eeprom(&mut self) -> Result<(), BootloaderError> {
        let erased = vec![ERASED; self.profile.eeprom_size];
        self.write_eeprom(0, &erased)
    }

    /// Make the bootloader start the application after reset
    pub fn enable_autostart(&mut self) -> Result<(), BootloaderError> {
        self.write_eeprom(self.profile.autostart_address(), &[ERASED])
    }

    /// Read one CRC-16 per erase page for `num_pages` pages from `address`
    pub fn read_flash_crc(&mut self, address: u32, num_pages: u16) -> Result<Vec<u16>, BootloaderError> {
        let page = self.profile.erase_page_size;
        check_range(address, num_pages as usize * page, self.profile.flash_size)?;

        let mut crcs = Vec::with_capacity(num_pages as usize);
        let mut address = address;
        let mut left = num_pages;
        let mut buf = [0u8; MAX_BODY_SIZE];

        while left > 0 {
            let n = left.min(self.profile.max_crc_pages);
            let reply = &mut buf[..n as usize * 2];
            self.read_exact(&BootloaderRequest::ReadCrc { address, num_pages: n }, reply)?;
            crcs.extend(reply.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])));

            address += n as u32 * page as u32;
            left -= n;
        }
        Ok(crcs)
    }

    /// Locate and read the version string of the installed firmware
    ///
    /// The string sits at the end of the application, followed by erased
    /// flash. A binary search over the application area finds that end
    /// in O(log n) round trips; the flash around the last probe is then
    /// scanned backward for the string terminator.
    pub fn read_firmware_version(&mut self) -> Result<String, BootloaderError> {
        let info = self.read_info()?;

        let mut step = info.boot_boundary / 2;
        let mut address = step;
        while step > PROBE_BLOCK {
            let probe = self.read_flash(address, PROBE_BLOCK as usize)?;
            let empty = probe.iter().all(|&b| b == ERASED);
            trace!("probe 0x{:x}: {}", address, if empty { "empty" } else { "code" });

            step /= 2;
            address = if empty {
                address.saturating_sub(step)
            } else {
                address + step
            };
        }

        // Code ends within one step of `address`
        let start = address.saturating_sub(step * 2);
        let end = (address + step * 2).min(info.boot_boundary);
        let tail = self.read_flash(start, (end - start) as usize)?;

        let terminator = tail
            .iter()
            .rposition(|&b| b != ERASED)
            .ok_or(BootloaderError::VersionNotFound)?;
        let start = terminator
            .checked_sub(VERSION_LEN)
            .ok_or(BootloaderError::VersionNotFound)?;
        Ok(String::from_utf8_lossy(&tail[start..terminator]).into_owned())
    }

    /// Install a firmware image
    ///
    /// The application vector is written last, in the block right below
    /// the bootloader; until then address 0 jumps into the bootloader.
    /// A power loss at any point leaves a device that still boots into
    /// its bootloader.
    pub fn program_flash<I: FirmwareImage>(&mut self, image: &I) -> Result<(), BootloaderError> {
        let info = self.read_info()?;
        let boundary = info.boot_boundary;
        let write_block = self.profile.flash_write_block as u32;

        if boundary as usize > self.profile.flash_size {
            return Err(ValidationError::BoundaryBeyondFlash {
                boundary,
                flash_size: self.profile.flash_size,
            }
            .into());
        }
        if boundary < write_block {
            return Err(ValidationError::OutOfRange {
                address: 0,
                len: write_block as usize,
                size: boundary as usize,
            }
            .into());
        }

        let end = image.end_address().ok_or(ImageError::Empty)?;
        if end >= boundary {
            return Err(ImageError::InBootloaderArea { end, boundary }.into());
        }
        if end as usize >= self.profile.flash_size {
            return Err(ImageError::BeyondFlash {
                end,
                flash_size: self.profile.flash_size,
            }
            .into());
        }
        // The block below the boundary is reserved for the application vector
        let vector_block = boundary - write_block;
        if end >= vector_block {
            return Err(ImageError::InVectorBlock { end, vector_block }.into());
        }
        if image.start_address() != Some(0) {
            return Err(ImageError::NotAtZero.into());
        }

        let mut app_vector = [0u8; VECTOR_LEN];
        for (i, byte) in app_vector.iter_mut().enumerate() {
            *byte = image
                .data(i as u32)
                .ok_or(ImageError::MissingVector { address: i as u32 })?;
        }

        info!("programming 0x{:x} bytes below 0x{:x}", end + 1, boundary);

        self.enable_autostart()?;
        self.erase_application(boundary)?;

        let mut body: Vec<u8> = (0..=end).map(|a| image.data(a).unwrap_or(ERASED)).collect();
        body[..VECTOR_LEN].copy_from_slice(&reset_vector(boundary));
        self.write_flash(0, &body)?;

        let mut last = vec![ERASED; write_block as usize];
        let tail = last.len() - VECTOR_LEN;
        last[tail..].copy_from_slice(&app_vector);
        self.write_flash(boundary - write_block, &last)?;

        info!("programming done");
        Ok(())
    }

    /// Leave the bootloader and start the application
    ///
    /// The application confirms with its "started" response.
    pub fn run_app(&mut self) -> Result<(), BootloaderError> {
        let request = BootloaderRequest::RunApp;
        let mut buf = [0u8; MAX_BODY_SIZE];
        let n = self.request(&request, &mut buf)?;

        if n >= 4 && buf[0] == CMD_RUN_APP {
            info!("application started");
            Ok(())
        } else {
            Err(BootloaderError::NoResponse {
                opcode: request.opcode(),
            })
        }
    }

    fn erase_application(&mut self, boundary: u32) -> Result<(), BootloaderError> {
        match boundary.checked_sub(1) {
            Some(end) => self.erase_flash_range(end, self.profile.max_erase_pages),
            None => Ok(()),
        }
    }

    fn erase_pages(&mut self, end_address: u32, num_pages: u8) -> Result<(), BootloaderError> {
        debug!("erase {} pages ending at 0x{:x}", num_pages, end_address);
        self.expect_ack(
            &BootloaderRequest::EraseFlash {
                end_address,
                num_pages,
            },
            ACK_ERASE_FLASH,
        )
    }

    fn read_memory(&mut self, memory: Memory, address: u32, len: usize) -> Result<Vec<u8>, BootloaderError> {
        let (size, block) = match memory {
            Memory::Flash => (self.profile.flash_size, self.profile.flash_read_block),
            Memory::Eeprom => (self.profile.eeprom_size, self.profile.eeprom_read_block),
        };
        check_range(address, len, size)?;

        let mut out = vec![0u8; len];
        let mut address = address;
        for chunk in out.chunks_mut(block) {
            let len = chunk.len() as u16;
            let request = match memory {
                Memory::Flash => BootloaderRequest::ReadFlash { address, len },
                Memory::Eeprom => BootloaderRequest::ReadEeprom { address, len },
            };
            debug!("read {:?} 0x{:x}+{}", memory, address, len);
            self.read_exact(&request, chunk)?;
            address += len as u32;
        }
        Ok(out)
    }

    fn write_memory(&mut self, memory: Memory, address: u32, data: &[u8]) -> Result<(), BootloaderError> {
        let (size, block, ack) = match memory {
            Memory::Flash => (
                self.profile.flash_size,
                self.profile.flash_write_block,
                ACK_WRITE_FLASH,
            ),
            Memory::Eeprom => (
                self.profile.eeprom_size,
                self.profile.eeprom_write_block,
                ACK_WRITE_EEPROM,
            ),
        };
        check_range(address, data.len(), size)?;

        let mut address = address;
        for chunk in data.chunks(block) {
            let request = match memory {
                Memory::Flash => BootloaderRequest::WriteFlash { address, data: chunk },
                Memory::Eeprom => BootloaderRequest::WriteEeprom { address, data: chunk },
            };
            debug!("write {:?} 0x{:x}+{}", memory, address, chunk.len());
            self.expect_ack(&request, ack)?;
            address += chunk.len() as u32;
        }
        Ok(())
    }

    fn expect_ack(&mut self, request: &BootloaderRequest<'_>, ack: u8) -> Result<(), BootloaderError> {
        let mut reply = [0u8; 1];
        self.read_exact(request, &mut reply)?;
        if reply[0] != ack {
            debug!("request 0x{:02x}: ack 0x{:02x}", request.opcode(), reply[0]);
            return Err(BootloaderError::NoResponse {
                opcode: request.opcode(),
            });
        }
        Ok(())
    }

    /// Round trip that must return exactly `out.len()` bytes
    fn read_exact(&mut self, request: &BootloaderRequest<'_>, out: &mut [u8]) -> Result<(), BootloaderError> {
        let mut buf = [0u8; MAX_BODY_SIZE];
        let n = self.request(request, &mut buf)?;
        if n != out.len() {
            debug!(
                "request 0x{:02x}: {} bytes, expected {}",
                request.opcode(),
                n,
                out.len()
            );
            return Err(BootloaderError::NoResponse {
                opcode: request.opcode(),
            });
        }
        out.copy_from_slice(&buf[..n]);
        Ok(())
    }

    fn request(&mut self, request: &BootloaderRequest<'_>, out: &mut [u8]) -> Result<usize, BootloaderError> {
        let frame = request
            .to_frame()
            .map_err(|e| BootloaderError::Link(LinkError::Frame(e)))?;
        match self.link.send(&frame, out, SendMode::Sync) {
            Ok(n) => Ok(n),
            Err(LinkError::Timeout) => Err(BootloaderError::NoResponse {
                opcode: request.opcode(),
            }),
            Err(e) => Err(BootloaderError::Link(e)),
        }
    }
}

/// Reject `address + len` reaching past `size`
fn check_range(address: u32, len: usize, size: usize) -> Result<(), ValidationError> {
    match (address as usize).checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(ValidationError::OutOfRange { address, len, size }),
    }
}

/// Jump into the bootloader entry point, as placed at address 0 while
/// the application vector is not yet committed
///
/// Two little-endian instruction words: `0xEFkk` with the low byte of the
/// target word address, then `0xFkkk` with the next 12 bits.
pub fn reset_vector(boot_boundary: u32) -> [u8; 4] {
    let target = (boot_boundary + 2) / 2;
    let word1 = 0xEF00 | (target & 0xFF) as u16;
    let word2 = 0xF000 | ((target >> 8) & 0x0FFF) as u16;

    let mut vector = [0u8; 4];
    vector[..2].copy_from_slice(&word1.to_le_bytes());
    vector[2..].copy_from_slice(&word2.to_le_bytes());
    vector
}
