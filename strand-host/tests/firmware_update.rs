//! Firmware update against a simulated controller
//!
//! Exercises the full bootloader path: identification, erase, program,
//! readback and version discovery, plus power loss in the middle of an
//! update.

mod common;

use proptest::prelude::*;
use strand_core::script::ScriptLayout;
use strand_host::bootloader::reset_vector;
use strand_host::{
    image_firmware_version, BootloaderError, Control, ImageError, MemoryImage, ValidationError,
};
use strand_protocol::bootloader::BL_WRITE_FLASH;
use strand_protocol::crc::crc16;

use common::{test_profile, SimulatedDevice};

const BOUNDARY: u32 = 0x1F800;
const APP_VECTOR: [u8; 4] = [0x12, 0x34, 0x56, 0x78];

/// Build an image of `len` bytes ending in a terminated version string
fn build_image(len: usize, version: &[u8; 7], seed: u8) -> Vec<u8> {
    let mut bytes: Vec<u8> = (0..len)
        .map(|i| ((i + seed as usize) % 200) as u8)
        .collect();
    bytes[..4].copy_from_slice(&APP_VECTOR);
    bytes[len - 8..len - 1].copy_from_slice(version);
    bytes[len - 1] = 0x00;
    bytes
}

fn session() -> Control<SimulatedDevice> {
    let profile = test_profile();
    let device = SimulatedDevice::new(&profile, BOUNDARY, ScriptLayout::default());
    Control::new(device, profile)
}

#[test]
fn test_program_and_read_back() {
    let mut control = session();
    let eeprom_size = control.profile().eeprom_size;
    // Autostart disabled before the update
    control.link().transport_mut().eeprom.borrow_mut()[eeprom_size - 1] = 0x00;

    let bytes = build_image(0x1235, b"1.07.03", 0);
    let image = MemoryImage::from_bytes(&bytes);

    let mut bl = control.bootloader();
    bl.program_flash(&image).unwrap();

    // Application body with the bootloader's reset vector at address 0
    let body = bl.read_flash(0, bytes.len()).unwrap();
    assert_eq!(body[..4], reset_vector(BOUNDARY));
    assert_eq!(body[4..], bytes[4..]);

    // Application vector in the block right below the bootloader
    let last = bl.read_flash(BOUNDARY - 64, 64).unwrap();
    assert!(last[..60].iter().all(|&b| b == 0xFF));
    assert_eq!(last[60..], APP_VECTOR);

    assert_eq!(bl.read_firmware_version().unwrap(), "1.07.03");
    assert_eq!(image_firmware_version(&image).unwrap(), "1.07.03");

    let autostart = bl.read_eeprom(eeprom_size as u32 - 1, 1).unwrap();
    assert_eq!(autostart, [0xFF]);

    let crcs = bl.read_flash_crc(0, 40).unwrap();
    let device = control.link().transport();
    let expected: Vec<u16> = device.flash[..40 * 64].chunks(64).map(crc16).collect();
    assert_eq!(crcs, expected);
}

#[test]
fn test_update_replaces_previous_image() {
    let mut control = session();

    let old = build_image(0x3000, b"1.06.00", 7);
    control
        .bootloader()
        .program_flash(&MemoryImage::from_bytes(&old))
        .unwrap();

    let new = build_image(0x0800, b"1.07.03", 0);
    control
        .bootloader()
        .program_flash(&MemoryImage::from_bytes(&new))
        .unwrap();

    let device = control.link().transport();
    assert_eq!(device.flash[4..new.len()], new[4..]);
    // Everything the old image left above the new one is erased
    assert!(device.flash[new.len()..(BOUNDARY - 64) as usize]
        .iter()
        .all(|&b| b == 0xFF));

    assert_eq!(control.bootloader().read_firmware_version().unwrap(), "1.07.03");
}

#[test]
fn test_power_loss_keeps_device_in_bootloader() {
    let mut control = session();

    let old = build_image(0x2000, b"1.06.00", 3);
    control
        .bootloader()
        .program_flash(&MemoryImage::from_bytes(&old))
        .unwrap();

    // Device dies ten blocks into the next update
    let written = control.link().transport().flash_writes.len();
    control.link().transport_mut().fail_after_writes = Some(written + 10);

    let new = build_image(0x2000, b"1.07.03", 0);
    let result = control.bootloader().program_flash(&MemoryImage::from_bytes(&new));
    assert_eq!(
        result,
        Err(BootloaderError::NoResponse {
            opcode: BL_WRITE_FLASH
        })
    );

    let device = control.link().transport();
    assert_eq!(device.flash[..4], reset_vector(BOUNDARY));
    let vector = (BOUNDARY - 4) as usize;
    assert!(device.flash[vector..vector + 4].iter().all(|&b| b == 0xFF));

    // A retry completes the update
    control.link().transport_mut().fail_after_writes = None;
    control
        .bootloader()
        .program_flash(&MemoryImage::from_bytes(&new))
        .unwrap();
    let device = control.link().transport();
    assert_eq!(device.flash[vector..vector + 4], APP_VECTOR);
}

#[test]
fn test_image_overlapping_bootloader_is_rejected() {
    let mut control = session();
    let bytes = build_image(BOUNDARY as usize + 1, b"9.99.99", 0);

    let result = control
        .bootloader()
        .program_flash(&MemoryImage::from_bytes(&bytes));
    assert!(matches!(result, Err(BootloaderError::Image(_))));

    // Only the identification request went out
    let device = control.link().transport();
    assert_eq!(device.requests, 1);
    assert!(device.flash_writes.is_empty());
}

#[test]
fn test_image_reaching_vector_block_is_rejected() {
    let mut control = session();
    let bytes = build_image(BOUNDARY as usize - 1, b"9.99.99", 0);

    let result = control
        .bootloader()
        .program_flash(&MemoryImage::from_bytes(&bytes));
    assert_eq!(
        result,
        Err(BootloaderError::Image(ImageError::InVectorBlock {
            end: BOUNDARY - 2,
            vector_block: BOUNDARY - 64,
        }))
    );

    let device = control.link().transport();
    assert_eq!(device.requests, 1);
    assert!(device.flash_writes.is_empty());
}

#[test]
fn test_largest_image_keeps_vector_intact() {
    let mut control = session();
    // Fills everything up to the vector block
    let bytes = build_image(BOUNDARY as usize - 64, b"1.07.03", 0);
    control
        .bootloader()
        .program_flash(&MemoryImage::from_bytes(&bytes))
        .unwrap();

    let device = control.link().transport();
    let vector = (BOUNDARY - 4) as usize;
    assert_eq!(device.flash[vector..vector + 4], APP_VECTOR);
    assert_eq!(device.flash[4..bytes.len()], bytes[4..]);
}

#[test]
fn test_erase_flash_clears_application() {
    let mut control = session();
    let bytes = build_image(0x1000, b"1.07.03", 0);
    control
        .bootloader()
        .program_flash(&MemoryImage::from_bytes(&bytes))
        .unwrap();

    control.bootloader().erase_flash().unwrap();

    let device = control.link().transport();
    assert!(device.flash[..BOUNDARY as usize].iter().all(|&b| b == 0xFF));
    assert_eq!(
        control.bootloader().read_firmware_version(),
        Err(BootloaderError::VersionNotFound)
    );
}

proptest! {
    #[test]
    fn prop_out_of_range_reads_send_nothing(
        address in 0u32..0x30000,
        len in 1usize..0x1000,
    ) {
        let mut control = session();
        let flash_size = control.profile().flash_size;
        prop_assume!(address as usize + len > flash_size);

        let result = control.bootloader().read_flash(address, len);
        prop_assert!(matches!(
            result,
            Err(BootloaderError::Validation(ValidationError::OutOfRange { .. }))
        ), "expected OutOfRange validation error, got {:?}", result);
        prop_assert_eq!(control.link().transport().requests, 0);
    }
}
