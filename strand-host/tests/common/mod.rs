//! Simulated controller for end-to-end tests
//!
//! Models NOR flash (erase sets 0xFF, programming can only clear bits),
//! byte-addressed EEPROM shared with the script engine, and both protocol
//! personalities: bootloader and LED firmware.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use strand_core::script::{AddOutcome, ScriptBuffer, ScriptLayout, Step};
use strand_core::traits::LedStrip;
use strand_hal::{Eeprom, StorageError, Transport, TransportError};
use strand_host::DeviceProfile;
use strand_protocol::bootloader::{ACK_ERASE_FLASH, ACK_WRITE_EEPROM, ACK_WRITE_FLASH};
use strand_protocol::commands::CMD_RUN_APP;
use strand_protocol::crc::crc16;
use strand_protocol::frame::encode_body;
use strand_protocol::{
    BootInfo, BootloaderRequest, Command, Frame, FrameParser, Response, ResponseState, RtcTime,
    SetColor, SetFade, MAX_BODY_SIZE,
};

pub const FIRMWARE_VERSION: &[u8] = b"1.07.03\0";

/// EEPROM cells shared between the bootloader view and the script engine
#[derive(Clone)]
pub struct SharedEeprom(pub Rc<RefCell<Vec<u8>>>);

impl Eeprom for SharedEeprom {
    fn capacity(&self) -> usize {
        self.0.borrow().len()
    }

    fn read_block(&mut self, address: u16, buf: &mut [u8]) -> Result<(), StorageError> {
        let cells = self.0.borrow();
        let start = address as usize;
        let src = cells
            .get(start..start + buf.len())
            .ok_or(StorageError::OutOfRange)?;
        buf.copy_from_slice(src);
        Ok(())
    }

    fn write_block(&mut self, address: u16, data: &[u8]) -> Result<(), StorageError> {
        let mut cells = self.0.borrow_mut();
        let start = address as usize;
        let dst = cells
            .get_mut(start..start + data.len())
            .ok_or(StorageError::OutOfRange)?;
        dst.copy_from_slice(data);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actuation {
    Color(SetColor),
    Fade(SetFade),
}

#[derive(Default)]
pub struct RecordingStrip {
    pub log: Vec<Actuation>,
}

impl LedStrip for RecordingStrip {
    fn set_color(&mut self, cmd: &SetColor) {
        self.log.push(Actuation::Color(*cmd));
    }

    fn set_fade(&mut self, cmd: &SetFade) {
        self.log.push(Actuation::Fade(*cmd));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Bootloader,
    Firmware,
}

pub struct SimulatedDevice {
    pub mode: Mode,
    pub boundary: u32,
    pub page_size: usize,
    pub flash: Vec<u8>,
    pub eeprom: Rc<RefCell<Vec<u8>>>,
    pub script: ScriptBuffer<SharedEeprom>,
    pub strip: RecordingStrip,
    pub direct: Vec<u8>,
    pub rtc: RtcTime,
    /// Every flash write as received, in order
    pub flash_writes: Vec<(u32, Vec<u8>)>,
    /// Number of requests received
    pub requests: usize,
    /// Go silent once this many flash writes were accepted
    pub fail_after_writes: Option<usize>,
    outbox: VecDeque<u8>,
}

impl SimulatedDevice {
    pub fn new(profile: &DeviceProfile, boundary: u32, layout: ScriptLayout) -> Self {
        let eeprom = Rc::new(RefCell::new(vec![0xFF; profile.eeprom_size]));
        let mut script = ScriptBuffer::new(SharedEeprom(eeprom.clone()), layout);
        script.init().expect("script init");

        Self {
            mode: Mode::Bootloader,
            boundary,
            page_size: profile.erase_page_size,
            flash: vec![0xFF; profile.flash_size],
            eeprom,
            script,
            strip: RecordingStrip::default(),
            direct: Vec::new(),
            rtc: RtcTime::default(),
            flash_writes: Vec::new(),
            requests: 0,
            fail_after_writes: None,
            outbox: VecDeque::new(),
        }
    }

    /// One pass of the firmware main loop
    pub fn tick(&mut self) -> Step {
        self.script.run(&mut self.strip).expect("script run")
    }

    /// Run the script until it has nothing left to do
    pub fn run_to_idle(&mut self) {
        for _ in 0..10_000 {
            if self.tick() == Step::Idle {
                return;
            }
        }
        panic!("script never went idle");
    }

    fn handle_bootloader(&mut self, frame: &Frame) -> Option<Vec<u8>> {
        let request = BootloaderRequest::from_frame(frame).ok()?;
        match request {
            BootloaderRequest::Info => Some(
                BootInfo {
                    boot_boundary: self.boundary,
                    version_major: 1,
                    version_minor: 0,
                    family_id: 0x0001,
                }
                .encode()
                .to_vec(),
            ),
            BootloaderRequest::ReadFlash { address, len } => {
                let start = address as usize;
                self.flash.get(start..start + len as usize).map(<[u8]>::to_vec)
            }
            BootloaderRequest::ReadEeprom { address, len } => {
                let start = address as usize;
                self.eeprom
                    .borrow()
                    .get(start..start + len as usize)
                    .map(<[u8]>::to_vec)
            }
            BootloaderRequest::ReadCrc { address, num_pages } => {
                let mut out = Vec::new();
                for page in 0..num_pages as usize {
                    let start = address as usize + page * self.page_size;
                    let data = self.flash.get(start..start + self.page_size)?;
                    out.extend_from_slice(&crc16(data).to_be_bytes());
                }
                Some(out)
            }
            BootloaderRequest::EraseFlash {
                end_address,
                num_pages,
            } => {
                let last = end_address as usize / self.page_size;
                let first = (last + 1).saturating_sub(num_pages as usize);
                let start = first * self.page_size;
                let end = ((last + 1) * self.page_size).min(self.flash.len());
                self.flash[start..end].fill(0xFF);
                Some(vec![ACK_ERASE_FLASH])
            }
            BootloaderRequest::WriteFlash { address, data } => {
                if self.fail_after_writes == Some(self.flash_writes.len()) {
                    return None;
                }
                let start = address as usize;
                let cells = self.flash.get_mut(start..start + data.len())?;
                for (cell, &byte) in cells.iter_mut().zip(data) {
                    *cell &= byte;
                }
                self.flash_writes.push((address, data.to_vec()));
                Some(vec![ACK_WRITE_FLASH])
            }
            BootloaderRequest::WriteEeprom { address, data } => {
                let start = address as usize;
                let mut cells = self.eeprom.borrow_mut();
                cells.get_mut(start..start + data.len())?.copy_from_slice(data);
                Some(vec![ACK_WRITE_EEPROM])
            }
            BootloaderRequest::RunApp => {
                self.mode = Mode::Firmware;
                self.script.init().ok()?;
                Some(encode_response(&Response::new(CMD_RUN_APP, ResponseState::Ok, &[]).ok()?))
            }
        }
    }

    fn handle_firmware(&mut self, frame: &Frame) -> Vec<u8> {
        let mut data = Vec::new();
        let state = match Command::from_frame(frame) {
            Err(_) => ResponseState::BadCommand,
            Ok(cmd) if cmd.is_scriptable() => match self.script.add(&cmd) {
                Ok(AddOutcome::Dropped) => ResponseState::ScriptBufferFull,
                Ok(_) => ResponseState::Ok,
                Err(_) => ResponseState::BadCommand,
            },
            Ok(Command::SetRtc(time)) => {
                self.rtc = time;
                ResponseState::Ok
            }
            Ok(Command::GetRtc) => {
                let mut buf = [0u8; 16];
                let len = Command::SetRtc(self.rtc)
                    .write_payload(&mut buf)
                    .unwrap_or_default();
                data.extend_from_slice(&buf[..len]);
                ResponseState::Ok
            }
            Ok(Command::GetVersion) => {
                data.extend_from_slice(FIRMWARE_VERSION);
                ResponseState::Ok
            }
            Ok(Command::GetCycletime) => {
                data.extend_from_slice(&[0x00, 0x2A, 0x00, 0x30]);
                ResponseState::Ok
            }
            Ok(Command::SetColorDirect(leds)) => {
                self.direct = leds.to_vec();
                ResponseState::Ok
            }
            Ok(Command::StartBl) => {
                self.mode = Mode::Bootloader;
                ResponseState::Ok
            }
            Ok(_) => ResponseState::Ok,
        };

        let response = Response::new(frame.command, state, &data).expect("response fits");
        let reply = encode_response(&response);

        // The main loop gets one pass per received frame
        if self.mode == Mode::Firmware {
            self.tick();
        }
        reply
    }
}

fn encode_response(response: &Response) -> Vec<u8> {
    let mut body = [0u8; MAX_BODY_SIZE];
    let len = response.encode_body(&mut body).expect("response body");
    body[..len].to_vec()
}

impl Transport for SimulatedDevice {
    fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let mut parser = FrameParser::new();
        let (body, _) = parser.feed_bytes(data).map_err(|_| TransportError::Io)?;
        let body = body.ok_or(TransportError::Io)?;
        let frame = Frame::from_body(&body).map_err(|_| TransportError::Io)?;
        self.requests += 1;

        let reply = match self.mode {
            Mode::Bootloader => self.handle_bootloader(&frame),
            Mode::Firmware => Some(self.handle_firmware(&frame)),
        };

        if let Some(reply) = reply {
            let mut framed = [0u8; 256];
            let len = encode_body(&reply, &mut framed).map_err(|_| TransportError::Io)?;
            self.outbox.extend(&framed[..len]);
        }
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize, TransportError> {
        if self.outbox.is_empty() {
            return Err(TransportError::Timeout);
        }
        let n = buf.len().min(self.outbox.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.outbox.pop_front().unwrap_or_default();
        }
        Ok(n)
    }
}

/// Profile with a short timeout so silent-device tests finish quickly
pub fn test_profile() -> DeviceProfile {
    DeviceProfile {
        response_timeout_ms: 20,
        ..Default::default()
    }
}
