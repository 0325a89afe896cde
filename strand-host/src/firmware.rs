//! LED firmware client
//!
//! Every command is a CRC-checked exchange through
//! [`DeviceLink::exchange_checked`]. Durations are given in milliseconds
//! and converted to controller ticks with the profile's calibration.

use log::{debug, warn};
use strand_hal::Transport;
use strand_protocol::commands::{LED_BUFFER_SIZE, LOOP_INFINITE};
use strand_protocol::{Command, LoopEnd, Response, ResponseState, RtcTime, SetColor, SetFade};

use crate::config::DeviceProfile;
use crate::error::{FirmwareError, LinkError};
use crate::link::DeviceLink;

/// Shortest fade the controller renders smoothly, in ticks
pub const MIN_FADE_TICKS: u16 = 4;

/// Address mask selecting every LED
pub const LEDS_ALL: u32 = 0xFFFF_FFFF;

/// Convert a fade duration to ticks, never below [`MIN_FADE_TICKS`]
pub fn fade_ticks(fade_ms: u32, calibration_ms: u32) -> u16 {
    let ticks = fade_ms / calibration_ms.max(1);
    (ticks.min(u16::MAX as u32) as u16).max(MIN_FADE_TICKS)
}

/// Convert a wait duration to ticks
pub fn wait_ticks(wait_ms: u32, calibration_ms: u32) -> u16 {
    let ticks = wait_ms / calibration_ms.max(1);
    ticks.min(u16::MAX as u32) as u16
}

/// Split `0xAARRGGBB` into its color channels; alpha is ignored
fn rgb(argb: u32) -> (u8, u8, u8) {
    ((argb >> 16) as u8, (argb >> 8) as u8, argb as u8)
}

/// Client for commands handled by the running LED firmware
pub struct FirmwareClient<'a, T> {
    link: &'a mut DeviceLink<T>,
    profile: &'a DeviceProfile,
}

impl<'a, T: Transport> FirmwareClient<'a, T> {
    /// Create a client over `link` for a device described by `profile`
    pub fn new(link: &'a mut DeviceLink<T>, profile: &'a DeviceProfile) -> Self {
        Self { link, profile }
    }

    /// Delete every command from the controller's script buffer
    pub fn clear_script(&mut self) -> Result<(), FirmwareError> {
        self.send(&Command::ClearScript).map(drop)
    }

    /// Open a loop body
    pub fn loop_on(&mut self) -> Result<(), FirmwareError> {
        self.send(&Command::LoopOn).map(drop)
    }

    /// Close the innermost loop body; `num_loops` 0 repeats forever
    pub fn loop_off(&mut self, num_loops: u8) -> Result<(), FirmwareError> {
        self.send(&Command::LoopOff(LoopEnd::new(num_loops))).map(drop)
    }

    /// Close the innermost loop body, repeating it forever
    pub fn loop_forever(&mut self) -> Result<(), FirmwareError> {
        self.loop_off(LOOP_INFINITE)
    }

    /// Queue a color change for the LEDs selected by `addr`
    pub fn set_color(&mut self, argb: u32, addr: u32) -> Result<(), FirmwareError> {
        let (red, green, blue) = rgb(argb);
        self.send(&Command::SetColor(SetColor {
            addr,
            red,
            green,
            blue,
        }))
        .map(drop)
    }

    /// Write raw RGB triples for every LED, bypassing the script
    ///
    /// Extra bytes are ignored; missing LEDs are set to black.
    pub fn set_color_direct(&mut self, leds: &[u8]) -> Result<(), FirmwareError> {
        let mut buffer = [0u8; LED_BUFFER_SIZE];
        let len = leds.len().min(LED_BUFFER_SIZE);
        buffer[..len].copy_from_slice(&leds[..len]);
        self.send(&Command::SetColorDirect(buffer)).map(drop)
    }

    /// Queue a fade of the LEDs selected by `addr` to `argb`
    ///
    /// With `parallel` set the fade starts together with the next one.
    pub fn set_fade(&mut self, argb: u32, fade_ms: u32, addr: u32, parallel: bool) -> Result<(), FirmwareError> {
        let (red, green, blue) = rgb(argb);
        let fade_ticks = fade_ticks(fade_ms, self.profile.calibration_ms);
        debug!("fade {}ms -> {} ticks", fade_ms, fade_ticks);
        self.send(&Command::SetFade(SetFade {
            addr,
            red,
            green,
            blue,
            parallel,
            fade_ticks,
        }))
        .map(drop)
    }

    /// Queue a pause of the script
    pub fn set_wait(&mut self, wait_ms: u32) -> Result<(), FirmwareError> {
        let ticks = wait_ticks(wait_ms, self.profile.calibration_ms);
        self.send(&Command::Wait { ticks }).map(drop)
    }

    /// Set the controller's real-time clock
    pub fn set_rtc(&mut self, time: &RtcTime) -> Result<(), FirmwareError> {
        self.send(&Command::SetRtc(*time)).map(drop)
    }

    /// Read the controller's real-time clock
    pub fn get_rtc(&mut self) -> Result<RtcTime, FirmwareError> {
        let response = self.send(&Command::GetRtc)?;
        RtcTime::from_bytes(&response.data).map_err(|_| FirmwareError::NoResponse {
            command: response.command,
        })
    }

    /// Read the firmware version string
    pub fn get_version(&mut self) -> Result<String, FirmwareError> {
        let response = self.send(&Command::GetVersion)?;
        let text = response.data.split(|&b| b == 0).next().unwrap_or_default();
        if text.is_empty() {
            return Err(FirmwareError::NoResponse {
                command: response.command,
            });
        }
        Ok(String::from_utf8_lossy(text).into_owned())
    }

    /// Read the controller's trace buffer
    pub fn get_trace(&mut self) -> Result<Vec<u8>, FirmwareError> {
        let response = self.send(&Command::GetTrace)?;
        Ok(response.data.to_vec())
    }

    /// Read the controller's recorded cycle times, in ticks
    pub fn get_cycletime(&mut self) -> Result<Vec<u16>, FirmwareError> {
        let response = self.send(&Command::GetCycletime)?;
        if response.data.len() % 2 != 0 {
            return Err(FirmwareError::NoResponse {
                command: response.command,
            });
        }
        Ok(response
            .data
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect())
    }

    /// Leave the firmware and enter the bootloader
    pub fn start_bootloader(&mut self) -> Result<(), FirmwareError> {
        self.send(&Command::StartBl).map(drop)
    }

    fn send(&mut self, cmd: &Command) -> Result<Response, FirmwareError> {
        let command = cmd.code();
        let frame = cmd
            .to_frame()
            .map_err(|e| FirmwareError::Link(LinkError::Frame(e)))?;

        let response = match self.link.exchange_checked(&frame) {
            Ok(response) => response,
            Err(LinkError::NoResponse { .. }) | Err(LinkError::Timeout) => {
                return Err(FirmwareError::NoResponse { command });
            }
            Err(e) => return Err(FirmwareError::Link(e)),
        };

        match response.state {
            ResponseState::Ok => Ok(response),
            ResponseState::ScriptBufferFull => Err(FirmwareError::ScriptBufferFull { command }),
            state => {
                warn!("command 0x{:02x} rejected, state 0x{:02x}", command, state.to_byte());
                Err(FirmwareError::Rejected {
                    command,
                    state: state.to_byte(),
                })
            }
        }
    }
}
