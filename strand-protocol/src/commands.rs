//! LED firmware commands
//!
//! Every command has a fixed one-byte code and a fixed-size payload. The
//! script-capable subset is also what the controller persists in its
//! script buffer, one [`SCRIPT_SLOT_SIZE`] slot per command.

use crate::frame::{Frame, FrameError};

// Command codes
pub const CMD_SET_COLOR: u8 = 0x02;
pub const CMD_SET_FADE: u8 = 0x03;
pub const CMD_LOOP_ON: u8 = 0x04;
pub const CMD_LOOP_OFF: u8 = 0x05;
pub const CMD_WAIT: u8 = 0x06;
pub const CMD_CLEAR_SCRIPT: u8 = 0x07;
pub const CMD_SET_RTC: u8 = 0x08;
pub const CMD_GET_CYCLETIME: u8 = 0x09;
pub const CMD_GET_TRACE: u8 = 0x0A;
pub const CMD_GET_RTC: u8 = 0x0B;
pub const CMD_GET_VERSION: u8 = 0x0C;
/// Also the status code a freshly started firmware answers with
pub const CMD_RUN_APP: u8 = 0x0D;
pub const CMD_START_BL: u8 = 0x0E;
pub const CMD_SET_COLOR_DIRECT: u8 = 0x0F;

/// Number of LEDs on the strip
pub const NUM_OF_LEDS: usize = 32;

/// Size of a direct color buffer (RGB per LED)
pub const LED_BUFFER_SIZE: usize = NUM_OF_LEDS * 3;

/// `LoopEnd::num_loops` value meaning "repeat forever"
pub const LOOP_INFINITE: u8 = 0;

// Payload sizes
const SET_COLOR_LEN: usize = 7;
const SET_FADE_LEN: usize = 10;
const LOOP_END_LEN: usize = 4;
const WAIT_LEN: usize = 2;
const RTC_LEN: usize = 7;

/// Largest payload of a script-capable command
pub const MAX_SCRIPT_PAYLOAD: usize = SET_FADE_LEN;

/// Bytes per persisted script slot: command code plus payload
pub const SCRIPT_SLOT_SIZE: usize = 1 + MAX_SCRIPT_PAYLOAD;

/// Set LEDs selected by `addr` to a color immediately
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SetColor {
    /// Bit mask of addressed LEDs (bit n = LED n)
    pub addr: u32,
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

/// Fade LEDs selected by `addr` to a color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SetFade {
    /// Bit mask of addressed LEDs (bit n = LED n)
    pub addr: u32,
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    /// Run in parallel with the next fade instead of after it
    pub parallel: bool,
    /// Fade duration in controller ticks
    pub fade_ticks: u16,
}

/// Loop end marker
///
/// The host only fills `num_loops`; the controller fills the rest when
/// the command is added to its script buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LoopEnd {
    /// Slot of the first command in the loop body
    pub start_index: u8,
    /// Nesting depth, 0 for the outermost loop
    pub depth: u8,
    /// Passes left, [`LOOP_INFINITE`] for endless loops
    pub counter: u8,
    /// Total passes requested
    pub num_loops: u8,
}

impl LoopEnd {
    /// Loop end as sent by the host
    pub const fn new(num_loops: u8) -> Self {
        Self {
            start_index: 0,
            depth: 0,
            counter: 0,
            num_loops,
        }
    }

    /// True if this loop never terminates
    pub const fn is_infinite(&self) -> bool {
        self.counter == LOOP_INFINITE
    }
}

/// Real-time clock value, `struct tm` style fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RtcTime {
    pub sec: u8,
    pub min: u8,
    pub hour: u8,
    /// Day of month, 1-31
    pub mday: u8,
    /// Month, 0-11
    pub mon: u8,
    /// Years since 1900
    pub year: u8,
    /// Day of week, 0 = Sunday
    pub wday: u8,
}

impl RtcTime {
    fn to_bytes(self) -> [u8; RTC_LEN] {
        [
            self.sec, self.min, self.hour, self.mday, self.mon, self.year, self.wday,
        ]
    }

    /// Decode from the 7-byte wire layout
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        let b = payload_prefix(bytes, RTC_LEN)?;
        Ok(Self {
            sec: b[0],
            min: b[1],
            hour: b[2],
            mday: b[3],
            mon: b[4],
            year: b[5],
            wday: b[6],
        })
    }
}

/// Commands understood by the LED firmware
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    SetColor(SetColor),
    SetFade(SetFade),
    /// Start of a loop body
    LoopOn,
    /// End of a loop body
    LoopOff(LoopEnd),
    /// Pause the script for a number of ticks
    Wait { ticks: u16 },
    /// Delete every command from the script buffer
    ClearScript,
    SetRtc(RtcTime),
    GetCycletime,
    GetTrace,
    GetRtc,
    GetVersion,
    RunApp,
    /// Jump back into the bootloader
    StartBl,
    /// Write raw RGB values for every LED, bypassing the script
    SetColorDirect([u8; LED_BUFFER_SIZE]),
}

impl Command {
    /// Wire code of this command
    pub fn code(&self) -> u8 {
        match self {
            Command::SetColor(_) => CMD_SET_COLOR,
            Command::SetFade(_) => CMD_SET_FADE,
            Command::LoopOn => CMD_LOOP_ON,
            Command::LoopOff(_) => CMD_LOOP_OFF,
            Command::Wait { .. } => CMD_WAIT,
            Command::ClearScript => CMD_CLEAR_SCRIPT,
            Command::SetRtc(_) => CMD_SET_RTC,
            Command::GetCycletime => CMD_GET_CYCLETIME,
            Command::GetTrace => CMD_GET_TRACE,
            Command::GetRtc => CMD_GET_RTC,
            Command::GetVersion => CMD_GET_VERSION,
            Command::RunApp => CMD_RUN_APP,
            Command::StartBl => CMD_START_BL,
            Command::SetColorDirect(_) => CMD_SET_COLOR_DIRECT,
        }
    }

    /// Returns true if the controller queues this command in its script
    /// buffer rather than handling it immediately
    pub fn is_scriptable(&self) -> bool {
        matches!(
            self,
            Command::SetColor(_)
                | Command::SetFade(_)
                | Command::LoopOn
                | Command::LoopOff(_)
                | Command::Wait { .. }
                | Command::ClearScript
        )
    }

    /// Write the payload into `buf`, returning its length
    pub fn write_payload(&self, buf: &mut [u8]) -> Result<usize, FrameError> {
        let len = self.payload_len();
        let out = buf.get_mut(..len).ok_or(FrameError::BufferTooSmall)?;

        match self {
            Command::SetColor(c) => {
                out[..4].copy_from_slice(&c.addr.to_le_bytes());
                out[4] = c.red;
                out[5] = c.green;
                out[6] = c.blue;
            }
            Command::SetFade(f) => {
                out[..4].copy_from_slice(&f.addr.to_le_bytes());
                out[4] = f.red;
                out[5] = f.green;
                out[6] = f.blue;
                out[7] = f.parallel as u8;
                out[8..10].copy_from_slice(&f.fade_ticks.to_be_bytes());
            }
            Command::LoopOff(l) => {
                out.copy_from_slice(&[l.start_index, l.depth, l.counter, l.num_loops]);
            }
            Command::Wait { ticks } => out.copy_from_slice(&ticks.to_be_bytes()),
            Command::SetRtc(t) => out.copy_from_slice(&t.to_bytes()),
            Command::SetColorDirect(leds) => out.copy_from_slice(leds),
            Command::LoopOn
            | Command::ClearScript
            | Command::GetCycletime
            | Command::GetTrace
            | Command::GetRtc
            | Command::GetVersion
            | Command::RunApp
            | Command::StartBl => {}
        }

        Ok(len)
    }

    /// Payload length in bytes
    pub fn payload_len(&self) -> usize {
        match self {
            Command::SetColor(_) => SET_COLOR_LEN,
            Command::SetFade(_) => SET_FADE_LEN,
            Command::LoopOff(_) => LOOP_END_LEN,
            Command::Wait { .. } => WAIT_LEN,
            Command::SetRtc(_) => RTC_LEN,
            Command::SetColorDirect(_) => LED_BUFFER_SIZE,
            Command::LoopOn
            | Command::ClearScript
            | Command::GetCycletime
            | Command::GetTrace
            | Command::GetRtc
            | Command::GetVersion
            | Command::RunApp
            | Command::StartBl => 0,
        }
    }

    /// Decode a command from its code and payload
    ///
    /// Trailing payload bytes beyond the fixed layout are ignored, so a
    /// padded slot or an oversized frame decodes the same as an exact one.
    pub fn decode(code: u8, payload: &[u8]) -> Result<Self, FrameError> {
        let cmd = match code {
            CMD_SET_COLOR => {
                let b = payload_prefix(payload, SET_COLOR_LEN)?;
                Command::SetColor(SetColor {
                    addr: u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
                    red: b[4],
                    green: b[5],
                    blue: b[6],
                })
            }
            CMD_SET_FADE => {
                let b = payload_prefix(payload, SET_FADE_LEN)?;
                Command::SetFade(SetFade {
                    addr: u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
                    red: b[4],
                    green: b[5],
                    blue: b[6],
                    parallel: b[7] != 0,
                    fade_ticks: u16::from_be_bytes([b[8], b[9]]),
                })
            }
            CMD_LOOP_ON => Command::LoopOn,
            CMD_LOOP_OFF => {
                let b = payload_prefix(payload, LOOP_END_LEN)?;
                Command::LoopOff(LoopEnd {
                    start_index: b[0],
                    depth: b[1],
                    counter: b[2],
                    num_loops: b[3],
                })
            }
            CMD_WAIT => {
                let b = payload_prefix(payload, WAIT_LEN)?;
                Command::Wait {
                    ticks: u16::from_be_bytes([b[0], b[1]]),
                }
            }
            CMD_CLEAR_SCRIPT => Command::ClearScript,
            CMD_SET_RTC => Command::SetRtc(RtcTime::from_bytes(payload)?),
            CMD_GET_CYCLETIME => Command::GetCycletime,
            CMD_GET_TRACE => Command::GetTrace,
            CMD_GET_RTC => Command::GetRtc,
            CMD_GET_VERSION => Command::GetVersion,
            CMD_RUN_APP => Command::RunApp,
            CMD_START_BL => Command::StartBl,
            CMD_SET_COLOR_DIRECT => {
                let b = payload_prefix(payload, LED_BUFFER_SIZE)?;
                let mut leds = [0u8; LED_BUFFER_SIZE];
                leds.copy_from_slice(b);
                Command::SetColorDirect(leds)
            }
            other => return Err(FrameError::UnknownCommand(other)),
        };
        Ok(cmd)
    }

    /// Encode this command into a request frame
    pub fn to_frame(&self) -> Result<Frame, FrameError> {
        let mut payload = [0u8; LED_BUFFER_SIZE];
        let len = self.write_payload(&mut payload)?;
        Frame::new(self.code(), &payload[..len])
    }

    /// Parse a command from a request frame
    pub fn from_frame(frame: &Frame) -> Result<Self, FrameError> {
        Self::decode(frame.command, &frame.payload)
    }

    /// Encode into a zero-padded script slot
    pub fn to_slot(&self) -> Result<[u8; SCRIPT_SLOT_SIZE], FrameError> {
        if self.payload_len() > MAX_SCRIPT_PAYLOAD {
            return Err(FrameError::PayloadTooLarge);
        }
        let mut slot = [0u8; SCRIPT_SLOT_SIZE];
        slot[0] = self.code();
        self.write_payload(&mut slot[1..])?;
        Ok(slot)
    }

    /// Decode a script slot
    pub fn from_slot(slot: &[u8; SCRIPT_SLOT_SIZE]) -> Result<Self, FrameError> {
        Self::decode(slot[0], &slot[1..])
    }
}

fn payload_prefix(payload: &[u8], len: usize) -> Result<&[u8], FrameError> {
    payload.get(..len).ok_or(FrameError::Incomplete)
}
