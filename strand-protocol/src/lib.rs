//! Strand Controller Protocol
//!
//! This crate defines the binary protocol spoken between a host and a
//! WiFi-attached LED strip controller, both while the LED firmware is
//! running and while the controller sits in its bootloader.
//!
//! # Protocol Overview
//!
//! Every unit on the wire is a length-prefixed frame:
//! ```text
//! ┌────────┬─────────────────────────────┐
//! │ LENGTH │ BODY                        │
//! │ 1B     │ LENGTH - 1 bytes            │
//! └────────┴─────────────────────────────┘
//! ```
//!
//! Requests carry `[command][payload…]` as body, so `LENGTH` equals the
//! payload size plus two. Firmware responses carry
//! `[command][state][data…][crc_hi][crc_lo]`; bootloader responses are raw
//! data or a single acknowledge byte.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod bootloader;
pub mod commands;
pub mod crc;
pub mod frame;
pub mod response;

pub use bootloader::{BootInfo, BootloaderRequest};
pub use commands::{Command, LoopEnd, RtcTime, SetColor, SetFade, SCRIPT_SLOT_SIZE};
pub use frame::{Frame, FrameError, FrameParser, MAX_BODY_SIZE, MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE};
pub use response::{Response, ResponseState};
