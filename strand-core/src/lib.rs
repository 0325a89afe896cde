//! Board-agnostic controller logic for Strand LED strips
//!
//! This crate contains the controller-side logic that does not depend on
//! a specific chip:
//!
//! - Script engine: persistent circular command queue with loop replay
//! - LED actuation trait consumed by the engine

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod script;
pub mod traits;
