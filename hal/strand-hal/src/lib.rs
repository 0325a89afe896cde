//! Strand Hardware Abstraction Layer
//!
//! This crate defines the hardware abstraction traits shared by the
//! device-side script engine and the host-side control clients. Chip
//! support crates and host transports implement them; application logic
//! only ever sees the traits.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐     ┌──────────────────────┐
//! │ strand-core (device) │     │ strand-host (client) │
//! └──────────────────────┘     └──────────────────────┘
//!            │                            │
//!            ▼                            ▼
//! ┌─────────────────────────────────────────────────────┐
//! │  strand-hal (this crate - traits)                   │
//! └─────────────────────────────────────────────────────┘
//!            │                            │
//!            ▼                            ▼
//!     EEPROM / NV cells          TCP / UDP / serial link
//! ```
//!
//! # Traits
//!
//! - [`storage::Eeprom`] - Byte-addressed persistent storage
//! - [`transport::Transport`] - Byte-stream link to a controller

#![no_std]
#![deny(unsafe_code)]

pub mod storage;
pub mod transport;

// Re-export key traits at crate root for convenience
pub use storage::{Eeprom, StorageError};
pub use transport::{Transport, TransportError};
