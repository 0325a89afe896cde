//! Hardware abstraction traits
//!
//! These traits define the interface between the controller logic and
//! board-specific implementations.

pub mod ledstrip;

pub use ledstrip::LedStrip;
