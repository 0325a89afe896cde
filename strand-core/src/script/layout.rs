//! Persistent layout of the script buffer
//!
//! ```text
//! offset 0   read index   (1 byte)
//! offset 1   write index  (1 byte)
//! offset 2   in-loop flag (1 byte, 0 or 1)
//! offset 4   slot 0 .. slot N, SCRIPT_SLOT_SIZE bytes each
//! ```

use strand_protocol::SCRIPT_SLOT_SIZE;

/// Storage cell of the read index
pub const READ_CELL: u16 = 0;
/// Storage cell of the write index
pub const WRITE_CELL: u16 = 1;
/// Storage cell of the in-loop flag
pub const IN_LOOP_CELL: u16 = 2;
/// Default offset of slot 0
pub const SCRIPT_BASE: u16 = 4;
/// Default slot count (N + 1, one slot always stays free)
pub const SCRIPT_SLOTS: u8 = 64;
/// Smallest usable ring: one command plus the free slot
pub const MIN_SLOTS: u8 = 2;

/// Where the script buffer lives in persistent storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScriptLayout {
    /// Offset of slot 0
    pub base: u16,
    /// Number of slots, including the one that is always kept free
    pub slots: u8,
}

impl Default for ScriptLayout {
    fn default() -> Self {
        Self {
            base: SCRIPT_BASE,
            slots: SCRIPT_SLOTS,
        }
    }
}

impl ScriptLayout {
    /// Layout with a custom slot count at the default base
    ///
    /// Counts below [`MIN_SLOTS`] are raised to it.
    pub const fn with_slots(slots: u8) -> Self {
        Self {
            base: SCRIPT_BASE,
            slots: if slots < MIN_SLOTS { MIN_SLOTS } else { slots },
        }
    }

    /// Storage offset of a slot
    pub fn slot_address(&self, index: u8) -> u16 {
        self.base + index as u16 * SCRIPT_SLOT_SIZE as u16
    }

    /// Index following `index`, wrapping at the end of the buffer
    pub fn next(&self, index: u8) -> u8 {
        (index as u16 + 1).checked_rem(self.slots as u16).unwrap_or(0) as u8
    }

    /// Commands the buffer can hold at once
    pub fn capacity(&self) -> usize {
        (self.slots as usize).saturating_sub(1)
    }

    /// First storage offset past the last slot
    pub fn storage_end(&self) -> usize {
        self.base as usize + self.slots as usize * SCRIPT_SLOT_SIZE
    }

    /// Returns true if `index` names a slot
    pub fn contains(&self, index: u8) -> bool {
        index < self.slots
    }

    /// Returns true if the ring is usable and ends within `capacity` bytes
    /// of storage
    pub fn fits(&self, capacity: usize) -> bool {
        self.slots >= MIN_SLOTS
            && self.base > IN_LOOP_CELL
            && self.storage_end() <= capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout_fits_small_eeprom() {
        let layout = ScriptLayout::default();
        assert!(layout.storage_end() <= 1024);
        assert_eq!(layout.capacity(), 63);
        assert!(layout.base > IN_LOOP_CELL);
    }

    #[test]
    fn test_next_wraps() {
        let layout = ScriptLayout::with_slots(4);
        assert_eq!(layout.next(0), 1);
        assert_eq!(layout.next(3), 0);
    }

    #[test]
    fn test_tiny_slot_counts_are_raised() {
        assert_eq!(ScriptLayout::with_slots(0).slots, MIN_SLOTS);
        assert_eq!(ScriptLayout::with_slots(1).slots, MIN_SLOTS);
        assert_eq!(ScriptLayout::with_slots(3).slots, 3);
    }

    #[test]
    fn test_zero_slots_never_divides() {
        let layout = ScriptLayout { base: SCRIPT_BASE, slots: 0 };
        assert_eq!(layout.next(0), 0);
        assert_eq!(layout.capacity(), 0);
        assert!(!layout.fits(1024));
    }

    #[test]
    fn test_fits_checks_storage_end() {
        let layout = ScriptLayout::default();
        assert!(layout.fits(layout.storage_end()));
        assert!(!layout.fits(layout.storage_end() - 1));
        assert!(!ScriptLayout { base: 0, slots: 4 }.fits(1024));
    }

    #[test]
    fn test_slot_address() {
        let layout = ScriptLayout::default();
        assert_eq!(layout.slot_address(0), SCRIPT_BASE);
        assert_eq!(layout.slot_address(2), SCRIPT_BASE + 2 * SCRIPT_SLOT_SIZE as u16);
    }
}
