//! Persistent script buffer
//!
//! A circular queue of commands kept in EEPROM. Three indices walk the
//! ring:
//!
//! - `read`: oldest slot still needed; everything before it is free
//! - `execute`: next slot to run, always between `read` and `write`
//! - `write`: next free slot
//!
//! Commands inside a loop body stay resident (`read` does not move past
//! them) until the outermost loop finishes, so the body can be replayed.
//! `read`, `write` and the in-loop flag are persisted individually the
//! moment they change; `execute` is rebuilt from `read` on boot.

use heapless::Vec;
use log::{debug, trace, warn};
use strand_hal::{Eeprom, StorageError};
use strand_protocol::{Command, LoopEnd, SCRIPT_SLOT_SIZE};

use super::layout::{ScriptLayout, IN_LOOP_CELL, READ_CELL, WRITE_CELL};
use crate::traits::LedStrip;

/// Maximum loop nesting depth
pub const MAX_LOOP_DEPTH: usize = 16;

/// Result of [`ScriptBuffer::add`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddOutcome {
    /// Command persisted in the buffer
    Stored,
    /// No room (or not storable); the command was discarded
    Dropped,
    /// A clear is pending; the command was ignored
    Ignored,
    /// The buffer will be wiped on the next tick
    ClearScheduled,
}

/// What a single [`ScriptBuffer::run`] tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Step {
    /// Nothing to execute
    Idle,
    /// Pending clear was performed
    Cleared,
    /// Entered a loop body
    LoopStart,
    /// Jumped back to the start of a loop body
    LoopRepeat,
    /// Left a loop
    LoopExit,
    /// Drove the LED strip
    Actuated,
    /// Holding on a wait command
    Waiting,
    /// Wait command elapsed
    WaitDone,
    /// Slot held nothing the engine executes
    Skipped,
}

/// Script engine state
///
/// Owned by the controller's main loop; storage is injected so the engine
/// runs unchanged against real EEPROM or a test double.
#[derive(Debug)]
pub struct ScriptBuffer<S> {
    storage: S,
    layout: ScriptLayout,
    read: u8,
    write: u8,
    execute: u8,
    in_loop: bool,
    clearing: bool,
    /// Write index of each open `LoopOn`, by depth
    loop_starts: Vec<u8, MAX_LOOP_DEPTH>,
    /// Ticks left on the wait command at `execute`
    wait_remaining: Option<u16>,
}

impl<S: Eeprom> ScriptBuffer<S> {
    /// Create an engine over `storage`
    ///
    /// The in-memory state is empty until [`init`](Self::init) loads the
    /// persisted indices.
    pub fn new(storage: S, layout: ScriptLayout) -> Self {
        Self {
            storage,
            layout,
            read: 0,
            write: 0,
            execute: 0,
            in_loop: false,
            clearing: false,
            loop_starts: Vec::new(),
            wait_remaining: None,
        }
    }

    /// Load persisted state after a reset
    ///
    /// Execution resumes at `read`, which replays any loop that was
    /// running when power was lost. Indices that cannot be valid (e.g.
    /// erased EEPROM) reset the buffer. A layout that does not fit the
    /// storage is reported as [`StorageError::OutOfRange`].
    pub fn init(&mut self) -> Result<(), StorageError> {
        if !self.layout.fits(self.storage.capacity()) {
            warn!(
                "script layout ends at {} beyond storage of {}",
                self.layout.storage_end(),
                self.storage.capacity()
            );
            return Err(StorageError::OutOfRange);
        }

        let read = self.storage.read_byte(READ_CELL)?;
        let write = self.storage.read_byte(WRITE_CELL)?;
        let in_loop = self.storage.read_byte(IN_LOOP_CELL)?;

        self.clearing = false;
        self.loop_starts.clear();
        self.wait_remaining = None;

        if !self.layout.contains(read) || !self.layout.contains(write) || in_loop > 1 {
            warn!(
                "script buffer state invalid (r={} w={} loop={}), clearing",
                read, write, in_loop
            );
            return self.clear();
        }

        self.read = read;
        self.write = write;
        self.execute = read;
        self.in_loop = in_loop == 1;
        debug!(
            "script buffer loaded: r={} w={} in_loop={}",
            self.read, self.write, self.in_loop
        );
        Ok(())
    }

    /// Queue a command received from the host
    ///
    /// `ClearScript` only schedules the wipe; it happens on the next
    /// [`run`](Self::run). Until then every add is ignored.
    pub fn add(&mut self, cmd: &Command) -> Result<AddOutcome, StorageError> {
        if self.clearing {
            return Ok(AddOutcome::Ignored);
        }

        match cmd {
            Command::ClearScript => {
                self.clearing = true;
                Ok(AddOutcome::ClearScheduled)
            }
            Command::LoopOn => {
                if self.loop_starts.is_full() {
                    warn!("loop nesting exceeds {}, LoopOn dropped", MAX_LOOP_DEPTH);
                    return Ok(AddOutcome::Dropped);
                }
                let start = self.write;
                let outcome = self.write_slot(cmd)?;
                if outcome == AddOutcome::Stored {
                    // Cannot fail: checked is_full above
                    let _ = self.loop_starts.push(start);
                }
                Ok(outcome)
            }
            Command::LoopOff(end) => {
                let Some(start) = self.loop_starts.pop() else {
                    warn!("LoopOff without open loop dropped");
                    return Ok(AddOutcome::Dropped);
                };
                let end = LoopEnd {
                    start_index: self.layout.next(start),
                    depth: self.loop_starts.len() as u8,
                    counter: end.num_loops,
                    num_loops: end.num_loops,
                };
                trace!(
                    "add LoopOff at {}: start={} depth={} counter={}",
                    self.write,
                    end.start_index,
                    end.depth,
                    end.counter
                );
                self.write_slot(&Command::LoopOff(end))
            }
            other => self.write_slot(other),
        }
    }

    /// Execute at most one command
    ///
    /// Called once per scheduler tick; never blocks.
    pub fn run<L: LedStrip>(&mut self, leds: &mut L) -> Result<Step, StorageError> {
        if self.clearing {
            self.clear()?;
            return Ok(Step::Cleared);
        }

        if self.execute == self.write {
            return Ok(Step::Idle);
        }

        let address = self.layout.slot_address(self.execute);
        let mut slot = [0u8; SCRIPT_SLOT_SIZE];
        self.storage.read_block(address, &mut slot)?;

        let cmd = match Command::from_slot(&slot) {
            Ok(cmd) => cmd,
            Err(e) => {
                warn!("unreadable script slot {}: {:?}", self.execute, e);
                self.consume()?;
                return Ok(Step::Skipped);
            }
        };

        match cmd {
            Command::LoopOn => {
                trace!("LoopOn at {}", self.execute);
                self.execute = self.layout.next(self.execute);
                self.set_in_loop(true)?;
                Ok(Step::LoopStart)
            }
            Command::LoopOff(mut end) => {
                if end.is_infinite() {
                    trace!("end of infinite loop, back to {}", end.start_index);
                    self.execute = end.start_index;
                    Ok(Step::LoopRepeat)
                } else if end.counter > 1 {
                    trace!("loop pass, counter={} depth={}", end.counter, end.depth);
                    end.counter -= 1;
                    self.store_slot(address, &Command::LoopOff(end))?;
                    self.execute = end.start_index;
                    Ok(Step::LoopRepeat)
                } else if end.depth == 0 {
                    trace!("end of outermost loop at {}", self.execute);
                    self.execute = self.layout.next(self.execute);
                    // Loop body is done for good
                    self.set_read(self.execute)?;
                    self.set_in_loop(false)?;
                    Ok(Step::LoopExit)
                } else {
                    trace!("end of inner loop at {}", self.execute);
                    // Re-arm for the next pass of the enclosing loop
                    end.counter = end.num_loops;
                    self.store_slot(address, &Command::LoopOff(end))?;
                    self.execute = self.layout.next(self.execute);
                    Ok(Step::LoopExit)
                }
            }
            Command::SetColor(color) => {
                leds.set_color(&color);
                self.consume()?;
                Ok(Step::Actuated)
            }
            Command::SetFade(fade) => {
                leds.set_fade(&fade);
                self.consume()?;
                Ok(Step::Actuated)
            }
            Command::Wait { ticks } => {
                let remaining = self.wait_remaining.unwrap_or(ticks);
                if remaining > 0 {
                    self.wait_remaining = Some(remaining - 1);
                    return Ok(Step::Waiting);
                }
                self.wait_remaining = None;
                self.consume()?;
                Ok(Step::WaitDone)
            }
            Command::ClearScript
            | Command::SetRtc(_)
            | Command::GetCycletime
            | Command::GetTrace
            | Command::GetRtc
            | Command::GetVersion
            | Command::RunApp
            | Command::StartBl
            | Command::SetColorDirect(_) => {
                warn!("command 0x{:02x} in script skipped", cmd.code());
                self.consume()?;
                Ok(Step::Skipped)
            }
        }
    }

    /// Drop every queued command and reset all indices to the base
    pub fn clear(&mut self) -> Result<(), StorageError> {
        self.set_in_loop(false)?;
        self.set_read(0)?;
        self.set_write(0)?;
        self.execute = 0;
        self.clearing = false;
        self.loop_starts.clear();
        self.wait_remaining = None;
        debug!("script buffer cleared");
        Ok(())
    }

    /// Index of the oldest resident command
    pub fn read_index(&self) -> u8 {
        self.read
    }

    /// Index of the next free slot
    pub fn write_index(&self) -> u8 {
        self.write
    }

    /// Index of the next command to execute
    pub fn execute_index(&self) -> u8 {
        self.execute
    }

    /// Returns true while a loop body is executing
    pub fn in_loop(&self) -> bool {
        self.in_loop
    }

    /// Returns true while a clear is pending
    pub fn is_clearing(&self) -> bool {
        self.clearing
    }

    /// Number of loops opened by `add` and not yet closed
    pub fn loop_depth(&self) -> usize {
        self.loop_starts.len()
    }

    /// Number of resident commands
    pub fn len(&self) -> usize {
        let slots = self.layout.slots as usize;
        (self.write as usize + slots - self.read as usize)
            .checked_rem(slots)
            .unwrap_or(0)
    }

    /// Returns true if no commands are resident
    pub fn is_empty(&self) -> bool {
        self.read == self.write
    }

    /// Returns true if the next add would be dropped
    pub fn is_full(&self) -> bool {
        self.layout.next(self.write) == self.read
    }

    /// Buffer layout
    pub fn layout(&self) -> &ScriptLayout {
        &self.layout
    }

    /// Access the underlying storage
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Release the underlying storage
    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Persist `cmd` at `write` and advance `write`
    ///
    /// A full buffer drops the command: there is no way to report back
    /// from here other than the outcome, which the dispatcher turns into
    /// a "script buffer full" response.
    fn write_slot(&mut self, cmd: &Command) -> Result<AddOutcome, StorageError> {
        let next = self.layout.next(self.write);
        if next == self.read {
            debug!("script buffer full, 0x{:02x} dropped", cmd.code());
            return Ok(AddOutcome::Dropped);
        }

        let address = self.layout.slot_address(self.write);
        if let Err(e) = self.store_slot(address, cmd) {
            return match e {
                SlotError::Storage(e) => Err(e),
                SlotError::NotStorable => {
                    warn!("command 0x{:02x} cannot be scripted, dropped", cmd.code());
                    Ok(AddOutcome::Dropped)
                }
            };
        }
        self.set_write(next)?;
        Ok(AddOutcome::Stored)
    }

    fn store_slot(&mut self, address: u16, cmd: &Command) -> Result<(), SlotError> {
        let slot = cmd.to_slot().map_err(|_| SlotError::NotStorable)?;
        self.storage.write_block(address, &slot)?;
        Ok(())
    }

    /// Advance past a finished command, freeing it unless a loop may
    /// replay it
    fn consume(&mut self) -> Result<(), StorageError> {
        self.execute = self.layout.next(self.execute);
        if !self.in_loop {
            self.set_read(self.execute)?;
        }
        Ok(())
    }

    fn set_read(&mut self, value: u8) -> Result<(), StorageError> {
        self.storage.write_byte(READ_CELL, value)?;
        self.read = value;
        Ok(())
    }

    fn set_write(&mut self, value: u8) -> Result<(), StorageError> {
        self.storage.write_byte(WRITE_CELL, value)?;
        self.write = value;
        Ok(())
    }

    fn set_in_loop(&mut self, value: bool) -> Result<(), StorageError> {
        self.storage.write_byte(IN_LOOP_CELL, value as u8)?;
        self.in_loop = value;
        Ok(())
    }
}

enum SlotError {
    NotStorable,
    Storage(StorageError),
}

impl From<StorageError> for SlotError {
    fn from(e: StorageError) -> Self {
        SlotError::Storage(e)
    }
}

impl From<SlotError> for StorageError {
    fn from(e: SlotError) -> Self {
        match e {
            SlotError::Storage(e) => e,
            // Only commands read back from storage are re-stored
            SlotError::NotStorable => StorageError::WriteFailed,
        }
    }
}
