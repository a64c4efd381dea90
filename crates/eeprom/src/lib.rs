//! Flash-based emulated EEPROM for the STM32 series microcontrollers.
//!
//! The emulated address space is backed by two regions carved out of raw flash pages: a
//! *snapshot* holding the bitwise-inverted logical image, and an append-only *write log*
//! of small entries recording changes since the last compaction. Every read is served from
//! a RAM cache rebuilt once at [`Eeprom::init`] by inverting the snapshot and replaying the
//! log; flash is never read again on the hot path.
//!
//! Programming flash can only clear bits (`1 -> 0`) between erases, which is why the
//! snapshot stores the image inverted: an erased snapshot word (`0xFFFF`) represents a
//! logical `0`, and writing any value that's a subset of the erased bits can happen without
//! an erase. Once a word's snapshot slot has already been programmed, further changes are
//! recorded in the write log instead, and the log is folded back into a fresh snapshot by
//! [`Eeprom`]'s internal compaction once it fills up.
//!
//! # Examples
//! ```rust,no_run
//! use eeprom::{Eeprom, Layout};
//! use stm32_hal::flash::{Flash, FlashResult};
//! # struct MockFlash;
//! # impl Flash for MockFlash {
//! #   fn is_locked(&self) -> bool { false }
//! #   fn status(&self) -> FlashResult { Ok(()) }
//! #   unsafe fn unlock(&self) {}
//! #   unsafe fn lock(&self) {}
//! #   unsafe fn erase_page(&self, _address: usize) -> FlashResult { Ok(()) }
//! #   unsafe fn program_half_word(&self, _address: usize, _data: u16) -> FlashResult { Ok(()) }
//! #   fn read_half_word(&self, _address: usize) -> u16 { 0xFFFF }
//! # }
//! # fn main() -> Result<(), eeprom::Error> {
//! let layout = Layout::new(1024, 2, 0, None, None, None).expect("bad layout");
//! let mut eeprom = Eeprom::new(layout, MockFlash);
//! eeprom.init()?;
//! eeprom.write_word(0, 0xdead)?;
//! eeprom.write_word(2, 0xbeef)?;
//! assert_eq!(0xdead, eeprom.read_word(0));
//! assert_eq!(0xbeef, eeprom.read_word(2));
//! # Ok(())
//! # }
//! ```
#![no_std]
#![warn(missing_docs)]
#![deny(warnings)]

#[cfg(test)]
#[macro_use]
extern crate std;

mod cache;
mod codec;
mod debug;
mod eeprom;
mod error;
mod layout;
mod watchdog;

#[cfg(test)]
mod tests;

pub use crate::eeprom::Eeprom;
pub use crate::error::{EepromResult, Error};
pub use crate::layout::{Layout, LayoutError, MAGIC, MAX_DENSITY};
pub use crate::watchdog::{NoopWatchdog, Watchdog};
