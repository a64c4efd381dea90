//! The EEPROM controller: RAM cache, replay engine, writer and compactor (§4.2, §4.4, §4.5).

use stm32_hal::flash::Flash;

use crate::cache::{load_u16, store_u16};
use crate::codec::{decode_first, decode_next, encode_byte, encode_word, Decoded, WordEntry, BYTE_RANGE, EMPTY_WORD};
use crate::debug::trace;
use crate::error::{first_failure, EepromResult, Error};
use crate::layout::{Layout, MAGIC, MAX_DENSITY};
use crate::watchdog::{NoopWatchdog, Watchdog};

/// Size of the magic header at the base of the write log.
const MAGIC_BYTES: usize = 4;

/// Emulated byte-addressable EEPROM backed by a snapshot region and an append-only write
/// log in raw flash (§2, §3).
///
/// `cache` is always sized to [`MAX_DENSITY`]; only the first `layout.density()` bytes are
/// live. A fixed upper bound avoids an allocator in a `no_std` build at the cost of some
/// unused RAM when `density` is configured smaller than the maximum.
pub struct Eeprom<F: Flash, W: Watchdog = NoopWatchdog> {
    flash: F,
    watchdog: W,
    layout: Layout,
    cache: [u8; MAX_DENSITY],
    /// Byte offset of the next unprogrammed log slot, relative to `layout.log_base()`.
    cursor: usize,
}

impl<F: Flash> Eeprom<F, NoopWatchdog> {
    /// Construct a controller with no watchdog hook.
    pub fn new(layout: Layout, flash: F) -> Self {
        Self::with_watchdog(layout, flash, NoopWatchdog)
    }
}

impl<F: Flash, W: Watchdog> Eeprom<F, W> {
    /// Construct a controller that feeds `watchdog` during replay and compaction (§5).
    pub fn with_watchdog(layout: Layout, flash: F, watchdog: W) -> Self {
        Eeprom {
            flash,
            watchdog,
            layout,
            cache: [0; MAX_DENSITY],
            cursor: MAGIC_BYTES,
        }
    }

    /// Usable size of the emulated EEPROM, in bytes.
    pub fn density(&self) -> usize {
        self.layout.density()
    }

    /// Release the underlying flash peripheral, discarding the RAM cache.
    pub fn free(self) -> F {
        self.flash
    }

    #[cfg(test)]
    pub(crate) fn flash_ref(&self) -> &F {
        &self.flash
    }

    fn cache(&self) -> &[u8] {
        &self.cache[..self.layout.density()]
    }

    fn read_flash_u16(&self, address: usize) -> u16 {
        self.flash.read_half_word(address)
    }

    fn read_flash_u32(&self, address: usize) -> u32 {
        self.flash.read_word(address)
    }

    /// Reconstruct the RAM cache from flash: invert the snapshot, then replay the write
    /// log in order (§4.2). Returns the usable density.
    pub fn init(&mut self) -> EepromResult<usize> {
        let density = self.layout.density();

        let mut word_addr = 0;
        while word_addr < density {
            let raw = self.read_flash_u16(self.layout.snapshot_base() + word_addr);
            store_u16(&mut self.cache, word_addr, !raw);
            word_addr += 2;
        }

        if self.read_flash_u32(self.layout.log_base()) != MAGIC {
            trace!("eeprom: no magic at log base, clearing");
            self.clear()?;
            return Ok(density);
        }

        let mut offset = MAGIC_BYTES;
        let log_bytes = self.layout.log_bytes();
        loop {
            self.watchdog.feed();

            if offset + 2 > log_bytes {
                break;
            }
            let word = self.read_flash_u16(self.layout.log_base() + offset);
            if word == EMPTY_WORD {
                break;
            }

            match decode_first(word) {
                Decoded::Byte { address, value } => {
                    if address < density {
                        self.cache[address] = value;
                    } else {
                        trace!("eeprom: replay byte entry out of range, skipped");
                    }
                    offset += 2;
                }
                Decoded::Word { address, value } => {
                    if address < density {
                        store_u16(&mut self.cache, address, value);
                    } else {
                        trace!("eeprom: replay word entry out of range, skipped");
                    }
                    offset += 2;
                }
                Decoded::Reserved => {
                    trace!("eeprom: reserved log encoding, skipped");
                    offset += 2;
                }
                Decoded::WordNextHeader { address } => {
                    offset += 2;
                    if offset + 2 > log_bytes {
                        break;
                    }
                    let next = self.read_flash_u16(self.layout.log_base() + offset);
                    offset += 2;
                    match decode_next(next) {
                        Some(value) if address < density => store_u16(&mut self.cache, address, value),
                        Some(_) => trace!("eeprom: replay word-next entry out of range, skipped"),
                        None => trace!("eeprom: incomplete word-next entry, skipped"),
                    }
                }
            }
        }

        self.cursor = offset;
        Ok(density)
    }

    /// Erase both regions and rewrite the magic header, without touching the cache. Used
    /// on first init (missing magic) and as the first half of compaction.
    fn clear(&mut self) -> EepromResult<()> {
        let unlocked = unsafe { self.flash.unlock_guard()? };
        for page in self.layout.pages() {
            unsafe {
                unlocked.erase_page(page)?;
            }
        }
        unsafe {
            unlocked.program_half_word(self.layout.log_base(), (MAGIC & 0xFFFF) as u16)?;
            unlocked.program_half_word(self.layout.log_base() + 2, (MAGIC >> 16) as u16)?;
        }
        self.cursor = MAGIC_BYTES;
        Ok(())
    }

    /// Full reset: erase everything, then reload the (now-empty) cache from flash (§4.5).
    pub fn erase(&mut self) -> EepromResult<()> {
        self.clear()?;
        self.init()?;
        Ok(())
    }

    /// Fold the write log back into the snapshot: erase both regions, reprogram every
    /// non-zero cache word into the snapshot, and rewrite the magic (§4.5). Cache-first,
    /// flash-second: the cache is never invalidated by this.
    fn compact(&mut self) -> EepromResult<()> {
        trace!("eeprom: compacting");
        self.clear()?;

        let unlocked = unsafe { self.flash.unlock_guard()? };
        let density = self.layout.density();
        let mut result = Ok(());
        let mut word_addr = 0;
        while word_addr < density {
            self.watchdog.feed();
            let value = load_u16(&self.cache, word_addr);
            if value != 0 {
                let addr = self.layout.snapshot_base() + word_addr;
                if let Err(e) = unsafe { unlocked.program_half_word(addr, !value) } {
                    result = Err(e.into());
                }
            }
            word_addr += 2;
        }
        result
    }

    /// Try to program the snapshot word directly: only possible while it's still
    /// unprogrammed (`0xFFFF`). Returns `true` if the write was handled this way (whether
    /// or not a program was actually needed), `false` if a log entry must be appended
    /// instead (§4.4, step 1).
    fn direct_write(&mut self, word_addr: usize) -> EepromResult<bool> {
        let snapshot_addr = self.layout.snapshot_base() + word_addr;
        if self.read_flash_u16(snapshot_addr) != EMPTY_WORD {
            return Ok(false);
        }

        let value = !load_u16(&self.cache, word_addr);
        if value == EMPTY_WORD {
            // Logical value is 0; snapshot is already all-ones, nothing to program.
            return Ok(true);
        }

        let unlocked = unsafe { self.flash.unlock_guard()? };
        unsafe {
            unlocked.program_half_word(snapshot_addr, value)?;
        }
        trace!("eeprom: direct write");
        Ok(true)
    }

    fn program_log_word(&mut self, word: u16) -> EepromResult<()> {
        let addr = self.layout.log_base() + self.cursor;
        let unlocked = unsafe { self.flash.unlock_guard()? };
        unsafe {
            unlocked.program_half_word(addr, word)?;
        }
        self.cursor += 2;
        Ok(())
    }

    fn append_byte_entry(&mut self, address: usize) -> EepromResult<()> {
        if self.cursor + 2 > self.layout.log_bytes() {
            return self.compact();
        }
        let word = encode_byte(address, self.cache[address]);
        self.program_log_word(word)
    }

    fn append_word_entry(&mut self, word_addr: usize) -> EepromResult<()> {
        let value = load_u16(&self.cache, word_addr);
        let entry = encode_word(word_addr, value);
        if self.cursor + entry.size() > self.layout.log_bytes() {
            return self.compact();
        }
        match entry {
            WordEntry::Short(w) => self.program_log_word(w),
            WordEntry::Long(header, value) => {
                self.program_log_word(header)?;
                self.program_log_word(value)
            }
        }
    }

    /// Persist a single-byte change at `address` after the cache has already been updated:
    /// try the direct path on the enclosing word first, then fall back to a log entry
    /// (byte-entry at `address` itself below `BYTE_RANGE`, word entry on the enclosing word
    /// otherwise).
    fn commit_byte(&mut self, address: usize) -> EepromResult<()> {
        let word_addr = address & !1;
        if self.direct_write(word_addr)? {
            return Ok(());
        }
        if word_addr < BYTE_RANGE {
            self.append_byte_entry(address)
        } else {
            self.append_word_entry(word_addr)
        }
    }

    /// Read a single byte. Out-of-range addresses return `0xFF` (§4.6).
    pub fn read_byte(&self, address: usize) -> u8 {
        if address < self.layout.density() {
            self.cache()[address]
        } else {
            0xFF
        }
    }

    /// Read a 16-bit word, tolerating unaligned addresses by reading two bytes. Out-of-range
    /// addresses return `0xFFFF` (§4.6).
    pub fn read_word(&self, address: usize) -> u16 {
        if address + 1 >= self.layout.density() {
            return 0xFFFF;
        }
        if address % 2 == 1 {
            (self.read_byte(address) as u16) | ((self.read_byte(address + 1) as u16) << 8)
        } else {
            load_u16(&self.cache, address)
        }
    }

    /// Read a 32-bit dword. Odd addresses are read as byte/word/byte, mirroring
    /// `write_dword`'s encoding so round-trips through unaligned addresses stay consistent
    /// (§9 open question).
    pub fn read_dword(&self, address: usize) -> u32 {
        if address % 2 == 1 {
            (self.read_byte(address) as u32)
                | ((self.read_word(address + 1) as u32) << 8)
                | ((self.read_byte(address + 3) as u32) << 24)
        } else {
            (self.read_word(address) as u32) | ((self.read_word(address + 2) as u32) << 16)
        }
    }

    /// Write a single byte. Clamps out-of-range addresses to `BadAddress` and short-circuits
    /// if the cache already holds `value` (§4.4).
    pub fn write_byte(&mut self, address: usize, value: u8) -> EepromResult<()> {
        if address >= self.layout.density() {
            return Err(Error::BadAddress);
        }
        if self.cache[address] == value {
            return Ok(());
        }
        self.cache[address] = value;
        self.commit_byte(address)
    }

    /// Write a 16-bit word. Unaligned addresses delegate to two byte writes, passing the
    /// high byte of `value` to the second call (§9 open question: preserved verbatim from
    /// the source's own odd-address behavior).
    pub fn write_word(&mut self, address: usize, value: u16) -> EepromResult<()> {
        if address >= self.layout.density() {
            return Err(Error::BadAddress);
        }
        if address % 2 == 1 {
            let lo = self.write_byte(address, value as u8);
            let hi = self.write_byte(address + 1, (value >> 8) as u8);
            return first_failure(lo, hi);
        }

        let old = load_u16(&self.cache, address);
        if old == value {
            return Ok(());
        }
        store_u16(&mut self.cache, address, value);

        if self.direct_write(address)? {
            return Ok(());
        }

        if address < BYTE_RANGE {
            let mut result = Ok(());
            if (old as u8) != (value as u8) {
                result = self.append_byte_entry(address);
            }
            if (old >> 8) as u8 != (value >> 8) as u8 {
                let second = self.append_byte_entry(address + 1);
                result = first_failure(result, second);
            }
            result
        } else {
            self.append_word_entry(address)
        }
    }

    /// Write a 32-bit dword, composing two word writes (or byte/word/byte for an odd
    /// address), identical in shape to `write_word`'s alignment handling (§4.6, §9).
    pub fn write_dword(&mut self, address: usize, value: u32) -> EepromResult<()> {
        if address % 2 == 1 {
            let a = self.write_byte(address, value as u8);
            let b = self.write_word(address + 1, (value >> 8) as u16);
            let c = self.write_byte(address + 3, (value >> 24) as u8);
            first_failure(first_failure(a, b), c)
        } else {
            let a = self.write_word(address, value as u16);
            let b = self.write_word(address + 2, (value >> 16) as u16);
            first_failure(a, b)
        }
    }

    /// Read `buf.len()` bytes starting at `address`. Leading/trailing unaligned fragments
    /// are read as bytes; the aligned middle is read word-at-a-time and split into the
    /// destination buffer (§4.6, §9: always byte-split on the RAM side, since a safe `&mut
    /// [u8]` can't be reinterpreted as `&mut [u16]` without risking unaligned-access UB).
    pub fn read_block(&self, address: usize, buf: &mut [u8]) {
        let mut addr = address;
        let mut remaining = buf.len();
        let mut idx = 0;

        if remaining > 0 && addr % 2 == 1 {
            buf[idx] = self.read_byte(addr);
            idx += 1;
            addr += 1;
            remaining -= 1;
        }

        while remaining > 1 {
            let value = self.read_word(addr);
            buf[idx] = value as u8;
            buf[idx + 1] = (value >> 8) as u8;
            idx += 2;
            addr += 2;
            remaining -= 2;
        }

        if remaining == 1 {
            buf[idx] = self.read_byte(addr);
        }
    }

    /// Write `data` starting at `address`, with the same leading/trailing-fragment handling
    /// as `read_block`. Collapses per-step statuses by preferring the first failure (§7).
    pub fn write_block(&mut self, address: usize, data: &[u8]) -> EepromResult<()> {
        let mut addr = address;
        let mut remaining = data.len();
        let mut idx = 0;
        let mut result = Ok(());

        if remaining > 0 && addr % 2 == 1 {
            result = first_failure(result, self.write_byte(addr, data[idx]));
            idx += 1;
            addr += 1;
            remaining -= 1;
        }

        while remaining > 1 {
            let value = (data[idx] as u16) | ((data[idx + 1] as u16) << 8);
            result = first_failure(result, self.write_word(addr, value));
            idx += 2;
            addr += 2;
            remaining -= 2;
        }

        if remaining == 1 {
            result = first_failure(result, self.write_byte(addr, data[idx]));
        }

        result
    }

    /// Alias of [`Eeprom::write_byte`]; the "only write if changed" semantics already live
    /// in the cache short-circuit (§4.6, testable property #4).
    pub fn update_byte(&mut self, address: usize, value: u8) -> EepromResult<()> {
        self.write_byte(address, value)
    }

    /// Alias of [`Eeprom::write_word`].
    pub fn update_word(&mut self, address: usize, value: u16) -> EepromResult<()> {
        self.write_word(address, value)
    }

    /// Alias of [`Eeprom::write_dword`].
    pub fn update_dword(&mut self, address: usize, value: u32) -> EepromResult<()> {
        self.write_dword(address, value)
    }

    /// Alias of [`Eeprom::write_block`].
    pub fn update_block(&mut self, address: usize, data: &[u8]) -> EepromResult<()> {
        self.write_block(address, data)
    }
}
