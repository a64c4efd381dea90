//! Injectable watchdog hook (see module docs for the rationale).
//!
//! Replay and compaction are the only operations slow enough to risk tripping an external
//! watchdog. Rather than reach for a global `watchdog_update()` call, the core takes a
//! `Watchdog` implementor and feeds it at the points the spec calls out. Callers that don't
//! have a watchdog to pet can use `NoopWatchdog`, which is also the default type parameter
//! on `Eeprom`.

/// Something that needs to be periodically reassured that the MCU hasn't hung.
pub trait Watchdog {
    /// Pet the watchdog. Called once per replay iteration and once per erased page during
    /// compaction.
    fn feed(&mut self);
}

/// A watchdog that isn't there. Used when the caller has no watchdog to feed, or doesn't
/// want the EEPROM core touching it.
#[derive(Default, Clone, Copy)]
pub struct NoopWatchdog;

impl Watchdog for NoopWatchdog {
    fn feed(&mut self) {}
}

impl<F: FnMut()> Watchdog for F {
    fn feed(&mut self) {
        self()
    }
}
