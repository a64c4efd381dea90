//! Debug trace hooks for the EEPROM core.
//!
//! The core only calls these macros; it carries no tracing backend of its own. With the
//! `defmt` feature enabled, calls are forwarded to `defmt`'s global logger. Without it,
//! they compile away to nothing.

#[cfg(feature = "defmt")]
macro_rules! trace {
    ($($arg:tt)*) => { defmt::trace!($($arg)*) };
}

#[cfg(not(feature = "defmt"))]
macro_rules! trace {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "defmt")]
macro_rules! warn {
    ($($arg:tt)*) => { defmt::warn!($($arg)*) };
}

#[cfg(not(feature = "defmt"))]
macro_rules! warn {
    ($($arg:tt)*) => {};
}

pub(crate) use trace;
pub(crate) use warn;
