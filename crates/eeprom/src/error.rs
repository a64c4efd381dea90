//! Error taxonomy for the public API (see module docs, "error handling").

use stm32_hal::flash::FlashError;

/// Failure returned by a read/write/update entry point.
///
/// `BadAddress` and the flash errors are the only things that can flow out of this crate;
/// everything else (reserved log encodings, incomplete word-next entries) is handled
/// silently during replay, per the spec's decode-anomaly policy.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// Caller supplied an address `>= density`. Cache and flash are left untouched.
    BadAddress,
    /// The underlying flash program/erase operation failed. The cache has already been
    /// updated by the time this is returned, so a later write of the same value is a
    /// no-op and a later compaction will still persist it.
    Flash(FlashError),
}

impl From<FlashError> for Error {
    fn from(e: FlashError) -> Self {
        Error::Flash(e)
    }
}

/// Result type returned by the public read/write/update/erase API.
pub type EepromResult<T = ()> = Result<T, Error>;

/// Collapse two results into one, preferring the first non-success (§7: multi-step
/// operations like unaligned word writes and block writes do this instead of
/// short-circuiting, since later steps must still run).
pub(crate) fn first_failure(a: EepromResult, b: EepromResult) -> EepromResult {
    if a.is_err() {
        a
    } else {
        b
    }
}
