//! Layout calculator (see module docs, "layout calculator").
//!
//! Derives the snapshot and write-log region bounds from the configured page geometry and
//! logical density, and validates the combination the way the original firmware's
//! preprocessor checks did, just deferred to construction time so it can be unit tested.

/// Ceiling on the logical address space: addresses are packed into 13 bits for word-log
/// entries (`A << 1`), so `DENSITY` can never exceed 0x4000 bytes.
pub const MAX_DENSITY: usize = 0x4000;

/// Magic value marking an initialized log region.
pub const MAGIC: u32 = 0x2040_0FEE;

/// Why a requested layout couldn't be built.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LayoutError {
    /// `density` is odd.
    DensityNotEven,
    /// `density` exceeds `MAX_DENSITY` or the space allocated by `page_count * page_size`.
    DensityTooLarge,
    /// `log_bytes` is odd.
    LogBytesNotEven,
    /// `density + log_bytes` doesn't fit in `page_count * page_size`.
    RegionsExceedPages,
    /// `base + page_count * page_size` exceeds the MCU's available flash.
    ExceedsMcuFlash,
    /// A caller-supplied `dynamic_keymap_max` is not below `density`.
    DynamicKeymapExceedsDensity,
}

/// Region bounds for the snapshot + write-log pair.
#[derive(Copy, Clone, Debug)]
pub struct Layout {
    base: usize,
    density: usize,
    log_bytes: usize,
    page_size: usize,
    page_count: usize,
}

impl Layout {
    /// Build and validate a layout. `density` defaults to half of the allocated pages;
    /// `log_bytes` defaults to whatever remains after `density` (§4.1, §6).
    pub fn new(
        page_size: usize,
        page_count: usize,
        base: usize,
        density: Option<usize>,
        log_bytes: Option<usize>,
        mcu_flash_size: Option<usize>,
    ) -> Result<Layout, LayoutError> {
        let total = page_count * page_size;

        let density = density.unwrap_or(total / 2);
        if density % 2 != 0 {
            return Err(LayoutError::DensityNotEven);
        }
        if density > core::cmp::min(total, MAX_DENSITY) {
            return Err(LayoutError::DensityTooLarge);
        }

        let log_bytes = log_bytes.unwrap_or(total - density);
        if log_bytes % 2 != 0 {
            return Err(LayoutError::LogBytesNotEven);
        }
        if density + log_bytes > total {
            return Err(LayoutError::RegionsExceedPages);
        }

        if let Some(flash_size) = mcu_flash_size {
            if base + total > flash_size {
                return Err(LayoutError::ExceedsMcuFlash);
            }
        }

        if density == total {
            crate::debug::warn!("eeprom: density leaves no room for a write log; every write will compact");
        }

        Ok(Layout {
            base,
            density,
            log_bytes,
            page_size,
            page_count,
        })
    }

    /// Size of the emulated EEPROM, in bytes.
    pub fn density(&self) -> usize {
        self.density
    }

    /// Size of the write-log region, in bytes (including the 4-byte magic header).
    pub fn log_bytes(&self) -> usize {
        self.log_bytes
    }

    /// First byte of the snapshot region.
    pub fn snapshot_base(&self) -> usize {
        self.base
    }

    /// First byte of the write-log region.
    pub fn log_base(&self) -> usize {
        self.base + self.density
    }

    /// Base address of every page spanned by the combined snapshot + log region.
    pub fn pages(&self) -> impl Iterator<Item = usize> {
        let base = self.base;
        let size = self.page_size;
        (0..self.page_count).map(move |p| base + p * size)
    }

    /// Validate a caller-supplied dynamic-keymap upper bound against this layout's density.
    pub fn validate_dynamic_keymap_max(&self, max_addr: usize) -> Result<(), LayoutError> {
        if max_addr >= self.density {
            Err(LayoutError::DynamicKeymapExceedsDensity)
        } else {
            Ok(())
        }
    }
}
