//! Volatile MMIO over the real mapped BARs.

use crate::hw::{Bar, GpuBars};

/// One mapped BAR region.
pub struct BarMapping {
    base: *mut u8,
    size: usize,
}

impl BarMapping {
    /// Wrap a mapping produced by the PCI bootstrap.
    ///
    /// # Safety
    /// `base` must point to a live mapping of at least `size` bytes that
    /// stays valid for the mapping's lifetime.
    pub unsafe fn new(base: *mut u8, size: usize) -> Self {
        BarMapping { base, size }
    }

    fn read32(&self, offset: u64) -> u32 {
        assert!(offset as usize + 4 <= self.size, "MMIO read out of BAR");
        // Volatile: the device can change the value between reads.
        unsafe { (self.base.add(offset as usize) as *const u32).read_volatile() }
    }

    fn write32(&self, offset: u64, value: u32) {
        assert!(offset as usize + 4 <= self.size, "MMIO write out of BAR");
        unsafe { (self.base.add(offset as usize) as *mut u32).write_volatile(value) }
    }
}

/// The three mapped BARs of the mediated device.
pub struct MappedBars {
    bar0: BarMapping,
    bar1: BarMapping,
    bar3: BarMapping,
}

// The mappings are plain device memory; access is serialized by the
// hardware mutex above this layer.
unsafe impl Send for MappedBars {}

impl MappedBars {
    pub fn new(bar0: BarMapping, bar1: BarMapping, bar3: BarMapping) -> Self {
        MappedBars { bar0, bar1, bar3 }
    }

    fn bar(&self, bar: Bar) -> &BarMapping {
        match bar {
            Bar::Bar0 => &self.bar0,
            Bar::Bar1 => &self.bar1,
            Bar::Bar3 => &self.bar3,
        }
    }
}

impl GpuBars for MappedBars {
    fn read32(&mut self, bar: Bar, offset: u64) -> u32 {
        self.bar(bar).read32(offset)
    }

    fn write32(&mut self, bar: Bar, offset: u64, value: u32) {
        self.bar(bar).write32(offset, value)
    }
}
