//! Scoped BAR0 register accessor.

use spin::MutexGuard;

use crate::hw::{Bar, GpuBars, Hw};

/// Poll iterations between progress reports while waiting on a register.
const WAIT_REPORT_INTERVAL: u64 = 100_000;

/// Holds the hardware mutex and exposes BAR0 register access plus the
/// spin-poll helpers.
///
/// There is deliberately no timeout: the hardware is trusted to make
/// forward progress, and callers accept the hold time. Long waits report
/// through an injectable progress callback so a stuck engine is at least
/// visible in the logs.
pub struct Registers<'a> {
    bars: MutexGuard<'a, Box<dyn GpuBars>>,
}

impl<'a> Registers<'a> {
    pub fn new(hw: &'a Hw) -> Self {
        Registers { bars: hw.lock() }
    }

    pub fn read32(&mut self, offset: u32) -> u32 {
        self.bars.read32(Bar::Bar0, offset as u64)
    }

    pub fn write32(&mut self, offset: u32, value: u32) {
        self.bars.write32(Bar::Bar0, offset as u64, value)
    }

    /// Raw access to another BAR under the same guard; used for the BAR1
    /// poll-area fast path.
    pub fn bar_read32(&mut self, bar: Bar, offset: u64) -> u32 {
        self.bars.read32(bar, offset)
    }

    pub fn bar_write32(&mut self, bar: Bar, offset: u64, value: u32) {
        self.bars.write32(bar, offset, value)
    }

    /// Spin until `read32(offset) & mask == value`.
    pub fn wait_eq(&mut self, offset: u32, mask: u32, value: u32) {
        self.wait_cb(offset, mask, value, |current, expected| current == expected);
    }

    /// Spin until `read32(offset) & mask != value`.
    pub fn wait_ne(&mut self, offset: u32, mask: u32, value: u32) {
        self.wait_cb(offset, mask, value, |current, expected| current != expected);
    }

    /// Spin until `accept(read32(offset) & mask, value)` holds, reporting
    /// through the default logger.
    pub fn wait_cb<F>(&mut self, offset: u32, mask: u32, value: u32, accept: F)
    where
        F: Fn(u32, u32) -> bool,
    {
        self.wait_cb_with(offset, mask, value, accept, &mut |spins| {
            log::warn!(
                "still waiting on register {:#x} (mask {:#x}) after {} polls",
                offset,
                mask,
                spins
            );
        });
    }

    /// Spin with an injected progress reporter, called every
    /// `WAIT_REPORT_INTERVAL` polls.
    pub fn wait_cb_with<F>(
        &mut self,
        offset: u32,
        mask: u32,
        value: u32,
        accept: F,
        progress: &mut dyn FnMut(u64),
    ) where
        F: Fn(u32, u32) -> bool,
    {
        let mut spins: u64 = 0;
        loop {
            if accept(self.read32(offset) & mask, value) {
                return;
            }
            spins += 1;
            if spins % WAIT_REPORT_INTERVAL == 0 {
                progress(spins);
            }
        }
    }
}
