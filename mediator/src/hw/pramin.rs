//! Scoped PRAMIN accessor: indirect access to any VRAM word through the
//! 64 KB BAR0 aperture.

use crate::hw::registers::Registers;
use crate::hw::{regs, Hw};
use crate::memory::HostPhysAddr;

/// Reads and writes host-physical VRAM through the PRAMIN window.
///
/// Construction saves the current window base register; destruction
/// restores it, so nested scopes always see a consistent window on exit.
/// The window is re-aimed only when an access leaves the 64 KB span of
/// the last one.
pub struct Pramin<'a> {
    regs: Registers<'a>,
    saved: u32,
    current: u32,
}

impl<'a> Pramin<'a> {
    pub fn new(hw: &'a Hw) -> Self {
        let mut regs = Registers::new(hw);
        let saved = regs.read32(regs::PRAMIN_WINDOW);
        Pramin { regs, saved, current: saved }
    }

    pub fn read32(&mut self, addr: HostPhysAddr) -> u32 {
        let offset = self.aim(addr);
        self.regs.read32(offset)
    }

    pub fn write32(&mut self, addr: HostPhysAddr, value: u32) {
        let offset = self.aim(addr);
        self.regs.write32(offset, value)
    }

    pub fn read64(&mut self, addr: HostPhysAddr) -> u64 {
        let lower = self.read32(addr) as u64;
        let upper = self.read32(addr.offset(4)) as u64;
        lower | (upper << 32)
    }

    pub fn write64(&mut self, addr: HostPhysAddr, value: u64) {
        self.write32(addr, value as u32);
        self.write32(addr.offset(4), (value >> 32) as u32);
    }

    /// Aim the window at `addr` and return the BAR0 offset of its word.
    fn aim(&mut self, addr: HostPhysAddr) -> u32 {
        let window = (addr.as_u64() >> 16) as u32;
        if window != self.current {
            self.regs.write32(regs::PRAMIN_WINDOW, window);
            self.current = window;
        }
        regs::PRAMIN_APERTURE + (addr.as_u64() & 0xFFFF) as u32
    }
}

impl Drop for Pramin<'_> {
    fn drop(&mut self) {
        self.regs.write32(regs::PRAMIN_WINDOW, self.saved);
    }
}
