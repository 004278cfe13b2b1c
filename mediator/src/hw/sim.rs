//! Software model of the mediated GPU.
//!
//! Implements just enough of the device for the mediator to run without
//! hardware: a sparse VRAM store reached through the PRAMIN window
//! indirection, a plain BAR0 register file, and plain BAR1/BAR3
//! apertures. The test suite and the daemon's development mode run on
//! top of this.

use std::collections::HashMap;

use crate::hw::{regs, Bar, GpuBars};

/// Sparse in-memory device model.
pub struct SimGpu {
    bar0: HashMap<u64, u32>,
    bar1: HashMap<u64, u32>,
    bar3: HashMap<u64, u32>,
    /// Word store keyed by host-physical VRAM address.
    vram: HashMap<u64, u32>,
}

impl SimGpu {
    pub fn new() -> Self {
        let mut bar0 = HashMap::new();
        // VM engines idle but present, flush not yet done.
        bar0.insert(regs::VM_ENGINE_STATUS as u64, 0x0001_0000);
        SimGpu {
            bar0,
            bar1: HashMap::new(),
            bar3: HashMap::new(),
            vram: HashMap::new(),
        }
    }

    fn pramin_target(&self, offset: u64) -> u64 {
        let window = *self.bar0.get(&(regs::PRAMIN_WINDOW as u64)).unwrap_or(&0) as u64;
        (window << 16) + (offset - regs::PRAMIN_APERTURE as u64)
    }

    fn is_pramin_aperture(offset: u64) -> bool {
        offset >= regs::PRAMIN_APERTURE as u64
            && offset < regs::PRAMIN_APERTURE as u64 + regs::PRAMIN_APERTURE_SIZE
    }
}

impl Default for SimGpu {
    fn default() -> Self {
        SimGpu::new()
    }
}

impl GpuBars for SimGpu {
    fn read32(&mut self, bar: Bar, offset: u64) -> u32 {
        debug_assert_eq!(offset % 4, 0);
        match bar {
            Bar::Bar0 => {
                if Self::is_pramin_aperture(offset) {
                    let target = self.pramin_target(offset);
                    *self.vram.get(&target).unwrap_or(&0)
                } else {
                    *self.bar0.get(&offset).unwrap_or(&0)
                }
            }
            Bar::Bar1 => *self.bar1.get(&offset).unwrap_or(&0),
            Bar::Bar3 => *self.bar3.get(&offset).unwrap_or(&0),
        }
    }

    fn write32(&mut self, bar: Bar, offset: u64, value: u32) {
        debug_assert_eq!(offset % 4, 0);
        match bar {
            Bar::Bar0 => {
                if Self::is_pramin_aperture(offset) {
                    let target = self.pramin_target(offset);
                    self.vram.insert(target, value);
                    return;
                }
                if offset == regs::VM_FLUSH_ENGINE as u64 {
                    // Triggering a flush completes it immediately.
                    let status = self
                        .bar0
                        .entry(regs::VM_ENGINE_STATUS as u64)
                        .or_insert(0);
                    *status |= 0x8000;
                }
                self.bar0.insert(offset, value);
            }
            Bar::Bar1 => {
                self.bar1.insert(offset, value);
            }
            Bar::Bar3 => {
                self.bar3.insert(offset, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registers_default_to_zero() {
        let mut gpu = SimGpu::new();
        assert_eq!(gpu.read32(Bar::Bar0, 0x2254), 0);
        gpu.write32(Bar::Bar0, 0x2254, 7);
        assert_eq!(gpu.read32(Bar::Bar0, 0x2254), 7);
    }

    #[test]
    fn test_pramin_window_indirection() {
        let mut gpu = SimGpu::new();
        // Aim the window at 0x1_2345_0000 and write through the aperture.
        gpu.write32(Bar::Bar0, regs::PRAMIN_WINDOW as u64, 0x1_2345);
        gpu.write32(Bar::Bar0, regs::PRAMIN_APERTURE as u64 + 0x10, 0xCAFE);
        gpu.write32(Bar::Bar0, regs::PRAMIN_WINDOW as u64, 0);
        assert_eq!(gpu.read32(Bar::Bar0, regs::PRAMIN_APERTURE as u64 + 0x10), 0);
        gpu.write32(Bar::Bar0, regs::PRAMIN_WINDOW as u64, 0x1_2345);
        assert_eq!(
            gpu.read32(Bar::Bar0, regs::PRAMIN_APERTURE as u64 + 0x10),
            0xCAFE
        );
    }

    #[test]
    fn test_flush_trigger_sets_done_bit() {
        let mut gpu = SimGpu::new();
        assert_eq!(
            gpu.read32(Bar::Bar0, regs::VM_ENGINE_STATUS as u64) & 0x8000,
            0
        );
        gpu.write32(Bar::Bar0, regs::VM_FLUSH_ENGINE as u64, 5);
        assert_eq!(
            gpu.read32(Bar::Bar0, regs::VM_ENGINE_STATUS as u64) & 0x8000,
            0x8000
        );
    }
}
