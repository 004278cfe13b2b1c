//! The mediator's own BAR1 channel.
//!
//! A fixed, minimal shadow-mode channel the mediator keeps for itself so
//! guest poll-area pages can be reached through BAR1: one RAMIN block, a
//! single-slot page directory, and one small-page table covering 128
//! pages (512 KB) of virtual space.

use std::sync::Arc;

use spin::Mutex;

use crate::config::{phys_channel_id, CHANNELS_PER_VGPU, PAGE_DIRECTORY_SPAN, POLL_AREA_PAGES, SMALL_PAGE_SIZE};
use crate::error::Error;
use crate::hw::pramin::Pramin;
use crate::hw::registers::Registers;
use crate::hw::{regs, Hw};
use crate::memory::{GuestVirtAddr, HostPhysAddr, Page, VramPool};
use crate::shadow::page_table::ShadowPageTable;
use crate::shadow::pte::Pde;

/// RAMIN descriptor offsets for the channel's own block.
const RAMIN_PAGE_DIRECTORY: u64 = 0x200;
const RAMIN_PAGE_LIMIT: u64 = 0x208;

/// PTE encoding the hardware expects in this table: page address shifted
/// right by 8, low bit present.
fn encode_mapped(phys: HostPhysAddr) -> u64 {
    (phys.as_u64() >> 8) | 0x1
}

/// The device-owned BAR1 shadow channel.
pub struct DeviceBar1 {
    ramin: Page,
    directory: Page,
    entries: Page,
}

impl DeviceBar1 {
    pub fn new(pool: &Arc<Mutex<VramPool>>, hw: &Hw) -> Result<DeviceBar1, Error> {
        let ramin = Page::new(pool, hw, 2)?;
        let directory = Page::new(pool, hw, 1)?;
        let entries = Page::new(pool, hw, 1)?;

        let vm_size = POLL_AREA_PAGES * SMALL_PAGE_SIZE;
        let mut pramin = Pramin::new(hw);
        ramin.write64(&mut pramin, RAMIN_PAGE_DIRECTORY, directory.address().as_u64());
        ramin.write64(&mut pramin, RAMIN_PAGE_LIMIT, vm_size);

        let pde = Pde {
            small_present: true,
            small_address: entries.address().as_u64() >> 12,
            ..Pde::default()
        };
        let (word0, word1) = pde.encode();
        directory.write32(&mut pramin, 0x0, word0);
        directory.write32(&mut pramin, 0x4, word1);
        drop(pramin);

        log::info!(
            "constructed shadow BAR1 channel {} with PDE {} PTE {}",
            ramin.address(),
            directory.address(),
            entries.address()
        );
        Ok(DeviceBar1 { ramin, directory, entries })
    }

    /// Page directory address; the hardware's BAR1 VM points here.
    pub fn address(&self) -> HostPhysAddr {
        self.directory.address()
    }

    /// RAMIN address of the channel itself.
    pub fn ramin_address(&self) -> HostPhysAddr {
        self.ramin.address()
    }

    /// Install PTEs so each of the guest's poll-area channel slots is
    /// reachable through the device's BAR1 window. The guest's BAR1
    /// shadow table is only borrowed for the resolutions.
    pub fn shadow(&self, hw: &Hw, vid: u32, poll_area: GuestVirtAddr, table: &ShadowPageTable) {
        log::debug!("guest {} BAR1 shadowed", vid);
        let mut pramin = Pramin::new(hw);
        for vcid in 0..CHANNELS_PER_VGPU {
            let pcid = phys_channel_id(vid, vcid) as u64;
            let offset = poll_area.offset(pcid * SMALL_PAGE_SIZE);
            if let Some(host) = table.resolve(offset) {
                self.map(&mut pramin, pcid * SMALL_PAGE_SIZE, host);
            }
        }
    }

    /// Map one page of the channel's virtual space. Virtual addresses
    /// outside the first directory slot are silently dropped.
    fn map(&self, pramin: &mut Pramin<'_>, virt: u64, phys: HostPhysAddr) {
        if virt / PAGE_DIRECTORY_SPAN != 0 {
            return;
        }
        debug_assert_eq!(virt % SMALL_PAGE_SIZE, 0);
        let index = virt / SMALL_PAGE_SIZE;
        if (index + 1) * 8 > self.entries.size() {
            log::warn!("BAR1 map at {:#x} past the entry page", virt);
            return;
        }
        let data = encode_mapped(phys);
        self.entries.write32(pramin, 8 * index, data as u32);
        self.entries.write32(pramin, 8 * index + 0x4, (data >> 32) as u32);
        log::debug!("BAR1 table {:#x} mapped to {}", virt, phys);
    }

    /// Flush the hardware's view of the table: wait for the engines to
    /// go idle, point the flush at our page directory, kick it, and wait
    /// for completion.
    pub fn flush(&self, hw: &Hw) {
        let mut registers = Registers::new(hw);
        registers.wait_ne(regs::VM_ENGINE_STATUS, 0x00FF_0000, 0x0000_0000);
        registers.write32(
            regs::VM_FLUSH_PDB,
            (self.directory.address().as_u64() >> 8) as u32,
        );
        registers.write32(regs::VM_FLUSH_ENGINE, regs::VM_FLUSH_BAR_ENGINES);
        registers.wait_eq(regs::VM_ENGINE_STATUS, 0x0000_8000, 0x0000_8000);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{VRAM_BASE, VRAM_SIZE};
    use crate::hw::sim::SimGpu;

    fn fixture() -> (Arc<Mutex<VramPool>>, Hw) {
        let pool = Arc::new(Mutex::new(VramPool::new(
            HostPhysAddr::new(VRAM_BASE),
            VRAM_SIZE,
        )));
        let hw = Hw::new(Box::new(SimGpu::new()));
        (pool, hw)
    }

    #[test]
    fn test_ramin_names_directory_and_span() {
        let (pool, hw) = fixture();
        let bar1 = DeviceBar1::new(&pool, &hw).unwrap();
        let mut pramin = Pramin::new(&hw);
        assert_eq!(
            bar1.ramin.read64(&mut pramin, RAMIN_PAGE_DIRECTORY),
            bar1.directory.address().as_u64()
        );
        assert_eq!(
            bar1.ramin.read64(&mut pramin, RAMIN_PAGE_LIMIT),
            POLL_AREA_PAGES * SMALL_PAGE_SIZE
        );
        let word0 = bar1.directory.read32(&mut pramin, 0);
        let word1 = bar1.directory.read32(&mut pramin, 4);
        let pde = Pde::decode(word0, word1);
        assert!(pde.small_present);
        assert_eq!(pde.small_address, bar1.entries.address().as_u64() >> 12);
    }

    #[test]
    fn test_map_writes_present_entry() {
        let (pool, hw) = fixture();
        let bar1 = DeviceBar1::new(&pool, &hw).unwrap();
        let phys = HostPhysAddr::new(VRAM_BASE + 0xABCD000);
        let mut pramin = Pramin::new(&hw);
        bar1.map(&mut pramin, 2 * SMALL_PAGE_SIZE, phys);
        let data = bar1.entries.read32(&mut pramin, 16) as u64
            | (bar1.entries.read32(&mut pramin, 20) as u64) << 32;
        assert_eq!(data, (phys.as_u64() >> 8) | 0x1);
    }

    #[test]
    fn test_map_outside_first_slot_dropped() {
        let (pool, hw) = fixture();
        let bar1 = DeviceBar1::new(&pool, &hw).unwrap();
        let mut pramin = Pramin::new(&hw);
        bar1.map(
            &mut pramin,
            PAGE_DIRECTORY_SPAN,
            HostPhysAddr::new(VRAM_BASE),
        );
        assert_eq!(bar1.entries.read32(&mut pramin, 0), 0);
    }

    #[test]
    fn test_flush_points_hardware_at_directory() {
        let (pool, hw) = fixture();
        let bar1 = DeviceBar1::new(&pool, &hw).unwrap();
        bar1.flush(&hw);
        let mut registers = Registers::new(&hw);
        assert_eq!(
            registers.read32(regs::VM_FLUSH_PDB),
            (bar1.directory.address().as_u64() >> 8) as u32
        );
        assert_eq!(
            registers.read32(regs::VM_FLUSH_ENGINE),
            regs::VM_FLUSH_BAR_ENGINES
        );
    }
}
