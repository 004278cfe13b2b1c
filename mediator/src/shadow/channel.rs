//! Per-channel RAMIN shadowing and attach/detach.
//!
//! When a guest points a channel register at a RAMIN block, the mediator
//! copies the block into its own shadow RAMIN, re-homes the embedded
//! guest-physical pointers in both copies, rebuilds the channel's shadow
//! page table, and enters the guest RAMIN page in the barrier so later
//! guest writes to it are recognized. Detaching reverses the pointer
//! rewrite so the guest reads back exactly what it wrote.

use std::sync::Arc;

use spin::Mutex;

use crate::error::Error;
use crate::hw::pramin::Pramin;
use crate::hw::Hw;
use crate::memory::{GuestAspace, GuestPhysAddr, HostPhysAddr, Page, VramPool};
use crate::shadow::page_table::ShadowPageTable;
use crate::shadow::remap::RemapTable;

/// Channel id of a guest's BAR1 channel.
pub const BAR1_CHANNEL_ID: u32 = 0;
/// Channel id of a guest's BAR3 channel.
pub const BAR3_CHANNEL_ID: u32 = 1;

/// RAMIN descriptor fields rewritten on attach/detach. The page limit is
/// copied untranslated.
const RAMIN_FAULT_CONTEXT: u64 = 0x08; // 64-bit
const RAMIN_MPEG_CONTEXT_LIMIT: u64 = 0x64; // 32-bit
const RAMIN_MPEG_CONTEXT: u64 = 0x68; // 32-bit
const RAMIN_PAGE_DIRECTORY: u64 = 0x200; // 64-bit
const RAMIN_PAGE_LIMIT: u64 = 0x208; // 64-bit

/// One guest channel and its shadow state.
pub struct Channel {
    id: u32,
    enabled: bool,
    ramin_addr: GuestPhysAddr,
    /// Shadow copy of the guest RAMIN block (two pages).
    ramin: Page,
    table: ShadowPageTable,
}

impl Channel {
    pub fn new(id: u32, pool: &Arc<Mutex<VramPool>>, hw: &Hw) -> Result<Channel, Error> {
        Ok(Channel {
            id,
            enabled: false,
            ramin_addr: GuestPhysAddr::new(0),
            ramin: Page::new(pool, hw, 2)?,
            table: ShadowPageTable::new(id),
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn ramin_address(&self) -> GuestPhysAddr {
        self.ramin_addr
    }

    pub fn table(&self) -> &ShadowPageTable {
        &self.table
    }

    /// Host-physical address of the shadow RAMIN block.
    pub fn shadow_address(&self) -> HostPhysAddr {
        self.ramin.address()
    }

    /// Point the channel at a (possibly new) guest RAMIN block. Returns
    /// the shadow RAMIN address for the hardware-facing register.
    ///
    /// Re-pointing at the current block is a no-op; switching blocks
    /// detaches the old one first so the barrier never holds both.
    pub fn refresh(
        &mut self,
        aspace: &GuestAspace,
        barrier: &mut RemapTable,
        hw: &Hw,
        addr: GuestPhysAddr,
    ) -> Result<HostPhysAddr, Error> {
        log::debug!("channel {}: ramin pointer {}", self.id, addr);
        if self.enabled {
            if addr == self.ramin_addr {
                return Ok(self.ramin.address());
            }
            self.detach(aspace, barrier, hw)?;
        }
        self.enabled = true;
        self.ramin_addr = addr;
        self.attach(aspace, barrier, hw)?;
        Ok(self.ramin.address())
    }

    fn attach(
        &mut self,
        aspace: &GuestAspace,
        barrier: &mut RemapTable,
        hw: &Hw,
    ) -> Result<(), Error> {
        let host_ramin = aspace.to_host(self.ramin_addr)?;
        let mut pramin = Pramin::new(hw);

        // Rebuild the shadow table while the descriptor still holds the
        // guest's values.
        self.table
            .refresh(aspace, &mut pramin, (self.ramin_addr.as_u64() >> 12) as u32)?;

        // Shadow the whole RAMIN block.
        let mut offset = 0;
        while offset < self.ramin.size() {
            let value = pramin.read32(host_ramin.offset(offset));
            self.ramin.write32(&mut pramin, offset, value);
            offset += 4;
        }

        // Re-home the embedded pointers in the live and shadow RAMIN.
        let pd_guest = pramin.read64(host_ramin.offset(RAMIN_PAGE_DIRECTORY));
        let pd_host = aspace.to_host(GuestPhysAddr::new(pd_guest))?.as_u64();
        pramin.write64(host_ramin.offset(RAMIN_PAGE_DIRECTORY), pd_host);
        self.ramin.write64(&mut pramin, RAMIN_PAGE_DIRECTORY, pd_host);
        log::debug!(
            "channel {}: page directory {:#x} -> {:#x}",
            self.id,
            pd_guest,
            pd_host
        );

        let fctx_guest = pramin.read64(host_ramin.offset(RAMIN_FAULT_CONTEXT));
        let fctx_host = aspace.to_host(GuestPhysAddr::new(fctx_guest))?.as_u64();
        pramin.write64(host_ramin.offset(RAMIN_FAULT_CONTEXT), fctx_host);
        self.ramin.write64(&mut pramin, RAMIN_FAULT_CONTEXT, fctx_host);

        let mpeg_limit_guest = pramin.read32(host_ramin.offset(RAMIN_MPEG_CONTEXT_LIMIT));
        let mpeg_limit_host = aspace.to_host32(mpeg_limit_guest)?;
        pramin.write32(host_ramin.offset(RAMIN_MPEG_CONTEXT_LIMIT), mpeg_limit_host);
        self.ramin
            .write32(&mut pramin, RAMIN_MPEG_CONTEXT_LIMIT, mpeg_limit_host);

        let mpeg_guest = pramin.read32(host_ramin.offset(RAMIN_MPEG_CONTEXT));
        let mpeg_host = aspace.to_host32(mpeg_guest)?;
        pramin.write32(host_ramin.offset(RAMIN_MPEG_CONTEXT), mpeg_host);
        self.ramin.write32(&mut pramin, RAMIN_MPEG_CONTEXT, mpeg_host);

        drop(pramin);
        barrier.map(self.ramin_addr.page_start(), host_ramin, false);
        Ok(())
    }

    fn detach(
        &mut self,
        aspace: &GuestAspace,
        barrier: &mut RemapTable,
        hw: &Hw,
    ) -> Result<(), Error> {
        log::debug!("channel {}: detach from {}", self.id, self.ramin_addr);
        barrier.unmap(self.ramin_addr.page_start());
        let host_ramin = aspace.to_host(self.ramin_addr)?;
        let mut pramin = Pramin::new(hw);

        let pd_host = pramin.read64(host_ramin.offset(RAMIN_PAGE_DIRECTORY));
        let pd_guest = aspace.to_guest(HostPhysAddr::new(pd_host))?.as_u64();
        pramin.write64(host_ramin.offset(RAMIN_PAGE_DIRECTORY), pd_guest);

        let fctx_host = pramin.read64(host_ramin.offset(RAMIN_FAULT_CONTEXT));
        let fctx_guest = aspace.to_guest(HostPhysAddr::new(fctx_host))?.as_u64();
        pramin.write64(host_ramin.offset(RAMIN_FAULT_CONTEXT), fctx_guest);

        let mpeg_limit_host = pramin.read32(host_ramin.offset(RAMIN_MPEG_CONTEXT_LIMIT));
        let mpeg_limit_guest = aspace.to_guest32(mpeg_limit_host)?;
        pramin.write32(host_ramin.offset(RAMIN_MPEG_CONTEXT_LIMIT), mpeg_limit_guest);

        let mpeg_host = pramin.read32(host_ramin.offset(RAMIN_MPEG_CONTEXT));
        let mpeg_guest = aspace.to_guest32(mpeg_host)?;
        pramin.write32(host_ramin.offset(RAMIN_MPEG_CONTEXT), mpeg_guest);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PAGE_DIRECTORY_SPAN, SMALL_PAGE_SIZE, VRAM_BASE, VRAM_SIZE};
    use crate::memory::GuestVirtAddr;
    use crate::shadow::pte::{Pde, Pte, ENTRY_BYTES};

    struct Fixture {
        pool: Arc<Mutex<VramPool>>,
        hw: Hw,
        aspace: GuestAspace,
        barrier: RemapTable,
    }

    fn fixture() -> Fixture {
        Fixture {
            pool: Arc::new(Mutex::new(VramPool::new(
                HostPhysAddr::new(VRAM_BASE),
                VRAM_SIZE,
            ))),
            hw: Hw::new(Box::new(crate::hw::sim::SimGpu::new())),
            aspace: GuestAspace::new(0),
            barrier: RemapTable::new(1 << 30),
        }
    }

    /// Write a guest channel descriptor at `ramin` (guest-physical) with
    /// a single-slot page directory and one small mapping.
    fn seed_channel(f: &Fixture, ramin: u64, directory: u64, table: u64) {
        let mut pramin = Pramin::new(&f.hw);
        let host = |g: u64| f.aspace.to_host(GuestPhysAddr::new(g)).unwrap();

        pramin.write64(host(ramin).offset(RAMIN_PAGE_DIRECTORY), directory);
        pramin.write64(host(ramin).offset(RAMIN_PAGE_LIMIT), PAGE_DIRECTORY_SPAN - 1);
        pramin.write64(host(ramin).offset(RAMIN_FAULT_CONTEXT), 0x5000);
        pramin.write32(host(ramin).offset(RAMIN_MPEG_CONTEXT_LIMIT), 0x6000);
        pramin.write32(host(ramin).offset(RAMIN_MPEG_CONTEXT), 0x7000);

        let pde = Pde {
            small_present: true,
            small_address: table >> 12,
            ..Pde::default()
        };
        let (w0, w1) = pde.encode();
        pramin.write32(host(directory), w0);
        pramin.write32(host(directory).offset(4), w1);

        let pte = Pte {
            present: true,
            address: 0xABC_D000 >> 12,
            ..Pte::default()
        };
        let (w0, w1) = pte.encode();
        let slot = host(table).offset((0x1000 / SMALL_PAGE_SIZE) * ENTRY_BYTES);
        pramin.write32(slot, w0);
        pramin.write32(slot.offset(4), w1);
    }

    #[test]
    fn test_attach_rewrites_and_shadows() {
        let mut f = fixture();
        seed_channel(&f, 0x10000, 0x20000, 0x30000);
        let mut channel = Channel::new(BAR3_CHANNEL_ID, &f.pool, &f.hw).unwrap();

        let shadow = channel
            .refresh(
                &f.aspace,
                &mut f.barrier,
                &f.hw,
                GuestPhysAddr::new(0x10000),
            )
            .unwrap();
        assert_eq!(shadow, channel.shadow_address());
        assert!(channel.enabled());

        // Live RAMIN now holds host-physical pointers.
        let mut pramin = Pramin::new(&f.hw);
        let host_ramin = f.aspace.to_host(GuestPhysAddr::new(0x10000)).unwrap();
        assert_eq!(
            pramin.read64(host_ramin.offset(RAMIN_PAGE_DIRECTORY)),
            VRAM_BASE + 0x20000
        );
        assert_eq!(
            pramin.read64(host_ramin.offset(RAMIN_FAULT_CONTEXT)),
            VRAM_BASE + 0x5000
        );
        // The shadow RAMIN matches.
        assert_eq!(
            channel.ramin.read64(&mut pramin, RAMIN_PAGE_DIRECTORY),
            VRAM_BASE + 0x20000
        );
        drop(pramin);

        // The shadow table resolves through the guest's mapping.
        let host = channel.table().resolve(GuestVirtAddr::new(0x1004)).unwrap();
        assert_eq!(host.as_u64(), VRAM_BASE + 0xABC_D004);

        // The RAMIN page is entered in the barrier.
        assert!(f.barrier.lookup(GuestPhysAddr::new(0x10000)).is_some());
    }

    #[test]
    fn test_refresh_same_address_is_idempotent() {
        let mut f = fixture();
        seed_channel(&f, 0x10000, 0x20000, 0x30000);
        let mut channel = Channel::new(BAR3_CHANNEL_ID, &f.pool, &f.hw).unwrap();

        let addr = GuestPhysAddr::new(0x10000);
        channel.refresh(&f.aspace, &mut f.barrier, &f.hw, addr).unwrap();
        channel.refresh(&f.aspace, &mut f.barrier, &f.hw, addr).unwrap();
        // Mapped once, not twice.
        assert_eq!(f.barrier.lookup(addr).unwrap().ref_count, 1);
    }

    #[test]
    fn test_switch_restores_old_ramin_and_moves_barrier() {
        let mut f = fixture();
        seed_channel(&f, 0x10000, 0x20000, 0x30000);
        seed_channel(&f, 0x50000, 0x60000, 0x70000);
        let mut channel = Channel::new(BAR3_CHANNEL_ID, &f.pool, &f.hw).unwrap();

        let a = GuestPhysAddr::new(0x10000);
        let b = GuestPhysAddr::new(0x50000);
        channel.refresh(&f.aspace, &mut f.barrier, &f.hw, a).unwrap();
        channel.refresh(&f.aspace, &mut f.barrier, &f.hw, b).unwrap();

        // A's descriptor fields read back exactly as the guest wrote them.
        let mut pramin = Pramin::new(&f.hw);
        let host_a = f.aspace.to_host(a).unwrap();
        assert_eq!(pramin.read64(host_a.offset(RAMIN_PAGE_DIRECTORY)), 0x20000);
        assert_eq!(pramin.read64(host_a.offset(RAMIN_FAULT_CONTEXT)), 0x5000);
        assert_eq!(
            pramin.read32(host_a.offset(RAMIN_MPEG_CONTEXT_LIMIT)),
            0x6000
        );
        assert_eq!(pramin.read32(host_a.offset(RAMIN_MPEG_CONTEXT)), 0x7000);
        drop(pramin);

        assert_eq!(f.barrier.lookup(a), None);
        assert!(f.barrier.lookup(b).is_some());
        assert_eq!(channel.ramin_address(), b);
    }
}
