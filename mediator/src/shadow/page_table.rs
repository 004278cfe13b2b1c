//! Shadow of a guest channel's page directory tree.
//!
//! The shadow mirrors the guest's two-level translation structures with
//! every embedded guest-physical pointer re-homed into the guest's VRAM
//! partition. Nothing is cached across refreshes: each refresh re-reads
//! the guest's tables out of VRAM through PRAMIN.

use crate::config::{
    LARGE_PAGE_SHIFT, LARGE_PAGE_SIZE, MAX_PAGE_DIRECTORIES, PAGE_DIRECTORY_SPAN,
    SMALL_PAGE_SHIFT, SMALL_PAGE_SIZE,
};
use crate::error::Error;
use crate::hw::pramin::Pramin;
use crate::memory::{GuestAspace, GuestPhysAddr, GuestVirtAddr, HostPhysAddr};
use crate::shadow::pte::{Pde, Pte, ENTRY_BYTES};

/// RAMIN descriptor offsets consumed by the refresh.
const RAMIN_PAGE_DIRECTORY: u64 = 0x200;
const RAMIN_PAGE_LIMIT: u64 = 0x208;

/// One shadowed page table entry: the entry as the guest wrote it, and
/// the same entry with its page address re-homed.
#[derive(Debug, Clone, Copy)]
pub struct ShadowPte {
    pub guest: Pte,
    pub host: Pte,
}

/// Shadow of one page directory slot (32 MB of guest virtual space).
#[derive(Debug, Default)]
pub struct ShadowPageDirectory {
    pde: Pde,
    small: Vec<ShadowPte>,
    large: Vec<ShadowPte>,
}

impl ShadowPageDirectory {
    fn refresh(
        aspace: &GuestAspace,
        pramin: &mut Pramin<'_>,
        pde_addr: HostPhysAddr,
    ) -> Result<ShadowPageDirectory, Error> {
        let pde = Pde::decode(pramin.read32(pde_addr), pramin.read32(pde_addr.offset(4)));
        let mut dir = ShadowPageDirectory {
            pde,
            small: Vec::new(),
            large: Vec::new(),
        };
        if pde.large_present {
            let table = aspace.to_host(GuestPhysAddr::new(pde.large_address << 12))?;
            let count = PAGE_DIRECTORY_SPAN >> LARGE_PAGE_SHIFT;
            dir.large = read_entries(aspace, pramin, table, count)?;
        }
        if pde.small_present {
            let table = aspace.to_host(GuestPhysAddr::new(pde.small_address << 12))?;
            let count = PAGE_DIRECTORY_SPAN >> SMALL_PAGE_SHIFT;
            dir.small = read_entries(aspace, pramin, table, count)?;
        }
        Ok(dir)
    }

    /// Resolve an offset within this slot; the large-page path wins.
    fn resolve(&self, offset: u64) -> Option<HostPhysAddr> {
        if self.pde.large_present {
            let index = (offset / LARGE_PAGE_SIZE) as usize;
            let rest = offset % LARGE_PAGE_SIZE;
            if let Some(entry) = self.large.get(index) {
                if entry.host.present {
                    return Some(entry.host.page_address().offset(rest));
                }
            }
        }
        if self.pde.small_present {
            let index = (offset / SMALL_PAGE_SIZE) as usize;
            let rest = offset % SMALL_PAGE_SIZE;
            if let Some(entry) = self.small.get(index) {
                if entry.host.present {
                    return Some(entry.host.page_address().offset(rest));
                }
            }
        }
        None
    }

    pub fn pde(&self) -> Pde {
        self.pde
    }

    pub fn small_entries(&self) -> &[ShadowPte] {
        &self.small
    }

    pub fn large_entries(&self) -> &[ShadowPte] {
        &self.large
    }
}

fn read_entries(
    aspace: &GuestAspace,
    pramin: &mut Pramin<'_>,
    table: HostPhysAddr,
    count: u64,
) -> Result<Vec<ShadowPte>, Error> {
    let mut entries = Vec::with_capacity(count as usize);
    for i in 0..count {
        let addr = table.offset(i * ENTRY_BYTES);
        let guest = Pte::decode(pramin.read32(addr), pramin.read32(addr.offset(4)));
        let host = if guest.present {
            let page = aspace.to_host(GuestPhysAddr::new(guest.address << 12))?;
            Pte {
                address: page.as_u64() >> 12,
                ..guest
            }
        } else {
            guest
        };
        entries.push(ShadowPte { guest, host });
    }
    Ok(entries)
}

/// Mirror of one guest channel's page directory.
pub struct ShadowPageTable {
    channel_id: u32,
    /// Raw channel register value the table was last refreshed from.
    channel_value: u32,
    ramin_addr: GuestPhysAddr,
    page_directory: HostPhysAddr,
    /// Guest virtual space covered, in bytes.
    size: u64,
    directories: Vec<ShadowPageDirectory>,
}

impl ShadowPageTable {
    pub fn new(channel_id: u32) -> Self {
        ShadowPageTable {
            channel_id,
            channel_value: 0,
            ramin_addr: GuestPhysAddr::new(0),
            page_directory: HostPhysAddr::new(0),
            size: 0,
            directories: Vec::new(),
        }
    }

    /// Rebuild the shadow from a channel register value: the low 30 bits
    /// point at the guest RAMIN block (shifted right by 12), whose
    /// descriptor names the page directory and the virtual-space limit.
    pub fn refresh(
        &mut self,
        aspace: &GuestAspace,
        pramin: &mut Pramin<'_>,
        value: u32,
    ) -> Result<(), Error> {
        let ramin = GuestPhysAddr::new(((value as u64) & 0x3FFF_FFFF) << 12);
        let host_ramin = aspace.to_host(ramin)?;
        let page_directory = pramin.read64(host_ramin.offset(RAMIN_PAGE_DIRECTORY));
        let page_limit = pramin.read64(host_ramin.offset(RAMIN_PAGE_LIMIT));
        log::debug!(
            "channel {}: ramin {} page directory {:#x} limit {:#x}",
            self.channel_id,
            ramin,
            page_directory,
            page_limit
        );
        let pd_host = aspace.to_host(GuestPhysAddr::new(page_directory))?;
        self.refresh_directories(aspace, pramin, pd_host, page_limit)?;
        self.channel_value = value;
        self.ramin_addr = ramin;
        Ok(())
    }

    /// Rebuild the shadow from an already-translated page directory.
    ///
    /// A failure leaves the previous shadow contents in place.
    pub fn refresh_directories(
        &mut self,
        aspace: &GuestAspace,
        pramin: &mut Pramin<'_>,
        page_directory: HostPhysAddr,
        page_limit: u64,
    ) -> Result<(), Error> {
        let size = page_limit.wrapping_add(1);
        if size == 0 {
            return Err(Error::TableTooLarge);
        }
        let count = size.div_ceil(PAGE_DIRECTORY_SPAN) as usize;
        if count > MAX_PAGE_DIRECTORIES {
            log::warn!(
                "channel {}: refresh wants {} page directories, cap is {}",
                self.channel_id,
                count,
                MAX_PAGE_DIRECTORIES
            );
            return Err(Error::TableTooLarge);
        }

        let mut directories = Vec::with_capacity(count);
        for i in 0..count as u64 {
            let pde_addr = page_directory.offset(i * ENTRY_BYTES);
            directories.push(ShadowPageDirectory::refresh(aspace, pramin, pde_addr)?);
        }

        self.page_directory = page_directory;
        self.size = size;
        self.directories = directories;
        log::debug!(
            "channel {}: shadowed {} page directories at {}",
            self.channel_id,
            count,
            page_directory
        );
        if log::log_enabled!(log::Level::Trace) {
            self.dump();
        }
        Ok(())
    }

    /// Translate a guest virtual address through the shadow.
    pub fn resolve(&self, virt: GuestVirtAddr) -> Option<HostPhysAddr> {
        let index = (virt.as_u64() / PAGE_DIRECTORY_SPAN) as usize;
        let directory = self.directories.get(index)?;
        directory.resolve(virt.as_u64() % PAGE_DIRECTORY_SPAN)
    }

    pub fn channel_id(&self) -> u32 {
        self.channel_id
    }

    pub fn channel_value(&self) -> u32 {
        self.channel_value
    }

    pub fn ramin_address(&self) -> GuestPhysAddr {
        self.ramin_addr
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn directories(&self) -> &[ShadowPageDirectory] {
        &self.directories
    }

    /// Log the shadow's mappings. Diagnostic only.
    pub fn dump(&self) {
        for (i, dir) in self.directories.iter().enumerate() {
            let base = i as u64 * PAGE_DIRECTORY_SPAN;
            log::trace!(
                "PDE {:#x}: large {} / small {}",
                self.page_directory.as_u64() + i as u64 * ENTRY_BYTES,
                dir.pde.large_present,
                dir.pde.small_present
            );
            for (j, entry) in dir.large.iter().enumerate() {
                if entry.host.present {
                    log::trace!(
                        "  PTE {:#x} => {} [{}]",
                        base + j as u64 * LARGE_PAGE_SIZE,
                        entry.host.page_address(),
                        if entry.host.read_only { "RO" } else { "RW" }
                    );
                }
            }
            for (j, entry) in dir.small.iter().enumerate() {
                if entry.host.present {
                    log::trace!(
                        "  PTE {:#x} => {} [{}]",
                        base + j as u64 * SMALL_PAGE_SIZE,
                        entry.host.page_address(),
                        if entry.host.read_only { "RO" } else { "RW" }
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VRAM_BASE;
    use crate::hw::sim::SimGpu;
    use crate::hw::Hw;

    fn hw() -> Hw {
        Hw::new(Box::new(SimGpu::new()))
    }

    /// Lay out a guest descriptor in simulated VRAM: a RAMIN block at
    /// guest 0x10000, a page directory at 0x20000 with one small-table
    /// slot at 0x30000, and `mappings` as (virt, guest_phys) pairs.
    fn seed_guest(hw: &Hw, aspace: &GuestAspace, limit: u64, mappings: &[(u64, u64)]) -> u32 {
        let mut pramin = Pramin::new(hw);
        let ramin = aspace.to_host(GuestPhysAddr::new(0x10000)).unwrap();
        let directory = aspace.to_host(GuestPhysAddr::new(0x20000)).unwrap();
        let table = aspace.to_host(GuestPhysAddr::new(0x30000)).unwrap();

        pramin.write64(ramin.offset(RAMIN_PAGE_DIRECTORY), 0x20000);
        pramin.write64(ramin.offset(RAMIN_PAGE_LIMIT), limit);

        let pde = Pde {
            small_present: true,
            small_address: 0x30000 >> 12,
            ..Pde::default()
        };
        let (w0, w1) = pde.encode();
        pramin.write32(directory, w0);
        pramin.write32(directory.offset(4), w1);

        for &(virt, phys) in mappings {
            assert!(virt < PAGE_DIRECTORY_SPAN);
            let pte = Pte {
                present: true,
                address: phys >> 12,
                ..Pte::default()
            };
            let (w0, w1) = pte.encode();
            let slot = table.offset((virt / SMALL_PAGE_SIZE) * ENTRY_BYTES);
            pramin.write32(slot, w0);
            pramin.write32(slot.offset(4), w1);
        }
        // Channel register value naming the RAMIN block.
        (0x10000u64 >> 12) as u32
    }

    #[test]
    fn test_refresh_and_resolve_small_mapping() {
        let hw = hw();
        let aspace = GuestAspace::new(0);
        let value = seed_guest(&hw, &aspace, PAGE_DIRECTORY_SPAN - 1, &[(0x1000, 0xABC_D000)]);

        let mut table = ShadowPageTable::new(0);
        let mut pramin = Pramin::new(&hw);
        table.refresh(&aspace, &mut pramin, value).unwrap();

        assert_eq!(table.directories().len(), 1);
        assert_eq!(table.size(), PAGE_DIRECTORY_SPAN);
        let host = table.resolve(GuestVirtAddr::new(0x1234)).unwrap();
        assert_eq!(host.as_u64(), VRAM_BASE + 0xABC_D000 + 0x234);
    }

    #[test]
    fn test_unmapped_resolutions() {
        let hw = hw();
        let aspace = GuestAspace::new(0);
        let value = seed_guest(&hw, &aspace, PAGE_DIRECTORY_SPAN - 1, &[(0x1000, 0xABC_D000)]);

        let mut table = ShadowPageTable::new(0);
        let mut pramin = Pramin::new(&hw);
        table.refresh(&aspace, &mut pramin, value).unwrap();

        // Same slot, absent entry.
        assert_eq!(table.resolve(GuestVirtAddr::new(0x3000)), None);
        // Past the covered virtual space.
        assert_eq!(
            table.resolve(GuestVirtAddr::new(4 * PAGE_DIRECTORY_SPAN)),
            None
        );
    }

    #[test]
    fn test_directory_count_matches_limit() {
        let hw = hw();
        let aspace = GuestAspace::new(0);
        let value = seed_guest(&hw, &aspace, 3 * PAGE_DIRECTORY_SPAN + 5, &[]);

        let mut table = ShadowPageTable::new(0);
        let mut pramin = Pramin::new(&hw);
        table.refresh(&aspace, &mut pramin, value).unwrap();
        // limit + 1 bytes of virtual space, rounded up to directory slots
        assert_eq!(table.directories().len(), 4);
    }

    #[test]
    fn test_oversized_refresh_keeps_previous_shadow() {
        let hw = hw();
        let aspace = GuestAspace::new(0);
        let value = seed_guest(&hw, &aspace, PAGE_DIRECTORY_SPAN - 1, &[(0x1000, 0xABC_D000)]);

        let mut table = ShadowPageTable::new(0);
        let mut pramin = Pramin::new(&hw);
        table.refresh(&aspace, &mut pramin, value).unwrap();

        // Grow the limit past the cap and refresh again.
        let ramin = aspace.to_host(GuestPhysAddr::new(0x10000)).unwrap();
        pramin.write64(
            ramin.offset(RAMIN_PAGE_LIMIT),
            MAX_PAGE_DIRECTORIES as u64 * PAGE_DIRECTORY_SPAN,
        );
        assert_eq!(
            table.refresh(&aspace, &mut pramin, value),
            Err(Error::TableTooLarge)
        );
        // The previous shadow still answers.
        assert!(table.resolve(GuestVirtAddr::new(0x1000)).is_some());
        assert_eq!(table.directories().len(), 1);
    }

    #[test]
    fn test_populated_vectors_follow_present_bits() {
        let hw = hw();
        let aspace = GuestAspace::new(0);
        let value = seed_guest(&hw, &aspace, PAGE_DIRECTORY_SPAN - 1, &[]);

        let mut table = ShadowPageTable::new(0);
        let mut pramin = Pramin::new(&hw);
        table.refresh(&aspace, &mut pramin, value).unwrap();
        let dir = &table.directories()[0];
        assert!(dir.pde().small_present);
        assert!(!dir.pde().large_present);
        assert!(!dir.small_entries().is_empty());
        assert!(dir.large_entries().is_empty());
    }
}
