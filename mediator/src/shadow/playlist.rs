//! FIFO playlist rewriting.
//!
//! The guest submits a playlist of its virtual channel ids; the scheduler
//! needs physical ones. The mediator keeps two pages and ping-pongs
//! between them so the page handed to the hardware is never the one being
//! rewritten.

use std::sync::Arc;

use spin::Mutex;

use crate::config::{phys_channel_id, CHANNELS_PER_VGPU};
use crate::error::Error;
use crate::hw::pramin::Pramin;
use crate::hw::Hw;
use crate::memory::{GuestAspace, GuestPhysAddr, HostPhysAddr, Page, VramPool};

/// Double-buffered playlist of physical channel ids.
pub struct Playlist {
    pages: [Page; 2],
    cursor: usize,
}

impl Playlist {
    pub fn new(pool: &Arc<Mutex<VramPool>>, hw: &Hw) -> Result<Playlist, Error> {
        Ok(Playlist {
            pages: [Page::new(pool, hw, 1)?, Page::new(pool, hw, 1)?],
            cursor: 0,
        })
    }

    /// Read `count` entries of the guest playlist at `guest_addr`,
    /// rewrite the channel ids, and return the address of the rebuilt
    /// page for the scheduler.
    pub fn update(
        &mut self,
        aspace: &GuestAspace,
        vid: u32,
        hw: &Hw,
        guest_addr: GuestPhysAddr,
        count: u32,
    ) -> Result<HostPhysAddr, Error> {
        let page = self.toggle();
        let mut pramin = Pramin::new(hw);
        log::debug!("FIFO playlist update, {} entries", count);
        for i in 0..count as u64 {
            let entry = aspace.to_host(guest_addr.offset(i * 8))?;
            let cid = pramin.read32(entry);
            if cid >= CHANNELS_PER_VGPU {
                log::warn!("playlist entry {} names channel {} out of range", i, cid);
            }
            let pcid = phys_channel_id(vid, cid % CHANNELS_PER_VGPU);
            log::debug!("FIFO playlist cid {} => {}", cid, pcid);
            page.write32(&mut pramin, i * 8, pcid);
            page.write32(&mut pramin, i * 8 + 4, 0x4);
        }
        Ok(page.address())
    }

    fn toggle(&mut self) -> &Page {
        self.cursor ^= 1;
        &self.pages[self.cursor & 0x1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{VRAM_BASE, VRAM_SIZE};
    use crate::hw::sim::SimGpu;

    fn fixture() -> (Arc<Mutex<VramPool>>, Hw, GuestAspace) {
        let pool = Arc::new(Mutex::new(VramPool::new(
            HostPhysAddr::new(VRAM_BASE),
            VRAM_SIZE,
        )));
        let hw = Hw::new(Box::new(SimGpu::new()));
        (pool, hw, GuestAspace::new(1))
    }

    #[test]
    fn test_update_rewrites_channel_ids() {
        let (pool, hw, aspace) = fixture();
        let mut playlist = Playlist::new(&pool, &hw).unwrap();

        // Guest playlist with channels 3 and 7.
        let guest_addr = GuestPhysAddr::new(0x4000);
        {
            let mut pramin = Pramin::new(&hw);
            let host = aspace.to_host(guest_addr).unwrap();
            pramin.write32(host, 3);
            pramin.write32(host.offset(8), 7);
        }

        let out = playlist.update(&aspace, 1, &hw, guest_addr, 2).unwrap();
        let mut pramin = Pramin::new(&hw);
        assert_eq!(pramin.read32(out), 64 + 3);
        assert_eq!(pramin.read32(out.offset(4)), 0x4);
        assert_eq!(pramin.read32(out.offset(8)), 64 + 7);
        assert_eq!(pramin.read32(out.offset(12)), 0x4);
    }

    #[test]
    fn test_update_alternates_pages() {
        let (pool, hw, aspace) = fixture();
        let mut playlist = Playlist::new(&pool, &hw).unwrap();
        let guest_addr = GuestPhysAddr::new(0x4000);

        let first = playlist.update(&aspace, 1, &hw, guest_addr, 0).unwrap();
        let second = playlist.update(&aspace, 1, &hw, guest_addr, 0).unwrap();
        let third = playlist.update(&aspace, 1, &hw, guest_addr, 0).unwrap();
        assert_ne!(first, second);
        assert_eq!(first, third);
    }

    #[test]
    fn test_zero_count_returns_fresh_page() {
        let (pool, hw, aspace) = fixture();
        let mut playlist = Playlist::new(&pool, &hw).unwrap();
        let inactive = playlist.pages[1].address();
        let out = playlist
            .update(&aspace, 1, &hw, GuestPhysAddr::new(0x4000), 0)
            .unwrap();
        assert_eq!(out, inactive);
    }
}
