//! RAII handle over a run of VRAM pages.

use std::sync::Arc;

use spin::Mutex;

use crate::error::Error;
use crate::hw::pramin::Pramin;
use crate::hw::Hw;
use crate::memory::vram::{VramMemory, VramPool};
use crate::memory::HostPhysAddr;

/// Owns `n` contiguous VRAM pages for its lifetime.
///
/// The backing pages are zeroed through PRAMIN on construction and
/// returned to the pool on drop. Constructors are top-level lock entry
/// points: the caller must not hold a hardware accessor.
pub struct Page {
    mem: Option<VramMemory>,
    pool: Arc<Mutex<VramPool>>,
}

impl Page {
    pub fn new(pool: &Arc<Mutex<VramPool>>, hw: &Hw, n_pages: usize) -> Result<Page, Error> {
        let mem = pool.lock().allocate(n_pages)?;
        let page = Page {
            mem: Some(mem),
            pool: pool.clone(),
        };
        let mut pramin = Pramin::new(hw);
        page.clear(&mut pramin);
        Ok(page)
    }

    /// GPU-side VRAM address; page aligned.
    pub fn address(&self) -> HostPhysAddr {
        self.mem().address()
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.mem().size()
    }

    /// Zero every word of the backing pages.
    pub fn clear(&self, pramin: &mut Pramin<'_>) {
        let base = self.address();
        let mut offset = 0;
        while offset < self.size() {
            pramin.write32(base.offset(offset), 0);
            offset += 4;
        }
    }

    pub fn write32(&self, pramin: &mut Pramin<'_>, offset: u64, value: u32) {
        self.check_offset(offset);
        pramin.write32(self.address().offset(offset), value)
    }

    pub fn read32(&self, pramin: &mut Pramin<'_>, offset: u64) -> u32 {
        self.check_offset(offset);
        pramin.read32(self.address().offset(offset))
    }

    pub fn write64(&self, pramin: &mut Pramin<'_>, offset: u64, value: u64) {
        self.write32(pramin, offset, value as u32);
        self.write32(pramin, offset + 4, (value >> 32) as u32);
    }

    pub fn read64(&self, pramin: &mut Pramin<'_>, offset: u64) -> u64 {
        let lower = self.read32(pramin, offset) as u64;
        let upper = self.read32(pramin, offset + 4) as u64;
        lower | (upper << 32)
    }

    fn check_offset(&self, offset: u64) {
        assert!(offset < self.size(), "page access past the backing pages");
        assert_eq!(offset % 4, 0, "page access not word aligned");
    }

    fn mem(&self) -> &VramMemory {
        // Present from construction until drop.
        self.mem.as_ref().expect("page backing already released")
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        if let Some(mem) = self.mem.take() {
            self.pool.lock().free(mem);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SMALL_PAGE_SIZE, VRAM_BASE};
    use crate::hw::sim::SimGpu;

    fn fixture() -> (Arc<Mutex<VramPool>>, Hw) {
        let pool = Arc::new(Mutex::new(VramPool::new(
            HostPhysAddr::new(VRAM_BASE),
            64 * SMALL_PAGE_SIZE,
        )));
        let hw = Hw::new(Box::new(SimGpu::new()));
        (pool, hw)
    }

    #[test]
    fn test_single_page_geometry() {
        let (pool, hw) = fixture();
        let page = Page::new(&pool, &hw, 1).unwrap();
        assert_eq!(page.size(), SMALL_PAGE_SIZE);
        assert!(page.address().is_page_aligned());
    }

    #[test]
    fn test_boundary_write_succeeds() {
        let (pool, hw) = fixture();
        let page = Page::new(&pool, &hw, 1).unwrap();
        let mut pramin = Pramin::new(&hw);
        page.write32(&mut pramin, 4092, 0xDEAD);
        assert_eq!(page.read32(&mut pramin, 4092), 0xDEAD);
    }

    #[test]
    #[should_panic(expected = "past the backing pages")]
    fn test_out_of_bounds_write_rejected() {
        let (pool, hw) = fixture();
        let page = Page::new(&pool, &hw, 1).unwrap();
        let mut pramin = Pramin::new(&hw);
        page.write32(&mut pramin, 4096, 0);
    }

    #[test]
    fn test_construction_zeroes_every_word() {
        let (pool, hw) = fixture();
        // Dirty a page, free it, then reallocate it.
        let first = Page::new(&pool, &hw, 2).unwrap();
        let addr = first.address();
        {
            let mut pramin = Pramin::new(&hw);
            first.write32(&mut pramin, 0, 0x1111);
            first.write32(&mut pramin, SMALL_PAGE_SIZE + 4, 0x2222);
            first.write32(&mut pramin, 2 * SMALL_PAGE_SIZE - 4, 0x3333);
        }
        drop(first);
        let second = Page::new(&pool, &hw, 2).unwrap();
        assert_eq!(second.address(), addr);
        let mut pramin = Pramin::new(&hw);
        assert_eq!(second.read32(&mut pramin, 0), 0);
        assert_eq!(second.read32(&mut pramin, SMALL_PAGE_SIZE + 4), 0);
        assert_eq!(second.read32(&mut pramin, 2 * SMALL_PAGE_SIZE - 4), 0);
    }

    #[test]
    fn test_drop_returns_pages() {
        let (pool, hw) = fixture();
        let before = pool.lock().free_pages();
        let page = Page::new(&pool, &hw, 2).unwrap();
        assert_eq!(pool.lock().free_pages(), before - 2);
        drop(page);
        assert_eq!(pool.lock().free_pages(), before);
    }
}
