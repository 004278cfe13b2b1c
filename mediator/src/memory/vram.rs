//! Page-granular allocator over the fixed host-physical VRAM window.
//!
//! The pool tracks 4 KB pages in a word bitmap (set bit = free page).
//! Addresses are encoded from the page index, so an allocation's address
//! is stable for its whole lifetime; the pool never relocates live
//! allocations.

use crate::config::SMALL_PAGE_SIZE;
use crate::error::Error;
use crate::memory::HostPhysAddr;

/// An owned run of contiguous VRAM pages.
///
/// Created only by [`VramPool::allocate`] and destroyed only through
/// [`VramPool::free`]; deliberately not `Clone`, so a live allocation can
/// never be aliased.
#[derive(Debug, PartialEq, Eq)]
pub struct VramMemory {
    address: HostPhysAddr,
    n_pages: usize,
}

impl VramMemory {
    pub fn address(&self) -> HostPhysAddr {
        self.address
    }

    pub fn n_pages(&self) -> usize {
        self.n_pages
    }

    pub fn size(&self) -> u64 {
        self.n_pages as u64 * SMALL_PAGE_SIZE
    }
}

/// Free-page pool over `[base, base + size)`.
pub struct VramPool {
    base: u64,
    n_pages: usize,
    free_pages: usize,
    /// Set bit = page is free.
    bitmap: Vec<u64>,
}

impl VramPool {
    pub fn new(base: HostPhysAddr, size: u64) -> Self {
        assert!(base.is_page_aligned());
        assert_eq!(size % SMALL_PAGE_SIZE, 0);
        let n_pages = (size / SMALL_PAGE_SIZE) as usize;
        let words = n_pages.div_ceil(64);
        let mut bitmap = vec![u64::MAX; words];
        // Clear the bits past the end of the window.
        let tail = n_pages % 64;
        if tail != 0 {
            bitmap[words - 1] = (1u64 << tail) - 1;
        }
        VramPool {
            base: base.as_u64(),
            n_pages,
            free_pages: n_pages,
            bitmap,
        }
    }

    /// Allocate `n` pages: any free page for `n == 1`, a contiguous run
    /// otherwise.
    pub fn allocate(&mut self, n: usize) -> Result<VramMemory, Error> {
        assert!(n >= 1);
        let mut run = 0usize;
        let mut start = 0usize;
        for index in 0..self.n_pages {
            if self.is_free_index(index) {
                if run == 0 {
                    start = index;
                }
                run += 1;
                if run == n {
                    for page in start..start + n {
                        self.clear_bit(page);
                    }
                    self.free_pages -= n;
                    return Ok(VramMemory {
                        address: HostPhysAddr::new(self.base + start as u64 * SMALL_PAGE_SIZE),
                        n_pages: n,
                    });
                }
            } else {
                run = 0;
            }
        }
        log::error!(
            "VRAM pool exhausted: {} pages requested, {} free",
            n,
            self.free_pages
        );
        Err(Error::OutOfVram)
    }

    /// Return an allocation's pages to the pool.
    pub fn free(&mut self, mem: VramMemory) {
        let start = ((mem.address.as_u64() - self.base) / SMALL_PAGE_SIZE) as usize;
        for page in start..start + mem.n_pages {
            debug_assert!(!self.is_free_index(page), "double free of VRAM page");
            self.set_bit(page);
        }
        self.free_pages += mem.n_pages;
    }

    /// Number of pages currently free.
    pub fn free_pages(&self) -> usize {
        self.free_pages
    }

    /// Whether the page holding `addr` is free. Diagnostic helper.
    pub fn is_free(&self, addr: HostPhysAddr) -> bool {
        let index = ((addr.as_u64() - self.base) / SMALL_PAGE_SIZE) as usize;
        self.is_free_index(index)
    }

    fn is_free_index(&self, index: usize) -> bool {
        self.bitmap[index / 64] & (1 << (index % 64)) != 0
    }

    fn set_bit(&mut self, index: usize) {
        self.bitmap[index / 64] |= 1 << (index % 64);
    }

    fn clear_bit(&mut self, index: usize) {
        self.bitmap[index / 64] &= !(1 << (index % 64));
    }
}
