//! Process-wide device state.
//!
//! One `Device` is constructed in `main` and shared by every session
//! through an `Arc`; there are no hidden globals. Each shared resource
//! sits behind its own lock: the mapped BARs (the hardware mutex inside
//! [`Hw`]), the VRAM pool, the virtual-GPU id bitmap, and GPU ownership.
//! Constructors and `Drop` impls are the only places that take the VRAM
//! pool lock, and they never do so while holding a hardware accessor.

pub mod bar1;

use std::sync::Arc;

use spin::Mutex;

use crate::config::{MAX_VGPUS, VRAM_BASE, VRAM_SIZE};
use crate::error::Error;
use crate::hw::{Bar, GpuBars, Hw};
use crate::hypervisor::Hypervisor;
use crate::memory::{HostPhysAddr, VramMemory, VramPool};

use bar1::DeviceBar1;

/// Bitmap of virtual GPU ids; set bit = id in use.
struct VirtIds {
    bits: u32,
}

impl VirtIds {
    fn acquire(&mut self) -> Option<u32> {
        let id = (0..MAX_VGPUS).find(|id| self.bits & (1 << id) == 0)?;
        self.bits |= 1 << id;
        Some(id)
    }

    fn release(&mut self, id: u32) {
        debug_assert!(self.bits & (1 << id) != 0, "releasing a free GPU id");
        self.bits &= !(1 << id);
    }
}

/// Which domain currently owns the physical GPU.
struct GpuOwner {
    domid: Option<i32>,
    backend: Box<dyn Hypervisor>,
}

/// The mediated GPU.
pub struct Device {
    hw: Hw,
    vram: Arc<Mutex<VramPool>>,
    virts: Mutex<VirtIds>,
    owner: Mutex<GpuOwner>,
    bar1: DeviceBar1,
}

impl Device {
    pub fn new(
        bars: Box<dyn GpuBars>,
        hypervisor: Box<dyn Hypervisor>,
    ) -> Result<Arc<Device>, Error> {
        let hw = Hw::new(bars);
        let vram = Arc::new(Mutex::new(VramPool::new(
            HostPhysAddr::new(VRAM_BASE),
            VRAM_SIZE,
        )));
        let bar1 = DeviceBar1::new(&vram, &hw)?;
        log::info!("device initialized");
        Ok(Arc::new(Device {
            hw,
            vram,
            virts: Mutex::new(VirtIds { bits: 0 }),
            owner: Mutex::new(GpuOwner {
                domid: None,
                backend: hypervisor,
            }),
            bar1,
        }))
    }

    pub fn hw(&self) -> &Hw {
        &self.hw
    }

    pub fn vram(&self) -> &Arc<Mutex<VramPool>> {
        &self.vram
    }

    pub fn bar1(&self) -> &DeviceBar1 {
        &self.bar1
    }

    /// Claim the lowest free virtual GPU id.
    pub fn acquire_virt(&self) -> Option<u32> {
        self.virts.lock().acquire()
    }

    pub fn release_virt(&self, id: u32) {
        self.virts.lock().release(id)
    }

    /// Move physical GPU ownership to `domid`: deassign from the current
    /// owner first, then assign. A failed call leaves the recorded
    /// ownership matching what the hypervisor last acknowledged.
    pub fn try_acquire_gpu(&self, domid: i32) -> bool {
        let mut owner = self.owner.lock();
        if let Some(previous) = owner.domid {
            if let Err(e) = owner.backend.deassign_device(previous) {
                log::error!("deassign from domain {} failed: {}", previous, e);
                return false;
            }
            owner.domid = None;
        }
        if let Err(e) = owner.backend.assign_device(domid) {
            log::error!("assign to domain {} failed: {}", domid, e);
            return false;
        }
        owner.domid = Some(domid);
        true
    }

    /// Domain currently holding the GPU, if any.
    pub fn owner_domid(&self) -> Option<i32> {
        self.owner.lock().domid
    }

    /// Allocate VRAM pages from the pool.
    pub fn malloc(&self, n_pages: usize) -> Result<VramMemory, Error> {
        self.vram.lock().allocate(n_pages)
    }

    /// Return VRAM pages to the pool.
    pub fn free(&self, mem: VramMemory) {
        self.vram.lock().free(mem)
    }

    /// Raw 32-bit MMIO read on a mapped BAR.
    pub fn read(&self, bar: Bar, offset: u64) -> u32 {
        self.hw.lock().read32(bar, offset)
    }

    /// Raw 32-bit MMIO write on a mapped BAR.
    pub fn write(&self, bar: Bar, offset: u64, value: u32) {
        self.hw.lock().write32(bar, offset, value)
    }
}
