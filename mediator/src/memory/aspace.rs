//! Per-guest VRAM partitioning.
//!
//! Each virtual GPU owns a fixed slice of the managed VRAM window:
//! `[VRAM_BASE + vid * VM_VRAM_SIZE, VRAM_BASE + (vid + 1) * VM_VRAM_SIZE)`.
//! Guests address VRAM from zero; re-homing a guest pointer is a bounds
//! check plus the partition base.

use crate::config::{MAX_VGPUS, VM_VRAM_SIZE, VRAM_BASE};
use crate::error::Error;
use crate::memory::{GuestPhysAddr, HostPhysAddr};

/// Translation window for one guest's VRAM partition.
#[derive(Debug, Clone, Copy)]
pub struct GuestAspace {
    base: u64,
    size: u64,
}

impl GuestAspace {
    pub fn new(vid: u32) -> Self {
        debug_assert!(vid < MAX_VGPUS);
        GuestAspace {
            base: VRAM_BASE + vid as u64 * VM_VRAM_SIZE,
            size: VM_VRAM_SIZE,
        }
    }

    /// Host-physical base of this guest's partition.
    pub fn base(&self) -> HostPhysAddr {
        HostPhysAddr::new(self.base)
    }

    /// Re-home a guest-physical pointer into the partition.
    pub fn to_host(&self, guest: GuestPhysAddr) -> Result<HostPhysAddr, Error> {
        if guest.as_u64() >= self.size {
            return Err(Error::BadTranslation);
        }
        Ok(HostPhysAddr::new(self.base + guest.as_u64()))
    }

    /// Inverse of [`to_host`](Self::to_host).
    pub fn to_guest(&self, host: HostPhysAddr) -> Result<GuestPhysAddr, Error> {
        let addr = host.as_u64();
        if addr < self.base || addr >= self.base + self.size {
            return Err(Error::BadTranslation);
        }
        Ok(GuestPhysAddr::new(addr - self.base))
    }

    /// Translate a guest pointer stored in a 32-bit RAMIN field.
    ///
    /// `VRAM_BASE` is an exact multiple of 4 GB, so the low 32 bits of a
    /// host address within a partition are `guest + vid * VM_VRAM_SIZE`,
    /// which fits: the fields round-trip exactly through
    /// [`to_guest32`](Self::to_guest32).
    pub fn to_host32(&self, guest: u32) -> Result<u32, Error> {
        let host = self.to_host(GuestPhysAddr::new(guest as u64))?;
        Ok(host.as_u64() as u32)
    }

    /// Inverse of [`to_host32`](Self::to_host32).
    pub fn to_guest32(&self, host: u32) -> Result<u32, Error> {
        let low = host as u64;
        let base_low = self.base & 0xFFFF_FFFF;
        if low < base_low || low >= base_low + self.size {
            return Err(Error::BadTranslation);
        }
        Ok((low - base_low) as u32)
    }
}
