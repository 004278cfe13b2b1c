//! Typed 64-bit addresses in the GPU address space.
//!
//! Three address kinds flow through the mediator and must never be mixed:
//! guest-virtual addresses (what a guest channel's page tables translate),
//! guest-physical addresses (what the guest believes VRAM looks like), and
//! host-physical addresses (real VRAM, the only kind PRAMIN accepts).

use core::fmt;

use crate::config::SMALL_PAGE_SIZE;

/// A real VRAM address on the host side of the translation.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HostPhysAddr(u64);

impl HostPhysAddr {
    pub const fn new(addr: u64) -> Self {
        HostPhysAddr(addr)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub fn offset(self, bytes: u64) -> Self {
        HostPhysAddr(self.0 + bytes)
    }

    pub fn is_page_aligned(self) -> bool {
        self.0 % SMALL_PAGE_SIZE == 0
    }
}

impl fmt::Debug for HostPhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostPhysAddr({:#x})", self.0)
    }
}

impl fmt::Display for HostPhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A VRAM address as seen by a guest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GuestPhysAddr(u64);

impl GuestPhysAddr {
    pub const fn new(addr: u64) -> Self {
        GuestPhysAddr(addr)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub fn offset(self, bytes: u64) -> Self {
        GuestPhysAddr(self.0 + bytes)
    }

    /// Start of the small page containing this address.
    pub fn page_start(self) -> Self {
        GuestPhysAddr(self.0 & !(SMALL_PAGE_SIZE - 1))
    }
}

impl fmt::Debug for GuestPhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GuestPhysAddr({:#x})", self.0)
    }
}

impl fmt::Display for GuestPhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// An address in a guest channel's GPU virtual address space.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GuestVirtAddr(u64);

impl GuestVirtAddr {
    pub const fn new(addr: u64) -> Self {
        GuestVirtAddr(addr)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub fn offset(self, bytes: u64) -> Self {
        GuestVirtAddr(self.0 + bytes)
    }
}

impl fmt::Debug for GuestVirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GuestVirtAddr({:#x})", self.0)
    }
}

impl fmt::Display for GuestVirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
