//! VRAM management: typed GPU addresses, the host-physical page pool, and
//! RAII page handles.

pub mod addr;
pub mod aspace;
pub mod page;
pub mod vram;

pub use addr::{GuestPhysAddr, GuestVirtAddr, HostPhysAddr};
pub use aspace::GuestAspace;
pub use page::Page;
pub use vram::{VramMemory, VramPool};
