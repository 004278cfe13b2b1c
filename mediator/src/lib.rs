//! User-space mediator multiplexing a single NVC0-family GPU between guest
//! virtual machines.
//!
//! Guest accesses to the GPU's PCI BARs are trapped by the virtualization
//! host and delivered to this daemon as 16-byte command records. The core
//! keeps a shadow copy of every guest channel's page directory tree,
//! rewrites guest-physical GPU addresses into host-physical ones, and
//! forwards the sanitized accesses to the real hardware.
//!
//! The crate is split the same way the dataflow is:
//! - [`hw`]: serialized MMIO to the mapped BARs and the PRAMIN indirect
//!   VRAM window.
//! - [`memory`]: the VRAM page pool and RAII page handles.
//! - [`shadow`]: shadow page tables, channel attach/detach, the remap
//!   (barrier) table, and the FIFO playlist.
//! - [`device`]: the process-wide device state (BARs, VRAM pool,
//!   virtual-GPU id pool, GPU ownership) and the BAR1 shadow channel.
//! - [`session`]: the per-guest command handler.
//!
//! The Unix-socket transport, the PCI bootstrap that maps the BARs, and
//! the hypervisor device-assignment calls are external collaborators; the
//! core consumes them through the [`hw::GpuBars`] and
//! [`hypervisor::Hypervisor`] traits and the byte-level
//! [`session::Command`] records.

pub mod config;
pub mod device;
pub mod error;
pub mod hw;
pub mod hypervisor;
pub mod logger;
pub mod memory;
pub mod session;
pub mod shadow;

pub use error::Error;
