//! Fixed layout and sizing constants for the mediated GPU.
//!
//! Everything here is decided at process start and never changes: the
//! host-physical VRAM window handed to the mediator, how that window is
//! partitioned between guests, and the hardware's page geometry.

/// Host-physical base of the VRAM region managed by the mediator (4 GB).
pub const VRAM_BASE: u64 = 0x1_0000_0000;

/// Size of the managed VRAM region (2 GB, 4 GB..6 GB host-physical).
pub const VRAM_SIZE: u64 = 0x8000_0000;

/// Number of virtual GPUs the device multiplexes.
pub const MAX_VGPUS: u32 = 2;

/// Each guest owns a fixed, equal slice of the VRAM window.
pub const VM_VRAM_SIZE: u64 = VRAM_SIZE / MAX_VGPUS as u64;

/// Hardware channels available to each virtual GPU.
pub const CHANNELS_PER_VGPU: u32 = 64;

/// Small page: 4 KB.
pub const SMALL_PAGE_SHIFT: u64 = 12;
pub const SMALL_PAGE_SIZE: u64 = 1 << SMALL_PAGE_SHIFT;

/// Large page: 128 KB.
pub const LARGE_PAGE_SHIFT: u64 = 17;
pub const LARGE_PAGE_SIZE: u64 = 1 << LARGE_PAGE_SHIFT;

/// Virtual address span covered by one page directory entry (32 MB).
pub const PAGE_DIRECTORY_SPAN: u64 = 0x200_0000;

/// Cap on page directory entries per shadow table (2 GB of guest virtual
/// space). A refresh that would exceed this aborts and keeps the previous
/// shadow contents.
pub const MAX_PAGE_DIRECTORIES: usize = 64;

/// The guest poll area spans 128 small pages of BAR1.
pub const POLL_AREA_PAGES: u64 = 128;

/// Unix socket endpoint served by the daemon.
pub const ENDPOINT: &str = "/tmp/mediator_endpoint";

/// Physical channel id backing a guest's virtual channel id.
pub fn phys_channel_id(vid: u32, virt_cid: u32) -> u32 {
    vid * CHANNELS_PER_VGPU + virt_cid
}
