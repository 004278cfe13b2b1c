//! BAR0 register offsets for the NVC0 family.
//!
//! Grouped per function block so a later generation can carry its own
//! table.

// ---- PBUS / PRAMIN window ----

/// PRAMIN aperture base, stored shifted right by 16.
pub const PRAMIN_WINDOW: u32 = 0x001700;
/// BAR1 channel RAMIN pointer (low 30 bits, shifted right by 12).
pub const BAR1_CHANNEL: u32 = 0x001704;
/// BAR3 channel RAMIN pointer, same encoding as BAR1.
pub const BAR3_CHANNEL: u32 = 0x001714;

/// Start of the 64 KB PRAMIN aperture in BAR0.
pub const PRAMIN_APERTURE: u32 = 0x700000;
/// The aperture covers 64 KB of VRAM at a time.
pub const PRAMIN_APERTURE_SIZE: u64 = 0x10000;

// ---- PFIFO ----

/// User poll area base (bits 0..27, shifted right by 12).
pub const POLL_AREA: u32 = 0x002254;
/// Playlist base page (shifted right by 12).
pub const PLAYLIST_BASE: u32 = 0x002270;
/// Playlist submit: low bits carry the entry count.
pub const PLAYLIST_SUBMIT: u32 = 0x002274;
/// Channel kill/preempt register.
pub const CHANNEL_KILL: u32 = 0x002634;

// ---- VM / TLB flush block ----

/// VM engine status; low bytes busy flags, bit 15 flush-done.
pub const VM_ENGINE_STATUS: u32 = 0x100c80;
/// Page directory base for the flush, shifted right by 8.
pub const VM_FLUSH_PDB: u32 = 0x100cb8;
/// Flush trigger; the value selects the engines to flush.
pub const VM_FLUSH_ENGINE: u32 = 0x100cbc;

/// Engine mask used when flushing the BAR1 shadow channel.
pub const VM_FLUSH_BAR_ENGINES: u32 = 1 | 4;
