//! Shadow translation state kept per guest: mirrored page tables, channel
//! RAMIN shadows, the guest-physical remap (barrier) table, and the FIFO
//! playlist rewriter.

pub mod channel;
pub mod page_table;
pub mod playlist;
pub mod pte;
pub mod remap;

pub use channel::Channel;
pub use page_table::ShadowPageTable;
pub use playlist::Playlist;
pub use remap::RemapTable;
