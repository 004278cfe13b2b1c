//! Barrier notifications.
//!
//! When a guest access lands on a page the mediator entered in the remap
//! table (a page backing translation structures), the access is noted
//! before being committed. Recording the access is all the current
//! hardware generation needs; the hook is where selective re-shadowing
//! would go.

use crate::memory::GuestPhysAddr;
use crate::session::context::Guest;

impl Guest {
    pub(crate) fn read_barrier(&self, addr: GuestPhysAddr) {
        let page = addr.page_start();
        log::debug!("read barrier {} : page {}", addr, page);
    }
}
