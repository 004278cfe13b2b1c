//! Hypervisor device-assignment boundary.
//!
//! Moving the physical GPU between domains is the toolstack's job; the
//! core only needs assign/deassign. The Xen binding lives outside the
//! core behind this trait.

use crate::error::Error;

/// Device assignment calls the mediator issues when GPU ownership moves.
pub trait Hypervisor: Send {
    fn assign_device(&mut self, domid: i32) -> Result<(), Error>;
    fn deassign_device(&mut self, domid: i32) -> Result<(), Error>;
}

/// Backend for development mode: every call succeeds.
pub struct NullHypervisor;

impl Hypervisor for NullHypervisor {
    fn assign_device(&mut self, domid: i32) -> Result<(), Error> {
        log::info!("assign device to domain {}", domid);
        Ok(())
    }

    fn deassign_device(&mut self, domid: i32) -> Result<(), Error> {
        log::info!("deassign device from domain {}", domid);
        Ok(())
    }
}
