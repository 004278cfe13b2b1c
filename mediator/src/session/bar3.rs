//! BAR3 (auxiliary window) command handling: shadow-table resolution
//! only, no poll-area fast path.

use crate::error::Error;
use crate::hw::pramin::Pramin;
use crate::memory::GuestVirtAddr;
use crate::session::context::Context;
use crate::session::Command;

impl Context {
    pub(crate) fn write_bar3(&mut self, cmd: Command) -> Result<Command, Error> {
        let device = self.device.clone();
        let guest = match self.guest.as_mut() {
            Some(guest) => guest,
            None => return Ok(cmd),
        };
        match guest
            .bar3_channel
            .table()
            .resolve(GuestVirtAddr::new(cmd.offset as u64))
        {
            Some(host) => {
                if let Ok(gphys) = guest.aspace.to_guest(host) {
                    if guest.barrier.lookup(gphys).is_some() {
                        guest.read_barrier(gphys);
                    }
                }
                let mut pramin = Pramin::new(device.hw());
                pramin.write32(host, cmd.value);
            }
            None => {
                log::warn!("guest BAR3 invalid write {:#x} access", cmd.offset);
            }
        }
        Ok(cmd)
    }

    pub(crate) fn read_bar3(&mut self, mut cmd: Command) -> Result<Command, Error> {
        let device = self.device.clone();
        let guest = match self.guest.as_mut() {
            Some(guest) => guest,
            None => return Ok(cmd),
        };
        match guest
            .bar3_channel
            .table()
            .resolve(GuestVirtAddr::new(cmd.offset as u64))
        {
            Some(host) => {
                if let Ok(gphys) = guest.aspace.to_guest(host) {
                    if guest.barrier.lookup(gphys).is_some() {
                        guest.read_barrier(gphys);
                    }
                }
                let mut pramin = Pramin::new(device.hw());
                cmd.value = pramin.read32(host);
            }
            None => {
                log::warn!("guest BAR3 invalid read {:#x} access", cmd.offset);
                cmd.value = 0xFFFF_FFFF;
            }
        }
        Ok(cmd)
    }
}
