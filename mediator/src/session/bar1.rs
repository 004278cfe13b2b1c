//! BAR1 (framebuffer window) command handling.
//!
//! Accesses inside the guest's poll area go straight to the physical
//! BAR1; everything else resolves through the BAR1 channel's shadow page
//! table and lands in VRAM via PRAMIN.

use crate::config::{POLL_AREA_PAGES, SMALL_PAGE_SIZE};
use crate::error::Error;
use crate::hw::pramin::Pramin;
use crate::hw::Bar;
use crate::memory::GuestVirtAddr;
use crate::session::context::{Context, Guest};
use crate::session::Command;

fn in_poll_area(guest: &Guest, offset: u64) -> bool {
    let base = guest.poll_area.as_u64();
    offset >= base && offset < base + POLL_AREA_PAGES * SMALL_PAGE_SIZE
}

impl Context {
    pub(crate) fn write_bar1(&mut self, cmd: Command) -> Result<Command, Error> {
        let device = self.device.clone();
        let guest = match self.guest.as_mut() {
            Some(guest) => guest,
            None => return Ok(cmd),
        };
        let offset = cmd.offset as u64;

        if in_poll_area(guest, offset) {
            device.write(Bar::Bar1, offset - guest.poll_area.as_u64(), cmd.value);
            return Ok(cmd);
        }

        match guest.bar1_channel.table().resolve(GuestVirtAddr::new(offset)) {
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
                log::warn!("guest BAR1 invalid write {:#x} access", cmd.offset);
            }
        }
        Ok(cmd)
    }

    pub(crate) fn read_bar1(&mut self, mut cmd: Command) -> Result<Command, Error> {
        let device = self.device.clone();
        let guest = match self.guest.as_mut() {
            Some(guest) => guest,
            None => return Ok(cmd),
        };
        let offset = cmd.offset as u64;

        if in_poll_area(guest, offset) {
            cmd.value = device.read(Bar::Bar1, offset - guest.poll_area.as_u64());
            return Ok(cmd);
        }

        match guest.bar1_channel.table().resolve(GuestVirtAddr::new(offset)) {
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
                log::warn!("guest BAR1 invalid read {:#x} access", cmd.offset);
                cmd.value = 0xFFFF_FFFF;
            }
        }
        Ok(cmd)
    }
}
