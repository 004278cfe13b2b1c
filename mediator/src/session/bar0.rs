//! BAR0 (register space) command handling.
//!
//! Most register traffic is shadowed rather than forwarded: the mediator
//! records the guest's value and, where the hardware must see something,
//! writes the re-homed equivalent.

use crate::config::{phys_channel_id, CHANNELS_PER_VGPU};
use crate::error::Error;
use crate::hw::registers::Registers;
use crate::hw::regs;
use crate::memory::{GuestPhysAddr, GuestVirtAddr, HostPhysAddr};
use crate::session::context::Context;
use crate::session::Command;

/// RAMIN pointer registers carry the block address shifted right by 12
/// in their low 30 bits.
fn ramin_addr(value: u32) -> GuestPhysAddr {
    GuestPhysAddr::new(((value as u64) & 0x3FFF_FFFF) << 12)
}

/// Rebuild a channel register value around the shadow RAMIN address.
fn rehome_channel_value(value: u32, shadow: HostPhysAddr) -> u32 {
    (value & !0x3FFF_FFFF) | ((shadow.as_u64() >> 12) as u32 & 0x3FFF_FFFF)
}

impl Context {
    pub(crate) fn write_bar0(&mut self, cmd: Command) -> Result<Command, Error> {
        let device = self.device.clone();
        let guest = match self.guest.as_mut() {
            Some(guest) => guest,
            None => return Ok(cmd),
        };
        match cmd.offset {
            regs::PRAMIN_WINDOW => {
                // Pure passthrough; the guest drives the window itself.
                let mut registers = Registers::new(device.hw());
                registers.write32(regs::PRAMIN_WINDOW, cmd.value);
                guest.reg_pramin = cmd.value;
            }
            regs::BAR1_CHANNEL => {
                let shadow = guest.bar1_channel.refresh(
                    &guest.aspace,
                    &mut guest.barrier,
                    device.hw(),
                    ramin_addr(cmd.value),
                )?;
                device.bar1().shadow(
                    device.hw(),
                    guest.vid,
                    guest.poll_area,
                    guest.bar1_channel.table(),
                );
                device.bar1().flush(device.hw());
                let mut registers = Registers::new(device.hw());
                registers.write32(regs::BAR1_CHANNEL, rehome_channel_value(cmd.value, shadow));
            }
            regs::BAR3_CHANNEL => {
                let shadow = guest.bar3_channel.refresh(
                    &guest.aspace,
                    &mut guest.barrier,
                    device.hw(),
                    ramin_addr(cmd.value),
                )?;
                let mut registers = Registers::new(device.hw());
                registers.write32(regs::BAR3_CHANNEL, rehome_channel_value(cmd.value, shadow));
            }
            regs::POLL_AREA => {
                guest.reg_poll = cmd.value;
                guest.poll_area = GuestVirtAddr::new(((cmd.value & 0x0FFF_FFFF) as u64) << 12);
                log::info!("guest {} poll area at {}", guest.vid, guest.poll_area);
                let mut registers = Registers::new(device.hw());
                registers.write32(regs::POLL_AREA, cmd.value);
            }
            regs::PLAYLIST_BASE => {
                guest.reg_playlist = cmd.value;
            }
            regs::PLAYLIST_SUBMIT => {
                guest.reg_playlist_update = cmd.value;
                let base = GuestPhysAddr::new(((guest.reg_playlist & 0x0FFF_FFFF) as u64) << 12);
                let count = cmd.value & 0x3FF;
                let host =
                    guest
                        .playlist
                        .update(&guest.aspace, guest.vid, device.hw(), base, count)?;
                let mut registers = Registers::new(device.hw());
                registers.write32(regs::PLAYLIST_BASE, (host.as_u64() >> 12) as u32);
                registers.write32(regs::PLAYLIST_SUBMIT, cmd.value);
            }
            regs::CHANNEL_KILL => {
                if cmd.value >= CHANNELS_PER_VGPU {
                    log::warn!("channel kill for {} out of range", cmd.value);
                } else {
                    guest.reg_channel_kill = cmd.value;
                    let mut registers = Registers::new(device.hw());
                    registers.write32(
                        regs::CHANNEL_KILL,
                        phys_channel_id(guest.vid, cmd.value),
                    );
                }
            }
            offset => {
                log::debug!("BAR0 write {:#x} ignored", offset);
            }
        }
        Ok(cmd)
    }

    pub(crate) fn read_bar0(&mut self, mut cmd: Command) -> Result<Command, Error> {
        let guest = match self.guest.as_ref() {
            Some(guest) => guest,
            None => return Ok(cmd),
        };
        match cmd.offset {
            regs::PRAMIN_WINDOW => cmd.value = guest.reg_pramin,
            regs::POLL_AREA => cmd.value = guest.reg_poll,
            regs::PLAYLIST_BASE => cmd.value = guest.reg_playlist,
            regs::PLAYLIST_SUBMIT => cmd.value = guest.reg_playlist_update,
            regs::CHANNEL_KILL => cmd.value = guest.reg_channel_kill,
            offset => {
                log::debug!("BAR0 read {:#x} unhandled", offset);
            }
        }
        Ok(cmd)
    }
}
