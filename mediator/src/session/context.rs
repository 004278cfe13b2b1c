//! Per-guest session state machine.
//!
//! A session starts unaccepted, acquires its virtual GPU id on INIT, and
//! then serves BAR read/write commands until the transport drops. Errors
//! that have a defined wire representation (unmapped reads, protocol
//! noise) are answered in-band; everything else tears the session down.

use std::sync::Arc;

use crate::config::VM_VRAM_SIZE;
use crate::device::Device;
use crate::error::Error;
use crate::memory::{GuestAspace, GuestVirtAddr};
use crate::session::Command;
use crate::shadow::channel::{BAR1_CHANNEL_ID, BAR3_CHANNEL_ID};
use crate::shadow::{Channel, Playlist, RemapTable};

/// State carried once a session has initialized.
pub(crate) struct Guest {
    pub(crate) domid: i32,
    pub(crate) vid: u32,
    pub(crate) aspace: GuestAspace,
    pub(crate) barrier: RemapTable,
    pub(crate) bar1_channel: Channel,
    pub(crate) bar3_channel: Channel,
    pub(crate) playlist: Playlist,
    pub(crate) poll_area: GuestVirtAddr,
    // Shadowed guest register values.
    pub(crate) reg_pramin: u32,
    pub(crate) reg_poll: u32,
    pub(crate) reg_channel_kill: u32,
    pub(crate) reg_playlist: u32,
    pub(crate) reg_playlist_update: u32,
}

impl Guest {
    fn new(device: &Arc<Device>, domid: i32, vid: u32) -> Result<Guest, Error> {
        Ok(Guest {
            domid,
            vid,
            aspace: GuestAspace::new(vid),
            barrier: RemapTable::new(VM_VRAM_SIZE),
            bar1_channel: Channel::new(BAR1_CHANNEL_ID, device.vram(), device.hw())?,
            bar3_channel: Channel::new(BAR3_CHANNEL_ID, device.vram(), device.hw())?,
            playlist: Playlist::new(device.vram(), device.hw())?,
            poll_area: GuestVirtAddr::new(0),
            reg_pramin: 0,
            reg_poll: 0,
            reg_channel_kill: 0,
            reg_playlist: 0,
            reg_playlist_update: 0,
        })
    }
}

/// One guest's command session.
pub struct Context {
    pub(crate) device: Arc<Device>,
    pub(crate) guest: Option<Guest>,
}

impl Context {
    pub fn new(device: Arc<Device>) -> Context {
        Context { device, guest: None }
    }

    /// Virtual GPU id, once initialized.
    pub fn vid(&self) -> Option<u32> {
        self.guest.as_ref().map(|guest| guest.vid)
    }

    /// Domain id, once initialized.
    pub fn domid(&self) -> Option<i32> {
        self.guest.as_ref().map(|guest| guest.domid)
    }

    /// Handle one command and produce the record to echo back.
    ///
    /// An `Err` means the session cannot continue; the caller closes the
    /// transport and drops the context.
    pub fn handle(&mut self, cmd: Command) -> Result<Command, Error> {
        match cmd.op {
            Command::INIT => self.handle_init(cmd),
            Command::WRITE => self.dispatch_write(cmd),
            Command::READ => self.dispatch_read(cmd),
            op => {
                log::warn!("unknown command type {}", op);
                Ok(cmd)
            }
        }
    }

    fn handle_init(&mut self, cmd: Command) -> Result<Command, Error> {
        if self.guest.is_some() {
            log::warn!("INIT on an already-initialized session");
            return Ok(cmd);
        }
        let domid = cmd.value as i32;
        let vid = match self.device.acquire_virt() {
            Some(vid) => vid,
            None => {
                log::error!("no free virtual GPU for domain {}", domid);
                return Err(Error::Protocol);
            }
        };
        match Guest::new(&self.device, domid, vid) {
            Ok(guest) => {
                self.guest = Some(guest);
            }
            Err(e) => {
                self.device.release_virt(vid);
                return Err(e);
            }
        }
        if !self.device.try_acquire_gpu(domid) {
            log::warn!("GPU ownership not acquired for domain {}", domid);
        }
        log::info!("INIT domid {} GPU id {}", domid, vid);
        Ok(cmd)
    }

    fn dispatch_write(&mut self, cmd: Command) -> Result<Command, Error> {
        if self.guest.is_none() {
            log::warn!("write before INIT dropped");
            return Ok(cmd);
        }
        match cmd.payload {
            Command::BAR0 => self.write_bar0(cmd),
            Command::BAR1 => self.write_bar1(cmd),
            Command::BAR3 => self.write_bar3(cmd),
            bar => {
                log::warn!("write to unknown BAR {}", bar);
                Ok(cmd)
            }
        }
    }

    fn dispatch_read(&mut self, cmd: Command) -> Result<Command, Error> {
        if self.guest.is_none() {
            log::warn!("read before INIT dropped");
            return Ok(cmd);
        }
        match cmd.payload {
            Command::BAR0 => self.read_bar0(cmd),
            Command::BAR1 => self.read_bar1(cmd),
            Command::BAR3 => self.read_bar3(cmd),
            bar => {
                log::warn!("read from unknown BAR {}", bar);
                Ok(cmd)
            }
        }
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if let Some(guest) = self.guest.take() {
            self.device.release_virt(guest.vid);
            log::info!("session ended, released GPU id {}", guest.vid);
        }
    }
}
