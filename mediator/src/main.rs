//! `mediatord`: the GPU mediation daemon.
//!
//! Owns the transport shim around the core: a Unix-socket listener that
//! feeds 16-byte command records into a per-connection [`Context`] and
//! echoes the replies. One thread per session; the core's own locks
//! serialize the hardware.

use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::Arc;
use std::thread;

use log::LevelFilter;

use mediator::config;
use mediator::device::Device;
use mediator::hw::sim::SimGpu;
use mediator::hypervisor::NullHypervisor;
use mediator::logger;
use mediator::session::{Command, Context, COMMAND_SIZE};

fn main() {
    logger::init(LevelFilter::Info);
    if let Err(e) = run() {
        log::error!("mediator failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    // Development mode runs against the software device model. A
    // production build hands `Device::new` the BAR mappings produced by
    // the PCI bootstrap (`hw::mmio::MappedBars`) and the toolstack's
    // assignment backend instead.
    let device = Device::new(Box::new(SimGpu::new()), Box::new(NullHypervisor))?;

    let _ = std::fs::remove_file(config::ENDPOINT);
    let listener = UnixListener::bind(config::ENDPOINT)?;
    log::info!("listening on {}", config::ENDPOINT);

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let device = Arc::clone(&device);
                thread::spawn(move || serve(device, stream));
            }
            Err(e) => log::warn!("accept failed: {}", e),
        }
    }
    Ok(())
}

fn serve(device: Arc<Device>, mut stream: UnixStream) {
    log::info!("session started");
    let mut context = Context::new(device);
    let mut buffer = [0u8; COMMAND_SIZE];
    loop {
        if stream.read_exact(&mut buffer).is_err() {
            log::info!("session transport closed");
            return;
        }
        match context.handle(Command::from_bytes(&buffer)) {
            Ok(reply) => {
                if let Err(e) = stream.write_all(&reply.to_bytes()) {
                    log::warn!("session reply failed: {}", e);
                    return;
                }
            }
            Err(e) => {
                log::error!("session failed: {}", e);
                return;
            }
        }
    }
}
