//! Poke client for a running `mediatord`: initializes a session and
//! issues a few register reads so the daemon's plumbing can be checked
//! end to end.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;

use mediator::config;
use mediator::session::{Command, COMMAND_SIZE};

fn transact(stream: &mut UnixStream, cmd: Command) -> std::io::Result<Command> {
    stream.write_all(&cmd.to_bytes())?;
    let mut buffer = [0u8; COMMAND_SIZE];
    stream.read_exact(&mut buffer)?;
    Ok(Command::from_bytes(&buffer))
}

fn main() -> std::io::Result<()> {
    let mut stream = UnixStream::connect(config::ENDPOINT)?;

    let init = transact(
        &mut stream,
        Command {
            op: Command::INIT,
            value: 1,
            offset: 0,
            payload: 0,
        },
    )?;
    println!("INIT reply: {:?}", init);

    for offset in [0x1700u32, 0x2254, 0x2270] {
        let reply = transact(
            &mut stream,
            Command {
                op: Command::READ,
                value: 0,
                offset,
                payload: Command::BAR0,
            },
        )?;
        println!("BAR0[{:#x}] = {:#010x}", offset, reply.value);
    }
    Ok(())
}
