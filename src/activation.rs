//! Listening sockets inherited from the process supervisor.
//!
//! Supervisors that pre-open listening sockets pass them with the
//! fd-passing convention: `LISTEN_PID` names the intended recipient,
//! `LISTEN_FDS` the number of descriptors, starting at fd 3. When any
//! are present, configured listen specs are not bound for that run.

use std::io;
use std::net::TcpListener;
use std::os::unix::io::FromRawFd;

use socket2::{SockRef, Type};
use tracing::{info, warn};

/// First inherited descriptor per the fd-passing convention.
const LISTEN_FDS_START: i32 = 3;

/// Adopt listeners handed down by the supervisor, if any.
///
/// Returns an empty vec when the environment carries no descriptors or
/// they were addressed to another process. The environment variables
/// are cleared after inspection so child processes do not inherit
/// stale values.
pub fn inherited_listeners() -> io::Result<Vec<TcpListener>> {
    let pid = std::env::var("LISTEN_PID");
    let fds = std::env::var("LISTEN_FDS");

    // The descriptors are only meaningful for the process they were
    // addressed to; clear the variables regardless of the outcome.
    std::env::remove_var("LISTEN_PID");
    std::env::remove_var("LISTEN_FDS");
    std::env::remove_var("LISTEN_FDNAMES");

    let (pid, fds) = match (pid, fds) {
        (Ok(pid), Ok(fds)) => (pid, fds),
        _ => return Ok(Vec::new()),
    };

    if pid.parse::<u32>().ok() != Some(std::process::id()) {
        warn!(listen_pid = %pid, "Ignoring inherited sockets addressed to another process");
        return Ok(Vec::new());
    }

    let count: i32 = fds.parse().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("LISTEN_FDS is not a number: {fds}"),
        )
    })?;

    let mut listeners = Vec::with_capacity(count.max(0) as usize);
    for fd in LISTEN_FDS_START..LISTEN_FDS_START + count {
        // Safety: the supervisor transferred ownership of this fd to
        // this process; nothing else closes it.
        let listener = unsafe { TcpListener::from_raw_fd(fd) };

        let sock = SockRef::from(&listener);
        if sock.r#type()? != Type::STREAM {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("inherited fd {fd} is not a stream socket"),
            ));
        }
        listener.set_nonblocking(true)?;
        listeners.push(listener);
    }

    if !listeners.is_empty() {
        info!(count = listeners.len(), "Adopted inherited listeners");
    }

    Ok(listeners)
}
