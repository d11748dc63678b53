//! Non-destructive capture of a connection's first bytes.
//!
//! The head of the stream is read with `recvmsg(MSG_PEEK)` so the same
//! bytes stay queued in the kernel receive buffer: a later consuming
//! read returns them unchanged, and the relay forwards the stream from
//! its true beginning. Up to [`CONTROL_CAPACITY`] bytes of ancillary
//! control data are drained alongside and discarded after capture.

use std::io;
use std::mem;
use std::os::unix::io::AsRawFd;

use tokio::io::Interest;
use tokio::net::TcpStream;

/// Capacity of the peek buffer.
pub const PEEK_CAPACITY: usize = 4096;

/// Capacity of the ancillary (control) buffer.
pub const CONTROL_CAPACITY: usize = 512;

/// The unconsumed head of a freshly accepted stream.
#[derive(Debug)]
pub struct PeekedSegment {
    buf: Vec<u8>,
    len: usize,
    ancillary_len: usize,
}

impl PeekedSegment {
    /// The valid peeked bytes. Never longer than [`PEEK_CAPACITY`].
    pub fn bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Number of valid bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the peer had sent nothing when the socket became
    /// readable (immediate EOF).
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Ancillary control bytes drained during the peek. Informational
    /// only; the data itself is discarded.
    pub fn ancillary_len(&self) -> usize {
        self.ancillary_len
    }
}

/// Peek the head of `stream` without consuming it.
///
/// Waits until the socket is readable, then captures up to
/// [`PEEK_CAPACITY`] bytes currently resident in the receive buffer.
/// The stream's read position is unchanged. Fewer bytes than the
/// capacity is normal; a zero-length segment means the peer closed
/// without sending.
pub async fn peek_initial(stream: &TcpStream) -> io::Result<PeekedSegment> {
    let mut buf = vec![0u8; PEEK_CAPACITY];
    let mut control = [0u8; CONTROL_CAPACITY];

    let (len, ancillary_len) = stream
        .async_io(Interest::READABLE, || {
            // Scoped borrow of the fd for this one call; the stream
            // keeps ownership and nothing is duplicated or leaked.
            recvmsg_peek(stream.as_raw_fd(), &mut buf, &mut control)
        })
        .await?;

    Ok(PeekedSegment {
        buf,
        len,
        ancillary_len,
    })
}

/// One `recvmsg(MSG_PEEK)` call, leaving the read queue untouched.
///
/// Returns the data length and the ancillary (control) length. A
/// `WouldBlock` error is surfaced so the readiness loop retries.
fn recvmsg_peek(
    fd: std::os::unix::io::RawFd,
    buf: &mut [u8],
    control: &mut [u8],
) -> io::Result<(usize, usize)> {
    let mut iov = libc::iovec {
        iov_base: buf.as_mut_ptr().cast(),
        iov_len: buf.len(),
    };

    let mut msg: libc::msghdr = unsafe { mem::zeroed() };
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = control.as_mut_ptr().cast();
    msg.msg_controllen = control.len() as _;

    // Safety: msg points at iov and control, both valid for the call.
    let n = unsafe { libc::recvmsg(fd, &mut msg, libc::MSG_PEEK) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok((n as usize, msg.msg_controllen as usize))
}
