//! Thin wrapper over `poll(2)` for readiness on raw descriptors.

use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

const READ_EVENTS: libc::c_short = libc::POLLIN | libc::POLLPRI;

/// Hang-ups and errors count as readable so the next `read` reports them.
const READY_MASK: libc::c_short = READ_EVENTS | libc::POLLHUP | libc::POLLERR | libc::POLLNVAL;

/// Block until at least one descriptor is readable or `timeout` expires.
///
/// Returns one flag per descriptor, in order. `None` waits forever.
/// A signal arriving during the wait surfaces as `ErrorKind::Interrupted`.
pub fn readable(fds: &[RawFd], timeout: Option<Duration>) -> io::Result<Vec<bool>> {
    let mut pollfds: Vec<libc::pollfd> = fds
        .iter()
        .map(|&fd| libc::pollfd {
            fd,
            events: READ_EVENTS,
            revents: 0,
        })
        .collect();

    let timeout_ms = match timeout {
        Some(t) => t.as_millis().min(libc::c_int::MAX as u128) as libc::c_int,
        None => -1,
    };

    // SAFETY: `pollfds` is a live, correctly sized array for the whole call.
    let rc = unsafe {
        libc::poll(
            pollfds.as_mut_ptr(),
            pollfds.len() as libc::nfds_t,
            timeout_ms,
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(pollfds
        .iter()
        .map(|p| p.revents & READY_MASK != 0)
        .collect())
}

/// Wait for a single descriptor. `Ok(false)` means the timeout expired.
pub fn wait_readable(fd: RawFd, timeout: Duration) -> io::Result<bool> {
    Ok(readable(&[fd], Some(timeout))?[0])
}

/// Switch `fd` to non-blocking mode. Writes that would block then fail
/// with `ErrorKind::WouldBlock`.
pub fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    // SAFETY: F_GETFL takes no argument and only reads the descriptor flags.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: F_SETFL with an int flag set; an invalid fd is reported as EBADF.
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::io::AsRawFd;
    use std::os::unix::net::UnixStream;

    #[test]
    fn test_timeout_reports_not_ready() {
        let (a, _b) = UnixStream::pair().unwrap();
        assert!(!wait_readable(a.as_raw_fd(), Duration::from_millis(10)).unwrap());
    }

    #[test]
    fn test_pending_data_is_ready() {
        let (a, mut b) = UnixStream::pair().unwrap();
        let (c, _d) = UnixStream::pair().unwrap();
        b.write_all(b"x").unwrap();

        let ready = readable(&[c.as_raw_fd(), a.as_raw_fd()], None).unwrap();
        assert_eq!(ready, vec![false, true]);
    }

    #[test]
    fn test_nonblocking_write_to_full_socket_would_block() {
        let (mut a, _b) = UnixStream::pair().unwrap();
        set_nonblocking(a.as_raw_fd()).unwrap();
        let chunk = [0u8; 4096];
        let err = loop {
            if let Err(e) = a.write(&chunk) {
                break e;
            }
        };
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_hangup_is_ready() {
        let (a, b) = UnixStream::pair().unwrap();
        drop(b);
        assert!(wait_readable(a.as_raw_fd(), Duration::from_millis(10)).unwrap());
    }
}
