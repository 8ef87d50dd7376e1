//! Cooperative stop requests.
//!
//! A signal handler sets the flag and pokes a socket pair, so a thread
//! blocked in `poll` on the readable end wakes up immediately.

use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct StopSignal {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    flag: AtomicBool,
    wake_rx: UnixStream,
    wake_tx: UnixStream,
}

impl StopSignal {
    pub fn new() -> io::Result<Self> {
        let (wake_rx, wake_tx) = UnixStream::pair()?;
        wake_rx.set_nonblocking(true)?;
        wake_tx.set_nonblocking(true)?;
        Ok(Self {
            inner: Arc::new(Inner {
                flag: AtomicBool::new(false),
                wake_rx,
                wake_tx,
            }),
        })
    }

    /// Install as the SIGINT/SIGTERM handler.
    pub fn install_handler(&self) -> Result<(), ctrlc::Error> {
        let signal = self.clone();
        ctrlc::set_handler(move || signal.trigger())
    }

    pub fn trigger(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        // A full buffer already means "wake up".
        let _ = (&self.inner.wake_tx).write(&[1]);
    }

    pub fn is_set(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Consume a pending request. Returns whether one was pending.
    pub fn clear(&self) -> bool {
        let mut buf = [0u8; 64];
        while let Ok(n) = (&self.inner.wake_rx).read(&mut buf) {
            if n == 0 {
                break;
            }
        }
        self.inner.flag.swap(false, Ordering::SeqCst)
    }

    /// Descriptor that polls readable while a request is pending.
    pub fn fd(&self) -> RawFd {
        self.inner.wake_rx.as_raw_fd()
    }
}
