//! File push to a remote interactive shell over the serial link.
//!
//! The remote only offers a text console, so the file travels as
//! line-wrapped base64 (optionally gzipped) into `base64 -d` running on the
//! far side. Each handshake step is confirmed by a sentinel tag echoed back
//! by the shell.
//!
//! ```text
//! probe -> writability check -> echo off -> receiver launch
//!       -> streaming -> termination (EOT, echo on, final tag)
//! ```

pub mod protocol;
pub mod tag;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub use protocol::Transfer;
pub use tag::Tag;

use crate::error::{Result, SercomError};

/// Bytes read from the file per streaming step.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

pub const DEFAULT_TAG_TIMEOUT: Duration = Duration::from_secs(2);

pub const DEFAULT_LAUNCH_DELAY: Duration = Duration::from_millis(100);

/// Ends the remote decoder's input.
pub const END_OF_TRANSMISSION: u8 = 0x04;

/// Terminates every command sent to the remote shell.
pub const LINE_END: &[u8] = b"\r";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Probe,
    Writability,
    EchoOff,
    Launch,
    Streaming,
    Termination,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Probe => "probe",
            Stage::Writability => "writability check",
            Stage::EchoOff => "echo suppression",
            Stage::Launch => "receiver launch",
            Stage::Streaming => "streaming",
            Stage::Termination => "termination",
        })
    }
}

#[derive(Debug, Clone)]
pub struct TransferConfig {
    pub tag_timeout: Duration,
    pub launch_delay: Duration,
    pub chunk_size: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            tag_timeout: DEFAULT_TAG_TIMEOUT,
            launch_delay: DEFAULT_LAUNCH_DELAY,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    /// Raw file bytes read.
    pub bytes_read: u64,
    /// Encoded payload bytes written to the link.
    pub bytes_sent: u64,
    pub elapsed: Duration,
    /// Link output after the final confirmation, usually the shell prompt.
    pub trailing: Vec<u8>,
}

/// Session-wide "one transfer at a time" lock.
#[derive(Debug, Clone, Default)]
pub struct TransferLock {
    active: Arc<AtomicBool>,
}

impl TransferLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Result<TransferGuard> {
        self.active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| SercomError::TransferInProgress)?;
        Ok(TransferGuard {
            active: Arc::clone(&self.active),
        })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct TransferGuard {
    active: Arc<AtomicBool>,
}

impl Drop for TransferGuard {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

/// Quote `s` as a single POSIX shell word.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
