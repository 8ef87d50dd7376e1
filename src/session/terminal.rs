//! Local terminal handling: raw mode and unbuffered stdin.

use std::io::{self, Read};
use std::os::unix::io::{AsRawFd, RawFd};

/// Switches the controlling terminal between raw and cooked input.
///
/// Calls come in matched pairs around byte-at-a-time keyboard reading, and
/// `restore_mode` must be safe to call when raw mode is not active.
pub trait TerminalControl: Send {
    fn enter_raw_mode(&mut self) -> io::Result<()>;
    fn restore_mode(&mut self) -> io::Result<()>;
}

/// Raw mode through crossterm. Restores the terminal when dropped, so
/// early returns and panics leave the shell usable.
#[derive(Debug, Default)]
pub struct CrosstermTerminal {
    raw: bool,
}

impl CrosstermTerminal {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TerminalControl for CrosstermTerminal {
    fn enter_raw_mode(&mut self) -> io::Result<()> {
        if !self.raw {
            crossterm::terminal::enable_raw_mode()?;
            self.raw = true;
        }
        Ok(())
    }

    fn restore_mode(&mut self) -> io::Result<()> {
        if self.raw {
            crossterm::terminal::disable_raw_mode()?;
            self.raw = false;
        }
        Ok(())
    }
}

impl Drop for CrosstermTerminal {
    fn drop(&mut self) {
        if let Err(e) = self.restore_mode() {
            eprintln!("failed to restore terminal mode: {}", e);
        }
    }
}

/// Used when stdin is not a terminal.
#[derive(Debug, Default)]
pub struct NoTerminal;

impl TerminalControl for NoTerminal {
    fn enter_raw_mode(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn restore_mode(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Stdin read straight from the descriptor.
///
/// `std::io::Stdin` buffers internally, which would hide pending bytes from
/// `poll`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawStdin;

impl Read for RawStdin {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // SAFETY: `buf` is valid for writes of `buf.len()` bytes.
        let n = unsafe {
            libc::read(
                libc::STDIN_FILENO,
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }
}

impl AsRawFd for RawStdin {
    fn as_raw_fd(&self) -> RawFd {
        libc::STDIN_FILENO
    }
}
