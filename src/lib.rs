//! sercom: serial console terminal with file push to a remote shell.
//!
//! The session multiplexes the serial link, the local terminal, redirected
//! files and helper processes in one `poll` loop. On top of the raw link,
//! `transfer` pushes binary files to a remote shell as line-wrapped base64.

pub mod cli;
pub mod config;
pub mod encoding;
pub mod error;
pub mod link;
pub mod logging;
pub mod poll;
pub mod progress;
pub mod session;
pub mod shell;
pub mod signal;
pub mod transfer;

pub use error::{Result, SercomError};
