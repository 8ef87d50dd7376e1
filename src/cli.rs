use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::encoding::TransferEncoding;

#[derive(Debug, Parser)]
#[command(name = "sercom", version)]
#[command(about = "Serial console terminal with file push to a remote shell")]
pub struct Cli {
    /// Path to the serial port
    pub device: String,

    /// Baud rate (default: from config, else 9600)
    pub baud: Option<u32>,

    /// Send the content of PATH to the serial port
    #[arg(long, value_name = "PATH")]
    pub read: Vec<PathBuf>,

    /// Write anything received from the serial port to PATH
    #[arg(long, value_name = "PATH")]
    pub write: Vec<PathBuf>,

    /// Don't use stdin/stdout
    #[arg(long, overrides_with = "stdio")]
    pub no_stdio: bool,

    /// Revert --no-stdio
    #[arg(long, overrides_with = "no_stdio")]
    pub stdio: bool,

    /// Configuration file
    #[arg(long, env = "SERCOM_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Snippet directory
    #[arg(long, env = "SERCOM_SNIPPETS", value_name = "DIR")]
    pub snippets: Option<PathBuf>,

    /// Default encoding for `put`
    #[arg(long, value_enum, value_name = "ENCODING")]
    pub encoding: Option<TransferEncoding>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl Cli {
    pub fn use_stdio(&self) -> bool {
        !self.no_stdio
    }
}
