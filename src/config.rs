//! Optional TOML configuration.
//!
//! ```toml
//! baud = 115200
//! snippet_dir = "~/.config/sercom/snippets"
//!
//! [transfer]
//! encoding = "gzip"
//! tag_timeout_ms = 2000
//! launch_delay_ms = 100
//! chunk_size = 1024
//! ```
//!
//! Every key is optional. Command-line flags win over the environment, which
//! wins over this file.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::encoding::TransferEncoding;
use crate::error::{Result, SercomError};
use crate::transfer::{TransferConfig, DEFAULT_CHUNK_SIZE};

pub const DEFAULT_BAUD: u32 = 9600;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub baud: Option<u32>,
    pub snippet_dir: Option<PathBuf>,
    pub transfer: TransferSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransferSettings {
    pub encoding: TransferEncoding,
    pub tag_timeout_ms: u64,
    pub launch_delay_ms: u64,
    pub chunk_size: usize,
}

impl Default for TransferSettings {
    fn default() -> Self {
        let defaults = TransferConfig::default();
        Self {
            encoding: TransferEncoding::default(),
            tag_timeout_ms: defaults.tag_timeout.as_millis() as u64,
            launch_delay_ms: defaults.launch_delay.as_millis() as u64,
            chunk_size: defaults.chunk_size,
        }
    }
}

impl TransferSettings {
    pub fn to_transfer_config(&self) -> TransferConfig {
        TransferConfig {
            tag_timeout: Duration::from_millis(self.tag_timeout_ms),
            launch_delay: Duration::from_millis(self.launch_delay_ms),
            chunk_size: if self.chunk_size == 0 {
                DEFAULT_CHUNK_SIZE
            } else {
                self.chunk_size
            },
        }
    }
}

impl Config {
    /// Load `path`. A missing file gives the defaults; a malformed one is an
    /// error.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("no config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(SercomError::file_open(path, e)),
        };
        Self::parse(&text).map_err(|e| match e {
            SercomError::Config(msg) => SercomError::Config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| SercomError::Config(e.to_string()))
    }

    pub fn baud(&self) -> u32 {
        self.baud.unwrap_or(DEFAULT_BAUD)
    }

    /// Configured snippet directory, or `<config dir>/sercom/snippets`.
    pub fn snippet_dir(&self) -> Option<PathBuf> {
        match &self.snippet_dir {
            Some(dir) => Some(expand_tilde(dir)),
            None => dirs::config_dir().map(|d| d.join("sercom").join("snippets")),
        }
    }
}

/// `<config dir>/sercom/config.toml`
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("sercom").join("config.toml"))
}

/// Expand a leading `~` to the home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();

    if path_str == "~" {
        dirs::home_dir().unwrap_or_else(|| path.to_path_buf())
    } else if let Some(rest) = path_str.strip_prefix("~/") {
        match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        }
    } else {
        path.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = Config::load(&tmp.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.baud(), DEFAULT_BAUD);
        assert_eq!(config.transfer.encoding, TransferEncoding::Base64);
    }

    #[test]
    fn test_parse_full_file() {
        let config = Config::parse(
            r#"
baud = 115200
snippet_dir = "/opt/snippets"

[transfer]
encoding = "gzip"
tag_timeout_ms = 5000
chunk_size = 4096
"#,
        )
        .unwrap();
        assert_eq!(config.baud(), 115200);
        assert_eq!(config.snippet_dir(), Some(PathBuf::from("/opt/snippets")));

        let transfer = config.transfer.to_transfer_config();
        assert_eq!(config.transfer.encoding, TransferEncoding::Gzip);
        assert_eq!(transfer.tag_timeout, Duration::from_secs(5));
        assert_eq!(transfer.launch_delay, Duration::from_millis(100));
        assert_eq!(transfer.chunk_size, 4096);
    }

    #[test]
    fn test_malformed_file_names_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "baud = \"fast\"\n").unwrap();
        let err = Config::load(&path).unwrap_err().to_string();
        assert!(err.contains("config.toml"), "{err}");
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(Config::parse("bauds = 9600").is_err());
        assert!(Config::parse("[transfer]\nencoding = \"plain\"").is_err());
    }

    #[test]
    fn test_zero_chunk_size_falls_back() {
        let settings = TransferSettings {
            chunk_size: 0,
            ..TransferSettings::default()
        };
        assert_eq!(settings.to_transfer_config().chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_expand_tilde() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand_tilde(Path::new("~")), home);
        assert_eq!(expand_tilde(Path::new("~/x/y")), home.join("x/y"));
        assert_eq!(expand_tilde(Path::new("/abs")), PathBuf::from("/abs"));
        assert_eq!(expand_tilde(Path::new("rel~")), PathBuf::from("rel~"));
    }
}
