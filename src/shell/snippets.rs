//! User snippets: files in the snippet directory, invoked by name from the
//! command shell.
//!
//! A plain file is typed to the remote as-is. An executable file is run
//! locally as a helper process talking to the remote over the link; it finds
//! its own path in `SERCOM_SNIPPET`.

use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, SercomError};

pub const SNIPPET_ENV: &str = "SERCOM_SNIPPET";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snippet {
    pub name: String,
    pub path: PathBuf,
}

impl Snippet {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    pub fn is_executable(&self) -> bool {
        fs::metadata(&self.path)
            .map(|m| m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
}

/// Snippets in `dir`, sorted by name. The name is the file stem; hidden
/// files and subdirectories are skipped. A missing directory has none.
pub fn discover(dir: &Path) -> Result<Vec<Snippet>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("no snippet directory at {}", dir.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(SercomError::file_open(dir, e)),
    };

    let mut snippets = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type()?.is_file() && !path.is_file() {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if name.is_empty() || name.starts_with('.') {
            continue;
        }
        snippets.push(Snippet::new(name, &path));
    }
    snippets.sort_by(|a, b| a.name.cmp(&b.name));
    snippets.dedup_by(|a, b| a.name == b.name);
    Ok(snippets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_dir_has_no_snippets() {
        let tmp = TempDir::new().unwrap();
        assert!(discover(&tmp.path().join("nope")).unwrap().is_empty());
    }

    #[test]
    fn test_discover_uses_file_stem() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("login.txt"), "root\r").unwrap();
        fs::write(tmp.path().join("reset"), "reboot\r").unwrap();
        fs::write(tmp.path().join(".hidden"), "").unwrap();
        fs::create_dir(tmp.path().join("subdir")).unwrap();

        let found = discover(tmp.path()).unwrap();
        let names: Vec<_> = found.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["login", "reset"]);
        assert_eq!(found[0].path, tmp.path().join("login.txt"));
    }

    #[test]
    fn test_executable_bit() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("flash.sh");
        fs::write(&path, "#!/bin/sh\n").unwrap();
        let snippet = Snippet::new("flash", &path);
        assert!(!snippet.is_executable());

        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        assert!(snippet.is_executable());
    }
}
