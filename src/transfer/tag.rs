//! Sentinel tags echoed through the remote shell.
//!
//! The command splits the tag with an empty quoted string, so only the
//! shell's output contains it contiguously, never the echoed command line.

use std::sync::atomic::{AtomicU64, Ordering};

const TAG_HEAD: &str = "SERCOM";

static NEXT_TAG: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    tail: String,
}

impl Tag {
    /// A tag unique within this process, and unlikely to clash across
    /// processes on the same link.
    pub fn next() -> Self {
        let n = NEXT_TAG.fetch_add(1, Ordering::Relaxed);
        Self {
            tail: format!("{:x}x{}", std::process::id(), n),
        }
    }

    /// Shell command that prints the tag.
    pub fn command(&self) -> String {
        format!("echo \"{}\"\"{}\"", TAG_HEAD, self.tail)
    }

    /// What the remote prints when it runs `command`.
    pub fn expected(&self) -> String {
        format!("{}{}", TAG_HEAD, self.tail)
    }

    pub fn found_in(&self, received: &[u8]) -> bool {
        self.end_in(received).is_some()
    }

    /// Offset just past the first occurrence of the tag.
    pub fn end_in(&self, received: &[u8]) -> Option<usize> {
        let expected = self.expected();
        received
            .windows(expected.len())
            .position(|w| w == expected.as_bytes())
            .map(|start| start + expected.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_unique() {
        assert_ne!(Tag::next(), Tag::next());
    }

    #[test]
    fn test_echoed_command_does_not_match() {
        let tag = Tag::next();
        let echoed = format!("{}\r\n", tag.command());
        assert!(!tag.found_in(echoed.as_bytes()));

        let output = format!("{}\r\n{}\r\n# ", echoed, tag.expected());
        assert!(tag.found_in(output.as_bytes()));
        let end = tag.end_in(output.as_bytes()).unwrap();
        assert_eq!(&output[end..], "\r\n# ");
    }
}
