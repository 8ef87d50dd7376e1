//! Line-wrapped streaming base64.
//!
//! Input is consumed in 48-byte groups so every full output line is exactly
//! 64 characters. Whatever does not fill a group waits for the next call or
//! for `finish`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::BytesMut;

/// Raw bytes that encode to one output line.
pub const LINE_RAW_BYTES: usize = 48;

/// Base64 characters per output line.
pub const LINE_WIDTH: usize = 64;

/// Some consoles drop into a debug monitor when they see this on input.
const FORBIDDEN: [u8; 3] = *b"fiq";

/// Inserts line breaks into already-encoded text.
///
/// Breaks after every `LINE_WIDTH` characters, and between `fi` and `q`
/// so the forbidden sequence never reaches the remote. A break always
/// restarts the column count.
#[derive(Debug, Default)]
pub(crate) struct LineWrapper {
    col: usize,
    prev: [u8; 2],
}

impl LineWrapper {
    pub(crate) fn push(&mut self, text: &[u8], out: &mut Vec<u8>) {
        for &c in text {
            if c == FORBIDDEN[2] && self.prev == [FORBIDDEN[0], FORBIDDEN[1]] {
                self.newline(out);
            }
            out.push(c);
            self.col += 1;
            self.prev = [self.prev[1], c];
            if self.col == LINE_WIDTH {
                self.newline(out);
            }
        }
    }

    /// Terminate a partial line, if any.
    pub(crate) fn finish(&mut self, out: &mut Vec<u8>) {
        if self.col > 0 {
            self.newline(out);
        }
    }

    fn newline(&mut self, out: &mut Vec<u8>) {
        out.push(b'\n');
        self.col = 0;
        self.prev = [0; 2];
    }
}

/// Streaming base64 encoder producing newline-terminated lines.
#[derive(Debug, Default)]
pub struct Base64Stream {
    pending: BytesMut,
    wrapper: LineWrapper,
}

impl Base64Stream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of raw bytes held back waiting for a full group.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn encode(&mut self, data: &[u8]) -> Vec<u8> {
        self.pending.extend_from_slice(data);
        let whole = self.pending.len() - self.pending.len() % LINE_RAW_BYTES;
        if whole == 0 {
            return Vec::new();
        }

        let group = self.pending.split_to(whole);
        let text = STANDARD.encode(&group);
        let mut out = Vec::with_capacity(text.len() + text.len() / LINE_WIDTH + 1);
        self.wrapper.push(text.as_bytes(), &mut out);
        out
    }

    /// Encode the held-back remainder and terminate the last line.
    pub fn finish(mut self) -> Vec<u8> {
        let text = STANDARD.encode(&self.pending);
        let mut out = Vec::with_capacity(text.len() + 2);
        self.wrapper.push(text.as_bytes(), &mut out);
        self.wrapper.finish(&mut out);
        out
    }
}
