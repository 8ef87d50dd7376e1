//! Gzip compression feeding the line-wrapped base64 stage.

use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{self, Write};

use super::base64::Base64Stream;

pub struct GzipBase64Stream {
    gz: GzEncoder<Vec<u8>>,
    b64: Base64Stream,
}

impl GzipBase64Stream {
    pub fn new() -> Self {
        Self {
            gz: GzEncoder::new(Vec::new(), Compression::default()),
            b64: Base64Stream::new(),
        }
    }

    pub fn encode(&mut self, data: &[u8]) -> io::Result<Vec<u8>> {
        self.gz.write_all(data)?;
        let compressed = std::mem::take(self.gz.get_mut());
        Ok(self.b64.encode(&compressed))
    }

    /// Flush the compressor trailer, then drain the base64 stage.
    pub fn finish(self) -> io::Result<Vec<u8>> {
        let Self { gz, mut b64 } = self;
        let trailer = gz.finish()?;
        let mut out = b64.encode(&trailer);
        out.extend(b64.finish());
        Ok(out)
    }
}

impl Default for GzipBase64Stream {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::base64::engine::general_purpose::STANDARD;
    use ::base64::Engine;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn unpack(text: &[u8]) -> Vec<u8> {
        let joined: Vec<u8> = text.iter().copied().filter(|&c| c != b'\n').collect();
        let compressed = STANDARD.decode(joined).unwrap();
        let mut plain = Vec::new();
        GzDecoder::new(&compressed[..])
            .read_to_end(&mut plain)
            .unwrap();
        plain
    }

    #[test]
    fn test_gzip_roundtrip_across_chunks() {
        let data: Vec<u8> = b"console log line\n".repeat(500);
        let mut enc = GzipBase64Stream::new();
        let mut out = Vec::new();
        for chunk in data.chunks(1000) {
            out.extend(enc.encode(chunk).unwrap());
        }
        out.extend(enc.finish().unwrap());

        assert_eq!(unpack(&out), data);
        assert!(out.len() < data.len(), "repetitive input should shrink");
    }

    #[test]
    fn test_empty_input_still_emits_gzip_container() {
        let out = GzipBase64Stream::new().finish().unwrap();
        assert!(!out.is_empty());
        assert_eq!(out.last(), Some(&b'\n'));
        assert!(unpack(&out).is_empty());
    }
}
