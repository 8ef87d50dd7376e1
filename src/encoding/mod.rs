//! Stateful byte-to-text encoders.
//!
//! Every encoder is fed with `encode` any number of times and consumed by
//! `finish`, which drains whatever it still holds. Taking `self` by value in
//! `finish` makes a second flush, or an `encode` after it, a compile error.

pub mod base64;
pub mod gzip;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::str::FromStr;

pub use self::base64::{Base64Stream, LINE_RAW_BYTES, LINE_WIDTH};
pub use self::gzip::GzipBase64Stream;

/// Encoder selection for a read source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EncodingKind {
    #[default]
    Plain,
    Base64,
    Gzip,
}

impl EncodingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncodingKind::Plain => "plain",
            EncodingKind::Base64 => "base64",
            EncodingKind::Gzip => "gzip",
        }
    }
}

impl fmt::Display for EncodingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EncodingKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plain" | "raw" => Ok(EncodingKind::Plain),
            "base64" | "b64" => Ok(EncodingKind::Base64),
            "gzip" | "gz" => Ok(EncodingKind::Gzip),
            other => Err(format!("unknown encoding '{}'", other)),
        }
    }
}

/// Encoder selection for a file transfer. Plain passthrough is not offered:
/// the remote side always decodes base64. Plain base64 is the default since
/// it only needs `base64` on the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransferEncoding {
    #[default]
    Base64,
    Gzip,
}

impl TransferEncoding {
    /// Shell pipeline on the remote end that undoes this encoding.
    pub fn remote_decoder(&self) -> &'static str {
        match self {
            TransferEncoding::Base64 => "base64 -d",
            TransferEncoding::Gzip => "base64 -d | gunzip",
        }
    }
}

impl From<TransferEncoding> for EncodingKind {
    fn from(kind: TransferEncoding) -> Self {
        match kind {
            TransferEncoding::Base64 => EncodingKind::Base64,
            TransferEncoding::Gzip => EncodingKind::Gzip,
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        EncodingKind::from(*self).fmt(f)
    }
}

impl FromStr for TransferEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<EncodingKind>()? {
            EncodingKind::Base64 => Ok(TransferEncoding::Base64),
            EncodingKind::Gzip => Ok(TransferEncoding::Gzip),
            EncodingKind::Plain => Err("transfers need base64 or gzip".to_string()),
        }
    }
}

pub enum StreamEncoder {
    Plain,
    Base64(Base64Stream),
    Gzip(GzipBase64Stream),
}

impl StreamEncoder {
    pub fn new(kind: EncodingKind) -> Self {
        match kind {
            EncodingKind::Plain => StreamEncoder::Plain,
            EncodingKind::Base64 => StreamEncoder::Base64(Base64Stream::new()),
            EncodingKind::Gzip => StreamEncoder::Gzip(GzipBase64Stream::new()),
        }
    }

    pub fn kind(&self) -> EncodingKind {
        match self {
            StreamEncoder::Plain => EncodingKind::Plain,
            StreamEncoder::Base64(_) => EncodingKind::Base64,
            StreamEncoder::Gzip(_) => EncodingKind::Gzip,
        }
    }

    pub fn encode(&mut self, data: &[u8]) -> io::Result<Vec<u8>> {
        match self {
            StreamEncoder::Plain => Ok(data.to_vec()),
            StreamEncoder::Base64(enc) => Ok(enc.encode(data)),
            StreamEncoder::Gzip(enc) => enc.encode(data),
        }
    }

    pub fn finish(self) -> io::Result<Vec<u8>> {
        match self {
            StreamEncoder::Plain => Ok(Vec::new()),
            StreamEncoder::Base64(enc) => Ok(enc.finish()),
            StreamEncoder::Gzip(enc) => enc.finish(),
        }
    }
}

impl From<TransferEncoding> for StreamEncoder {
    fn from(kind: TransferEncoding) -> Self {
        StreamEncoder::new(kind.into())
    }
}

impl fmt::Debug for StreamEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StreamEncoder").field(&self.kind()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_is_identity() {
        let mut enc = StreamEncoder::new(EncodingKind::Plain);
        assert_eq!(enc.encode(b"abc\x01").unwrap(), b"abc\x01");
        assert!(enc.finish().unwrap().is_empty());
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("gz".parse::<EncodingKind>(), Ok(EncodingKind::Gzip));
        assert_eq!("BASE64".parse::<EncodingKind>(), Ok(EncodingKind::Base64));
        assert!("zstd".parse::<EncodingKind>().is_err());
        assert!("plain".parse::<TransferEncoding>().is_err());
        assert_eq!("b64".parse::<TransferEncoding>(), Ok(TransferEncoding::Base64));
    }

    #[test]
    fn test_remote_decoder() {
        assert_eq!(TransferEncoding::Base64.remote_decoder(), "base64 -d");
        assert!(TransferEncoding::Gzip.remote_decoder().ends_with("gunzip"));
    }

    #[test]
    fn test_encoder_reports_kind() {
        let enc = StreamEncoder::from(TransferEncoding::Gzip);
        assert_eq!(enc.kind(), EncodingKind::Gzip);
        assert_eq!(format!("{:?}", enc), "StreamEncoder(Gzip)");
    }
}
