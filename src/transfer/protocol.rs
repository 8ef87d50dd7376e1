//! Handshake and streaming state machine for one file push.

use std::io::{self, ErrorKind, Read, Write};
use std::thread;
use std::time::Instant;

use tracing::{debug, warn};

use super::{
    shell_quote, Stage, Tag, TransferConfig, TransferReport, END_OF_TRANSMISSION, LINE_END,
};
use crate::encoding::{StreamEncoder, TransferEncoding};
use crate::error::{Result, SercomError};
use crate::link::{self, Link};
use crate::poll;
use crate::progress::ProgressTracker;
use crate::signal::StopSignal;

/// How much of the received text a timeout report quotes.
const DIAGNOSTIC_TAIL: usize = 256;

/// One in-flight push. Holds the link exclusively until `run` returns.
pub struct Transfer<'a, W: Write = io::Stderr> {
    link: &'a mut dyn Link,
    config: &'a TransferConfig,
    stop: Option<&'a StopSignal>,
    dest: String,
    encoding: TransferEncoding,
    stage: Stage,
    progress: ProgressTracker<W>,
    bytes_sent: u64,
}

impl<'a, W: Write> Transfer<'a, W> {
    pub fn new(
        link: &'a mut dyn Link,
        dest: impl Into<String>,
        encoding: TransferEncoding,
        config: &'a TransferConfig,
        progress: ProgressTracker<W>,
    ) -> Self {
        Self {
            link,
            config,
            stop: None,
            dest: dest.into(),
            encoding,
            stage: Stage::Probe,
            progress,
            bytes_sent: 0,
        }
    }

    /// Abort streaming when `stop` fires. The request is consumed, so it
    /// does not also end the session.
    pub fn with_stop(mut self, stop: &'a StopSignal) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn run<R: Read>(mut self, source: &mut R) -> Result<TransferReport> {
        let started = Instant::now();
        let dest = shell_quote(&self.dest);
        if let Some(stop) = self.stop {
            stop.clear();
        }

        self.stage = Stage::Probe;
        let tag = Tag::next();
        self.send_line(&tag.command())?;
        self.wait_for(&tag)?;

        self.stage = Stage::Writability;
        let tag = Tag::next();
        self.send_line(&format!("touch {} && {}", dest, tag.command()))?;
        self.wait_for(&tag)?;

        self.stage = Stage::EchoOff;
        let tag = Tag::next();
        self.send_line(&format!("stty -echo; {}", tag.command()))?;
        self.wait_for(&tag)?;

        self.stage = Stage::Launch;
        self.send_line(&format!("{} > {}", self.encoding.remote_decoder(), dest))?;
        thread::sleep(self.config.launch_delay);

        self.stage = Stage::Streaming;
        let mut encoder = StreamEncoder::from(self.encoding);
        let streamed = self.stream(source, &mut encoder);
        if let Err(e) = self.progress.done() {
            debug!("progress output failed: {}", e);
        }
        if let Err(e) = &streamed {
            warn!("Transfer to {} stopped: {}", self.dest, e);
        }

        // Runs even after a failed stream so the remote gets its echo back.
        self.stage = Stage::Termination;
        let terminated = self.terminate(encoder);

        let bytes_read = streamed?;
        let trailing = terminated?;
        debug!("transfer to {} confirmed by remote", self.dest);

        Ok(TransferReport {
            bytes_read,
            bytes_sent: self.bytes_sent,
            elapsed: started.elapsed(),
            trailing,
        })
    }

    fn stream<R: Read>(&mut self, source: &mut R, encoder: &mut StreamEncoder) -> Result<u64> {
        let mut buf = vec![0u8; self.config.chunk_size.max(1)];
        loop {
            if self.stop.map_or(false, |s| s.clear()) {
                return Err(SercomError::TransferInterrupted {
                    sent: self.progress.current(),
                    total: self.progress.total(),
                });
            }

            let n = match source.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            let encoded = encoder.encode(&buf[..n])?;
            self.send(&encoded)?;
            self.progress.step(n as u64)?;
        }
        Ok(self.progress.current())
    }

    /// Flush the encoder, end the decoder's input and turn echo back on.
    /// Returns the remote output that followed the final tag.
    fn terminate(&mut self, encoder: StreamEncoder) -> Result<Vec<u8>> {
        let tail = encoder.finish()?;
        self.send(&tail)?;
        link::send(self.link, &[END_OF_TRANSMISSION])?;

        let tag = Tag::next();
        self.send_line(&format!("stty echo; {}", tag.command()))?;
        self.wait_for(&tag)
    }

    fn send(&mut self, payload: &[u8]) -> Result<()> {
        link::send(self.link, payload)?;
        self.bytes_sent += payload.len() as u64;
        Ok(())
    }

    fn send_line(&mut self, command: &str) -> Result<()> {
        debug!("[{}] -> {}", self.stage, command);
        let mut line = Vec::with_capacity(command.len() + LINE_END.len());
        line.extend_from_slice(command.as_bytes());
        line.extend_from_slice(LINE_END);
        link::send(self.link, &line)?;
        Ok(())
    }

    /// Read the link until `tag` shows up or the timeout passes. Returns
    /// what arrived after the tag.
    fn wait_for(&mut self, tag: &Tag) -> Result<Vec<u8>> {
        let deadline = Instant::now() + self.config.tag_timeout;
        let fd = self.link.as_raw_fd();
        let mut received = Vec::new();
        let mut buf = [0u8; 1024];

        loop {
            if let Some(end) = tag.end_in(&received) {
                return Ok(received.split_off(end));
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(self.timeout(tag, &received));
            }

            match poll::wait_readable(fd, deadline - now) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
            match self.link.read(&mut buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        ErrorKind::UnexpectedEof,
                        format!("serial link closed during {}", self.stage),
                    )
                    .into())
                }
                Ok(n) => received.extend_from_slice(&buf[..n]),
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
                    ) => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn timeout(&self, tag: &Tag, received: &[u8]) -> SercomError {
        let text = String::from_utf8_lossy(received);
        let start = text
            .char_indices()
            .rev()
            .nth(DIAGNOSTIC_TAIL)
            .map_or(0, |(i, _)| i);
        SercomError::TagTimeout {
            stage: self.stage,
            expected: tag.expected(),
            received: format!("\"{}\"", text[start..].escape_debug()),
            timeout_ms: self.config.tag_timeout.as_millis() as u64,
        }
    }
}
