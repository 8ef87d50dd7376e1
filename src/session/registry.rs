//! Active sources and sinks of a session.
//!
//! Sources are readable endpoints whose bytes go to the link; sinks receive
//! everything read from the link. Both keep registration order.

use std::fmt;
use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::process::Child;

use crate::encoding::StreamEncoder;
use crate::poll;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SinkId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Keyboard,
    File,
    Process,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Stdout,
    File,
    Process,
}

/// Byte provider the multiplexer can poll.
pub trait SourceReader: Read + AsRawFd + Send {}

impl<T: Read + AsRawFd + Send> SourceReader for T {}

pub struct Source {
    pub(crate) id: SourceId,
    pub(crate) name: String,
    pub(crate) kind: SourceKind,
    pub(crate) reader: Box<dyn SourceReader>,
    pub(crate) encoder: Option<StreamEncoder>,
    /// Helper process behind this source, reaped when the source closes.
    pub(crate) child: Option<Child>,
    /// Sink that goes away together with this source.
    pub(crate) paired_sink: Option<SinkId>,
}

impl Source {
    pub fn new(name: impl Into<String>, kind: SourceKind, reader: Box<dyn SourceReader>) -> Self {
        Self {
            id: SourceId(0),
            name: name.into(),
            kind,
            reader,
            encoder: None,
            child: None,
            paired_sink: None,
        }
    }

    pub fn with_encoder(mut self, encoder: StreamEncoder) -> Self {
        self.encoder = Some(encoder);
        self
    }

    pub fn with_child(mut self, child: Child, paired_sink: Option<SinkId>) -> Self {
        self.child = Some(child);
        self.paired_sink = paired_sink;
        self
    }

    pub fn id(&self) -> SourceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("encoder", &self.encoder)
            .finish()
    }
}

pub struct Sink {
    pub(crate) id: SinkId,
    pub(crate) name: String,
    pub(crate) kind: SinkKind,
    pub(crate) writer: Box<dyn Write + Send>,
}

impl Sink {
    pub fn new(name: impl Into<String>, kind: SinkKind, writer: Box<dyn Write + Send>) -> Self {
        Self {
            id: SinkId(0),
            name: name.into(),
            kind,
            writer,
        }
    }

    pub fn id(&self) -> SinkId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SinkKind {
        self.kind
    }
}

/// Stdin of a helper process, written without blocking.
///
/// Whatever the helper has no room for is dropped, so a helper that never
/// reads its input cannot stall the session.
pub struct HelperInput<W> {
    pipe: W,
    dropped: u64,
}

impl<W: Write + AsRawFd> HelperInput<W> {
    pub fn new(pipe: W) -> io::Result<Self> {
        poll::set_nonblocking(pipe.as_raw_fd())?;
        Ok(Self { pipe, dropped: 0 })
    }

    /// Bytes discarded so far because the pipe was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl<W: Write> Write for HelperInput<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.pipe.write(buf) {
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                if self.dropped == 0 {
                    tracing::debug!("helper input full, dropping serial data");
                }
                self.dropped += buf.len() as u64;
                Ok(buf.len())
            }
            other => other,
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.pipe.flush() {
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            other => other,
        }
    }
}

#[derive(Default)]
pub struct Registry {
    sources: Vec<Source>,
    sinks: Vec<Sink>,
    next_id: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn add_source(&mut self, mut source: Source) -> SourceId {
        source.id = SourceId(self.allocate());
        let id = source.id;
        self.sources.push(source);
        id
    }

    pub fn add_sink(&mut self, mut sink: Sink) -> SinkId {
        sink.id = SinkId(self.allocate());
        let id = sink.id;
        self.sinks.push(sink);
        id
    }

    pub fn remove_source(&mut self, id: SourceId) -> Option<Source> {
        let pos = self.sources.iter().position(|s| s.id == id)?;
        Some(self.sources.remove(pos))
    }

    pub fn remove_sink(&mut self, id: SinkId) -> Option<Sink> {
        let pos = self.sinks.iter().position(|s| s.id == id)?;
        Some(self.sinks.remove(pos))
    }

    pub fn source_mut(&mut self, id: SourceId) -> Option<&mut Source> {
        self.sources.iter_mut().find(|s| s.id == id)
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub(crate) fn sources_mut(&mut self) -> &mut [Source] {
        &mut self.sources
    }

    pub fn sinks(&self) -> &[Sink] {
        &self.sinks
    }

    pub fn source_ids(&self) -> Vec<SourceId> {
        self.sources.iter().map(|s| s.id).collect()
    }

    /// Snapshot of the descriptors to poll, in registration order.
    pub fn source_fds(&self) -> Vec<(SourceId, RawFd)> {
        self.sources
            .iter()
            .map(|s| (s.id, s.reader.as_raw_fd()))
            .collect()
    }

    pub fn has_sources(&self) -> bool {
        !self.sources.is_empty()
    }

    /// Write `data` to every sink in order. A sink whose write or flush fails
    /// is dropped; the others still get the data. Returns the dropped sinks.
    pub fn fan_out(&mut self, data: &[u8]) -> Vec<Sink> {
        let mut failed = Vec::new();
        let mut i = 0;
        while i < self.sinks.len() {
            let sink = &mut self.sinks[i];
            let result = sink.writer.write_all(data).and_then(|_| sink.writer.flush());
            match result {
                Ok(()) => i += 1,
                Err(e) => {
                    tracing::warn!(">> Write to {} failed: {}; removing it", sink.name, e);
                    failed.push(self.sinks.remove(i));
                }
            }
        }
        if !failed.is_empty() && self.sinks.is_empty() {
            tracing::info!(">> No outputs left; serial data is discarded");
        }
        failed
    }
}
