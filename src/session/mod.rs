//! Terminal session over the serial link.
//!
//! A `Session` owns the link and the registry of sources and sinks. Bytes
//! from the link fan out to every sink; bytes from sources go to the link,
//! through an encoder if the source has one, or through the keyboard escape
//! handler when stdin is an interactive terminal.
//!
//! The operations the command shell calls into (`add_read_source`,
//! `add_write_sink`, `start_file_transfer`, `invoke_snippet`,
//! `list_directory`) live here; the event loop is in `multiplexer`.

pub mod keyboard;
pub mod multiplexer;
pub mod registry;
pub mod terminal;

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, IsTerminal};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::info;

pub use keyboard::{KeyAction, KeyState, TerminalModeController, ESCAPE_PREFIX};
pub use registry::{
    HelperInput, Registry, Sink, SinkId, SinkKind, Source, SourceId, SourceKind, SourceReader,
};
pub use terminal::{CrosstermTerminal, NoTerminal, RawStdin, TerminalControl};

use crate::encoding::{EncodingKind, StreamEncoder, TransferEncoding};
use crate::error::{Result, SercomError};
use crate::link::Link;
use crate::progress::ProgressTracker;
use crate::signal::StopSignal;
use crate::shell::snippets::{Snippet, SNIPPET_ENV};
use crate::transfer::{Transfer, TransferConfig, TransferLock, TransferReport};

/// Why the event loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// Every source reached end-of-stream.
    SourcesExhausted,
    /// `Ctrl-A q` or the `quit` command.
    Quit,
    /// SIGINT/SIGTERM.
    Stopped,
}

/// What the session does after a shell command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// The interactive command shell behind `Ctrl-A :`.
///
/// Invoked with raw mode suspended; blocks until the user is done.
pub trait CommandShell {
    fn invoke(&mut self, session: &mut Session) -> Result<Flow>;
}

/// Ignores the command escape.
#[derive(Debug, Default)]
pub struct NoShell;

impl CommandShell for NoShell {
    fn invoke(&mut self, _session: &mut Session) -> Result<Flow> {
        Ok(Flow::Continue)
    }
}

pub struct Session {
    link: Box<dyn Link>,
    link_name: String,
    registry: Registry,
    keys: TerminalModeController,
    interactive: bool,
    terminal: Box<dyn TerminalControl>,
    stop: StopSignal,
    transfer_lock: TransferLock,
    transfer_config: TransferConfig,
}

impl Session {
    pub fn new(link: Box<dyn Link>, link_name: impl Into<String>) -> Result<Self> {
        Ok(Self {
            link,
            link_name: link_name.into(),
            registry: Registry::new(),
            keys: TerminalModeController::new(),
            interactive: false,
            terminal: Box::new(NoTerminal),
            stop: StopSignal::new()?,
            transfer_lock: TransferLock::new(),
            transfer_config: TransferConfig::default(),
        })
    }

    pub fn with_transfer_config(mut self, config: TransferConfig) -> Self {
        self.transfer_config = config;
        self
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    pub fn link_name(&self) -> &str {
        &self.link_name
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    pub fn transfer_lock(&self) -> &TransferLock {
        &self.transfer_lock
    }

    /// Register stdin as the keyboard and stdout as a sink. A terminal on
    /// stdin switches on raw mode and escape handling.
    pub fn attach_stdio(&mut self) -> SourceId {
        let interactive = io::stdin().is_terminal();
        let terminal: Box<dyn TerminalControl> = if interactive {
            Box::new(CrosstermTerminal::new())
        } else {
            Box::new(NoTerminal)
        };
        self.add_sink(Sink::new("<stdout>", SinkKind::Stdout, Box::new(io::stdout())));
        self.attach_keyboard(Box::new(RawStdin), interactive, terminal)
    }

    pub fn attach_keyboard(
        &mut self,
        reader: Box<dyn SourceReader>,
        interactive: bool,
        terminal: Box<dyn TerminalControl>,
    ) -> SourceId {
        self.interactive = interactive;
        self.terminal = terminal;
        self.add_source(Source::new("<stdin>", SourceKind::Keyboard, reader))
    }

    pub fn add_source(&mut self, source: Source) -> SourceId {
        self.registry.add_source(source)
    }

    pub fn add_sink(&mut self, sink: Sink) -> SinkId {
        self.registry.add_sink(sink)
    }

    /// Send the contents of `path` to the link, encoded with `encoding`.
    pub fn add_read_source(&mut self, path: &Path, encoding: EncodingKind) -> Result<SourceId> {
        let source = open_read_source(path, encoding)?;
        Ok(self.add_source(source))
    }

    /// Copy everything received from the link into `path`.
    pub fn add_write_sink(&mut self, path: &Path, append: bool) -> Result<SinkId> {
        let sink = open_write_sink(path, append)?;
        Ok(self.add_sink(sink))
    }

    /// Push `path` to `dest` on the remote shell. Holds the link until the
    /// remote confirms it is back at its prompt or the handshake fails.
    pub fn start_file_transfer(
        &mut self,
        path: &Path,
        dest: &str,
        encoding: TransferEncoding,
    ) -> Result<TransferReport> {
        let _guard = self.transfer_lock.try_acquire()?;
        let file = File::open(path).map_err(|e| SercomError::file_open(path, e))?;
        let total = file.metadata()?.len();
        info!(
            "Sending {} ({} bytes, {}) to {}",
            path.display(),
            total,
            encoding,
            dest
        );

        let progress = ProgressTracker::stderr(format!("{} -> {}", path.display(), dest), total);
        let report = Transfer::new(
            self.link.as_mut(),
            dest,
            encoding,
            &self.transfer_config,
            progress,
        )
        .with_stop(&self.stop)
        .run(&mut BufReader::new(file))?;
        self.registry.fan_out(&report.trailing);

        info!(
            "Sent {} bytes as {} bytes in {:.1}s",
            report.bytes_read,
            report.bytes_sent,
            report.elapsed.as_secs_f64()
        );
        Ok(report)
    }

    /// Run a snippet. Non-executable snippets are sent as plain text;
    /// executables are spawned with their stdout wired to the link and the
    /// link wired to their stdin.
    pub fn invoke_snippet(&mut self, snippet: &Snippet) -> Result<SourceId> {
        if !snippet.is_executable() {
            return self.add_read_source(&snippet.path, EncodingKind::Plain);
        }

        let mut child = Command::new(&snippet.path)
            .env(SNIPPET_ENV, &snippet.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| SercomError::Snippet {
                name: snippet.name.clone(),
                message: e.to_string(),
            })?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SercomError::Snippet {
                    name: snippet.name.clone(),
                    message: "stdio pipes unavailable".to_string(),
                });
            }
        };

        let stdin = match HelperInput::new(stdin) {
            Ok(stdin) => stdin,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SercomError::Snippet {
                    name: snippet.name.clone(),
                    message: e.to_string(),
                });
            }
        };

        let label = format!("{} (pid {})", snippet.name, child.id());
        let sink = self.add_sink(Sink::new(label.clone(), SinkKind::Process, Box::new(stdin)));
        let source = Source::new(label, SourceKind::Process, Box::new(stdout))
            .with_child(child, Some(sink));
        Ok(self.add_source(source))
    }
}

/// A file source for `path`, not yet registered with any session.
pub fn open_read_source(path: &Path, encoding: EncodingKind) -> Result<Source> {
    let file = File::open(path).map_err(|e| SercomError::file_open(path, e))?;
    let source = Source::new(path.display().to_string(), SourceKind::File, Box::new(file));
    Ok(match encoding {
        EncodingKind::Plain => source,
        _ => source.with_encoder(StreamEncoder::new(encoding)),
    })
}

/// A file sink for `path`, truncated unless `append` is set.
pub fn open_write_sink(path: &Path, append: bool) -> Result<Sink> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)
        .map_err(|e| SercomError::file_open(path, e))?;
    Ok(Sink::new(
        path.display().to_string(),
        SinkKind::File,
        Box::new(file),
    ))
}

/// One line per entry: directories get a trailing `/`, files their size.
pub fn list_directory(paths: &[PathBuf]) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    for path in paths {
        let meta = fs::metadata(path).map_err(|e| SercomError::file_open(path, e))?;
        if !meta.is_dir() {
            lines.push(format!("{:>10}  {}", meta.len(), path.display()));
            continue;
        }

        if paths.len() > 1 {
            lines.push(format!("{}:", path.display()));
        }
        let mut entries: Vec<_> = fs::read_dir(path)
            .map_err(|e| SercomError::file_open(path, e))?
            .filter_map(|e| e.ok())
            .collect();
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            let name = entry.file_name().to_string_lossy().into_owned();
            match entry.metadata() {
                Ok(m) if m.is_dir() => lines.push(format!("{:>10}  {}/", "", name)),
                Ok(m) => lines.push(format!("{:>10}  {}", m.len(), name)),
                Err(_) => lines.push(format!("{:>10}  {}", "?", name)),
            }
        }
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::os::unix::net::UnixStream;
    use tempfile::TempDir;

    fn session() -> (Session, UnixStream) {
        let (local, remote) = UnixStream::pair().unwrap();
        (Session::new(Box::new(local), "test-link").unwrap(), remote)
    }

    #[test]
    fn test_read_source_missing_file() {
        let (mut s, _remote) = session();
        let err = s
            .add_read_source(Path::new("/nonexistent/sercom"), EncodingKind::Plain)
            .unwrap_err();
        assert!(matches!(err, SercomError::FileOpen { .. }));
        assert!(!s.registry().has_sources());
    }

    #[test]
    fn test_write_sink_truncates_or_appends() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("log.txt");
        fs::write(&path, "old").unwrap();

        let (mut s, _remote) = session();
        s.add_write_sink(&path, true).unwrap();
        s.add_write_sink(&path, false).unwrap();
        assert_eq!(s.registry().sinks().len(), 2);
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_second_transfer_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.bin");
        fs::write(&path, [0u8; 10]).unwrap();

        let (mut s, mut remote) = session();
        let _held = s.transfer_lock().clone().try_acquire().unwrap();
        let err = s
            .start_file_transfer(&path, "/tmp/a.bin", TransferEncoding::Base64)
            .unwrap_err();
        assert!(matches!(err, SercomError::TransferInProgress));

        // nothing reached the link
        drop(s);
        let mut sent = Vec::new();
        remote.read_to_end(&mut sent).unwrap();
        assert!(sent.is_empty());
    }

    #[test]
    fn test_list_directory() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b.txt"), "1234").unwrap();
        fs::create_dir(tmp.path().join("a")).unwrap();

        let lines = list_directory(&[tmp.path().to_path_buf()]).unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("a/"));
        assert!(lines[1].ends_with("b.txt"));
        assert!(lines[1].contains('4'));

        let single = list_directory(&[tmp.path().join("b.txt")]).unwrap();
        assert_eq!(single.len(), 1);
        assert!(list_directory(&[tmp.path().join("missing")]).is_err());
    }
}
