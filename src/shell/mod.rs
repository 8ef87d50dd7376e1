//! The `Ctrl-A :` command shell.
//!
//! Commands resolve through a [`CommandTable`] built once at startup from
//! the built-ins and the discovered snippets. The [`Repl`] reads a single
//! line with raw mode suspended, dispatches it and returns to the session.

pub mod snippets;

use std::collections::BTreeMap;
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use colored::Colorize;
use tracing::warn;

pub use snippets::Snippet;

use crate::config::expand_tilde;
use crate::encoding::{EncodingKind, TransferEncoding};
use crate::error::{Result, SercomError};
use crate::session::{self, CommandShell, Flow, RawStdin, Session};

pub const PROMPT: &str = "sercom> ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Read,
    Write,
    Put,
    Ls,
    Snippets,
    Help,
    Quit,
}

impl Builtin {
    pub const ALL: [Builtin; 7] = [
        Builtin::Read,
        Builtin::Write,
        Builtin::Put,
        Builtin::Ls,
        Builtin::Snippets,
        Builtin::Help,
        Builtin::Quit,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Read => "read",
            Builtin::Write => "write",
            Builtin::Put => "put",
            Builtin::Ls => "ls",
            Builtin::Snippets => "snippets",
            Builtin::Help => "help",
            Builtin::Quit => "quit",
        }
    }

    pub fn usage(&self) -> &'static str {
        match self {
            Builtin::Read => "read PATH [plain|base64|gzip]",
            Builtin::Write => "write PATH",
            Builtin::Put => "put PATH [DEST] [base64|gzip]",
            Builtin::Ls => "ls [PATH...]",
            Builtin::Snippets => "snippets",
            Builtin::Help => "help",
            Builtin::Quit => "quit",
        }
    }

    fn summary(&self) -> &'static str {
        match self {
            Builtin::Read => "send a local file to the link",
            Builtin::Write => "append everything received to a local file",
            Builtin::Put => "transfer a local file to the remote shell",
            Builtin::Ls => "list local files",
            Builtin::Snippets => "list snippets",
            Builtin::Help => "show this help",
            Builtin::Quit => "end the session",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Handler {
    Builtin(Builtin),
    Snippet(Snippet),
}

#[derive(Debug, Clone)]
pub struct CommandTable {
    commands: BTreeMap<String, Handler>,
    encoding: TransferEncoding,
}

impl CommandTable {
    /// Built-ins plus `snippets`. A snippet never shadows a built-in.
    pub fn new(snippets: Vec<Snippet>) -> Self {
        let mut commands: BTreeMap<String, Handler> = Builtin::ALL
            .iter()
            .map(|b| (b.name().to_string(), Handler::Builtin(*b)))
            .collect();

        for snippet in snippets {
            if commands.contains_key(&snippet.name) {
                warn!(
                    "Snippet {} is shadowed by a built-in command",
                    snippet.path.display()
                );
                continue;
            }
            commands.insert(snippet.name.clone(), Handler::Snippet(snippet));
        }
        Self {
            commands,
            encoding: TransferEncoding::default(),
        }
    }

    /// Encoding `put` uses when none is given.
    pub fn with_default_encoding(mut self, encoding: TransferEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn get(&self, name: &str) -> Option<&Handler> {
        self.commands.get(name)
    }

    pub fn snippets(&self) -> impl Iterator<Item = &Snippet> {
        self.commands.values().filter_map(|h| match h {
            Handler::Snippet(s) => Some(s),
            Handler::Builtin(_) => None,
        })
    }

    /// Run one command line. Output goes to `out`.
    pub fn dispatch(&self, session: &mut Session, line: &str, out: &mut dyn Write) -> Result<Flow> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Ok(Flow::Continue);
        };
        let args: Vec<&str> = words.collect();

        match self.get(name) {
            Some(Handler::Builtin(builtin)) => self.run_builtin(*builtin, &args, session, out),
            Some(Handler::Snippet(snippet)) => {
                if !args.is_empty() {
                    return Err(SercomError::Usage("snippets take no arguments"));
                }
                session.invoke_snippet(snippet)?;
                writeln!(out, ">> Running {}", snippet.name)?;
                Ok(Flow::Continue)
            }
            None => Err(SercomError::UnknownCommand(name.to_string())),
        }
    }

    fn run_builtin(
        &self,
        builtin: Builtin,
        args: &[&str],
        session: &mut Session,
        out: &mut dyn Write,
    ) -> Result<Flow> {
        let usage = || SercomError::Usage(builtin.usage());
        match builtin {
            Builtin::Read => {
                let (path, encoding) = match args {
                    [path] => (path, EncodingKind::Plain),
                    [path, enc] => (path, enc.parse::<EncodingKind>().map_err(|_| usage())?),
                    _ => return Err(usage()),
                };
                let path = expand_tilde(Path::new(path));
                session.add_read_source(&path, encoding)?;
                writeln!(out, "< {} ({})", path.display(), encoding)?;
            }
            Builtin::Write => {
                let [path] = args else {
                    return Err(usage());
                };
                let path = expand_tilde(Path::new(path));
                session.add_write_sink(&path, true)?;
                writeln!(out, "> {}", path.display())?;
            }
            Builtin::Put => {
                let (path, dest, encoding) = match args {
                    [path] => (*path, None, self.encoding),
                    [path, dest] => (*path, Some(*dest), self.encoding),
                    [path, dest, enc] => (
                        *path,
                        Some(*dest),
                        enc.parse::<TransferEncoding>().map_err(|_| usage())?,
                    ),
                    _ => return Err(usage()),
                };
                let path = expand_tilde(Path::new(path));
                let dest = match dest {
                    Some(dest) => dest.to_string(),
                    None => path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .ok_or_else(usage)?,
                };
                let report = session.start_file_transfer(&path, &dest, encoding)?;
                writeln!(
                    out,
                    "{} {} -> {} ({} bytes, {} on the wire, {:.1}s)",
                    "sent".green(),
                    path.display(),
                    dest,
                    report.bytes_read,
                    report.bytes_sent,
                    report.elapsed.as_secs_f64()
                )?;
            }
            Builtin::Ls => {
                let paths: Vec<PathBuf> = if args.is_empty() {
                    vec![PathBuf::from(".")]
                } else {
                    args.iter().map(|a| expand_tilde(Path::new(a))).collect()
                };
                for line in session::list_directory(&paths)? {
                    writeln!(out, "{}", line)?;
                }
            }
            Builtin::Snippets => {
                let mut any = false;
                for snippet in self.snippets() {
                    any = true;
                    let mark = if snippet.is_executable() { "*" } else { " " };
                    writeln!(out, "{} {:<16} {}", mark, snippet.name, snippet.path.display())?;
                }
                if !any {
                    writeln!(out, "no snippets")?;
                }
            }
            Builtin::Help => {
                for b in Builtin::ALL {
                    writeln!(out, "  {:<32} {}", b.usage(), b.summary())?;
                }
                if self.snippets().next().is_some() {
                    writeln!(out, "  {:<32} {}", "<snippet>", "run a snippet (see 'snippets')")?;
                }
                writeln!(out, "An empty line returns to the session.")?;
            }
            Builtin::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }
}

/// Line-at-a-time shell on the controlling terminal.
pub struct Repl<R: Read = RawStdin, W: Write = io::Stderr> {
    table: CommandTable,
    input: R,
    out: W,
}

impl Repl {
    pub fn new(table: CommandTable) -> Self {
        Self::with_io(table, RawStdin, io::stderr())
    }
}

impl<R: Read, W: Write> Repl<R, W> {
    pub fn with_io(table: CommandTable, input: R, out: W) -> Self {
        Self { table, input, out }
    }

    pub fn table(&self) -> &CommandTable {
        &self.table
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Read up to a newline, one byte at a time so nothing beyond the line
    /// is consumed from the descriptor. `None` on end-of-input.
    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match self.input.read(&mut byte) {
                Ok(0) if line.is_empty() => return Ok(None),
                Ok(0) => break,
                Ok(_) if byte[0] == b'\n' || byte[0] == b'\r' => break,
                Ok(_) => line.push(byte[0]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }
}

impl<R: Read, W: Write> CommandShell for Repl<R, W> {
    fn invoke(&mut self, session: &mut Session) -> Result<Flow> {
        write!(self.out, "\r\n{}", PROMPT.bold())?;
        self.out.flush()?;

        let Some(line) = self.read_line()? else {
            writeln!(self.out)?;
            return Ok(Flow::Continue);
        };
        // Ctrl-C while typing discards the line.
        if session.stop_signal().clear() {
            writeln!(self.out, "^C")?;
            return Ok(Flow::Continue);
        }

        match self.table.dispatch(session, &line, &mut self.out) {
            Ok(flow) => Ok(flow),
            Err(e) => {
                writeln!(self.out, "{} {}", "error:".red().bold(), e)?;
                Ok(Flow::Continue)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::net::UnixStream;
    use tempfile::TempDir;

    fn session() -> (Session, UnixStream) {
        let (local, remote) = UnixStream::pair().unwrap();
        (Session::new(Box::new(local), "test-link").unwrap(), remote)
    }

    fn run(table: &CommandTable, session: &mut Session, line: &str) -> (Result<Flow>, String) {
        let mut out = Vec::new();
        let flow = table.dispatch(session, line, &mut out);
        (flow, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_builtin_wins_over_snippet() {
        let table = CommandTable::new(vec![
            Snippet::new("quit", "/tmp/quit.sh"),
            Snippet::new("login", "/tmp/login.txt"),
        ]);
        assert!(matches!(table.get("quit"), Some(Handler::Builtin(Builtin::Quit))));
        assert!(matches!(table.get("login"), Some(Handler::Snippet(_))));
        assert_eq!(table.snippets().count(), 1);
    }

    #[test]
    fn test_empty_line_and_quit() {
        let table = CommandTable::new(Vec::new());
        let (mut s, _remote) = session();
        assert_eq!(run(&table, &mut s, "   ").0.unwrap(), Flow::Continue);
        assert_eq!(run(&table, &mut s, "quit").0.unwrap(), Flow::Quit);
    }

    #[test]
    fn test_unknown_command_and_usage() {
        let table = CommandTable::new(Vec::new());
        let (mut s, _remote) = session();
        assert!(matches!(
            run(&table, &mut s, "flash now").0,
            Err(SercomError::UnknownCommand(name)) if name == "flash"
        ));
        assert!(matches!(
            run(&table, &mut s, "read").0,
            Err(SercomError::Usage(u)) if u == Builtin::Read.usage()
        ));
        assert!(matches!(
            run(&table, &mut s, "read a.txt rot13").0,
            Err(SercomError::Usage(_))
        ));
        assert!(matches!(
            run(&table, &mut s, "put a.bin /tmp/a plain").0,
            Err(SercomError::Usage(_))
        ));
    }

    #[test]
    fn test_read_and_write_register_endpoints() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("in.txt");
        fs::write(&input, "hello").unwrap();
        let log = tmp.path().join("log.txt");

        let table = CommandTable::new(Vec::new());
        let (mut s, _remote) = session();
        let (flow, out) = run(&table, &mut s, &format!("read {} base64", input.display()));
        assert_eq!(flow.unwrap(), Flow::Continue);
        assert!(out.starts_with("< "));
        assert_eq!(s.registry().sources().len(), 1);

        run(&table, &mut s, &format!("write {}", log.display())).0.unwrap();
        assert_eq!(s.registry().sinks().len(), 1);
        assert!(log.exists());
    }

    #[test]
    fn test_ls_lists_entries() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("fw.bin"), [0u8; 3]).unwrap();
        let table = CommandTable::new(Vec::new());
        let (mut s, _remote) = session();
        let (flow, out) = run(&table, &mut s, &format!("ls {}", tmp.path().display()));
        flow.unwrap();
        assert!(out.contains("fw.bin"));
    }

    #[test]
    fn test_repl_prints_errors_and_continues() {
        let (mut s, _remote) = session();
        let mut repl = Repl::with_io(CommandTable::new(Vec::new()), &b"bogus\n"[..], Vec::new());
        assert_eq!(repl.invoke(&mut s).unwrap(), Flow::Continue);
        let out = String::from_utf8(repl.into_output()).unwrap();
        assert!(out.contains("Unknown command: bogus"), "{out}");
    }

    #[test]
    fn test_repl_quit_and_eof() {
        let (mut s, _remote) = session();
        let mut repl = Repl::with_io(CommandTable::new(Vec::new()), &b"quit\r"[..], Vec::new());
        assert_eq!(repl.invoke(&mut s).unwrap(), Flow::Quit);

        let mut repl = Repl::with_io(CommandTable::new(Vec::new()), &b""[..], Vec::new());
        assert_eq!(repl.invoke(&mut s).unwrap(), Flow::Continue);
    }

    #[test]
    fn test_repl_discards_line_after_interrupt() {
        let (mut s, _remote) = session();
        s.stop_signal().trigger();
        let mut repl = Repl::with_io(CommandTable::new(Vec::new()), &b"quit\n"[..], Vec::new());
        assert_eq!(repl.invoke(&mut s).unwrap(), Flow::Continue);
        assert!(!s.stop_signal().is_set());
    }
}
