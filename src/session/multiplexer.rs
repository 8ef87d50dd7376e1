//! The session event loop.
//!
//! One thread waits in `poll` on the link, the stop signal and every
//! source. Link data fans out to the sinks; source data goes to the link.
//! The loop ends when the last source closes, on quit, or on a stop request.

use std::io::{self, ErrorKind, Read};
use std::process::Child;

use tracing::{debug, info, warn};

use super::{CommandShell, Exit, Flow, KeyAction, Session, SourceId, SourceKind};
use crate::error::{Result, SercomError};
use crate::link;
use crate::poll;

/// Largest single read from the link.
const LINK_CHUNK: usize = 4096;

/// Largest single read from a source.
const SOURCE_CHUNK: usize = 1024;

fn transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
    )
}

impl Session {
    /// Run until every source is exhausted, the user quits, or a stop is
    /// requested. The terminal mode is restored and helper processes are
    /// reaped on every exit path.
    pub fn run(&mut self, shell: &mut dyn CommandShell) -> Result<Exit> {
        let result = self.enter_raw_mode().and_then(|()| self.event_loop(shell));

        if let Err(e) = self.terminal.restore_mode() {
            warn!("Failed to restore terminal mode: {}", e);
        }
        self.shutdown();

        match &result {
            Ok(exit) => debug!("session on {} ended: {:?}", self.link_name, exit),
            Err(e) => debug!("session on {} failed: {}", self.link_name, e),
        }
        result
    }

    fn enter_raw_mode(&mut self) -> Result<()> {
        if self.interactive {
            self.terminal.enter_raw_mode()?;
        }
        Ok(())
    }

    fn event_loop(&mut self, shell: &mut dyn CommandShell) -> Result<Exit> {
        // With no inputs at all, only record the link until stopped.
        let monitor_only = !self.registry.has_sources();
        if monitor_only {
            info!(">> No inputs; receiving until interrupted");
        }

        loop {
            if self.stop.is_set() {
                info!(">> Interrupted");
                return Ok(Exit::Stopped);
            }
            if !monitor_only && !self.registry.has_sources() {
                return Ok(Exit::SourcesExhausted);
            }

            let sources = self.registry.source_fds();
            let mut fds = Vec::with_capacity(sources.len() + 2);
            fds.push(self.link.as_raw_fd());
            fds.push(self.stop.fd());
            fds.extend(sources.iter().map(|&(_, fd)| fd));

            let ready = match poll::readable(&fds, None) {
                Ok(ready) => ready,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            if ready[0] {
                self.pump_link()?;
            }
            // ready[1] is the stop signal, handled at the top of the loop
            for (&(id, _), _) in sources.iter().zip(&ready[2..]).filter(|(_, r)| **r) {
                if let Some(exit) = self.pump_source(id, shell)? {
                    return Ok(exit);
                }
            }
        }
    }

    fn pump_link(&mut self) -> Result<()> {
        let mut buf = [0u8; LINK_CHUNK];
        let n = match self.link.read(&mut buf) {
            Ok(0) => {
                return Err(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    format!("serial link {} closed", self.link_name),
                )
                .into())
            }
            Ok(n) => n,
            Err(e) if transient(&e) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        self.registry.fan_out(&buf[..n]);
        Ok(())
    }

    fn pump_source(&mut self, id: SourceId, shell: &mut dyn CommandShell) -> Result<Option<Exit>> {
        let mut buf = [0u8; SOURCE_CHUNK];
        // Closed earlier in this round, e.g. by a shell command.
        let Some(source) = self.registry.source_mut(id) else {
            return Ok(None);
        };

        let n = match source.reader.read(&mut buf) {
            Ok(n) => n,
            Err(e) if transient(&e) => return Ok(None),
            Err(e) => {
                warn!(">> Read from {} failed: {}", source.name, e);
                0
            }
        };
        if n == 0 {
            let name = source.name.clone();
            info!(">> Closed: {}", name);
            self.close_source(id)?;
            return Ok(None);
        }

        let data = &buf[..n];
        if source.kind == SourceKind::Keyboard && self.interactive {
            return self.handle_keys(data, shell);
        }

        match source.encoder.as_mut() {
            Some(encoder) => {
                let encoded = encoder.encode(data)?;
                link::send(self.link.as_mut(), &encoded)?;
            }
            None => link::send(self.link.as_mut(), data)?,
        }
        Ok(None)
    }

    fn handle_keys(&mut self, data: &[u8], shell: &mut dyn CommandShell) -> Result<Option<Exit>> {
        for &byte in data {
            match self.keys.feed(byte) {
                KeyAction::Forward(b) => link::send(self.link.as_mut(), &[b])?,
                KeyAction::Consumed => {}
                KeyAction::Dropped(b) => debug!("dropped escape sequence byte {:#04x}", b),
                KeyAction::Quit => return Ok(Some(Exit::Quit)),
                KeyAction::Command => {
                    if self.invoke_shell(shell)? == Flow::Quit {
                        return Ok(Some(Exit::Quit));
                    }
                }
            }
        }
        Ok(None)
    }

    /// Hand the terminal to the command shell in cooked mode.
    fn invoke_shell(&mut self, shell: &mut dyn CommandShell) -> Result<Flow> {
        self.terminal.restore_mode()?;
        let flow = shell.invoke(self);
        // A Ctrl-C at the prompt cancels the command, not the session.
        self.stop.clear();
        self.terminal.enter_raw_mode()?;
        flow
    }

    /// Unregister a source: flush its encoder to the link, drop its paired
    /// sink and reap its helper process.
    pub(crate) fn close_source(&mut self, id: SourceId) -> Result<()> {
        let Some(mut source) = self.registry.remove_source(id) else {
            return Ok(());
        };

        let flushed = match source.encoder.take() {
            Some(encoder) => encoder
                .finish()
                .and_then(|tail| link::send(self.link.as_mut(), &tail))
                .map_err(SercomError::from),
            None => Ok(()),
        };
        if let Some(sink) = source.paired_sink.take() {
            self.registry.remove_sink(sink);
        }
        if let Some(child) = source.child.as_mut() {
            reap(&source.name, child);
        }
        flushed
    }

    fn shutdown(&mut self) {
        for source in self.registry.sources_mut() {
            if let Some(child) = source.child.as_mut() {
                if let Err(e) = child.kill() {
                    debug!("kill {} failed: {}", source.name, e);
                }
            }
        }
        for id in self.registry.source_ids() {
            if let Err(e) = self.close_source(id) {
                warn!("Failed to flush {:?} on exit: {}", id, e);
            }
        }
    }
}

fn reap(name: &str, child: &mut Child) {
    match child.wait() {
        Ok(status) if status.success() => debug!("{} exited", name),
        Ok(status) => info!(">> {} exited with {}", name, status),
        Err(e) => warn!("Failed to wait for {}: {}", name, e),
    }
}
