//! Interpretation of raw keyboard bytes.
//!
//! `Ctrl-A` starts an escape; the next byte decides what it means. There is
//! no timeout: an escape stays pending until the next key arrives.

/// `Ctrl-A`.
pub const ESCAPE_PREFIX: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyState {
    #[default]
    Normal,
    EscapePending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Send this byte to the link.
    Forward(u8),
    /// The byte only changed state.
    Consumed,
    /// Unrecognized escape; the byte is swallowed.
    Dropped(u8),
    /// Open the command shell.
    Command,
    /// End the session.
    Quit,
}

#[derive(Debug, Default)]
pub struct TerminalModeController {
    state: KeyState,
}

impl TerminalModeController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> KeyState {
        self.state
    }

    pub fn feed(&mut self, byte: u8) -> KeyAction {
        match self.state {
            KeyState::Normal if byte == ESCAPE_PREFIX => {
                self.state = KeyState::EscapePending;
                KeyAction::Consumed
            }
            KeyState::Normal => KeyAction::Forward(byte),
            KeyState::EscapePending => {
                self.state = KeyState::Normal;
                match byte {
                    b'q' => KeyAction::Quit,
                    ESCAPE_PREFIX => KeyAction::Forward(ESCAPE_PREFIX),
                    b':' => KeyAction::Command,
                    other => KeyAction::Dropped(other),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forwarded(input: &[u8]) -> Vec<u8> {
        let mut keys = TerminalModeController::new();
        input
            .iter()
            .filter_map(|&b| match keys.feed(b) {
                KeyAction::Forward(b) => Some(b),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_plain_byte_is_forwarded() {
        assert_eq!(forwarded(b"a"), b"a");
    }

    #[test]
    fn test_unrecognized_escape_forwards_nothing() {
        assert!(forwarded(&[ESCAPE_PREFIX, b'x']).is_empty());

        let mut keys = TerminalModeController::new();
        keys.feed(ESCAPE_PREFIX);
        assert_eq!(keys.feed(b'x'), KeyAction::Dropped(b'x'));
        assert_eq!(keys.state(), KeyState::Normal);
    }

    #[test]
    fn test_double_prefix_sends_one_literal() {
        assert_eq!(forwarded(&[ESCAPE_PREFIX, ESCAPE_PREFIX]), vec![ESCAPE_PREFIX]);
    }

    #[test]
    fn test_quit_and_command() {
        let mut keys = TerminalModeController::new();
        assert_eq!(keys.feed(ESCAPE_PREFIX), KeyAction::Consumed);
        assert_eq!(keys.state(), KeyState::EscapePending);
        assert_eq!(keys.feed(b':'), KeyAction::Command);
        assert_eq!(keys.feed(ESCAPE_PREFIX), KeyAction::Consumed);
        assert_eq!(keys.feed(b'q'), KeyAction::Quit);
        assert_eq!(keys.feed(b'q'), KeyAction::Forward(b'q'));
    }

    #[test]
    fn test_typing_after_escape_resumes() {
        assert_eq!(forwarded(&[b'l', ESCAPE_PREFIX, b'z', b's']), b"ls");
    }
}
