//! Emulated I/O board: eight outputs driven by clients, eight inputs driven
//! from the REPL.

use std::fmt;

use clock_core::link::{PinEvent, StatusVocabulary};
use clock_core::pins::{MAX_PINS, PinEdge, PinId, PinLevel};
use serde::{Deserialize, Serialize};

/// Reply sent for a well-formed frame that names an unknown action or pin.
pub const INVALID_COMMAND: &str = "Ungültige Aktion oder Pin";

/// Client command frame. Both fields are optional so that incomplete frames
/// are answered with [`INVALID_COMMAND`] rather than a decode error.
#[derive(Debug, Default, Deserialize)]
struct CommandFrame {
    action: Option<String>,
    pin: Option<i64>,
}

#[derive(Debug, Serialize)]
struct ErrorFrame<'a> {
    error: &'a str,
}

#[derive(Debug, Serialize)]
struct StatusFrame<'a> {
    status: &'a str,
}

/// Output change caused by one client frame.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct OutputChange {
    pub pin: PinId,
    pub level: PinLevel,
    /// `false` when the output already had the requested level.
    pub changed: bool,
}

/// Result of applying one client frame.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FrameOutcome {
    Applied(OutputChange),
    /// JSON reply owed to the sender.
    Rejected(String),
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Board {
    outputs: [bool; MAX_PINS],
    inputs: [bool; MAX_PINS],
    vocabulary: StatusVocabulary,
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output(&self, pin: PinId) -> Option<bool> {
        self.outputs.get(usize::from(pin)).copied()
    }

    /// Applies a raw client frame.
    pub fn apply_frame(&mut self, text: &str) -> FrameOutcome {
        let frame: CommandFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(error) => return FrameOutcome::Rejected(error_reply(&format!("Fehler: {error}"))),
        };
        let level = match frame.action.as_deref() {
            Some("on") => PinLevel::On,
            Some("off") => PinLevel::Off,
            _ => return FrameOutcome::Rejected(error_reply(INVALID_COMMAND)),
        };
        let Some(pin) = frame
            .pin
            .and_then(|pin| PinId::try_from(pin).ok())
            .filter(|pin| usize::from(*pin) < MAX_PINS)
        else {
            return FrameOutcome::Rejected(error_reply(INVALID_COMMAND));
        };

        let slot = &mut self.outputs[usize::from(pin)];
        let changed = *slot != level.is_on();
        *slot = level.is_on();
        FrameOutcome::Applied(OutputChange {
            pin,
            level,
            changed,
        })
    }

    /// Moves input `pin` to `edge` and returns the status broadcast, or
    /// `None` when the pin does not exist.
    pub fn set_input(&mut self, pin: PinId, edge: PinEdge) -> Option<String> {
        let slot = self.inputs.get_mut(usize::from(pin))?;
        *slot = edge == PinEdge::On;
        Some(self.status_frame(PinEvent::new(pin, edge)))
    }

    fn status_frame(&self, event: PinEvent) -> String {
        let status = format!("Eingang {} {}", event.pin, self.vocabulary.word(event.edge));
        serde_json::to_string(&StatusFrame { status: &status }).unwrap_or_default()
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (pin, on) in self.outputs.iter().enumerate() {
            if pin > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{pin}:{}", if *on { "on" } else { "off" })?;
        }
        Ok(())
    }
}

fn error_reply(message: &str) -> String {
    serde_json::to_string(&ErrorFrame { error: message }).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_commands_to_outputs() {
        let mut board = Board::new();
        assert_eq!(
            board.apply_frame(r#"{"action": "on", "pin": 4}"#),
            FrameOutcome::Applied(OutputChange {
                pin: 4,
                level: PinLevel::On,
                changed: true
            })
        );
        assert_eq!(board.output(4), Some(true));
        assert_eq!(
            board.apply_frame(r#"{"action": "on", "pin": 4}"#),
            FrameOutcome::Applied(OutputChange {
                pin: 4,
                level: PinLevel::On,
                changed: false
            })
        );
        board.apply_frame(r#"{"action": "off", "pin": 4}"#);
        assert_eq!(board.output(4), Some(false));
    }

    #[test]
    fn rejects_unknown_actions_and_pins() {
        let mut board = Board::new();
        let invalid = r#"{"error":"Ungültige Aktion oder Pin"}"#.to_owned();
        for frame in [
            r#"{"action": "toggle", "pin": 1}"#,
            r#"{"action": "on", "pin": 8}"#,
            r#"{"action": "on", "pin": -1}"#,
            r#"{"action": "on"}"#,
            r#"{"pin": 1}"#,
        ] {
            assert_eq!(board.apply_frame(frame), FrameOutcome::Rejected(invalid.clone()), "{frame}");
        }
        assert_eq!(board, Board::new());
    }

    #[test]
    fn malformed_frames_report_the_decode_error() {
        let FrameOutcome::Rejected(reply) = Board::new().apply_frame("not json") else {
            panic!("malformed frame accepted");
        };
        let reply: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert!(reply["error"].as_str().unwrap().starts_with("Fehler: "));
    }

    #[test]
    fn input_edges_become_status_frames() {
        let mut board = Board::new();
        assert_eq!(
            board.set_input(3, PinEdge::On).as_deref(),
            Some(r#"{"status":"Eingang 3 eingeschaltet"}"#)
        );
        assert_eq!(
            board.set_input(3, PinEdge::Off).as_deref(),
            Some(r#"{"status":"Eingang 3 ausgeschaltet"}"#)
        );
        assert_eq!(board.set_input(8, PinEdge::On), None);
    }

    #[test]
    fn display_lists_every_output() {
        let mut board = Board::new();
        board.apply_frame(r#"{"action": "on", "pin": 0}"#);
        assert_eq!(
            board.to_string(),
            "0:on 1:off 2:off 3:off 4:off 5:off 6:off 7:off"
        );
    }
}
