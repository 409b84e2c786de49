//! Operator commands for the emulator console.

use clock_core::pins::{PinEdge, PinId};
use winnow::ascii::{dec_uint, space0, space1};
use winnow::combinator::{alt, eof, opt, preceded, terminated};
use winnow::error::ErrMode;
use winnow::prelude::*;
use winnow::token::take_while;

use crate::server::Hub;

pub const HELP_TOPICS: &[(&str, &str)] = &[
    ("press", "press <pin>    - switch an input on"),
    ("release", "release <pin>  - switch an input off"),
    ("tap", "tap <pin>      - press then release an input"),
    ("outputs", "outputs        - show every output level"),
    ("drop", "drop           - disconnect every client"),
    ("help", "help [topic]   - show help for a command"),
    ("exit", "exit | quit    - stop the emulator"),
];

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReplCommand<'a> {
    Press(PinId),
    Release(PinId),
    Tap(PinId),
    Outputs,
    Drop,
    Help(Option<&'a str>),
    Exit,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SyntaxError;

/// Parses one console line. Keywords are case-sensitive.
pub fn parse(line: &str) -> Result<ReplCommand<'_>, SyntaxError> {
    let mut input = line.trim();
    terminated(command, (space0, eof))
        .parse_next(&mut input)
        .map_err(|_: ErrMode<()>| SyntaxError)
}

fn command<'a>(input: &mut &'a str) -> Result<ReplCommand<'a>, ErrMode<()>> {
    alt((
        preceded(("press", space1), dec_uint).map(ReplCommand::Press),
        preceded(("release", space1), dec_uint).map(ReplCommand::Release),
        preceded(("tap", space1), dec_uint).map(ReplCommand::Tap),
        "outputs".value(ReplCommand::Outputs),
        "drop".value(ReplCommand::Drop),
        preceded("help", opt(preceded(space1, word))).map(ReplCommand::Help),
        alt(("exit", "quit")).value(ReplCommand::Exit),
    ))
    .parse_next(input)
}

fn word<'a>(input: &mut &'a str) -> Result<&'a str, ErrMode<()>> {
    take_while(1.., |c: char| c.is_ascii_alphabetic()).parse_next(input)
}

/// Executes `command` against the hub and returns the console output.
pub fn execute(hub: &Hub, command: ReplCommand<'_>) -> Vec<String> {
    match command {
        ReplCommand::Press(pin) => vec![input(hub, pin, PinEdge::On)],
        ReplCommand::Release(pin) => vec![input(hub, pin, PinEdge::Off)],
        ReplCommand::Tap(pin) => vec![input(hub, pin, PinEdge::On), input(hub, pin, PinEdge::Off)],
        ReplCommand::Outputs => vec![hub.with_board(|board| board.to_string())],
        ReplCommand::Drop => vec![format!("OK dropped {} client(s)", hub.drop_clients())],
        ReplCommand::Help(None) => HELP_TOPICS.iter().map(|(_, line)| (*line).to_owned()).collect(),
        ReplCommand::Help(Some(topic)) => match HELP_TOPICS.iter().find(|(name, _)| *name == topic) {
            Some((_, line)) => vec![(*line).to_owned()],
            None => vec![format!("ERR unknown topic {topic}")],
        },
        ReplCommand::Exit => Vec::new(),
    }
}

fn input(hub: &Hub, pin: PinId, edge: PinEdge) -> String {
    let verb = match edge {
        PinEdge::On => "on",
        PinEdge::Off => "off",
    };
    if hub.input(pin, edge) {
        format!("OK input {pin} {verb} ({} client(s))", hub.clients())
    } else {
        format!("ERR no input {pin}")
    }
}
