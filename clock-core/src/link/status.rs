//! Parser for the pin controller's free-text status reports.
//!
//! Reports look like `Eingang 3 ausgeschaltet`: somewhere in the text is the
//! pin number, and somewhere is a verb saying whether the input went on or
//! off. The first run of digits is taken as the pin; the verbs are matched as
//! whole words so a short verb such as `on` cannot match inside `Button`.

use core::fmt;

use winnow::ascii::digit1;
use winnow::combinator::preceded;
use winnow::error::ErrMode;
use winnow::prelude::*;
use winnow::token::take_till;

use super::PinEvent;
use crate::pins::PinEdge;

/// Words the pin controller uses for the two transition directions.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StatusVocabulary {
    pub on: &'static str,
    pub off: &'static str,
}

impl StatusVocabulary {
    /// Vocabulary of the stock PiFace bridge.
    pub const GERMAN: Self = Self {
        on: "eingeschaltet",
        off: "ausgeschaltet",
    };

    pub const ENGLISH: Self = Self {
        on: "on",
        off: "off",
    };

    /// Verb reported for `edge`.
    #[must_use]
    pub const fn word(&self, edge: PinEdge) -> &'static str {
        match edge {
            PinEdge::On => self.on,
            PinEdge::Off => self.off,
        }
    }

    fn edge_of(&self, text: &str) -> Option<PinEdge> {
        let mut words = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty());
        words.find_map(|word| {
            if word.eq_ignore_ascii_case(self.on) {
                Some(PinEdge::On)
            } else if word.eq_ignore_ascii_case(self.off) {
                Some(PinEdge::Off)
            } else {
                None
            }
        })
    }
}

impl Default for StatusVocabulary {
    fn default() -> Self {
        Self::GERMAN
    }
}

/// Reasons a status report was not turned into a [`PinEvent`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StatusError {
    /// No digits anywhere in the text.
    MissingPin,
    /// The pin number does not fit a pin index.
    PinOutOfRange,
    /// Neither the on nor the off verb appears.
    UnknownVerb,
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StatusError::MissingPin => "status carries no pin number",
            StatusError::PinOutOfRange => "status pin number out of range",
            StatusError::UnknownVerb => "status carries no recognized on/off verb",
        })
    }
}

/// Extracts the pin transition described by `text`.
pub fn parse_status(text: &str, vocabulary: &StatusVocabulary) -> Result<PinEvent, StatusError> {
    let mut input = text;
    let digits = first_number(&mut input).map_err(|_| StatusError::MissingPin)?;
    let pin = digits.parse::<u8>().map_err(|_| StatusError::PinOutOfRange)?;
    let edge = vocabulary.edge_of(text).ok_or(StatusError::UnknownVerb)?;
    Ok(PinEvent::new(pin, edge))
}

fn first_number<'a>(input: &mut &'a str) -> Result<&'a str, ErrMode<()>> {
    preceded(take_till(0.., |c: char| c.is_ascii_digit()), digit1).parse_next(input)
}
