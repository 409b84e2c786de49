//! Forward-only arithmetic on a 12-hour analog face.
//!
//! The clock hands can only move forward, so every difference computed here is
//! the number of single-minute steps needed to travel from one position to the
//! next, wrapping through 12 o'clock when the destination is "behind" the
//! origin. All arithmetic is performed modulo one lap of the hands
//! ([`MINUTES_PER_LAP`]).

use core::fmt::{self, Write as _};
use core::str::FromStr;

use heapless::String;
use winnow::combinator::eof;
use winnow::error::ErrMode;
use winnow::prelude::*;
use winnow::token::take_while;

/// Minutes in one hour of the face.
pub const MINUTES_PER_HOUR: u16 = 60;
/// Minutes in one full lap of the hands (12 hours).
pub const MINUTES_PER_LAP: u16 = 720;
/// Length of the canonical `HH:MM` rendering.
pub const HHMM_LEN: usize = 5;

/// Maps any hour onto the 1..=12 range of the face (0 and 12 are both 12 o'clock).
#[must_use]
pub const fn normalize_hour(hour: u8) -> u8 {
    match hour % 12 {
        0 => 12,
        other => other,
    }
}

/// Position of `hour:minute` within one lap, in `0..MINUTES_PER_LAP`.
#[must_use]
pub const fn to_minutes_of_half_day(hour: u8, minute: u8) -> u16 {
    (normalize_hour(hour) as u16 * MINUTES_PER_HOUR + minute as u16) % MINUTES_PER_LAP
}

/// Number of forward minute-steps needed to move the hands from `from` to `to`.
#[must_use]
pub const fn forward_delta(from: ClockTime, to: ClockTime) -> u16 {
    (to.minutes_of_half_day() + MINUTES_PER_LAP - from.minutes_of_half_day()) % MINUTES_PER_LAP
}

/// Errors raised while building or parsing a [`ClockTime`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TimeError {
    /// Input did not match `H:MM` / `HH:MM`.
    Syntax,
    /// Hour outside the accepted range.
    HourOutOfRange(u8),
    /// Minute outside `0..=59`.
    MinuteOutOfRange(u8),
}

impl fmt::Display for TimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeError::Syntax => f.write_str("expected H:MM or HH:MM"),
            TimeError::HourOutOfRange(hour) => write!(f, "hour {hour} out of range"),
            TimeError::MinuteOutOfRange(minute) => write!(f, "minute {minute} out of range"),
        }
    }
}

/// Position of the hands on the face.
///
/// The hour is always stored normalized to `1..=12`, so every value maps to
/// exactly one minute of the lap and equality means "same hand position".
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ClockTime {
    hour: u8,
    minute: u8,
}

impl ClockTime {
    /// Twelve o'clock, the origin of the lap.
    pub const TWELVE: Self = Self {
        hour: 12,
        minute: 0,
    };

    /// Builds a time from an hour in `0..=23` and a minute in `0..=59`.
    ///
    /// Hours past 12 are folded onto the face, so wall-clock readings can be
    /// passed straight through.
    pub const fn new(hour: u8, minute: u8) -> Result<Self, TimeError> {
        if hour > 23 {
            return Err(TimeError::HourOutOfRange(hour));
        }
        if minute >= 60 {
            return Err(TimeError::MinuteOutOfRange(minute));
        }
        Ok(Self {
            hour: normalize_hour(hour),
            minute,
        })
    }

    /// Rebuilds a time from its position within the lap (taken modulo one lap).
    #[must_use]
    pub const fn from_minutes_of_half_day(minutes: u16) -> Self {
        let minutes = minutes % MINUTES_PER_LAP;
        Self {
            hour: normalize_hour((minutes / MINUTES_PER_HOUR) as u8),
            minute: (minutes % MINUTES_PER_HOUR) as u8,
        }
    }

    /// Hour on the face, `1..=12`.
    #[must_use]
    pub const fn hour(self) -> u8 {
        self.hour
    }

    #[must_use]
    pub const fn minute(self) -> u8 {
        self.minute
    }

    /// Position within the lap, `0..MINUTES_PER_LAP` (12:00 is 0).
    #[must_use]
    pub const fn minutes_of_half_day(self) -> u16 {
        to_minutes_of_half_day(self.hour, self.minute)
    }

    /// Moves the hands forward by `minutes`, wrapping around the lap.
    #[must_use]
    pub const fn advance(self, minutes: u16) -> Self {
        Self::from_minutes_of_half_day(self.minutes_of_half_day() + minutes % MINUTES_PER_LAP)
    }

    /// One minute later; 12:59 becomes 1:00.
    #[must_use]
    pub const fn next_minute(self) -> Self {
        self.advance(1)
    }

    /// One hour later with the same minute; 12:xx becomes 1:xx.
    #[must_use]
    pub const fn next_hour(self) -> Self {
        self.advance(MINUTES_PER_HOUR)
    }

    /// Forward steps needed to reach `target` from `self`.
    #[must_use]
    pub const fn forward_delta_to(self, target: Self) -> u16 {
        forward_delta(self, target)
    }

    /// Parses a strict 12-hour `H:MM` / `HH:MM` string (hour 1–12, minute 00–59).
    pub fn parse(text: &str) -> Result<Self, TimeError> {
        let (hour, minute) = hour_minute_fields(text)?;
        if !(1..=12).contains(&hour) {
            return Err(TimeError::HourOutOfRange(hour));
        }
        Self::new(hour, minute)
    }

    /// Parses `H:MM` / `HH:MM` with hours in `0..=23`, folding them onto the face.
    ///
    /// Used for persisted state, which may contain `00:00`.
    pub fn parse_normalized(text: &str) -> Result<Self, TimeError> {
        let (hour, minute) = hour_minute_fields(text)?;
        Self::new(hour, minute)
    }

    /// Renders the canonical zero-padded `HH:MM` form without allocating.
    #[must_use]
    pub fn to_hhmm(self) -> String<HHMM_LEN> {
        let mut rendered = String::new();
        // Two zero-padded fields and a colon always fit.
        let _ = write!(rendered, "{self}");
        rendered
    }
}

impl Default for ClockTime {
    fn default() -> Self {
        Self::TWELVE
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for ClockTime {
    type Err = TimeError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::parse(text)
    }
}

fn hour_minute_fields(text: &str) -> Result<(u8, u8), TimeError> {
    let mut input = text;
    let (hour, minute) = hour_minute(&mut input).map_err(|_| TimeError::Syntax)?;
    if minute >= 60 {
        return Err(TimeError::MinuteOutOfRange(minute));
    }
    Ok((hour, minute))
}

fn hour_minute(input: &mut &str) -> Result<(u8, u8), ErrMode<()>> {
    (
        take_while(1..=2, |c: char| c.is_ascii_digit()).parse_to::<u8>(),
        ':',
        take_while(2, |c: char| c.is_ascii_digit()).parse_to::<u8>(),
        eof,
    )
        .map(|(hour, _, minute, _)| (hour, minute))
        .parse_next(input)
}
