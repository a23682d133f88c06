//! Reply shapes
//!
//! The firmware overloads the length of a reply: nothing means failure,
//! one character is the expected answer for status queries, and more than
//! one character is a distinct signal for some commands (a name instead of a
//! flag, an error text instead of a digit). [`Reply`] keeps the three cases
//! apart instead of handing out a raw byte count.

use super::{Failure, Frame};

/// Outcome of a text query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Nothing usable came back
    Failure(Failure),
    /// Exactly one character
    Exact(String),
    /// More than one character
    Overlong(String),
}

impl Reply {
    /// Classify a complete frame by its payload length
    pub fn from_frame(frame: &Frame) -> Self {
        match frame.len() {
            0 => Reply::Failure(Failure::Empty),
            1 => Reply::Exact(frame.text()),
            _ => Reply::Overlong(frame.text()),
        }
    }

    /// Historic count convention: failure code (<= 0), 1, or the length
    pub fn count(&self) -> i32 {
        match self {
            Reply::Failure(failure) => failure.code(),
            Reply::Exact(_) => 1,
            Reply::Overlong(text) => text.chars().count() as i32,
        }
    }

    /// Decoded text, if any
    pub fn text(&self) -> Option<&str> {
        match self {
            Reply::Failure(_) => None,
            Reply::Exact(text) | Reply::Overlong(text) => Some(text),
        }
    }

    /// Consume into the decoded text
    pub fn into_text(self) -> Option<String> {
        match self {
            Reply::Failure(_) => None,
            Reply::Exact(text) | Reply::Overlong(text) => Some(text),
        }
    }

    /// The failure, if this is one
    pub fn failure(&self) -> Option<Failure> {
        match self {
            Reply::Failure(failure) => Some(*failure),
            _ => None,
        }
    }

    /// Whether any text came back
    pub fn is_success(&self) -> bool {
        !matches!(self, Reply::Failure(_))
    }
}

impl From<Failure> for Reply {
    fn from(failure: Failure) -> Self {
        Reply::Failure(failure)
    }
}

/// A decoded number together with the text it came from
///
/// `count` is the number of payload bytes read and is the success signal;
/// a zero `value` is a perfectly good reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Numeric<T> {
    /// Parsed value
    pub value: T,
    /// Reply text, sentinel stripped
    pub raw: String,
    /// Payload bytes read
    pub count: usize,
}

/// Parse an integer reply, ignoring surrounding whitespace
pub fn parse_int(text: &str) -> Option<i64> {
    text.trim().parse::<i64>().ok()
}

/// Parse a floating-point reply, ignoring surrounding whitespace
///
/// Independent of process locale: `.` is always the decimal separator.
pub fn parse_double(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok()
}

/// Parse the longest leading decimal number, e.g. `10.30` from `10.30g`
pub fn leading_number(text: &str) -> Option<f64> {
    let text = text.trim_start();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    for (i, c) in text.char_indices() {
        match c {
            '+' | '-' if i == 0 => {}
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end = i + c.len_utf8();
    }
    if !seen_digit {
        return None;
    }
    text[..end].trim_end_matches('.').parse().ok()
}
