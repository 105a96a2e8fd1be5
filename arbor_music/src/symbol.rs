// Symbols: the opaque tokens every generator in the crate operates on.
//
// A symbol is one event at one position: a single pitch name ("C#4",
// "E-4"), several simultaneous pitches joined by spaces ("C4 E4 G4"), or the
// rest tag. The Markov model, grammar and composer never look inside a
// symbol; they only compare and clone it. Cloning is a refcount bump.
//
// The only interpretation the crate performs is the pitch-number proxy used
// by post.rs (outlier pruning) and the pitch-class histogram in key.rs.
// Parsing accepts music21-style names: letter, accidentals ('#', '-' or 'b'
// for flat), optional octave (default 4). Anything else has no proxy and is
// skipped by those passes, never rejected.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// Tag used for silent events.
pub const REST: &str = "rest";

/// An immutable, comparable event token.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(Arc<str>);

impl Symbol {
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Symbol(text.into())
    }

    /// The distinguished rest symbol.
    pub fn rest() -> Self {
        Symbol::new(REST)
    }

    /// Build a pitch-set symbol from MIDI numbers, e.g. `[60, 64]` -> "C4 E4".
    pub fn from_pitches(pitches: &[u8]) -> Self {
        let names: Vec<String> = pitches.iter().map(|&p| pitch_name(p)).collect();
        Symbol::new(names.join(" "))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_rest(&self) -> bool {
        &*self.0 == REST
    }

    /// MIDI numbers of every constituent pitch. `None` for rests and for
    /// symbols with any part that does not parse as a pitch.
    pub fn pitches(&self) -> Option<Vec<u8>> {
        if self.is_rest() {
            return None;
        }
        let pitches: Option<Vec<u8>> = self.0.split_whitespace().map(parse_pitch).collect();
        pitches.filter(|p| !p.is_empty())
    }

    /// Mean pitch number of the symbol, used as a melodic-contour proxy.
    pub fn pitch_proxy(&self) -> Option<f64> {
        let pitches = self.pitches()?;
        let sum: f64 = pitches.iter().map(|&p| p as f64).sum();
        Some(sum / pitches.len() as f64)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(text: &str) -> Self {
        Symbol::new(text)
    }
}

impl From<String> for Symbol {
    fn from(text: String) -> Self {
        Symbol::new(text)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Pitch-class names used when formatting pitches, music21 spelling.
pub const PITCH_CLASS_NAMES: [&str; 12] = [
    "C", "C#", "D", "E-", "E", "F", "F#", "G", "G#", "A", "B-", "B",
];

/// Parse a single pitch name into a MIDI number.
///
/// Examples: "C4" -> 60, "C#4" -> 61, "E-4" -> 63, "Bb3" -> 58, "A" -> 69.
pub fn parse_pitch(name: &str) -> Option<u8> {
    let mut chars = name.chars().peekable();
    let base: i32 = match chars.next()?.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };

    let mut accidental = 0i32;
    while let Some(&c) = chars.peek() {
        match c {
            '#' => accidental += 1,
            '-' | 'b' => accidental -= 1,
            _ => break,
        }
        chars.next();
    }

    let rest: String = chars.collect();
    let octave: i32 = if rest.is_empty() {
        4
    } else if rest.chars().all(|c| c.is_ascii_digit()) {
        rest.parse().ok()?
    } else {
        return None;
    };

    let midi = (octave + 1) * 12 + base + accidental;
    u8::try_from(midi).ok().filter(|&m| m <= 127)
}

/// Format a MIDI number as a pitch name ("C4", "F#3", "B-2").
pub fn pitch_name(pitch: u8) -> String {
    let octave = pitch as i32 / 12 - 1;
    format!("{}{}", PITCH_CLASS_NAMES[(pitch % 12) as usize], octave)
}
