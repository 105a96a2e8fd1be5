// Tonal key estimation (Krumhansl-Schmuckler).
//
// A duration-weighted pitch-class histogram of the input is correlated
// (Pearson) with the Krumhansl-Kessler major and minor key profiles rotated
// to each of the 12 tonics. The best-correlated of the 24 candidates is the
// label. Ties keep the first candidate in major-then-minor, C-upward order.
//
// Labels print music21-style: "C major", "f# minor", "E- major" (minor
// tonics lower-case, '-' for flat) and parse back from the same text, which
// is how store.rs persists them.
//
// The label is descriptive metadata for a segment bank. Nothing in the
// generator depends on it.

use crate::error::KeyParseError;
use crate::symbol::{PITCH_CLASS_NAMES, Symbol, parse_pitch};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MAJOR_PROFILE: [f64; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];

const MINOR_PROFILE: [f64; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyMode {
    Major,
    Minor,
}

/// A tonic pitch class (0 = C) plus mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct KeyLabel {
    pub tonic: u8,
    pub mode: KeyMode,
}

impl KeyLabel {
    pub fn new(tonic: u8, mode: KeyMode) -> Self {
        KeyLabel {
            tonic: tonic % 12,
            mode,
        }
    }
}

impl fmt::Display for KeyLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = PITCH_CLASS_NAMES[self.tonic as usize % 12];
        match self.mode {
            KeyMode::Major => write!(f, "{name} major"),
            KeyMode::Minor => write!(f, "{} minor", name.to_lowercase()),
        }
    }
}

impl FromStr for KeyLabel {
    type Err = KeyParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let err = || KeyParseError(text.to_string());
        let mut parts = text.split_whitespace();
        let (Some(tonic), Some(mode), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(err());
        };
        let mode = match mode.to_ascii_lowercase().as_str() {
            "major" => KeyMode::Major,
            "minor" => KeyMode::Minor,
            _ => return Err(err()),
        };
        // Only a bare pitch name is a tonic; an octave digit is not allowed.
        if tonic.chars().any(|c| c.is_ascii_digit()) {
            return Err(err());
        }
        let pitch = parse_pitch(tonic).ok_or_else(err)?;
        Ok(KeyLabel::new(pitch % 12, mode))
    }
}

impl From<KeyLabel> for String {
    fn from(label: KeyLabel) -> Self {
        label.to_string()
    }
}

impl TryFrom<String> for KeyLabel {
    type Error = KeyParseError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        text.parse()
    }
}

/// Estimate the key of a symbol sequence, weighting each pitch by the
/// duration of its event. `None` when nothing parses as a pitch.
///
/// `durations` is matched positionally; missing entries weigh 1.
pub fn estimate_key(symbols: &[Symbol], durations: &[f64]) -> Option<KeyLabel> {
    let mut histogram = [0.0f64; 12];
    let mut total = 0.0;
    for (i, symbol) in symbols.iter().enumerate() {
        let Some(pitches) = symbol.pitches() else {
            continue;
        };
        let weight = durations
            .get(i)
            .copied()
            .filter(|d| d.is_finite() && *d > 0.0)
            .unwrap_or(1.0);
        for pitch in pitches {
            histogram[(pitch % 12) as usize] += weight;
            total += weight;
        }
    }
    if total <= 0.0 {
        return None;
    }

    let mut best: Option<(f64, KeyLabel)> = None;
    for (mode, profile) in [
        (KeyMode::Major, &MAJOR_PROFILE),
        (KeyMode::Minor, &MINOR_PROFILE),
    ] {
        for tonic in 0..12u8 {
            let rotated: [f64; 12] =
                std::array::from_fn(|pc| profile[(pc + 12 - tonic as usize) % 12]);
            let r = correlation(&histogram, &rotated);
            if best.is_none_or(|(score, _)| r > score) {
                best = Some((r, KeyLabel::new(tonic, mode)));
            }
        }
    }
    best.map(|(_, label)| label)
}

fn correlation(x: &[f64; 12], y: &[f64; 12]) -> f64 {
    let mx = x.iter().sum::<f64>() / 12.0;
    let my = y.iter().sum::<f64>() / 12.0;
    let mut num = 0.0;
    let mut sx = 0.0;
    let mut sy = 0.0;
    for (a, b) in x.iter().zip(y) {
        num += (a - mx) * (b - my);
        sx += (a - mx).powi(2);
        sy += (b - my).powi(2);
    }
    let den = (sx * sy).sqrt();
    if den > 0.0 { num / den } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(text: &[&str]) -> Vec<Symbol> {
        text.iter().map(|&s| Symbol::from(s)).collect()
    }

    #[test]
    fn test_c_major_scale() {
        let symbols = seq(&["C4", "D4", "E4", "F4", "G4", "A4", "B4", "C5"]);
        let durations = [2.0, 1.0, 1.5, 1.0, 2.0, 1.0, 0.5, 1.0];
        let key = estimate_key(&symbols, &durations).unwrap();
        assert_eq!(key, KeyLabel::new(0, KeyMode::Major));
        assert_eq!(key.to_string(), "C major");
    }

    #[test]
    fn test_a_minor() {
        let symbols = seq(&["A4", "C5", "E5", "B4", "D5", "G#4"]);
        let durations = [4.0, 2.0, 3.0, 1.0, 1.0, 1.0];
        let key = estimate_key(&symbols, &durations).unwrap();
        assert_eq!(key.to_string(), "a minor");
    }

    #[test]
    fn test_chords_and_rests() {
        // G major triad plus a D-F# dyad; rests carry no weight.
        let symbols = seq(&["G4 B4 D5", "rest", "D4 F#4", "A4", "G3"]);
        let durations = [3.0, 8.0, 2.0, 1.0, 1.0];
        assert_eq!(
            estimate_key(&symbols, &durations),
            Some(KeyLabel::new(7, KeyMode::Major))
        );
    }

    #[test]
    fn test_no_pitches() {
        assert_eq!(estimate_key(&seq(&["rest", "bogus"]), &[1.0, 1.0]), None);
        assert_eq!(estimate_key(&[], &[]), None);
    }

    #[test]
    fn test_label_text_roundtrip() {
        for tonic in 0..12 {
            for mode in [KeyMode::Major, KeyMode::Minor] {
                let label = KeyLabel::new(tonic, mode);
                assert_eq!(label.to_string().parse::<KeyLabel>().unwrap(), label);
            }
        }
        assert_eq!(
            "Bb major".parse::<KeyLabel>().unwrap(),
            KeyLabel::new(10, KeyMode::Major)
        );
    }

    #[test]
    fn test_label_rejects_garbage() {
        assert!("".parse::<KeyLabel>().is_err());
        assert!("C".parse::<KeyLabel>().is_err());
        assert!("C lydian".parse::<KeyLabel>().is_err());
        assert!("C4 major".parse::<KeyLabel>().is_err());
        assert!("C major extra".parse::<KeyLabel>().is_err());
    }

    #[test]
    fn test_label_serializes_as_text() {
        let json = serde_json::to_string(&KeyLabel::new(1, KeyMode::Minor)).unwrap();
        assert_eq!(json, "\"c# minor\"");
        let back: KeyLabel = serde_json::from_str(&json).unwrap();
        assert_eq!(back, KeyLabel::new(1, KeyMode::Minor));
    }
}
