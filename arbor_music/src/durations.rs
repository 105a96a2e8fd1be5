// Durations: grammar-derived lengths and discrete duration states.
//
// `map_lengths()` turns an expanded grammar string into note lengths. Runs
// of the same character become one duration; the run grows by
// `unit_length * m` per repeat, where the multiplier `m` is a structural
// hint read from the character pair at each step: `[` as the current
// character or `(` as the previous one sets it to 2, `]` current or `)`
// previous sets it to 3. `m` only changes on those characters and is never
// reset, so it carries across runs. This is adjacency, not nesting depth.
//
// `DurationKey` quantizes a duration to integer ticks so durations can be
// learned and sampled by the same `TransitionTable` machinery as pitches
// (markov.rs needs `Ord` states; floats are not).

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Ticks per quarter note used by [`DurationKey`].
pub const TICKS_PER_QUARTER: u32 = 480;

/// Durations for the runs of `expanded`, in input order.
///
/// `map_lengths("aab", 1.0)` is `[2.0, 1.0]`. Empty input gives nothing; a
/// single character gives `[unit_length]`.
pub fn map_lengths(expanded: &str, unit_length: f64) -> Vec<f64> {
    let chars: Vec<char> = expanded.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let mut durations = Vec::new();
    let mut length = unit_length;
    let mut multiplier = 1.0;
    for pair in chars.windows(2) {
        let (prev, curr) = (pair[0], pair[1]);
        if curr == '[' || prev == '(' {
            multiplier = 2.0;
        } else if curr == ']' || prev == ')' {
            multiplier = 3.0;
        }

        if curr == prev {
            length += unit_length * multiplier;
        } else {
            if length > 0.0 {
                durations.push(length);
            }
            length = unit_length;
        }
    }
    if length > 0.0 {
        durations.push(length);
    }
    durations
}

/// A duration as a whole number of ticks, usable as a Markov state.
///
/// Serialized as the bare tick count; a zero count is rejected on load.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct DurationKey(u32);

/// A stored duration state of zero ticks.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("duration key must be at least one tick")]
pub struct ZeroTicks;

impl DurationKey {
    /// Quantize a length in quarter notes. `None` for non-positive or
    /// non-finite input. Positive lengths shorter than half a tick round up
    /// to one tick so a key is never zero.
    pub fn from_beats(beats: f64) -> Option<Self> {
        if !beats.is_finite() || beats <= 0.0 {
            return None;
        }
        let ticks = (beats * TICKS_PER_QUARTER as f64).round().max(1.0);
        if ticks > u32::MAX as f64 {
            return None;
        }
        Some(DurationKey(ticks as u32))
    }

    pub fn from_ticks(ticks: u32) -> Option<Self> {
        (ticks > 0).then_some(DurationKey(ticks))
    }

    pub fn ticks(self) -> u32 {
        self.0
    }

    /// Length in quarter notes.
    pub fn beats(self) -> f64 {
        self.0 as f64 / TICKS_PER_QUARTER as f64
    }
}

impl TryFrom<u32> for DurationKey {
    type Error = ZeroTicks;

    fn try_from(ticks: u32) -> Result<Self, Self::Error> {
        DurationKey::from_ticks(ticks).ok_or(ZeroTicks)
    }
}

impl From<DurationKey> for u32 {
    fn from(key: DurationKey) -> u32 {
        key.0
    }
}

impl fmt::Display for DurationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.beats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_lengths_runs() {
        assert_eq!(map_lengths("aab", 1.0), vec![2.0, 1.0]);
        assert_eq!(map_lengths("abc", 0.5), vec![0.5, 0.5, 0.5]);
        assert_eq!(map_lengths("aaa", 0.5), vec![1.5]);
    }

    #[test]
    fn test_map_lengths_edges() {
        assert!(map_lengths("", 1.0).is_empty());
        assert_eq!(map_lengths("a", 0.25), vec![0.25]);
    }

    #[test]
    fn test_map_lengths_open_bracket_doubles() {
        // "[[": the second '[' is current, so m = 2 for the repeat.
        assert_eq!(map_lengths("a[[", 1.0), vec![1.0, 3.0]);
    }

    #[test]
    fn test_map_lengths_close_bracket_triples() {
        assert_eq!(map_lengths("a]]", 1.0), vec![1.0, 4.0]);
    }

    #[test]
    fn test_map_lengths_multiplier_persists() {
        // '(' as previous sets m = 2; it stays 2 for the later "bb" run.
        assert_eq!(map_lengths("(abb", 1.0), vec![1.0, 1.0, 3.0]);
        // ')' as previous sets m = 3.
        assert_eq!(map_lengths(")aa", 1.0), vec![1.0, 4.0]);
    }

    #[test]
    fn test_map_lengths_all_positive() {
        let durations = map_lengths("bb[b[a]b(a)a]bb(b[a]b(a)a)b[a]b(a)a", 0.33);
        assert!(!durations.is_empty());
        assert!(durations.iter().all(|&d| d > 0.0));
    }

    #[test]
    fn test_duration_key_from_beats() {
        assert_eq!(DurationKey::from_beats(1.0).unwrap().ticks(), 480);
        assert_eq!(DurationKey::from_beats(0.5).unwrap().beats(), 0.5);
        assert_eq!(DurationKey::from_beats(1.0 / 3.0).unwrap().ticks(), 160);
        assert_eq!(DurationKey::from_beats(1e-9).unwrap().ticks(), 1);
        assert_eq!(DurationKey::from_beats(0.0), None);
        assert_eq!(DurationKey::from_beats(-1.0), None);
        assert_eq!(DurationKey::from_beats(f64::NAN), None);
        assert_eq!(DurationKey::from_beats(f64::INFINITY), None);
    }

    #[test]
    fn test_duration_key_orders_by_length() {
        let short = DurationKey::from_beats(0.25).unwrap();
        let long = DurationKey::from_beats(2.0).unwrap();
        assert!(short < long);
        assert_eq!(DurationKey::from_ticks(0), None);
        assert_eq!(long.to_string(), "2");
    }

    #[test]
    fn test_duration_key_json() {
        let key: DurationKey = serde_json::from_str("240").unwrap();
        assert_eq!(key.beats(), 0.5);
        assert_eq!(serde_json::to_string(&key).unwrap(), "240");

        let err = serde_json::from_str::<DurationKey>("0").unwrap_err();
        assert!(err.to_string().contains("at least one tick"), "{err}");
        assert!(serde_json::from_str::<Vec<DurationKey>>("[480, 0]").is_err());
    }
}
