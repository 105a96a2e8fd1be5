// Segments: short generated sub-sequences, and the bank that holds them.
//
// A `Segment` is a run of symbols with positionally aligned durations,
// tagged with the source it was generated from and its ordinal within that
// source's bank. Construction validates it: a segment is never empty, its
// two sequences always have the same length, and every duration is positive
// and finite. composer.rs relies on all three (it indexes modulo the length
// and pairs symbols with durations blindly).
//
// After construction the only mutations are the post-processing passes
// (`prune`, `quantize`), which keep both invariants.
//
// A `SegmentBank` is the ordered set of segments generated from one source,
// with the source's key label. session.rs builds banks; store.rs persists
// them; composer.rs binds them to grammar letters.

use crate::error::SegmentError;
use crate::key::KeyLabel;
use crate::post;
use crate::symbol::Symbol;

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    source: String,
    ordinal: usize,
    symbols: Vec<Symbol>,
    durations: Vec<f64>,
    key: Option<KeyLabel>,
}

impl Segment {
    pub fn new(
        source: impl Into<String>,
        ordinal: usize,
        symbols: Vec<Symbol>,
        durations: Vec<f64>,
    ) -> Result<Self, SegmentError> {
        let source = source.into();
        if symbols.is_empty() {
            return Err(SegmentError::Degenerate {
                source_name: source,
                ordinal,
            });
        }
        if symbols.len() != durations.len() {
            return Err(SegmentError::LengthMismatch {
                source_name: source,
                ordinal,
                symbols: symbols.len(),
                durations: durations.len(),
            });
        }
        if let Some((index, &value)) = durations
            .iter()
            .enumerate()
            .find(|&(_, d)| !d.is_finite() || *d <= 0.0)
        {
            return Err(SegmentError::InvalidDuration {
                source_name: source,
                ordinal,
                index,
                value,
            });
        }
        Ok(Segment {
            source,
            ordinal,
            symbols,
            durations,
            key: None,
        })
    }

    pub fn with_key(mut self, key: Option<KeyLabel>) -> Self {
        self.key = key;
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn durations(&self) -> &[f64] {
        &self.durations
    }

    pub fn key(&self) -> Option<KeyLabel> {
        self.key
    }

    /// Number of events; never zero.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Always false; segments are validated non-empty.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// The event at `index`, wrapping past the end.
    pub fn event(&self, index: usize) -> (&Symbol, f64) {
        let i = index % self.symbols.len();
        (&self.symbols[i], self.durations[i])
    }

    /// Smooth melodic outliers. Returns the number of replaced symbols.
    pub fn prune(&mut self) -> usize {
        post::prune(&mut self.symbols)
    }

    /// Clip durations to bar lines.
    pub fn quantize(&mut self) {
        post::quantize(&mut self.durations);
    }

    pub fn into_parts(self) -> (Vec<Symbol>, Vec<f64>) {
        (self.symbols, self.durations)
    }
}

/// Segments generated from one source, in generation order.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentBank {
    source: String,
    key: Option<KeyLabel>,
    segments: Vec<Segment>,
}

impl SegmentBank {
    pub fn new(source: impl Into<String>, key: Option<KeyLabel>) -> Self {
        SegmentBank {
            source: source.into(),
            key,
            segments: Vec::new(),
        }
    }

    /// Append a segment, stamping it with the bank's key.
    pub fn push(&mut self, segment: Segment) {
        self.segments.push(segment.with_key(self.key));
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn key(&self) -> Option<KeyLabel> {
        self.key
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segments_mut(&mut self) -> &mut [Segment] {
        &mut self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Segment> {
        self.segments.iter()
    }
}

impl<'a> IntoIterator for &'a SegmentBank {
    type Item = &'a Segment;
    type IntoIter = std::slice::Iter<'a, Segment>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyMode;

    fn syms(text: &[&str]) -> Vec<Symbol> {
        text.iter().map(|&s| Symbol::from(s)).collect()
    }

    #[test]
    fn test_new_valid() {
        let seg = Segment::new("song.mid", 2, syms(&["C4", "D4"]), vec![1.0, 0.5]).unwrap();
        assert_eq!(seg.len(), 2);
        assert_eq!(seg.source(), "song.mid");
        assert_eq!(seg.ordinal(), 2);
        assert_eq!(seg.key(), None);
        assert!(!seg.is_empty());
    }

    #[test]
    fn test_new_rejects_empty() {
        assert_eq!(
            Segment::new("x", 0, vec![], vec![]),
            Err(SegmentError::Degenerate {
                source_name: "x".to_string(),
                ordinal: 0
            })
        );
    }

    #[test]
    fn test_new_rejects_mismatch() {
        let err = Segment::new("x", 1, syms(&["C4", "D4"]), vec![1.0]).unwrap_err();
        assert!(matches!(
            err,
            SegmentError::LengthMismatch {
                symbols: 2,
                durations: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_new_rejects_bad_duration() {
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = Segment::new("x", 3, syms(&["C4", "D4"]), vec![1.0, bad]).unwrap_err();
            assert!(
                matches!(err, SegmentError::InvalidDuration { index: 1, .. }),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_event_wraps() {
        let seg = Segment::new("x", 0, syms(&["C4", "D4", "E4"]), vec![1.0, 2.0, 3.0]).unwrap();
        assert_eq!(seg.event(0).0.as_str(), "C4");
        assert_eq!(seg.event(4), (&Symbol::from("D4"), 2.0));
        assert_eq!(seg.event(300).0.as_str(), "C4");
    }

    #[test]
    fn test_post_processing_keeps_alignment() {
        let mut seg = Segment::new(
            "x",
            0,
            syms(&["C4", "D4", "C4", "D4", "C4", "D4", "C4", "D4", "C7"]),
            vec![3.0, 3.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0],
        )
        .unwrap();
        assert_eq!(seg.prune(), 1);
        seg.quantize();
        assert_eq!(seg.durations()[1], 1.0);
        assert_eq!(seg.symbols().len(), seg.durations().len());
    }

    #[test]
    fn test_bank_stamps_key() {
        let key = Some(KeyLabel::new(2, KeyMode::Minor));
        let mut bank = SegmentBank::new("song.mid", key);
        bank.push(Segment::new("song.mid", 0, syms(&["D4"]), vec![1.0]).unwrap());
        bank.push(Segment::new("song.mid", 1, syms(&["F4"]), vec![1.0]).unwrap());
        assert_eq!(bank.len(), 2);
        assert!(bank.iter().all(|s| s.key() == key));
        assert_eq!((&bank).into_iter().count(), 2);
    }
}
