// Segment composition: bind segments to grammar letters and stitch them.
//
// `SegmentComposer::assign()` gives each segment of a bank its own letter,
// in bank order, from an explicit ordered `LetterPool` (default a..z). The
// pool has a capacity; a bank larger than it is rejected up front with
// `AlphabetOverflow`, before any letter is bound.
//
// `compose()` walks an expanded grammar string. Every character bound in
// the `SegmentMap` emits the next `STRIDE` events of its segment, starting
// at that letter's cursor and wrapping modulo the segment length, then
// advances the cursor by `STRIDE`. Unbound characters (bracket punctuation,
// letters the grammar introduced but no segment owns) emit nothing.
//
// Cursors are a private value of one `compose()` call: every call starts
// all cursors at zero, and nothing outlives it. Segments are never empty
// (segment.rs), so every flush emits exactly `STRIDE` aligned pairs.
//
// The output `Composition` is the hand-off format for external renderers.

use crate::error::{ComposeError, CompositionError};
use crate::post;
use crate::segment::Segment;
use crate::symbol::Symbol;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Events emitted per occurrence of a bound letter.
pub const STRIDE: usize = 4;

/// Letters used when no pool is configured.
pub const DEFAULT_LETTERS: &str = "abcdefghijklmnopqrstuvwxyz";

/// Ordered letters available for binding, truncated to a capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LetterPool {
    letters: Vec<char>,
}

impl LetterPool {
    /// Build a pool from `letters` in order. Duplicates and bracket
    /// characters are dropped; at most `capacity` letters are kept.
    pub fn new(letters: impl IntoIterator<Item = char>, capacity: usize) -> Self {
        let mut pool: Vec<char> = Vec::new();
        for c in letters {
            if !matches!(c, '[' | ']' | '(' | ')') && !c.is_whitespace() && !pool.contains(&c) {
                pool.push(c);
            }
        }
        pool.truncate(capacity);
        LetterPool { letters: pool }
    }

    pub fn letters(&self) -> &[char] {
        &self.letters
    }

    pub fn capacity(&self) -> usize {
        self.letters.len()
    }
}

impl Default for LetterPool {
    fn default() -> Self {
        LetterPool::new(DEFAULT_LETTERS.chars(), DEFAULT_LETTERS.len())
    }
}

/// Letter -> segment bindings produced by [`SegmentComposer::assign`].
#[derive(Debug, Clone)]
pub struct SegmentMap<'a> {
    letters: Vec<char>,
    segments: Vec<&'a Segment>,
    slots: BTreeMap<char, usize>,
}

impl<'a> SegmentMap<'a> {
    /// Bound letters in binding order.
    pub fn letters(&self) -> &[char] {
        &self.letters
    }

    pub fn get(&self, letter: char) -> Option<&'a Segment> {
        self.slots.get(&letter).map(|&slot| self.segments[slot])
    }

    /// All bound letters concatenated, the natural axiom for a grammar
    /// over this map.
    pub fn axiom(&self) -> String {
        self.letters.iter().collect()
    }

    pub fn len(&self) -> usize {
        self.letters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.letters.is_empty()
    }
}

/// Per-letter read offsets for one composition pass.
struct Cursors {
    offsets: Vec<usize>,
}

impl Cursors {
    fn new(slots: usize) -> Self {
        Cursors {
            offsets: vec![0; slots],
        }
    }

    /// Current offset for `slot`, then advance it by `STRIDE` (kept reduced
    /// modulo `len`, which yields the same reads).
    fn advance(&mut self, slot: usize, len: usize) -> usize {
        let start = self.offsets[slot];
        self.offsets[slot] = (start + STRIDE) % len;
        start
    }
}

#[derive(Debug, Clone, Default)]
pub struct SegmentComposer {
    pool: LetterPool,
}

impl SegmentComposer {
    pub fn new(pool: LetterPool) -> Self {
        SegmentComposer { pool }
    }

    pub fn pool(&self) -> &LetterPool {
        &self.pool
    }

    /// Bind one letter per segment, in order.
    pub fn assign<'a>(&self, segments: &'a [Segment]) -> Result<SegmentMap<'a>, ComposeError> {
        let capacity = self.pool.capacity();
        if segments.len() > capacity {
            return Err(ComposeError::AlphabetOverflow {
                segments: segments.len(),
                capacity,
            });
        }
        let letters: Vec<char> = self.pool.letters()[..segments.len()].to_vec();
        let slots = letters.iter().enumerate().map(|(i, &c)| (c, i)).collect();
        Ok(SegmentMap {
            letters,
            segments: segments.iter().collect(),
            slots,
        })
    }

    /// Stitch segments together in the order given by `melody`.
    pub fn compose(&self, melody: &str, map: &SegmentMap<'_>) -> Composition {
        let mut cursors = Cursors::new(map.len());
        let mut out = Composition::default();
        for c in melody.chars() {
            let Some(&slot) = map.slots.get(&c) else {
                continue;
            };
            let segment = map.segments[slot];
            let start = cursors.advance(slot, segment.len());
            for i in start..start + STRIDE {
                let (symbol, duration) = segment.event(i);
                out.push(symbol.clone(), duration);
            }
        }
        out
    }
}

/// An assembled sequence of aligned (symbol, duration) events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CompositionData")]
pub struct Composition {
    symbols: Vec<Symbol>,
    durations: Vec<f64>,
}

#[derive(Deserialize)]
struct CompositionData {
    symbols: Vec<Symbol>,
    durations: Vec<f64>,
}

impl TryFrom<CompositionData> for Composition {
    type Error = CompositionError;

    fn try_from(data: CompositionData) -> Result<Self, Self::Error> {
        Composition::new(data.symbols, data.durations)
    }
}

impl Composition {
    /// Pair symbols with durations. The lists must be the same length and
    /// every duration positive and finite.
    pub fn new(symbols: Vec<Symbol>, durations: Vec<f64>) -> Result<Self, CompositionError> {
        if symbols.len() != durations.len() {
            return Err(CompositionError::LengthMismatch {
                symbols: symbols.len(),
                durations: durations.len(),
            });
        }
        if let Some((index, &value)) = durations
            .iter()
            .enumerate()
            .find(|&(_, d)| !d.is_finite() || *d <= 0.0)
        {
            return Err(CompositionError::InvalidDuration { index, value });
        }
        Ok(Composition { symbols, durations })
    }

    pub fn push(&mut self, symbol: Symbol, duration: f64) {
        self.symbols.push(symbol);
        self.durations.push(duration);
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn durations(&self) -> &[f64] {
        &self.durations
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn events(&self) -> impl Iterator<Item = (&Symbol, f64)> {
        self.symbols.iter().zip(self.durations.iter().copied())
    }

    /// Smooth melodic outliers. Returns the number of replaced symbols.
    pub fn prune(&mut self) -> usize {
        post::prune(&mut self.symbols)
    }

    /// Clip durations to bar lines.
    pub fn quantize(&mut self) {
        post::quantize(&mut self.durations);
    }
}
