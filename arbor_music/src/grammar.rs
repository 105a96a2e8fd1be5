// L-system grammar: parallel string rewriting for macro-structure.
//
// A grammar maps single letters to replacement strings. One generation
// rebuilds the whole string from the previous one, replacing every letter
// that has a rule and copying everything else through unchanged (bracket
// punctuation `[ ] ( )` normally has no rule and so survives as structure).
// Replacements made within one generation never feed each other.
//
// Expansion is an explicit generation loop. Before each round the exact
// output size is computed so the new string is allocated once; total cost is
// linear in the sum of all intermediate lengths. `expanded_len()` predicts
// the final length without building anything, which lets callers enforce a
// size cap before committing to a large expansion.
//
// Grammars come from three places: named presets (`Grammar::preset`), text
// such as "a=ab, b=a" (`Grammar::parse`), or random productions over a
// letter set (`Grammar::random`) shaped by `RuleShape` from config.rs.
//
// Consumed by durations.rs (bracket-structured duration strings) and
// session.rs (segment ordering for composer.rs).

use crate::config::RuleShape;
use crate::error::GrammarError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Names accepted by [`Grammar::preset`].
pub const PRESETS: [&str; 4] = ["branching", "triadic", "nested", "crown"];

/// Letter -> replacement rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Grammar {
    rules: BTreeMap<char, String>,
}

impl Grammar {
    pub fn new() -> Self {
        Grammar::default()
    }

    pub fn from_rules<I, S>(rules: I) -> Self
    where
        I: IntoIterator<Item = (char, S)>,
        S: Into<String>,
    {
        Grammar {
            rules: rules.into_iter().map(|(c, r)| (c, r.into())).collect(),
        }
    }

    /// Add or replace the rule for `letter`.
    pub fn insert(&mut self, letter: char, replacement: impl Into<String>) {
        self.rules.insert(letter, replacement.into());
    }

    pub fn rule(&self, letter: char) -> Option<&str> {
        self.rules.get(&letter).map(String::as_str)
    }

    pub fn rules(&self) -> impl Iterator<Item = (char, &str)> {
        self.rules.iter().map(|(&c, r)| (c, r.as_str()))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// One of the built-in rule sets, by name (see [`PRESETS`]).
    pub fn preset(name: &str) -> Option<Self> {
        let rules: &[(char, &str)] = match name {
            "branching" => &[('a', "b[a]b(a)a"), ('b', "bb")],
            "triadic" => &[
                ('a', "d[dbe](dce)e"),
                ('b', "d[daf](dcf)f"),
                ('c', "d[dbg](dag)g"),
            ],
            "nested" => &[('a', "b[a[ba]]"), ('b', "b((b)a)c"), ('c', "cdb")],
            "crown" => &[('a', "c(ba(b))c[ba[b]]"), ('b', "c(be)c[bf]"), ('c', "cgg")],
            _ => return None,
        };
        Some(Grammar::from_rules(rules.iter().copied()))
    }

    /// Parse rules written as `letter=replacement`, separated by commas,
    /// semicolons or newlines. Whitespace around each part is ignored.
    pub fn parse(text: &str) -> Result<Self, GrammarError> {
        let mut grammar = Grammar::new();
        for piece in text.split([',', ';', '\n']) {
            let piece = piece.trim();
            if piece.is_empty() {
                continue;
            }
            let malformed = || GrammarError::MalformedRule(piece.to_string());
            let (letter, replacement) = piece.split_once('=').ok_or_else(malformed)?;
            let mut letters = letter.trim().chars();
            let (Some(letter), None) = (letters.next(), letters.next()) else {
                return Err(malformed());
            };
            grammar.insert(letter, replacement.trim());
        }
        Ok(grammar)
    }

    /// Random productions for every letter in `letters`, drawn from the same
    /// letter set. Groups are balanced and never nested.
    pub fn random(letters: &[char], shape: &RuleShape, rng: &mut impl Rng) -> Self {
        let mut grammar = Grammar::new();
        if letters.is_empty() {
            return grammar;
        }
        let min = shape.min_length.max(1);
        let max = shape.max_length.max(min);
        let group_probability = if (0.0..=1.0).contains(&shape.group_probability) {
            shape.group_probability
        } else {
            0.0
        };

        for &letter in letters {
            let length = rng.random_range(min..=max);
            let mut body = String::with_capacity(length + 4);
            let mut closer: Option<char> = None;
            for i in 0..length {
                if closer.is_none() && i + 1 < length && rng.random_bool(group_probability) {
                    let (open, close) = if rng.random_bool(0.5) {
                        ('[', ']')
                    } else {
                        ('(', ')')
                    };
                    body.push(open);
                    closer = Some(close);
                    body.push(letters[rng.random_range(0..letters.len())]);
                    continue;
                }
                body.push(letters[rng.random_range(0..letters.len())]);
                if closer.is_some() && rng.random_bool(0.5) {
                    body.extend(closer.take());
                }
            }
            body.extend(closer);
            grammar.insert(letter, body);
        }
        grammar
    }

    /// Rewrite `axiom` for exactly `generations` rounds.
    pub fn expand(&self, axiom: &str, generations: usize) -> String {
        let mut current = axiom.to_string();
        for _ in 0..generations {
            let size: usize = current.chars().map(|c| self.piece_len(c)).sum();
            let mut next = String::with_capacity(size);
            for c in current.chars() {
                match self.rules.get(&c) {
                    Some(replacement) => next.push_str(replacement),
                    None => next.push(c),
                }
            }
            current = next;
        }
        current
    }

    /// Like [`Grammar::expand`], refusing when the result would exceed
    /// `limit` bytes.
    pub fn expand_limited(
        &self,
        axiom: &str,
        generations: usize,
        limit: usize,
    ) -> Result<String, GrammarError> {
        let length = self.expanded_len(axiom, generations);
        if length > limit {
            return Err(GrammarError::ExpansionTooLarge { length, limit });
        }
        log::debug!("expanding '{axiom}' for {generations} generations ({length} bytes)");
        Ok(self.expand(axiom, generations))
    }

    /// Length in bytes of `expand(axiom, generations)`, computed from a
    /// per-letter recurrence. Saturates at `usize::MAX`.
    pub fn expanded_len(&self, axiom: &str, generations: usize) -> usize {
        let mut lengths: BTreeMap<char, usize> = axiom
            .chars()
            .chain(self.rules.keys().copied())
            .chain(self.rules.values().flat_map(|r| r.chars()))
            .map(|c| (c, c.len_utf8()))
            .collect();

        for _ in 0..generations {
            let next: BTreeMap<char, usize> = lengths
                .iter()
                .map(|(&c, &len)| {
                    let grown = match self.rules.get(&c) {
                        Some(replacement) => replacement
                            .chars()
                            .fold(0usize, |acc, r| acc.saturating_add(lengths[&r])),
                        None => len,
                    };
                    (c, grown)
                })
                .collect();
            if next == lengths {
                break;
            }
            lengths = next;
        }

        axiom
            .chars()
            .fold(0usize, |acc, c| acc.saturating_add(lengths[&c]))
    }

    fn piece_len(&self, c: char) -> usize {
        self.rules.get(&c).map_or(c.len_utf8(), String::len)
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (letter, replacement)) in self.rules.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{letter}={replacement}")?;
        }
        Ok(())
    }
}
