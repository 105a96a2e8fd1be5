// Session: one configured pipeline with its own random source.
//
// A `Session` owns a `GenerationConfig` and the random source for every
// draw it makes. Runs take `&mut self`, so a session can only ever be in one
// run at a time; independent sessions (with independent sources) can run in
// parallel. Given the same seed, config and training data a session
// reproduces its output exactly.
//
// Pipeline:
// - `train()`: validated training events -> pitch table (`order`),
//   duration table (`duration_order`, over `DurationKey`s) and key label.
// - `generate_flat()`: `length` pitches, paired with durations from the
//   configured `DurationSource`, then post-processed.
// - `build_segments()`: a bank of `segments.count` short runs of length
//   `2^k`, pitches and durations both sampled, labelled with the key.
// - `compose()`: bind the bank to letters, expand an ordering grammar whose
//   axiom is every bound letter, stitch, then post-process.
//
// `Session::new()` validates the config, so every run can rely on sane
// ranges (segment exponents, orders, rule shapes).
//
// Failures on a named input are tagged with that name (`for_source`) so a
// front end can say which file was rejected.

use crate::composer::{Composition, LetterPool, SegmentComposer};
use crate::config::{DurationSource, GenerationConfig};
use crate::durations::{DurationKey, map_lengths};
use crate::error::{ConfigError, SessionError, TrainingError};
use crate::generator::{generate, generate_with_stats};
use crate::grammar::Grammar;
use crate::key::{KeyLabel, estimate_key};
use crate::markov::TransitionTable;
use crate::segment::{Segment, SegmentBank};
use crate::symbol::Symbol;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// One event of a training sequence as read from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingEvent {
    pub symbol: Symbol,
    pub duration: f64,
}

/// A validated training sequence: non-empty symbols, positive durations.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSequence {
    symbols: Vec<Symbol>,
    durations: Vec<f64>,
}

impl TrainingSequence {
    pub fn from_events(events: Vec<TrainingEvent>) -> Result<Self, TrainingError> {
        let mut symbols = Vec::with_capacity(events.len());
        let mut durations = Vec::with_capacity(events.len());
        for (index, event) in events.into_iter().enumerate() {
            if event.symbol.as_str().trim().is_empty() {
                return Err(TrainingError::EmptySymbol { index });
            }
            if !event.duration.is_finite() || event.duration <= 0.0 {
                return Err(TrainingError::InvalidDuration {
                    index,
                    value: event.duration,
                });
            }
            symbols.push(event.symbol);
            durations.push(event.duration);
        }
        Ok(TrainingSequence { symbols, durations })
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
}

/// Everything learned from one training sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModels {
    pub pitches: TransitionTable<Symbol>,
    pub durations: TransitionTable<DurationKey>,
    pub key: Option<KeyLabel>,
}

pub struct Session<R: Rng> {
    config: GenerationConfig,
    rng: R,
}

impl<R: Rng> Session<R> {
    /// Rejects an invalid config before any randomness is drawn.
    pub fn new(config: GenerationConfig, rng: R) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Session { config, rng })
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Learn pitch and duration tables plus a key label.
    pub fn train(&self, training: &TrainingSequence) -> Result<TrainedModels, SessionError> {
        let pitches = TransitionTable::build(training.symbols(), self.config.order)?;
        let keys: Vec<DurationKey> = training
            .durations()
            .iter()
            .filter_map(|&d| DurationKey::from_beats(d))
            .collect();
        let durations = TransitionTable::build(&keys, self.config.duration_order)?;
        let key = estimate_key(training.symbols(), training.durations());
        log::info!(
            "trained on {} events: {} pitch contexts over {} symbols, {} duration contexts, key {}",
            training.len(),
            pitches.len(),
            pitches.alphabet().len(),
            durations.len(),
            key.map_or_else(|| "unknown".to_string(), |k| k.to_string()),
        );
        Ok(TrainedModels {
            pitches,
            durations,
            key,
        })
    }

    /// One flat run of `length` events.
    pub fn generate_flat(&mut self, models: &TrainedModels) -> Result<Composition, SessionError> {
        let length = self.config.length;
        let run = generate_with_stats(&models.pitches, length, &mut self.rng);
        if run.resamples > 0 {
            log::debug!("{} context misses recovered", run.resamples);
        }

        let durations: Vec<f64> = match self.config.duration_source {
            DurationSource::Grammar => {
                let grammar = self.config.grammar()?;
                let expanded = grammar.expand_limited(
                    &self.config.axiom,
                    self.config.generations,
                    self.config.max_expansion,
                )?;
                let lengths = map_lengths(&expanded, self.config.unit_length);
                if lengths.is_empty() && length > 0 {
                    return Err(SessionError::NoDurations);
                }
                lengths.iter().copied().cycle().take(length).collect()
            }
            DurationSource::Markov => generate(&models.durations, length, &mut self.rng)
                .into_iter()
                .map(DurationKey::beats)
                .collect(),
            DurationSource::Constant => vec![self.config.unit_length; length],
        };

        let mut out = Composition::default();
        for (symbol, duration) in run.states.into_iter().zip(durations) {
            out.push(symbol, duration);
        }
        self.post_process(&mut out);
        log::info!("generated {} events", out.len());
        Ok(out)
    }

    /// Generate a bank of short segments for `source`.
    pub fn build_segments(
        &mut self,
        source: &str,
        models: &TrainedModels,
    ) -> Result<SegmentBank, SessionError> {
        let params = &self.config.segments;
        let (count, min, max) = (params.count, params.min_exponent, params.max_exponent);
        if models.key.is_none() {
            log::warn!("{source}: no key could be estimated; bank is unlabelled");
        }

        let mut bank = SegmentBank::new(source, models.key);
        for ordinal in 0..count {
            let length = 1usize << self.rng.random_range(min..=max);
            let symbols = generate(&models.pitches, length, &mut self.rng);
            let durations = generate(&models.durations, length, &mut self.rng)
                .into_iter()
                .map(DurationKey::beats)
                .collect();
            let segment = Segment::new(source, ordinal, symbols, durations)
                .map_err(|e| SessionError::from(e).for_source(source))?;
            bank.push(segment);
        }
        log::info!("{source}: built {} segments", bank.len());
        Ok(bank)
    }

    /// Order a bank's segments with a grammar and stitch them together.
    pub fn compose(&mut self, bank: &SegmentBank) -> Result<Composition, SessionError> {
        let params = &self.config.composition;
        let composer = SegmentComposer::new(LetterPool::new(params.letters.chars(), params.capacity));
        let map = composer
            .assign(bank.segments())
            .map_err(|e| SessionError::from(e).for_source(bank.source()))?;

        let grammar = match self.config.composition_grammar() {
            Some(grammar) => grammar?,
            None => Grammar::random(map.letters(), &params.rule_shape, &mut self.rng),
        };
        log::info!("ordering {} segments with {grammar}", map.len());
        let melody = grammar.expand_limited(
            &map.axiom(),
            params.generations,
            self.config.max_expansion,
        )?;

        let mut out = composer.compose(&melody, &map);
        self.post_process(&mut out);
        log::info!("{}: composed {} events", bank.source(), out.len());
        Ok(out)
    }

    fn post_process(&self, out: &mut Composition) {
        if self.config.post.prune {
            let replaced = out.prune();
            log::debug!("pruned {replaced} outliers");
        }
        if self.config.post.quantize {
            out.quantize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composer::STRIDE;
    use crate::error::ComposeError;
    use arbor_prng::ArborRng;

    fn training() -> TrainingSequence {
        let phrase = [
            ("C4", 1.0),
            ("D4", 0.5),
            ("E4", 0.5),
            ("F4", 1.0),
            ("G4", 2.0),
            ("E4", 1.0),
            ("C4", 1.0),
            ("D4 F4", 0.5),
            ("rest", 0.5),
            ("G4", 1.0),
            ("C5", 2.0),
            ("B4", 0.5),
            ("A4", 0.5),
            ("G4", 1.0),
        ];
        let events = (0..4)
            .flat_map(|_| phrase.iter())
            .map(|&(s, d)| TrainingEvent {
                symbol: Symbol::from(s),
                duration: d,
            })
            .collect();
        TrainingSequence::from_events(events).unwrap()
    }

    fn session(config: GenerationConfig, seed: u64) -> Session<ArborRng> {
        Session::new(config, ArborRng::new(seed)).unwrap()
    }

    #[test]
    fn test_training_validation() {
        let event = |s: &str, d: f64| TrainingEvent {
            symbol: Symbol::from(s),
            duration: d,
        };
        assert_eq!(
            TrainingSequence::from_events(vec![event("C4", 1.0), event(" ", 1.0)]),
            Err(TrainingError::EmptySymbol { index: 1 })
        );
        assert_eq!(
            TrainingSequence::from_events(vec![event("C4", 0.0)]),
            Err(TrainingError::InvalidDuration {
                index: 0,
                value: 0.0
            })
        );
    }

    #[test]
    fn test_train() {
        let models = session(GenerationConfig::default(), 1)
            .train(&training())
            .unwrap();
        assert_eq!(models.pitches.order(), 3);
        assert_eq!(models.durations.order(), 3);
        assert_eq!(models.pitches.alphabet().len(), 10);
        assert!(models.key.is_some());
    }

    #[test]
    fn test_train_insufficient_data() {
        let short = TrainingSequence::from_events(vec![TrainingEvent {
            symbol: Symbol::from("C4"),
            duration: 1.0,
        }])
        .unwrap();
        let err = session(GenerationConfig::default(), 1)
            .train(&short)
            .unwrap_err();
        assert!(matches!(err, SessionError::Model(_)));
    }

    #[test]
    fn test_generate_flat_every_duration_source() {
        for source in [
            DurationSource::Grammar,
            DurationSource::Markov,
            DurationSource::Constant,
        ] {
            let config = GenerationConfig {
                length: 123,
                duration_source: source,
                ..Default::default()
            };
            let mut s = session(config, 2);
            let models = s.train(&training()).unwrap();
            let out = s.generate_flat(&models).unwrap();
            assert_eq!(out.len(), 123, "{source}");
            assert_eq!(out.durations().len(), 123, "{source}");
            assert!(out.durations().iter().all(|&d| d > 0.0), "{source}");
        }
    }

    #[test]
    fn test_generate_flat_grammar_durations_cycle() {
        let config = GenerationConfig {
            length: 7,
            rules: "a=a".to_string(),
            axiom: "ab".to_string(),
            generations: 1,
            unit_length: 0.5,
            post: crate::config::PostParams {
                prune: false,
                quantize: false,
            },
            ..Default::default()
        };
        let mut s = session(config, 3);
        let models = s.train(&training()).unwrap();
        let out = s.generate_flat(&models).unwrap();
        assert_eq!(out.durations(), &[0.5; 7]);
    }

    #[test]
    fn test_generate_flat_no_durations() {
        let config = GenerationConfig {
            axiom: String::new(),
            ..Default::default()
        };
        let mut s = session(config, 4);
        let models = s.train(&training()).unwrap();
        assert!(matches!(
            s.generate_flat(&models),
            Err(SessionError::NoDurations)
        ));
    }

    #[test]
    fn test_same_seed_same_output() {
        let run = |seed| {
            let mut s = session(GenerationConfig::default(), seed);
            let models = s.train(&training()).unwrap();
            let flat = s.generate_flat(&models).unwrap();
            let bank = s.build_segments("song.mid", &models).unwrap();
            let composed = s.compose(&bank).unwrap();
            (flat, bank, composed)
        };
        assert_eq!(run(11), run(11));
    }

    #[test]
    fn test_build_segments() {
        let mut s = session(GenerationConfig::default(), 5);
        let models = s.train(&training()).unwrap();
        let bank = s.build_segments("song.mid", &models).unwrap();
        assert_eq!(bank.len(), 15);
        assert_eq!(bank.source(), "song.mid");
        for (i, segment) in bank.iter().enumerate() {
            assert_eq!(segment.ordinal(), i);
            assert!([4, 8, 16].contains(&segment.len()), "{}", segment.len());
            assert_eq!(segment.key(), models.key);
        }
    }

    #[test]
    fn test_compose_bank() {
        let mut config = GenerationConfig::default();
        config.segments.count = 5;
        let mut s = session(config, 6);
        let models = s.train(&training()).unwrap();
        let bank = s.build_segments("song.mid", &models).unwrap();
        let out = s.compose(&bank).unwrap();
        assert!(!out.is_empty());
        assert_eq!(out.len() % STRIDE, 0);
        assert_eq!(out.symbols().len(), out.durations().len());
    }

    #[test]
    fn test_compose_with_configured_rules() {
        let mut config = GenerationConfig::default();
        config.segments.count = 2;
        config.composition.rules = Some("a=ab, b=a".to_string());
        config.composition.generations = 3;
        let mut s = session(config, 7);
        let models = s.train(&training()).unwrap();
        let bank = s.build_segments("song.mid", &models).unwrap();
        // "ab" expands to "abaababa": 8 bound letters.
        assert_eq!(s.compose(&bank).unwrap().len(), 8 * STRIDE);
    }

    #[test]
    fn test_compose_overflow_names_source() {
        let mut config = GenerationConfig::default();
        config.segments.count = 27;
        let mut s = session(config, 8);
        let models = s.train(&training()).unwrap();
        let bank = s.build_segments("big.mid", &models).unwrap();
        match s.compose(&bank) {
            Err(SessionError::Source { name, error }) => {
                assert_eq!(name, "big.mid");
                assert!(matches!(
                    *error,
                    SessionError::Compose(ComposeError::AlphabetOverflow {
                        segments: 27,
                        capacity: 26
                    })
                ));
            }
            other => panic!("expected overflow, got {other:?}"),
        }
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut inverted = GenerationConfig::default();
        inverted.segments.min_exponent = 4;
        inverted.segments.max_exponent = 2;
        assert!(matches!(
            Session::new(inverted, ArborRng::new(9)),
            Err(ConfigError::Invalid {
                field: "segments.min_exponent",
                ..
            })
        ));

        let mut huge = GenerationConfig::default();
        huge.segments.max_exponent = 64;
        assert!(matches!(
            Session::new(huge, ArborRng::new(9)),
            Err(ConfigError::Invalid {
                field: "segments.max_exponent",
                ..
            })
        ));
    }

    #[test]
    fn test_models_with_zero_tick_duration_rejected() {
        let models = session(GenerationConfig::default(), 10)
            .train(&training())
            .unwrap();
        let mut value = serde_json::to_value(&models).unwrap();
        value["durations"]["alphabet"][0] = serde_json::json!(0);
        let err = serde_json::from_value::<TrainedModels>(value).unwrap_err();
        assert!(err.to_string().contains("at least one tick"), "{err}");
    }
}
