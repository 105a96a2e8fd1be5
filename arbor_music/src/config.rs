// Generation configuration.
//
// Every tunable of a run lives in `GenerationConfig`, loaded from JSON.
// Parameter groups are nested: `SegmentParams` (segment bank size and
// lengths), `CompositionParams` (letter pool and the grammar that orders
// segments, including `RuleShape` for random rules) and `PostParams`
// (post-processing toggles). All structs carry `#[serde(default)]`, so a
// config file only needs the fields it changes.
//
// `load()` parses and then `validate()`s. Validation rejects values that
// would make a later stage fail or panic (zero order, non-positive unit
// length, inverted ranges, probabilities outside [0, 1], unparsable rule
// text) with the offending field name.
//
// Grammar fields accept either a preset name from grammar.rs or rule text
// like "a=ab, b=a".
//
// session.rs owns a `GenerationConfig`; main.rs applies CLI overrides on top
// of a loaded or default one.

use crate::error::{ConfigError, GrammarError, UnknownDurationSource};
use crate::grammar::Grammar;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Where the durations of a flat run come from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationSource {
    /// Run lengths of the expanded grammar string (durations.rs).
    #[default]
    Grammar,
    /// Sampled from the duration transition table.
    Markov,
    /// Every event gets `unit_length`.
    Constant,
}

impl FromStr for DurationSource {
    type Err = UnknownDurationSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "grammar" => Ok(DurationSource::Grammar),
            "markov" => Ok(DurationSource::Markov),
            "constant" => Ok(DurationSource::Constant),
            other => Err(UnknownDurationSource(other.to_string())),
        }
    }
}

impl fmt::Display for DurationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DurationSource::Grammar => "grammar",
            DurationSource::Markov => "markov",
            DurationSource::Constant => "constant",
        })
    }
}

/// Segment bank generation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentParams {
    /// Segments per bank.
    pub count: usize,
    /// Segment lengths are `2^k`, `k` uniform in this inclusive range.
    pub min_exponent: u32,
    pub max_exponent: u32,
}

impl Default for SegmentParams {
    fn default() -> Self {
        Self {
            count: 15,
            min_exponent: 2,
            max_exponent: 4,
        }
    }
}

/// Shape of randomly generated grammar rules.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleShape {
    /// Letters per production, inclusive range.
    pub min_length: usize,
    pub max_length: usize,
    /// Chance of opening a `[..]` or `(..)` group before a letter.
    pub group_probability: f64,
}

impl Default for RuleShape {
    fn default() -> Self {
        Self {
            min_length: 2,
            max_length: 5,
            group_probability: 0.3,
        }
    }
}

/// Binding segments to letters and ordering them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositionParams {
    /// Ordered letter pool.
    pub letters: String,
    /// Maximum number of letters bound from the pool.
    pub capacity: usize,
    /// Generations of the ordering grammar.
    pub generations: usize,
    /// Preset name or rule text. `None` draws random rules per composition.
    pub rules: Option<String>,
    pub rule_shape: RuleShape,
}

impl Default for CompositionParams {
    fn default() -> Self {
        Self {
            letters: crate::composer::DEFAULT_LETTERS.to_string(),
            capacity: 26,
            generations: 3,
            rules: None,
            rule_shape: RuleShape::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostParams {
    pub prune: bool,
    pub quantize: bool,
}

impl Default for PostParams {
    fn default() -> Self {
        Self {
            prune: true,
            quantize: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Seed for the run's random source. `None` seeds from the OS.
    pub seed: Option<u64>,
    /// Markov order of the pitch model.
    pub order: usize,
    /// Markov order of the duration model.
    pub duration_order: usize,
    /// Events in a flat run.
    pub length: usize,
    /// Grammar for flat-run durations: preset name or rule text.
    pub rules: String,
    pub axiom: String,
    pub generations: usize,
    /// Quarter-note length of one grammar character.
    pub unit_length: f64,
    pub duration_source: DurationSource,
    /// Refuse grammar expansions longer than this many characters.
    pub max_expansion: usize,
    pub segments: SegmentParams,
    pub composition: CompositionParams,
    pub post: PostParams,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            seed: None,
            order: 3,
            duration_order: 3,
            length: 400,
            rules: "nested".to_string(),
            axiom: "abacd".to_string(),
            generations: 6,
            unit_length: 0.5,
            duration_source: DurationSource::Grammar,
            max_expansion: 1_000_000,
            segments: SegmentParams::default(),
            composition: CompositionParams::default(),
            post: PostParams::default(),
        }
    }
}

/// A preset name, or rule text for [`Grammar::parse`].
pub fn resolve_rules(text: &str) -> Result<Grammar, GrammarError> {
    match Grammar::preset(text.trim()) {
        Some(grammar) => Ok(grammar),
        None => Grammar::parse(text),
    }
}

impl GenerationConfig {
    /// Read, parse and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: GenerationConfig =
            serde_json::from_str(&text).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// The grammar used for flat-run durations.
    pub fn grammar(&self) -> Result<Grammar, GrammarError> {
        resolve_rules(&self.rules)
    }

    /// The configured ordering grammar, or `None` for random rules.
    pub fn composition_grammar(&self) -> Option<Result<Grammar, GrammarError>> {
        self.composition.rules.as_deref().map(resolve_rules)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
            ConfigError::Invalid {
                field,
                reason: reason.into(),
            }
        }

        if self.order == 0 {
            return Err(invalid("order", "must be at least 1"));
        }
        if self.duration_order == 0 {
            return Err(invalid("duration_order", "must be at least 1"));
        }
        if !self.unit_length.is_finite() || self.unit_length <= 0.0 {
            return Err(invalid("unit_length", "must be positive and finite"));
        }
        if self.max_expansion == 0 {
            return Err(invalid("max_expansion", "must be at least 1"));
        }
        self.grammar()
            .map_err(|e| invalid("rules", e.to_string()))?;

        let seg = &self.segments;
        if seg.count == 0 {
            return Err(invalid("segments.count", "must be at least 1"));
        }
        if seg.min_exponent > seg.max_exponent {
            return Err(invalid(
                "segments.min_exponent",
                "must not exceed segments.max_exponent",
            ));
        }
        if seg.max_exponent > 16 {
            return Err(invalid("segments.max_exponent", "must be at most 16"));
        }

        let comp = &self.composition;
        if comp.capacity == 0 {
            return Err(invalid("composition.capacity", "must be at least 1"));
        }
        if !comp.letters.chars().any(char::is_alphanumeric) {
            return Err(invalid("composition.letters", "must contain letters"));
        }
        if let Some(Err(e)) = self.composition_grammar() {
            return Err(invalid("composition.rules", e.to_string()));
        }
        let shape = &comp.rule_shape;
        if shape.min_length == 0 {
            return Err(invalid("composition.rule_shape.min_length", "must be at least 1"));
        }
        if shape.min_length > shape.max_length {
            return Err(invalid(
                "composition.rule_shape.min_length",
                "must not exceed max_length",
            ));
        }
        if !(0.0..=1.0).contains(&shape.group_probability) {
            return Err(invalid(
                "composition.rule_shape.group_probability",
                "must be within [0, 1]",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        GenerationConfig::default().validate().unwrap();
    }

    #[test]
    fn test_default_config_serializes() {
        let config = GenerationConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let restored: GenerationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, restored);
        assert!(json.contains("\"duration_source\": \"grammar\""));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "order": 2, "segments": { "count": 4 }, "post": { "prune": false } }"#;
        let config: GenerationConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.order, 2);
        assert_eq!(config.length, 400);
        assert_eq!(config.segments.count, 4);
        assert_eq!(config.segments.max_exponent, 4);
        assert!(!config.post.prune);
        assert!(config.post.quantize);
    }

    fn assert_rejected(field: &str, mutate: impl FnOnce(&mut GenerationConfig)) {
        let mut config = GenerationConfig::default();
        mutate(&mut config);
        match config.validate() {
            Err(ConfigError::Invalid { field: f, .. }) => assert_eq!(f, field),
            other => panic!("{field}: expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects() {
        assert_rejected("order", |c| c.order = 0);
        assert_rejected("duration_order", |c| c.duration_order = 0);
        assert_rejected("unit_length", |c| c.unit_length = -0.5);
        assert_rejected("unit_length", |c| c.unit_length = f64::NAN);
        assert_rejected("rules", |c| c.rules = "not a rule".to_string());
        assert_rejected("segments.count", |c| c.segments.count = 0);
        assert_rejected("segments.min_exponent", |c| c.segments.min_exponent = 9);
        assert_rejected("composition.capacity", |c| c.composition.capacity = 0);
        assert_rejected("composition.rules", |c| {
            c.composition.rules = Some("xy=z".to_string())
        });
        assert_rejected("composition.rule_shape.group_probability", |c| {
            c.composition.rule_shape.group_probability = 1.5
        });
    }

    #[test]
    fn test_resolve_rules() {
        assert_eq!(
            resolve_rules("triadic").unwrap(),
            Grammar::preset("triadic").unwrap()
        );
        assert_eq!(resolve_rules("a=ab").unwrap().rule('a'), Some("ab"));
        assert!(resolve_rules("???").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "seed": 7, "duration_source": "markov" }"#).unwrap();
        let config = GenerationConfig::load(&path).unwrap();
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.duration_source, DurationSource::Markov);

        std::fs::write(&path, r#"{ "order": 0 }"#).unwrap();
        assert!(matches!(
            GenerationConfig::load(&path),
            Err(ConfigError::Invalid { field: "order", .. })
        ));
        assert!(matches!(
            GenerationConfig::load(&dir.path().join("missing.json")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_duration_source_from_str() {
        assert_eq!("Markov".parse::<DurationSource>(), Ok(DurationSource::Markov));
        assert_eq!(
            "bogus".parse::<DurationSource>(),
            Err(UnknownDurationSource("bogus".to_string()))
        );
        assert_eq!(DurationSource::Constant.to_string(), "constant");
    }
}
