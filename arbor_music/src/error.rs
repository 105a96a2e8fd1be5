// Error types for model construction, segment handling, and the pipeline.
//
// Construction-time failures are fatal and carry the parameters that caused
// them. Sampling-time context misses are not errors at all: generator.rs
// recovers them internally and they never appear here.
//
// `SessionError` is the umbrella returned by session.rs; it tags failures
// with the training source name so a front end can say which input was
// rejected.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures while building a transition table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// The training sequence has no complete `order + 1` window.
    #[error("insufficient training data: need at least {required} states, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    /// Markov order must be at least 1.
    #[error("markov order must be at least 1")]
    InvalidOrder,
}

/// Failures while constructing a segment.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SegmentError {
    /// A segment with no events cannot be bound to a grammar letter.
    #[error("segment {ordinal} from '{source_name}' is empty")]
    Degenerate { source_name: String, ordinal: usize },

    /// Symbols and durations must be positionally aligned.
    #[error(
        "segment {ordinal} from '{source_name}' has {symbols} symbols but {durations} durations"
    )]
    LengthMismatch {
        source_name: String,
        ordinal: usize,
        symbols: usize,
        durations: usize,
    },

    /// Durations must be positive and finite.
    #[error("segment {ordinal} from '{source_name}' has invalid duration {value} at {index}")]
    InvalidDuration {
        source_name: String,
        ordinal: usize,
        index: usize,
        value: f64,
    },
}

/// Failures while binding segments to grammar letters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComposeError {
    #[error("{segments} segments exceed the letter capacity of {capacity}")]
    AlphabetOverflow { segments: usize, capacity: usize },
}

/// An assembled composition whose events do not line up or whose
/// durations are unusable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompositionError {
    #[error("composition has {symbols} symbols but {durations} durations")]
    LengthMismatch { symbols: usize, durations: usize },

    #[error("composition has invalid duration {value} at {index}")]
    InvalidDuration { index: usize, value: f64 },
}

/// Failures while parsing or expanding a grammar.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrammarError {
    /// A rule in text form was not `letter=replacement`.
    #[error("malformed rule '{0}': expected a single letter, '=', and a replacement")]
    MalformedRule(String),

    /// The expansion would exceed the configured length cap.
    #[error("expansion would produce {length} characters (limit {limit})")]
    ExpansionTooLarge { length: usize, limit: usize },
}

/// Failures while validating a training sequence.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrainingError {
    #[error("training event {index} has invalid duration {value}")]
    InvalidDuration { index: usize, value: f64 },

    #[error("training event {index} has an empty symbol")]
    EmptySymbol { index: usize },
}

/// A key label that is not "<tonic> major" or "<tonic> minor".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unrecognized key label '{0}'")]
pub struct KeyParseError(pub String);

/// A duration source name other than grammar, markov or constant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown duration source '{0}' (expected grammar, markov or constant)")]
pub struct UnknownDurationSource(pub String);

/// Failures while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid config field '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("failed to read config {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("failed to parse config {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Failures in a segment store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store I/O error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("store file {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("stored record '{filename}' is invalid: {source}")]
    Segment {
        filename: String,
        source: SegmentError,
    },
}

/// Anything a session run can fail with.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Segment(#[from] SegmentError),

    #[error(transparent)]
    Compose(#[from] ComposeError),

    #[error(transparent)]
    Grammar(#[from] GrammarError),

    #[error(transparent)]
    Training(#[from] TrainingError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The grammar produced no durations to pair with the generated symbols.
    #[error("grammar expansion produced no durations")]
    NoDurations,

    /// A failure attributed to one named input.
    #[error("while processing '{name}': {error}")]
    Source {
        name: String,
        #[source]
        error: Box<SessionError>,
    },
}

impl SessionError {
    /// Attach the name of the input that caused this error.
    pub fn for_source(self, name: impl Into<String>) -> Self {
        SessionError::Source {
            name: name.into(),
            error: Box::new(self),
        }
    }
}
