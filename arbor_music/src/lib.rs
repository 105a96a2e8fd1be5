// Arbor: symbolic sequence generation from Markov chains and L-systems.
//
// A training sequence of (symbol, duration) events is learned as a
// variable-order Markov model, sampled into new material, and arranged by a
// parallel rewriting grammar. Generated segments are bound to grammar
// letters and stitched together by per-letter cursors; a post-processing
// pass smooths melodic outliers and snaps durations to bar lines.
//
// Architecture:
// - symbol.rs: Opaque event tokens, pitch-name parsing and pitch proxies
// - markov.rs: Transition tables (context -> successor distribution)
// - generator.rs: Sampling with transparent context-miss recovery
// - grammar.rs: L-system rules, presets, random rules, iterative expansion
// - durations.rs: Grammar run lengths -> durations; duration Markov states
// - segment.rs: Validated segments and per-source segment banks
// - composer.rs: Letter binding and cursor-driven stitching
// - post.rs: Outlier pruning and bar quantization
// - key.rs: Krumhansl-Schmuckler key estimation
// - evaluate.rs: Chi-square comparison of generated vs training output
// - store.rs: Filename-keyed persistence of segment banks
// - config.rs: JSON-loadable generation parameters
// - session.rs: The end-to-end pipeline around one random source
// - error.rs: Error types
//
// All randomness is drawn from a caller-supplied `rand::Rng` (normally
// `arbor_prng::ArborRng`), so output is reproducible from a seed.

pub mod composer;
pub mod config;
pub mod durations;
pub mod error;
pub mod evaluate;
pub mod generator;
pub mod grammar;
pub mod key;
pub mod markov;
pub mod post;
pub mod segment;
pub mod session;
pub mod store;
pub mod symbol;
