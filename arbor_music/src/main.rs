// Arbor CLI: train, generate, build segment banks, compose, evaluate.
//
// Every command reads and writes JSON. Training data is an array of
// `{"symbol": "C4", "duration": 1.0}` events; `train` writes a model file
// (pitch table, duration table, key) that the other commands load.
//
// Usage:
//   arbor [--config FILE] [--seed N] train song.json -o song.model.json
//   arbor generate song.model.json -o flat.json --durations markov
//   arbor segments song.model.json --store segments.json --name song.mid
//   arbor compose --store segments.json --name song.mid -o piece.json
//   arbor evaluate song.json piece.json
//
// Config comes from `--config` (or defaults), then command-line flags
// override individual fields. Logging goes through env_logger; set RUST_LOG
// to change the default `info` level.

use anyhow::{Context, Result};
use arbor_music::composer::Composition;
use arbor_music::config::{DurationSource, GenerationConfig};
use arbor_music::evaluate::chi_square;
use arbor_music::session::{Session, TrainedModels, TrainingEvent, TrainingSequence};
use arbor_music::store::{JsonFileStore, SegmentRecord, SegmentStore};
use arbor_prng::ArborRng;
use clap::{Parser, Subcommand};
use rand::Rng;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

/// Markov + L-system symbolic sequence generator
#[derive(Parser, Debug)]
#[command(name = "arbor")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Generate symbolic music sequences from Markov chains and L-systems", long_about = None)]
struct Args {
    /// Generation config (JSON); defaults are used when omitted
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Seed for the random source (overrides the config)
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Learn pitch and duration models from a training sequence
    Train {
        /// Training events (JSON array of {symbol, duration})
        #[arg(value_name = "TRAINING")]
        training: PathBuf,

        /// Where to write the model (stdout when omitted)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Markov order of the pitch model
        #[arg(long)]
        order: Option<usize>,

        /// Markov order of the duration model
        #[arg(long)]
        duration_order: Option<usize>,
    },

    /// Generate one flat sequence from a model
    Generate {
        #[arg(value_name = "MODEL")]
        model: PathBuf,

        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Number of events
        #[arg(short, long)]
        length: Option<usize>,

        /// Duration source: grammar, markov or constant
        #[arg(long)]
        durations: Option<DurationSource>,

        /// Duration grammar: preset name or rules like "a=ab, b=a"
        #[arg(long)]
        rules: Option<String>,

        #[arg(long)]
        axiom: Option<String>,

        #[arg(long)]
        generations: Option<usize>,

        #[command(flatten)]
        post: PostFlags,
    },

    /// Generate a segment bank and store it under a name
    Segments {
        #[arg(value_name = "MODEL")]
        model: PathBuf,

        /// Segment store file
        #[arg(long, value_name = "FILE")]
        store: PathBuf,

        /// Name to store the bank under (usually the source filename)
        #[arg(long)]
        name: String,

        /// Number of segments
        #[arg(long)]
        count: Option<usize>,
    },

    /// Compose a piece from a stored segment bank
    Compose {
        #[arg(long, value_name = "FILE")]
        store: PathBuf,

        #[arg(long)]
        name: String,

        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Ordering grammar (random rules when omitted)
        #[arg(long)]
        rules: Option<String>,

        #[arg(long)]
        generations: Option<usize>,

        #[command(flatten)]
        post: PostFlags,
    },

    /// Chi-square test of a composition against its training sequence
    Evaluate {
        #[arg(value_name = "TRAINING")]
        training: PathBuf,

        #[arg(value_name = "COMPOSITION")]
        composition: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
struct PostFlags {
    /// Skip outlier pruning
    #[arg(long)]
    no_prune: bool,

    /// Skip bar quantization
    #[arg(long)]
    no_quantize: bool,
}

impl PostFlags {
    fn apply(&self, config: &mut GenerationConfig) {
        if self.no_prune {
            config.post.prune = false;
        }
        if self.no_quantize {
            config.post.quantize = false;
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => GenerationConfig::load(path)?,
        None => GenerationConfig::default(),
    };
    if args.seed.is_some() {
        config.seed = args.seed;
    }

    match args.command {
        Commands::Train {
            training,
            output,
            order,
            duration_order,
        } => {
            if let Some(order) = order {
                config.order = order;
            }
            if let Some(order) = duration_order {
                config.duration_order = order;
            }
            let session = open_session(config)?;
            let sequence = read_training(&training)?;
            let models = session
                .train(&sequence)
                .map_err(|e| e.for_source(training.display().to_string()))?;
            write_json(output.as_deref(), &models)
        }

        Commands::Generate {
            model,
            output,
            length,
            durations,
            rules,
            axiom,
            generations,
            post,
        } => {
            if let Some(length) = length {
                config.length = length;
            }
            if let Some(source) = durations {
                config.duration_source = source;
            }
            if let Some(rules) = rules {
                config.rules = rules;
            }
            if let Some(axiom) = axiom {
                config.axiom = axiom;
            }
            if let Some(generations) = generations {
                config.generations = generations;
            }
            post.apply(&mut config);
            let models: TrainedModels = read_json(&model)?;
            let mut session = open_session(config)?;
            let piece = session.generate_flat(&models)?;
            write_json(output.as_deref(), &piece)
        }

        Commands::Segments {
            model,
            store,
            name,
            count,
        } => {
            if let Some(count) = count {
                config.segments.count = count;
            }
            let models: TrainedModels = read_json(&model)?;
            let mut session = open_session(config)?;
            let bank = session.build_segments(&name, &models)?;
            let mut store = JsonFileStore::new(store);
            store.upsert(&name, SegmentRecord::from_bank(&bank))?;
            Ok(())
        }

        Commands::Compose {
            store,
            name,
            output,
            rules,
            generations,
            post,
        } => {
            if rules.is_some() {
                config.composition.rules = rules;
            }
            if let Some(generations) = generations {
                config.composition.generations = generations;
            }
            post.apply(&mut config);
            let store = JsonFileStore::new(store);
            let bank = store
                .fetch_bank(&name)?
                .with_context(|| format!("no segments stored under '{name}'"))?;
            let mut session = open_session(config)?;
            let piece = session.compose(&bank)?;
            write_json(output.as_deref(), &piece)
        }

        Commands::Evaluate {
            training,
            composition,
        } => {
            let expected = read_training(&training)?;
            let observed: Composition = read_json(&composition)?;
            match chi_square(expected.symbols(), observed.symbols()) {
                Some(report) => write_json(None, &report),
                None => anyhow::bail!("fewer than two shared symbols; nothing to compare"),
            }
        }
    }
}

/// Validate the final config and seed a session from it.
fn open_session(config: GenerationConfig) -> Result<Session<ArborRng>> {
    let seed = config.seed.unwrap_or_else(|| rand::rng().random());
    let session = Session::new(config, ArborRng::new(seed)).context("invalid configuration")?;
    log::info!("seed {seed}");
    Ok(session)
}

fn read_training(path: &Path) -> Result<TrainingSequence> {
    let events: Vec<TrainingEvent> = read_json(path)?;
    TrainingSequence::from_events(events)
        .with_context(|| format!("invalid training data in {}", path.display()))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

fn write_json<T: Serialize>(path: Option<&Path>, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match path {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
            log::info!("wrote {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
