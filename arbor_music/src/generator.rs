// Sequence sampling from a transition table.
//
// A run seeds itself with a context picked uniformly among the table's
// contexts (not weighted by how often the context was observed), emits that
// context, then repeatedly draws a successor from the current row and slides
// the context window forward by one.
//
// Sampling can form a context that never occurred in training (e.g. the
// last window of the training data, or a new combination of states). That
// is a context miss. It is recovered here and never surfaces: the generator
// reseeds with a fresh uniformly chosen context, emits it (clipped to the
// remaining length), and carries on. Every run therefore terminates with
// exactly the requested number of states, all drawn from the alphabet.
//
// Randomness comes only from the `rng` argument.

use crate::markov::{SymbolId, TransitionTable};
use rand::Rng;

/// Result of one generation run with its bookkeeping.
#[derive(Debug, Clone)]
pub struct Generated<S> {
    pub states: Vec<S>,
    /// How many times a context miss forced a reseed.
    pub resamples: usize,
}

/// Sample exactly `length` states from `table`.
pub fn generate<S: Clone>(
    table: &TransitionTable<S>,
    length: usize,
    rng: &mut impl Rng,
) -> Vec<S> {
    generate_with_stats(table, length, rng).states
}

/// Like [`generate`], also reporting how many context misses were recovered.
pub fn generate_with_stats<S: Clone>(
    table: &TransitionTable<S>,
    length: usize,
    rng: &mut impl Rng,
) -> Generated<S> {
    let order = table.order();
    let mut ids: Vec<SymbolId> = Vec::with_capacity(length);
    let mut resamples = 0;

    if length > 0 && !table.is_empty() {
        let mut current = seed(table, &mut ids, length, rng);
        while ids.len() < length {
            let next = table.row_at(current).sample(rng.random::<f64>());
            ids.push(next);
            if ids.len() == length {
                break;
            }

            let window = &ids[ids.len() - order..];
            current = match table.index_of(window) {
                Some(index) => index,
                None => {
                    resamples += 1;
                    log::debug!(
                        "context miss after {} states; reseeding ({} so far)",
                        ids.len(),
                        resamples
                    );
                    seed(table, &mut ids, length, rng)
                }
            };
        }
    }

    let states = ids
        .into_iter()
        .filter_map(|id| table.symbol(id).cloned())
        .collect();
    Generated { states, resamples }
}

/// Pick a uniform starting context, append it (clipped to `length`), and
/// return its row index.
fn seed<S>(
    table: &TransitionTable<S>,
    ids: &mut Vec<SymbolId>,
    length: usize,
    rng: &mut impl Rng,
) -> usize {
    let index = rng.random_range(0..table.len());
    let room = length - ids.len();
    let context = table.context_at(index);
    ids.extend_from_slice(&context[..context.len().min(room)]);
    index
}
