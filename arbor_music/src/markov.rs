// Variable-order Markov model: transition tables learned from a sequence.
//
// A table maps a context (the last `order` states) to a probability
// distribution over the next state. Building slides an `order + 1` window
// across the training sequence, counts (context, successor) pairs with
// recurring contexts merged into one row, then normalizes each row.
//
// States are interned: the alphabet is stored once, sorted, and everything
// else refers to it by `SymbolId`. Contexts are id slices, so a symbol
// containing a separator character can never collide with another context
// the way a joined string key would. Rows are sparse; columns that were
// never observed after a context are implicitly zero, and `distribution()`
// materializes the dense row over the whole alphabet on request.
//
// The table is generic over the state type. session.rs builds one table
// over pitch `Symbol`s and one over `DurationKey`s (durations.rs).
//
// Tables are immutable after `build()` and serialize to JSON. Deserializing
// re-checks every invariant (see `TableData`), so a loaded table is as
// trustworthy as a freshly built one. generator.rs samples from them.

use crate::error::ModelError;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Index into a table's alphabet.
pub type SymbolId = u32;

/// Tolerance for the row-sum invariant on loaded tables.
const ROW_SUM_TOLERANCE: f64 = 1e-6;

/// Successor distribution for one context.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// (successor, probability), sorted by id, every probability > 0.
    successors: Vec<(SymbolId, f64)>,
    /// Number of training windows that produced this row.
    observations: u32,
}

impl Row {
    pub fn successors(&self) -> &[(SymbolId, f64)] {
        &self.successors
    }

    pub fn observations(&self) -> u32 {
        self.observations
    }

    /// Weighted choice given a uniform value in [0, 1).
    pub(crate) fn sample(&self, rng_val: f64) -> SymbolId {
        let total: f64 = self.successors.iter().map(|&(_, p)| p).sum();
        let target = rng_val * total;
        let mut cumulative = 0.0;
        for &(id, p) in &self.successors {
            cumulative += p;
            if cumulative > target {
                return id;
            }
        }
        // Rounding can leave the target just past the last bucket.
        self.successors.last().map(|&(id, _)| id).unwrap_or_default()
    }
}

/// Context -> next-state distribution, learned at a fixed order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    try_from = "TableData<S>",
    into = "TableData<S>",
    bound(
        serialize = "S: Serialize + Clone",
        deserialize = "S: Deserialize<'de> + Ord + Clone"
    )
)]
pub struct TransitionTable<S> {
    order: usize,
    alphabet: Vec<S>,
    contexts: Vec<Box<[SymbolId]>>,
    rows: Vec<Row>,
    lookup: FxHashMap<Box<[SymbolId]>, usize>,
}

impl<S: Ord + Clone> TransitionTable<S> {
    /// Learn a table from `training` at the given order.
    pub fn build(training: &[S], order: usize) -> Result<Self, ModelError> {
        if order == 0 {
            return Err(ModelError::InvalidOrder);
        }
        if training.len() < order + 1 {
            return Err(ModelError::InsufficientData {
                required: order + 1,
                actual: training.len(),
            });
        }

        let mut id_of: BTreeMap<&S, SymbolId> = training.iter().map(|s| (s, 0)).collect();
        for (i, id) in id_of.values_mut().enumerate() {
            *id = i as SymbolId;
        }
        let alphabet: Vec<S> = id_of.keys().map(|&s| s.clone()).collect();
        let ids: Vec<SymbolId> = training.iter().map(|s| id_of[s]).collect();

        let mut counts: BTreeMap<&[SymbolId], BTreeMap<SymbolId, u32>> = BTreeMap::new();
        for window in ids.windows(order + 1) {
            *counts
                .entry(&window[..order])
                .or_default()
                .entry(window[order])
                .or_insert(0) += 1;
        }

        let mut contexts = Vec::with_capacity(counts.len());
        let mut rows = Vec::with_capacity(counts.len());
        for (context, successors) in counts {
            let total: u32 = successors.values().sum();
            rows.push(Row {
                successors: successors
                    .into_iter()
                    .map(|(id, n)| (id, n as f64 / total as f64))
                    .collect(),
                observations: total,
            });
            contexts.push(Box::<[SymbolId]>::from(context));
        }

        Ok(TransitionTable::assemble(order, alphabet, contexts, rows))
    }

    /// Id of a state, if it is in the alphabet.
    pub fn symbol_id(&self, symbol: &S) -> Option<SymbolId> {
        self.alphabet
            .binary_search(symbol)
            .ok()
            .map(|i| i as SymbolId)
    }

    fn context_ids(&self, context: &[S]) -> Option<Vec<SymbolId>> {
        context.iter().map(|s| self.symbol_id(s)).collect()
    }

    /// The dense successor distribution for `context`, one entry per
    /// alphabet column. `None` if the context was never observed.
    pub fn distribution(&self, context: &[S]) -> Option<Vec<f64>> {
        let row = self.row_for(&self.context_ids(context)?)?;
        let mut dense = vec![0.0; self.alphabet.len()];
        for &(id, p) in &row.successors {
            dense[id as usize] = p;
        }
        Some(dense)
    }

    /// Probability of `next` following `context`; 0 for anything unseen.
    pub fn probability(&self, context: &[S], next: &S) -> f64 {
        let (Some(ids), Some(next)) = (self.context_ids(context), self.symbol_id(next)) else {
            return 0.0;
        };
        self.row_for(&ids)
            .and_then(|row| row.successors.iter().find(|&&(id, _)| id == next))
            .map_or(0.0, |&(_, p)| p)
    }
}

impl<S> TransitionTable<S> {
    fn assemble(
        order: usize,
        alphabet: Vec<S>,
        contexts: Vec<Box<[SymbolId]>>,
        rows: Vec<Row>,
    ) -> Self {
        let lookup = contexts
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();
        TransitionTable {
            order,
            alphabet,
            contexts,
            rows,
            lookup,
        }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// All states seen in training, sorted. Ids index into this slice.
    pub fn alphabet(&self) -> &[S] {
        &self.alphabet
    }

    /// Number of distinct contexts (rows).
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Always false for a built or loaded table; present for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn symbol(&self, id: SymbolId) -> Option<&S> {
        self.alphabet.get(id as usize)
    }

    /// Iterate `(context ids, row)` in context order.
    pub fn rows(&self) -> impl Iterator<Item = (&[SymbolId], &Row)> {
        self.contexts.iter().map(|c| &**c).zip(self.rows.iter())
    }

    /// Iterate contexts and their successor distributions as states.
    pub fn entries(&self) -> impl Iterator<Item = (Vec<&S>, Vec<(&S, f64)>)> {
        self.rows().map(|(context, row)| {
            let context = context
                .iter()
                .map(|&id| &self.alphabet[id as usize])
                .collect();
            let successors = row
                .successors
                .iter()
                .map(|&(id, p)| (&self.alphabet[id as usize], p))
                .collect();
            (context, successors)
        })
    }

    pub(crate) fn context_at(&self, index: usize) -> &[SymbolId] {
        &self.contexts[index]
    }

    pub(crate) fn row_at(&self, index: usize) -> &Row {
        &self.rows[index]
    }

    pub(crate) fn index_of(&self, context: &[SymbolId]) -> Option<usize> {
        self.lookup.get(context).copied()
    }

    pub(crate) fn row_for(&self, context: &[SymbolId]) -> Option<&Row> {
        self.index_of(context).map(|i| &self.rows[i])
    }
}

/// Serialized form of a [`TransitionTable`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableData<S> {
    pub order: usize,
    pub alphabet: Vec<S>,
    pub rows: Vec<RowData>,
}

/// Serialized form of one row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowData {
    pub context: Vec<SymbolId>,
    pub successors: Vec<(SymbolId, f64)>,
    pub observations: u32,
}

/// Why a serialized table was rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TableDataError {
    #[error("markov order must be at least 1")]
    InvalidOrder,
    #[error("table has no rows")]
    Empty,
    #[error("alphabet is not sorted and unique")]
    UnsortedAlphabet,
    #[error("row {row}: context has {len} states, expected {order}")]
    ContextLength { row: usize, len: usize, order: usize },
    #[error("row {row}: symbol id {id} is outside the alphabet")]
    UnknownId { row: usize, id: SymbolId },
    #[error("row {row}: context appears more than once")]
    DuplicateContext { row: usize },
    #[error("row {row}: successors must be non-empty, sorted, with positive probabilities")]
    BadSuccessors { row: usize },
    #[error("row {row}: probabilities sum to {sum}, expected 1")]
    NotStochastic { row: usize, sum: f64 },
}

impl<S> From<TransitionTable<S>> for TableData<S> {
    fn from(table: TransitionTable<S>) -> Self {
        let rows = table
            .contexts
            .into_iter()
            .zip(table.rows)
            .map(|(context, row)| RowData {
                context: context.into_vec(),
                successors: row.successors,
                observations: row.observations,
            })
            .collect();
        TableData {
            order: table.order,
            alphabet: table.alphabet,
            rows,
        }
    }
}

impl<S: Ord> TryFrom<TableData<S>> for TransitionTable<S> {
    type Error = TableDataError;

    fn try_from(data: TableData<S>) -> Result<Self, Self::Error> {
        if data.order == 0 {
            return Err(TableDataError::InvalidOrder);
        }
        if data.rows.is_empty() {
            return Err(TableDataError::Empty);
        }
        if data.alphabet.windows(2).any(|w| w[0] >= w[1]) {
            return Err(TableDataError::UnsortedAlphabet);
        }

        let size = data.alphabet.len() as SymbolId;
        let mut seen: BTreeMap<&[SymbolId], usize> = BTreeMap::new();
        for (row, rd) in data.rows.iter().enumerate() {
            if rd.context.len() != data.order {
                return Err(TableDataError::ContextLength {
                    row,
                    len: rd.context.len(),
                    order: data.order,
                });
            }
            let ids = rd
                .context
                .iter()
                .copied()
                .chain(rd.successors.iter().map(|&(id, _)| id));
            for id in ids {
                if id >= size {
                    return Err(TableDataError::UnknownId { row, id });
                }
            }
            if seen.insert(&rd.context, row).is_some() {
                return Err(TableDataError::DuplicateContext { row });
            }
            let sorted = rd.successors.windows(2).all(|w| w[0].0 < w[1].0);
            let positive = rd.successors.iter().all(|&(_, p)| p.is_finite() && p > 0.0);
            if rd.successors.is_empty() || !sorted || !positive {
                return Err(TableDataError::BadSuccessors { row });
            }
            let sum: f64 = rd.successors.iter().map(|&(_, p)| p).sum();
            if (sum - 1.0).abs() > ROW_SUM_TOLERANCE {
                return Err(TableDataError::NotStochastic { row, sum });
            }
        }

        let (contexts, rows) = data
            .rows
            .into_iter()
            .map(|rd| {
                (
                    rd.context.into_boxed_slice(),
                    Row {
                        successors: rd.successors,
                        observations: rd.observations,
                    },
                )
            })
            .unzip();
        Ok(TransitionTable::assemble(
            data.order,
            data.alphabet,
            contexts,
            rows,
        ))
    }
}
