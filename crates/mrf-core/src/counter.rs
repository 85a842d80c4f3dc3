//! Bitset-indexed sufficient-statistics counter (component B): answers the
//! joint occurrence count of any observed-variable subset by intersecting
//! per-(variable, value) bitsets and counting set bits.

use crate::assignment::{AssignmentIter, dims_of};
use crate::dataset::Dataset;
use crate::var::{Cardinalities, VarId};
use std::collections::HashMap;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Narrow capability set consumed by parameter initialisation and the
/// log-likelihood score, so tests can drive both from a fixture without a
/// real dataset.
pub trait Counter {
    /// Joint occurrence count of one assignment over `vars`. Variables at or
    /// beyond the counter's observed cardinality count are latent and are
    /// silently skipped; `None` means every variable in `vars` was latent
    /// (the "all hidden" case — the count is not available, not zero).
    fn count_assignment(&self, vars: &[VarId], values: &[usize]) -> Option<u64>;

    /// Joint occurrence counts for every assignment of `vars`, in the same
    /// order [`AssignmentIter`] would produce against `cards`. `None` if any
    /// assignment's count is unavailable (all-hidden).
    fn occurrences(&self, vars: &[VarId], cards: &Cardinalities) -> Option<Vec<u64>>;

    /// Cardinality of one observed variable.
    fn cardinality(&self, v: VarId) -> usize;

    /// Number of rows the counter was built from.
    fn num_tuples(&self) -> usize;
}

#[derive(Clone)]
struct Bitset {
    words: Vec<u64>,
}

impl Bitset {
    fn new(len: usize) -> Self {
        Self { words: vec![0u64; len.div_ceil(64)] }
    }

    fn set(&mut self, i: usize) {
        self.words[i / 64] |= 1u64 << (i % 64);
    }
}

fn intersection_count(sets: &[&Bitset]) -> u64 {
    let Some(first) = sets.first() else {
        return 0;
    };
    let mut total = 0u64;
    for w in 0..first.words.len() {
        let mut acc = !0u64;
        for s in sets {
            acc &= s.words[w];
        }
        total += acc.count_ones() as u64;
    }
    total
}

/// A bitset counter over the observed variables of a dataset, memoising
/// joint counts per distinct variable list.
pub struct BitCounter {
    cards: Cardinalities,
    // bitsets[v][x] is the set of rows where variable v takes value x.
    bitsets: Vec<Vec<Bitset>>,
    num_tuples: usize,
    cache: HashMap<Vec<VarId>, Vec<u64>>,
}

impl BitCounter {
    /// Builds the per-(variable, value) bitsets from a fully-observed
    /// dataset. `O(rows * variables)`.
    pub fn load_from_data(dataset: &Dataset, cards: Cardinalities) -> Self {
        let num_tuples = dataset.len();
        let num_vars = cards.len();

        #[cfg(feature = "parallel")]
        let bitsets: Vec<Vec<Bitset>> = (0..num_vars)
            .into_par_iter()
            .map(|v| build_var_bitsets(dataset, v, cards.as_slice()[v], num_tuples))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let bitsets: Vec<Vec<Bitset>> = (0..num_vars)
            .map(|v| build_var_bitsets(dataset, v, cards.as_slice()[v], num_tuples))
            .collect();

        tracing::debug!(rows = num_tuples, variables = num_vars, "bitset counter loaded");

        Self { cards, bitsets, num_tuples, cache: HashMap::new() }
    }

    /// Reads (and, on first use, populates) the memoised occurrence vector
    /// for `vars`, mutating the cache. Prefer this over the read-only
    /// [`Counter::occurrences`] when the cache should persist.
    pub fn occurrences_cached(&mut self, vars: &[VarId], cards: &Cardinalities) -> Option<&[u64]> {
        if !self.cache.contains_key(vars) {
            let computed = self.compute_occurrences(vars, cards)?;
            self.cache.insert(vars.to_vec(), computed);
        }
        self.cache.get(vars).map(|v| v.as_slice())
    }

    fn compute_occurrences(&self, vars: &[VarId], cards: &Cardinalities) -> Option<Vec<u64>> {
        if vars.is_empty() {
            return Some(Vec::new());
        }
        let dims = dims_of(vars, cards);
        let mut result = Vec::with_capacity(dims.iter().product());
        for assignment in AssignmentIter::new(&dims) {
            result.push(self.count_assignment(vars, &assignment)?);
        }
        Some(result)
    }
}

fn build_var_bitsets(dataset: &Dataset, v: usize, card: usize, num_tuples: usize) -> Vec<Bitset> {
    let mut sets = vec![Bitset::new(num_tuples); card];
    for (row, r) in dataset.rows().iter().enumerate() {
        sets[r[v]].set(row);
    }
    sets
}

impl Counter for BitCounter {
    fn count_assignment(&self, vars: &[VarId], values: &[usize]) -> Option<u64> {
        let n_obs = self.cards.len();
        let sets: Vec<&Bitset> = vars
            .iter()
            .zip(values.iter())
            .filter(|(v, _)| v.0 < n_obs)
            .map(|(v, &x)| &self.bitsets[v.0][x])
            .collect();

        if sets.is_empty() {
            return None;
        }
        Some(intersection_count(&sets))
    }

    fn occurrences(&self, vars: &[VarId], cards: &Cardinalities) -> Option<Vec<u64>> {
        self.compute_occurrences(vars, cards)
    }

    fn cardinality(&self, v: VarId) -> usize {
        self.cards.get(v)
    }

    fn num_tuples(&self) -> usize {
        self.num_tuples
    }
}

#[cfg(test)]
pub mod fake {
    //! A map-backed stand-in for [`BitCounter`], used to drive the
    //! log-likelihood and parameter-initialisation tests from literal
    //! fixtures instead of a real dataset.
    use super::*;

    pub struct FakeCounter {
        pub cards: Cardinalities,
        pub num_tuples: usize,
        pub counts: HashMap<Vec<VarId>, Vec<u64>>,
    }

    impl Counter for FakeCounter {
        fn count_assignment(&self, _vars: &[VarId], _values: &[usize]) -> Option<u64> {
            panic!("FakeCounter does not implement count_assignment")
        }

        fn occurrences(&self, vars: &[VarId], _cards: &Cardinalities) -> Option<Vec<u64>> {
            self.counts.get(vars).cloned()
        }

        fn cardinality(&self, v: VarId) -> usize {
            self.cards.get(v)
        }

        fn num_tuples(&self) -> usize {
            self.num_tuples
        }
    }
}
