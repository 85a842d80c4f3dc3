//! Parameter initialisation (component E): builds one factor per clique from
//! a clique/separator decomposition, via whichever of the three §4.E
//! factories the caller's [`crate::config::InitMode`] selects.

use crate::assignment::{AssignmentIter, dims_of};
use crate::counter::Counter;
use crate::factor::Factor;
use crate::rng;
use crate::var::{Cardinalities, VarId};
use mrf_error::{MrfResult, mrf_bail};

/// Maximum number of Dirichlet redraws tolerated before giving up on a
/// clique (§4.E.2 says "redraw until positive", but a pathological `alpha`
/// could in principle redraw forever; this is the escape hatch, not a
/// documented part of the spec's contract).
const MAX_DIRICHLET_REDRAWS: usize = 10_000;

/// One uniform factor per clique: every entry `1 / size`.
pub fn uniform(cliques: &[Vec<VarId>], cards: &Cardinalities) -> MrfResult<Vec<Factor>> {
    cliques
        .iter()
        .map(|clique| {
            let dims = dims_of(clique, cards);
            Factor::uniform(clique.clone(), dims)
        })
        .collect()
}

/// One factor per clique, each drawn from a symmetric Dirichlet(`alpha`)
/// over its table, rejecting (and redrawing) any draw with a zero entry.
pub fn random(cliques: &[Vec<VarId>], cards: &Cardinalities, alpha: f64) -> MrfResult<Vec<Factor>> {
    if alpha <= 0.0 {
        mrf_bail!(InvalidParameter: "dirichlet_alpha must be positive, got {}", alpha);
    }
    cliques
        .iter()
        .map(|clique| {
            let dims = dims_of(clique, cards);
            let size: usize = dims.iter().product();
            let values = draw_positive_dirichlet(alpha, size, clique)?;
            Factor::new(clique.clone(), dims, values)
        })
        .collect()
}

fn draw_positive_dirichlet(alpha: f64, size: usize, clique: &[VarId]) -> MrfResult<Vec<f64>> {
    for attempt in 0..MAX_DIRICHLET_REDRAWS {
        let draw = rng::dirichlet(alpha, size);
        if draw.iter().all(|&x| x > 0.0) {
            return Ok(draw);
        }
        tracing::warn!(?clique, attempt, "dirichlet draw contained a zero entry, redrawing");
    }
    mrf_bail!(
        InvalidParameter: "dirichlet draw for clique {:?} failed to avoid zero entries after {} attempts",
        clique,
        MAX_DIRICHLET_REDRAWS
    );
}

/// One factor per clique, seeded from the empirical counts of its observed
/// variables and expanded uniformly across any latents it also covers
/// (§4.E.3). `n_obs` is the number of variables present in the dataset;
/// variables at or beyond it are latent.
pub fn empirical<C: Counter>(
    cliques: &[Vec<VarId>],
    cards: &Cardinalities,
    n_obs: usize,
    counter: &C,
) -> MrfResult<Vec<Factor>> {
    cliques.iter().map(|clique| empirical_one(clique, cards, n_obs, counter)).collect()
}

fn empirical_one<C: Counter>(
    clique: &[VarId],
    cards: &Cardinalities,
    n_obs: usize,
    counter: &C,
) -> MrfResult<Factor> {
    let observed: Vec<VarId> = clique.iter().filter(|v| v.0 < n_obs).copied().collect();
    let hidden: Vec<VarId> = clique.iter().filter(|v| v.0 >= n_obs).copied().collect();

    if observed.is_empty() {
        mrf_bail!(
            InvalidParameter: "empirical init: clique {:?} has no observed variables to seed from",
            clique
        );
    }

    let Some(counts) = counter.occurrences(&observed, cards) else {
        mrf_bail!(
            InvalidParameter: "empirical init: counts for clique {:?} unavailable (all-hidden)",
            clique
        );
    };

    let total: u64 = counts.iter().sum();
    if total == 0 {
        mrf_bail!(ZeroNormalisation: "empirical init: clique {:?} has zero observed support", clique);
    }

    let observed_probs: Vec<f64> = counts.iter().map(|&n| n as f64 / total as f64).collect();

    let hidden_dims = dims_of(&hidden, cards);
    let hidden_size: usize = hidden_dims.iter().product::<usize>().max(1);

    let dims = dims_of(clique, cards);
    let size: usize = dims.iter().product();
    let mut values = vec![0.0; size];

    let observed_dims = dims_of(&observed, cards);
    for (obs_idx, obs_assignment) in AssignmentIter::new(&observed_dims).enumerate() {
        let p = observed_probs[obs_idx] / hidden_size as f64;
        for hidden_assignment in AssignmentIter::new(&hidden_dims) {
            let full: Vec<usize> = clique
                .iter()
                .map(|&v| {
                    if let Some(pos) = observed.iter().position(|&u| u == v) {
                        obs_assignment[pos]
                    } else {
                        let pos = hidden.iter().position(|&u| u == v).expect("var is observed or hidden");
                        hidden_assignment[pos]
                    }
                })
                .collect();
            let flat = crate::assignment::flat_index(&dims, &full);
            values[flat] = p;
        }
    }

    Factor::new(clique.to_vec(), dims, values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::fake::FakeCounter;
    use std::collections::HashMap;

    #[test]
    fn uniform_factor_shape_matches_scenario_s3() {
        let cards = Cardinalities::new(vec![2, 2]);
        let cliques = vec![vec![VarId(0), VarId(1)]];
        let pots = uniform(&cliques, &cards).unwrap();
        assert_eq!(pots[0].len(), 4);
        assert!(pots[0].values().iter().all(|&v| (v - 0.25).abs() < 1e-12));
    }

    #[test]
    fn empirical_with_latent_matches_scenario_s4() {
        let cards = Cardinalities::new(vec![2, 2, 2]);
        let mut counts = HashMap::new();
        // P(1) = [0.6, 0.4] expressed as raw counts.
        counts.insert(vec![VarId(1)], vec![60u64, 40]);
        let counter = FakeCounter { cards: cards.clone(), num_tuples: 100, counts };

        let clique = vec![VarId(1), VarId(2)];
        let fac = empirical_one(&clique, &cards, 2, &counter).unwrap();
        let expected = [0.30, 0.20, 0.30, 0.20];
        for (got, want) in fac.values().iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-12, "{} vs {}", got, want);
        }
        let sum: f64 = fac.values().iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn random_draws_are_positive_and_normalised() {
        let cards = Cardinalities::new(vec![2, 3]);
        let cliques = vec![vec![VarId(0), VarId(1)]];
        let pots = rng::scoped_seed(42, || random(&cliques, &cards, 1.0)).unwrap();
        let sum: f64 = pots[0].values().iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(pots[0].values().iter().all(|&v| v > 0.0));
    }

    #[test]
    fn random_draws_differ_across_seeds() {
        let cards = Cardinalities::new(vec![2, 2]);
        let cliques = vec![vec![VarId(0), VarId(1)]];
        let a = rng::scoped_seed(1, || random(&cliques, &cards, 1.0)).unwrap();
        let b = rng::scoped_seed(2, || random(&cliques, &cards, 1.0)).unwrap();
        assert_ne!(a[0].values(), b[0].values());
    }

    #[test]
    fn empirical_rejects_all_hidden_clique() {
        let cards = Cardinalities::new(vec![2, 2, 2]);
        let counter = FakeCounter { cards: cards.clone(), num_tuples: 10, counts: HashMap::new() };
        let clique = vec![VarId(2)];
        assert!(empirical_one(&clique, &cards, 2, &counter).is_err());
    }
}
