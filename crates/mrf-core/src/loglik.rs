//! Structural log-likelihood score (component F's external validation
//! surface, §6): scores a clique/separator decomposition against empirical
//! counts without running EM.

use crate::counter::Counter;
use crate::var::{Cardinalities, VarId};

/// `Σ_c Σ_j n_{c,j} · ln(n_{c,j} / L) − Σ_s Σ_j n_{s,j} · ln(n_{s,j} / L)`,
/// where `n_{c,j}` / `n_{s,j}` are empirical joint counts for each clique /
/// separator assignment. Terms with a zero count contribute nothing (the
/// `0 · ln(0)` convention).
pub fn struct_log_likelihood<C: Counter>(
    cliques: &[Vec<VarId>],
    separators: &[Vec<VarId>],
    counter: &C,
    cards: &Cardinalities,
) -> f64 {
    let l = counter.num_tuples() as f64;
    let mut ll = 0.0;
    for clique in cliques {
        ll += sum_term(clique, counter, cards, l);
    }
    for sep in separators {
        ll -= sum_term(sep, counter, cards, l);
    }
    ll
}

fn sum_term<C: Counter>(vars: &[VarId], counter: &C, cards: &Cardinalities, l: f64) -> f64 {
    if vars.is_empty() {
        return 0.0;
    }
    let Some(counts) = counter.occurrences(vars, cards) else {
        return 0.0;
    };
    counts
        .iter()
        .filter(|&&n| n > 0)
        .map(|&n| n as f64 * (n as f64 / l).ln())
        .sum()
}
