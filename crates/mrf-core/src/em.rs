//! Expectation-Maximization driver (component F): alternates expected-count
//! accumulation (per-row evidence reduction + calibration + normalised
//! belief accumulation) and maximization (potential replacement) until the
//! max potential delta drops below the configured threshold.

use crate::assignment::Evidence;
use crate::clique::CliqueTree;
use crate::config::EmConfig;
use crate::dataset::Dataset;
use crate::factor::Factor;
use mrf_error::{MrfError, MrfResult, mrf_bail};

/// Summary of a converged EM run, returned alongside the clique tree whose
/// backup potentials now hold the learned parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EmReport {
    pub iterations: usize,
    pub final_delta: f64,
}

/// Builds the evidence vector for one dataset row against a tree that may
/// reference latent variables beyond the dataset's own column count: every
/// column the row has is a fixed value, everything past it is unobserved.
fn row_evidence(row: &[usize], num_vars: usize) -> Evidence {
    (0..num_vars).map(|v| row.get(v).copied()).collect()
}

/// Runs EM (§4.F) to convergence (or failure) over `tree`, whose backup
/// potentials must already be seeded (via [`crate::init`]). On success,
/// `tree`'s backup potentials hold the learned parameters and the report
/// carries the iteration count and final delta.
pub fn run(tree: &mut CliqueTree, dataset: &Dataset, config: &EmConfig) -> MrfResult<EmReport> {
    let num_vars = tree.num_variables();
    let mut iteration = 0usize;

    loop {
        let mut accumulators: Vec<Factor> = tree.bkp_potential_list().iter().map(Factor::clear_copy).collect();

        for (row_idx, row) in dataset.rows().iter().enumerate() {
            let evidence = row_evidence(row, num_vars);
            tree.reduce_by_evidence(&evidence)
                .map_err(|e| annotate_row(e, row_idx))?;
            tree.up_down_calibration().map_err(|e| annotate_row(e, row_idx))?;

            for (i, acc) in accumulators.iter_mut().enumerate() {
                let mut belief = tree.calibrated(i).map_err(|e| annotate_row(e, row_idx))?.clone();
                let sum: f64 = belief.values().iter().sum();
                if sum <= 0.0 {
                    mrf_bail!(ZeroBelief: "row {}: clique {} calibrated to non-positive belief", row_idx, i);
                }
                belief.normalize()?;
                acc.accumulate(&belief)?;
            }

            #[cfg(feature = "trace-rows")]
            tracing::debug!(row = row_idx, "row calibrated and accumulated");
        }

        if config.normalise {
            for acc in accumulators.iter_mut() {
                acc.normalize()?;
            }
        }

        let (delta, _, _) = Factor::max_difference(&tree.bkp_potential_list(), &accumulators)?;
        tree.set_all_potentials(accumulators)?;

        tracing::info!(iteration, delta, "EM iteration complete");

        if delta < config.epsilon {
            return Ok(EmReport { iterations: iteration + 1, final_delta: delta });
        }

        iteration += 1;
        if iteration >= config.max_iterations {
            return Err(MrfError::NotConverged { iterations: iteration, delta });
        }
    }
}

fn annotate_row(e: MrfError, row_idx: usize) -> MrfError {
    e.with_context(format!("EM row {}", row_idx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clique::CliqueTree;
    use crate::config::InitMode;
    use crate::counter::{BitCounter, Counter};
    use crate::init;
    use crate::var::{Cardinalities, VarId};

    fn make_tree(cards: &Cardinalities, init_pots: Vec<Factor>) -> CliqueTree {
        let cliques = vec![vec![VarId(0), VarId(1)], vec![VarId(1), VarId(2)]];
        let parent = vec![Some(1), None];
        CliqueTree::new(cliques, parent, cards.clone(), init_pots).unwrap()
    }

    fn three_var_dataset() -> (Dataset, Cardinalities) {
        let cards = Cardinalities::new(vec![2, 2, 2]);
        // Deterministic correlated rows: var2 = var1, var1 independent-ish of var0.
        let rows = vec![
            vec![0, 0, 0],
            vec![0, 0, 0],
            vec![0, 1, 1],
            vec![1, 0, 0],
            vec![1, 1, 1],
            vec![1, 1, 1],
            vec![0, 0, 0],
            vec![1, 0, 0],
        ];
        (Dataset::new(rows, &cards).unwrap(), cards)
    }

    #[test]
    fn em_converges_to_empirical_joint_fully_observed() {
        let (dataset, cards) = three_var_dataset();
        let cliques = vec![vec![VarId(0), VarId(1)], vec![VarId(1), VarId(2)]];
        let initial = init::uniform(&cliques, &cards).unwrap();
        let mut tree = make_tree(&cards, initial);

        let config = EmConfig::new().with_normalise(true).with_max_iterations(50);
        let report = run(&mut tree, &dataset, &config).unwrap();
        assert!(report.iterations <= 50);
        assert!(report.final_delta < config.epsilon);

        let counter = BitCounter::load_from_data(&dataset, cards.clone());
        let empirical01 = counter.occurrences(&[VarId(0), VarId(1)], &cards).unwrap();
        let total: u64 = empirical01.iter().sum();
        let expected01: Vec<f64> = empirical01.iter().map(|&n| n as f64 / total as f64).collect();

        let learned = tree.bkp_potential_list();
        for (got, want) in learned[0].values().iter().zip(expected01.iter()) {
            assert!((got - want).abs() < 1e-8, "{} vs {}", got, want);
        }
    }

    #[test]
    fn em_reports_not_converged_when_capped_too_low() {
        let (dataset, cards) = three_var_dataset();
        let cliques = vec![vec![VarId(0), VarId(1)], vec![VarId(1), VarId(2)]];
        let initial = init::uniform(&cliques, &cards).unwrap();
        let mut tree = make_tree(&cards, initial);

        let config = EmConfig::new().with_normalise(true).with_max_iterations(1).with_init_mode(InitMode::Uniform);
        let err = run(&mut tree, &dataset, &config).unwrap_err();
        assert!(matches!(err, MrfError::NotConverged { .. }));
    }
}
