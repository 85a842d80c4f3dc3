//! Lexicographic enumeration of joint value vectors over an ordered variable
//! list, given per-variable cardinalities (component A).

use crate::var::{Cardinalities, VarId};

/// One joint assignment of values to an ordered variable list, in the same
/// order as the list itself (`values[i]` is the value of `vars[i]`).
pub type AssignmentValues = Vec<usize>;

/// Evidence over the full variable space: `evidence[v] = Some(x)` fixes
/// variable `v` to value `x`; `None` leaves it unobserved.
pub type Evidence = Vec<Option<usize>>;

/// A finite, non-restartable lazy sequence of assignments over a fixed list
/// of per-position cardinalities, visited in odometer order: position 0
/// varies fastest.
pub struct AssignmentIter<'a> {
    dims: &'a [usize],
    current: AssignmentValues,
    exhausted: bool,
}

impl<'a> AssignmentIter<'a> {
    pub fn new(dims: &'a [usize]) -> Self {
        let exhausted = dims.iter().any(|&c| c == 0);
        Self {
            dims,
            current: vec![0; dims.len()],
            exhausted,
        }
    }

}

/// Per-position cardinalities of `vars` against the model-wide cardinality
/// vector; feed the result to [`AssignmentIter::new`] to enumerate `vars`.
pub fn dims_of(vars: &[VarId], cards: &Cardinalities) -> Vec<usize> {
    vars.iter().map(|&v| cards.get(v)).collect()
}

/// Flat row-major index of `values` under `dims` (position 0 fastest), the
/// same convention [`AssignmentIter`] enumerates in.
pub fn flat_index(dims: &[usize], values: &[usize]) -> usize {
    let mut stride = 1;
    let mut idx = 0;
    for (&d, &x) in dims.iter().zip(values.iter()) {
        idx += x * stride;
        stride *= d;
    }
    idx
}

impl<'a> Iterator for AssignmentIter<'a> {
    type Item = AssignmentValues;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        let result = self.current.clone();

        // Odometer increment: position 0 fastest.
        let mut i = 0;
        loop {
            if i == self.dims.len() {
                self.exhausted = true;
                break;
            }
            self.current[i] += 1;
            if self.current[i] < self.dims[i] {
                break;
            }
            self.current[i] = 0;
            i += 1;
        }

        Some(result)
    }
}

/// `true` iff `values` (aligned with `vars`) agrees with `evidence` on every
/// variable `evidence` has an opinion about.
pub fn is_consistent(vars: &[VarId], values: &[usize], evidence: &Evidence) -> bool {
    vars.iter().zip(values.iter()).all(|(&v, &x)| match evidence.get(v.0) {
        Some(Some(e)) => *e == x,
        _ => true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cards(v: &[usize]) -> Cardinalities {
        Cardinalities::new(v.to_vec())
    }

    #[test]
    fn enumerates_in_odometer_order() {
        let vars = [VarId(0), VarId(1)];
        let c = cards(&[2, 3]);
        let dims = dims_of(&vars, &c);
        let all: Vec<_> = AssignmentIter::new(&dims).collect();
        assert_eq!(
            all,
            vec![
                vec![0, 0],
                vec![1, 0],
                vec![0, 1],
                vec![1, 1],
                vec![0, 2],
                vec![1, 2],
            ]
        );
    }

    #[test]
    fn length_matches_product_of_cardinalities() {
        let vars = [VarId(0), VarId(1), VarId(2)];
        let c = cards(&[2, 2, 3]);
        let dims = dims_of(&vars, &c);
        assert_eq!(AssignmentIter::new(&dims).count(), 12);
    }

    #[test]
    fn consistency_check_respects_evidence() {
        let vars = [VarId(0), VarId(1)];
        let evidence: Evidence = vec![Some(1), None];
        assert!(is_consistent(&vars, &[1, 0], &evidence));
        assert!(!is_consistent(&vars, &[0, 0], &evidence));
    }
}
