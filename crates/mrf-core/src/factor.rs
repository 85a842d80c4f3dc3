//! Dense, stride-indexed factors over discrete variables and the algebra
//! over them: product, sum-out, marginalise, restrict, normalise (component
//! C). All arithmetic is linear-space `f64`.

use crate::assignment::{AssignmentIter, Evidence};
use crate::var::VarId;
use mrf_error::{MrfResult, mrf_err, mrf_bail};

/// A function from joint assignments over `vars` to the reals, stored as a
/// flat row-major table with `vars[0]` varying fastest (matches
/// [`AssignmentIter`]'s odometer order).
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Factor {
    vars: Vec<VarId>,
    dims: Vec<usize>,
    strides: Vec<usize>,
    values: Vec<f64>,
}

fn compute_strides(dims: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; dims.len()];
    for i in 1..dims.len() {
        strides[i] = strides[i - 1] * dims[i - 1];
    }
    strides
}

impl Factor {
    /// Builds a factor over `vars` (with per-variable cardinalities `dims`,
    /// aligned positionally with `vars`) from a row-major value table.
    pub fn new(vars: Vec<VarId>, dims: Vec<usize>, values: Vec<f64>) -> MrfResult<Self> {
        if vars.len() != dims.len() {
            mrf_bail!(ShapeMismatch: "vars len {} != dims len {}", vars.len(), dims.len());
        }
        let expected: usize = dims.iter().product();
        if values.len() != expected {
            mrf_bail!(
                ShapeMismatch: "values len {} != product of dims {}",
                values.len(),
                expected
            );
        }
        let strides = compute_strides(&dims);
        Ok(Self { vars, dims, strides, values })
    }

    pub fn uniform(vars: Vec<VarId>, dims: Vec<usize>) -> MrfResult<Self> {
        let size: usize = dims.iter().product();
        if size == 0 {
            mrf_bail!(ShapeMismatch: "uniform factor over zero-size table");
        }
        let p = 1.0 / size as f64;
        Self::new(vars.clone(), dims, vec![p; size])
    }

    pub fn vars(&self) -> &[VarId] {
        &self.vars
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn position_of(&self, v: VarId) -> Option<usize> {
        self.vars.iter().position(|&u| u == v)
    }

    fn index_of(&self, values: &[usize]) -> usize {
        values
            .iter()
            .zip(self.strides.iter())
            .map(|(&x, &s)| x * s)
            .sum()
    }

    /// Reads the entry at `assignment`, aligned positionally with `self.vars()`.
    pub fn get(&self, assignment: &[usize]) -> f64 {
        self.values[self.index_of(assignment)]
    }

    /// Reads the entry selected by a full evidence vector; every variable in
    /// `self.vars()` must have a fixed value in `evidence`.
    pub fn get_by_evidence(&self, evidence: &Evidence) -> MrfResult<f64> {
        let mut assignment = Vec::with_capacity(self.vars.len());
        for &v in &self.vars {
            match evidence.get(v.0).copied().flatten() {
                Some(x) => assignment.push(x),
                None => mrf_bail!(ShapeMismatch: "evidence does not cover variable {:?}", v),
            }
        }
        Ok(self.get(&assignment))
    }

    /// New factor over the same scope, zeroed everywhere inconsistent with
    /// `evidence`.
    pub fn restrict(&self, evidence: &Evidence) -> Self {
        let mut out = self.clone();
        for (assignment, slot) in AssignmentIter::new(&self.dims).zip(out.values.iter_mut()) {
            let consistent = self.vars.iter().zip(assignment.iter()).all(|(&v, &x)| {
                match evidence.get(v.0).copied().flatten() {
                    Some(e) => e == x,
                    None => true,
                }
            });
            if !consistent {
                *slot = 0.0;
            }
        }
        out
    }

    /// Pointwise product; result scope is the union of both scopes, ordered
    /// ascending by [`VarId`].
    pub fn product(&self, other: &Self) -> MrfResult<Self> {
        let mut vars: Vec<VarId> = self.vars.iter().chain(other.vars.iter()).copied().collect();
        vars.sort_unstable();
        vars.dedup();

        let mut dims = Vec::with_capacity(vars.len());
        for &v in &vars {
            let from_self = self.position_of(v).map(|i| self.dims[i]);
            let from_other = other.position_of(v).map(|i| other.dims[i]);
            match (from_self, from_other) {
                (Some(a), Some(b)) if a != b => {
                    mrf_bail!(ShapeMismatch: "cardinality mismatch for variable {:?}: {} vs {}", v, a, b);
                }
                (Some(a), _) => dims.push(a),
                (None, Some(b)) => dims.push(b),
                (None, None) => unreachable!("variable came from one of the two scopes"),
            }
        }

        let size: usize = dims.iter().product();
        let mut values = Vec::with_capacity(size);
        for assignment in AssignmentIter::new(&dims) {
            let a = self.project(&vars, &assignment);
            let b = other.project(&vars, &assignment);
            values.push(self.get(&a) * other.get(&b));
        }

        Self::new(vars, dims, values)
    }

    /// Projects a joint assignment (aligned with `vars`) down to the values
    /// for this factor's own scope (a subset of `vars`).
    fn project(&self, vars: &[VarId], assignment: &[usize]) -> Vec<usize> {
        self.vars
            .iter()
            .map(|&v| {
                let pos = vars.iter().position(|&u| u == v).expect("scope subset of union");
                assignment[pos]
            })
            .collect()
    }

    /// Sums a single variable `x` out of the scope, by the block-stride walk
    /// §4.C prescribes: let `s = stride_f[x]`, `c = C[x]`; step through the
    /// table in blocks of `c * s`, adding the `c` sub-slices of length `s`
    /// within each block into one sub-slice of length `s` of the result.
    pub fn sum_out_one(&self, x: VarId) -> MrfResult<Self> {
        let Some(pos) = self.position_of(x) else {
            mrf_bail!(ShapeMismatch: "variable {:?} not in factor scope", x);
        };

        let new_vars: Vec<VarId> = self
            .vars
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != pos)
            .map(|(_, &v)| v)
            .collect();
        let new_dims: Vec<usize> = self
            .dims
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != pos)
            .map(|(_, &d)| d)
            .collect();

        let c = self.dims[pos];
        let s = self.strides[pos];
        let sp = c * s;

        let size: usize = new_dims.iter().product();
        let mut values = vec![0.0; size];

        let mut index = 0;
        let mut k = 0;
        while k < self.values.len() {
            for i in 0..s {
                for j in 0..c {
                    values[index] += self.values[k + i + j * s];
                }
                index += 1;
            }
            k += sp;
        }

        Self::new(new_vars, new_dims, values)
    }

    /// Sums a set of variables out of the scope, one at a time.
    pub fn sum_out(&self, vars: &[VarId]) -> MrfResult<Self> {
        let mut current = self.clone();
        for &v in vars {
            current = current.sum_out_one(v)?;
        }
        Ok(current)
    }

    /// Marginalises down to `keep`: sums out every scope variable not in `keep`.
    pub fn marginalize(&self, keep: &[VarId]) -> MrfResult<Self> {
        let drop: Vec<VarId> = self.vars.iter().filter(|v| !keep.contains(v)).copied().collect();
        self.sum_out(&drop)
    }

    /// Divides in place by the sum of all entries. Fails if the sum is zero.
    pub fn normalize(&mut self) -> MrfResult<()> {
        let sum: f64 = self.values.iter().sum();
        if sum == 0.0 {
            mrf_bail!(ZeroNormalisation: "factor over {:?} sums to zero", self.vars);
        }
        if sum.is_nan() {
            mrf_bail!(NaNAccumulator: "factor over {:?} contains NaN before normalisation", self.vars);
        }
        for v in self.values.iter_mut() {
            *v /= sum;
        }
        Ok(())
    }

    /// Same shape, every entry zero. Used to seed EM's per-iteration
    /// expected-count accumulators.
    pub fn clear_copy(&self) -> Self {
        Self {
            vars: self.vars.clone(),
            dims: self.dims.clone(),
            strides: self.strides.clone(),
            values: vec![0.0; self.values.len()],
        }
    }

    /// Adds `other`'s values into `self`, entry by entry. Both factors must
    /// share the same scope and shape (as produced by [`Factor::clear_copy`]).
    pub fn accumulate(&mut self, other: &Self) -> MrfResult<()> {
        if self.vars != other.vars || self.dims != other.dims {
            mrf_bail!(ShapeMismatch: "accumulate: scope/shape mismatch");
        }
        for (a, &b) in self.values.iter_mut().zip(other.values.iter()) {
            *a += b;
            if a.is_nan() {
                mrf_bail!(NaNAccumulator: "accumulator over {:?} became NaN", self.vars);
            }
        }
        Ok(())
    }

    /// Maximum absolute per-entry difference across two equal-length,
    /// pairwise-matching-shape factor lists, plus the `(list index, entry
    /// index)` at which it was attained.
    pub fn max_difference(a: &[Self], b: &[Self]) -> MrfResult<(f64, usize, usize)> {
        if a.len() != b.len() {
            mrf_bail!(ShapeMismatch: "max_difference: list lengths {} != {}", a.len(), b.len());
        }
        let mut best = (0.0f64, 0usize, 0usize);
        for (k, (fa, fb)) in a.iter().zip(b.iter()).enumerate() {
            if fa.vars != fb.vars || fa.dims != fb.dims {
                mrf_bail!(ShapeMismatch: "max_difference: shape mismatch at list index {}", k);
            }
            for (j, (&va, &vb)) in fa.values.iter().zip(fb.values.iter()).enumerate() {
                let d = (va - vb).abs();
                if d > best.0 {
                    best = (d, k, j);
                }
            }
        }
        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(vars: &[usize], dims: &[usize], values: &[f64]) -> Factor {
        Factor::new(
            vars.iter().map(|&v| VarId(v)).collect(),
            dims.to_vec(),
            values.to_vec(),
        )
        .unwrap()
    }

    #[test]
    fn indexing_roundtrip() {
        let fac = f(&[0, 1], &[2, 3], &[0., 1., 2., 3., 4., 5.]);
        assert_eq!(fac.get(&[0, 0]), 0.);
        assert_eq!(fac.get(&[1, 0]), 1.);
        assert_eq!(fac.get(&[0, 1]), 2.);
        assert_eq!(fac.get(&[1, 2]), 5.);
    }

    #[test]
    fn uniform_sums_to_one() {
        let u = Factor::uniform(vec![VarId(0), VarId(1)], vec![2, 2]).unwrap();
        assert_eq!(u.values(), &[0.25, 0.25, 0.25, 0.25]);
    }

    #[test]
    fn product_is_commutative_in_support() {
        let a = f(&[0], &[2], &[0.3, 0.7]);
        let b = f(&[1], &[2], &[0.4, 0.6]);
        let ab = a.product(&b).unwrap();
        let ba = b.product(&a).unwrap();
        assert_eq!(ab.vars(), &[VarId(0), VarId(1)]);
        assert_eq!(ba.vars(), &[VarId(0), VarId(1)]);
        assert_eq!(ab.values(), ba.values());
        assert!((ab.get(&[0, 1]) - 0.3 * 0.6).abs() < 1e-12);
    }

    #[test]
    fn sum_out_one_matches_hand_computation() {
        let fac = f(&[0, 1], &[2, 2], &[1., 2., 3., 4.]);
        let marg = fac.sum_out_one(VarId(0)).unwrap();
        assert_eq!(marg.vars(), &[VarId(1)]);
        assert_eq!(marg.values(), &[3.0, 7.0]);
    }

    #[test]
    fn marginalize_identity_over_full_scope() {
        let fac = f(&[0, 1], &[2, 2], &[1., 2., 3., 4.]);
        let same = fac.marginalize(&[VarId(0), VarId(1)]).unwrap();
        assert_eq!(same.values(), fac.values());
    }

    #[test]
    fn restrict_zeros_inconsistent_entries() {
        let fac = f(&[0, 1], &[2, 2], &[1., 2., 3., 4.]);
        let evidence: Evidence = vec![Some(0), None];
        let r = fac.restrict(&evidence);
        assert_eq!(r.values(), &[1., 0., 3., 0.]);
    }

    #[test]
    fn normalize_zero_sum_is_fatal() {
        let mut z = f(&[0], &[2], &[0., 0.]);
        assert!(z.normalize().is_err());
    }

    #[test]
    fn normalize_is_idempotent() {
        let mut a = f(&[0], &[2], &[1., 3.]);
        a.normalize().unwrap();
        let once = a.values().to_vec();
        a.normalize().unwrap();
        assert_eq!(a.values(), once.as_slice());
    }

    #[test]
    fn max_difference_reports_worst_offender() {
        let a = vec![f(&[0], &[2], &[0.1, 0.9])];
        let b = vec![f(&[0], &[2], &[0.4, 0.6])];
        let (delta, list, entry) = Factor::max_difference(&a, &b).unwrap();
        assert!((delta - 0.3).abs() < 1e-12);
        assert_eq!(list, 0);
        assert_eq!(entry, 0);
    }

    #[test]
    fn duality_sum_out_after_product_equals_product_of_sums() {
        let a = f(&[0], &[2], &[0.3, 0.7]);
        let b = f(&[1], &[2], &[0.4, 0.6]);
        let prod = a.product(&b).unwrap();
        let summed = prod.sum_out(&[VarId(0), VarId(1)]).unwrap();
        let sum_a: f64 = a.values().iter().sum();
        let sum_b: f64 = b.values().iter().sum();
        assert!((summed.values()[0] - sum_a * sum_b).abs() < 1e-12);
    }
}
