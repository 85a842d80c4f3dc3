//! Tree of cliques with separator-indexed messages (component D): evidence
//! reduction, two-pass collect/distribute calibration, and the potential
//! backup/restore cycle EM drives per iteration.

use crate::assignment::Evidence;
use crate::factor::Factor;
use crate::var::{Cardinalities, VarId};
use mrf_error::{MrfResult, mrf_bail};

/// One clique-tree node: its variable scope, its separator with its parent,
/// and the potentials/messages live message passing mutates.
struct Node {
    clique: Vec<VarId>,
    separator: Vec<VarId>,
    parent: Option<usize>,
    children: Vec<usize>,
    /// `β_i`: the canonical potential every row's calibration starts from.
    backup: Factor,
    /// `φ_i`: mutated in place through `ReduceByEvidence` and calibration.
    current: Factor,
    /// `σ_i`: the message this node sent to its parent during the last
    /// collect pass, kept so distribute can divide it back out. `None`
    /// before the first calibration (or for the root, which has no parent
    /// to send a message to).
    sigma: Option<Factor>,
}

/// Rooted tree of cliques (component D). The topology is supplied as a
/// parent array with `None` at exactly one position; whichever index that
/// is becomes the root, discovered once at construction time (no fixed
/// index is assumed anywhere else in this module).
pub struct CliqueTree {
    cards: Cardinalities,
    nodes: Vec<Node>,
    post_order: Vec<usize>,
    pre_order: Vec<usize>,
    /// `true` once `UpDownCalibration` has completed successfully since the
    /// last `ReduceByEvidence`; `Calibrated` refuses to read a stale belief.
    calibrated: bool,
}

impl CliqueTree {
    /// Builds the tree from its fixed topology and one initial potential per
    /// clique (becomes both the first backup and the first current
    /// potential). Variables within each clique must already be ascending
    /// (§6); separators are derived, not supplied, as `K_i ∩ K_{p(i)}`.
    pub fn new(
        cliques: Vec<Vec<VarId>>,
        parent: Vec<Option<usize>>,
        cards: Cardinalities,
        potentials: Vec<Factor>,
    ) -> MrfResult<Self> {
        let n = cliques.len();
        if parent.len() != n || potentials.len() != n {
            mrf_bail!(
                ShapeMismatch: "clique tree: {} cliques, {} parents, {} potentials",
                n,
                parent.len(),
                potentials.len()
            );
        }

        let roots = parent.iter().filter(|p| p.is_none()).count();
        if roots != 1 {
            mrf_bail!(ShapeMismatch: "clique tree must have exactly one root, found {}", roots);
        }

        for clique in &cliques {
            if !clique.windows(2).all(|w| w[0] < w[1]) {
                mrf_bail!(ShapeMismatch: "clique variables must be strictly ascending: {:?}", clique);
            }
        }

        let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, p) in parent.iter().enumerate() {
            if let Some(p) = *p {
                if p >= n {
                    mrf_bail!(ShapeMismatch: "parent index {} out of range for node {}", p, i);
                }
                children[p].push(i);
            }
        }

        let mut nodes = Vec::with_capacity(n);
        for i in 0..n {
            let separator = match parent[i] {
                Some(p) => intersect_sorted(&cliques[i], &cliques[p]),
                None => Vec::new(),
            };
            nodes.push(Node {
                clique: cliques[i].clone(),
                separator,
                parent: parent[i],
                children: std::mem::take(&mut children[i]),
                backup: potentials[i].clone(),
                current: potentials[i].clone(),
                sigma: None,
            });
        }

        let root = parent.iter().position(|p| p.is_none()).expect("exactly one root checked above");
        let post_order = post_order_from(&nodes, root);
        let pre_order = pre_order_from(&nodes, root);

        Ok(Self { cards, nodes, post_order, pre_order, calibrated: false })
    }

    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn clique(&self, i: usize) -> &[VarId] {
        &self.nodes[i].clique
    }

    pub fn separator(&self, i: usize) -> &[VarId] {
        &self.nodes[i].separator
    }

    pub fn parent_of(&self, i: usize) -> Option<usize> {
        self.nodes[i].parent
    }

    /// Highest variable id referenced by any clique, plus one; the size an
    /// evidence vector must have to cover every variable the tree touches
    /// (observed and latent).
    pub fn num_variables(&self) -> usize {
        self.nodes
            .iter()
            .flat_map(|n| n.clique.iter())
            .map(|v| v.0 + 1)
            .max()
            .unwrap_or(0)
    }

    /// Replaces every node's backup potential. Does not touch `current`;
    /// the next `ReduceByEvidence` will repopulate it from the new backups.
    pub fn set_all_potentials(&mut self, potentials: Vec<Factor>) -> MrfResult<()> {
        if potentials.len() != self.nodes.len() {
            mrf_bail!(
                ShapeMismatch: "set_all_potentials: {} potentials for {} nodes",
                potentials.len(),
                self.nodes.len()
            );
        }
        for (node, p) in self.nodes.iter_mut().zip(potentials.into_iter()) {
            node.backup = p;
        }
        Ok(())
    }

    pub fn bkp_potential_list(&self) -> Vec<Factor> {
        self.nodes.iter().map(|n| n.backup.clone()).collect()
    }

    pub fn curr_potential(&self, i: usize) -> &Factor {
        &self.nodes[i].current
    }

    /// `μ_i = φ_i` once calibration has succeeded; fails if no successful
    /// calibration has run since the last evidence reduction.
    pub fn calibrated(&self, i: usize) -> MrfResult<&Factor> {
        if !self.calibrated {
            mrf_bail!(ShapeMismatch: "clique tree has not been calibrated");
        }
        Ok(&self.nodes[i].current)
    }

    /// `φ_i ← Restrict(β_i, e)` for every node; clears any prior calibration
    /// state (the separator messages from the last collect pass no longer
    /// mean anything once the potentials underneath them change).
    pub fn reduce_by_evidence(&mut self, evidence: &Evidence) -> MrfResult<()> {
        for node in self.nodes.iter_mut() {
            node.current = node.backup.restrict(evidence);
            node.sigma = None;
        }
        self.calibrated = false;
        Ok(())
    }

    /// Two-pass collect/distribute message passing (§4.D).
    pub fn up_down_calibration(&mut self) -> MrfResult<()> {
        self.collect()?;
        self.distribute()?;
        self.calibrated = true;
        Ok(())
    }

    /// Post-order collect: once a node has absorbed every child's message
    /// into its own potential, it sends the marginal onto its separator up
    /// to its parent and multiplies that same message into the parent's
    /// potential in the same step.
    fn collect(&mut self) -> MrfResult<()> {
        for &i in &self.post_order.clone() {
            let Some(parent) = self.nodes[i].parent else {
                continue;
            };
            let message = self.nodes[i].current.marginalize(&self.nodes[i].separator)?;
            self.nodes[parent].current = self.nodes[parent].current.product(&message)?;
            self.nodes[i].sigma = Some(message);
        }
        Ok(())
    }

    /// Pre-order distribute: each node passes its own (now-collected)
    /// potential down onto each child's separator, divided by the message
    /// that child sent up during collect, and multiplies the quotient into
    /// the child's potential.
    fn distribute(&mut self) -> MrfResult<()> {
        for &i in &self.pre_order.clone() {
            let children = self.nodes[i].children.clone();
            for c in children {
                let down = self.nodes[i].current.marginalize(&self.nodes[c].separator)?;
                let sigma_c = self.nodes[c]
                    .sigma
                    .clone()
                    .expect("collect always sets sigma for every non-root node");
                let quotient = divide_checked(&down, &sigma_c)?;
                self.nodes[c].current = self.nodes[c].current.product(&quotient)?;
            }
        }
        for node in &self.nodes {
            let sum: f64 = node.current.values().iter().sum();
            if sum == 0.0 {
                mrf_bail!(ZeroBelief: "clique {:?} calibrated to zero belief", node.clique);
            }
            if sum.is_nan() {
                mrf_bail!(NaNAccumulator: "clique {:?} calibrated belief is NaN", node.clique);
            }
        }
        Ok(())
    }

    /// Unnormalised joint mass of a fully specified evidence tuple under the
    /// learned model (§4.G): the product, over every backup potential, of
    /// its value at `e`. Grounded in `Mrf.UnnormalizedProb` from the
    /// original reference implementation.
    pub fn unnormalized_product(&self, evidence: &Evidence) -> MrfResult<f64> {
        let mut q = 1.0;
        for node in &self.nodes {
            q *= node.backup.get_by_evidence(evidence)?;
        }
        Ok(q)
    }

    /// Log-space counterpart of [`Self::unnormalized_product`]
    /// (`Mrf.UnnormLogProb`), avoiding underflow on models with many
    /// potentials.
    pub fn unnormalized_log_product(&self, evidence: &Evidence) -> MrfResult<f64> {
        let mut q = 0.0;
        for node in &self.nodes {
            q += node.backup.get_by_evidence(evidence)?.ln();
        }
        Ok(q)
    }

    pub fn cardinalities(&self) -> &Cardinalities {
        &self.cards
    }
}

fn intersect_sorted(a: &[VarId], b: &[VarId]) -> Vec<VarId> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

/// Pointwise `a / b`; `0/0 ≡ 0` and `x/0` for `x > 0` is a fatal invariant
/// violation (an inconsistent evidence set driving nonzero mass through a
/// separator that calibration zeroed out).
fn divide_checked(a: &Factor, b: &Factor) -> MrfResult<Factor> {
    if a.vars() != b.vars() || a.dims() != b.dims() {
        mrf_bail!(ShapeMismatch: "divide_checked: shape mismatch between separator factors");
    }
    let mut out = a.clone();
    for (slot, &denom) in out.values_mut().iter_mut().zip(b.values().iter()) {
        if denom == 0.0 {
            if *slot == 0.0 {
                *slot = 0.0;
            } else {
                mrf_bail!(
                    DivergentSeparator: "separator divide: {} / 0 with nonzero numerator",
                    *slot
                );
            }
        } else {
            *slot /= denom;
        }
    }
    Ok(out)
}

fn post_order_from(nodes: &[Node], root: usize) -> Vec<usize> {
    let mut order = Vec::with_capacity(nodes.len());
    fn visit(nodes: &[Node], i: usize, order: &mut Vec<usize>) {
        for &c in &nodes[i].children {
            visit(nodes, c, order);
        }
        order.push(i);
    }
    visit(nodes, root, &mut order);
    order
}

fn pre_order_from(nodes: &[Node], root: usize) -> Vec<usize> {
    let mut order = Vec::with_capacity(nodes.len());
    fn visit(nodes: &[Node], i: usize, order: &mut Vec<usize>) {
        order.push(i);
        for &c in &nodes[i].children {
            visit(nodes, c, order);
        }
    }
    visit(nodes, root, &mut order);
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    // Chain 0-1-2 over three binary variables: clique 0 = {0,1}, clique 1 =
    // {1,2}, clique 1 is the root and parent of both.
    fn chain_tree(potentials: Vec<Factor>) -> CliqueTree {
        let cards = Cardinalities::new(vec![2, 2, 2]);
        let cliques = vec![vec![VarId(0), VarId(1)], vec![VarId(1), VarId(2)]];
        let parent = vec![Some(1), None];
        CliqueTree::new(cliques, parent, cards, potentials).unwrap()
    }

    fn f(vars: &[usize], dims: &[usize], values: &[f64]) -> Factor {
        Factor::new(vars.iter().map(|&v| VarId(v)).collect(), dims.to_vec(), values.to_vec()).unwrap()
    }

    #[test]
    fn separators_are_derived_from_parent_cliques() {
        let pots = vec![f(&[0, 1], &[2, 2], &[1., 1., 1., 1.]), f(&[1, 2], &[2, 2], &[1., 1., 1., 1.])];
        let tree = chain_tree(pots);
        assert_eq!(tree.separator(0), &[VarId(1)]);
        assert_eq!(tree.separator(1), &[]);
    }

    #[test]
    fn rejects_more_than_one_root() {
        let cards = Cardinalities::new(vec![2, 2]);
        let cliques = vec![vec![VarId(0)], vec![VarId(1)]];
        let pots = vec![Factor::uniform(vec![VarId(0)], vec![2]).unwrap(), Factor::uniform(vec![VarId(1)], vec![2]).unwrap()];
        assert!(CliqueTree::new(cliques, vec![None, None], cards, pots).is_err());
    }

    #[test]
    fn full_evidence_calibration_matches_family_marginals() {
        // Joint over (0,1,2): P(0,1) and P(1,2) potentials that are
        // consistent marginals of the same underlying joint.
        let pots = vec![
            f(&[0, 1], &[2, 2], &[0.25, 0.10, 0.15, 0.50]),
            f(&[1, 2], &[2, 2], &[0.35, 0.05, 0.20, 0.40]),
        ];
        let mut tree = chain_tree(pots);
        let evidence: Evidence = vec![None, None, None];
        tree.reduce_by_evidence(&evidence).unwrap();
        tree.up_down_calibration().unwrap();

        let mu0 = tree.calibrated(0).unwrap().clone();
        let mu1 = tree.calibrated(1).unwrap().clone();
        let m0 = mu0.marginalize(&[VarId(1)]).unwrap();
        let m1 = mu1.marginalize(&[VarId(1)]).unwrap();
        for (a, b) in m0.values().iter().zip(m1.values().iter()) {
            assert!((a - b).abs() < 1e-10, "{} vs {}", a, b);
        }
    }

    #[test]
    fn evidence_restriction_yields_zero_belief_on_impossible_assignment() {
        let pots = vec![
            f(&[0, 1], &[2, 2], &[1.0, 0.0, 0.0, 1.0]),
            f(&[1, 2], &[2, 2], &[1.0, 0.0, 0.0, 1.0]),
        ];
        let mut tree = chain_tree(pots);
        // Variable 0 fixed to 0, variable 2 fixed to 1: impossible under the
        // potentials above since they only ever agree on matching values.
        let evidence: Evidence = vec![Some(0), None, Some(1)];
        tree.reduce_by_evidence(&evidence).unwrap();
        assert!(tree.up_down_calibration().is_err());
    }

    #[test]
    fn calibrated_fails_before_any_calibration_runs() {
        let pots = vec![f(&[0, 1], &[2, 2], &[1., 1., 1., 1.]), f(&[1, 2], &[2, 2], &[1., 1., 1., 1.])];
        let tree = chain_tree(pots);
        assert!(tree.calibrated(0).is_err());
    }

    #[test]
    fn unnormalized_product_matches_hand_product() {
        let pots = vec![f(&[0, 1], &[2, 2], &[1., 2., 3., 4.]), f(&[1, 2], &[2, 2], &[1., 1., 1., 2.])];
        let tree = chain_tree(pots);
        let evidence: Evidence = vec![Some(1), Some(0), Some(1)];
        // (0,1)=(1,0) -> index 1 -> value 2.0; (1,2)=(0,1) -> index 2 -> value 1.0
        let got = tree.unnormalized_product(&evidence).unwrap();
        assert!((got - 2.0).abs() < 1e-12);
        let log_got = tree.unnormalized_log_product(&evidence).unwrap();
        assert!((log_got - 2.0f64.ln()).abs() < 1e-12);
    }
}
