/// Identifier of a discrete random variable.
///
/// Variables are indexed `0..n` and addressed through this newtype rather than
/// a bare `usize` so that factor scopes and cardinality lookups can't be
/// accidentally swapped with row indices or value indices in the algebra below.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VarId(pub usize);

impl From<usize> for VarId {
    fn from(v: usize) -> Self {
        VarId(v)
    }
}

impl From<VarId> for usize {
    fn from(v: VarId) -> Self {
        v.0
    }
}

/// Cardinalities for every variable in the model, indexed by [`VarId`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Cardinalities(Vec<usize>);

impl Cardinalities {
    pub fn new(cards: Vec<usize>) -> Self {
        Self(cards)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, v: VarId) -> usize {
        self.0[v.0]
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }
}

impl std::ops::Index<VarId> for Cardinalities {
    type Output = usize;

    fn index(&self, v: VarId) -> &Self::Output {
        &self.0[v.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexing_by_var_id() {
        let c = Cardinalities::new(vec![2, 3, 4]);
        assert_eq!(c.get(VarId(1)), 3);
        assert_eq!(c[VarId(2)], 4);
        assert_eq!(c.len(), 3);
    }
}
