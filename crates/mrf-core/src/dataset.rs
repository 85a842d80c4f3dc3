//! Fully-observed categorical dataset: every cell is a value index, never a
//! missing observation. (Latents live in the model, not in the data.)

use crate::var::Cardinalities;
use mrf_error::{MrfResult, mrf_bail};

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Dataset {
    rows: Vec<Vec<usize>>,
}

impl Dataset {
    /// Validates every cell against `cards` before accepting the dataset.
    pub fn new(rows: Vec<Vec<usize>>, cards: &Cardinalities) -> MrfResult<Self> {
        for (r, row) in rows.iter().enumerate() {
            if row.len() != cards.len() {
                mrf_bail!(
                    ShapeMismatch: "row {} has {} columns, expected {}",
                    r,
                    row.len(),
                    cards.len()
                );
            }
            for (v, &x) in row.iter().enumerate() {
                if x >= cards.as_slice()[v] {
                    mrf_bail!(
                        ShapeMismatch: "row {} variable {} value {} out of range (card {})",
                        r,
                        v,
                        x,
                        cards.as_slice()[v]
                    );
                }
            }
        }
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<usize>] {
        &self.rows
    }

    pub fn row(&self, i: usize) -> &[usize] {
        &self.rows[i]
    }

    pub fn num_vars(&self) -> usize {
        self.rows.first().map(|r| r.len()).unwrap_or(0)
    }
}
