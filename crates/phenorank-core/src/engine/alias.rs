//! Alias-method sampling from fixed discrete distributions.
//!
//! Walk transitions and negative sampling both draw repeatedly from
//! distributions that never change after setup, so we pay an O(n) table
//! construction once and get O(1) draws afterwards (Vose's method).

use rand::Rng;

/// Precomputed alias table over a fixed weight vector.
///
/// `sample` returns an index in `0..len` with probability proportional to
/// the weight supplied at construction. An empty table is valid and encodes
/// "nothing to draw" (isolated nodes); callers must check [`is_empty`] first.
///
/// [`is_empty`]: AliasTable::is_empty
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    prob: Vec<f64>,
    alias: Vec<u32>,
}

impl AliasTable {
    /// Builds an alias table from non-negative weights.
    ///
    /// Weights that are zero, negative, or non-finite contribute nothing.
    /// If all weights are unusable the table is empty.
    pub fn new(weights: &[f64]) -> Self {
        let n = weights.len();
        if n == 0 {
            return Self::default();
        }
        let total: f64 = weights.iter().filter(|w| w.is_finite() && **w > 0.0).sum();
        if total <= 0.0 {
            return Self::default();
        }

        // Scaled probabilities: mean 1.0 across all slots.
        let mut prob: Vec<f64> = weights
            .iter()
            .map(|&w| {
                if w.is_finite() && w > 0.0 {
                    w * n as f64 / total
                } else {
                    0.0
                }
            })
            .collect();
        let mut alias = vec![0u32; n];

        let mut small: Vec<u32> = Vec::new();
        let mut large: Vec<u32> = Vec::new();
        for (i, &p) in prob.iter().enumerate() {
            if p < 1.0 {
                small.push(i as u32);
            } else {
                large.push(i as u32);
            }
        }

        while let (Some(s), Some(l)) = (small.pop(), large.pop()) {
            alias[s as usize] = l;
            // The large slot donates the mass the small slot is missing.
            prob[l as usize] -= 1.0 - prob[s as usize];
            if prob[l as usize] < 1.0 {
                small.push(l);
            } else {
                large.push(l);
            }
        }
        // Remaining slots are exactly 1.0 up to float error.
        for i in small.into_iter().chain(large) {
            prob[i as usize] = 1.0;
        }

        Self { prob, alias }
    }

    /// Number of outcomes.
    pub fn len(&self) -> usize {
        self.prob.len()
    }

    /// True when there is nothing to draw from.
    pub fn is_empty(&self) -> bool {
        self.prob.is_empty()
    }

    /// Draws one index in O(1). Panics if the table is empty.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> usize {
        let i = rng.random_range(0..self.prob.len());
        if rng.random::<f64>() < self.prob[i] {
            i
        } else {
            self.alias[i] as usize
        }
    }
}
