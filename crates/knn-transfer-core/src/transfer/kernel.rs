//! # Adaptive Kernel
//!
//! Turns neighbor distances into vote weights. The kernel bandwidth is derived
//! per query row from the spread of that row's own neighbor distances:
//!
//! - `σ = std(d)` (population standard deviation over the k distances)
//! - `s = (2 / σ)²`
//! - `w_j = exp(-d_j / s)`, normalised so the row sums to 1
//!
//! A row whose distances are all equal has `σ = 0`, an infinite bandwidth
//! scale and therefore uniform weights.

use rayon::prelude::*;

use crate::index::Neighbors;

/// Bandwidth scale `s = (2 / σ)²` for one row of neighbor distances.
pub fn bandwidth(distances: &[f64]) -> f64 {
    (2.0 / std_dev(distances)).powi(2)
}

/// Normalised kernel weights for one row of neighbor distances.
///
/// Exponents are taken relative to the nearest distance, `(d_j - d_min) / s`,
/// which cancels in the normalisation and keeps the nearest weight at
/// `exp(0)`, so a row never underflows to all zeros. The exponent is formed
/// as `(d_j - d_min) · (σ/2)²` so that a vanishing scale `s` does not turn
/// into `0 / 0`.
pub fn adaptive_weights(distances: &[f64]) -> Vec<f64> {
    if distances.is_empty() {
        return Vec::new();
    }

    let half_sigma = std_dev(distances) / 2.0;
    let floor = distances.iter().copied().fold(f64::INFINITY, f64::min);

    let mut weights: Vec<f64> = distances
        .iter()
        .map(|d| (-((d - floor) * half_sigma * half_sigma)).exp())
        .collect();
    let total: f64 = weights.iter().sum();
    for w in &mut weights {
        *w /= total;
    }
    weights
}

/// Normalised weights for every query row of a neighbor search.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightMatrix {
    k: usize,
    weights: Vec<f64>,
}

impl WeightMatrix {
    pub fn from_neighbors(neighbors: &Neighbors) -> Self {
        let rows: Vec<Vec<f64>> = (0..neighbors.len())
            .into_par_iter()
            .map(|i| adaptive_weights(neighbors.distances(i)))
            .collect();
        Self {
            k: neighbors.k(),
            weights: rows.into_iter().flatten().collect(),
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn len(&self) -> usize {
        if self.k == 0 { 0 } else { self.weights.len() / self.k }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Weights of query row `i`, aligned with `Neighbors::indices(i)`.
    pub fn row(&self, i: usize) -> &[f64] {
        &self.weights[i * self.k..(i + 1) * self.k]
    }
}

/// Population standard deviation, computed on values scaled by their largest
/// magnitude so that squaring cannot overflow.
fn std_dev(values: &[f64]) -> f64 {
    let scale = values.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    if scale == 0.0 || !scale.is_finite() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|v| v / scale).sum::<f64>() / n;
    let var = values
        .iter()
        .map(|v| {
            let c = v / scale - mean;
            c * c
        })
        .sum::<f64>()
        / n;
    scale * var.sqrt()
}
