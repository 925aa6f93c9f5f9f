//! # Proximal Operators
//!
//! The solver applies a proximal step after every stochastic update
//! (proximal SVRG). Besides the full-vector `call`, separable operators
//! expose `call_single` so the sparse lazy-update loop and the parallel
//! engine can apply the operator one coordinate at a time, and
//! `call_single_repeated` so a coordinate that missed `n` updates can catch
//! up in closed form where one exists.

use ndarray::{Array1, ArrayView1};

/// A proximal/projection operator applied after each gradient step.
pub trait Prox: Sync {
    /// Applies the operator in place to the whole coefficient vector.
    fn call(&self, coeffs: &mut Array1<f64>, step: f64);

    /// Applies the operator to a single coordinate value.
    fn call_single(&self, x: f64, step: f64) -> f64;

    /// Applies the operator `n` times to a single coordinate value.
    ///
    /// The default folds `call_single`; operators with a closed form
    /// override it.
    fn call_single_repeated(&self, x: f64, step: f64, n: usize) -> f64 {
        let mut x = x;
        for _ in 0..n {
            x = self.call_single(x, step);
        }
        x
    }

    /// Penalty value contributed to the recorded objective.
    fn value(&self, coeffs: ArrayView1<f64>) -> f64;

    /// Whether the operator acts coordinate-wise. Non-separable operators
    /// cannot be used with more than one thread.
    fn is_separable(&self) -> bool {
        true
    }
}

/// Identity operator: no regularization.
pub struct ProxZero;

impl Prox for ProxZero {
    fn call(&self, _coeffs: &mut Array1<f64>, _step: f64) {}

    #[inline]
    fn call_single(&self, x: f64, _step: f64) -> f64 {
        x
    }

    #[inline]
    fn call_single_repeated(&self, x: f64, _step: f64, _n: usize) -> f64 {
        x
    }

    fn value(&self, _coeffs: ArrayView1<f64>) -> f64 {
        0.0
    }
}

/// Squared-L2 (ridge) penalty `strength / 2 * ||w||^2`.
///
/// Its proximal map is a pure shrinkage `x / (1 + step * strength)`, so
/// repeated application has a closed form.
pub struct ProxL2Sq {
    strength: f64,
}

impl ProxL2Sq {
    pub fn new(strength: f64) -> Self {
        ProxL2Sq { strength }
    }
}

impl Prox for ProxL2Sq {
    fn call(&self, coeffs: &mut Array1<f64>, step: f64) {
        let shrink = 1.0 / (1.0 + step * self.strength);
        coeffs.mapv_inplace(|x| x * shrink);
    }

    #[inline]
    fn call_single(&self, x: f64, step: f64) -> f64 {
        x / (1.0 + step * self.strength)
    }

    #[inline]
    fn call_single_repeated(&self, x: f64, step: f64, n: usize) -> f64 {
        x * (1.0 / (1.0 + step * self.strength)).powi(n as i32)
    }

    fn value(&self, coeffs: ArrayView1<f64>) -> f64 {
        0.5 * self.strength * coeffs.iter().map(|x| x * x).sum::<f64>()
    }
}

/// L1 (lasso) penalty `strength * ||w||_1`, soft-thresholding prox.
pub struct ProxL1 {
    strength: f64,
}

impl ProxL1 {
    pub fn new(strength: f64) -> Self {
        ProxL1 { strength }
    }
}

impl Prox for ProxL1 {
    fn call(&self, coeffs: &mut Array1<f64>, step: f64) {
        let thresh = step * self.strength;
        coeffs.mapv_inplace(|x| soft_threshold(x, thresh));
    }

    #[inline]
    fn call_single(&self, x: f64, step: f64) -> f64 {
        soft_threshold(x, step * self.strength)
    }

    #[inline]
    fn call_single_repeated(&self, x: f64, step: f64, n: usize) -> f64 {
        // n soft-thresholds by t equal one soft-threshold by n*t as long as
        // the sign never flips, and both clamp to zero when it would.
        soft_threshold(x, n as f64 * step * self.strength)
    }

    fn value(&self, coeffs: ArrayView1<f64>) -> f64 {
        self.strength * coeffs.iter().map(|x| x.abs()).sum::<f64>()
    }
}

#[inline]
fn soft_threshold(x: f64, thresh: f64) -> f64 {
    if x > thresh {
        x - thresh
    } else if x < -thresh {
        x + thresh
    } else {
        0.0
    }
}
