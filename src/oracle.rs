//! # Gradient/Loss Oracle Adapter
//!
//! Boundary between the solver loops and the `Model` capability. The
//! adapter owns the layout convention (intercept stored as the last
//! coefficient), computes inner products against any `CoeffRead` storage,
//! and reduces per-sample quantities into full gradients and losses with
//! rayon.
//!
//! The per-sample gradient is never materialized on the stochastic path:
//! the loops consume the scalar factor and the feature row directly, which
//! is what preserves sparse-update complexity.

use crate::features::{CoeffRead, FeatureRow};
use crate::model::Model;
use ndarray::{Array1, ArrayView1};
use rayon::prelude::*;

/// Oracle adapter over a borrowed model.
pub struct Oracle<'a, M: Model> {
    model: &'a M,
}

impl<'a, M: Model> Oracle<'a, M> {
    pub fn new(model: &'a M) -> Self {
        Oracle { model }
    }

    /// Inner product `x_i . w (+ b)` for sample `i`, reading only the
    /// coordinates sample `i` touches (plus the intercept).
    pub fn inner_prod<R: CoeffRead + ?Sized>(&self, i: usize, coeffs: &R) -> f64 {
        let mut inner = self.model.features_row(i).dot(coeffs);
        if self.model.fit_intercept() {
            inner += coeffs.get(self.model.n_features());
        }
        inner
    }

    /// Scalar gradient factor for sample `i` at the current coefficients.
    pub fn grad_i_factor<R: CoeffRead + ?Sized>(&self, i: usize, coeffs: &R) -> f64 {
        self.model.grad_factor(i, self.inner_prod(i, coeffs))
    }

    /// Materializes the dense per-sample gradient `grad_i(w)` into `out`.
    pub fn grad_i(&self, i: usize, coeffs: ArrayView1<f64>, out: &mut Array1<f64>) {
        out.fill(0.0);
        let factor = self.grad_i_factor(i, &coeffs);
        self.model
            .features_row(i)
            .for_each_nonzero(|j, x| out[j] = factor * x);
        if self.model.fit_intercept() {
            out[self.model.n_features()] = factor;
        }
    }

    /// Full gradient, the mean of `grad_i` over every sample, computed as a
    /// parallel fold/reduce.
    pub fn full_grad(&self, coeffs: ArrayView1<f64>, out: &mut Array1<f64>) {
        let n_samples = self.model.n_samples();
        let n_coeffs = self.model.n_coeffs();
        let sum = (0..n_samples)
            .into_par_iter()
            .fold(
                || Array1::<f64>::zeros(n_coeffs),
                |mut acc, i| {
                    let factor = self.grad_i_factor(i, &coeffs);
                    self.model
                        .features_row(i)
                        .for_each_nonzero(|j, x| acc[j] += factor * x);
                    if self.model.fit_intercept() {
                        acc[n_coeffs - 1] += factor;
                    }
                    acc
                },
            )
            .reduce(
                || Array1::<f64>::zeros(n_coeffs),
                |mut a, b| {
                    a += &b;
                    a
                },
            );
        let inv_n = 1.0 / n_samples as f64;
        out.zip_mut_with(&sum, |o, &s| *o = s * inv_n);
    }

    /// Mean loss over every sample.
    pub fn loss(&self, coeffs: ArrayView1<f64>) -> f64 {
        let n_samples = self.model.n_samples();
        let total: f64 = (0..n_samples)
            .into_par_iter()
            .map(|i| self.model.loss_i(i, self.inner_prod(i, &coeffs)))
            .sum();
        total / n_samples as f64
    }

    pub fn model(&self) -> &M {
        self.model
    }

    /// Feature row pass-through, kept here so the solver loops only talk to
    /// the adapter.
    pub fn features_row(&self, i: usize) -> FeatureRow<'_> {
        self.model.features_row(i)
    }
}
