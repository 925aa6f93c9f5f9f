//! # Model Capability Trait and Generalized Linear Models
//!
//! The solver only ever sees the `Model` trait. For generalized linear
//! models the per-sample gradient factors as
//! `grad_i(w) = f'(x_i . w + b) * x_i` (with the intercept derivative equal
//! to the same scalar), so the trait trades in scalar quantities: given the
//! inner product for sample `i`, the model returns the loss term and the
//! gradient factor. The oracle adapter assembles inner products, full
//! gradients and losses from these pieces, which is what lets sparse
//! updates touch only the coordinates sample `i` actually uses.
//!
//! Model settings (family, intercept, data) are constructor-only: there are
//! no post-construction setters, so an immutable-setting mutation cannot be
//! expressed.

use crate::error::SolverError;
use crate::features::{FeatureRow, Features};
use ndarray::Array1;

/// First-order oracle over a fixed dataset.
pub trait Model: Sync {
    fn n_samples(&self) -> usize;
    fn n_features(&self) -> usize;
    fn fit_intercept(&self) -> bool;
    fn is_sparse(&self) -> bool;

    /// Feature row of sample `i`.
    fn features_row(&self, i: usize) -> FeatureRow<'_>;

    /// Scalar gradient factor for sample `i` at the given inner product
    /// `x_i . w (+ b)`.
    fn grad_factor(&self, i: usize, inner_prod: f64) -> f64;

    /// Loss term of sample `i` at the given inner product.
    fn loss_i(&self, i: usize, inner_prod: f64) -> f64;

    /// Largest per-sample Lipschitz constant of the gradient, when one
    /// exists. Used to derive the default step size as `1 / L`.
    fn lipschitz_max(&self) -> Option<f64>;

    /// Length of the coefficient vector (features plus optional intercept,
    /// stored as the last coefficient).
    fn n_coeffs(&self) -> usize {
        self.n_features() + usize::from(self.fit_intercept())
    }
}

/// Loss family of a generalized linear model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Family {
    /// Least squares: `loss_i = (m - y_i)^2 / 2`.
    Linear,
    /// Logistic with labels in {-1, +1}: `loss_i = log(1 + exp(-y_i m))`.
    Logistic,
    /// Poisson regression with exponential link:
    /// `loss_i = exp(m) - y_i m` (the `log(y_i!)` constant is dropped).
    Poisson,
}

/// A generalized linear model over a dense or sparse design matrix.
#[derive(Debug)]
pub struct Glm {
    features: Features,
    labels: Array1<f64>,
    family: Family,
    fit_intercept: bool,
}

impl Glm {
    pub fn new(
        features: impl Into<Features>,
        labels: Array1<f64>,
        family: Family,
        fit_intercept: bool,
    ) -> Result<Self, SolverError> {
        let features = features.into();
        if features.n_samples() != labels.len() {
            return Err(SolverError::DimensionMismatch {
                n_rows: features.n_samples(),
                n_labels: labels.len(),
            });
        }
        if features.n_samples() == 0 {
            return Err(SolverError::EmptyModel);
        }
        Ok(Glm {
            features,
            labels,
            family,
            fit_intercept,
        })
    }

    pub fn family(&self) -> Family {
        self.family
    }
}

impl Model for Glm {
    fn n_samples(&self) -> usize {
        self.features.n_samples()
    }

    fn n_features(&self) -> usize {
        self.features.n_features()
    }

    fn fit_intercept(&self) -> bool {
        self.fit_intercept
    }

    fn is_sparse(&self) -> bool {
        self.features.is_sparse()
    }

    fn features_row(&self, i: usize) -> FeatureRow<'_> {
        self.features.row(i)
    }

    fn grad_factor(&self, i: usize, inner_prod: f64) -> f64 {
        let y = self.labels[i];
        match self.family {
            Family::Linear => inner_prod - y,
            Family::Logistic => -y * sigmoid(-y * inner_prod),
            Family::Poisson => inner_prod.exp() - y,
        }
    }

    fn loss_i(&self, i: usize, inner_prod: f64) -> f64 {
        let y = self.labels[i];
        match self.family {
            Family::Linear => {
                let r = inner_prod - y;
                0.5 * r * r
            }
            Family::Logistic => log1p_exp(-y * inner_prod),
            Family::Poisson => inner_prod.exp() - y * inner_prod,
        }
    }

    fn lipschitz_max(&self) -> Option<f64> {
        // Per-sample constants: ||x_i||^2 (+1 with intercept), scaled by the
        // curvature bound of the link. The exponential link is unbounded.
        let scale = match self.family {
            Family::Linear => 1.0,
            Family::Logistic => 0.25,
            Family::Poisson => return None,
        };
        let intercept = f64::from(self.fit_intercept);
        let max_norm_sq = (0..self.n_samples())
            .map(|i| self.features.row(i).norm_sq() + intercept)
            .fold(0.0_f64, f64::max);
        Some(scale * max_norm_sq)
    }
}

/// Numerically stable `1 / (1 + exp(-z))`.
#[inline]
fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Numerically stable `log(1 + exp(z))`.
#[inline]
fn log1p_exp(z: f64) -> f64 {
    if z <= 0.0 {
        z.exp().ln_1p()
    } else {
        z + (-z).exp().ln_1p()
    }
}
