//! # Solver Error Taxonomy
//!
//! All fatal failures surfaced by this crate are configuration or
//! construction errors: they are raised before any stochastic update runs,
//! so a solve that has started always runs to a terminal state. Degraded but
//! legal configurations (e.g. `avg` variance reduction on a sparse dataset)
//! are reported through `log::warn!` instead and never appear here.

use thiserror::Error;

/// A comprehensive error type for solver construction and validation failures.
#[derive(Error, Debug)]
pub enum SolverError {
    #[error("unknown variance reduction method '{0}', expected one of 'avg', 'last', 'rand'")]
    UnknownVarianceReduction(String),

    #[error("unknown random sampling type '{0}', expected 'unif' or 'perm'")]
    UnknownRandType(String),

    #[error("{name} must be strictly positive, got {value}")]
    NonPositiveParameter { name: &'static str, value: f64 },

    #[error("tol must be non-negative, got {0}")]
    NegativeTolerance(f64),

    #[error("the model has no samples to draw from")]
    EmptyModel,

    #[error("features and labels disagree: {n_rows} feature rows vs {n_labels} labels")]
    DimensionMismatch { n_rows: usize, n_labels: usize },

    #[error(
        "no step size was given and the model does not provide a Lipschitz constant \
         to derive one from"
    )]
    StepUnavailable,

    #[error("the proximal operator must be separable (coordinate-wise) when threads > 1")]
    NonSeparableProx,
}
