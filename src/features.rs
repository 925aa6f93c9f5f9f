//! # Design Matrices and Row Views
//!
//! The solver works against a fixed design matrix that is either dense
//! (`ndarray::Array2`) or sparse CSR (`sprs::CsMat`). Both are exposed
//! through the same `FeatureRow` view so the update loops can iterate
//! non-zero coordinates without caring about the backing storage.
//!
//! Coefficient storage is abstracted behind `CoeffRead`: the sequential
//! loops read from a plain slice, the parallel engine reads from an atomic
//! shared vector, and inner products are written once against the trait.

use ndarray::{Array1, Array2, ArrayView1};
use sprs::CsMat;

/// Read access to a coefficient vector, independent of its storage.
///
/// Implemented for slices and views (sequential mode) and for the atomic
/// `SharedVec` (parallel mode), where each `get` is a relaxed atomic load.
pub trait CoeffRead: Sync {
    fn get(&self, j: usize) -> f64;
}

impl CoeffRead for [f64] {
    #[inline]
    fn get(&self, j: usize) -> f64 {
        self[j]
    }
}

impl CoeffRead for ArrayView1<'_, f64> {
    #[inline]
    fn get(&self, j: usize) -> f64 {
        self[j]
    }
}

impl CoeffRead for Array1<f64> {
    #[inline]
    fn get(&self, j: usize) -> f64 {
        self[j]
    }
}

/// One sample's feature row, dense or sparse.
#[derive(Clone, Copy)]
pub enum FeatureRow<'a> {
    Dense(ArrayView1<'a, f64>),
    Sparse {
        indices: &'a [usize],
        values: &'a [f64],
    },
}

impl<'a> FeatureRow<'a> {
    /// Inner product of this row with a coefficient vector, reading only
    /// the coordinates this row actually touches.
    pub fn dot<R: CoeffRead + ?Sized>(&self, coeffs: &R) -> f64 {
        match self {
            FeatureRow::Dense(row) => {
                let mut acc = 0.0;
                for (j, &x) in row.iter().enumerate() {
                    acc += x * coeffs.get(j);
                }
                acc
            }
            FeatureRow::Sparse { indices, values } => indices
                .iter()
                .zip(values.iter())
                .map(|(&j, &x)| x * coeffs.get(j))
                .sum(),
        }
    }

    /// Visits every stored coordinate as `(index, value)`.
    pub fn for_each_nonzero(&self, mut f: impl FnMut(usize, f64)) {
        match self {
            FeatureRow::Dense(row) => {
                for (j, &x) in row.iter().enumerate() {
                    f(j, x);
                }
            }
            FeatureRow::Sparse { indices, values } => {
                for (&j, &x) in indices.iter().zip(values.iter()) {
                    f(j, x);
                }
            }
        }
    }

    /// Squared Euclidean norm of the row.
    pub fn norm_sq(&self) -> f64 {
        match self {
            FeatureRow::Dense(row) => row.iter().map(|x| x * x).sum(),
            FeatureRow::Sparse { values, .. } => values.iter().map(|x| x * x).sum(),
        }
    }
}

/// A dense or CSR-sparse design matrix of shape `[n_samples, n_features]`.
#[derive(Debug)]
pub enum Features {
    Dense(Array2<f64>),
    Sparse(CsMat<f64>),
}

impl Features {
    /// Wraps a sparse matrix, converting to CSR layout if needed so that
    /// row views are cheap.
    pub fn sparse(matrix: CsMat<f64>) -> Self {
        if matrix.is_csr() {
            Features::Sparse(matrix)
        } else {
            Features::Sparse(matrix.to_csr())
        }
    }

    pub fn n_samples(&self) -> usize {
        match self {
            Features::Dense(m) => m.nrows(),
            Features::Sparse(m) => m.rows(),
        }
    }

    pub fn n_features(&self) -> usize {
        match self {
            Features::Dense(m) => m.ncols(),
            Features::Sparse(m) => m.cols(),
        }
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self, Features::Sparse(_))
    }

    pub fn row(&self, i: usize) -> FeatureRow<'_> {
        match self {
            Features::Dense(m) => FeatureRow::Dense(m.row(i)),
            Features::Sparse(m) => {
                let row = m
                    .outer_view(i)
                    .unwrap_or_else(|| panic!("sample index {i} out of bounds"));
                // Take the raw CSR storage so the row view carries the
                // matrix lifetime rather than the local view's.
                let (indices, values) = row.into_raw_storage();
                FeatureRow::Sparse { indices, values }
            }
        }
    }
}

impl From<Array2<f64>> for Features {
    fn from(m: Array2<f64>) -> Self {
        Features::Dense(m)
    }
}

impl From<CsMat<f64>> for Features {
    fn from(m: CsMat<f64>) -> Self {
        Features::sparse(m)
    }
}
