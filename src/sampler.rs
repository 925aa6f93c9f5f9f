//! # Sample Index Generation
//!
//! Produces the stream of sample indices consumed by the stochastic inner
//! loop. Two modes exist:
//!
//! - `unif`: independent uniform draws with replacement;
//! - `perm`: a random permutation of `[0, n_samples)` consumed
//!   sequentially; when exhausted mid-epoch a fresh independent
//!   permutation is generated.
//!
//! RNG state is always explicit. A non-negative seed fixes the stream; a
//! negative seed draws one from entropy. Worker threads receive streams
//! derived from the base seed, the epoch index and the worker id, so a
//! parallel run replays deterministically for a fixed seed.

use crate::error::SolverError;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How stochastic sample indices are drawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RandType {
    /// Uniform draws with replacement.
    Unif,
    /// Sequential consumption of random permutations.
    Perm,
}

impl FromStr for RandType {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unif" => Ok(RandType::Unif),
            "perm" => Ok(RandType::Perm),
            other => Err(SolverError::UnknownRandType(other.to_string())),
        }
    }
}

/// Resolves the configured seed into a base RNG stream value.
///
/// Negative seeds mean non-deterministic: one entropy draw fixes the base,
/// so derived worker streams still differ from each other.
pub(crate) fn resolve_seed(seed: i64) -> u64 {
    if seed >= 0 {
        seed as u64
    } else {
        rand::rngs::OsRng.gen()
    }
}

/// Derives an independent stream seed for one worker in one epoch.
pub(crate) fn worker_seed(base: u64, epoch: usize, worker: usize) -> u64 {
    // SplitMix64-style scramble of (base, epoch, worker).
    let mut z = base
        .wrapping_add((epoch as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
        .wrapping_add((worker as u64).wrapping_add(1).wrapping_mul(0xBF58_476D_1CE4_E5B9));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// One stream of admissible sample indices in `[0, n_samples)`.
pub struct IndexSampler {
    n_samples: usize,
    rand_type: RandType,
    rng: StdRng,
    permutation: Vec<usize>,
    cursor: usize,
}

impl IndexSampler {
    pub fn new(n_samples: usize, rand_type: RandType, stream_seed: u64) -> Self {
        IndexSampler {
            n_samples,
            rand_type,
            rng: StdRng::seed_from_u64(stream_seed),
            permutation: Vec::new(),
            cursor: 0,
        }
    }

    /// Next sample index.
    pub fn next(&mut self) -> usize {
        match self.rand_type {
            RandType::Unif => self.rng.gen_range(0..self.n_samples),
            RandType::Perm => {
                if self.cursor >= self.permutation.len() {
                    self.reshuffle();
                }
                let i = self.permutation[self.cursor];
                self.cursor += 1;
                i
            }
        }
    }

    fn reshuffle(&mut self) {
        if self.permutation.is_empty() {
            self.permutation = (0..self.n_samples).collect();
        }
        self.permutation.shuffle(&mut self.rng);
        self.cursor = 0;
    }
}
