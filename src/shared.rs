//! # Shared Coefficient Storage
//!
//! In parallel mode every worker mutates the same coefficient vector. Each
//! element lives in an `AtomicF64` (an `AtomicU64` holding the bit pattern)
//! so a concurrent reader always observes some fully-written value; a write
//! is never torn mid-element. There is no ordering guarantee across
//! elements or across workers — bounded staleness is part of the ASVRG
//! contract, and all accesses are `Relaxed`.

use crate::features::CoeffRead;
use ndarray::{Array1, ArrayView1};
use std::sync::atomic::{AtomicU64, Ordering};

/// A `f64` cell with untorn atomic loads, stores and read-modify-writes.
pub struct AtomicF64 {
    bits: AtomicU64,
}

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        AtomicF64 {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    #[inline]
    pub fn load(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn store(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Atomically replaces the value with `f(value)` via a CAS loop.
    #[inline]
    pub fn update(&self, mut f: impl FnMut(f64) -> f64) {
        let mut current = self.bits.load(Ordering::Relaxed);
        loop {
            let next = f(f64::from_bits(current)).to_bits();
            match self.bits.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }
}

/// A shared coefficient vector backed by atomic elements.
pub struct SharedVec {
    cells: Box<[AtomicF64]>,
}

impl SharedVec {
    pub fn from_array(values: ArrayView1<f64>) -> Self {
        SharedVec {
            cells: values.iter().map(|&v| AtomicF64::new(v)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[inline]
    pub fn cell(&self, j: usize) -> &AtomicF64 {
        &self.cells[j]
    }

    /// Copies the current values out. Only meaningful between epoch
    /// barriers, when no worker is writing.
    pub fn snapshot(&self) -> Array1<f64> {
        self.cells.iter().map(AtomicF64::load).collect()
    }

    /// Overwrites every element. Only meaningful between epoch barriers.
    pub fn assign(&self, values: ArrayView1<f64>) {
        for (cell, &v) in self.cells.iter().zip(values.iter()) {
            cell.store(v);
        }
    }
}

impl CoeffRead for SharedVec {
    #[inline]
    fn get(&self, j: usize) -> f64 {
        self.cells[j].load()
    }
}
