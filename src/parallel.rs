//! # Asynchronous Parallel Execution Engine (ASVRG)
//!
//! With more than one thread the inner loop runs lock-free: workers share
//! the coefficient vector through `SharedVec` and perform per-coordinate
//! atomic read-modify-writes. Reads may observe writes from other workers
//! in any interleaving — the variance-reduction correction absorbs this
//! bounded staleness, which is the accepted approximation that buys
//! near-linear speedup. The only global synchronization is the join at the
//! end of each epoch, so the phase iterate and full gradient the next
//! epoch starts from are always consistent.
//!
//! Sparse datasets keep their lazy-update shortcut: a global atomic step
//! counter and a per-coordinate last-seen clock let each worker apply the
//! dense `mu`/prox contributions a coordinate missed. Racing workers can
//! mis-count a missed step; that error is the same order as the staleness
//! already accepted, and the epoch-end flush (run single-threaded, after
//! the barrier) is exact.

use crate::model::Model;
use crate::oracle::Oracle;
use crate::prox::Prox;
use crate::sampler::{worker_seed, IndexSampler, RandType};
use crate::shared::SharedVec;
use crate::svrg::VarianceReduction;
use ndarray::Array1;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;

pub(crate) struct EpochParams<'a, 'm, M: Model, P: Prox> {
    pub oracle: &'a Oracle<'m, M>,
    pub prox: &'a P,
    pub iterate: &'a mut Array1<f64>,
    pub phase: &'a Array1<f64>,
    pub mu: &'a Array1<f64>,
    pub step: f64,
    pub epoch_size: usize,
    pub threads: usize,
    pub rand_type: RandType,
    pub base_seed: u64,
    pub epoch: usize,
    pub vr: VarianceReduction,
    pub sparse_fast: bool,
    pub rand_at: Option<usize>,
}

/// Shared lazy-update clock for the sparse path.
struct LazyClock {
    /// Global 1-based inner-step counter for the epoch.
    counter: AtomicUsize,
    /// Step through which each feature coordinate has received its dense
    /// `mu` and prox contributions.
    last_seen: Vec<AtomicUsize>,
}

/// Runs one epoch's inner loop across worker threads and returns the next
/// phase iterate. `params.iterate` holds the epoch result on return.
pub(crate) fn run_epoch<M: Model, P: Prox>(params: EpochParams<M, P>) -> Array1<f64> {
    let EpochParams {
        oracle,
        prox,
        iterate,
        phase,
        mu,
        step,
        epoch_size,
        threads,
        rand_type,
        base_seed,
        epoch,
        vr,
        sparse_fast,
        rand_at,
    } = params;

    let n_samples = oracle.model().n_samples();
    let n_coeffs = iterate.len();
    let shared = SharedVec::from_array(iterate.view());
    let rand_slot: Mutex<Option<Array1<f64>>> = Mutex::new(None);
    let clock = sparse_fast.then(|| LazyClock {
        counter: AtomicUsize::new(0),
        last_seen: (0..oracle.model().n_features())
            .map(|_| AtomicUsize::new(0))
            .collect(),
    });

    // Split the epoch's update budget across workers.
    let per_worker = epoch_size / threads;
    let remainder = epoch_size % threads;
    let counts: Vec<usize> = (0..threads)
        .map(|w| per_worker + usize::from(w < remainder))
        .collect();
    let offsets: Vec<usize> = counts
        .iter()
        .scan(0usize, |acc, &c| {
            let start = *acc;
            *acc += c;
            Some(start)
        })
        .collect();

    let mut worker_avg_sums: Vec<Option<Array1<f64>>> = Vec::with_capacity(threads);
    thread::scope(|s| {
        let mut handles = Vec::with_capacity(threads);
        for w in 0..threads {
            let count = counts[w];
            // Local index within this worker at which to take the 'rand'
            // phase snapshot, if the drawn global step falls in its share.
            let snapshot_at = rand_at.and_then(|g| {
                (g >= offsets[w] && g < offsets[w] + count).then(|| g - offsets[w])
            });
            let shared = &shared;
            let rand_slot = &rand_slot;
            let clock = clock.as_ref();
            handles.push(s.spawn(move || {
                let mut sampler =
                    IndexSampler::new(n_samples, rand_type, worker_seed(base_seed, epoch, w));
                let mut avg_sum = (vr == VarianceReduction::Avg)
                    .then(|| Array1::<f64>::zeros(n_coeffs));

                for t in 0..count {
                    let i = sampler.next();
                    match clock {
                        Some(clock) => {
                            step_sparse(oracle, prox, shared, clock, phase, mu, step, i)
                        }
                        None => step_dense(oracle, prox, shared, phase, mu, step, i),
                    }
                    if let Some(sum) = avg_sum.as_mut() {
                        for j in 0..n_coeffs {
                            sum[j] += shared.cell(j).load();
                        }
                    }
                    if snapshot_at == Some(t) {
                        let mut slot = rand_slot
                            .lock()
                            .unwrap_or_else(std::sync::PoisonError::into_inner);
                        *slot = Some(shared.snapshot());
                    }
                }
                avg_sum
            }));
        }
        for handle in handles {
            match handle.join() {
                Ok(sum) => worker_avg_sums.push(sum),
                Err(payload) => std::panic::resume_unwind(payload),
            }
        }
    });

    // Past the barrier: single-threaded, exact flush of lazy coordinates.
    if let Some(clock) = &clock {
        for (j, seen) in clock.last_seen.iter().enumerate() {
            let seen = seen.load(Ordering::Relaxed).min(epoch_size);
            let missed = epoch_size - seen;
            if missed > 0 {
                shared
                    .cell(j)
                    .update(|v| prox.call_single_repeated(v - missed as f64 * step * mu[j], step, missed));
            }
        }
    }

    *iterate = shared.snapshot();

    match vr {
        VarianceReduction::Last => iterate.clone(),
        VarianceReduction::Avg => {
            let mut total = Array1::<f64>::zeros(n_coeffs);
            for sum in worker_avg_sums.into_iter().flatten() {
                total += &sum;
            }
            total /= epoch_size as f64;
            total
        }
        VarianceReduction::Rand => rand_slot
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .unwrap_or_else(|| iterate.clone()),
    }
}

/// One asynchronous stochastic update on the dense path.
#[allow(clippy::too_many_arguments)]
fn step_dense<M: Model, P: Prox>(
    oracle: &Oracle<M>,
    prox: &P,
    shared: &SharedVec,
    phase: &Array1<f64>,
    mu: &Array1<f64>,
    step: f64,
    i: usize,
) {
    let delta = oracle.grad_i_factor(i, shared) - oracle.grad_i_factor(i, phase);
    oracle
        .features_row(i)
        .for_each_nonzero(|j, x| shared.cell(j).update(|v| v - step * delta * x));
    if oracle.model().fit_intercept() {
        shared
            .cell(oracle.model().n_features())
            .update(|v| v - step * delta);
    }
    for j in 0..shared.len() {
        shared
            .cell(j)
            .update(|v| prox.call_single(v - step * mu[j], step));
    }
}

/// One asynchronous stochastic update on the sparse lazy-update path.
#[allow(clippy::too_many_arguments)]
fn step_sparse<M: Model, P: Prox>(
    oracle: &Oracle<M>,
    prox: &P,
    shared: &SharedVec,
    clock: &LazyClock,
    phase: &Array1<f64>,
    mu: &Array1<f64>,
    step: f64,
    i: usize,
) {
    let t = clock.counter.fetch_add(1, Ordering::Relaxed) + 1;
    let row = oracle.features_row(i);

    // Catch the touched coordinates up to step t-1 before reading them.
    row.for_each_nonzero(|j, _| {
        let prev = clock.last_seen[j].fetch_max(t - 1, Ordering::Relaxed);
        let missed = (t - 1).saturating_sub(prev);
        if missed > 0 {
            shared
                .cell(j)
                .update(|v| prox.call_single_repeated(v - missed as f64 * step * mu[j], step, missed));
        }
    });

    let delta = oracle.grad_i_factor(i, shared) - oracle.grad_i_factor(i, phase);

    row.for_each_nonzero(|j, x| {
        clock.last_seen[j].fetch_max(t, Ordering::Relaxed);
        shared
            .cell(j)
            .update(|v| prox.call_single(v - step * (delta * x + mu[j]), step));
    });
    if oracle.model().fit_intercept() {
        // The intercept is touched every step; it never goes stale.
        let b = oracle.model().n_features();
        shared
            .cell(b)
            .update(|v| prox.call_single(v - step * (delta + mu[b]), step));
    }
}
