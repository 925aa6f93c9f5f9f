//! # SVRG Solver Core
//!
//! Prox-SVRG with three variance-reduction variants and an asynchronous
//! multi-threaded mode (ASVRG). One epoch is: recompute the full gradient
//! at the phase iterate (the expensive once-per-epoch step, parallelized
//! with rayon), then run `epoch_size` stochastic updates
//!
//! ```text
//! w <- prox( w - step * (grad_i(w) - grad_i(phase) + mu) )
//! ```
//!
//! where `mu` is the phase full gradient. The corrected direction is an
//! unbiased estimate of the full gradient whose variance vanishes as `w`
//! approaches the phase iterate.
//!
//! Sparse datasets take a lazy-update inner loop: the stochastic part only
//! touches the non-zero coordinates of sample `i`, and the dense
//! `mu`/prox contributions a coordinate missed while untouched are applied
//! in closed form the next time it appears (and flushed at the epoch
//! barrier). This keeps the per-update cost proportional to the number of
//! non-zeros instead of the dimension, which is the property that makes
//! SVRG worthwhile on sparse data.

use crate::error::SolverError;
use crate::history::History;
use crate::model::Model;
use crate::oracle::Oracle;
use crate::parallel;
use crate::prox::Prox;
use crate::sampler::{resolve_seed, worker_seed, IndexSampler, RandType};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// What serves as the phase iterate for the next epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VarianceReduction {
    /// Last iterate of the previous epoch.
    Last,
    /// Mean of the iterates visited during the previous epoch. A poor fit
    /// for sparse datasets: it forces the dense inner loop.
    Avg,
    /// A uniformly random iterate from the previous epoch.
    Rand,
}

impl FromStr for VarianceReduction {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "last" => Ok(VarianceReduction::Last),
            "avg" => Ok(VarianceReduction::Avg),
            "rand" => Ok(VarianceReduction::Rand),
            other => Err(SolverError::UnknownVarianceReduction(other.to_string())),
        }
    }
}

/// Terminal state of a solve.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolveStatus {
    /// Relative objective change dropped below `tol`.
    Converged,
    /// Ran all `max_iter` epochs without meeting the criterion.
    MaxIterReached,
    /// An external stop was requested at an epoch boundary.
    Interrupted,
}

/// Solver configuration. Plain data, validated once by [`Svrg::new`] and
/// immutable afterwards.
#[derive(Clone, Debug)]
pub struct SvrgConfig {
    /// Step size. `None` derives `1 / L` from the model's Lipschitz
    /// constant; construction fails if neither is available.
    pub step: Option<f64>,
    /// Stochastic updates per epoch. `None` means `n_samples`.
    pub epoch_size: Option<usize>,
    /// Sampling mode for the inner loop.
    pub rand_type: RandType,
    /// Stopping tolerance on the relative objective change. The default 0
    /// never stops early; the solver runs all `max_iter` epochs.
    pub tol: f64,
    /// Maximum number of epochs.
    pub max_iter: usize,
    /// Emit progress lines via `log::info!`.
    pub verbose: bool,
    /// Progress line cadence, in epochs.
    pub print_every: usize,
    /// History record cadence, in epochs.
    pub record_every: usize,
    /// Non-negative fixes the RNG; negative draws from entropy.
    pub seed: i64,
    /// Phase iterate selection.
    pub variance_reduction: VarianceReduction,
    /// Worker threads. More than one enables asynchronous (ASVRG) mode.
    pub threads: usize,
}

impl Default for SvrgConfig {
    fn default() -> Self {
        SvrgConfig {
            step: None,
            epoch_size: None,
            rand_type: RandType::Unif,
            tol: 0.0,
            max_iter: 100,
            verbose: true,
            print_every: 10,
            record_every: 1,
            seed: -1,
            variance_reduction: VarianceReduction::Last,
            threads: 1,
        }
    }
}

impl SvrgConfig {
    fn validate(&self) -> Result<(), SolverError> {
        if self.max_iter == 0 {
            return Err(SolverError::NonPositiveParameter {
                name: "max_iter",
                value: 0.0,
            });
        }
        if self.threads == 0 {
            return Err(SolverError::NonPositiveParameter {
                name: "threads",
                value: 0.0,
            });
        }
        if self.print_every == 0 {
            return Err(SolverError::NonPositiveParameter {
                name: "print_every",
                value: 0.0,
            });
        }
        if self.record_every == 0 {
            return Err(SolverError::NonPositiveParameter {
                name: "record_every",
                value: 0.0,
            });
        }
        if self.epoch_size == Some(0) {
            return Err(SolverError::NonPositiveParameter {
                name: "epoch_size",
                value: 0.0,
            });
        }
        if self.tol < 0.0 {
            return Err(SolverError::NegativeTolerance(self.tol));
        }
        if let Some(step) = self.step {
            if !(step.is_finite() && step > 0.0) {
                return Err(SolverError::NonPositiveParameter {
                    name: "step",
                    value: step,
                });
            }
        }
        Ok(())
    }
}

/// The SVRG/ASVRG solver bound to a model and a proximal operator.
pub struct Svrg<M: Model, P: Prox> {
    config: SvrgConfig,
    model: M,
    prox: P,
    step: f64,
    iterate: Array1<f64>,
    history: History,
    phase: Option<Array1<f64>>,
    phase_full_grad: Option<Array1<f64>>,
}

impl<M: Model, P: Prox> Svrg<M, P> {
    /// Validates the configuration against the model and prox and builds
    /// the solver. All fatal configuration errors surface here, before any
    /// computation; the sparse + `avg` combination only logs a warning and
    /// the solve later proceeds on the dense inner loop.
    pub fn new(config: SvrgConfig, model: M, prox: P) -> Result<Self, SolverError> {
        config.validate()?;
        if model.n_samples() == 0 {
            return Err(SolverError::EmptyModel);
        }
        if config.threads > 1 && !prox.is_separable() {
            return Err(SolverError::NonSeparableProx);
        }
        let step = match config.step {
            Some(step) => step,
            None => match model.lipschitz_max() {
                Some(lip) if lip > 0.0 => 1.0 / lip,
                _ => return Err(SolverError::StepUnavailable),
            },
        };
        if config.variance_reduction == VarianceReduction::Avg && model.is_sparse() {
            log::warn!(
                "'avg' variance reduction is a poor fit for sparse datasets: the solve \
                 will run on the dense inner loop and lose the sparse-update shortcut"
            );
        }
        let n_coeffs = model.n_coeffs();
        Ok(Svrg {
            config,
            model,
            prox,
            step,
            iterate: Array1::zeros(n_coeffs),
            history: History::new(),
            phase: None,
            phase_full_grad: None,
        })
    }

    /// Overrides the all-zeros starting point.
    pub fn set_starting_iterate(&mut self, iterate: Array1<f64>) {
        assert_eq!(
            iterate.len(),
            self.model.n_coeffs(),
            "starting iterate length must match the model's coefficient count"
        );
        self.iterate = iterate;
    }

    /// Runs the solve to a terminal state.
    pub fn solve(&mut self) -> SolveStatus {
        let never_stop = AtomicBool::new(false);
        self.solve_with_stop(&never_stop)
    }

    /// Runs the solve, additionally honoring an external stop flag checked
    /// at each epoch boundary (there is no mid-epoch cancellation).
    pub fn solve_with_stop(&mut self, stop: &AtomicBool) -> SolveStatus {
        let config = self.config.clone();
        let step = self.step;
        let n_samples = self.model.n_samples();
        let epoch_size = config.epoch_size.unwrap_or(n_samples);
        let base_seed = resolve_seed(config.seed);
        let vr = config.variance_reduction;
        // 'avg' needs every visited iterate, which the lazy sparse loop
        // never materializes; route it through the dense loop instead.
        let sparse_fast = self.model.is_sparse() && vr != VarianceReduction::Avg;

        let oracle = Oracle::new(&self.model);
        // Separate stream for choosing the 'rand' snapshot positions.
        let mut vr_rng = StdRng::seed_from_u64(worker_seed(base_seed, 0, usize::MAX));

        let started = Instant::now();
        self.history.clear();

        let mut iterate = std::mem::take(&mut self.iterate);
        let mut phase = iterate.clone();
        // Always the phase iterate `mu` was computed from, even after
        // `phase` advances to the next epoch's reference point.
        let mut phase_of_mu: Option<Array1<f64>> = None;
        let mut mu = Array1::<f64>::zeros(iterate.len());
        let mut last_seen = vec![0usize; self.model.n_features()];

        let mut objective = oracle.loss(iterate.view()) + self.prox.value(iterate.view());
        self.history.push(0, 0.0, objective);

        let mut status = SolveStatus::MaxIterReached;
        for epoch in 1..=config.max_iter {
            oracle.full_grad(phase.view(), &mut mu);

            let rand_at = match vr {
                VarianceReduction::Rand => Some(vr_rng.gen_range(0..epoch_size)),
                _ => None,
            };

            let next_phase = if config.threads > 1 {
                parallel::run_epoch(parallel::EpochParams {
                    oracle: &oracle,
                    prox: &self.prox,
                    iterate: &mut iterate,
                    phase: &phase,
                    mu: &mu,
                    step,
                    epoch_size,
                    threads: config.threads,
                    rand_type: config.rand_type,
                    base_seed,
                    epoch,
                    vr,
                    sparse_fast,
                    rand_at,
                })
            } else {
                // Fresh stream per epoch, the same derivation the parallel
                // workers use, so a permutation never straddles epochs.
                let mut sampler = IndexSampler::new(
                    n_samples,
                    config.rand_type,
                    worker_seed(base_seed, epoch, 0),
                );
                if sparse_fast {
                    epoch_sparse(
                        &oracle,
                        &self.prox,
                        &mut iterate,
                        &phase,
                        &mu,
                        step,
                        epoch_size,
                        &mut sampler,
                        &mut last_seen,
                        rand_at,
                    )
                } else {
                    epoch_dense(
                        &oracle,
                        &self.prox,
                        &mut iterate,
                        &phase,
                        &mu,
                        step,
                        epoch_size,
                        &mut sampler,
                        vr,
                        rand_at,
                    )
                }
            };

            let previous = objective;
            objective = oracle.loss(iterate.view()) + self.prox.value(iterate.view());
            let rel_change = if previous != 0.0 {
                (previous - objective).abs() / previous.abs()
            } else {
                (previous - objective).abs()
            };

            let stopping = rel_change < config.tol;
            let interrupted = stop.load(Ordering::Relaxed);
            let terminal = stopping || interrupted || epoch == config.max_iter;

            if epoch % config.record_every == 0 || terminal {
                self.history
                    .push(epoch, started.elapsed().as_secs_f64(), objective);
            }
            if config.verbose && (epoch % config.print_every == 0 || terminal) {
                log::info!(
                    "epoch {epoch}/{}: objective {objective:.6e}, rel change {rel_change:.2e}, \
                     elapsed {:.2}s",
                    config.max_iter,
                    started.elapsed().as_secs_f64(),
                );
            }

            phase_of_mu = Some(std::mem::replace(&mut phase, next_phase));
            if stopping {
                status = SolveStatus::Converged;
                break;
            }
            if interrupted {
                status = SolveStatus::Interrupted;
                break;
            }
        }

        self.iterate = iterate;
        self.phase = phase_of_mu;
        self.phase_full_grad = Some(mu);
        status
    }

    /// Final (or current) coefficient vector.
    pub fn solution(&self) -> &Array1<f64> {
        &self.iterate
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Effective step size (configured or derived as `1 / L`).
    pub fn step(&self) -> f64 {
        self.step
    }

    /// Phase iterate left by the last completed epoch. Diagnostic.
    pub fn phase_iterate(&self) -> Option<&Array1<f64>> {
        self.phase.as_ref()
    }

    /// Full gradient computed at the phase iterate of the last epoch that
    /// ran. Diagnostic; recomputing it from [`Svrg::phase_iterate`] must
    /// reproduce it.
    pub fn phase_full_gradient(&self) -> Option<&Array1<f64>> {
        self.phase_full_grad.as_ref()
    }
}

/// One sequential epoch on the dense path. Also used for sparse datasets
/// under `avg`, where every visited iterate must be materialized.
#[allow(clippy::too_many_arguments)]
fn epoch_dense<M: Model, P: Prox>(
    oracle: &Oracle<M>,
    prox: &P,
    iterate: &mut Array1<f64>,
    phase: &Array1<f64>,
    mu: &Array1<f64>,
    step: f64,
    epoch_size: usize,
    sampler: &mut IndexSampler,
    vr: VarianceReduction,
    rand_at: Option<usize>,
) -> Array1<f64> {
    let fit_intercept = oracle.model().fit_intercept();
    let intercept_idx = oracle.model().n_features();
    let mut avg_acc = match vr {
        VarianceReduction::Avg => Some(Array1::<f64>::zeros(iterate.len())),
        _ => None,
    };
    let mut rand_snapshot: Option<Array1<f64>> = None;

    for t in 0..epoch_size {
        let i = sampler.next();
        let delta = oracle.grad_i_factor(i, &*iterate) - oracle.grad_i_factor(i, phase);

        oracle
            .features_row(i)
            .for_each_nonzero(|j, x| iterate[j] -= step * delta * x);
        if fit_intercept {
            iterate[intercept_idx] -= step * delta;
        }
        iterate.zip_mut_with(mu, |w, &m| *w -= step * m);
        prox.call(iterate, step);

        if let Some(acc) = avg_acc.as_mut() {
            *acc += &*iterate;
        }
        if rand_at == Some(t) {
            rand_snapshot = Some(iterate.clone());
        }
    }

    match vr {
        VarianceReduction::Last => iterate.clone(),
        VarianceReduction::Avg => {
            let mut acc = avg_acc.unwrap_or_else(|| iterate.clone());
            acc /= epoch_size as f64;
            acc
        }
        VarianceReduction::Rand => rand_snapshot.unwrap_or_else(|| iterate.clone()),
    }
}

/// One sequential epoch on the sparse lazy-update path.
///
/// `last_seen[j]` is the 1-based step through which coordinate `j` has
/// received its dense `mu` and prox contributions. Coordinates catch up
/// right before sample `i` reads them and are all flushed at the epoch
/// barrier, so the epoch is equivalent to the dense loop whenever the
/// repeated-prox closed form is exact (always for `ProxZero`).
#[allow(clippy::too_many_arguments)]
fn epoch_sparse<M: Model, P: Prox>(
    oracle: &Oracle<M>,
    prox: &P,
    iterate: &mut Array1<f64>,
    phase: &Array1<f64>,
    mu: &Array1<f64>,
    step: f64,
    epoch_size: usize,
    sampler: &mut IndexSampler,
    last_seen: &mut [usize],
    rand_at: Option<usize>,
) -> Array1<f64> {
    let fit_intercept = oracle.model().fit_intercept();
    let intercept_idx = oracle.model().n_features();
    last_seen.fill(0);
    let mut rand_snapshot: Option<Array1<f64>> = None;

    for t in 1..=epoch_size {
        let i = sampler.next();
        let row = oracle.features_row(i);

        // Bring the coordinates this sample reads up to step t-1.
        row.for_each_nonzero(|j, _| {
            let missed = (t - 1) - last_seen[j];
            if missed > 0 {
                let w = iterate[j] - missed as f64 * step * mu[j];
                iterate[j] = prox.call_single_repeated(w, step, missed);
                last_seen[j] = t - 1;
            }
        });

        let delta = oracle.grad_i_factor(i, &*iterate) - oracle.grad_i_factor(i, phase);

        row.for_each_nonzero(|j, x| {
            let w = iterate[j] - step * (delta * x + mu[j]);
            iterate[j] = prox.call_single(w, step);
            last_seen[j] = t;
        });
        if fit_intercept {
            // The intercept is touched by every sample; never lazy.
            let w = iterate[intercept_idx] - step * (delta + mu[intercept_idx]);
            iterate[intercept_idx] = prox.call_single(w, step);
        }

        if rand_at == Some(t - 1) {
            flush_lazy(prox, iterate, mu, step, t, last_seen);
            rand_snapshot = Some(iterate.clone());
        }
    }

    flush_lazy(prox, iterate, mu, step, epoch_size, last_seen);

    match rand_at {
        Some(_) => rand_snapshot.unwrap_or_else(|| iterate.clone()),
        None => iterate.clone(),
    }
}

/// Applies the dense contributions every stale coordinate still owes, up to
/// step `through`.
fn flush_lazy<P: Prox>(
    prox: &P,
    iterate: &mut Array1<f64>,
    mu: &Array1<f64>,
    step: f64,
    through: usize,
    last_seen: &mut [usize],
) {
    for (j, seen) in last_seen.iter_mut().enumerate() {
        let missed = through - *seen;
        if missed > 0 {
            let w = iterate[j] - missed as f64 * step * mu[j];
            iterate[j] = prox.call_single_repeated(w, step, missed);
            *seen = through;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Family, Glm};
    use crate::prox::{ProxL2Sq, ProxZero};
    use approx::assert_abs_diff_eq;
    use ndarray::{Array1, Array2};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use sprs::TriMat;

    fn dense_linreg(n: usize, d: usize, seed: u64) -> Glm {
        let mut rng = StdRng::seed_from_u64(seed);
        let features = Array2::from_shape_fn((n, d), |_| rng.gen_range(-1.0..1.0));
        let truth = Array1::from_shape_fn(d, |j| (j as f64 + 1.0) / d as f64);
        let labels = features.dot(&truth);
        Glm::new(features, labels, Family::Linear, false).unwrap()
    }

    fn sparse_linreg(n: usize, d: usize, seed: u64) -> (Glm, Glm) {
        // The same random sparse problem in both layouts.
        let mut rng = StdRng::seed_from_u64(seed);
        let mut dense = Array2::<f64>::zeros((n, d));
        let mut tri = TriMat::new((n, d));
        for i in 0..n {
            for j in 0..d {
                if rng.gen_bool(0.3) {
                    let x = rng.gen_range(-1.0..1.0);
                    dense[[i, j]] = x;
                    tri.add_triplet(i, j, x);
                }
            }
        }
        let truth = Array1::from_shape_fn(d, |j| if j % 2 == 0 { 0.5 } else { -0.25 });
        let labels = dense.dot(&truth);
        let dense_model = Glm::new(dense, labels.clone(), Family::Linear, false).unwrap();
        let sparse_model = Glm::new(tri.to_csr(), labels, Family::Linear, false).unwrap();
        (dense_model, sparse_model)
    }

    fn quiet_config() -> SvrgConfig {
        SvrgConfig {
            verbose: false,
            seed: 1398,
            ..SvrgConfig::default()
        }
    }

    #[test]
    fn variance_reduction_parses_known_names_only() {
        assert_eq!(
            "last".parse::<VarianceReduction>().unwrap(),
            VarianceReduction::Last
        );
        assert_eq!(
            "avg".parse::<VarianceReduction>().unwrap(),
            VarianceReduction::Avg
        );
        assert_eq!(
            "rand".parse::<VarianceReduction>().unwrap(),
            VarianceReduction::Rand
        );
        assert!(matches!(
            "unknown".parse::<VarianceReduction>(),
            Err(SolverError::UnknownVarianceReduction(_))
        ));
    }

    #[test]
    fn invalid_configs_are_rejected_before_solving() {
        let model = dense_linreg(10, 3, 0);
        let bad = SvrgConfig {
            max_iter: 0,
            ..quiet_config()
        };
        assert!(matches!(
            Svrg::new(bad, model, ProxZero),
            Err(SolverError::NonPositiveParameter {
                name: "max_iter",
                ..
            })
        ));

        let model = dense_linreg(10, 3, 0);
        let bad = SvrgConfig {
            tol: -1e-3,
            ..quiet_config()
        };
        assert!(matches!(
            Svrg::new(bad, model, ProxZero),
            Err(SolverError::NegativeTolerance(_))
        ));

        let model = dense_linreg(10, 3, 0);
        let bad = SvrgConfig {
            step: Some(0.0),
            ..quiet_config()
        };
        assert!(matches!(
            Svrg::new(bad, model, ProxZero),
            Err(SolverError::NonPositiveParameter { name: "step", .. })
        ));
    }

    /// Collects warn-level records so the compatibility warning can be
    /// asserted on. Installed once; the process-global logger slot means
    /// only this module may call `log::set_logger` in the unit-test binary.
    struct WarnCapture {
        messages: std::sync::Mutex<Vec<String>>,
    }

    impl log::Log for WarnCapture {
        fn enabled(&self, metadata: &log::Metadata) -> bool {
            metadata.level() <= log::Level::Warn
        }

        fn log(&self, record: &log::Record) {
            if self.enabled(record.metadata()) {
                self.messages
                    .lock()
                    .unwrap()
                    .push(record.args().to_string());
            }
        }

        fn flush(&self) {}
    }

    static WARNINGS: WarnCapture = WarnCapture {
        messages: std::sync::Mutex::new(Vec::new()),
    };

    #[test]
    fn sparse_avg_warns_but_constructs() {
        log::set_logger(&WARNINGS).unwrap();
        log::set_max_level(log::LevelFilter::Warn);

        let (_, sparse_model) = sparse_linreg(20, 6, 5);
        let config = SvrgConfig {
            step: Some(0.05),
            variance_reduction: VarianceReduction::Avg,
            ..quiet_config()
        };
        // Degraded but legal: construction must succeed and warn.
        let solver = Svrg::new(config, sparse_model, ProxZero);
        assert!(solver.is_ok());
        let messages = WARNINGS.messages.lock().unwrap();
        assert!(
            messages.iter().any(|m| m.contains("sparse")),
            "expected a compatibility warning for 'avg' on sparse data"
        );
    }

    #[test]
    fn step_defaults_to_inverse_lipschitz() {
        let model = dense_linreg(30, 4, 1);
        let lip = model.lipschitz_max().unwrap();
        let solver = Svrg::new(quiet_config(), model, ProxZero).unwrap();
        assert_abs_diff_eq!(solver.step(), 1.0 / lip, epsilon = 1e-15);
    }

    #[test]
    fn poisson_without_step_is_rejected() {
        let mut rng = StdRng::seed_from_u64(2);
        let features = Array2::from_shape_fn((10, 3), |_| rng.gen_range(-0.2..0.2));
        let labels = Array1::from_shape_fn(10, |_| rng.gen_range(0..4) as f64);
        let model = Glm::new(features, labels, Family::Poisson, false).unwrap();
        assert!(matches!(
            Svrg::new(quiet_config(), model, ProxZero),
            Err(SolverError::StepUnavailable)
        ));
    }

    #[test]
    fn sequential_converges_on_linear_least_squares() {
        // 100 x 5 consistent system: the analytic least-squares solution is
        // the generating vector and the minimum objective is zero.
        let model = dense_linreg(100, 5, 7);
        let truth = {
            let d = 5;
            Array1::from_shape_fn(d, |j| (j as f64 + 1.0) / d as f64)
        };
        let config = SvrgConfig {
            step: Some(0.1),
            max_iter: 50,
            tol: 1e-8,
            ..quiet_config()
        };
        let mut solver = Svrg::new(config, model, ProxZero).unwrap();
        solver.solve();
        for j in 0..5 {
            assert_abs_diff_eq!(solver.solution()[j], truth[j], epsilon = 1e-6);
        }
    }

    #[test]
    fn all_variance_reduction_variants_converge() {
        for vr in [
            VarianceReduction::Last,
            VarianceReduction::Avg,
            VarianceReduction::Rand,
        ] {
            let model = dense_linreg(80, 4, 11);
            let config = SvrgConfig {
                step: Some(0.1),
                max_iter: 60,
                variance_reduction: vr,
                ..quiet_config()
            };
            let mut solver = Svrg::new(config, model, ProxZero).unwrap();
            solver.solve();
            let final_obj = solver.history().last_objective().unwrap();
            assert!(
                final_obj < 1e-6,
                "{vr:?} should drive the objective to zero, got {final_obj:.3e}"
            );
        }
    }

    #[test]
    fn perm_sampling_converges_too() {
        let model = dense_linreg(60, 4, 13);
        let config = SvrgConfig {
            step: Some(0.1),
            max_iter: 50,
            rand_type: RandType::Perm,
            ..quiet_config()
        };
        let mut solver = Svrg::new(config, model, ProxZero).unwrap();
        solver.solve();
        assert!(solver.history().last_objective().unwrap() < 1e-8);
    }

    #[test]
    fn sparse_lazy_loop_matches_dense_loop_under_prox_zero() {
        // With ProxZero the lazy catch-up is exact, so both layouts must
        // produce bit-comparable trajectories for the same seed.
        let (dense_model, sparse_model) = sparse_linreg(40, 8, 23);
        let config = SvrgConfig {
            step: Some(0.05),
            max_iter: 10,
            ..quiet_config()
        };
        let mut dense_solver = Svrg::new(config.clone(), dense_model, ProxZero).unwrap();
        let mut sparse_solver = Svrg::new(config, sparse_model, ProxZero).unwrap();
        dense_solver.solve();
        sparse_solver.solve();
        for j in 0..8 {
            assert_abs_diff_eq!(
                dense_solver.solution()[j],
                sparse_solver.solution()[j],
                epsilon = 1e-10
            );
        }
    }

    #[test]
    fn sparse_with_l2_reaches_the_same_optimum_as_dense() {
        // Prox interleaving differs between the two loops, so trajectories
        // diverge slightly; both must still land on the ridge optimum.
        let (dense_model, sparse_model) = sparse_linreg(40, 8, 31);
        let config = SvrgConfig {
            step: Some(0.2),
            max_iter: 150,
            ..quiet_config()
        };
        let mut dense_solver =
            Svrg::new(config.clone(), dense_model, ProxL2Sq::new(1e-2)).unwrap();
        let mut sparse_solver = Svrg::new(config, sparse_model, ProxL2Sq::new(1e-2)).unwrap();
        dense_solver.solve();
        sparse_solver.solve();
        for j in 0..8 {
            assert_abs_diff_eq!(
                dense_solver.solution()[j],
                sparse_solver.solution()[j],
                epsilon = 1e-4
            );
        }
    }

    #[test]
    fn phase_full_gradient_is_never_stale() {
        let model = dense_linreg(50, 4, 17);
        let config = SvrgConfig {
            step: Some(0.1),
            max_iter: 5,
            ..quiet_config()
        };
        let mut solver = Svrg::new(config, model, ProxZero).unwrap();
        solver.solve();

        let phase = solver.phase_iterate().unwrap().clone();
        let stored = solver.phase_full_gradient().unwrap().clone();
        let oracle = Oracle::new(solver.model());
        let mut recomputed = Array1::zeros(phase.len());
        oracle.full_grad(phase.view(), &mut recomputed);
        for j in 0..phase.len() {
            assert_abs_diff_eq!(stored[j], recomputed[j], epsilon = 1e-12);
        }
    }

    #[test]
    fn tol_zero_runs_to_max_iter() {
        let model = dense_linreg(30, 3, 19);
        let config = SvrgConfig {
            step: Some(0.1),
            max_iter: 7,
            tol: 0.0,
            ..quiet_config()
        };
        let mut solver = Svrg::new(config, model, ProxZero).unwrap();
        assert_eq!(solver.solve(), SolveStatus::MaxIterReached);
        assert_eq!(solver.history().records().last().unwrap().epoch, 7);
    }

    #[test]
    fn external_stop_interrupts_at_epoch_boundary() {
        let model = dense_linreg(30, 3, 29);
        let config = SvrgConfig {
            step: Some(0.1),
            max_iter: 50,
            ..quiet_config()
        };
        let mut solver = Svrg::new(config, model, ProxZero).unwrap();
        let stop = AtomicBool::new(true);
        assert_eq!(solver.solve_with_stop(&stop), SolveStatus::Interrupted);
        // Epoch 1 ran to its boundary before the flag was honored.
        assert_eq!(solver.history().records().last().unwrap().epoch, 1);
    }

    #[test]
    fn record_every_controls_history_cadence() {
        let model = dense_linreg(30, 3, 37);
        let config = SvrgConfig {
            step: Some(0.1),
            max_iter: 10,
            record_every: 4,
            ..quiet_config()
        };
        let mut solver = Svrg::new(config, model, ProxZero).unwrap();
        solver.solve();
        let epochs: Vec<usize> = solver.history().records().iter().map(|r| r.epoch).collect();
        assert_eq!(epochs, vec![0, 4, 8, 10]);
    }

    #[test]
    fn sample_streams_reseed_each_epoch() {
        // Epoch k draws from the stream derived from (seed, k), never from
        // leftover state of epoch k-1: a hand-rolled loop building a fresh
        // sampler per epoch must reproduce the solver exactly, even when
        // epoch_size does not divide n_samples and a permutation would
        // otherwise straddle the boundary.
        let n = 30;
        let d = 4;
        let epoch_size = n / 2 + 1;
        let config = SvrgConfig {
            step: Some(0.1),
            max_iter: 3,
            epoch_size: Some(epoch_size),
            rand_type: RandType::Perm,
            ..quiet_config()
        };
        let base_seed = resolve_seed(config.seed);
        let mut solver = Svrg::new(config, dense_linreg(n, d, 43), ProxZero).unwrap();
        solver.solve();

        let model = dense_linreg(n, d, 43);
        let oracle = Oracle::new(&model);
        let mut iterate = Array1::<f64>::zeros(d);
        let mut phase = iterate.clone();
        let mut mu = Array1::<f64>::zeros(d);
        for epoch in 1..=3 {
            oracle.full_grad(phase.view(), &mut mu);
            let mut sampler =
                IndexSampler::new(n, RandType::Perm, worker_seed(base_seed, epoch, 0));
            phase = epoch_dense(
                &oracle,
                &ProxZero,
                &mut iterate,
                &phase,
                &mu,
                0.1,
                epoch_size,
                &mut sampler,
                VarianceReduction::Last,
                None,
            );
        }
        for j in 0..d {
            assert_abs_diff_eq!(solver.solution()[j], iterate[j]);
        }
    }

    #[test]
    fn fixed_seed_replays_exactly() {
        let run = || {
            let model = dense_linreg(40, 4, 41);
            let config = SvrgConfig {
                step: Some(0.1),
                max_iter: 8,
                ..quiet_config()
            };
            let mut solver = Svrg::new(config, model, ProxZero).unwrap();
            solver.solve();
            solver.solution().clone()
        };
        let a = run();
        let b = run();
        for j in 0..4 {
            assert_abs_diff_eq!(a[j], b[j]);
        }
    }
}
