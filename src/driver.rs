//! C6 LikelihoodDriver: dispatches per-pattern `PartialsEngine`
//! evaluations across an explicit thread count, each worker holding a
//! thread-local clone of the network, and computes the constant-site
//! correction concurrently with the main thread's batch (§4.6, §5).

use bio::stats::LogProb;
use log::{debug, warn};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use crate::data::{AlleleCountPattern, TotalCountPattern};
use crate::engine::PartialsEngine;
use crate::errors::Result;
use crate::mutation::MutationModel;
use crate::network::NetworkArena;

pub struct LikelihoodDriver {
    mutation: MutationModel,
    dominant: bool,
    state_frequencies_constrained: bool,
}

impl LikelihoodDriver {
    pub fn new(mutation: MutationModel, dominant: bool, state_frequencies_constrained: bool) -> Self {
        LikelihoodDriver {
            mutation,
            dominant,
            state_frequencies_constrained,
        }
    }

    fn engine(&self) -> PartialsEngine {
        PartialsEngine::new(self.mutation, self.dominant, self.state_frequencies_constrained)
    }

    /// Sum of `weight * ln L_p` over `patterns`, evaluated on `threads`
    /// workers, each with its own deep clone of `root`, plus the
    /// constant-site correction if `constant_sites_removed`. Returns
    /// `-infinity` as soon as any pattern's likelihood is `<= 0`, or
    /// as soon as the correction's denominator is `<= 0`.
    pub fn log_likelihood(
        &self,
        root: &NetworkArena,
        patterns: &[AlleleCountPattern],
        threads: usize,
        constant_sites_removed: bool,
        unique_totals: &[TotalCountPattern],
    ) -> Result<f64> {
        let (sites_sum, correction) = if threads < 2 {
            let mut arena = root.clone_for_thread();
            let sites_sum = self.sum_range(&mut arena, patterns)?;
            let correction = if constant_sites_removed {
                self.correction_on(&mut arena, unique_totals)?
            } else {
                0.0
            };
            (sites_sum, correction)
        } else {
            let pool = ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .expect("failed to build worker thread pool");
            let workers = threads - 1;
            let chunk_size = ((patterns.len() + workers - 1) / workers).max(1);
            let worker_chunks: Vec<&[AlleleCountPattern]> =
                patterns.chunks(chunk_size).collect();

            pool.install(|| -> Result<(f64, f64)> {
                // Main thread: constant-site correction, concurrently
                // with the worker threads' pattern ranges (§5).
                let main_correction = || -> Result<f64> {
                    if constant_sites_removed {
                        let mut arena = root.clone_for_thread();
                        self.correction_on(&mut arena, unique_totals)
                    } else {
                        Ok(0.0)
                    }
                };
                let worker_sum = || -> Result<f64> {
                    worker_chunks
                        .par_iter()
                        .map(|chunk| {
                            let mut arena = root.clone_for_thread();
                            self.sum_range(&mut arena, chunk)
                        })
                        .try_fold(|| 0.0_f64, |acc, part| part.map(|p| acc + p))
                        .try_reduce(|| 0.0, |a, b| Ok(a + b))
                };
                let (correction, sites_sum) = rayon::join(main_correction, worker_sum);
                Ok((sites_sum?, correction?))
            })?
        };

        debug!(
            "log_likelihood: {} patterns, {} threads, sites_sum={:?}, correction={:?}",
            patterns.len(),
            threads,
            LogProb(sites_sum),
            LogProb(correction)
        );
        if sites_sum.is_infinite() || correction.is_infinite() {
            return Ok(f64::NEG_INFINITY);
        }
        Ok(sites_sum + correction)
    }

    fn sum_range(&self, arena: &mut NetworkArena, patterns: &[AlleleCountPattern]) -> Result<f64> {
        let engine = self.engine();
        let mut sum = 0.0;
        for pattern in patterns {
            let likelihood = engine.compute_pattern_likelihood(arena, pattern)?;
            if likelihood <= 0.0 {
                warn!("pattern likelihood <= 0, returning -infinity");
                return Ok(f64::NEG_INFINITY);
            }
            sum += pattern.weight() as f64 * likelihood.ln();
        }
        Ok(sum)
    }

    fn correction_on(&self, arena: &mut NetworkArena, unique_totals: &[TotalCountPattern]) -> Result<f64> {
        let engine = self.engine();
        let mut correction = 0.0;
        for pattern in unique_totals {
            let (all_green, all_red) =
                engine.compute_constant_pattern_likelihoods(arena, pattern.total())?;
            let variable = 1.0 - all_green - all_red;
            if variable <= 0.0 {
                return Ok(f64::NEG_INFINITY);
            }
            correction += pattern.weight() as f64 * variable.ln();
        }
        Ok(correction)
    }

    /// §4.6 constant-pattern correction, run standalone (e.g. from a
    /// single-threaded caller that wants the correction by itself).
    pub fn log_likelihood_correction_for_constant_sites(
        &self,
        root: &NetworkArena,
        unique_totals: &[TotalCountPattern],
    ) -> Result<f64> {
        let mut arena = root.clone_for_thread();
        self.correction_on(&mut arena, unique_totals)
    }
}
