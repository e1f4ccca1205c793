//! Mutation model parameters: forward/backward rates `u, v`, ploidy,
//! and the per-branch mutation rate scalar.

use derive_new::new;
use getset::Getters;
use ordered_float::NotNan;

#[derive(Getters, new, Clone, Copy, Debug, PartialEq)]
pub struct MutationModel {
    u: NotNan<f64>,
    v: NotNan<f64>,
    /// Overall mutation-rate scalar applied to every branch length and
    /// every node's `theta` (the original source's `length = node
    /// length * mutation_rate`, folded into §4.5.2's branch
    /// propagation).
    #[getset(get = "pub")]
    mutation_rate: f64,
    #[getset(get = "pub")]
    ploidy: u32,
}

impl MutationModel {
    /// Build from plain rates; panics if either is `NaN`.
    pub fn from_rates(u: f64, v: f64, mutation_rate: f64, ploidy: u32) -> Self {
        MutationModel::new(
            NotNan::new(u).expect("u must not be NaN"),
            NotNan::new(v).expect("v must not be NaN"),
            mutation_rate,
            ploidy,
        )
    }

    pub fn u(&self) -> f64 {
        self.u.into_inner()
    }

    pub fn v(&self) -> f64 {
        self.v.into_inner()
    }

    /// Stationary frequency of state 1 under the two-state mutation
    /// process, `pi_1 = u / (u + v)`.
    pub fn pi1(&self) -> f64 {
        self.u() / (self.u() + self.v())
    }

    /// `theta` for a branch whose node carries `population_size`:
    /// `2 * ploidy * population_size * mutation_rate`.
    pub fn theta(&self, population_size: f64) -> f64 {
        2.0 * self.ploidy as f64 * population_size * self.mutation_rate
    }

    /// Branch length scaled by the mutation rate, as consumed by the
    /// matrix exponentiator.
    pub fn scaled_length(&self, branch_length: f64) -> f64 {
        branch_length * self.mutation_rate
    }
}
