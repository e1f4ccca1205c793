//! Diffusion-approximation coalescent likelihood engine for biallelic
//! markers sampled from populations related by a tree or phylogenetic
//! network with reticulation.
//!
//! NEXUS/character-matrix parsing, CLI and configuration parsing, MCMC
//! operators, concrete prior distributions, and random-number
//! generation are external collaborators; this crate only defines the
//! interfaces it consumes from them (`priors`, `rng`).

pub mod data;
pub mod driver;
pub mod engine;
pub mod errors;
pub mod expm;
pub mod mutation;
pub mod network;
pub mod params;
pub mod ppm;
pub mod priors;
pub mod qmatrix;
pub mod rng;

pub use data::{AlleleCountPattern, TotalCountPattern};
pub use driver::LikelihoodDriver;
pub use engine::PartialsEngine;
pub use errors::{Error, Result};
pub use mutation::MutationModel;
pub use network::{NetworkArena, NetworkBuilder, NetworkNode, NodeId};
pub use params::{new_handle, ParameterCell, ParameterHandle};
pub use ppm::PatternProbabilityMatrix;
