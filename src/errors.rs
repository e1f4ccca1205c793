use thiserror::Error;

/// Errors surfaced synchronously by network and PPM accessors.
///
/// Numerical degeneracy (non-positive or NaN pattern likelihoods) and
/// all-missing patterns are not represented here: they are recovered
/// in-band by the engine and driver per their contracts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("node {index} has no parent at branch index {branch}")]
    NotAParent { index: usize, branch: usize },

    #[error("node {index} is not a child of node {parent}")]
    NotAChild { index: usize, parent: usize },

    #[error("attempted to collapse node {index} with {parents} parent(s)")]
    InvalidCollapse { index: usize, parents: usize },

    #[error("node index {index} out of range (arena holds {len} nodes)")]
    NodeIndexOutOfRange { index: usize, len: usize },

    #[error("branch index {branch} out of range for node {index} ({parents} parent(s))")]
    BranchIndexOutOfRange {
        index: usize,
        branch: usize,
        parents: usize,
    },

    #[error(
        "cannot copy pattern probabilities: capacity {from} does not match branch capacity {to}"
    )]
    CapacityMismatch { from: usize, to: usize },

    #[error("reticulation node {index} must have exactly two parents, found {found}")]
    InvalidReticulation { index: usize, found: usize },

    #[error("population {population} has red count {red} greater than total count {total}")]
    RedExceedsTotal {
        population: usize,
        red: u32,
        total: u32,
    },

    #[error("inheritance proportions for node {index} sum to {sum}, expected 1.0")]
    InheritanceProportionsDoNotSum { index: usize, sum: f64 },

    #[error(
        "node {child} has height {child_height} which exceeds parent {parent}'s height {parent_height}"
    )]
    NonMonotonicHeight {
        child: usize,
        child_height: f64,
        parent: usize,
        parent_height: f64,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
