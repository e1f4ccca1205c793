//! C4 NetworkNode and the arena that owns a tree or reticulation
//! network of them (§3, §4.4, §9).

pub mod arena;
pub mod node;

pub use arena::{NetworkArena, NetworkBuilder};
pub use node::{NetworkNode, NodeId};
