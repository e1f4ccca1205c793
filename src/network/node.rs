//! C4 NetworkNode: a vertex of the tree or reticulation network.
//!
//! Nodes live in a `NetworkArena` and refer to each other by integer
//! ID rather than by pointer (§9 "Shared, cyclic-looking node
//! graphs"): children IDs are strongly owned by the arena, parent IDs
//! are non-owning back-references. A node with two parent IDs is a
//! reticulation.

use crate::errors::{Error, Result};
use crate::params::ParameterHandle;
use crate::ppm::PatternProbabilityMatrix;

pub type NodeId = usize;

#[derive(Clone, Debug)]
pub struct NetworkNode {
    pub(crate) label: String,
    /// Index into the data's per-population columns; `Some` only for
    /// leaves.
    pub(crate) population_index: Option<usize>,
    pub(crate) height: ParameterHandle,
    pub(crate) population_size: ParameterHandle,
    pub(crate) children: Vec<NodeId>,
    pub(crate) parents: Vec<NodeId>,
    /// Parallel to `parents`; meaningful (length 2, summing to 1) only
    /// for reticulations.
    pub(crate) inheritance: Vec<f64>,
    /// One bottom/top PPM per branch, i.e. per entry in `parents`
    /// (or a single slot at index 0 for a root or a non-reticulation
    /// node).
    pub(crate) bottom: Vec<PatternProbabilityMatrix>,
    pub(crate) top: Vec<PatternProbabilityMatrix>,
    pub(crate) dirty: bool,
    /// Leaf-set membership bitset, used by equality and display (§3).
    pub(crate) split: Vec<bool>,
}

impl NetworkNode {
    pub(crate) fn new_leaf(
        label: impl Into<String>,
        population_index: usize,
        height: ParameterHandle,
        population_size: ParameterHandle,
        num_leaves: usize,
    ) -> Self {
        let mut split = vec![false; num_leaves];
        split[population_index] = true;
        NetworkNode {
            label: label.into(),
            population_index: Some(population_index),
            height,
            population_size,
            children: Vec::new(),
            parents: Vec::new(),
            inheritance: Vec::new(),
            bottom: vec![PatternProbabilityMatrix::zero_capacity()],
            top: vec![PatternProbabilityMatrix::zero_capacity()],
            dirty: true,
            split,
        }
    }

    pub(crate) fn new_internal(
        label: impl Into<String>,
        height: ParameterHandle,
        population_size: ParameterHandle,
        num_leaves: usize,
    ) -> Self {
        NetworkNode {
            label: label.into(),
            population_index: None,
            height,
            population_size,
            children: Vec::new(),
            parents: Vec::new(),
            inheritance: Vec::new(),
            bottom: vec![PatternProbabilityMatrix::zero_capacity()],
            top: vec![PatternProbabilityMatrix::zero_capacity()],
            dirty: true,
            split: vec![false; num_leaves],
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn population_index(&self) -> Option<usize> {
        self.population_index
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn is_reticulation(&self) -> bool {
        self.parents.len() >= 2
    }

    pub fn is_polytomy(&self) -> bool {
        self.children.len() > 2
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parents(&self) -> &[NodeId] {
        &self.parents
    }

    pub fn height(&self) -> f64 {
        self.height.read().expect("height lock poisoned").value()
    }

    pub fn population_size(&self) -> f64 {
        self.population_size
            .read()
            .expect("population size lock poisoned")
            .value()
    }

    pub fn height_handle(&self) -> &ParameterHandle {
        &self.height
    }

    pub fn population_size_handle(&self) -> &ParameterHandle {
        &self.population_size
    }

    /// The number of branches leaving this node upward: 1 for a
    /// non-reticulation non-root node, 2 for a reticulation, 0 for a
    /// root (which still has a single bottom slot at index 0).
    pub fn num_branches(&self) -> usize {
        self.bottom.len()
    }

    fn check_branch(&self, branch_index: usize) -> Result<()> {
        if branch_index >= self.bottom.len() {
            return Err(Error::BranchIndexOutOfRange {
                index: self.population_index.unwrap_or(usize::MAX),
                branch: branch_index,
                parents: self.parents.len(),
            });
        }
        Ok(())
    }

    pub fn bottom(&self, branch_index: usize) -> Result<&PatternProbabilityMatrix> {
        self.check_branch(branch_index)?;
        Ok(&self.bottom[branch_index])
    }

    pub fn bottom_mut(&mut self, branch_index: usize) -> Result<&mut PatternProbabilityMatrix> {
        self.check_branch(branch_index)?;
        Ok(&mut self.bottom[branch_index])
    }

    pub fn top(&self, branch_index: usize) -> Result<&PatternProbabilityMatrix> {
        self.check_branch(branch_index)?;
        Ok(&self.top[branch_index])
    }

    pub fn top_mut(&mut self, branch_index: usize) -> Result<&mut PatternProbabilityMatrix> {
        self.check_branch(branch_index)?;
        Ok(&mut self.top[branch_index])
    }

    pub fn copy_bottom_pattern_probs(
        &mut self,
        branch_index: usize,
        source: &PatternProbabilityMatrix,
    ) -> Result<()> {
        self.check_branch(branch_index)?;
        if self.bottom[branch_index].capacity() != source.capacity() {
            self.bottom[branch_index].reset(source.capacity());
        }
        self.bottom[branch_index].copy_from(source)
    }

    pub fn copy_top_pattern_probs(
        &mut self,
        branch_index: usize,
        source: &PatternProbabilityMatrix,
    ) -> Result<()> {
        self.check_branch(branch_index)?;
        if self.top[branch_index].capacity() != source.capacity() {
            self.top[branch_index].reset(source.capacity());
        }
        self.top[branch_index].copy_from(source)
    }

    /// The current PPM capacity at this node (bottom branch 0).
    pub fn allele_count(&self) -> usize {
        self.bottom[0].capacity()
    }

    pub fn inheritance_proportion(&self, branch_index: usize) -> Result<f64> {
        self.check_branch(branch_index)?;
        Ok(self.inheritance.get(branch_index).copied().unwrap_or(1.0))
    }

    pub fn set_inheritance_proportions(&mut self, proportions: Vec<f64>) -> Result<()> {
        if self.parents.len() != 2 {
            return Err(Error::InvalidReticulation {
                index: self.population_index.unwrap_or(usize::MAX),
                found: self.parents.len(),
            });
        }
        let sum: f64 = proportions.iter().sum();
        if (sum - 1.0).abs() > 1e-9 {
            return Err(Error::InheritanceProportionsDoNotSum {
                index: self.population_index.unwrap_or(usize::MAX),
                sum,
            });
        }
        self.inheritance = proportions;
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn make_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn make_clean(&mut self) {
        self.dirty = false;
    }

    pub(crate) fn ensure_branches(&mut self, count: usize) {
        while self.bottom.len() < count {
            self.bottom.push(PatternProbabilityMatrix::zero_capacity());
            self.top.push(PatternProbabilityMatrix::zero_capacity());
        }
    }
}
