//! The arena owning all `NetworkNode`s by integer ID (§9), plus the
//! construction/validation surface used by tests and by callers who
//! already parsed a network elsewhere (no file-format parsing lives
//! in this crate).

use std::collections::HashSet;

use crate::errors::{Error, Result};
use crate::network::node::{NetworkNode, NodeId};
use crate::params::{new_handle, ParameterCell, ParameterHandle};

#[derive(Clone, Debug)]
pub struct NetworkArena {
    nodes: Vec<NetworkNode>,
    root: NodeId,
    num_leaves: usize,
}

impl NetworkArena {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn num_leaves(&self) -> usize {
        self.num_leaves
    }

    pub fn node(&self, id: NodeId) -> Result<&NetworkNode> {
        self.nodes.get(id).ok_or(Error::NodeIndexOutOfRange {
            index: id,
            len: self.nodes.len(),
        })
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut NetworkNode> {
        let len = self.nodes.len();
        self.nodes
            .get_mut(id)
            .ok_or(Error::NodeIndexOutOfRange { index: id, len })
    }

    /// `parent(branch_index).height - this.height` (§4.4 `length(i)`).
    pub fn length(&self, id: NodeId, branch_index: usize) -> Result<f64> {
        let node = self.node(id)?;
        let parent_id =
            node.parents
                .get(branch_index)
                .copied()
                .ok_or(Error::NotAParent {
                    index: id,
                    branch: branch_index,
                })?;
        let parent = self.node(parent_id)?;
        Ok(parent.height() - node.height())
    }

    /// A deep clone of node structure from `root` downward; height and
    /// population-size `ParameterHandle`s are shared (`Arc::clone`),
    /// not duplicated, so the clone is a cheap, read-only view during
    /// a concurrent evaluation while PPMs remain private per clone.
    pub fn clone_for_thread(&self) -> NetworkArena {
        self.clone()
    }

    /// Walk the DAG and set every node's bottom/top PPM capacity to
    /// the sum over leaf descendants of `totals[population_index]`,
    /// counting each leaf once even when reached via a reticulation
    /// from both of its parents (§4.4 `resize_all`).
    pub fn resize_all(&mut self, totals: &[usize]) -> Result<()> {
        let mut memo: Vec<Option<usize>> = vec![None; self.nodes.len()];
        let capacities: Vec<usize> = (0..self.nodes.len())
            .map(|id| self.subtree_capacity(id, totals, &mut memo))
            .collect::<Result<Vec<_>>>()?;
        for (id, capacity) in capacities.into_iter().enumerate() {
            let branches = self.nodes[id].num_branches().max(1);
            let node = &mut self.nodes[id];
            node.ensure_branches(branches);
            for b in 0..branches {
                node.bottom[b].reset(capacity);
                node.top[b].reset(capacity);
            }
        }
        Ok(())
    }

    fn subtree_capacity(
        &self,
        id: NodeId,
        totals: &[usize],
        memo: &mut Vec<Option<usize>>,
    ) -> Result<usize> {
        if let Some(cached) = memo[id] {
            return Ok(cached);
        }
        let node = self.node(id)?;
        let capacity = if let Some(pop) = node.population_index {
            *totals.get(pop).ok_or(Error::NodeIndexOutOfRange {
                index: pop,
                len: totals.len(),
            })?
        } else {
            let mut sum = 0;
            for &child in &node.children.clone() {
                sum += self.subtree_capacity(child, totals, memo)?;
            }
            sum
        };
        memo[id] = Some(capacity);
        Ok(capacity)
    }

    pub fn make_all_dirty(&mut self) {
        for node in &mut self.nodes {
            node.make_dirty();
        }
    }

    pub fn make_all_clean(&mut self) {
        for node in &mut self.nodes {
            node.make_clean();
        }
    }

    pub fn clade_has_dirt(&self, id: NodeId) -> Result<bool> {
        let node = self.node(id)?;
        if node.is_dirty() {
            return Ok(true);
        }
        for &child in &node.children {
            if self.clade_has_dirt(child)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn store_all_parameter_values(&self) -> Result<()> {
        let mut visited = HashSet::new();
        self.store_or_restore(self.root, &mut visited, true)
    }

    pub fn restore_all_parameter_values(&self) -> Result<()> {
        let mut visited = HashSet::new();
        self.store_or_restore(self.root, &mut visited, false)
    }

    fn store_or_restore(
        &self,
        id: NodeId,
        visited: &mut HashSet<NodeId>,
        store: bool,
    ) -> Result<()> {
        let node = self.node(id)?;
        if node.is_reticulation() {
            if visited.contains(&id) {
                return Ok(());
            }
            visited.insert(id);
        }
        if store {
            node.height.write().expect("height lock poisoned").store();
            node.population_size
                .write()
                .expect("population size lock poisoned")
                .store();
        } else {
            node.height
                .write()
                .expect("height lock poisoned")
                .restore();
            node.population_size
                .write()
                .expect("population size lock poisoned")
                .restore();
        }
        for &child in &node.children.clone() {
            self.store_or_restore(child, visited, store)?;
        }
        Ok(())
    }

    /// Heights must be non-decreasing from leaves to each parent.
    pub fn validate_heights(&self) -> Result<()> {
        for node in &self.nodes {
            for &parent_id in &node.parents {
                let parent = self.node(parent_id)?;
                if parent.height() + 1e-12 < node.height() {
                    return Err(Error::NonMonotonicHeight {
                        child: node.population_index.unwrap_or(usize::MAX),
                        child_height: node.height(),
                        parent: parent.population_index.unwrap_or(usize::MAX),
                        parent_height: parent.height(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// In-memory builder for wiring up leaves, internal nodes, and
/// reticulations by integer index. Not a configuration-file parser:
/// NEXUS/YAML input is an external collaborator's job.
pub struct NetworkBuilder {
    nodes: Vec<NetworkNode>,
    num_leaves: usize,
}

impl NetworkBuilder {
    pub fn new(num_leaves: usize) -> Self {
        NetworkBuilder {
            nodes: Vec::new(),
            num_leaves,
        }
    }

    pub fn add_leaf(&mut self, label: impl Into<String>, population_index: usize, height: f64, population_size: f64) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(NetworkNode::new_leaf(
            label,
            population_index,
            new_handle(ParameterCell::new("height", height)),
            new_handle(ParameterCell::new("population_size", population_size)),
            self.num_leaves,
        ));
        id
    }

    pub fn add_internal(&mut self, label: impl Into<String>, height: f64, population_size: f64) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(NetworkNode::new_internal(
            label,
            new_handle(ParameterCell::new("height", height)),
            new_handle(ParameterCell::new("population_size", population_size)),
            self.num_leaves,
        ));
        id
    }

    /// Attach `child` as a child of `parent`, recording the mutual
    /// parent/child back-reference.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        {
            let child_node = self
                .nodes
                .get_mut(child)
                .ok_or(Error::NodeIndexOutOfRange {
                    index: child,
                    len: self.nodes.len(),
                })?;
            child_node.parents.push(parent);
            let count = child_node.parents.len();
            child_node.ensure_branches(count);
        }
        for (i, &leaf) in child_split(&self.nodes, child).iter().enumerate() {
            if leaf {
                self.nodes[parent].split[i] = true;
            }
        }
        let parent_node = self
            .nodes
            .get_mut(parent)
            .ok_or(Error::NodeIndexOutOfRange {
                index: parent,
                len: self.nodes.len(),
            })?;
        parent_node.children.push(child);
        Ok(())
    }

    pub fn set_inheritance_proportions(&mut self, reticulation: NodeId, proportions: Vec<f64>) -> Result<()> {
        self.nodes
            .get_mut(reticulation)
            .ok_or(Error::NodeIndexOutOfRange {
                index: reticulation,
                len: self.nodes.len(),
            })?
            .set_inheritance_proportions(proportions)
    }

    pub fn finish(self, root: NodeId) -> Result<NetworkArena> {
        let arena = NetworkArena {
            nodes: self.nodes,
            root,
            num_leaves: self.num_leaves,
        };
        arena.validate_heights()?;
        Ok(arena)
    }
}

fn child_split(nodes: &[NetworkNode], child: NodeId) -> Vec<bool> {
    nodes[child].split.clone()
}
