//! C5 PartialsEngine: leaf init, branch propagation, reticulation
//! split, sibling merge, and root contraction (§4.5), driven by a
//! DAG-safe post-order recursion (§4.5.6) that visits every
//! reticulation's partials exactly once.

use std::collections::HashSet;

use itertools::iproduct;
use statrs::function::factorial::ln_binomial;

use crate::data::AlleleCountPattern;
use crate::errors::Result;
use crate::expm::MatrixExponentiator;
use crate::mutation::MutationModel;
use crate::network::{NetworkArena, NodeId};
use crate::ppm::{binomial_row, PatternProbabilityMatrix};
use crate::qmatrix::QMatrix;

fn choose(n: usize, k: usize) -> f64 {
    if k > n {
        0.0
    } else {
        ln_binomial(n as u64, k as u64).exp()
    }
}

/// Holds the one `MatrixExponentiator` reused across every branch
/// evaluated by this engine instance (§4.3: "one instance per thread
/// of execution").
pub struct PartialsEngine {
    mutation: MutationModel,
    dominant: bool,
    state_frequencies_constrained: bool,
    exponentiator: MatrixExponentiator,
}

impl PartialsEngine {
    pub fn new(mutation: MutationModel, dominant: bool, state_frequencies_constrained: bool) -> Self {
        PartialsEngine {
            mutation,
            dominant,
            state_frequencies_constrained,
            exponentiator: MatrixExponentiator::new(),
        }
    }

    pub fn mutation(&self) -> &MutationModel {
        &self.mutation
    }

    /// §4.5.1 Leaf initialization.
    pub fn compute_leaf_partials(&self, total: u32, red: u32) -> PatternProbabilityMatrix {
        if total == 0 {
            let mut ppm = PatternProbabilityMatrix::zero_capacity();
            ppm.set_no_alleles(1.0);
            return ppm;
        }
        if !self.dominant {
            let mut ppm = PatternProbabilityMatrix::new(total as usize);
            ppm.set(total as usize, red as usize, 1.0);
            return ppm;
        }
        let capacity = 2 * total as usize;
        let mut ppm = PatternProbabilityMatrix::new(capacity);
        if red == 0 {
            ppm.set(capacity, 0, 1.0);
            return ppm;
        }
        let n = total as f64;
        let mut p = 1.0;
        for r in 1..=red {
            p *= 2.0 * (n - r as f64 + 1.0) / (2.0 * n - r as f64 + 1.0);
        }
        ppm.set(capacity, red as usize, p);
        for k in (red + 1)..=(2 * red) {
            p *= ((2.0 * red as f64) - k as f64 + 1.0) * k as f64
                / (2.0 * (k as f64 - red as f64) * (2.0 * n - k as f64 + 1.0));
            ppm.set(capacity, k as usize, p);
        }
        ppm
    }

    /// §4.5.2 Branch propagation: top-of-branch PPM from bottom-of-branch.
    pub fn compute_top_of_branch_partials(
        &self,
        bottom: &PatternProbabilityMatrix,
        population_size: f64,
        branch_length: f64,
    ) -> PatternProbabilityMatrix {
        let capacity = bottom.capacity();
        let mut top = if capacity == 0 || branch_length <= 0.0 {
            bottom.clone()
        } else {
            let theta = self.mutation.theta(population_size);
            let scaled_length = self.mutation.scaled_length(branch_length);
            self.exponentiator.exp_qt_x(
                capacity,
                self.mutation.u(),
                self.mutation.v(),
                theta,
                scaled_length,
                bottom,
            )
        };
        // The "no alleles" mass is time-invariant under the model
        // (§9 Open Question): always carried through unchanged.
        top.set_no_alleles(bottom.no_alleles());
        top
    }

    /// §4.5.3 Merge two children's top-of-branch PPMs into this
    /// node's bottom PPM.
    pub fn merge_top_of_branch_partials(
        &self,
        a: &PatternProbabilityMatrix,
        b: &PatternProbabilityMatrix,
    ) -> PatternProbabilityMatrix {
        let na = a.capacity();
        let nb = b.capacity();
        let capacity = na + nb;
        let mut merged = PatternProbabilityMatrix::new(capacity);
        merged.set_no_alleles(a.no_alleles() * b.no_alleles());

        let mut ascaled = a.clone();
        let mut bscaled = b.clone();
        for n in 1..=na {
            let row = binomial_row(n);
            for r in 0..=n {
                let v = ascaled.get(n, r) * row[r];
                ascaled.set(n, r, v);
            }
        }
        for n in 1..=nb {
            let row = binomial_row(n);
            for r in 0..=n {
                let v = bscaled.get(n, r) * row[r];
                bscaled.set(n, r, v);
            }
        }

        for (n2, r2) in iproduct!(1..=nb, 0..=nb).filter(|&(n, r)| r <= n) {
            merged.add(n2, r2, a.no_alleles() * bscaled.get(n2, r2));
        }
        for (n1, r1) in iproduct!(1..=na, 0..=na).filter(|&(n, r)| r <= n) {
            merged.add(n1, r1, b.no_alleles() * ascaled.get(n1, r1));
        }
        for (n1, r1) in iproduct!(1..=na, 0..=na).filter(|&(n, r)| r <= n) {
            let va = ascaled.get(n1, r1);
            if va == 0.0 {
                continue;
            }
            for (n2, r2) in iproduct!(1..=nb, 0..=nb).filter(|&(n, r)| r <= n) {
                let vb = bscaled.get(n2, r2);
                if vb == 0.0 {
                    continue;
                }
                merged.add(n1 + n2, r1 + r2, va * vb);
            }
        }

        for n in 1..=capacity {
            let row = binomial_row(n);
            for r in 0..=n {
                let c = row[r];
                let scaled = if c > 0.0 { merged.get(n, r) / c } else { 0.0 };
                merged.set(n, r, scaled.max(0.0));
            }
        }
        merged
    }

    /// §4.5.4 Split a reticulation child's top-of-branch PPM between
    /// its two parents, weighted by inheritance proportions.
    pub fn split_top_of_branch_partials(
        &self,
        child_top: &PatternProbabilityMatrix,
        gamma1: f64,
        gamma2: f64,
    ) -> (PatternProbabilityMatrix, PatternProbabilityMatrix) {
        let capacity = child_top.capacity();
        let mut out1 = PatternProbabilityMatrix::new(capacity);
        let mut out2 = PatternProbabilityMatrix::new(capacity);

        for n in 0..=capacity {
            for r in 0..=n {
                let p_nr = child_top.get(n, r);
                if p_nr == 0.0 {
                    continue;
                }
                let g = n - r;
                for r1 in 0..=r {
                    let r2 = r - r1;
                    for g1 in 0..=g {
                        let g2 = g - g1;
                        let mut p = p_nr * gamma1.powi((r1 + g1) as i32) * gamma2.powi((r2 + g2) as i32);
                        if r1 > 0 && r2 > 0 {
                            p *= choose(r, r1);
                        }
                        if g1 > 0 && g2 > 0 {
                            p *= choose(g, g1);
                        }
                        out1.add(r1 + g1, r1, p);
                        out2.add(r2 + g2, r2, p);
                    }
                }
            }
        }
        (out1, out2)
    }

    /// §4.2/§4.5.5 Stationary vector at the root, per `n`-block.
    pub fn compute_root_probabilities(&self, root_population_size: f64, capacity: usize) -> Vec<f64> {
        let theta = self.mutation.theta(root_population_size);
        let q = QMatrix::new(capacity, self.mutation.u(), self.mutation.v(), theta);
        q.find_orthogonal_vector()
    }

    /// §4.5.5 Root contraction: `L = sum x(n,r) * bottom_root(n,r)`.
    pub fn compute_root_likelihood(
        conditionals: &[f64],
        root_bottom: &PatternProbabilityMatrix,
    ) -> f64 {
        use crate::ppm::body_index;
        let mut sum = 0.0;
        for n in 1..=root_bottom.capacity() {
            for r in 0..=n {
                sum += conditionals[body_index(n, r)] * root_bottom.get(n, r);
            }
        }
        if sum < 0.0 || sum.is_nan() {
            0.0
        } else {
            sum
        }
    }

    /// §4.5.6 The recursive driver. Populates `bottom`/`top` PPMs
    /// throughout the (already capacity-sized) DAG rooted at `node`,
    /// visiting each reticulation exactly once.
    pub fn compute_pattern_partials(
        &self,
        arena: &mut NetworkArena,
        node: NodeId,
        pattern: &AlleleCountPattern,
        visited: &mut HashSet<NodeId>,
    ) -> Result<()> {
        let is_leaf = arena.node(node)?.is_leaf();
        if is_leaf {
            let pop = arena.node(node)?.population_index().expect("leaf has population index");
            let bottom = self.compute_leaf_partials(pattern.total()[pop], pattern.red()[pop]);
            arena.node_mut(node)?.copy_bottom_pattern_probs(0, &bottom)?;
            return Ok(());
        }

        let is_reticulation = arena.node(node)?.is_reticulation();
        let children: Vec<NodeId> = arena.node(node)?.children().to_vec();

        if children.len() == 1 && is_reticulation {
            if visited.contains(&node) {
                return Ok(());
            }
            let child = children[0];
            self.compute_pattern_partials(arena, child, pattern, visited)?;
            self.propagate_branch(arena, child, node)?;
            let incoming = arena
                .node(child)?
                .top(branch_index_of(arena, child, node)?)?
                .clone();
            self.apply_reticulation_split(arena, node, &incoming)?;
            visited.insert(node);
            return Ok(());
        }

        // Collect tops for every child with alleles, recursing first.
        let mut tops: Vec<PatternProbabilityMatrix> = Vec::with_capacity(children.len());
        for &child in &children {
            self.compute_pattern_partials(arena, child, pattern, visited)?;
            self.propagate_branch(arena, child, node)?;
            let top = arena.node(child)?.top(branch_index_of(arena, child, node)?)?.clone();
            tops.push(top);
        }
        self.apply_internal_merge(arena, node, tops)?;
        Ok(())
    }

    fn propagate_branch(&self, arena: &mut NetworkArena, child: NodeId, parent: NodeId) -> Result<()> {
        let branch = branch_index_of(arena, child, parent)?;
        let length = arena.length(child, branch)?;
        let population_size = arena.node(child)?.population_size();
        let bottom = arena.node(child)?.bottom(branch)?.clone();
        let top = self.compute_top_of_branch_partials(&bottom, population_size, length);
        arena.node_mut(child)?.copy_top_pattern_probs(branch, &top)?;
        Ok(())
    }

    fn apply_internal_merge(
        &self,
        arena: &mut NetworkArena,
        node: NodeId,
        tops: Vec<PatternProbabilityMatrix>,
    ) -> Result<()> {
        let with_alleles: Vec<&PatternProbabilityMatrix> =
            tops.iter().filter(|p| p.capacity() > 0).collect();
        let bottom = if with_alleles.is_empty() {
            tops[0].clone()
        } else {
            let mut acc = with_alleles[0].clone();
            for next in &with_alleles[1..] {
                acc = self.merge_top_of_branch_partials(&acc, next);
            }
            acc
        };
        arena.node_mut(node)?.copy_bottom_pattern_probs(0, &bottom)
    }

    fn apply_reticulation_split(
        &self,
        arena: &mut NetworkArena,
        node: NodeId,
        child_top: &PatternProbabilityMatrix,
    ) -> Result<()> {
        let gamma1 = arena.node(node)?.inheritance_proportion(0)?;
        let gamma2 = arena.node(node)?.inheritance_proportion(1)?;
        let (b1, b2) = self.split_top_of_branch_partials(child_top, gamma1, gamma2);
        let node_mut = arena.node_mut(node)?;
        node_mut.copy_bottom_pattern_probs(0, &b1)?;
        node_mut.copy_bottom_pattern_probs(1, &b2)?;
        Ok(())
    }

    /// One full evaluation of a single pattern: leaf init through
    /// root contraction. `arena` is a thread-local clone; only its
    /// PPMs are written.
    pub fn compute_pattern_likelihood(
        &self,
        arena: &mut NetworkArena,
        pattern: &AlleleCountPattern,
    ) -> Result<f64> {
        let root = arena.root();
        let mut visited = HashSet::new();
        self.compute_pattern_partials(arena, root, pattern, &mut visited)?;
        let root_population_size = arena.node(root)?.population_size();
        let capacity = arena.node(root)?.allele_count();
        let conditionals = self.compute_root_probabilities(root_population_size, capacity);
        let root_bottom = arena.node(root)?.bottom(0)?;
        Ok(Self::compute_root_likelihood(&conditionals, root_bottom))
    }

    /// §4.6 constant-site correction for one unique total-count vector.
    pub fn compute_constant_pattern_likelihoods(
        &self,
        arena: &mut NetworkArena,
        total: &[u32],
    ) -> Result<(f64, f64)> {
        let num_populations = total.len();
        let all_green = AlleleCountPattern::new(vec![0; num_populations], total.to_vec(), 1)
            .expect("all-zero red counts are always valid");
        let all_green_likelihood = self.compute_pattern_likelihood(arena, &all_green)?;
        let all_red_likelihood = if self.state_frequencies_constrained {
            all_green_likelihood
        } else {
            let all_red = AlleleCountPattern::new(total.to_vec(), total.to_vec(), 1)
                .expect("red == total is always valid");
            self.compute_pattern_likelihood(arena, &all_red)?
        };
        Ok((all_green_likelihood, all_red_likelihood))
    }
}

fn branch_index_of(arena: &NetworkArena, child: NodeId, parent: NodeId) -> Result<usize> {
    let node = arena.node(child)?;
    Ok(node
        .parents()
        .iter()
        .position(|&p| p == parent)
        .expect("parent/child link must be mutually consistent"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> PartialsEngine {
        PartialsEngine::new(MutationModel::from_rates(1.0, 1.0, 1.0, 2), true, true)
    }

    #[test]
    fn dominant_leaf_all_green_is_a_single_point_mass() {
        let e = engine();
        let ppm = e.compute_leaf_partials(2, 0);
        assert_eq!(ppm.capacity(), 4);
        assert_eq!(ppm.get(4, 0), 1.0);
        for r in 1..=4 {
            assert_eq!(ppm.get(4, r), 0.0);
        }
    }

    #[test]
    fn dominant_leaf_with_one_red_call_matches_the_hypergeometric_seed() {
        // total = 3, red = 1: f(6, 1) is the inductive seed
        // Pi_{r=1..1} 2(3-r+1)/(2*3-r+1) = 2*3/6 = 1, and f(6,2)
        // follows from the stated recurrence.
        let e = engine();
        let ppm = e.compute_leaf_partials(3, 1);
        assert_eq!(ppm.capacity(), 6);
        assert!((ppm.get(6, 1) - 1.0).abs() < 1e-12);
        assert!((ppm.get(6, 2) - 0.2).abs() < 1e-12);
        for r in [0, 3, 4, 5, 6] {
            assert_eq!(ppm.get(6, r), 0.0);
        }
    }

    #[test]
    fn dominant_leaf_missing_data_is_zero_capacity() {
        let e = engine();
        let ppm = e.compute_leaf_partials(0, 0);
        assert_eq!(ppm.capacity(), 0);
        assert_eq!(ppm.no_alleles(), 1.0);
    }
}
