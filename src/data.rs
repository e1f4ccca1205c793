//! Site-pattern data model: per-leaf-population allele counts, with a
//! weight (site multiplicity).

use crate::errors::{Error, Result};

#[derive(Clone, Debug, PartialEq)]
pub struct AlleleCountPattern {
    red: Vec<u32>,
    total: Vec<u32>,
    weight: u64,
}

impl AlleleCountPattern {
    pub fn new(red: Vec<u32>, total: Vec<u32>, weight: u64) -> Result<Self> {
        if red.len() != total.len() {
            return Err(Error::CapacityMismatch {
                from: red.len(),
                to: total.len(),
            });
        }
        for (k, (&r, &t)) in red.iter().zip(total.iter()).enumerate() {
            if r > t {
                return Err(Error::RedExceedsTotal {
                    population: k,
                    red: r,
                    total: t,
                });
            }
        }
        Ok(AlleleCountPattern { red, total, weight })
    }

    pub fn red(&self) -> &[u32] {
        &self.red
    }

    pub fn total(&self) -> &[u32] {
        &self.total
    }

    pub fn weight(&self) -> u64 {
        self.weight
    }

    pub fn num_populations(&self) -> usize {
        self.total.len()
    }

    /// A pattern is constant if every population's red count is 0, or
    /// every population's red count equals its total.
    pub fn is_constant(&self) -> bool {
        self.red.iter().all(|&r| r == 0)
            || self
                .red
                .iter()
                .zip(self.total.iter())
                .all(|(&r, &t)| r == t)
    }

    /// Replace `red[k]` by `total[k] - red[k]` wherever `red[k] >
    /// total[k] / 2`. Valid only under symmetric state frequencies.
    pub fn folded(&self) -> Self {
        let red = self
            .red
            .iter()
            .zip(self.total.iter())
            .map(|(&r, &t)| {
                if 2 * r > t {
                    t - r
                } else {
                    r
                }
            })
            .collect();
        AlleleCountPattern {
            red,
            total: self.total.clone(),
            weight: self.weight,
        }
    }
}

/// A unique total-allele-count vector with its aggregate weight, used
/// for the constant-site correction (§4.6).
#[derive(Clone, Debug, PartialEq)]
pub struct TotalCountPattern {
    total: Vec<u32>,
    weight: u64,
}

impl TotalCountPattern {
    pub fn new(total: Vec<u32>, weight: u64) -> Self {
        TotalCountPattern { total, weight }
    }

    pub fn total(&self) -> &[u32] {
        &self.total
    }

    pub fn weight(&self) -> u64 {
        self.weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_red_above_total() {
        assert!(AlleleCountPattern::new(vec![3], vec![2], 1).is_err());
    }

    #[test]
    fn constant_detection() {
        let all_green = AlleleCountPattern::new(vec![0, 0], vec![2, 4], 1).unwrap();
        let all_red = AlleleCountPattern::new(vec![2, 4], vec![2, 4], 1).unwrap();
        let mixed = AlleleCountPattern::new(vec![1, 0], vec![2, 4], 1).unwrap();
        assert!(all_green.is_constant());
        assert!(all_red.is_constant());
        assert!(!mixed.is_constant());
    }

    #[test]
    fn folding_picks_minority_count() {
        let pattern = AlleleCountPattern::new(vec![3], vec![4], 1).unwrap();
        assert_eq!(pattern.folded().red(), &[1]);
    }
}
