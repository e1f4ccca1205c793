//! C1 Pattern Probability Matrix: a fixed-size lower-triangular table
//! of `P(n alleles, r red)` for `n = 0..=N`.

use crate::errors::{Error, Result};

/// `f(n, r)` for `0 <= r <= n <= capacity`, plus the `(0, 0)` cell
/// stored separately from the `n >= 1` body.
///
/// Index scheme for `n >= 1`: `n*(n+1)/2 - 1 + r`.
#[derive(Clone, Debug, PartialEq)]
pub struct PatternProbabilityMatrix {
    capacity: usize,
    no_alleles: f64,
    body: Vec<f64>,
}

fn body_len(capacity: usize) -> usize {
    if capacity == 0 {
        0
    } else {
        capacity * (capacity + 3) / 2
    }
}

pub(crate) fn body_index(n: usize, r: usize) -> usize {
    debug_assert!(n >= 1);
    n * (n + 1) / 2 - 1 + r
}

impl PatternProbabilityMatrix {
    /// A zero-capacity matrix: no alleles observed, used for
    /// all-missing leaves and as the neutral element of merges.
    pub fn zero_capacity() -> Self {
        PatternProbabilityMatrix {
            capacity: 0,
            no_alleles: 0.0,
            body: Vec::new(),
        }
    }

    pub fn new(capacity: usize) -> Self {
        PatternProbabilityMatrix {
            capacity,
            no_alleles: 0.0,
            body: vec![0.0; body_len(capacity)],
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Reallocate to `capacity`, zeroing every cell.
    pub fn reset(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.no_alleles = 0.0;
        self.body.clear();
        self.body.resize(body_len(capacity), 0.0);
    }

    pub fn no_alleles(&self) -> f64 {
        self.no_alleles
    }

    pub fn set_no_alleles(&mut self, value: f64) {
        self.no_alleles = value;
    }

    pub fn get(&self, n: usize, r: usize) -> f64 {
        assert!(r <= n && n <= self.capacity, "get({}, {}) out of bounds (capacity {})", n, r, self.capacity);
        if n == 0 {
            self.no_alleles
        } else {
            self.body[body_index(n, r)]
        }
    }

    pub fn set(&mut self, n: usize, r: usize, value: f64) {
        assert!(r <= n && n <= self.capacity, "set({}, {}) out of bounds (capacity {})", n, r, self.capacity);
        if n == 0 {
            self.no_alleles = value;
        } else {
            self.body[body_index(n, r)] = value;
        }
    }

    pub fn add(&mut self, n: usize, r: usize, value: f64) {
        let current = self.get(n, r);
        self.set(n, r, current + value);
    }

    /// Body cells only, in `(n, r)` row-major order for `n = 1..=capacity`.
    pub fn body(&self) -> &[f64] {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut [f64] {
        &mut self.body
    }

    /// Copy `other` into `self`; capacities must agree.
    pub fn copy_from(&mut self, other: &PatternProbabilityMatrix) -> Result<()> {
        if self.capacity != other.capacity {
            return Err(Error::CapacityMismatch {
                from: other.capacity,
                to: self.capacity,
            });
        }
        self.no_alleles = other.no_alleles;
        self.body.copy_from_slice(&other.body);
        Ok(())
    }
}

/// Binomial coefficients `C(n, 0..=n)` via the recurrence
/// `b(n, r+1) = b(n, r) * (n - r) / (r + 1)` (§4.5.3 step 1).
pub fn binomial_row(n: usize) -> Vec<f64> {
    let mut row = Vec::with_capacity(n + 1);
    let mut b = 1.0;
    row.push(b);
    for r in 0..n {
        b *= (n - r) as f64 / (r + 1) as f64;
        row.push(b);
    }
    row
}
