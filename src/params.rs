//! C7 ParameterCell: a named mutable scalar (node height, population
//! size, ...) shared by reference across nodes, with a store/restore
//! pair for operator-driven mutation (§3, §5, §9 "Shared mutable
//! parameters").

use std::sync::{Arc, RwLock};

use getset::Getters;

use crate::priors::ContinuousDistribution;

/// A single named scalar with a stored (previous) value and an
/// optional attached prior.
///
/// `ParameterCell` itself is not `Clone`-shared directly; nodes hold a
/// `ParameterHandle`, so that cloning a handle shares the underlying
/// value, matching the "single logical value with last-writer-wins
/// semantics" requirement.
#[derive(Getters)]
pub struct ParameterCell {
    #[getset(get = "pub")]
    name: String,
    value: f64,
    stored_value: f64,
    fixed: bool,
    prior: Option<Box<dyn ContinuousDistribution + Send + Sync>>,
}

impl std::fmt::Debug for ParameterCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterCell")
            .field("name", &self.name)
            .field("value", &self.value)
            .field("stored_value", &self.stored_value)
            .field("fixed", &self.fixed)
            .field("has_prior", &self.prior.is_some())
            .finish()
    }
}

impl ParameterCell {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        ParameterCell {
            name: name.into(),
            value,
            stored_value: value,
            fixed: false,
            prior: None,
        }
    }

    pub fn with_prior(mut self, prior: Box<dyn ContinuousDistribution + Send + Sync>) -> Self {
        self.prior = Some(prior);
        self
    }

    pub fn fixed(mut self, fixed: bool) -> Self {
        self.fixed = fixed;
        self
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn set_value(&mut self, value: f64) {
        self.value = value;
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    pub fn prior(&self) -> Option<&dyn ContinuousDistribution> {
        self.prior.as_deref()
    }

    pub fn ln_prior_density(&self) -> f64 {
        self.prior
            .as_ref()
            .map_or(0.0, |prior| prior.ln_pdf(self.value))
    }

    /// Copy the current value into the stored slot.
    pub fn store(&mut self) {
        self.stored_value = self.value;
    }

    /// Copy the stored value back into the current slot.
    pub fn restore(&mut self) {
        self.value = self.stored_value;
    }
}

/// A shared, mutable handle to a `ParameterCell`. Cloning a handle
/// shares the underlying cell; nodes never hold the value itself.
///
/// `Arc<RwLock<..>>` rather than `Rc<RefCell<..>>`: during an
/// evaluation, worker threads each read through a shared handle (§5
/// "parameters are read-only views into shared parameter state"), so
/// the handle must be `Send + Sync`.
pub type ParameterHandle = Arc<RwLock<ParameterCell>>;

pub fn new_handle(cell: ParameterCell) -> ParameterHandle {
    Arc::new(RwLock::new(cell))
}
