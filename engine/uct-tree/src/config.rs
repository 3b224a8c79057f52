//! Tree configuration parameters.

/// Configuration for tree value accounting.
#[derive(Debug, Clone, Copy)]
pub struct TreeConfig {
    /// RAVE equivalence parameter: the simulation count at which AMAF and
    /// direct statistics carry comparable weight. The mixing coefficient
    /// `β = amaf_n / (amaf_n + u_n + u_n·amaf_n / rave_equiv)` approaches
    /// zero as direct playouts accumulate.
    pub rave_equiv: f32,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self { rave_equiv: 3000.0 }
    }
}

impl TreeConfig {
    /// Builder pattern: set the RAVE equivalence parameter.
    pub fn with_rave_equiv(mut self, equiv: f32) -> Self {
        self.rave_equiv = equiv;
        self
    }
}
