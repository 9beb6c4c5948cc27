use serde::{Deserialize, Serialize};

/// Continuous argument binding for one skeleton step.
///
/// Produced by a sampler, consumed by the option model. The core never
/// interprets the values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Parameterization {
    values: Vec<f64>,
}

impl Parameterization {
    #[must_use]
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Vec<f64>> for Parameterization {
    fn from(values: Vec<f64>) -> Self {
        Self::new(values)
    }
}
