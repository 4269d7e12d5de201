use std::sync::Arc;

use crate::vector::Vector;

/// A single labeled training example.
#[derive(Debug, Clone)]
pub struct Sample {
    pub features: Vector,
    pub label: f64,
}

/// A read-only, indexed collection of `(featureVector, label)` pairs.
///
/// Workers address the dataset by integer ranges; the coordinator keeps its
/// own copy (or a reference to a shared one) to evaluate local and
/// distributed loss without round-tripping through a worker.
#[derive(Debug, Clone)]
pub struct Dataset {
    samples: Arc<[Sample]>,
}

impl Dataset {
    /// Builds a new `Dataset` from a vector of samples.
    pub fn new(samples: Vec<Sample>) -> Self {
        Self {
            samples: Arc::from(samples),
        }
    }

    /// Total number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the dataset has no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns the sample at `idx`.
    pub fn get(&self, idx: usize) -> &Sample {
        &self.samples[idx]
    }

    /// Returns the sub-slice of samples for `range`.
    pub fn slice(&self, range: std::ops::Range<usize>) -> &[Sample] {
        &self.samples[range]
    }

    /// Returns all samples.
    pub fn all(&self) -> &[Sample] {
        &self.samples
    }
}
