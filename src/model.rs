use crate::vector::Vector;

/// The model kernel: a pure function `(weights, x) -> prediction`.
///
/// Out of scope per the spec beyond this contract; the coordinator core never
/// interprets the weights itself, it only feeds them through a `Model` when
/// it needs a prediction for loss evaluation.
pub trait Model: Send + Sync {
    fn predict(&self, weights: &Vector, x: &Vector) -> f64;
}

/// The default linear model used by the sparse SVM: a plain dot product.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearModel;

impl Model for LinearModel {
    fn predict(&self, weights: &Vector, x: &Vector) -> f64 {
        weights
            .as_slice()
            .iter()
            .zip(x.as_slice())
            .map(|(w, xi)| w * xi)
            .sum()
    }
}
