use rand::Rng;
use rayon::prelude::*;

use crate::{
    dataset::Dataset,
    forward,
    model::Model,
    node::NodeId,
    vector::Vector,
    worker::WorkerHandle,
    error::Result,
};

/// Mean squared error distributed across the cluster: scatters a `forward`
/// request via the forward orchestrator, then reduces locally.
pub async fn distributed(workers: &[(NodeId, WorkerHandle)], dataset: &Dataset, weights: Vector) -> Result<f64> {
    let preds = forward::forward(workers, dataset.len(), weights).await?;
    Ok(mean_squared_error(preds.iter().copied(), dataset.all().iter().map(|s| s.label)))
}

/// Mean squared error over the full local dataset, using the model kernel directly.
///
/// Cheaper than `distributed` and doesn't touch the workers; this is what the
/// async loss monitor samples on. Samples are scored in parallel, the way
/// the storage layer processes shards, since this runs on every monitor tick.
pub fn local_full(dataset: &Dataset, model: &dyn Model, weights: &Vector) -> f64 {
    if dataset.is_empty() {
        return 0.0;
    }

    let sum: f64 = dataset
        .all()
        .par_iter()
        .map(|s| (model.predict(weights, &s.features) - s.label).powi(2))
        .sum();

    sum / dataset.len() as f64
}

/// Mean squared error over `count` uniform-random samples drawn with replacement.
pub fn local_sampled<R: Rng>(dataset: &Dataset, model: &dyn Model, weights: &Vector, count: usize, rng: &mut R) -> f64 {
    if count == 0 || dataset.is_empty() {
        return 0.0;
    }

    let sum: f64 = (0..count)
        .map(|_| {
            let sample = dataset.get(rng.random_range(0..dataset.len()));
            let pred = model.predict(weights, &sample.features);
            (pred - sample.label).powi(2)
        })
        .sum();

    sum / count as f64
}

fn mean_squared_error<P, L>(preds: P, labels: L) -> f64
where
    P: Iterator<Item = f64>,
    L: Iterator<Item = f64>,
{
    let mut sum = 0.0;
    let mut n = 0usize;

    for (p, y) in preds.zip(labels) {
        sum += (p - y).powi(2);
        n += 1;
    }

    if n == 0 { 0.0 } else { sum / n as f64 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dataset::Sample, model::LinearModel};
    use rand::{SeedableRng, rngs::StdRng};

    fn dataset() -> Dataset {
        Dataset::new(vec![
            Sample { features: Vector::new(vec![1.0]).unwrap(), label: 2.0 },
            Sample { features: Vector::new(vec![2.0]).unwrap(), label: 4.0 },
            Sample { features: Vector::new(vec![3.0]).unwrap(), label: 6.0 },
        ])
    }

    #[test]
    fn local_full_is_zero_for_a_perfect_model() {
        let data = dataset();
        let weights = Vector::new(vec![2.0]).unwrap();
        assert_eq!(local_full(&data, &LinearModel, &weights), 0.0);
    }

    #[test]
    fn local_sampled_with_perfect_model_is_also_zero() {
        let data = dataset();
        let weights = Vector::new(vec![2.0]).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(local_sampled(&data, &LinearModel, &weights, 20, &mut rng), 0.0);
    }

    #[test]
    fn local_full_penalizes_wrong_weights() {
        let data = dataset();
        let weights = Vector::new(vec![0.0]).unwrap();
        assert!(local_full(&data, &LinearModel, &weights) > 0.0);
    }
}
