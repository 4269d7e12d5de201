use std::{sync::Arc, time::Instant};

use futures::future::try_join_all;
use log::info;

use crate::{
    dataset::Dataset,
    error::{CoordinatorError, Result},
    loss,
    metrics::Metrics,
    node::NodeId,
    partition::piece_size,
    registry::WorkerRegistry,
    state::{GradState, StoppingCriterion},
    vector::Vector,
    worker::WorkerHandle,
};

/// Entry point for the synchronous training loop (C4). Gated on cluster
/// readiness: calls before quorum simply wait for it.
pub async fn backward(
    registry: &WorkerRegistry,
    dataset: &Dataset,
    epochs: usize,
    batch_size: usize,
    w0: Vector,
    stopping: StoppingCriterion,
    metrics: &Metrics,
) -> Result<GradState> {
    registry
        .with_cluster_ready(|| run(registry, dataset, epochs, batch_size, w0, stopping, metrics))
        .await
}

async fn run(
    registry: &WorkerRegistry,
    dataset: &Dataset,
    epochs: usize,
    batch_size: usize,
    w0: Vector,
    stopping: StoppingCriterion,
    metrics: &Metrics,
) -> Result<GradState> {
    let workers = registry.snapshot();
    let piece = piece_size(dataset.len(), workers.len());

    let mut state = GradState::start(w0);

    if epochs == 0 || piece == 0 {
        let loss = loss::distributed(&workers, dataset, state.grad.clone()).await?;
        return Ok(state.finish(loss));
    }

    // most-recent-first loss trace
    let mut losses: Vec<f64> = Vec::new();

    for epoch in 1..=epochs {
        let mut batch_start = 0;
        while batch_start < piece {
            let batch_end = (batch_start + batch_size).min(piece);
            let started = Instant::now();
            let grad = scatter_gather_batch(&workers, &state.grad, piece, batch_start, batch_end).await?;
            metrics.record_batch(started.elapsed());
            metrics.record_update();
            state.update(&grad);
            batch_start += batch_size;
        }

        let loss = loss::distributed(&workers, dataset, state.grad.clone()).await?;
        losses.insert(0, loss);

        info!(epoch = epoch, epochs = epochs, loss = loss; "sync epoch complete");

        // The max-epochs check is evaluated before the stopping predicate; `losses`
        // already holds this epoch's loss, so the predicate never sees an empty trace.
        if epoch >= epochs || stopping(&losses) {
            return Ok(state.finish(loss));
        }
    }

    unreachable!("the loop always returns on its final iteration")
}

/// Scatters one `GradientRequest` per worker and reduces the replies to the mean gradient.
///
/// Dispatch order matches the forward orchestrator: workers sorted by `NodeId`.
async fn scatter_gather_batch(
    workers: &[(NodeId, WorkerHandle)],
    weights: &Vector,
    piece: usize,
    batch_start: usize,
    batch_end: usize,
) -> Result<Vector> {
    let mut ordered = workers.to_vec();
    ordered.sort_by(|a, b| (&a.0.host, a.0.port).cmp(&(&b.0.host, b.0.port)));

    let calls = ordered.into_iter().enumerate().map(|(i, (_, stub))| {
        let range = i * piece + batch_start..i * piece + batch_end;
        let weights = weights.clone();
        let stub: WorkerHandle = Arc::clone(&stub);
        async move { stub.gradient(weights, range).await }
    });

    let replies = try_join_all(calls)
        .await
        .map_err(|e| CoordinatorError::WorkerRpcFailure(e.to_string()))?;

    let grads: Vec<Vector> = replies.into_iter().map(|reply| reply.grad).collect();
    Ok(Vector::mean(grads.iter()))
}

#[cfg(test)]
mod tests {
    use std::{ops::Range, time::Instant};

    use async_trait::async_trait;

    use super::*;
    use crate::{
        dataset::Sample,
        worker::{GradientReply, WorkerRpc},
    };

    /// Always replies with `grad = weights - target`, driving `backward` toward `target`.
    struct ConstantTargetWorker {
        target: f64,
    }

    #[async_trait]
    impl WorkerRpc for ConstantTargetWorker {
        async fn forward(&self, range: Range<usize>, weights: Vector) -> Result<Vec<f64>> {
            Ok(range.map(|_| weights.as_slice()[0]).collect())
        }

        async fn gradient(&self, weights: Vector, _range: Range<usize>) -> Result<GradientReply> {
            let delta: Vec<f64> = weights.as_slice().iter().map(|w| w - self.target).collect();
            let now = Instant::now();
            Ok(GradientReply {
                grad: Vector::new(delta).unwrap(),
                started_at: now,
                terminated_at: now,
            })
        }

        async fn init_async(&self, _weights: Vector, _assignment: Range<usize>, _batch_size: usize) -> Result<()> {
            Ok(())
        }

        async fn stop_async(&self) -> Result<()> {
            Ok(())
        }

        async fn register_slave(&self, _node: NodeId) -> Result<()> {
            Ok(())
        }

        async fn unregister_slave(&self, _node: NodeId) -> Result<()> {
            Ok(())
        }
    }

    fn dataset(n: usize) -> Dataset {
        Dataset::new(
            (0..n)
                .map(|i| Sample { features: Vector::zeros(1), label: i as f64 })
                .collect(),
        )
    }

    #[tokio::test]
    async fn converges_to_the_constant_target() {
        let registry = WorkerRegistry::new(1);
        registry
            .register(NodeId::new("a", 1), Arc::new(ConstantTargetWorker { target: 3.0 }))
            .await
            .unwrap();

        let data = dataset(10);
        let stopping: StoppingCriterion = Arc::new(|_| false);
        let metrics = Metrics::new();

        let result = backward(&registry, &data, 50, 5, Vector::new(vec![0.0]).unwrap(), stopping, &metrics)
            .await
            .unwrap();

        assert!((result.grad.as_slice()[0] - 3.0).abs() < 1e-4);
        assert!(result.final_loss.is_some());
        assert!(metrics.snapshot().batches_completed > 0);
    }

    #[tokio::test]
    async fn single_epoch_with_two_equal_workers_subtracts_the_shared_gradient() {
        let registry = WorkerRegistry::new(2);
        registry
            .register(NodeId::new("a", 1), Arc::new(ConstantTargetWorker { target: -1.0 }))
            .await
            .unwrap();
        registry
            .register(NodeId::new("b", 2), Arc::new(ConstantTargetWorker { target: -1.0 }))
            .await
            .unwrap();

        let data = dataset(10);
        let stopping: StoppingCriterion = Arc::new(|_| false);
        let metrics = Metrics::new();

        let result = backward(&registry, &data, 1, 5, Vector::new(vec![0.0]).unwrap(), stopping, &metrics)
            .await
            .unwrap();

        assert!((result.grad.as_slice()[0] - (-1.0)).abs() < 1e-6);
    }
}
