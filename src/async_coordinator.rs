use std::sync::Arc;

use futures::future::try_join_all;
use log::info;
use tokio::sync::oneshot;

use crate::{
    dataset::Dataset,
    error::{CoordinatorError, Result},
    metrics::{Metrics, MetricsSnapshot},
    model::Model,
    monitor,
    registry::WorkerRegistry,
    state::{AsyncConfig, CoordinatorCell, GradState},
};

/// The async training coordinator (C5): owns the shared [`CoordinatorCell`]
/// and the collaborators the loss monitor needs, wrapped so the whole thing
/// is a cheap `Arc`-bump to clone into the spawned monitor task.
///
/// `metrics` is shared with the `ClusterCore` it was built alongside, so a
/// caller can read update counts off either the `Master` or this handle.
#[derive(Clone)]
pub struct AsyncCoordinator {
    registry: Arc<WorkerRegistry>,
    cell: Arc<CoordinatorCell>,
    dataset: Arc<Dataset>,
    model: Arc<dyn Model>,
    metrics: Arc<Metrics>,
}

impl AsyncCoordinator {
    pub fn new(registry: Arc<WorkerRegistry>, dataset: Arc<Dataset>, model: Arc<dyn Model>, metrics: Arc<Metrics>) -> Self {
        Self { registry, cell: Arc::new(CoordinatorCell::new()), dataset, model, metrics }
    }

    pub(crate) fn cell(&self) -> &CoordinatorCell {
        &self.cell
    }

    pub(crate) fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub(crate) fn model(&self) -> &dyn Model {
        self.model.as_ref()
    }

    pub(crate) fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    /// Whether an async run is currently active.
    pub fn is_running(&self) -> bool {
        self.cell.is_running()
    }

    /// A point-in-time read of this run's update counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Starts an async run once the cluster is ready, returning a completion
    /// channel resolved when the run terminates (either by `maxSteps` or the
    /// stopping criterion firing inside the monitor).
    ///
    /// Fails with `AlreadyRunning` if a run is already active.
    pub async fn run(&self, config: AsyncConfig) -> Result<oneshot::Receiver<GradState>> {
        self.registry.with_cluster_ready(|| self.start(config)).await
    }

    async fn start(&self, config: AsyncConfig) -> Result<oneshot::Receiver<GradState>> {
        let mut workers = self.registry.snapshot();
        workers.sort_by(|a, b| (&a.0.host, a.0.port).cmp(&(&b.0.host, b.0.port)));

        let assignments = (config.split_strategy)(&self.dataset, workers.len());
        let rx = self.cell.start_run(config.clone())?;

        let calls = workers.into_iter().zip(assignments).map(|((_, stub), range)| {
            let weights = config.initial_weights.clone();
            let batch_size = config.batch_size;
            async move { stub.init_async(weights, range, batch_size).await }
        });

        if let Err(e) = try_join_all(calls).await {
            // Init fan-out failed before any gradient flowed: there's nothing for the
            // monitor to watch, so terminate the run we just opened instead of leaving
            // it stranded in a state no worker was actually told about.
            self.cell.finish_run();
            return Err(CoordinatorError::WorkerRpcFailure(e.to_string()));
        }

        info!(target: "master.async", workers = self.registry.len(); "async run started");

        let coordinator = self.clone();
        tokio::spawn(async move { monitor::run(coordinator).await });

        Ok(rx)
    }

    /// Terminates the active run, if any, and broadcasts `stopAsync` to every
    /// registered worker. Idempotent: a second call is a no-op.
    pub async fn end_computation(&self) {
        if self.cell.finish_run().is_none() {
            return;
        }

        info!(target: "master.async", "async run terminated, broadcasting stopAsync");

        for (node, stub) in self.registry.snapshot() {
            tokio::spawn(async move {
                if let Err(e) = stub.stop_async().await {
                    log::warn!(peer = node.to_string(); "stopAsync failed: {e}");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{ops::Range, time::Instant};

    use async_trait::async_trait;

    use super::*;
    use crate::{
        dataset::Sample,
        model::LinearModel,
        node::NodeId,
        vector::Vector,
        worker::{GradientReply, WorkerRpc},
    };

    struct RecordingWorker;

    #[async_trait]
    impl WorkerRpc for RecordingWorker {
        async fn forward(&self, range: Range<usize>, weights: Vector) -> Result<Vec<f64>> {
            Ok(range.map(|_| weights.as_slice()[0]).collect())
        }

        async fn gradient(&self, weights: Vector, _range: Range<usize>) -> Result<GradientReply> {
            let now = Instant::now();
            Ok(GradientReply { grad: weights, started_at: now, terminated_at: now })
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

    fn config(weights: Vector, max_steps: u64) -> AsyncConfig {
        AsyncConfig {
            initial_weights: weights,
            max_steps,
            stopping: Arc::new(|_| false),
            batch_size: 1,
            split_strategy: Arc::new(|_, workers| vec![0..0; workers]),
            check_every: 1,
            leak_coef: 1.0,
        }
    }

    #[tokio::test]
    async fn run_rejects_a_second_concurrent_run() {
        let registry = Arc::new(WorkerRegistry::new(1));
        registry.register(NodeId::new("a", 1), Arc::new(RecordingWorker)).await.unwrap();

        let coordinator = AsyncCoordinator::new(
            registry,
            Arc::new(Dataset::new(vec![])),
            Arc::new(LinearModel),
            Arc::new(Metrics::new()),
        );

        let _rx = coordinator.run(config(Vector::zeros(1), 10)).await.unwrap();
        let err = coordinator.run(config(Vector::zeros(1), 10)).await;
        assert!(matches!(err, Err(CoordinatorError::AlreadyRunning)));
    }

    #[tokio::test]
    async fn end_computation_is_idempotent_and_resolves_the_promise() {
        let registry = Arc::new(WorkerRegistry::new(1));
        registry.register(NodeId::new("a", 1), Arc::new(RecordingWorker)).await.unwrap();

        let coordinator = AsyncCoordinator::new(
            registry,
            Arc::new(Dataset::new(vec![])),
            Arc::new(LinearModel),
            Arc::new(Metrics::new()),
        );
        let rx = coordinator.run(config(Vector::zeros(1), 10)).await.unwrap();

        coordinator.end_computation().await;
        coordinator.end_computation().await;

        let final_state = rx.await.unwrap();
        assert!(!final_state.is_active());
    }
}
