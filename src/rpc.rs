use std::sync::Arc;

use log::debug;

use crate::{
    async_coordinator::AsyncCoordinator,
    error::{CoordinatorError, Result},
    metrics::{Metrics, MetricsSnapshot},
    node::NodeId,
    registry::WorkerRegistry,
    state::UpdateOutcome,
    vector::Vector,
    worker::WorkerHandle,
};

/// Acknowledgement returned by the RPC surface. Carries no data: the spec
/// treats every master-side RPC as a fire-and-forget ack or a hard failure.
pub struct Ack;

/// Cluster membership surface shared by both training strategies:
/// `registerSlave` and `unregisterSlave` only ever touch the registry, never
/// the training state. Also the home of the shared `Metrics` counters, since
/// both strategies report through the same observability surface.
pub struct ClusterCore {
    pub registry: Arc<WorkerRegistry>,
    pub metrics: Arc<Metrics>,
}

impl ClusterCore {
    pub fn new(expected_nodes: usize) -> Self {
        Self { registry: Arc::new(WorkerRegistry::new(expected_nodes)), metrics: Arc::new(Metrics::new()) }
    }

    pub async fn register_slave(&self, node: NodeId, stub: WorkerHandle) -> Result<Ack> {
        self.registry.register(node, stub).await?;
        Ok(Ack)
    }

    pub async fn unregister_slave(&self, node: NodeId) -> Result<Ack> {
        self.registry.unregister(node).await?;
        Ok(Ack)
    }
}

/// The master-side RPC surface (C7), dispatching on which training strategy
/// this process was built with. No inheritance between the two: they share
/// `ClusterCore` and differ only in how `updateGrad` behaves.
pub enum Master {
    Sync(ClusterCore),
    Async(ClusterCore, AsyncCoordinator),
}

impl Master {
    pub fn cluster(&self) -> &ClusterCore {
        match self {
            Master::Sync(cluster) => cluster,
            Master::Async(cluster, _) => cluster,
        }
    }

    pub async fn register_slave(&self, node: NodeId, stub: WorkerHandle) -> Result<Ack> {
        self.cluster().register_slave(node, stub).await
    }

    pub async fn unregister_slave(&self, node: NodeId) -> Result<Ack> {
        self.cluster().unregister_slave(node).await
    }

    /// A point-in-time read of this master's update/batch counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.cluster().metrics.snapshot()
    }

    /// The `updateGrad` handler. A sync master always rejects it; an async
    /// master applies it to the shared cell, acking late stragglers without
    /// error and terminating the run if this update reached `maxSteps`.
    pub async fn update_grad(&self, delta: Vector) -> Result<Ack> {
        let (cluster, coordinator) = match self {
            Master::Sync(_) => return Err(CoordinatorError::UnsupportedOnSync),
            Master::Async(cluster, coordinator) => (cluster, coordinator),
        };

        match coordinator.cell().apply_update(&delta) {
            UpdateOutcome::Applied { updates, reached_max } => {
                cluster.metrics.record_update();
                if reached_max {
                    coordinator.end_computation().await;
                }
                debug!(updates = updates, reached_max = reached_max; "updateGrad applied");
                Ok(Ack)
            }
            UpdateOutcome::Stale => {
                debug!("updateGrad arrived after termination, acking without applying it");
                Ok(Ack)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{ops::Range, sync::Arc, time::Instant};

    use async_trait::async_trait;

    use super::*;
    use crate::{
        dataset::Dataset,
        model::LinearModel,
        state::AsyncConfig,
        worker::{GradientReply, WorkerRpc},
    };

    struct NoopWorker;

    #[async_trait]
    impl WorkerRpc for NoopWorker {
        async fn forward(&self, _range: Range<usize>, _weights: Vector) -> Result<Vec<f64>> {
            Ok(vec![])
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

    #[tokio::test]
    async fn sync_master_rejects_update_grad() {
        let master = Master::Sync(ClusterCore::new(1));
        let err = master.update_grad(Vector::zeros(1)).await;
        assert!(matches!(err, Err(CoordinatorError::UnsupportedOnSync)));
    }

    #[tokio::test]
    async fn async_master_acks_a_late_straggler_without_error() {
        let cluster = ClusterCore::new(1);
        let registry = Arc::clone(&cluster.registry);
        registry.register(NodeId::new("a", 1), Arc::new(NoopWorker)).await.unwrap();

        let coordinator = AsyncCoordinator::new(
            Arc::clone(&registry),
            Arc::new(Dataset::new(vec![])),
            Arc::new(LinearModel),
            Arc::clone(&cluster.metrics),
        );

        let config = AsyncConfig {
            initial_weights: Vector::zeros(1),
            max_steps: 5,
            stopping: Arc::new(|_| false),
            batch_size: 1,
            split_strategy: Arc::new(|_, workers| vec![0..0; workers]),
            check_every: 1_000_000,
            leak_coef: 1.0,
        };
        let _rx = coordinator.run(config).await.unwrap();
        coordinator.end_computation().await;

        let master = Master::Async(ClusterCore { registry, metrics: Arc::clone(&cluster.metrics) }, coordinator);
        assert!(master.update_grad(Vector::new(vec![1.0]).unwrap()).await.is_ok());
    }

    #[tokio::test]
    async fn async_master_terminates_the_run_on_reaching_max_steps() {
        let cluster = ClusterCore::new(1);
        let registry = Arc::clone(&cluster.registry);
        registry.register(NodeId::new("a", 1), Arc::new(NoopWorker)).await.unwrap();

        let coordinator = AsyncCoordinator::new(
            Arc::clone(&registry),
            Arc::new(Dataset::new(vec![])),
            Arc::new(LinearModel),
            Arc::clone(&cluster.metrics),
        );

        let config = AsyncConfig {
            initial_weights: Vector::zeros(1),
            max_steps: 1,
            stopping: Arc::new(|_| false),
            batch_size: 1,
            split_strategy: Arc::new(|_, workers| vec![0..0; workers]),
            check_every: 1_000_000,
            leak_coef: 1.0,
        };
        let rx = coordinator.run(config).await.unwrap();

        let master = Master::Async(ClusterCore { registry, metrics: Arc::clone(&cluster.metrics) }, coordinator);
        master.update_grad(Vector::new(vec![1.0]).unwrap()).await.unwrap();

        let final_state = rx.await.unwrap();
        assert!(!final_state.is_active());
        assert_eq!(master.metrics_snapshot().updates_applied, 1);
    }
}
