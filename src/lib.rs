//! Coordinator core of a parameter-server-style distributed trainer for a
//! linear model trained by SGD. Partitions a dataset across worker
//! processes, orchestrates forward/backward passes, and produces a final
//! weight vector, in both a synchronous epoch-batch flavor and an
//! asynchronous lock-free flavor with a concurrent convergence monitor.
//!
//! Worker-side RPC implementations, the model kernel, vector algebra, and
//! dataset loading all live outside this crate; it depends on them only
//! through the [`worker::WorkerRpc`], [`model::Model`], and [`dataset`]
//! contracts.

pub mod async_coordinator;
pub mod config;
pub mod dataset;
pub mod error;
pub mod forward;
pub mod loss;
pub mod metrics;
mod monitor;
pub mod model;
pub mod node;
pub mod partition;
pub mod registry;
pub mod rpc;
pub mod state;
pub mod sync_trainer;
pub mod vector;
pub mod worker;

use error::Result;
use rpc::{ClusterCore, Master};
use state::{AsyncConfig, GradState, StoppingCriterion};
use vector::Vector;

/// The `fit` entry point for the synchronous strategy: runs `backward` to
/// completion and surfaces one terminal result, `Ok(weights)` or `Err(cause)`.
pub async fn fit_sync(
    cluster: &ClusterCore,
    dataset: &dataset::Dataset,
    epochs: usize,
    batch_size: usize,
    w0: Vector,
    stopping: StoppingCriterion,
) -> Result<Vec<f64>> {
    let state =
        sync_trainer::backward(&cluster.registry, dataset, epochs, batch_size, w0, stopping, &cluster.metrics).await?;
    Ok(state.grad.as_slice().to_vec())
}

/// The `fit` entry point for the asynchronous strategy: starts the run,
/// waits for the loss monitor (or `updateGrad` hitting `maxSteps`) to
/// terminate it, and returns the final `GradState`.
pub async fn fit_async(master: &Master, config: AsyncConfig) -> Result<GradState> {
    let coordinator = match master {
        Master::Async(_, coordinator) => coordinator,
        Master::Sync(_) => return Err(error::CoordinatorError::UnsupportedOnSync),
    };

    let rx = coordinator.run(config).await?;
    // The sender side only ever lives inside `CoordinatorCell::finish_run`, which
    // always fires it before dropping; a recv error here means that invariant broke.
    Ok(rx.await.expect("completion sender dropped without resolving"))
}

pub use node::NodeId;
pub use worker::{WorkerHandle, WorkerRpc};
