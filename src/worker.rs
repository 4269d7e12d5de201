use std::{ops::Range, time::Instant};

use async_trait::async_trait;

use crate::{error::Result, node::NodeId, vector::Vector};

/// The reply to a `gradient` RPC.
#[derive(Debug, Clone)]
pub struct GradientReply {
    pub grad: Vector,
    pub started_at: Instant,
    pub terminated_at: Instant,
}

/// An opaque handle to a remote worker process.
///
/// This is the contract the coordinator core depends on; the worker-side
/// implementation of these RPCs is out of scope for this crate. Modeled as
/// an `async_trait` (rather than `trait_variant`) so that heterogeneous
/// worker stubs can be stored behind `Arc<dyn WorkerRpc>` in the registry,
/// mirroring how `service::Server` is boxed in the parameter-server builder.
#[async_trait]
pub trait WorkerRpc: Send + Sync {
    /// Computes predictions for `range` using `weights`.
    async fn forward(&self, range: Range<usize>, weights: Vector) -> Result<Vec<f64>>;

    /// Computes a gradient over `range` using `weights`.
    async fn gradient(&self, weights: Vector, range: Range<usize>) -> Result<GradientReply>;

    /// Seeds a worker for an async run: initial weights, its index assignment, and the batch size.
    async fn init_async(&self, weights: Vector, assignment: Range<usize>, batch_size: usize) -> Result<()>;

    /// Tells a worker to stop sending further gradient updates.
    async fn stop_async(&self) -> Result<()>;

    /// Informs a worker of a newly joined peer.
    async fn register_slave(&self, node: NodeId) -> Result<()>;

    /// Informs a worker that a peer has left the cluster.
    async fn unregister_slave(&self, node: NodeId) -> Result<()>;
}

/// A shared handle to a `WorkerRpc` implementation.
pub type WorkerHandle = std::sync::Arc<dyn WorkerRpc>;
