use std::sync::Arc;

use futures::future::try_join_all;

use crate::{
    error::{CoordinatorError, Result},
    node::NodeId,
    partition::contiguous_pieces,
    vector::Vector,
    worker::WorkerHandle,
};

/// Scatters a `forward` RPC to every worker and reassembles the predictions
/// in dispatch order.
///
/// Dispatch order is the workers sorted by `NodeId`, so repeated calls with
/// the same cluster membership are reproducible even though the registry's
/// snapshot has no inherent order.
///
/// # Returns
/// Fails the whole call (no partial results) if any worker RPC fails.
pub async fn forward(workers: &[(NodeId, WorkerHandle)], dataset_len: usize, weights: Vector) -> Result<Vec<f64>> {
    let mut ordered = workers.to_vec();
    ordered.sort_by(|a, b| (&a.0.host, a.0.port).cmp(&(&b.0.host, b.0.port)));

    let pieces = contiguous_pieces(dataset_len, ordered.len());

    let calls = ordered
        .into_iter()
        .zip(pieces)
        .map(|((_, stub), range)| {
            let stub: WorkerHandle = Arc::clone(&stub);
            let weights = weights.clone();
            async move { stub.forward(range, weights).await }
        });

    let replies = try_join_all(calls)
        .await
        .map_err(|e| CoordinatorError::WorkerRpcFailure(e.to_string()))?;

    Ok(replies.into_iter().flatten().collect())
}
