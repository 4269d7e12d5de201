use std::{num::NonZeroUsize, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    dataset::Dataset,
    model::Model,
    rpc::{ClusterCore, Master},
};

/// Selects which training strategy a `Master` is built for, and its tunables.
///
/// Mirrors the teacher's `TrainerSpec`, but the two variants here pick
/// between the sync and async coordinators rather than between two
/// synchronizer implementations of the same loop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainerSpec {
    Sync { epochs: usize, batch_size: usize },
    Async { max_steps: u64, batch_size: usize, check_every: u64, leak_coef: f64 },
}

/// The specification for building a coordinator.
///
/// Deliberately doesn't carry the split strategy or stopping criterion: the
/// spec treats both as pure callback values external to this crate, so they
/// aren't representable as plain data and are supplied directly to
/// `run`/`backward` instead of threaded through here.
#[derive(Debug, Serialize, Deserialize)]
pub struct CoordinatorSpec {
    pub expected_nodes: NonZeroUsize,
    pub trainer: TrainerSpec,
}

impl CoordinatorSpec {
    pub fn new(expected_nodes: NonZeroUsize, trainer: TrainerSpec) -> Self {
        Self { expected_nodes, trainer }
    }
}

/// Builds a `Master` from a `CoordinatorSpec`.
#[derive(Default)]
pub struct CoordinatorBuilder {}

impl CoordinatorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves `spec` into a ready-to-serve `Master`.
    ///
    /// `dataset` and `model` are only retained by the async variant, which
    /// needs them for the loss monitor; the sync loop takes its dataset as
    /// an argument to `backward` directly.
    pub fn build(&self, spec: CoordinatorSpec, dataset: Dataset, model: Arc<dyn Model>) -> Master {
        let cluster = ClusterCore::new(spec.expected_nodes.get());

        match spec.trainer {
            TrainerSpec::Sync { .. } => Master::Sync(cluster),
            TrainerSpec::Async { .. } => {
                let coordinator = crate::async_coordinator::AsyncCoordinator::new(
                    Arc::clone(&cluster.registry),
                    Arc::new(dataset),
                    model,
                    Arc::clone(&cluster.metrics),
                );
                Master::Async(cluster, coordinator)
            }
        }
    }
}
