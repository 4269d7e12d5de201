use std::{env, error::Error, num::NonZeroUsize, ops::Range, sync::Arc};

use async_trait::async_trait;
use log::{info, warn};
use sgd_coordinator::{
    config::{CoordinatorBuilder, CoordinatorSpec, TrainerSpec},
    dataset::Dataset,
    error::Result,
    fit_sync,
    model::LinearModel,
    node::NodeId,
    state::StoppingCriterion,
    vector::Vector,
    worker::{GradientReply, WorkerRpc},
};
use tokio::{net::TcpListener, signal};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: &str = "7878";
const DEFAULT_EXPECTED_NODES: &str = "2";

/// Placeholder worker handle bound to an accepted TCP connection.
///
/// The wire codec that would turn `request`/`reply` frames on `stream` into
/// `WorkerRpc` calls is a collaborator external to this crate (the spec
/// treats vector encoding as opaque); this stub only proves out the
/// accept -> register wiring and fails loudly if actually dispatched to.
struct NetworkWorker {
    node: NodeId,
}

#[async_trait]
impl WorkerRpc for NetworkWorker {
    async fn forward(&self, _range: Range<usize>, _weights: Vector) -> Result<Vec<f64>> {
        Err(unwired(&self.node))
    }

    async fn gradient(&self, _weights: Vector, _range: Range<usize>) -> Result<GradientReply> {
        Err(unwired(&self.node))
    }

    async fn init_async(&self, _weights: Vector, _assignment: Range<usize>, _batch_size: usize) -> Result<()> {
        Err(unwired(&self.node))
    }

    async fn stop_async(&self) -> Result<()> {
        Err(unwired(&self.node))
    }

    async fn register_slave(&self, _node: NodeId) -> Result<()> {
        Err(unwired(&self.node))
    }

    async fn unregister_slave(&self, _node: NodeId) -> Result<()> {
        Err(unwired(&self.node))
    }
}

fn unwired(node: &NodeId) -> sgd_coordinator::error::CoordinatorError {
    sgd_coordinator::error::CoordinatorError::WorkerRpcFailure(format!("{node}: no wire codec installed"))
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn Error>> {
    env_logger::init();

    let host = env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
    let port = env::var("PORT").unwrap_or_else(|_| DEFAULT_PORT.to_string());
    let expected_nodes: NonZeroUsize = env::var("EXPECTED_NODES")
        .unwrap_or_else(|_| DEFAULT_EXPECTED_NODES.to_string())
        .parse::<usize>()
        .ok()
        .and_then(NonZeroUsize::new)
        .unwrap_or(NonZeroUsize::new(1).unwrap());

    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = addr.as_str(), expected_nodes = expected_nodes.get(); "listening for workers");

    let spec = CoordinatorSpec::new(expected_nodes, TrainerSpec::Sync { epochs: 10, batch_size: 32 });
    let master = CoordinatorBuilder::new().build(spec, Dataset::new(vec![]), Arc::new(LinearModel));

    for i in 0..expected_nodes.get() {
        let (_stream, peer) = listener.accept().await?;
        let node = NodeId::new(peer.ip().to_string(), peer.port());
        info!(index = i, peer = node.to_string(); "worker connected");

        if let Err(e) = master.register_slave(node.clone(), Arc::new(NetworkWorker { node })).await {
            warn!("registration failed: {e}");
        }
    }

    let dataset = Dataset::new(vec![]);
    let stopping: StoppingCriterion = Arc::new(|_: &[f64]| false);

    tokio::select! {
        result = fit_sync(master.cluster(), &dataset, 10, 32, Vector::zeros(0), stopping) => {
            match result {
                Ok(weights) => info!(len = weights.len(); "training finished"),
                Err(e) => warn!("training failed: {e}"),
            }
        }
        _ = signal::ctrl_c() => {
            info!("received shutdown signal");
        }
    }

    Ok(())
}
