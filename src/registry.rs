use std::{collections::HashMap, future::Future, sync::Arc, sync::atomic::{AtomicBool, Ordering}};

use log::warn;
use parking_lot::RwLock;
use tokio::sync::Notify;

use crate::{
    error::{CoordinatorError, Result},
    node::NodeId,
    worker::WorkerHandle,
};

/// A single-fire synchronization primitive gating training on cluster quorum.
///
/// Transitions `Waiting -> Ready` exactly once; racing completions past the
/// threshold don't re-fire it.
pub struct ReadinessLatch {
    ready: AtomicBool,
    notify: Notify,
}

impl ReadinessLatch {
    fn new() -> Self {
        Self {
            ready: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Edge-triggers the latch. A no-op if it was already `Ready`.
    fn complete(&self) {
        if !self.ready.swap(true, Ordering::AcqRel) {
            self.notify.notify_waiters();
        }
    }

    /// Returns immediately if the latch is `Ready`, otherwise suspends until it is.
    pub async fn wait(&self) {
        loop {
            if self.ready.load(Ordering::Acquire) {
                return;
            }

            let notified = self.notify.notified();

            if self.ready.load(Ordering::Acquire) {
                return;
            }

            notified.await;
        }
    }

    /// Returns whether the latch has already fired.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}

/// Concurrent-safe mapping `Node -> Worker Stub`, plus the readiness latch it drives.
///
/// Invariant: size never exceeds `expected_nodes`.
pub struct WorkerRegistry {
    expected_nodes: usize,
    workers: RwLock<HashMap<NodeId, WorkerHandle>>,
    latch: Arc<ReadinessLatch>,
}

impl WorkerRegistry {
    /// Creates a new, empty `WorkerRegistry` expecting `expected_nodes` workers.
    pub fn new(expected_nodes: usize) -> Self {
        Self {
            expected_nodes,
            workers: RwLock::new(HashMap::new()),
            latch: Arc::new(ReadinessLatch::new()),
        }
    }

    /// The cluster readiness latch, shared so callers can wait on it independently.
    pub fn latch(&self) -> Arc<ReadinessLatch> {
        Arc::clone(&self.latch)
    }

    /// Number of currently registered workers.
    pub fn len(&self) -> usize {
        self.workers.read().len()
    }

    /// Whether the registry currently holds no workers.
    pub fn is_empty(&self) -> bool {
        self.workers.read().is_empty()
    }

    /// A point-in-time snapshot of `(node, stub)` pairs, in no particular order.
    pub fn snapshot(&self) -> Vec<(NodeId, WorkerHandle)> {
        self.workers
            .read()
            .iter()
            .map(|(n, w)| (n.clone(), Arc::clone(w)))
            .collect()
    }

    /// Registers a new worker.
    ///
    /// Gossips the new node to every previously-known worker, and every
    /// previously-known node to the new worker, full-mesh style. Gossip is
    /// fire-and-forget: the ack below does not wait on it.
    ///
    /// # Returns
    /// `ClusterOverflow` if the registry already holds `expected_nodes` workers.
    pub async fn register(&self, node: NodeId, stub: WorkerHandle) -> Result<()> {
        let peers;
        let became_ready;

        {
            let mut workers = self.workers.write();

            if workers.len() >= self.expected_nodes {
                return Err(CoordinatorError::ClusterOverflow {
                    expected: self.expected_nodes,
                });
            }

            peers = workers
                .iter()
                .map(|(n, w)| (n.clone(), Arc::clone(w)))
                .collect::<Vec<_>>();

            workers.insert(node.clone(), Arc::clone(&stub));
            became_ready = workers.len() == self.expected_nodes;
        }

        for (peer_node, peer_stub) in peers.clone() {
            let new_node = node.clone();
            tokio::spawn(async move {
                if let Err(e) = peer_stub.register_slave(new_node).await {
                    warn!(peer = peer_node.to_string(); "gossip of new node failed: {e}");
                }
            });
        }

        if !peers.is_empty() {
            let joining = Arc::clone(&stub);
            let joining_node = node.clone();
            tokio::spawn(async move {
                for (peer_node, _) in peers {
                    if let Err(e) = joining.register_slave(peer_node.clone()).await {
                        warn!(joining = joining_node.to_string(); "gossip of peer {peer_node} failed: {e}");
                    }
                }
            });
        }

        if became_ready {
            self.latch.complete();
        }

        Ok(())
    }

    /// Removes a worker, if present, and gossips the removal to the remaining ones.
    ///
    /// Idempotent: unregistering an unknown node is a no-op ack.
    pub async fn unregister(&self, node: NodeId) -> Result<()> {
        let remaining;

        {
            let mut workers = self.workers.write();
            if workers.remove(&node).is_none() {
                return Ok(());
            }
            remaining = workers.values().cloned().collect::<Vec<_>>();
        }

        for peer in remaining {
            let node = node.clone();
            tokio::spawn(async move {
                if let Err(e) = peer.unregister_slave(node).await {
                    warn!("gossip of unregister failed: {e}");
                }
            });
        }

        Ok(())
    }

    /// Defers `f` until the readiness latch has fired, then runs it.
    pub async fn with_cluster_ready<F, Fut, T>(&self, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.latch.wait().await;
        f().await
    }
}
