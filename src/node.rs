use std::fmt;

use serde::{Deserialize, Serialize};

/// A `{host, port}` pair identifying a worker process. Equality is structural,
/// which makes it usable directly as the `WorkerRegistry` key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    pub host: String,
    pub port: u16,
}

impl NodeId {
    /// Creates a new `NodeId`.
    ///
    /// # Arguments
    /// * `host` - The worker's host name or address.
    /// * `port` - The worker's listening port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
