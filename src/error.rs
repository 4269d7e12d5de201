use std::{
    error::Error,
    fmt::{self, Display},
};

/// The specific result type used throughout the coordinator core.
pub type Result<T> = std::result::Result<T, CoordinatorError>;

/// Errors surfaced by the coordinator core, per the error handling design in the spec.
#[derive(Debug)]
pub enum CoordinatorError {
    /// More than `expected_nodes` joins were attempted; the caller's `register` fails loudly.
    ClusterOverflow { expected: usize },
    /// `run()` was invoked while an async run is already active.
    AlreadyRunning,
    /// `updateGrad` reached a master running the synchronous training loop.
    UnsupportedOnSync,
    /// An underlying worker RPC failed.
    WorkerRpcFailure(String),
    /// A vector was constructed with a NaN component.
    InvalidVector,
}

impl Display for CoordinatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClusterOverflow { expected } => {
                write!(f, "registry is full, expected at most {expected} nodes")
            }
            Self::AlreadyRunning => f.write_str("an async run is already active"),
            Self::UnsupportedOnSync => f.write_str("updateGrad is not supported on a sync master"),
            Self::WorkerRpcFailure(msg) => write!(f, "worker rpc failed: {msg}"),
            Self::InvalidVector => f.write_str("vector construction saw a NaN component"),
        }
    }
}

impl Error for CoordinatorError {}

impl From<std::io::Error> for CoordinatorError {
    fn from(value: std::io::Error) -> Self {
        Self::WorkerRpcFailure(value.to_string())
    }
}
