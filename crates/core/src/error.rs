//! Error types for pipeline construction and execution.

use crate::types::NodeId;
use std::path::PathBuf;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors raised while building or running a pipeline
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Two distinct nodes share an identity
    #[error("duplicate node identity: '{node_id}'")]
    DuplicateNodeIdentity { node_id: NodeId },

    /// The derived graph is not acyclic
    #[error("pipeline contains a cycle through node '{node_id}' (cycle: {cycle:?})")]
    CycleDetected { node_id: NodeId, cycle: Vec<NodeId> },

    /// A channel was declared as output of more than one node
    #[error("channel of type '{type_name}' is already produced by '{producer}', cannot be claimed by '{claimant}'")]
    ChannelAlreadyProduced {
        type_name: String,
        producer: NodeId,
        claimant: NodeId,
    },

    #[error("validation error: {0}")]
    Validation(String),

    /// An upstream node had no completion signal when its dependent was scheduled.
    /// Only reachable if the node order is not topological.
    #[error("node '{node_id}' scheduled before its upstream node '{upstream}'")]
    OrderingInvariantViolation { node_id: NodeId, upstream: NodeId },

    /// A completion signal carried elements
    #[error("node '{node_id}' received a completion signal with {elements} element(s); signals must be empty")]
    SignalContractViolation { node_id: NodeId, elements: usize },

    #[error("node '{node_id}' failed: {source}")]
    LaunchFailed {
        node_id: NodeId,
        #[source]
        source: anyhow::Error,
    },

    #[error("engine error: {0}")]
    Engine(String),

    #[error("failed to export pipeline args to {}: {source}", .path.display())]
    Export {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Node the error is attributed to, if any
    pub fn node_id(&self) -> Option<&NodeId> {
        match self {
            Self::DuplicateNodeIdentity { node_id }
            | Self::CycleDetected { node_id, .. }
            | Self::OrderingInvariantViolation { node_id, .. }
            | Self::SignalContractViolation { node_id, .. }
            | Self::LaunchFailed { node_id, .. } => Some(node_id),
            Self::ChannelAlreadyProduced { claimant, .. } => Some(claimant),
            Self::Validation(_) | Self::Engine(_) | Self::Export { .. } | Self::Config(_) => None,
        }
    }
}
