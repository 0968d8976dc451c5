// Pipeline orchestration on top of a dataflow engine

pub mod dataflow;
pub mod task;

pub use dataflow::DataflowDagRunner;
pub use task::NodeTask;

use crate::error::Result;
use crate::pipeline::Pipeline;
use crate::types::{NodeId, RunId};

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// `None` for export-only runs
    pub run_id: Option<RunId>,
    /// Job name of the orchestrating engine job
    pub job_name: String,
    /// Nodes in the order they completed
    pub completed: Vec<NodeId>,
    /// Pipeline args were exported and nothing was executed
    pub exported: bool,
}

/// Executes every node of a pipeline exactly once, in dependency order
#[async_trait::async_trait]
pub trait DagRunner: Send + Sync {
    async fn run(&self, pipeline: &mut Pipeline) -> Result<RunReport>;
}
