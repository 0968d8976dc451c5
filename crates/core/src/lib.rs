// Core types and functionality for Pipewright, a DAG orchestrator for dataflow engines

pub mod channel;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod naming;
pub mod node;
pub mod orchestration;
pub mod pipeline;
pub mod types;

pub use channel::Channel;
pub use config::{EngineConfig, RunConfig};
pub use error::{PipelineError, Result};
pub use node::{FnLauncher, LaunchContext, Launcher, Node, NodeBuilder};
pub use orchestration::{DagRunner, DataflowDagRunner, RunReport};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use types::*;
