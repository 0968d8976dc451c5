use crate::channel::Channel;
use crate::error::{PipelineError, Result};
use crate::types::{MetadataConnectionConfig, NodeId, PipelineInfo};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Everything a launcher gets to know about the run it executes in
#[derive(Debug, Clone)]
pub struct LaunchContext {
    pub pipeline_info: PipelineInfo,
    pub node_id: NodeId,
    pub enable_cache: bool,
    pub metadata_connection: MetadataConnectionConfig,
    /// Engine args for any job the node submits, including a derived `--job_name`
    pub engine_args: Vec<String>,
}

/// Executes a node's business logic.
///
/// The engine may invoke a node more than once (speculative or retried
/// execution). Implementations must tolerate that; the orchestrator does not
/// deduplicate invocations.
#[async_trait::async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self, ctx: &LaunchContext) -> anyhow::Result<()>;
}

/// Launcher backed by a plain closure
pub struct FnLauncher<F>(F);

impl<F> FnLauncher<F>
where
    F: Fn(&LaunchContext) -> anyhow::Result<()> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait::async_trait]
impl<F> Launcher for FnLauncher<F>
where
    F: Fn(&LaunchContext) -> anyhow::Result<()> + Send + Sync,
{
    async fn launch(&self, ctx: &LaunchContext) -> anyhow::Result<()> {
        (self.0)(ctx)
    }
}

/// A unit of work in a pipeline
pub struct Node {
    id: NodeId,
    inputs: BTreeMap<String, Arc<Channel>>,
    outputs: BTreeMap<String, Arc<Channel>>,
    launcher: Arc<dyn Launcher>,
}

impl Node {
    pub fn builder(id: impl Into<NodeId>, launcher: Arc<dyn Launcher>) -> NodeBuilder {
        NodeBuilder {
            id: id.into(),
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            launcher,
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn inputs(&self) -> &BTreeMap<String, Arc<Channel>> {
        &self.inputs
    }

    pub fn outputs(&self) -> &BTreeMap<String, Arc<Channel>> {
        &self.outputs
    }

    pub fn input(&self, name: &str) -> Option<&Arc<Channel>> {
        self.inputs.get(name)
    }

    pub fn output(&self, name: &str) -> Option<&Arc<Channel>> {
        self.outputs.get(name)
    }

    pub fn launcher(&self) -> &Arc<dyn Launcher> {
        &self.launcher
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("inputs", &self.inputs.keys().collect::<Vec<_>>())
            .field("outputs", &self.outputs.keys().collect::<Vec<_>>())
            .finish()
    }
}

pub struct NodeBuilder {
    id: NodeId,
    inputs: BTreeMap<String, Arc<Channel>>,
    outputs: BTreeMap<String, Arc<Channel>>,
    launcher: Arc<dyn Launcher>,
}

impl NodeBuilder {
    /// Consume `channel` under `name`
    pub fn input(mut self, name: impl Into<String>, channel: &Arc<Channel>) -> Self {
        self.inputs.insert(name.into(), Arc::clone(channel));
        self
    }

    /// Produce into an existing channel; claimed when the node is built
    pub fn output(mut self, name: impl Into<String>, channel: &Arc<Channel>) -> Self {
        self.outputs.insert(name.into(), Arc::clone(channel));
        self
    }

    /// Produce into a fresh channel of the given type
    pub fn produces(self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        let channel = Channel::new(type_name);
        self.output(name, &channel)
    }

    pub fn build(self) -> Result<Arc<Node>> {
        if self.id.0.is_empty() {
            return Err(PipelineError::Validation(
                "node identity must not be empty".to_string(),
            ));
        }

        for channel in self.outputs.values() {
            channel.claim(&self.id)?;
        }

        Ok(Arc::new(Node {
            id: self.id,
            inputs: self.inputs,
            outputs: self.outputs,
            launcher: self.launcher,
        }))
    }
}
