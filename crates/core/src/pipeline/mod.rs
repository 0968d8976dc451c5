// Logical pipeline: validated, topologically ordered nodes plus run metadata

pub mod dag;

pub use dag::PipelineDag;

use crate::error::{PipelineError, Result};
use crate::node::Node;
use crate::types::{MetadataConnectionConfig, NodeId, PipelineInfo, RunId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Longest accepted pipeline name; engines use it as a job name prefix
pub const MAX_PIPELINE_NAME_LENGTH: usize = 63;

/// Pipeline-wide args handed through to every node launcher
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdditionalPipelineArgs {
    /// Flags for jobs submitted by nodes themselves (not the orchestrator)
    #[serde(default)]
    pub engine_args: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl AdditionalPipelineArgs {
    pub fn is_empty(&self) -> bool {
        self.engine_args.is_empty() && self.extra.is_empty()
    }
}

/// Serializable pipeline arguments, as written by export-only runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineArgs {
    pub pipeline_name: String,
    pub pipeline_root: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_root: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_pipeline_args: Option<AdditionalPipelineArgs>,
}

/// A validated pipeline. The node order is fixed at construction.
pub struct Pipeline {
    pub info: PipelineInfo,
    pub enable_cache: bool,
    pub log_root: Option<String>,
    pub additional_pipeline_args: AdditionalPipelineArgs,
    pub metadata_connection: MetadataConnectionConfig,
    dag: PipelineDag,
    nodes: Vec<Arc<Node>>,
}

impl Pipeline {
    pub fn builder(pipeline_name: impl Into<String>, pipeline_root: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder {
            pipeline_name: pipeline_name.into(),
            pipeline_root: pipeline_root.into(),
            nodes: Vec::new(),
            enable_cache: false,
            log_root: None,
            additional_pipeline_args: AdditionalPipelineArgs::default(),
            metadata_connection: MetadataConnectionConfig::default(),
            logical_timestamp_ms: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.info.pipeline_name
    }

    /// Nodes in topological order
    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }

    pub fn node(&self, node_id: &NodeId) -> Option<&Arc<Node>> {
        self.nodes.iter().find(|n| n.id() == node_id)
    }

    pub fn upstream(&self, node_id: &NodeId) -> Result<Vec<Arc<Node>>> {
        self.dag.upstream(node_id)
    }

    pub fn downstream(&self, node_id: &NodeId) -> Result<Vec<Arc<Node>>> {
        self.dag.downstream(node_id)
    }

    pub fn dag(&self) -> &PipelineDag {
        &self.dag
    }

    pub fn run_id(&self) -> Option<&RunId> {
        self.info.run_id.as_ref()
    }

    pub(crate) fn assign_run_id(&mut self, run_id: RunId) {
        self.info.run_id = Some(run_id);
    }

    pub fn pipeline_args(&self) -> PipelineArgs {
        PipelineArgs {
            pipeline_name: self.info.pipeline_name.clone(),
            pipeline_root: self.info.pipeline_root.clone(),
            log_root: self.log_root.clone(),
            additional_pipeline_args: if self.additional_pipeline_args.is_empty() {
                None
            } else {
                Some(self.additional_pipeline_args.clone())
            },
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("info", &self.info)
            .field("enable_cache", &self.enable_cache)
            .field("nodes", &self.nodes.iter().map(|n| n.id()).collect::<Vec<_>>())
            .finish()
    }
}

pub struct PipelineBuilder {
    pipeline_name: String,
    pipeline_root: String,
    nodes: Vec<Arc<Node>>,
    enable_cache: bool,
    log_root: Option<String>,
    additional_pipeline_args: AdditionalPipelineArgs,
    metadata_connection: MetadataConnectionConfig,
    logical_timestamp_ms: i64,
}

impl PipelineBuilder {
    pub fn node(mut self, node: &Arc<Node>) -> Self {
        self.nodes.push(Arc::clone(node));
        self
    }

    pub fn nodes<'a>(mut self, nodes: impl IntoIterator<Item = &'a Arc<Node>>) -> Self {
        self.nodes.extend(nodes.into_iter().cloned());
        self
    }

    pub fn enable_cache(mut self, enable: bool) -> Self {
        self.enable_cache = enable;
        self
    }

    pub fn log_root(mut self, log_root: impl Into<String>) -> Self {
        self.log_root = Some(log_root.into());
        self
    }

    pub fn engine_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.additional_pipeline_args
            .engine_args
            .extend(args.into_iter().map(Into::into));
        self
    }

    pub fn additional_arg(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.additional_pipeline_args.extra.insert(key.into(), value);
        self
    }

    pub fn metadata_connection(mut self, config: MetadataConnectionConfig) -> Self {
        self.metadata_connection = config;
        self
    }

    /// Logical timestamp stamped onto produced artifacts
    pub fn logical_timestamp_ms(mut self, timestamp_ms: i64) -> Self {
        self.logical_timestamp_ms = timestamp_ms;
        self
    }

    /// Validate and order the nodes; nothing is scheduled here
    pub fn build(self) -> Result<Pipeline> {
        if self.pipeline_name.chars().count() > MAX_PIPELINE_NAME_LENGTH {
            return Err(PipelineError::Validation(format!(
                "pipeline name '{}' exceeds maximum length of {}",
                self.pipeline_name, MAX_PIPELINE_NAME_LENGTH
            )));
        }

        let dag = PipelineDag::build(self.nodes)?;
        let nodes = dag.order();

        for node in &nodes {
            for (key, channel) in node.outputs() {
                channel.stamp_artifacts(key, &self.pipeline_name, self.logical_timestamp_ms, node.id());
            }
        }

        tracing::debug!(
            pipeline = %self.pipeline_name,
            nodes = nodes.len(),
            "Pipeline constructed"
        );

        Ok(Pipeline {
            info: PipelineInfo {
                pipeline_name: self.pipeline_name,
                pipeline_root: self.pipeline_root,
                run_id: None,
            },
            enable_cache: self.enable_cache,
            log_root: self.log_root,
            additional_pipeline_args: self.additional_pipeline_args,
            metadata_connection: self.metadata_connection,
            dag,
            nodes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;
    use crate::node::{FnLauncher, LaunchContext, Launcher};
    use crate::types::Artifact;

    fn noop() -> Arc<dyn Launcher> {
        Arc::new(FnLauncher::new(|_: &LaunchContext| Ok(())))
    }

    fn create_test_node(id: &str, inputs: &[(&str, &Arc<Channel>)]) -> Arc<Node> {
        let mut builder = Node::builder(id, noop()).produces("output", id);
        for (name, channel) in inputs {
            builder = builder.input(*name, channel);
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_pipeline() {
        let a = create_test_node("component_a", &[]);
        let a_out = a.output("output").unwrap();
        let b = create_test_node("component_b", &[("a", a_out)]);
        let c = create_test_node("component_c", &[("a", a_out)]);
        let d = create_test_node(
            "component_d",
            &[
                ("b", b.output("output").unwrap()),
                ("c", c.output("output").unwrap()),
            ],
        );
        let e = create_test_node(
            "component_e",
            &[
                ("a", a_out),
                ("b", b.output("output").unwrap()),
                ("d", d.output("output").unwrap()),
            ],
        );

        let pipeline = Pipeline::builder("a", "b")
            .nodes([&d, &c, &a, &b, &e, &a])
            .enable_cache(true)
            .engine_args(["--runner=PortableRunner"])
            .build()
            .unwrap();

        assert_eq!(pipeline.nodes().len(), 5);
        assert_eq!(pipeline.nodes()[0].id(), a.id());
        assert_eq!(pipeline.nodes()[4].id(), e.id());
        assert!(pipeline.node(c.id()).is_some());
        assert_eq!(pipeline.dag().entry_nodes().len(), 1);

        let downstream: Vec<NodeId> = pipeline
            .downstream(a.id())
            .unwrap()
            .iter()
            .map(|n| n.id().clone())
            .collect();
        assert_eq!(downstream.len(), 3);
        assert!(downstream.contains(b.id()));
        assert!(downstream.contains(c.id()));
        assert!(downstream.contains(e.id()));

        assert_eq!(pipeline.name(), "a");
        assert_eq!(pipeline.info.pipeline_root, "b");
        assert!(pipeline.enable_cache);
        assert!(pipeline.run_id().is_none());

        let args = serde_json::to_value(pipeline.pipeline_args()).unwrap();
        assert_eq!(
            args,
            serde_json::json!({
                "pipeline_name": "a",
                "pipeline_root": "b",
                "additional_pipeline_args": {
                    "engine_args": ["--runner=PortableRunner"]
                }
            })
        );
    }

    #[test]
    fn test_pipeline_with_long_name() {
        let result = Pipeline::builder("a".repeat(MAX_PIPELINE_NAME_LENGTH + 1), "root").build();
        assert!(matches!(result, Err(PipelineError::Validation(_))));

        let result = Pipeline::builder("a".repeat(MAX_PIPELINE_NAME_LENGTH), "root").build();
        assert!(result.is_ok());

        // Length is measured in characters
        let result = Pipeline::builder("é".repeat(MAX_PIPELINE_NAME_LENGTH), "root").build();
        assert!(result.is_ok());

        let result = Pipeline::builder("é".repeat(MAX_PIPELINE_NAME_LENGTH + 1), "root").build();
        assert!(matches!(result, Err(PipelineError::Validation(_))));
    }

    #[test]
    fn test_pipeline_with_duplicated_node_id() {
        let first = create_test_node("component_a", &[]);
        let second = create_test_node("component_a", &[]);
        let third = create_test_node("component_a", &[]);

        let result = Pipeline::builder("a", "b")
            .nodes([&third, &second, &first])
            .build();
        assert!(matches!(
            result,
            Err(PipelineError::DuplicateNodeIdentity { .. })
        ));
    }

    #[test]
    fn test_pipeline_with_artifact_info() {
        let one = Channel::with_artifacts("channel_one", vec![Artifact::new("channel_one")]);
        let a = Node::builder("component_a", noop())
            .output("one", &one)
            .build()
            .unwrap();
        let b = create_test_node("component_b", &[("a", a.output("one").unwrap())]);

        let pipeline = Pipeline::builder("a", "b")
            .nodes([&b, &a])
            .logical_timestamp_ms(0)
            .build()
            .unwrap();
        assert_eq!(pipeline.nodes()[0].id(), a.id());

        let produced = &a.output("one").unwrap().artifacts()[0];
        assert_eq!(produced.pipeline_name.as_deref(), Some("a"));
        assert_eq!(produced.producer_component.as_ref(), Some(a.id()));
        assert_eq!(produced.name.as_deref(), Some("one"));
        assert_eq!(produced.pipeline_timestamp_ms, Some(0));

        let consumed = &b.input("a").unwrap().artifacts()[0];
        assert_eq!(consumed, produced);
    }

    #[test]
    fn test_pipeline_args_with_log_root() {
        let a = create_test_node("component_a", &[]);
        let pipeline = Pipeline::builder("a", "b")
            .log_root("c")
            .node(&a)
            .build()
            .unwrap();

        let args = serde_json::to_value(pipeline.pipeline_args()).unwrap();
        assert_eq!(
            args,
            serde_json::json!({
                "pipeline_name": "a",
                "pipeline_root": "b",
                "log_root": "c"
            })
        );
    }
}
