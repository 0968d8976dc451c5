use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a node within a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identifier of a single pipeline run, an RFC 3339 timestamp taken at run start
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn now() -> Self {
        Self(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connection settings for the metadata store.
///
/// Opaque to the orchestrator; handed to every launcher unmodified.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataConnectionConfig(pub serde_json::Value);

/// Pipeline-level identity shared with every launcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineInfo {
    pub pipeline_name: String,
    pub pipeline_root: String,
    /// Assigned when a run starts
    pub run_id: Option<RunId>,
}

/// Descriptor of an artifact flowing through a channel.
///
/// Only the producer-side fields are tracked here; the payload itself lives
/// in the metadata store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub type_name: String,
    /// Output key under which the producer exposes this artifact
    pub name: Option<String>,
    pub pipeline_name: Option<String>,
    pub pipeline_timestamp_ms: Option<i64>,
    pub producer_component: Option<NodeId>,
}

impl Artifact {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            name: None,
            pipeline_name: None,
            pipeline_timestamp_ms: None,
            producer_component: None,
        }
    }
}
