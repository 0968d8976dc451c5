use crate::types::{NodeId, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// A lifecycle event emitted by the scheduler or an execution unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub pipeline_name: String,
    pub run_id: Option<RunId>,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
}

impl Event {
    pub fn new(pipeline_name: impl Into<String>, run_id: Option<RunId>, event_type: EventType) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            pipeline_name: pipeline_name.into(),
            run_id,
            timestamp: Utc::now(),
            event_type,
        }
    }
}

/// Types of events that can occur during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventType {
    // Run lifecycle events
    RunStarted {
        job_name: String,
        node_count: usize,
    },
    RunCompleted {
        duration_ms: u64,
    },
    RunFailed {
        error: String,
        duration_ms: u64,
    },
    /// Export-only run: args were written, nothing was scheduled
    RunExported {
        path: String,
    },

    // Node lifecycle events
    NodeScheduled {
        node_id: NodeId,
        upstream: Vec<NodeId>,
    },
    NodeStarted {
        node_id: NodeId,
        job_name: String,
    },
    NodeCompleted {
        node_id: NodeId,
        duration_ms: u64,
    },
    NodeFailed {
        node_id: NodeId,
        error: String,
    },
}

impl EventType {
    pub fn node_id(&self) -> Option<&NodeId> {
        match self {
            Self::NodeScheduled { node_id, .. }
            | Self::NodeStarted { node_id, .. }
            | Self::NodeCompleted { node_id, .. }
            | Self::NodeFailed { node_id, .. } => Some(node_id),
            _ => None,
        }
    }
}

/// Consumer of lifecycle events
#[async_trait::async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: Event);
}

/// Forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

#[async_trait::async_trait]
impl EventSink for TracingEventSink {
    async fn emit(&self, event: Event) {
        let run_id = event.run_id.as_ref().map(|r| r.0.as_str()).unwrap_or("-");
        match &event.event_type {
            EventType::RunFailed { error, .. } | EventType::NodeFailed { error, .. } => {
                tracing::error!(
                    pipeline = %event.pipeline_name,
                    run_id,
                    event = ?event.event_type,
                    "{}",
                    error
                );
            }
            other => {
                tracing::debug!(
                    pipeline = %event.pipeline_name,
                    run_id,
                    event = ?other,
                    "Lifecycle event"
                );
            }
        }
    }
}

/// Keeps every event in memory, in emission order
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    events: RwLock<Vec<Event>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<Event> {
        self.events.read().await.clone()
    }

    /// Node ids of all events matching `filter`, in emission order
    pub async fn node_ids_where(&self, filter: impl Fn(&EventType) -> bool) -> Vec<NodeId> {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| filter(&e.event_type))
            .filter_map(|e| e.event_type.node_id().cloned())
            .collect()
    }

    pub async fn started_nodes(&self) -> Vec<NodeId> {
        self.node_ids_where(|e| matches!(e, EventType::NodeStarted { .. }))
            .await
    }

    pub async fn completed_nodes(&self) -> Vec<NodeId> {
        self.node_ids_where(|e| matches!(e, EventType::NodeCompleted { .. }))
            .await
    }
}

#[async_trait::async_trait]
impl EventSink for MemoryEventLog {
    async fn emit(&self, event: Event) {
        self.events.write().await.push(event);
    }
}
