use crate::engine::{Collection, Element, ExecutionUnit};
use crate::error::{PipelineError, Result};
use crate::events::{Event, EventSink, EventType};
use crate::naming;
use crate::node::{LaunchContext, Node};
use crate::types::NodeId;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// Engine unit wrapping a single node.
///
/// Side inputs are the completion signals of every upstream node; the unit
/// emits no elements, so its own output collection is the empty signal its
/// dependents join on.
pub struct NodeTask {
    node: Arc<Node>,
    context: LaunchContext,
    events: Arc<dyn EventSink>,
    completed: Arc<Mutex<Vec<NodeId>>>,
}

impl NodeTask {
    pub fn new(
        node: Arc<Node>,
        context: LaunchContext,
        events: Arc<dyn EventSink>,
        completed: Arc<Mutex<Vec<NodeId>>>,
    ) -> Self {
        Self {
            node,
            context,
            events,
            completed,
        }
    }

    fn job_name(&self) -> String {
        naming::find_job_name(&self.context.engine_args)
            .unwrap_or_default()
            .to_string()
    }

    /// Run the launcher, turning a panic into an ordinary launch error
    async fn launch(&self) -> anyhow::Result<()> {
        AssertUnwindSafe(self.node.launcher().launch(&self.context))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(anyhow::anyhow!(
                    "launcher panicked: {}",
                    panic_message(panic.as_ref())
                ))
            })
    }

    async fn fail(&self, error: String) {
        let node_id = self.node.id();
        tracing::error!(node_id = %node_id, "Node {} failed: {}", node_id, error);
        self.emit(EventType::NodeFailed {
            node_id: node_id.clone(),
            error,
        })
        .await;
    }

    async fn emit(&self, event_type: EventType) {
        self.events
            .emit(Event::new(
                self.context.pipeline_info.pipeline_name.clone(),
                self.context.pipeline_info.run_id.clone(),
                event_type,
            ))
            .await;
    }
}

#[async_trait::async_trait]
impl ExecutionUnit for NodeTask {
    async fn process(&self, _trigger: &Element, signals: &[Collection]) -> Result<Vec<Element>> {
        let node_id = self.node.id();

        if let Some(signal) = signals.iter().find(|s| !s.is_empty()) {
            let err = PipelineError::SignalContractViolation {
                node_id: node_id.clone(),
                elements: signal.len(),
            };
            self.fail(err.to_string()).await;
            return Err(err);
        }

        tracing::info!(node_id = %node_id, "Node {} is running", node_id);
        self.emit(EventType::NodeStarted {
            node_id: node_id.clone(),
            job_name: self.job_name(),
        })
        .await;

        let start = Instant::now();
        match self.launch().await {
            Ok(()) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                self.completed.lock().await.push(node_id.clone());
                self.emit(EventType::NodeCompleted {
                    node_id: node_id.clone(),
                    duration_ms,
                })
                .await;
                tracing::info!(node_id = %node_id, duration_ms, "Node {} is finished", node_id);

                Ok(Vec::new())
            }
            Err(e) => {
                self.fail(format!("{:#}", e)).await;

                Err(PipelineError::LaunchFailed {
                    node_id: node_id.clone(),
                    source: e,
                })
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
