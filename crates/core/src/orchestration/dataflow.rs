use super::task::NodeTask;
use super::{DagRunner, RunReport};
use crate::config::RunConfig;
use crate::engine::{Engine, LocalEngine, Session};
use crate::error::{PipelineError, Result};
use crate::events::{Event, EventSink, EventType, TracingEventSink};
use crate::naming;
use crate::node::{LaunchContext, Node};
use crate::pipeline::Pipeline;
use crate::types::{NodeId, RunId};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// Runs a pipeline on a dataflow engine, sequencing nodes with empty
/// completion signals instead of artifact data.
pub struct DataflowDagRunner<E: Engine> {
    engine: E,
    config: RunConfig,
    events: Arc<dyn EventSink>,
}

impl DataflowDagRunner<LocalEngine> {
    /// Runner backed by the in-process engine
    pub fn local(config: RunConfig) -> Self {
        Self::new(LocalEngine::new(config.engine.clone()), config)
    }
}

impl<E: Engine> DataflowDagRunner<E> {
    pub fn new(engine: E, config: RunConfig) -> Self {
        Self {
            engine,
            config,
            events: Arc::new(TracingEventSink),
        }
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Orchestrator args plus the job name in effect; a user-supplied
    /// `--job_name` always wins.
    fn orchestrator_args(&self, pipeline_name: &str, timestamp: i64) -> (Vec<String>, String) {
        let mut args = self.config.orchestrator_args.clone();
        match naming::find_job_name(&args).map(str::to_string) {
            Some(job_name) => (args, job_name),
            None => {
                let job_name = naming::orchestrator_job_name(pipeline_name, timestamp);
                args.push(naming::job_name_arg(&job_name));
                (args, job_name)
            }
        }
    }

    fn launch_context(&self, pipeline: &Pipeline, node: &Node, timestamp: i64) -> LaunchContext {
        let job_name = naming::node_job_name(pipeline.name(), node.id().as_str(), timestamp);
        LaunchContext {
            pipeline_info: pipeline.info.clone(),
            node_id: node.id().clone(),
            enable_cache: pipeline.enable_cache,
            metadata_connection: pipeline.metadata_connection.clone(),
            engine_args: naming::replace_job_name(
                &pipeline.additional_pipeline_args.engine_args,
                &job_name,
            ),
        }
    }

    async fn emit(&self, pipeline: &Pipeline, event_type: EventType) {
        self.events
            .emit(Event::new(
                pipeline.name(),
                pipeline.run_id().cloned(),
                event_type,
            ))
            .await;
    }

    async fn export_pipeline_args(&self, pipeline: &Pipeline, path: &Path) -> Result<()> {
        let export_error = |source: std::io::Error| PipelineError::Export {
            path: path.to_path_buf(),
            source,
        };

        let json = serde_json::to_string_pretty(&pipeline.pipeline_args())
            .map_err(|e| export_error(e.into()))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(export_error)?;
        }
        tokio::fs::write(path, json).await.map_err(export_error)?;

        tracing::info!(
            pipeline = %pipeline.name(),
            "Exported pipeline args to {}, skipping execution",
            path.display()
        );
        Ok(())
    }

    /// Wire every node into `session`, walking `nodes` in order.
    ///
    /// Each node is triggered by `root` and joins on the completion signals of
    /// its upstream nodes, which must already be scheduled.
    async fn schedule_nodes(
        &self,
        session: &mut E::Session,
        root: &<E::Session as Session>::Handle,
        pipeline: &Pipeline,
        nodes: &[Arc<Node>],
        timestamp: i64,
        completed: &Arc<Mutex<Vec<NodeId>>>,
    ) -> Result<HashMap<NodeId, <E::Session as Session>::Handle>> {
        let mut completion_map: HashMap<NodeId, <E::Session as Session>::Handle> = HashMap::new();

        for node in nodes {
            let upstream = pipeline.upstream(node.id())?;

            let mut signals = Vec::with_capacity(upstream.len());
            for upstream_node in &upstream {
                let signal = completion_map.get(upstream_node.id()).ok_or_else(|| {
                    PipelineError::OrderingInvariantViolation {
                        node_id: node.id().clone(),
                        upstream: upstream_node.id().clone(),
                    }
                })?;
                signals.push(signal.clone());
            }

            let upstream_ids: Vec<NodeId> = upstream.iter().map(|n| n.id().clone()).collect();
            tracing::info!(
                node_id = %node.id(),
                "Node {} depends on {:?}",
                node.id(),
                upstream_ids
            );

            let task = NodeTask::new(
                Arc::clone(node),
                self.launch_context(pipeline, node, timestamp),
                Arc::clone(&self.events),
                Arc::clone(completed),
            );
            let signal = session.schedule(
                &format!("Run[{}]", node.id()),
                Arc::new(task),
                root,
                &signals,
            )?;
            completion_map.insert(node.id().clone(), signal);

            self.emit(
                pipeline,
                EventType::NodeScheduled {
                    node_id: node.id().clone(),
                    upstream: upstream_ids,
                },
            )
            .await;
            tracing::info!(node_id = %node.id(), "Node {} is scheduled", node.id());
        }

        Ok(completion_map)
    }

    /// Build the engine job for `nodes` and run it to completion
    async fn execute_dag(
        &self,
        pipeline: &Pipeline,
        nodes: &[Arc<Node>],
        orchestrator_args: &[String],
        timestamp: i64,
    ) -> Result<Vec<NodeId>> {
        let mut session = self.engine.session(orchestrator_args);
        let root = session.create("CreateRoot", vec![serde_json::Value::Null])?;

        let completed = Arc::new(Mutex::new(Vec::with_capacity(nodes.len())));
        self.schedule_nodes(&mut session, &root, pipeline, nodes, timestamp, &completed)
            .await?;

        session.execute().await?;

        let completed = completed.lock().await.clone();
        Ok(completed)
    }

    async fn run_nodes(&self, pipeline: &mut Pipeline, nodes: &[Arc<Node>]) -> Result<RunReport> {
        let timestamp = chrono::Utc::now().timestamp();
        let (orchestrator_args, job_name) = self.orchestrator_args(pipeline.name(), timestamp);

        if let Some(path) = &self.config.export_path {
            self.export_pipeline_args(pipeline, path).await?;
            self.emit(
                pipeline,
                EventType::RunExported {
                    path: path.display().to_string(),
                },
            )
            .await;
            return Ok(RunReport {
                run_id: None,
                job_name,
                completed: Vec::new(),
                exported: true,
            });
        }

        let run_id = RunId::now();
        pipeline.assign_run_id(run_id.clone());
        let pipeline = &*pipeline;

        tracing::info!(
            pipeline = %pipeline.name(),
            run_id = %run_id,
            "Starting pipeline run: job_name={}",
            job_name
        );
        self.emit(
            pipeline,
            EventType::RunStarted {
                job_name: job_name.clone(),
                node_count: nodes.len(),
            },
        )
        .await;

        let started = Instant::now();
        let result = self
            .execute_dag(pipeline, nodes, &orchestrator_args, timestamp)
            .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(completed) => {
                self.emit(pipeline, EventType::RunCompleted { duration_ms }).await;
                tracing::info!(
                    pipeline = %pipeline.name(),
                    run_id = %run_id,
                    "Pipeline run completed"
                );

                Ok(RunReport {
                    run_id: Some(run_id),
                    job_name,
                    completed,
                    exported: false,
                })
            }
            Err(e) => {
                self.emit(
                    pipeline,
                    EventType::RunFailed {
                        error: e.to_string(),
                        duration_ms,
                    },
                )
                .await;
                tracing::error!(
                    pipeline = %pipeline.name(),
                    run_id = %run_id,
                    node_id = ?e.node_id(),
                    "Pipeline run failed: {}",
                    e
                );

                Err(e)
            }
        }
    }
}

#[async_trait::async_trait]
impl<E: Engine> DagRunner for DataflowDagRunner<E> {
    async fn run(&self, pipeline: &mut Pipeline) -> Result<RunReport> {
        let nodes = pipeline.nodes().to_vec();
        self.run_nodes(pipeline, &nodes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemoryEventLog;
    use crate::node::{FnLauncher, Launcher};
    use tempfile::TempDir;

    fn recording(trace: &Arc<std::sync::Mutex<Vec<String>>>) -> Arc<dyn Launcher> {
        let trace = Arc::clone(trace);
        Arc::new(FnLauncher::new(move |ctx: &LaunchContext| {
            trace.lock().unwrap().push(ctx.node_id.0.clone());
            Ok(())
        }))
    }

    fn chain(launcher: &Arc<dyn Launcher>) -> Pipeline {
        let a = Node::builder("a", Arc::clone(launcher))
            .produces("output", "a")
            .build()
            .unwrap();
        let b = Node::builder("b", Arc::clone(launcher))
            .input("a", a.output("output").unwrap())
            .build()
            .unwrap();

        Pipeline::builder("chain", "/tmp/chain")
            .nodes([&b, &a])
            .engine_args(["--runner=DirectRunner", "--job_name=user"])
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_run_assigns_run_id_and_job_names() {
        let contexts = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen = Arc::clone(&contexts);
        let launcher: Arc<dyn Launcher> = Arc::new(FnLauncher::new(move |ctx: &LaunchContext| {
            seen.lock().unwrap().push(ctx.clone());
            Ok(())
        }));
        let mut pipeline = chain(&launcher);

        let report = DataflowDagRunner::local(RunConfig::default())
            .run(&mut pipeline)
            .await
            .unwrap();

        assert!(report.job_name.starts_with("chain-"));
        assert_eq!(report.run_id.as_ref(), pipeline.run_id());
        assert!(report.run_id.is_some());

        let contexts = contexts.lock().unwrap();
        assert_eq!(contexts.len(), 2);
        for ctx in contexts.iter() {
            assert_eq!(ctx.pipeline_info.run_id, report.run_id);
            let job_args: Vec<&String> = ctx
                .engine_args
                .iter()
                .filter(|a| a.starts_with("--job_name"))
                .collect();
            assert_eq!(job_args.len(), 1);
            assert!(job_args[0].starts_with(&format!("--job_name=chain-{}-", ctx.node_id)));
            assert_eq!(ctx.engine_args[0], "--runner=DirectRunner");
        }
    }

    #[tokio::test]
    async fn test_user_orchestrator_job_name_kept() {
        let trace = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut pipeline = chain(&recording(&trace));

        let config = RunConfig::default().with_orchestrator_args(["--job_name=nightly"]);
        let report = DataflowDagRunner::local(config)
            .run(&mut pipeline)
            .await
            .unwrap();

        assert_eq!(report.job_name, "nightly");
        assert_eq!(report.completed, vec![NodeId::new("a"), NodeId::new("b")]);
    }

    #[tokio::test]
    async fn test_export_only_run_executes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("args.json");
        let trace = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut pipeline = chain(&recording(&trace));
        let events = Arc::new(MemoryEventLog::new());

        let report = DataflowDagRunner::local(RunConfig::default().with_export_path(&path))
            .with_event_sink(events.clone())
            .run(&mut pipeline)
            .await
            .unwrap();

        assert!(report.exported);
        assert!(report.completed.is_empty());
        assert!(trace.lock().unwrap().is_empty());
        assert!(pipeline.run_id().is_none());

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["pipeline_name"], "chain");
        assert_eq!(written["pipeline_root"], "/tmp/chain");

        let events = events.events().await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].event_type, EventType::RunExported { .. }));
    }

    #[tokio::test]
    async fn test_out_of_order_scheduling_is_rejected() {
        let trace = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut pipeline = chain(&recording(&trace));
        let mut reversed = pipeline.nodes().to_vec();
        reversed.reverse();

        let runner = DataflowDagRunner::local(RunConfig::default());
        let err = runner.run_nodes(&mut pipeline, &reversed).await.unwrap_err();

        match err {
            PipelineError::OrderingInvariantViolation { node_id, upstream } => {
                assert_eq!(node_id.0, "b");
                assert_eq!(upstream.0, "a");
            }
            other => panic!("expected OrderingInvariantViolation, got {}", other),
        }
        assert!(trace.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scheduled_events_carry_upstream() {
        let trace = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut pipeline = chain(&recording(&trace));
        let events = Arc::new(MemoryEventLog::new());

        DataflowDagRunner::local(RunConfig::default())
            .with_event_sink(events.clone())
            .run(&mut pipeline)
            .await
            .unwrap();

        let scheduled: Vec<EventType> = events
            .events()
            .await
            .into_iter()
            .map(|e| e.event_type)
            .filter(|e| matches!(e, EventType::NodeScheduled { .. }))
            .collect();
        assert_eq!(
            scheduled,
            vec![
                EventType::NodeScheduled {
                    node_id: NodeId::new("a"),
                    upstream: vec![],
                },
                EventType::NodeScheduled {
                    node_id: NodeId::new("b"),
                    upstream: vec![NodeId::new("a")],
                },
            ]
        );
        assert!(matches!(
            events.events().await.last().map(|e| e.event_type.clone()),
            Some(EventType::RunCompleted { .. })
        ));
    }
}
