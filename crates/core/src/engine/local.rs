use super::{Collection, Element, Engine, ExecutionUnit, Session};
use crate::config::EngineConfig;
use crate::error::{PipelineError, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

/// In-process engine running every unit as a tokio task
#[derive(Debug, Clone, Default)]
pub struct LocalEngine {
    config: EngineConfig,
}

impl LocalEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

impl Engine for LocalEngine {
    type Session = LocalSession;

    fn session(&self, args: &[String]) -> LocalSession {
        tracing::debug!(args = ?args, "Opening local engine session");
        LocalSession {
            args: args.to_vec(),
            max_concurrent_units: self.config.max_concurrent_units,
            labels: HashSet::new(),
            constants: Vec::new(),
            units: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
enum Availability {
    Pending,
    Ready(Collection),
    /// Producer failed or was aborted; dependents never run
    Failed,
}

/// Handle to a collection of a [`LocalSession`]
#[derive(Debug, Clone)]
pub struct LocalHandle {
    label: String,
    rx: watch::Receiver<Availability>,
}

impl LocalHandle {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Wait until the collection is materialized; `None` if its producer failed
    pub async fn wait(&self) -> Option<Collection> {
        let mut rx = self.rx.clone();
        let available = rx
            .wait_for(|a| !matches!(a, Availability::Pending))
            .await
            .ok()?;
        match &*available {
            Availability::Ready(collection) => Some(collection.clone()),
            _ => None,
        }
    }
}

struct PendingUnit {
    label: String,
    unit: Arc<dyn ExecutionUnit>,
    main: LocalHandle,
    side_inputs: Vec<LocalHandle>,
    output: watch::Sender<Availability>,
}

pub struct LocalSession {
    args: Vec<String>,
    max_concurrent_units: Option<usize>,
    labels: HashSet<String>,
    // Keep constant collections open for the session's lifetime
    constants: Vec<watch::Sender<Availability>>,
    units: Vec<PendingUnit>,
}

impl LocalSession {
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Units scheduled but not yet executed
    pub fn pending_units(&self) -> usize {
        self.units.len()
    }

    fn register_label(&mut self, label: &str) -> Result<()> {
        if !self.labels.insert(label.to_string()) {
            return Err(PipelineError::Engine(format!(
                "label '{}' is already used in this session",
                label
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Session for LocalSession {
    type Handle = LocalHandle;

    fn create(&mut self, label: &str, elements: Vec<Element>) -> Result<LocalHandle> {
        self.register_label(label)?;
        let (tx, rx) = watch::channel(Availability::Ready(Collection::from_elements(elements)));
        self.constants.push(tx);
        Ok(LocalHandle {
            label: label.to_string(),
            rx,
        })
    }

    fn schedule(
        &mut self,
        label: &str,
        unit: Arc<dyn ExecutionUnit>,
        main: &LocalHandle,
        side_inputs: &[LocalHandle],
    ) -> Result<LocalHandle> {
        self.register_label(label)?;
        let (tx, rx) = watch::channel(Availability::Pending);
        self.units.push(PendingUnit {
            label: label.to_string(),
            unit,
            main: main.clone(),
            side_inputs: side_inputs.to_vec(),
            output: tx,
        });
        Ok(LocalHandle {
            label: label.to_string(),
            rx,
        })
    }

    async fn execute(&mut self) -> Result<()> {
        let semaphore = self
            .max_concurrent_units
            .map(|permits| Arc::new(Semaphore::new(permits.max(1))));

        let mut tasks: JoinSet<Result<()>> = JoinSet::new();
        for pending in self.units.drain(..) {
            tasks.spawn(run_unit(pending, semaphore.clone()));
        }

        while let Some(joined) = tasks.join_next().await {
            let failure = match joined {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(join_error) => PipelineError::Engine(if join_error.is_panic() {
                    "execution unit panicked".to_string()
                } else {
                    "execution unit was cancelled".to_string()
                }),
            };

            // Fail fast: nothing else in this job may keep running
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
            return Err(failure);
        }

        Ok(())
    }
}

async fn run_unit(pending: PendingUnit, semaphore: Option<Arc<Semaphore>>) -> Result<()> {
    let PendingUnit {
        label,
        unit,
        main,
        side_inputs,
        output,
    } = pending;

    let Some(main) = main.wait().await else {
        output.send_replace(Availability::Failed);
        return Ok(());
    };

    let mut materialized = Vec::with_capacity(side_inputs.len());
    for side_input in &side_inputs {
        match side_input.wait().await {
            Some(collection) => materialized.push(collection),
            None => {
                tracing::debug!(unit = %label, upstream = %side_input.label(), "Upstream failed, unit will not run");
                output.send_replace(Availability::Failed);
                return Ok(());
            }
        }
    }

    let _permit = match semaphore {
        Some(semaphore) => Some(
            semaphore
                .acquire_owned()
                .await
                .map_err(|_| PipelineError::Engine("unit semaphore closed".to_string()))?,
        ),
        None => None,
    };

    let mut produced = Vec::new();
    for element in main.iter() {
        match unit.process(element, &materialized).await {
            Ok(elements) => produced.extend(elements),
            Err(e) => {
                output.send_replace(Availability::Failed);
                return Err(e);
            }
        }
    }

    output.send_replace(Availability::Ready(Collection::from_elements(produced)));
    Ok(())
}
