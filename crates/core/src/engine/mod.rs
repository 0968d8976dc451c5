//! Dataflow engine abstraction.
//!
//! An engine runs units of work connected by collections: a unit is invoked
//! once per element of its main input, and only after every side input it
//! joins on has been fully materialized. Independent units may run
//! concurrently and in any order.

pub mod local;

pub use local::{LocalEngine, LocalHandle, LocalSession};

use crate::error::Result;
use std::sync::Arc;

/// Single element of a collection
pub type Element = serde_json::Value;

/// Immutable, fully materialized collection of elements
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collection {
    elements: Arc<Vec<Element>>,
}

impl Collection {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_elements(elements: Vec<Element>) -> Self {
        Self {
            elements: Arc::new(elements),
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Element> {
        self.elements.iter()
    }
}

/// Work the engine invokes once per main-input element
#[async_trait::async_trait]
pub trait ExecutionUnit: Send + Sync {
    /// Process `element` given the materialized side inputs; returned
    /// elements form the unit's output collection.
    async fn process(&self, element: &Element, side_inputs: &[Collection]) -> Result<Vec<Element>>;
}

/// A backend able to run data-dependency-triggered units
pub trait Engine: Send + Sync {
    type Session: Session;

    /// Open a session; `args` are the orchestrator job's own flags
    fn session(&self, args: &[String]) -> Self::Session;
}

/// One engine job under construction.
///
/// `create` and `schedule` only wire the graph; nothing runs until
/// [`Session::execute`].
#[async_trait::async_trait]
pub trait Session: Send {
    /// Handle to a collection that becomes available while executing
    type Handle: Clone + Send + Sync + 'static;

    /// Constant collection, available as soon as execution starts
    fn create(&mut self, label: &str, elements: Vec<Element>) -> Result<Self::Handle>;

    /// Run `unit` over `main`, not before every `side_inputs` collection is available
    fn schedule(
        &mut self,
        label: &str,
        unit: Arc<dyn ExecutionUnit>,
        main: &Self::Handle,
        side_inputs: &[Self::Handle],
    ) -> Result<Self::Handle>;

    /// Run all scheduled units to completion; the first unit failure fails the job
    async fn execute(&mut self) -> Result<()>;
}
