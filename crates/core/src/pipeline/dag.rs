use crate::error::{PipelineError, Result};
use crate::node::Node;
use crate::types::NodeId;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Dependency graph of a pipeline, derived from channel producer/consumer links
pub struct PipelineDag {
    graph: DiGraph<Arc<Node>, ()>,
    node_indices: HashMap<NodeId, NodeIndex>,
    order: Vec<NodeIndex>,
}

impl PipelineDag {
    /// Build the DAG from an unordered node collection.
    ///
    /// Repeated references to the same node are collapsed. Node indices
    /// follow first-seen input order, which also breaks ties in the
    /// topological sort.
    pub fn build(nodes: Vec<Arc<Node>>) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut node_indices: HashMap<NodeId, NodeIndex> = HashMap::new();

        for node in nodes {
            match node_indices.get(node.id()) {
                Some(&existing) if Arc::ptr_eq(&graph[existing], &node) => continue,
                Some(_) => {
                    return Err(PipelineError::DuplicateNodeIdentity {
                        node_id: node.id().clone(),
                    })
                }
                None => {
                    let id = node.id().clone();
                    let index = graph.add_node(node);
                    node_indices.insert(id, index);
                }
            }
        }

        // Edge from producer to consumer; producers outside the set are external inputs
        let consumers: Vec<NodeIndex> = graph.node_indices().collect();
        for consumer in consumers {
            let producers: Vec<NodeIndex> = graph[consumer]
                .inputs()
                .values()
                .filter_map(|channel| channel.producer())
                .filter_map(|producer| node_indices.get(producer).copied())
                .collect();

            for producer in producers {
                graph.update_edge(producer, consumer, ());
            }
        }

        let order = stable_topological_order(&graph)?;

        Ok(Self {
            graph,
            node_indices,
            order,
        })
    }

    /// Nodes in topological order (dependencies first)
    pub fn order(&self) -> Vec<Arc<Node>> {
        self.order
            .iter()
            .map(|&index| Arc::clone(&self.graph[index]))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.node_indices.contains_key(node_id)
    }

    /// Nodes that must complete before `node_id` runs, in topological order
    pub fn upstream(&self, node_id: &NodeId) -> Result<Vec<Arc<Node>>> {
        self.neighbors(node_id, Direction::Incoming)
    }

    /// Nodes that wait on `node_id`, in topological order
    pub fn downstream(&self, node_id: &NodeId) -> Result<Vec<Arc<Node>>> {
        self.neighbors(node_id, Direction::Outgoing)
    }

    /// Nodes with no upstream dependencies (can start immediately)
    pub fn entry_nodes(&self) -> Vec<Arc<Node>> {
        self.order
            .iter()
            .filter(|&&index| {
                self.graph
                    .neighbors_directed(index, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|&index| Arc::clone(&self.graph[index]))
            .collect()
    }

    fn neighbors(&self, node_id: &NodeId, direction: Direction) -> Result<Vec<Arc<Node>>> {
        let index = self
            .node_indices
            .get(node_id)
            .ok_or_else(|| PipelineError::Validation(format!("node {} not in pipeline", node_id)))?;

        let neighbors: BTreeSet<NodeIndex> =
            self.graph.neighbors_directed(*index, direction).collect();

        Ok(self
            .order
            .iter()
            .filter(|index| neighbors.contains(index))
            .map(|&index| Arc::clone(&self.graph[index]))
            .collect())
    }
}

/// Kahn's algorithm, always taking the ready node that came first in the input
fn stable_topological_order(graph: &DiGraph<Arc<Node>, ()>) -> Result<Vec<NodeIndex>> {
    let mut indegree: Vec<usize> = graph
        .node_indices()
        .map(|n| graph.neighbors_directed(n, Direction::Incoming).count())
        .collect();

    let mut ready: BTreeSet<NodeIndex> = graph
        .node_indices()
        .filter(|n| indegree[n.index()] == 0)
        .collect();

    let mut order = Vec::with_capacity(graph.node_count());
    while let Some(next) = ready.pop_first() {
        order.push(next);
        for downstream in graph.neighbors_directed(next, Direction::Outgoing) {
            indegree[downstream.index()] -= 1;
            if indegree[downstream.index()] == 0 {
                ready.insert(downstream);
            }
        }
    }

    if order.len() < graph.node_count() {
        return Err(cycle_error(graph));
    }

    Ok(order)
}

/// Report the cycle containing the earliest-submitted node that lies on one
fn cycle_error(graph: &DiGraph<Arc<Node>, ()>) -> PipelineError {
    let mut cycles: Vec<Vec<NodeIndex>> = petgraph::algo::tarjan_scc(graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
        .map(|mut scc| {
            scc.sort();
            scc
        })
        .collect();
    cycles.sort();

    match cycles.into_iter().next() {
        Some(cycle) => PipelineError::CycleDetected {
            node_id: graph[cycle[0]].id().clone(),
            cycle: cycle.iter().map(|&n| graph[n].id().clone()).collect(),
        },
        // Kahn stalled, so some strongly connected component must be cyclic
        None => PipelineError::Validation("topological sort stalled without a cycle".to_string()),
    }
}
