use std::collections::HashSet;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::graph::DiGraph;
use crate::model::{EdgeEndpoints, Pipeline};

/// Structural problems that stop a pipeline from being analysed.
///
/// These are expected outcomes for bad submissions, not internal faults.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Duplicate node IDs found")]
    DuplicateNodeIds { ids: Vec<String> },

    #[error("Invalid edges found: edges refer to nonexistent nodes")]
    InvalidEdges { edges: Vec<EdgeEndpoints> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    pub num_nodes: usize,
    pub num_edges: usize,
    pub is_dag: bool,
    pub cycle_path: Vec<(String, String)>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PipelineValidator;

impl PipelineValidator {
    pub fn new() -> Self {
        Self
    }

    #[instrument(skip_all, fields(nodes = pipeline.nodes.len(), edges = pipeline.edges.len()))]
    pub fn validate(&self, pipeline: &Pipeline) -> Result<PipelineReport, ValidationError> {
        let node_ids = unique_node_ids(pipeline)?;

        let invalid: Vec<EdgeEndpoints> = pipeline
            .edges
            .iter()
            .filter(|edge| {
                !node_ids.contains(edge.source.as_str()) || !node_ids.contains(edge.target.as_str())
            })
            .map(|edge| edge.endpoints())
            .collect();
        if !invalid.is_empty() {
            return Err(ValidationError::InvalidEdges { edges: invalid });
        }

        let mut graph = DiGraph::new();
        for node in &pipeline.nodes {
            graph.add_vertex(&node.id);
        }
        for edge in &pipeline.edges {
            graph.add_arc(&edge.source, &edge.target);
        }

        let cycle_path = graph.find_cycle().unwrap_or_default();
        let is_dag = cycle_path.is_empty();
        debug!(is_dag, cycle_len = cycle_path.len(), "Pipeline graph analysed");

        Ok(PipelineReport {
            num_nodes: graph.vertex_count(),
            num_edges: graph.arc_count(),
            is_dag,
            cycle_path,
        })
    }
}

/// Collects node ids, failing with every id that occurs more than once.
fn unique_node_ids(pipeline: &Pipeline) -> Result<HashSet<&str>, ValidationError> {
    let mut seen = HashSet::with_capacity(pipeline.nodes.len());
    let mut reported = HashSet::new();
    let mut duplicates: Vec<String> = Vec::new();
    for node in &pipeline.nodes {
        let id = node.id.as_str();
        if !seen.insert(id) && reported.insert(id) {
            duplicates.push(node.id.clone());
        }
    }
    if duplicates.is_empty() {
        Ok(seen)
    } else {
        Err(ValidationError::DuplicateNodeIds { ids: duplicates })
    }
}
