use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use glob::glob;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A processing step in a submitted pipeline. Only `id` takes part in
/// validation; `type` and `data` are carried along untouched.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
}

impl Node {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: None,
            data: None,
        }
    }
}

/// Directed connection `source -> target` between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub edge_type: Option<String>,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            edge_type: None,
        }
    }

    pub fn endpoints(&self) -> EdgeEndpoints {
        EdgeEndpoints {
            source: self.source.clone(),
            target: self.target.clone(),
        }
    }
}

/// The `{source, target}` view of an edge reported back to callers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EdgeEndpoints {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Pipeline {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl Pipeline {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline file: {}", path.display()))?;
        let pipeline = if is_yaml(path) {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse pipeline YAML: {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse pipeline JSON: {}", path.display()))?
        };
        Ok(pipeline)
    }
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_lowercase().as_str(), "yaml" | "yml"))
        .unwrap_or(false)
}

/// Resolves glob patterns to files, in pattern order. A file matched by
/// several patterns is returned once.
pub fn expand_patterns(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut resolved = Vec::new();
    let mut seen = HashSet::new();
    for pattern in patterns {
        let matches =
            glob(pattern).with_context(|| format!("Invalid glob pattern: {pattern}"))?;
        let mut found = false;
        for entry in matches {
            let path = entry?;
            if path.is_file() {
                found = true;
                if seen.insert(path.clone()) {
                    resolved.push(path);
                }
            }
        }
        if !found {
            anyhow::bail!("No pipeline files matched pattern: {pattern}");
        }
    }
    Ok(resolved)
}
