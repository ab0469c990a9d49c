use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::model::{EdgeEndpoints, Pipeline};
use crate::observability::MetricsCollector;
use crate::validation::{PipelineReport, PipelineValidator, ValidationError};

/// Body returned for a parse request: either the graph report or a
/// user-facing error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ParseResponse {
    Report(PipelineReport),
    Error(ErrorPayload),
}

impl ParseResponse {
    pub fn is_error(&self) -> bool {
        matches!(self, ParseResponse::Error(_))
    }

    pub fn is_dag(&self) -> Option<bool> {
        match self {
            ParseResponse::Report(report) => Some(report.is_dag),
            ParseResponse::Error(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_edges: Option<Vec<EdgeEndpoints>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ErrorPayload {
    pub fn message(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            duplicate_ids: None,
            invalid_edges: None,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl From<ValidationError> for ErrorPayload {
    fn from(err: ValidationError) -> Self {
        let mut payload = ErrorPayload::message(err.to_string());
        match err {
            ValidationError::DuplicateNodeIds { ids } => payload.duplicate_ids = Some(ids),
            ValidationError::InvalidEdges { edges } => payload.invalid_edges = Some(edges),
        }
        payload
    }
}

impl From<Result<PipelineReport, ValidationError>> for ParseResponse {
    fn from(result: Result<PipelineReport, ValidationError>) -> Self {
        match result {
            Ok(report) => ParseResponse::Report(report),
            Err(err) => ParseResponse::Error(err.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
}

impl HealthStatus {
    pub fn ok() -> Self {
        Self { status: "ok" }
    }
}

/// Validates a decoded pipeline and records the outcome.
pub fn parse_pipeline(pipeline: &Pipeline, metrics: &MetricsCollector) -> ParseResponse {
    let result = PipelineValidator::new().validate(pipeline);
    match &result {
        Ok(report) => {
            metrics.record_report(report.is_dag);
            info!(
                num_nodes = report.num_nodes,
                num_edges = report.num_edges,
                is_dag = report.is_dag,
                "Pipeline parsed"
            );
        }
        Err(err) => {
            metrics.record_rejection(err);
            match err {
                ValidationError::DuplicateNodeIds { ids } => {
                    warn!(duplicates = ?ids, "{err}")
                }
                ValidationError::InvalidEdges { edges } => {
                    warn!(invalid_edges = edges.len(), "{err}")
                }
            }
        }
    }
    result.into()
}
