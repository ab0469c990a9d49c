use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use once_cell::sync::Lazy;
use serde::Serialize;
use tracing::{debug, info};

use crate::validation::ValidationError;

#[derive(Debug, Default, Serialize, Clone)]
pub struct MetricsSnapshot {
    pub routes: BTreeMap<String, RouteMetrics>,
    pub pipelines_acyclic: u64,
    pub pipelines_cyclic: u64,
    pub rejected_duplicate_ids: u64,
    pub rejected_invalid_edges: u64,
    pub malformed_requests: u64,
}

#[derive(Debug, Default, Serialize, Clone)]
pub struct RouteMetrics {
    pub calls: u64,
    pub total_duration_ms: f64,
    pub max_duration_ms: f64,
}

#[derive(Debug, Default, Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsSnapshot>>,
}

impl MetricsCollector {
    pub fn global() -> &'static MetricsCollector {
        static INSTANCE: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);
        &INSTANCE
    }

    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsSnapshot::default())),
        }
    }

    pub fn start_route(&self, route: &str) -> RouteTimer {
        RouteTimer {
            route: route.to_string(),
            started_at: Instant::now(),
            collector: self.inner.clone(),
            recorded: false,
        }
    }

    pub fn record_report(&self, is_dag: bool) {
        if let Ok(mut guard) = self.inner.lock() {
            if is_dag {
                guard.pipelines_acyclic += 1;
            } else {
                guard.pipelines_cyclic += 1;
            }
        }
    }

    pub fn record_rejection(&self, err: &ValidationError) {
        if let Ok(mut guard) = self.inner.lock() {
            match err {
                ValidationError::DuplicateNodeIds { .. } => guard.rejected_duplicate_ids += 1,
                ValidationError::InvalidEdges { .. } => guard.rejected_invalid_edges += 1,
            }
        }
    }

    pub fn record_malformed(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.malformed_requests += 1;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn reset(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = MetricsSnapshot::default();
        }
    }
}

/// Records the elapsed time for a route when dropped.
pub struct RouteTimer {
    route: String,
    started_at: Instant,
    collector: Arc<Mutex<MetricsSnapshot>>,
    recorded: bool,
}

impl RouteTimer {
    fn record(&mut self) {
        if self.recorded {
            return;
        }
        let duration_ms = self.started_at.elapsed().as_secs_f64() * 1_000.0;
        if let Ok(mut guard) = self.collector.lock() {
            let metrics = guard.routes.entry(self.route.clone()).or_default();
            metrics.calls += 1;
            metrics.total_duration_ms += duration_ms;
            if duration_ms > metrics.max_duration_ms {
                metrics.max_duration_ms = duration_ms;
            }
        }
        debug!(
            route = self.route.as_str(),
            duration_ms, "Route duration recorded"
        );
        self.recorded = true;
    }
}

impl Drop for RouteTimer {
    fn drop(&mut self) {
        self.record();
    }
}

pub fn log_snapshot(snapshot: &MetricsSnapshot) {
    info!(
        pipelines_acyclic = snapshot.pipelines_acyclic,
        pipelines_cyclic = snapshot.pipelines_cyclic,
        rejected_duplicate_ids = snapshot.rejected_duplicate_ids,
        rejected_invalid_edges = snapshot.rejected_invalid_edges,
        malformed_requests = snapshot.malformed_requests,
        "Parser metrics summary"
    );
    for (route, metrics) in &snapshot.routes {
        info!(
            route = route.as_str(),
            calls = metrics.calls,
            total_ms = metrics.total_duration_ms,
            max_ms = metrics.max_duration_ms,
            "Route metrics"
        );
    }
}

impl MetricsSnapshot {
    pub fn to_prometheus(&self) -> String {
        let mut output = String::new();
        write_family(
            &mut output,
            "pipelines_total",
            "counter",
            "Pipelines analysed, by graph shape",
            [
                (Some(("shape", "acyclic")), self.pipelines_acyclic.to_string()),
                (Some(("shape", "cyclic")), self.pipelines_cyclic.to_string()),
            ],
        );
        write_family(
            &mut output,
            "rejections_total",
            "counter",
            "Pipelines rejected by structural validation",
            [
                (
                    Some(("reason", "duplicate_node_ids")),
                    self.rejected_duplicate_ids.to_string(),
                ),
                (
                    Some(("reason", "invalid_edges")),
                    self.rejected_invalid_edges.to_string(),
                ),
            ],
        );
        write_family(
            &mut output,
            "malformed_requests_total",
            "counter",
            "Request bodies that failed to decode",
            [(None, self.malformed_requests.to_string())],
        );

        let routes = || self.routes.iter().map(|(route, m)| (route.as_str(), m));
        write_family(
            &mut output,
            "route_calls_total",
            "counter",
            "Route invocation count",
            routes().map(|(route, m)| (Some(("route", route)), m.calls.to_string())),
        );
        write_family(
            &mut output,
            "route_duration_seconds_total",
            "counter",
            "Accumulated route duration in seconds",
            routes().map(|(route, m)| {
                (
                    Some(("route", route)),
                    format!("{:.6}", m.total_duration_ms / 1_000.0),
                )
            }),
        );
        write_family(
            &mut output,
            "route_duration_seconds_max",
            "gauge",
            "Maximum route duration in seconds",
            routes().map(|(route, m)| {
                (
                    Some(("route", route)),
                    format!("{:.6}", m.max_duration_ms / 1_000.0),
                )
            }),
        );
        output
    }
}

const METRIC_PREFIX: &str = "pipeline_parser_";

/// Appends one metric family in Prometheus text format: the HELP and TYPE
/// header followed by a sample per (optional label, value) pair.
fn write_family<'a>(
    output: &mut String,
    name: &str,
    kind: &str,
    help: &str,
    samples: impl IntoIterator<Item = (Option<(&'a str, &'a str)>, String)>,
) {
    output.push_str(&format!("# HELP {METRIC_PREFIX}{name} {help}\n"));
    output.push_str(&format!("# TYPE {METRIC_PREFIX}{name} {kind}\n"));
    for (label, value) in samples {
        match label {
            Some((key, label_value)) => output.push_str(&format!(
                "{METRIC_PREFIX}{name}{{{key}=\"{label_value}\"}} {value}\n"
            )),
            None => output.push_str(&format!("{METRIC_PREFIX}{name} {value}\n")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_timer_records_on_drop() {
        let collector = MetricsCollector::new();
        {
            let _timer = collector.start_route("parse");
        }
        let snapshot = collector.snapshot();
        assert_eq!(snapshot.routes.get("parse").map(|m| m.calls), Some(1));
    }

    #[test]
    fn prometheus_output_contains_counters() {
        let collector = MetricsCollector::new();
        collector.record_report(true);
        collector.record_report(false);
        collector.record_rejection(&ValidationError::InvalidEdges { edges: Vec::new() });
        let prom = collector.snapshot().to_prometheus();
        assert!(prom.contains("pipeline_parser_pipelines_total{shape=\"acyclic\"} 1"));
        assert!(prom.contains("pipeline_parser_pipelines_total{shape=\"cyclic\"} 1"));
        assert!(prom.contains("pipeline_parser_rejections_total{reason=\"invalid_edges\"} 1"));
        assert!(prom.contains("pipeline_parser_malformed_requests_total 0"));

        {
            let _timer = collector.start_route("parse");
        }
        let prom = collector.snapshot().to_prometheus();
        assert!(prom.contains("# TYPE pipeline_parser_route_duration_seconds_max gauge"));
        assert!(prom.contains("pipeline_parser_route_calls_total{route=\"parse\"} 1"));

        collector.reset();
        assert_eq!(collector.snapshot().pipelines_cyclic, 0);
    }
}
