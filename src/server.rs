//! HTTP front end for the pipeline parser.
//!
//! The server owns a single-threaded tokio runtime on a dedicated thread so
//! callers stay synchronous; `stop` (or drop) shuts it down gracefully.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use hyper::body::HttpBody;
use hyper::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    CONTENT_LENGTH, CONTENT_TYPE, HeaderValue,
};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, StatusCode};
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::config::{CorsConfig, ServerConfig};
use crate::model::Pipeline;
use crate::observability::MetricsCollector;
use crate::response::{ErrorPayload, HealthStatus, parse_pipeline};

pub const HEALTH_ROUTE: &str = "/";
pub const PARSE_ROUTE: &str = "/pipelines/parse";

struct CorsHeaders {
    allow_origin: HeaderValue,
    allow_methods: HeaderValue,
    allow_headers: HeaderValue,
}

impl CorsHeaders {
    fn from_config(cors: &CorsConfig) -> Result<Self> {
        Ok(Self {
            allow_origin: HeaderValue::from_str(&cors.allow_origin)
                .with_context(|| format!("Invalid CORS origin: {}", cors.allow_origin))?,
            allow_methods: HeaderValue::from_str(&cors.allow_methods)
                .with_context(|| format!("Invalid CORS methods: {}", cors.allow_methods))?,
            allow_headers: HeaderValue::from_str(&cors.allow_headers)
                .with_context(|| format!("Invalid CORS headers: {}", cors.allow_headers))?,
        })
    }

    fn apply(&self, response: &mut Response<Body>) {
        let headers = response.headers_mut();
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, self.allow_origin.clone());
        headers.insert(ACCESS_CONTROL_ALLOW_METHODS, self.allow_methods.clone());
        headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, self.allow_headers.clone());
    }
}

struct ServerState {
    max_body_bytes: usize,
    cors: CorsHeaders,
    collector: MetricsCollector,
}

pub struct PipelineServer {
    shutdown_tx: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
    address: SocketAddr,
}

impl PipelineServer {
    pub fn start(config: &ServerConfig, collector: MetricsCollector) -> Result<Self> {
        let state = Arc::new(ServerState {
            max_body_bytes: config.max_body_bytes,
            cors: CorsHeaders::from_config(&config.cors)?,
            collector,
        });

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to build server runtime")?;

        let builder = {
            let _guard = runtime.enter();
            hyper::Server::try_bind(&config.listen)
                .with_context(|| format!("Failed to bind {}", config.listen))?
        };
        let address = builder.local_addr();
        let (tx, rx) = oneshot::channel::<()>();

        let thread = std::thread::spawn(move || {
            runtime.block_on(async move {
                let make_svc = make_service_fn(move |_| {
                    let state = state.clone();
                    async move {
                        Ok::<_, hyper::Error>(service_fn(move |req| {
                            let state = state.clone();
                            async move { handle_request(req, state).await }
                        }))
                    }
                });

                let server = builder.serve(make_svc);
                let graceful = server.with_graceful_shutdown(async move {
                    let _ = rx.await;
                });

                if let Err(err) = graceful.await {
                    error!(error = %err, "Pipeline server error");
                }
            });
        });

        info!(%address, "Pipeline server listening");

        Ok(Self {
            shutdown_tx: Some(tx),
            thread: Some(thread),
            address,
        })
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
            info!(address = %self.address, "Pipeline server stopped");
        }
    }
}

impl Drop for PipelineServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn handle_request(
    req: Request<Body>,
    state: Arc<ServerState>,
) -> Result<Response<Body>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    debug!(%method, path = path.as_str(), "Request received");

    let mut response = match (&method, path.as_str()) {
        (&Method::OPTIONS, _) => empty_response(StatusCode::NO_CONTENT),
        (&Method::GET, HEALTH_ROUTE) => {
            let _timer = state.collector.start_route("health");
            json_response(StatusCode::OK, &HealthStatus::ok())
        }
        (&Method::POST, PARSE_ROUTE) => {
            let _timer = state.collector.start_route("parse");
            handle_parse(req, &state).await
        }
        (&Method::GET, "/metrics") => {
            let body = state.collector.snapshot().to_prometheus();
            let mut response = Response::new(Body::from(body));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        (&Method::GET, "/metrics.json") => {
            json_response(StatusCode::OK, &state.collector.snapshot())
        }
        _ => json_response(StatusCode::NOT_FOUND, &ErrorPayload::message("Not Found")),
    };

    state.cors.apply(&mut response);
    Ok(response)
}

async fn handle_parse(req: Request<Body>, state: &ServerState) -> Response<Body> {
    let body = match read_limited(req, state.max_body_bytes).await {
        Ok(body) => body,
        Err(BodyError::TooLarge) => {
            warn!(limit = state.max_body_bytes, "Request body too large");
            return json_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                &ErrorPayload::message("Request body too large"),
            );
        }
        Err(BodyError::Read(err)) => {
            warn!(error = %err, "Failed to read request body");
            return json_response(
                StatusCode::BAD_REQUEST,
                &ErrorPayload::message("Failed to read request body").with_detail(err.to_string()),
            );
        }
    };

    let pipeline: Pipeline = match serde_json::from_slice(&body) {
        Ok(pipeline) => pipeline,
        Err(err) => {
            state.collector.record_malformed();
            warn!(error = %err, "Malformed pipeline request");
            return json_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                &ErrorPayload::message("Invalid request body").with_detail(err.to_string()),
            );
        }
    };

    json_response(StatusCode::OK, &parse_pipeline(&pipeline, &state.collector))
}

enum BodyError {
    TooLarge,
    Read(hyper::Error),
}

async fn read_limited(req: Request<Body>, limit: usize) -> Result<Vec<u8>, BodyError> {
    let declared = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());
    if declared.is_some_and(|len| len > limit) {
        return Err(BodyError::TooLarge);
    }

    let mut body = req.into_body();
    let mut buffer = Vec::with_capacity(declared.unwrap_or(0));
    while let Some(chunk) = body.data().await {
        let chunk = chunk.map_err(BodyError::Read)?;
        if buffer.len() + chunk.len() > limit {
            return Err(BodyError::TooLarge);
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok(buffer)
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Body> {
    match serde_json::to_vec(value) {
        Ok(body) => {
            let mut response = Response::new(Body::from(body));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(err) => {
            error!(error = %err, "Failed to encode response body");
            empty_response(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn empty_response(status: StatusCode) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}
