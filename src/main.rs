use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Result, anyhow, bail};
use clap::{CommandFactory, Parser, Subcommand, ValueHint};
use clap_complete::Shell;
use pipeline_parser::model::{Pipeline, expand_patterns};
use pipeline_parser::observability::{MetricsCollector, log_snapshot};
use pipeline_parser::report::{FileOutcome, write_report};
use pipeline_parser::response::parse_pipeline;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, prelude::*};

#[cfg(feature = "server")]
use anyhow::Context;
#[cfg(feature = "server")]
use pipeline_parser::config::ServerConfig;
#[cfg(feature = "server")]
use pipeline_parser::server::PipelineServer;

#[cfg(feature = "otel")]
use opentelemetry::KeyValue;
#[cfg(feature = "otel")]
use opentelemetry_otlp::WithExportConfig;
#[cfg(feature = "otel")]
use opentelemetry_sdk::{resource::Resource, trace as sdktrace};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let otlp_endpoint_for_tracing = cli.command.as_ref().and_then(|command| match command {
        Commands::Serve { otlp_endpoint, .. } => otlp_endpoint.clone(),
        _ => None,
    });

    configure_tracing(otlp_endpoint_for_tracing.as_deref())?;

    let command_result: Result<()> = match cli.command {
        Some(Commands::Serve {
            config,
            listen,
            max_body_bytes,
            otlp_endpoint: _,
        }) => serve(config, listen, max_body_bytes),
        Some(Commands::Validate {
            patterns,
            report,
            strict,
            print_metrics,
        }) => validate_files(&patterns, report, strict, print_metrics),
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "pipeline-parser",
                &mut io::stdout(),
            );
            Ok(())
        }
        None => {
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    };

    #[cfg(feature = "otel")]
    if otlp_endpoint_for_tracing.is_some() {
        opentelemetry::global::shutdown_tracer_provider();
    }

    command_result
}

fn configure_tracing(otlp_endpoint: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    #[cfg(feature = "otel")]
    {
        if let Some(endpoint) = otlp_endpoint {
            let tracer =
                opentelemetry_otlp::new_pipeline()
                    .tracing()
                    .with_trace_config(sdktrace::Config::default().with_resource(Resource::new(
                        vec![KeyValue::new("service.name", "pipeline-parser")],
                    )))
                    .with_exporter(
                        opentelemetry_otlp::new_exporter()
                            .tonic()
                            .with_endpoint(endpoint),
                    )
                    .install_simple()?;

            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
                .with(tracing_opentelemetry::layer().with_tracer(tracer))
                .try_init()
                .map_err(|err| anyhow!(err.to_string()))?;
            return Ok(());
        }
    }

    #[cfg(not(feature = "otel"))]
    if let Some(endpoint) = otlp_endpoint {
        eprintln!(
            "warning: --otlp-endpoint '{}' requested but OpenTelemetry support is not enabled. Rebuild with --features otel.",
            endpoint
        );
    }

    // Logs go to stderr so `validate` output on stdout stays machine readable.
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .try_init()
        .map_err(|err| anyhow!(err.to_string()))?;

    Ok(())
}

#[cfg(feature = "server")]
fn serve(
    config_path: Option<PathBuf>,
    listen: Option<SocketAddr>,
    max_body_bytes: Option<usize>,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => ServerConfig::load(&path)?,
        None => ServerConfig::default(),
    };
    if let Some(addr) = listen {
        config.listen = addr;
    }
    if let Some(limit) = max_body_bytes {
        config.max_body_bytes = limit;
    }

    let collector = MetricsCollector::global().clone();
    let mut server = PipelineServer::start(&config, collector.clone())?;
    info!(
        address = %server.address(),
        max_body_bytes = config.max_body_bytes,
        allow_origin = config.cors.allow_origin.as_str(),
        "Serving pipeline parser API"
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build signal runtime")?;
    runtime
        .block_on(tokio::signal::ctrl_c())
        .context("Failed to listen for shutdown signal")?;

    info!("Shutdown signal received");
    server.stop();
    log_snapshot(&collector.snapshot());
    Ok(())
}

#[cfg(not(feature = "server"))]
fn serve(
    _config_path: Option<PathBuf>,
    _listen: Option<SocketAddr>,
    _max_body_bytes: Option<usize>,
) -> Result<()> {
    bail!("HTTP server support is not enabled. Rebuild with --features server.")
}

fn validate_files(
    patterns: &[String],
    report: Option<PathBuf>,
    strict: bool,
    print_metrics: bool,
) -> Result<()> {
    let files = expand_patterns(patterns)?;
    let metrics = MetricsCollector::new();
    let mut outcomes = Vec::new();
    let mut failures = 0usize;

    for path in &files {
        let pipeline = match Pipeline::load(path) {
            Ok(pipeline) => pipeline,
            Err(err) => {
                failures += 1;
                error!(file = %path.display(), "Failed to load pipeline: {err:#}");
                if report.is_some() {
                    outcomes.push(FileOutcome::load_failure(path, &err));
                }
                continue;
            }
        };

        let response = parse_pipeline(&pipeline, &metrics);
        println!("{}: {}", path.display(), serde_json::to_string(&response)?);

        if response.is_error() {
            failures += 1;
            error!(file = %path.display(), "Pipeline failed validation");
        } else if response.is_dag() == Some(false) {
            if strict {
                failures += 1;
                error!(file = %path.display(), "Pipeline contains a cycle");
            } else {
                warn!(file = %path.display(), "Pipeline contains a cycle");
            }
        } else {
            info!(file = %path.display(), "Pipeline is a valid DAG");
        }

        if report.is_some() {
            outcomes.push(FileOutcome::new(path, response)?);
        }
    }

    if let Some(path) = report {
        write_report(&path, outcomes)?;
        info!(report = %path.display(), "Validation report written");
    }

    if print_metrics {
        log_snapshot(&metrics.snapshot());
    }

    if failures > 0 {
        bail!("Validation failed for {failures} pipeline file(s)");
    }

    Ok(())
}

#[derive(Parser)]
#[command(
    name = "pipeline-parser",
    version,
    about = "Validates pipeline graphs and reports whether they are acyclic"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API until interrupted.
    Serve {
        #[arg(long, value_hint = ValueHint::FilePath)]
        config: Option<PathBuf>,
        #[arg(long)]
        listen: Option<SocketAddr>,
        #[arg(long = "max-body-bytes")]
        max_body_bytes: Option<usize>,
        #[arg(long = "otlp-endpoint")]
        otlp_endpoint: Option<String>,
    },
    /// Validate pipeline files (JSON or YAML) matching the given globs.
    Validate {
        #[arg(required = true, value_hint = ValueHint::FilePath)]
        patterns: Vec<String>,
        #[arg(long)]
        report: Option<PathBuf>,
        /// Treat cyclic pipelines as failures.
        #[arg(long)]
        strict: bool,
        #[arg(long)]
        print_metrics: bool,
    },
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}
