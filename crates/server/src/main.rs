//! InferaDB issue detector server binary.
//!
//! Runs the name-conflict detector behind the admin HTTP surface. The
//! metadata client submits changes to `POST /v1/feed`; operators read
//! `GET /v1/issues`.
//!
//! # Usage
//!
//! ```bash
//! # Local development
//! inferadb-issues --listen 127.0.0.1:8180 --log-format text
//!
//! # From a file, with environment overrides
//! INFERADB__ISSUES__DETECTOR__WORKERS=8 \
//! INFERADB__ISSUES__METRICS_ADDR=0.0.0.0:9180 \
//! inferadb-issues --config /etc/inferadb/issues.toml
//!
//! # Print the configuration schema or an example file
//! inferadb-issues config schema
//! inferadb-issues config example
//! ```

use std::{io::IsTerminal, net::SocketAddr, sync::Arc};

use clap::Parser;
use inferadb_issues_detector::Detector;
use inferadb_issues_server::{
    api,
    config::{self, Cli, CliCommand, Config, ConfigAction, LoadError, LogFormat},
    shutdown,
};
use inferadb_issues_types::DetectorError;
use metrics_exporter_prometheus::PrometheusBuilder;
use snafu::{ResultExt, Snafu};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Top-level error type for the server binary.
#[derive(Debug, Snafu)]
enum ServerError {
    #[snafu(display("{source}"))]
    Config { source: LoadError },

    #[snafu(display("failed to start detector: {source}"))]
    Detector { source: DetectorError },

    #[snafu(display("failed to bind {addr}: {source}"))]
    Bind { addr: SocketAddr, source: std::io::Error },

    #[snafu(display("failed to install Prometheus exporter: {source}"))]
    Metrics { source: metrics_exporter_prometheus::BuildError },

    #[snafu(display("admin server error: {source}"))]
    Serve { source: std::io::Error },
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    let cli = Cli::parse();

    if let Some(command) = cli.command {
        match command {
            CliCommand::Config { action } => {
                let rendered = match action {
                    ConfigAction::Schema => config::generate_config_schema(),
                    ConfigAction::Example => config::generate_config_example(),
                }
                .context(ConfigSnafu)?;
                print!("{rendered}");
                return Ok(());
            },
        }
    }

    let config = Config::load(&cli.args).context(ConfigSnafu)?;

    init_logging(config.log_format);

    tracing::info!(
        listen_addr = %config.listen_addr,
        workers = config.detector.workers,
        classifier = ?config.detector.classifier.policy,
        config_file = ?config.config_file,
        "Starting InferaDB issue detector"
    );

    if !config.is_localhost_only() {
        tracing::warn!(
            "Admin API is reachable from other hosts and has no authentication. \
             Set --listen or INFERADB__ISSUES__LISTEN_ADDR to a loopback address \
             unless a proxy restricts access."
        );
    }

    if let Some(metrics_addr) = config.metrics_addr {
        init_metrics_exporter(metrics_addr)?;
    }

    let detector = Arc::new(Detector::spawn(config.detector.clone()).context(DetectorSnafu)?);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .context(BindSnafu { addr: config.listen_addr })?;

    tracing::info!(listen_addr = %config.listen_addr, "Admin API accepting connections");
    let server_result = axum::serve(listener, api::router(Arc::clone(&detector)))
        .with_graceful_shutdown(shutdown::drain_on(
            shutdown::shutdown_signal(),
            detector.phase_state(),
        ))
        .await;

    detector.shutdown().await;
    server_result.context(ServeSnafu)?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Initializes the logging system.
///
/// `Auto` picks JSON when stdout is not a terminal. The filter comes from
/// `RUST_LOG`, defaulting to `info`.
fn init_logging(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = match format {
        LogFormat::Json => true,
        LogFormat::Text => false,
        LogFormat::Auto => !std::io::stdout().is_terminal(),
    };

    if use_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().flatten_event(true).with_current_span(false))
            .init();
    } else {
        tracing_subscriber::registry().with(env_filter).with(fmt::layer()).init();
    }
}

/// Starts the Prometheus exporter's HTTP listener on `addr`.
fn init_metrics_exporter(addr: SocketAddr) -> Result<(), ServerError> {
    PrometheusBuilder::new().with_http_listener(addr).install().context(MetricsSnafu)?;
    tracing::info!(metrics_addr = %addr, "Prometheus metrics exporter started");
    Ok(())
}
