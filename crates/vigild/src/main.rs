//! vigild — the vigil daemon.
//!
//! Loads probes and reporters from a TOML file and either runs them on a
//! schedule or performs a single check.
//!
//! # Usage
//!
//! ```text
//! vigild run --config vigil.toml [--log-json]
//! vigild check --config vigil.toml
//! ```

mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{debug, error, info};
use vigil_core::CancellationToken;
use vigil_reporters::HttpReporter;

use crate::config::DaemonConfig;

#[derive(Parser)]
#[command(name = "vigild", about = "vigil health-check daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the configured probes until interrupted.
    Run {
        /// Path to the config file.
        #[arg(long, default_value = "vigil.toml")]
        config: PathBuf,

        /// Emit logs as JSON lines.
        #[arg(long)]
        log_json: bool,
    },
    /// Run every probe once, print the result and exit non-zero on failure.
    Check {
        /// Path to the config file.
        #[arg(long, default_value = "vigil.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run { config, log_json } => {
            init_tracing(log_json);
            run(config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Check { config } => {
            init_tracing(false);
            check(config).await
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,vigil=debug,vigild=debug"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(path: PathBuf) -> anyhow::Result<()> {
    let config = DaemonConfig::from_file(&path)?;
    info!(config = %path.display(), probes = config.probes.len(), "vigil daemon starting");

    let checker = config.build_checker().await?;
    let token = CancellationToken::new();

    let endpoint = match &config.reporters.http {
        Some(http) => {
            let reporter = HttpReporter::new(http.path.as_str());
            checker.add_reporter(reporter.clone()).await;
            let listener = TcpListener::bind(&http.addr)
                .await
                .with_context(|| format!("failed to bind status endpoint on {}", http.addr))?;
            let token = token.clone();
            Some(tokio::spawn(async move { reporter.serve(listener, token).await }))
        }
        None => None,
    };

    let grpc_endpoint = match &config.reporters.grpc {
        Some(grpc) => {
            let (reporter, service) = vigil_reporters::grpc::health_service();
            checker
                .add_reporter(reporter.with_service_names(grpc.services.iter().cloned()))
                .await;
            let listener = TcpListener::bind(&grpc.addr)
                .await
                .with_context(|| format!("failed to bind gRPC health service on {}", grpc.addr))?;
            let token = token.clone();
            Some(tokio::spawn(vigil_reporters::grpc::serve(service, listener, token)))
        }
        None => None,
    };

    let mut statuses = checker.start(token.clone()).await?;

    tokio::spawn({
        let token = token.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("shutdown signal received");
                    token.cancel();
                }
                Err(e) => error!(error = %e, "failed to listen for ctrl-c"),
            }
        }
    });

    while let Some(status) = statuses.recv().await {
        debug!(
            healthy = status.is_healthy(),
            failures = status.failures().len(),
            "status emitted"
        );
    }

    checker.wait().await;
    if let Some(endpoint) = endpoint {
        endpoint.await.context("status endpoint task failed")??;
    }
    if let Some(endpoint) = grpc_endpoint {
        endpoint.await.context("gRPC health service task failed")??;
    }

    info!("vigil daemon stopped");
    Ok(())
}

async fn check(path: PathBuf) -> anyhow::Result<ExitCode> {
    let config = DaemonConfig::from_file(&path)?;
    let checker = config.build_checker().await?;

    let status = checker.check_once().await;
    println!("{}", serde_json::to_string_pretty(&status)?);

    if status.is_healthy() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
