//! # FastFlight CLI
//!
//! Command-line entrypoint for running the Arrow Flight streaming server, the
//! HTTP gateway, or both together as a supervised pair of subprocesses.
//!
//! ## Usage
//!
//! ```bash
//! # Run just the Flight server
//! fastflight-cli start-flight-server --port 8815
//!
//! # Run just the HTTP gateway (talks to an already-running Flight server)
//! fastflight-cli start-rest-server --port 8080
//!
//! # Run both, supervised: Ctrl-C forwards SIGINT to each child
//! fastflight-cli start-all
//! ```

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fastflight_core::{AppSettings, ClientPoolConfig, FlightServerConfig, GatewayConfig, Registry};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(name = "fastflight-cli")]
#[command(about = "Run the FastFlight streaming server and/or its HTTP gateway")]
struct Args {
    /// Optional config file (YAML/TOML/JSON; format inferred from extension).
    /// Environment variables prefixed `FASTFLIGHT__` always take priority.
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run only the Arrow Flight streaming server (`do_get` over gRPC).
    StartFlightServer {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run only the HTTP gateway. Expects a Flight server reachable at
    /// `gateway.flight_endpoint`.
    StartRestServer {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run the Flight server and the HTTP gateway together as supervised
    /// subprocesses of this same binary.
    StartAll {
        /// How long to wait after a forwarded SIGTERM before killing a child
        /// that hasn't exited.
        #[arg(long, default_value_t = 10)]
        grace_period_secs: u64,
    },
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    let settings = AppSettings::load(args.config.as_deref()).context("loading configuration")?;

    match args.command {
        Command::StartFlightServer { host, port } => start_flight_server(overlay_flight(settings.flight_server, host, port)).await,
        Command::StartRestServer { host, port } => start_rest_server(overlay_gateway(settings.gateway, host, port), settings.client).await,
        Command::StartAll { grace_period_secs } => start_all(Duration::from_secs(grace_period_secs)).await,
    }
}

fn overlay_flight(mut config: FlightServerConfig, host: Option<String>, port: Option<u16>) -> FlightServerConfig {
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    config
}

fn overlay_gateway(mut config: GatewayConfig, host: Option<String>, port: Option<u16>) -> GatewayConfig {
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    config
}

async fn start_flight_server(config: FlightServerConfig) -> Result<()> {
    let registry = Registry::new();
    let sql_ctx = datafusion::prelude::SessionContext::new();
    fastflight_services::register_builtin_services(&registry, sql_ctx, None)?;

    fastflight_server::serve(Arc::new(registry), config).await
}

async fn start_rest_server(config: GatewayConfig, client_config: ClientPoolConfig) -> Result<()> {
    let client = fastflight_client::FastFlightClient::connect(&config.flight_endpoint, client_config).await?;

    // The gateway runs as a separate process from the Flight server it forwards
    // to (no RPC exposes the server's registered tags), so it builds its own
    // registry from the same built-in set purely to answer `GET /params`; `do_get`
    // itself never touches this registry, only the pooled client.
    let registry = Registry::new();
    fastflight_services::register_builtin_services(&registry, datafusion::prelude::SessionContext::new(), None)?;
    let registry = Arc::new(registry);

    let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("installing the Prometheus metrics recorder")?;

    let state = fastflight_gateway::GatewayState::new(Arc::new(client), registry, config, Some(handle));
    fastflight_gateway::serve(state).await
}

/// Spawns `start-flight-server` and `start-rest-server` as children of this same
/// binary and forwards `SIGINT`/`SIGTERM` to both, killing any child that
/// hasn't exited within `grace_period` of being signalled.
async fn start_all(grace_period: Duration) -> Result<()> {
    let exe = std::env::current_exe().context("resolving our own executable path")?;

    let mut flight_child = tokio::process::Command::new(&exe)
        .arg("start-flight-server")
        .stdin(Stdio::null())
        .spawn()
        .context("spawning start-flight-server child")?;

    let mut rest_child = tokio::process::Command::new(&exe)
        .arg("start-rest-server")
        .stdin(Stdio::null())
        .spawn()
        .context("spawning start-rest-server child")?;

    let shutdown = wait_for_shutdown_signal();

    tokio::select! {
        _ = shutdown => {
            tracing::info!("shutdown signal received, stopping children");
            terminate(&mut flight_child, "start-flight-server", grace_period).await;
            terminate(&mut rest_child, "start-rest-server", grace_period).await;
        }
        status = flight_child.wait() => {
            tracing::warn!(?status, "start-flight-server exited unexpectedly");
            terminate(&mut rest_child, "start-rest-server", grace_period).await;
        }
        status = rest_child.wait() => {
            tracing::warn!(?status, "start-rest-server exited unexpectedly");
            terminate(&mut flight_child, "start-flight-server", grace_period).await;
        }
    }

    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt()).expect("installing SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("installing SIGTERM handler");
    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

async fn terminate(child: &mut tokio::process::Child, name: &str, grace_period: Duration) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        let pid = nix::unistd::Pid::from_raw(pid.try_into().expect("child pid does not fit in pid_t"));
        if let Err(e) = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM) {
            tracing::warn!(%name, error = %e, "failed to send SIGTERM to child");
        }
    }

    match tokio::time::timeout(grace_period, child.wait()).await {
        Ok(Ok(status)) => tracing::info!(%name, ?status, "child exited"),
        Ok(Err(e)) => tracing::warn!(%name, error = %e, "error waiting for child"),
        Err(_) => {
            tracing::warn!(%name, "child did not exit within grace period, killing");
            let _ = child.kill().await;
        }
    }
}
