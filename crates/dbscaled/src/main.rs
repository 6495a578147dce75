//! dbscaled — the dbscale daemon.
//!
//! Single binary that assembles the autoscaler:
//! - State store (redb)
//! - Atlas client (metrics source + resize control)
//! - Alert dispatcher
//! - Controller (evaluation, guard, decisions, execution)
//! - REST API + Prometheus exposition
//!
//! # Usage
//!
//! ```text
//! dbscaled --config dbscale.toml run --port 8080
//! dbscaled check orders
//! dbscaled force-scale orders:M40
//! ```

mod daemon;
mod offline;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::{info, warn};

use dbscale_core::ScalerConfig;

#[derive(Parser)]
#[command(name = "dbscaled", about = "Database cluster autoscaler")]
struct Cli {
    /// Configuration file.
    #[arg(long, short, global = true, default_value = "dbscale.toml")]
    config: PathBuf,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control loop continuously and serve the REST API.
    Run {
        /// Port to listen on.
        #[arg(long, default_value = "8080")]
        port: u16,

        /// Address to bind.
        #[arg(long, default_value = "0.0.0.0")]
        bind: IpAddr,
    },
    /// Evaluate once and print the reports as JSON.
    Check {
        /// Only this cluster.
        cluster: Option<String>,
    },
    /// Print persisted cluster state as JSON without contacting the API.
    Status {
        cluster: Option<String>,

        /// Recent events per cluster.
        #[arg(long, default_value = "10")]
        limit: usize,
    },
    /// Resize a cluster to an explicit tier, bypassing guards.
    ForceScale {
        /// `CLUSTER:SIZE`, e.g. `orders:M40`.
        target: ForceTarget,
    },
    /// Resume automatic scaling for a cluster.
    Enable { cluster: String },
    /// Pause automatic scaling for a cluster.
    Disable { cluster: String },
    /// Write a sample configuration file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone)]
struct ForceTarget {
    cluster: String,
    size: String,
}

impl FromStr for ForceTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((cluster, size)) if !cluster.is_empty() && !size.is_empty() => Ok(Self {
                cluster: cluster.to_string(),
                size: size.to_string(),
            }),
            _ => Err(format!("expected CLUSTER:SIZE, got `{s}`")),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::InitConfig { force } => init_config(&cli.config, force),
        Command::Status { cluster, limit } => {
            let config = load_config(&cli.config)?;
            let statuses = offline::status(&config, cluster.as_deref(), limit)?;
            print_json(&statuses)
        }
        Command::Run { port, bind } => {
            let config = load_config(&cli.config)?;
            run(config, SocketAddr::new(bind, port)).await
        }
        Command::Check { cluster } => {
            let config = load_config(&cli.config)?;
            let mut daemon = daemon::Daemon::build(&config, cluster.as_deref()).await?;
            let reports = daemon.controller.run_once(cluster.as_deref()).await?;
            daemon.finish().await;
            print_json(&reports)
        }
        Command::ForceScale { target } => {
            let config = load_config(&cli.config)?;
            let mut daemon = daemon::Daemon::build(&config, Some(&target.cluster)).await?;
            let event = daemon
                .controller
                .force_scale(&target.cluster, &target.size)
                .await?;
            daemon.finish().await;
            print_json(&event)?;
            match &event.error {
                Some(err) => anyhow::bail!("resize failed ({:?}): {}", err.class, err.detail),
                None => Ok(()),
            }
        }
        Command::Enable { cluster } => toggle(&cli.config, &cluster, true).await,
        Command::Disable { cluster } => toggle(&cli.config, &cluster, false).await,
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,dbscale=debug"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load_config(path: &std::path::Path) -> anyhow::Result<ScalerConfig> {
    let config = ScalerConfig::from_file(path)
        .with_context(|| format!("loading {}", path.display()))?;
    info!(path = %path.display(), clusters = config.clusters.len(), "configuration loaded");
    Ok(config)
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_config(path: &std::path::Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    std::fs::write(path, ScalerConfig::scaffold().to_toml_string()?)
        .with_context(|| format!("writing {}", path.display()))?;
    println!("wrote {}", path.display());
    Ok(())
}

async fn toggle(path: &std::path::Path, cluster: &str, enabled: bool) -> anyhow::Result<()> {
    let config = load_config(path)?;
    if !config.state.persist {
        warn!("state persistence is disabled; the change only lasts for this invocation");
    }
    let mut daemon = daemon::Daemon::build(&config, Some(cluster)).await?;
    let status = daemon.controller.set_enabled(cluster, enabled)?;
    daemon.finish().await;
    print_json(&status)
}

async fn run(config: ScalerConfig, addr: SocketAddr) -> anyhow::Result<()> {
    info!("dbscale daemon starting");

    let daemon = daemon::Daemon::build(&config, None).await?;
    let router = dbscale_api::build_router(daemon.controller.handle());

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Control loop ───────────────────────────────────────────

    let daemon::Daemon {
        controller,
        alert_worker,
        alert_drain,
    } = daemon;
    let controller_handle = tokio::spawn(controller.run(shutdown_rx));

    // ── API server ─────────────────────────────────────────────

    info!(%addr, "API server starting");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for ctrl-c; shutting down");
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    // Controller exit drops the last dispatcher, which lets the alert
    // worker drain and stop.
    let _ = controller_handle.await;
    daemon::drain_alerts(alert_worker, alert_drain).await;

    info!("dbscale daemon stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn force_target_parses() {
        let t: ForceTarget = "orders:M40".parse().unwrap();
        assert_eq!(t.cluster, "orders");
        assert_eq!(t.size, "M40");
        assert!("orders".parse::<ForceTarget>().is_err());
        assert!(":M40".parse::<ForceTarget>().is_err());
        assert!("orders:".parse::<ForceTarget>().is_err());
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["dbscaled", "--log-format", "json", "force-scale", "orders:M30"])
            .unwrap();
        assert!(matches!(cli.log_format, LogFormat::Json));
        assert!(matches!(cli.command, Command::ForceScale { .. }));

        let cli = Cli::try_parse_from(["dbscaled", "status", "--limit", "3"]).unwrap();
        assert!(matches!(cli.command, Command::Status { cluster: None, limit: 3 }));
    }
}
