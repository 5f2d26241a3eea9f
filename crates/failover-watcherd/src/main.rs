// # failover-watcherd - Ownership Follower Daemon
//
// Watches the failover DNS record and drives a local workload from it:
// when the record points at this site's IP the workload runs, otherwise
// it is stopped. Only one site collects at a time, bounded by DNS
// propagation.
//
// ## Configuration
//
// - `DNS_RECORD`: record to watch
// - `DNS_SERVER`: specific DNS server (system resolver when unset)
// - `MY_IP`: this site's IP (falls back to `DR_IP`)
// - `CHECK_INTERVAL`: poll interval in seconds (default 15)
// - `WORKLOAD_KIND`: process, container, deployment
// - `WORKLOAD_COMMAND`: command line (process)
// - `WORKLOAD_CONTAINER`: container name (container)
// - `WORKLOAD_NAMESPACE`, `WORKLOAD_DEPLOYMENT`,
//   `WORKLOAD_REPLICAS_ACTIVE`, `WORKLOAD_REPLICAS_IDLE` (deployment)
// - `LOG_LEVEL`: trace, debug, info, warn, error

use anyhow::{Context, Result, bail};
use failover_core::config::{FollowerConfig, WorkloadConfig};
use failover_core::workload::{ContainerWorkload, DeploymentWorkload, ProcessWorkload};
use failover_core::{OwnershipFollower, RecordResolver, Workload};
use std::env;
use std::process::ExitCode;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("{} has an unparsable value: {}", key, raw)),
        Err(_) => Ok(default),
    }
}

fn config_from_env() -> Result<FollowerConfig> {
    let my_ip = env::var("MY_IP")
        .or_else(|_| env::var("DR_IP"))
        .context("MY_IP (or DR_IP) is required: the IP of this site")?;

    let workload = match env_or("WORKLOAD_KIND", "process").as_str() {
        "process" => WorkloadConfig::Process {
            command: env_or(
                "WORKLOAD_COMMAND",
                "otelcol-contrib --config /etc/otel/config.yaml",
            ),
        },
        "container" => WorkloadConfig::Container {
            name: env_or("WORKLOAD_CONTAINER", "otel-collector"),
        },
        "deployment" => WorkloadConfig::Deployment {
            namespace: env_or("WORKLOAD_NAMESPACE", "monitoring"),
            name: env_or("WORKLOAD_DEPLOYMENT", "otel-collector"),
            active_replicas: env_parse("WORKLOAD_REPLICAS_ACTIVE", 1)?,
            idle_replicas: env_parse("WORKLOAD_REPLICAS_IDLE", 0)?,
        },
        other => bail!(
            "WORKLOAD_KIND '{}' is not supported (process, container, deployment)",
            other
        ),
    };

    Ok(FollowerConfig {
        record: env_or("DNS_RECORD", "ingest.example.local"),
        server: match env::var("DNS_SERVER") {
            Ok(raw) if !raw.is_empty() => Some(
                raw.parse()
                    .map_err(|_| anyhow::anyhow!("DNS_SERVER is not an IP address: {}", raw))?,
            ),
            _ => None,
        },
        my_ip: my_ip
            .parse()
            .with_context(|| format!("MY_IP is not an IPv4 address: {}", my_ip))?,
        check_interval: env_parse("CHECK_INTERVAL", 15)?,
        workload,
    })
}

fn build_workload(cfg: &WorkloadConfig) -> Result<Box<dyn Workload>> {
    Ok(match cfg {
        WorkloadConfig::Process { command } => {
            Box::new(ProcessWorkload::new(command).map_err(|e| anyhow::anyhow!("{}", e))?)
        }
        WorkloadConfig::Container { name } => Box::new(ContainerWorkload::new(name)),
        WorkloadConfig::Deployment {
            namespace,
            name,
            active_replicas,
            idle_replicas,
        } => Box::new(DeploymentWorkload::new(
            namespace,
            name,
            *active_replicas,
            *idle_replicas,
        )),
    })
}

fn init_tracing() -> Result<()> {
    let level = match env_or("LOG_LEVEL", "info").to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => bail!(
            "LOG_LEVEL '{}' is not valid (trace, debug, info, warn, error)",
            other
        ),
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).context("cannot set tracing subscriber")?;
    Ok(())
}

fn main() -> ExitCode {
    let cfg = match config_from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return ExitCode::from(1);
        }
    };
    if let Err(e) = cfg.validate() {
        eprintln!("Configuration validation error: {}", e);
        return ExitCode::from(1);
    }
    if let Err(e) = init_tracing() {
        eprintln!("{:#}", e);
        return ExitCode::from(1);
    }

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to create tokio runtime: {}", e);
            return ExitCode::from(2);
        }
    };

    match rt.block_on(run(cfg)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(cfg: FollowerConfig) -> Result<()> {
    info!(
        record = %cfg.record,
        my_ip = %cfg.my_ip,
        check_interval = cfg.check_interval,
        "failover-watcherd starting"
    );

    let resolver = RecordResolver::new(&cfg.record, cfg.server)
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    let workload = build_workload(&cfg.workload)?;

    let mut follower = OwnershipFollower::new(cfg, Box::new(resolver), workload)
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    let shutdown = spawn_signal_listener()?;
    follower
        .run(shutdown)
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))
}

fn spawn_signal_listener() -> Result<tokio::sync::watch::Receiver<bool>> {
    let (tx, rx) = tokio::sync::watch::channel(false);

    #[cfg(unix)]
    {
        let mut sigterm = signal(SignalKind::terminate()).context("cannot install SIGTERM handler")?;
        let mut sigint = signal(SignalKind::interrupt()).context("cannot install SIGINT handler")?;
        tokio::spawn(async move {
            let received = tokio::select! {
                _ = sigterm.recv() => "SIGTERM",
                _ = sigint.recv() => "SIGINT",
            };
            info!(signal = received, "shutdown signal received");
            let _ = tx.send(true);
        });
    }

    #[cfg(not(unix))]
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = tx.send(true);
        }
    });

    Ok(rx)
}
