// # failover-syncd - Parity Reconciler Daemon
//
// Keeps the local datastore in parity with its peer at the other site,
// using the failover DNS record to decide which side is the source of
// truth. Progress is snapshotted to a JSON state file that operators
// read to decide when failback is safe.
//
// ## Configuration
//
// ### Core
// - `ROLE`: this site's role (primary, dr)
// - `STORE`: clickhouse, victoriametrics
// - `DNS_RECORD`, `DNS_SERVER`, `PRIMARY_IP`, `DR_IP`
// - `CHECK_INTERVAL`: seconds between cycles
// - `EXCLUDE_PATTERNS`: comma-separated collection globs
// - `FAILBACK_CLEAN_CHECKS`: clean cycles before failback is declared safe
// - `AUTO_CREATE_UNITS`: create collections that exist only remotely
// - `STATE_FILE`: path of the durable progress snapshot
//
// ### Datastore endpoints
// - `LOCAL_URL`, `REMOTE_URL`
// - `LOCAL_USER`, `LOCAL_PASSWORD`, `REMOTE_USER`, `REMOTE_PASSWORD`
//   (clickhouse)
// - `REMOTE_NATIVE_HOST`, `REMOTE_NATIVE_PORT`, `CONNECT_TIMEOUT_MS`,
//   `MAX_INSERT_THREADS` (clickhouse)
// - `QUERY_WINDOW`, `QUERY_STEP`, `GAP_THRESHOLD`, `CHUNK_SIZE`
//   (victoriametrics)
//
// ### Notifications
// - `NOTIFY_WEBHOOK` plus `NOTIFY_ON_GAP`, `NOTIFY_ON_SYNC`,
//   `NOTIFY_ON_FAILBACK_READY`, `NOTIFY_ON_NEW_UNIT`
//
// ### Logging
// - `LOG_LEVEL`: trace, debug, info, warn, error

mod notify;

use anyhow::{Context, Result, bail};
use failover_core::config::{NotifyConfig, ReconcilerConfig, Role};
use failover_core::traits::{NoopNotifier, Notifier, UnitStore};
use failover_core::{ParityReconciler, RecordResolver};
use failover_store_clickhouse::{ClickhouseStore, Endpoint};
use failover_store_victoriametrics::VictoriaMetricsStore;
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

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => matches!(raw.to_lowercase().as_str(), "true" | "1" | "yes"),
        Err(_) => default,
    }
}

const DEFAULT_EXCLUDES: &str =
    "system.*,INFORMATION_SCHEMA.*,information_schema.*,_*,*_temp,*_staging";

fn config_from_env() -> Result<ReconcilerConfig> {
    let role: Role = env_or("ROLE", "primary")
        .parse()
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    let exclude_patterns = env_or("EXCLUDE_PATTERNS", DEFAULT_EXCLUDES)
        .split(',')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();

    Ok(ReconcilerConfig {
        role,
        record: env_or("DNS_RECORD", "ingest.example.local"),
        server: match env::var("DNS_SERVER") {
            Ok(raw) if !raw.is_empty() => Some(
                raw.parse()
                    .map_err(|_| anyhow::anyhow!("DNS_SERVER is not an IP address: {}", raw))?,
            ),
            _ => None,
        },
        primary_ip: env_or("PRIMARY_IP", "10.10.10.10")
            .parse()
            .context("PRIMARY_IP is not an IPv4 address")?,
        dr_ip: env_or("DR_IP", "10.20.20.10")
            .parse()
            .context("DR_IP is not an IPv4 address")?,
        check_interval: env_parse("CHECK_INTERVAL", 300)?,
        exclude_patterns,
        failback_clean_checks: env_parse("FAILBACK_CLEAN_CHECKS", 3)?,
        auto_create_units: env_bool("AUTO_CREATE_UNITS", false),
        state_file: env_or("STATE_FILE", "/state/sync-state.json").into(),
        notify: NotifyConfig {
            webhook: env::var("NOTIFY_WEBHOOK").ok().filter(|url| !url.is_empty()),
            on_gap: env_bool("NOTIFY_ON_GAP", true),
            on_sync: env_bool("NOTIFY_ON_SYNC", true),
            on_failback_ready: env_bool("NOTIFY_ON_FAILBACK_READY", true),
            on_new_unit: env_bool("NOTIFY_ON_NEW_UNIT", true),
        },
    })
}

fn store_from_env() -> Result<Box<dyn UnitStore>> {
    match env_or("STORE", "clickhouse").as_str() {
        "clickhouse" => {
            let local = Endpoint {
                url: env_or("LOCAL_URL", "http://localhost:8123")
                    .trim_end_matches('/')
                    .to_string(),
                user: env_or("LOCAL_USER", "default"),
                password: env_or("LOCAL_PASSWORD", ""),
            };
            let remote = Endpoint {
                url: env_or("REMOTE_URL", "http://localhost:8124")
                    .trim_end_matches('/')
                    .to_string(),
                user: env_or("REMOTE_USER", "default"),
                password: env_or("REMOTE_PASSWORD", ""),
            };
            let store = ClickhouseStore::new(
                local,
                remote,
                env_or("REMOTE_NATIVE_HOST", "localhost"),
                env_parse("REMOTE_NATIVE_PORT", 9000)?,
                env_parse("CONNECT_TIMEOUT_MS", 2000)?,
                env_parse("MAX_INSERT_THREADS", 4)?,
            )
            .map_err(|e| anyhow::anyhow!("{}", e))?;
            Ok(Box::new(store))
        }
        "victoriametrics" => {
            let store = VictoriaMetricsStore::new(
                env_or("LOCAL_URL", "http://localhost:8428"),
                env_or("REMOTE_URL", "http://localhost:8429"),
                env_parse("QUERY_WINDOW", 3600)?,
                env_parse("QUERY_STEP", 300)?,
                env_parse("GAP_THRESHOLD", 0.9)?,
                env_parse("CHUNK_SIZE", 300)?,
            )
            .map_err(|e| anyhow::anyhow!("{}", e))?;
            Ok(Box::new(store))
        }
        other => bail!(
            "STORE '{}' is not supported (clickhouse, victoriametrics)",
            other
        ),
    }
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

async fn run(cfg: ReconcilerConfig) -> Result<()> {
    let store = store_from_env()?;
    let resolver =
        RecordResolver::new(&cfg.record, cfg.server).map_err(|e| anyhow::anyhow!("{}", e))?;

    let notifier: Box<dyn Notifier> = match &cfg.notify.webhook {
        Some(url) => Box::new(notify::WebhookNotifier::new(url)?),
        None => Box::new(NoopNotifier),
    };

    info!(
        role = %cfg.role,
        store = store.store_name(),
        record = %cfg.record,
        state_file = %cfg.state_file.display(),
        "failover-syncd starting"
    );

    let mut reconciler = ParityReconciler::new(cfg, store, Box::new(resolver), notifier)
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    let shutdown = spawn_signal_listener()?;
    reconciler
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
