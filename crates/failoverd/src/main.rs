// # failoverd - Failover Controller Daemon
//
// Thin wiring around failover-core: read configuration from environment
// variables, register providers and probes, and either run the
// role-specific heartbeat loop or execute a one-shot admin command.
//
// ## Configuration
//
// All configuration is via environment variables:
//
// ### Core
// - `ROLE`: this site's role (primary, dr)
// - `DNS_RECORD`, `DNS_ZONE`, `DNS_TTL`, `DNS_SERVER`
// - `PRIMARY_IP`, `DR_IP`
// - `LEASE_TTL`, `UPDATE_INTERVAL`, `FAIL_THRESHOLD`
//
// ### Provider
// - `DNS_PROVIDER`: file, rfc2136, cloudflare, script
// - `FILE_PROVIDER_PATH` (file)
// - `RFC2136_AUTH` (tsig, gss), `TSIG_KEYFILE` (rfc2136)
// - `CLOUDFLARE_API_TOKEN`, `CLOUDFLARE_ZONE_ID` (cloudflare)
// - `SCRIPT_SET`, `SCRIPT_GET` (script)
//
// ### Health probe (used by the DR loop)
// - `HEALTH_MODE`: tcp, metrics
// - `HEALTH_HOST`, `HEALTH_PORT`, `HEALTH_TIMEOUT` (tcp)
// - `HEALTH_URL`, `HEALTH_METRIC`, `HEALTH_STALE_COUNT` (metrics)
//
// ### Logging
// - `LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Commands
//
// `run` (default) starts the heartbeat loop; `init`, `promote`,
// `failback` and `show` are one-shot record operations; `validate`
// checks the configuration and exits.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use failover_core::config::{
    FailoverConfig, HealthConfig, ProviderConfig, RecordSpec, Rfc2136Auth, Role,
};
use failover_core::{FailoverController, ProviderRegistry};
use std::env;
use std::process::ExitCode;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

#[derive(Parser)]
#[command(
    name = "failoverd",
    about = "DNS-coordinated active/passive failover controller"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Run the role-specific heartbeat loop (default)
    Run,
    /// Seed the record pair with primary as owner
    Init,
    /// Force DR as owner
    Promote,
    /// Force primary as owner
    Failback,
    /// Print the current record pair as JSON
    Show,
    /// Validate configuration and exit
    Validate,
}

/// Exit codes: 0 success, 1 configuration or command failure, 2 for a
/// heartbeat loop dying unexpectedly
#[derive(Debug, Clone, Copy)]
enum DaemonExitCode {
    Success = 0,
    Failure = 1,
    RuntimeError = 2,
}

impl From<DaemonExitCode> for ExitCode {
    fn from(code: DaemonExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

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

fn env_required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{} is required", key))
}

/// Assemble the controller configuration from the environment
fn config_from_env() -> Result<FailoverConfig> {
    let role: Role = env_or("ROLE", "primary")
        .parse()
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    let record = RecordSpec {
        record: env_or("DNS_RECORD", "ingest.example.local"),
        zone: env_or("DNS_ZONE", "example.local"),
        server: match env::var("DNS_SERVER") {
            Ok(raw) if !raw.is_empty() => Some(
                raw.parse()
                    .map_err(|_| anyhow::anyhow!("DNS_SERVER is not an IP address: {}", raw))?,
            ),
            _ => None,
        },
        ttl: env_parse("DNS_TTL", 30)?,
    };

    let provider = match env_or("DNS_PROVIDER", "file").as_str() {
        "file" => ProviderConfig::File {
            path: env_or("FILE_PROVIDER_PATH", "/state/zone.json").into(),
        },
        "rfc2136" => ProviderConfig::Rfc2136 {
            auth: match env_or("RFC2136_AUTH", "tsig").as_str() {
                "tsig" => Rfc2136Auth::Tsig {
                    keyfile: env_or("TSIG_KEYFILE", "/secrets/tsig.key").into(),
                },
                "gss" => Rfc2136Auth::Gss,
                other => bail!("RFC2136_AUTH '{}' is not supported (tsig, gss)", other),
            },
        },
        "cloudflare" => ProviderConfig::Cloudflare {
            api_token: env_required("CLOUDFLARE_API_TOKEN")?,
            zone_id: env_required("CLOUDFLARE_ZONE_ID")?,
        },
        "script" => ProviderConfig::Script {
            set_command: env_required("SCRIPT_SET")?.into(),
            get_command: env_required("SCRIPT_GET")?.into(),
        },
        other => bail!(
            "DNS_PROVIDER '{}' is not supported (file, rfc2136, cloudflare, script)",
            other
        ),
    };

    let health = match env_or("HEALTH_MODE", "tcp").as_str() {
        "tcp" => HealthConfig::Tcp {
            host: env_or("HEALTH_HOST", "10.10.10.10"),
            port: env_parse("HEALTH_PORT", 6514)?,
            timeout_secs: env_parse("HEALTH_TIMEOUT", 2)?,
        },
        "metrics" => HealthConfig::Metrics {
            url: env_required("HEALTH_URL")?,
            metric: env_or("HEALTH_METRIC", "otelcol_receiver_accepted_metric_points"),
            stale_count: env_parse("HEALTH_STALE_COUNT", 3)?,
            timeout_secs: env_parse("HEALTH_TIMEOUT", 2)?,
        },
        other => bail!("HEALTH_MODE '{}' is not supported (tcp, metrics)", other),
    };

    Ok(FailoverConfig {
        role,
        record,
        primary_ip: env_or("PRIMARY_IP", "10.10.10.10")
            .parse()
            .context("PRIMARY_IP is not an IPv4 address")?,
        dr_ip: env_or("DR_IP", "10.20.20.10")
            .parse()
            .context("DR_IP is not an IPv4 address")?,
        lease_ttl: env_parse("LEASE_TTL", 60)?,
        update_interval: env_parse("UPDATE_INTERVAL", 10)?,
        fail_threshold: env_parse("FAIL_THRESHOLD", 3)?,
        provider,
        health,
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

/// Register the built-in providers and probes
fn build_registry(cfg: &FailoverConfig) -> ProviderRegistry {
    let registry = ProviderRegistry::new();
    registry.register_provider(
        "file",
        Box::new(failover_core::registry::FileProviderFactory),
    );
    registry.register_probe("tcp", Box::new(failover_core::registry::TcpProbeFactory));
    failover_provider_cloudflare::register(&registry);
    failover_provider_rfc2136::register(
        &registry,
        cfg.record
            .server
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "127.0.0.1".to_string()),
    );
    failover_provider_script::register(&registry);
    failover_probe_metrics::register(&registry);
    registry
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Run);

    let cfg = match config_from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return DaemonExitCode::Failure.into();
        }
    };

    if let Command::Validate = command {
        return match cfg.validate() {
            Ok(()) => {
                println!("Configuration valid");
                let summary = serde_json::json!({
                    "role": cfg.role,
                    "provider": cfg.provider.type_name(),
                    "dns_record": cfg.record.record,
                    "primary_ip": cfg.primary_ip,
                    "dr_ip": cfg.dr_ip,
                });
                println!("{}", serde_json::to_string_pretty(&summary).unwrap());
                DaemonExitCode::Success.into()
            }
            Err(e) => {
                eprintln!("Configuration invalid: {}", e);
                DaemonExitCode::Failure.into()
            }
        };
    }

    if let Err(e) = cfg.validate() {
        eprintln!("Configuration validation error: {}", e);
        return DaemonExitCode::Failure.into();
    }

    if let Err(e) = init_tracing() {
        eprintln!("{:#}", e);
        return DaemonExitCode::Failure.into();
    }

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to create tokio runtime: {}", e);
            return DaemonExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        match run_command(command, cfg).await {
            Ok(()) => DaemonExitCode::Success,
            Err(e) => {
                error!("{:#}", e);
                match command {
                    // A heartbeat loop is not supposed to return.
                    Command::Run => DaemonExitCode::RuntimeError,
                    _ => DaemonExitCode::Failure,
                }
            }
        }
    })
    .into()
}

async fn run_command(command: Command, cfg: FailoverConfig) -> Result<()> {
    let registry = build_registry(&cfg);

    let provider = registry
        .create_provider(&cfg.provider, &cfg.record)
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    let probe = registry
        .create_probe(&cfg.health)
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    info!(
        role = %cfg.role,
        provider = provider.provider_name(),
        record = %cfg.record.record,
        "failoverd starting"
    );

    let controller =
        FailoverController::new(cfg, provider, probe).map_err(|e| anyhow::anyhow!("{}", e))?;

    match command {
        Command::Run => {
            let shutdown = spawn_signal_listener()?;
            controller
                .run(shutdown)
                .await
                .map_err(|e| anyhow::anyhow!("{}", e))?;
        }
        Command::Init => controller.init().await.map_err(|e| anyhow::anyhow!("{}", e))?,
        Command::Promote => controller
            .promote()
            .await
            .map_err(|e| anyhow::anyhow!("{}", e))?,
        Command::Failback => controller
            .failback()
            .await
            .map_err(|e| anyhow::anyhow!("{}", e))?,
        Command::Show => {
            let status = controller.status().await.map_err(|e| anyhow::anyhow!("{}", e))?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Validate => unreachable!("validate handled before wiring"),
    }

    Ok(())
}

/// Flip a shared flag on SIGTERM/SIGINT; the loops finish their current
/// tick and exit.
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
