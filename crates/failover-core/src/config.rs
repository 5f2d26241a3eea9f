//! Configuration types for the failover system
//!
//! This module defines the configuration structures shared by the three
//! control loops. Loading from the environment lives in the daemon crates;
//! validation lives here so embedded users get the same checks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::str::FromStr;

/// Which site this process belongs to.
///
/// A role is fixed at process start and identifies the site, not the
/// currently active side; activity is whatever the DNS lease says.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The normally-active site
    Primary,
    /// The disaster-recovery site
    Dr,
}

impl Role {
    /// The other site
    pub fn peer(self) -> Self {
        match self {
            Role::Primary => Role::Dr,
            Role::Dr => Role::Primary,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Primary => "primary",
            Role::Dr => "dr",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(Role::Primary),
            "dr" => Ok(Role::Dr),
            other => Err(crate::Error::invalid_input(format!(
                "unknown role '{}' (expected 'primary' or 'dr')",
                other
            ))),
        }
    }
}

/// The authoritative record pair being coordinated on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordSpec {
    /// Fully qualified record name (e.g. "ingest.example.com")
    pub record: String,

    /// DNS zone the record lives in
    pub zone: String,

    /// Specific DNS server to talk to; system resolver when unset
    pub server: Option<IpAddr>,

    /// TTL applied to both the A and TXT records
    #[serde(default = "default_dns_ttl")]
    pub ttl: u32,
}

impl RecordSpec {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.record.is_empty() {
            return Err(crate::Error::config("DNS record name cannot be empty"));
        }
        if self.zone.is_empty() {
            return Err(crate::Error::config("DNS zone cannot be empty"));
        }
        Ok(())
    }
}

/// Failover controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverConfig {
    /// This process's site
    pub role: Role,

    /// Record pair to write and watch
    pub record: RecordSpec,

    /// IP advertised while primary owns the lease
    pub primary_ip: Ipv4Addr,

    /// IP advertised while DR owns the lease
    pub dr_ip: Ipv4Addr,

    /// Lease lifetime in seconds; must exceed the update interval
    #[serde(default = "default_lease_ttl")]
    pub lease_ttl: u64,

    /// Heartbeat period in seconds
    #[serde(default = "default_update_interval")]
    pub update_interval: u64,

    /// Consecutive failed probes before the DR considers primary down
    #[serde(default = "default_fail_threshold")]
    pub fail_threshold: u32,

    /// DNS provider to write through
    pub provider: ProviderConfig,

    /// Health probe the DR loop runs against the primary
    pub health: HealthConfig,
}

impl FailoverConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.record.validate()?;
        self.provider.validate()?;
        self.health.validate()?;

        if self.lease_ttl <= self.update_interval {
            return Err(crate::Error::config(format!(
                "lease_ttl ({}) must be greater than update_interval ({})",
                self.lease_ttl, self.update_interval
            )));
        }
        if self.fail_threshold == 0 {
            return Err(crate::Error::config("fail_threshold must be at least 1"));
        }
        Ok(())
    }

    /// The IP this role advertises when it owns the lease
    pub fn ip_for(&self, role: Role) -> Ipv4Addr {
        match role {
            Role::Primary => self.primary_ip,
            Role::Dr => self.dr_ip,
        }
    }
}

/// DNS provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Local JSON file, for tests and dry runs
    File {
        /// Path to the zone state file
        path: PathBuf,
    },

    /// RFC 2136 dynamic update via nsupdate
    Rfc2136 {
        /// Authentication mechanism for the update channel
        auth: Rfc2136Auth,
    },

    /// Cloudflare API v4
    Cloudflare {
        /// API token with DNS edit permissions
        api_token: String,
        /// Zone ID containing the record
        zone_id: String,
    },

    /// Caller-supplied set/get executables
    Script {
        /// Path to the executable that writes the record pair
        set_command: PathBuf,
        /// Path to the executable that reads the record pair
        get_command: PathBuf,
    },

    /// Custom provider resolved through the registry
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

/// Authentication for RFC 2136 updates
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Rfc2136Auth {
    /// TSIG shared key (`nsupdate -k`)
    Tsig {
        /// Path to the TSIG key file
        keyfile: PathBuf,
    },
    /// GSS-TSIG / Kerberos (`nsupdate -g`)
    Gss,
}

impl ProviderConfig {
    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ProviderConfig::File { path } => {
                if path.as_os_str().is_empty() {
                    return Err(crate::Error::config("file provider path cannot be empty"));
                }
                Ok(())
            }
            ProviderConfig::Rfc2136 { auth } => match auth {
                Rfc2136Auth::Tsig { keyfile } if !keyfile.exists() => Err(crate::Error::config(
                    format!("TSIG keyfile not found: {}", keyfile.display()),
                )),
                _ => Ok(()),
            },
            ProviderConfig::Cloudflare { api_token, zone_id } => {
                if api_token.is_empty() {
                    return Err(crate::Error::config("Cloudflare API token cannot be empty"));
                }
                if zone_id.is_empty() {
                    return Err(crate::Error::config("Cloudflare zone ID cannot be empty"));
                }
                Ok(())
            }
            ProviderConfig::Script {
                set_command,
                get_command,
            } => {
                for (name, path) in [("set", set_command), ("get", get_command)] {
                    if !path.exists() {
                        return Err(crate::Error::config(format!(
                            "script provider {} command not found: {}",
                            name,
                            path.display()
                        )));
                    }
                    #[cfg(unix)]
                    {
                        use std::os::unix::fs::PermissionsExt;
                        let mode = std::fs::metadata(path)
                            .map_err(|e| {
                                crate::Error::config(format!(
                                    "cannot stat {}: {}",
                                    path.display(),
                                    e
                                ))
                            })?
                            .permissions()
                            .mode();
                        if mode & 0o111 == 0 {
                            return Err(crate::Error::config(format!(
                                "script provider {} command not executable: {}",
                                name,
                                path.display()
                            )));
                        }
                    }
                }
                Ok(())
            }
            ProviderConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("custom provider factory cannot be empty"));
                }
                if config.is_null() {
                    return Err(crate::Error::config("custom provider config cannot be null"));
                }
                Ok(())
            }
        }
    }

    /// Get the provider type name
    pub fn type_name(&self) -> &str {
        match self {
            ProviderConfig::File { .. } => "file",
            ProviderConfig::Rfc2136 { .. } => "rfc2136",
            ProviderConfig::Cloudflare { .. } => "cloudflare",
            ProviderConfig::Script { .. } => "script",
            ProviderConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Health probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum HealthConfig {
    /// Liveness: TCP connect to the primary's ingest port
    Tcp {
        /// Host to connect to
        host: String,
        /// Port to connect to
        port: u16,
        /// Connect timeout in seconds
        #[serde(default = "default_health_timeout")]
        timeout_secs: u64,
    },

    /// Progress: a named counter in a metrics exposition must keep rising
    Metrics {
        /// Metrics endpoint, e.g. "http://10.10.10.10:8888/metrics"
        url: String,
        /// Counter name to watch
        metric: String,
        /// Flat or unreachable readings tolerated before unhealthy
        #[serde(default = "default_stale_count")]
        stale_count: u32,
        /// Fetch timeout in seconds
        #[serde(default = "default_health_timeout")]
        timeout_secs: u64,
    },
}

impl HealthConfig {
    /// Validate the probe configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            HealthConfig::Tcp { host, .. } => {
                if host.is_empty() {
                    return Err(crate::Error::config("health probe host cannot be empty"));
                }
                Ok(())
            }
            HealthConfig::Metrics {
                url,
                metric,
                stale_count,
                ..
            } => {
                if url.is_empty() {
                    return Err(crate::Error::config("health probe URL cannot be empty"));
                }
                if metric.is_empty() {
                    return Err(crate::Error::config("health probe metric cannot be empty"));
                }
                if *stale_count == 0 {
                    return Err(crate::Error::config("health stale_count must be at least 1"));
                }
                Ok(())
            }
        }
    }

    /// Get the probe type name
    pub fn type_name(&self) -> &str {
        match self {
            HealthConfig::Tcp { .. } => "tcp",
            HealthConfig::Metrics { .. } => "metrics",
        }
    }
}

/// Ownership follower configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowerConfig {
    /// Record to resolve
    pub record: String,

    /// Specific DNS server; system resolver when unset
    pub server: Option<IpAddr>,

    /// This site's IP; the workload runs while the record points here
    pub my_ip: Ipv4Addr,

    /// Poll interval in seconds
    #[serde(default = "default_follower_interval")]
    pub check_interval: u64,

    /// Side-effect driven on ownership edges
    pub workload: WorkloadConfig,
}

impl FollowerConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.record.is_empty() {
            return Err(crate::Error::config("follower record cannot be empty"));
        }
        if self.check_interval == 0 {
            return Err(crate::Error::config("follower check_interval must be > 0"));
        }
        self.workload.validate()
    }
}

/// Managed workload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkloadConfig {
    /// Spawn and supervise a local subprocess
    Process {
        /// Command line, whitespace-split
        command: String,
    },

    /// Start/stop an existing named container
    Container {
        /// Container name
        name: String,
    },

    /// Scale a deployment between two replica counts
    Deployment {
        /// Namespace the deployment lives in
        namespace: String,
        /// Deployment name
        name: String,
        /// Replicas while this site owns the record
        #[serde(default = "default_active_replicas")]
        active_replicas: u32,
        /// Replicas while it does not
        #[serde(default)]
        idle_replicas: u32,
    },
}

impl WorkloadConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            WorkloadConfig::Process { command } if command.trim().is_empty() => {
                Err(crate::Error::config("workload command cannot be empty"))
            }
            WorkloadConfig::Container { name } if name.is_empty() => {
                Err(crate::Error::config("workload container name cannot be empty"))
            }
            WorkloadConfig::Deployment { namespace, name, .. }
                if namespace.is_empty() || name.is_empty() =>
            {
                Err(crate::Error::config(
                    "workload deployment namespace and name cannot be empty",
                ))
            }
            _ => Ok(()),
        }
    }
}

/// Parity reconciler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// This process's site
    pub role: Role,

    /// Record resolved to determine the active site
    pub record: String,

    /// Specific DNS server; system resolver when unset
    pub server: Option<IpAddr>,

    /// IP identifying the primary site in the A record
    pub primary_ip: Ipv4Addr,

    /// IP identifying the DR site in the A record
    pub dr_ip: Ipv4Addr,

    /// Seconds between sync cycles
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,

    /// Glob patterns for collections to ignore
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Clean cycles required before failback is declared safe
    #[serde(default = "default_failback_clean_checks")]
    pub failback_clean_checks: u32,

    /// Create collections that exist only on the active side
    #[serde(default)]
    pub auto_create_units: bool,

    /// Where the durable sync state lives
    pub state_file: PathBuf,

    /// Webhook notification settings
    #[serde(default)]
    pub notify: NotifyConfig,
}

impl ReconcilerConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.record.is_empty() {
            return Err(crate::Error::config("reconciler record cannot be empty"));
        }
        if self.check_interval == 0 {
            return Err(crate::Error::config("reconciler check_interval must be > 0"));
        }
        // A single clean cycle can be a stale DNS read; require at least two.
        if self.failback_clean_checks < 2 {
            return Err(crate::Error::config(
                "failback_clean_checks must be at least 2",
            ));
        }
        for pattern in &self.exclude_patterns {
            glob::Pattern::new(pattern).map_err(|e| {
                crate::Error::config(format!("invalid exclude pattern '{}': {}", pattern, e))
            })?;
        }
        Ok(())
    }

    /// Map a resolved A-record IP to the site it identifies
    pub fn site_for_ip(&self, ip: Ipv4Addr) -> Option<Role> {
        if ip == self.primary_ip {
            Some(Role::Primary)
        } else if ip == self.dr_ip {
            Some(Role::Dr)
        } else {
            None
        }
    }
}

/// One-shot webhook notification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Webhook URL; notifications are disabled when unset
    pub webhook: Option<String>,

    #[serde(default = "default_true")]
    pub on_gap: bool,

    #[serde(default = "default_true")]
    pub on_sync: bool,

    #[serde(default = "default_true")]
    pub on_failback_ready: bool,

    #[serde(default = "default_true")]
    pub on_new_unit: bool,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook: None,
            on_gap: true,
            on_sync: true,
            on_failback_ready: true,
            on_new_unit: true,
        }
    }
}

fn default_dns_ttl() -> u32 {
    30
}

fn default_lease_ttl() -> u64 {
    60
}

fn default_update_interval() -> u64 {
    10
}

fn default_fail_threshold() -> u32 {
    3
}

fn default_health_timeout() -> u64 {
    2
}

fn default_stale_count() -> u32 {
    3
}

fn default_follower_interval() -> u64 {
    15
}

fn default_check_interval() -> u64 {
    120
}

fn default_failback_clean_checks() -> u32 {
    3
}

fn default_active_replicas() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller_config() -> FailoverConfig {
        FailoverConfig {
            role: Role::Primary,
            record: RecordSpec {
                record: "ingest.example.com".to_string(),
                zone: "example.com".to_string(),
                server: None,
                ttl: 30,
            },
            primary_ip: "10.10.10.10".parse().unwrap(),
            dr_ip: "10.20.20.10".parse().unwrap(),
            lease_ttl: 60,
            update_interval: 10,
            fail_threshold: 3,
            provider: ProviderConfig::File {
                path: "/state/zone.json".into(),
            },
            health: HealthConfig::Tcp {
                host: "10.10.10.10".to_string(),
                port: 6514,
                timeout_secs: 2,
            },
        }
    }

    #[test]
    fn valid_config_passes() {
        controller_config().validate().unwrap();
    }

    #[test]
    fn lease_ttl_must_exceed_update_interval() {
        let mut cfg = controller_config();
        cfg.lease_ttl = 10;
        cfg.update_interval = 10;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn role_round_trips_through_str() {
        assert_eq!("primary".parse::<Role>().unwrap(), Role::Primary);
        assert_eq!("dr".parse::<Role>().unwrap(), Role::Dr);
        assert!("standby".parse::<Role>().is_err());
        assert_eq!(Role::Primary.to_string(), "primary");
        assert_eq!(Role::Primary.peer(), Role::Dr);
    }

    #[test]
    fn reconciler_rejects_single_clean_check() {
        let cfg = ReconcilerConfig {
            role: Role::Dr,
            record: "ingest.example.com".to_string(),
            server: None,
            primary_ip: "10.10.10.10".parse().unwrap(),
            dr_ip: "10.20.20.10".parse().unwrap(),
            check_interval: 120,
            exclude_patterns: vec!["system.*".to_string()],
            failback_clean_checks: 1,
            auto_create_units: false,
            state_file: "/state/sync.json".into(),
            notify: NotifyConfig::default(),
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn reconciler_rejects_bad_glob() {
        let cfg = ReconcilerConfig {
            role: Role::Dr,
            record: "ingest.example.com".to_string(),
            server: None,
            primary_ip: "10.10.10.10".parse().unwrap(),
            dr_ip: "10.20.20.10".parse().unwrap(),
            check_interval: 120,
            exclude_patterns: vec!["[".to_string()],
            failback_clean_checks: 3,
            auto_create_units: false,
            state_file: "/state/sync.json".into(),
            notify: NotifyConfig::default(),
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn site_for_ip_maps_both_sites() {
        let cfg = ReconcilerConfig {
            role: Role::Dr,
            record: "ingest.example.com".to_string(),
            server: None,
            primary_ip: "10.10.10.10".parse().unwrap(),
            dr_ip: "10.20.20.10".parse().unwrap(),
            check_interval: 120,
            exclude_patterns: vec![],
            failback_clean_checks: 3,
            auto_create_units: false,
            state_file: "/state/sync.json".into(),
            notify: NotifyConfig::default(),
        };
        assert_eq!(
            cfg.site_for_ip("10.10.10.10".parse().unwrap()),
            Some(Role::Primary)
        );
        assert_eq!(cfg.site_for_ip("10.20.20.10".parse().unwrap()), Some(Role::Dr));
        assert_eq!(cfg.site_for_ip("192.0.2.1".parse().unwrap()), None);
    }
}
