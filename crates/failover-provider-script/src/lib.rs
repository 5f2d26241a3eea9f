// # Script DNS Provider
//
// Escape hatch for DNS platforms without a supported adapter: the
// operator supplies two executables and this provider holds them to a
// stable wire contract. Scripts can be written in anything that can read
// argv and print JSON.
//
// ## Contract
//
// Set script — called when the record pair must change:
//   argv: `<record> <ip> <owner> <expires_at> <ttl> <zone>`
//   env:  DNS_RECORD, DNS_IP, DNS_OWNER, DNS_EXPIRY, DNS_TTL, DNS_ZONE,
//         DNS_SERVER
//   exit 0 = success, anything else = transient failure
//
// Get script — called to read the current pair:
//   argv: `<record> <zone>`
//   env:  DNS_RECORD, DNS_ZONE, DNS_SERVER
//   stdout: one line of JSON `{"A": "<ip>"|null, "TXT": "<txt>"|null}`
//   exit 0 even when the records are absent (emit nulls)
//
// Both scripts get 30 seconds before they are considered failed.

use async_trait::async_trait;
use failover_core::config::{ProviderConfig, RecordSpec, Role};
use failover_core::traits::{DnsProvider, DnsProviderFactory, RecordSet};
use failover_core::{Error, Lease, Result};
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

const SCRIPT_TIMEOUT: Duration = Duration::from_secs(30);

/// The one-line JSON a get script must print
#[derive(Debug, Deserialize)]
struct ScriptOutput {
    #[serde(rename = "A")]
    a: Option<Ipv4Addr>,
    #[serde(rename = "TXT")]
    txt: Option<String>,
}

/// Provider delegating to caller-supplied executables
#[derive(Debug, Clone)]
pub struct ScriptProvider {
    set_command: PathBuf,
    get_command: PathBuf,
    record: String,
    zone: String,
    ttl: u32,
    server: Option<String>,
}

impl ScriptProvider {
    pub fn new(
        set_command: impl Into<PathBuf>,
        get_command: impl Into<PathBuf>,
        record: &RecordSpec,
    ) -> Self {
        Self {
            set_command: set_command.into(),
            get_command: get_command.into(),
            record: record.record.clone(),
            zone: record.zone.clone(),
            ttl: record.ttl,
            server: record.server.map(|ip| ip.to_string()),
        }
    }

    fn base_env(&self, cmd: &mut Command) {
        cmd.env("DNS_RECORD", &self.record)
            .env("DNS_ZONE", &self.zone)
            .env("DNS_SERVER", self.server.as_deref().unwrap_or(""));
    }
}

#[async_trait]
impl DnsProvider for ScriptProvider {
    async fn set_records(&self, ip: Ipv4Addr, owner: Role, expires_at: u64) -> Result<()> {
        let ip_str = ip.to_string();
        let expiry_str = expires_at.to_string();
        let ttl_str = self.ttl.to_string();

        let mut cmd = Command::new(&self.set_command);
        cmd.args([
            self.record.as_str(),
            ip_str.as_str(),
            owner.as_str(),
            expiry_str.as_str(),
            ttl_str.as_str(),
            self.zone.as_str(),
        ]);
        self.base_env(&mut cmd);
        cmd.env("DNS_IP", &ip_str)
            .env("DNS_OWNER", owner.as_str())
            .env("DNS_EXPIRY", &expiry_str)
            .env("DNS_TTL", &ttl_str);

        let output = timeout(SCRIPT_TIMEOUT, cmd.output())
            .await
            .map_err(|_| Error::provider("script", "set script timed out"))?
            .map_err(|e| Error::provider("script", format!("cannot run set script: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let detail = if !stderr.trim().is_empty() {
                stderr.trim().to_string()
            } else if !stdout.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                format!("exit code {}", output.status)
            };
            return Err(Error::provider("script", format!("set script failed: {}", detail)));
        }

        tracing::info!(ip = %ip, owner = %owner, expires_at, "set script applied records");
        Ok(())
    }

    async fn get_records(&self) -> Result<RecordSet> {
        let mut cmd = Command::new(&self.get_command);
        cmd.args([self.record.as_str(), self.zone.as_str()]);
        self.base_env(&mut cmd);

        let output = timeout(SCRIPT_TIMEOUT, cmd.output())
            .await
            .map_err(|_| Error::provider("script", "get script timed out"))?
            .map_err(|e| Error::provider("script", format!("cannot run get script: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::provider(
                "script",
                format!("get script exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout.trim();
        if line.is_empty() {
            return Err(Error::provider("script", "get script printed nothing"));
        }

        let parsed: ScriptOutput = serde_json::from_str(line)
            .map_err(|e| Error::provider("script", format!("get script printed invalid JSON: {}", e)))?;

        Ok(RecordSet {
            a: parsed.a,
            txt: parsed.txt,
        })
    }

    fn provider_name(&self) -> &'static str {
        "script"
    }
}

/// Factory wiring the provider into the registry
pub struct ScriptFactory;

impl DnsProviderFactory for ScriptFactory {
    fn create(
        &self,
        config: &ProviderConfig,
        record: &RecordSpec,
    ) -> Result<Box<dyn DnsProvider>> {
        match config {
            ProviderConfig::Script {
                set_command,
                get_command,
            } => Ok(Box::new(ScriptProvider::new(
                set_command,
                get_command,
                record,
            ))),
            other => Err(Error::config(format!(
                "script factory cannot build '{}' provider",
                other.type_name()
            ))),
        }
    }
}

/// Register this provider with a registry
pub fn register(registry: &failover_core::ProviderRegistry) {
    registry.register_provider("script", Box::new(ScriptFactory));
}
