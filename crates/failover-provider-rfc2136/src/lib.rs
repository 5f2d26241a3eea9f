// # RFC 2136 DNS Provider
//
// Publishes the record pair over DNS dynamic update by driving `nsupdate`
// on stdin, and reads it back with `dig +short`. Two authentication
// modes:
//
// - TSIG shared key: `nsupdate -k <keyfile>` (BIND and friends)
// - GSS-TSIG: `nsupdate -g` (Active Directory-integrated zones, using
//   the process's Kerberos credentials)
//
// A non-zero nsupdate exit is a transient provider failure; the
// controller re-attempts on its next tick.

use async_trait::async_trait;
use failover_core::config::{ProviderConfig, RecordSpec, Rfc2136Auth, Role};
use failover_core::traits::{DnsProvider, DnsProviderFactory, RecordSet};
use failover_core::{Error, Lease, Result};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

const UPDATE_TIMEOUT: Duration = Duration::from_secs(10);
const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Authentication for the update channel
#[derive(Debug, Clone)]
pub enum UpdateAuth {
    /// `nsupdate -k <keyfile>`
    Tsig(PathBuf),
    /// `nsupdate -g`
    Gss,
}

/// Dynamic-update provider
#[derive(Debug, Clone)]
pub struct Rfc2136Provider {
    server: String,
    zone: String,
    record: String,
    ttl: u32,
    auth: UpdateAuth,
}

impl Rfc2136Provider {
    pub fn new(
        server: impl Into<String>,
        zone: impl Into<String>,
        record: impl Into<String>,
        ttl: u32,
        auth: UpdateAuth,
    ) -> Self {
        Self {
            server: server.into(),
            zone: zone.into(),
            record: record.into(),
            ttl,
            auth,
        }
    }

    /// The nsupdate batch replacing both records.
    ///
    /// Delete-then-add is how dynamic update spells "overwrite"; the
    /// whole batch travels in one `send`, so the server applies it as a
    /// single update transaction.
    fn update_script(&self, ip: Ipv4Addr, txt_value: &str) -> String {
        format!(
            "server {server}\n\
             zone {zone}\n\
             update delete {record} A\n\
             update delete {record} TXT\n\
             update add {record} {ttl} A {ip}\n\
             update add {record} {ttl} TXT \"{txt}\"\n\
             send\n",
            server = self.server,
            zone = self.zone,
            record = self.record,
            ttl = self.ttl,
            ip = ip,
            txt = txt_value,
        )
    }

    async fn run_nsupdate(&self, script: &str) -> Result<()> {
        let mut cmd = Command::new("nsupdate");
        match &self.auth {
            UpdateAuth::Tsig(keyfile) => {
                cmd.arg("-k").arg(keyfile);
            }
            UpdateAuth::Gss => {
                cmd.arg("-g");
            }
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::provider("rfc2136", format!("cannot spawn nsupdate: {}", e)))?;

        child
            .stdin
            .take()
            .ok_or_else(|| Error::provider("rfc2136", "nsupdate stdin unavailable"))?
            .write_all(script.as_bytes())
            .await
            .map_err(|e| Error::provider("rfc2136", format!("cannot feed nsupdate: {}", e)))?;

        let output = timeout(UPDATE_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| Error::provider("rfc2136", "nsupdate timed out"))?
            .map_err(|e| Error::provider("rfc2136", format!("nsupdate failed: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::provider(
                "rfc2136",
                format!("nsupdate exited with {}: {}", output.status, stderr.trim()),
            ));
        }
        Ok(())
    }

    /// `dig @server record <type> +short`, first line of output
    async fn dig_short(&self, record_type: &str) -> Result<Option<String>> {
        let server_arg = format!("@{}", self.server);
        let output = timeout(
            QUERY_TIMEOUT,
            Command::new("dig")
                .args([&server_arg, &self.record, record_type, "+short"])
                .output(),
        )
        .await
        .map_err(|_| Error::provider("rfc2136", "dig timed out"))?
        .map_err(|e| Error::provider("rfc2136", format!("cannot run dig: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::provider(
                "rfc2136",
                format!("dig exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .next()
            .map(|line| line.trim().replace('"', ""))
            .filter(|line| !line.is_empty()))
    }
}

#[async_trait]
impl DnsProvider for Rfc2136Provider {
    async fn set_records(&self, ip: Ipv4Addr, owner: Role, expires_at: u64) -> Result<()> {
        let txt_value = Lease::encode(owner, expires_at);
        self.run_nsupdate(&self.update_script(ip, &txt_value)).await?;
        tracing::info!(ip = %ip, txt = %txt_value, "dynamic update applied");
        Ok(())
    }

    async fn get_records(&self) -> Result<RecordSet> {
        // Partial answers are fine: a missing record is None, and only a
        // failing query surfaces as an error.
        let a = match self.dig_short("A").await {
            Ok(value) => value.and_then(|v| v.parse().ok()),
            Err(e) => {
                tracing::warn!(error = %e, "A record query failed");
                None
            }
        };
        let txt = match self.dig_short("TXT").await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "TXT record query failed");
                None
            }
        };
        Ok(RecordSet { a, txt })
    }

    fn provider_name(&self) -> &'static str {
        "rfc2136"
    }
}

/// Factory wiring the provider into the registry
pub struct Rfc2136Factory {
    /// DNS server the updates are sent to
    pub server: String,
}

impl DnsProviderFactory for Rfc2136Factory {
    fn create(
        &self,
        config: &ProviderConfig,
        record: &RecordSpec,
    ) -> Result<Box<dyn DnsProvider>> {
        match config {
            ProviderConfig::Rfc2136 { auth } => {
                let auth = match auth {
                    Rfc2136Auth::Tsig { keyfile } => UpdateAuth::Tsig(keyfile.clone()),
                    Rfc2136Auth::Gss => UpdateAuth::Gss,
                };
                Ok(Box::new(Rfc2136Provider::new(
                    &self.server,
                    &record.zone,
                    &record.record,
                    record.ttl,
                    auth,
                )))
            }
            other => Err(Error::config(format!(
                "rfc2136 factory cannot build '{}' provider",
                other.type_name()
            ))),
        }
    }
}

/// Register this provider with a registry
pub fn register(registry: &failover_core::ProviderRegistry, server: impl Into<String>) {
    registry.register_provider(
        "rfc2136",
        Box::new(Rfc2136Factory {
            server: server.into(),
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_script_replaces_both_records() {
        let provider = Rfc2136Provider::new(
            "10.0.0.53",
            "example.com",
            "ingest.example.com",
            30,
            UpdateAuth::Gss,
        );

        let script = provider.update_script("10.10.10.10".parse().unwrap(), "owner=primary exp=99");
        let lines: Vec<&str> = script.lines().collect();
        assert_eq!(lines[0], "server 10.0.0.53");
        assert_eq!(lines[1], "zone example.com");
        assert_eq!(lines[2], "update delete ingest.example.com A");
        assert_eq!(lines[3], "update delete ingest.example.com TXT");
        assert_eq!(lines[4], "update add ingest.example.com 30 A 10.10.10.10");
        assert_eq!(
            lines[5],
            "update add ingest.example.com 30 TXT \"owner=primary exp=99\""
        );
        assert_eq!(lines[6], "send");
    }
}
