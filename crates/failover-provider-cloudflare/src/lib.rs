// # Cloudflare DNS Provider
//
// Publishes the failover record pair through the Cloudflare API v4.
//
// Each `set_records` call upserts the A record and then the TXT record:
// look the record up by type and name, PUT over it when it exists, POST
// it otherwise. The two upserts are separate API calls, so the pair is
// not atomic; writing A first keeps the window in the direction readers
// already tolerate.
//
// - Update DNS Record: PUT `/zones/:zone_id/dns_records/:record_id`
// - List DNS Records: GET `/zones/:zone_id/dns_records?name=...&type=...`
//
// ## Security
//
// The API token never appears in logs; the Debug implementation redacts
// it.
//
// NO retry logic in here — errors propagate and the controller re-attempts
// on its next tick.

use async_trait::async_trait;
use failover_core::config::{ProviderConfig, RecordSpec, Role};
use failover_core::traits::{DnsProvider, DnsProviderFactory, RecordSet};
use failover_core::{Error, Lease, Result};
use serde_json::{Value, json};
use std::net::Ipv4Addr;
use std::time::Duration;

/// Cloudflare API base URL
const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Cloudflare record-pair provider
pub struct CloudflareProvider {
    api_token: String,
    zone_id: String,
    record: String,
    ttl: u32,
    client: reqwest::Client,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api_token", &"<REDACTED>")
            .field("zone_id", &self.zone_id)
            .field("record", &self.record)
            .finish()
    }
}

impl CloudflareProvider {
    /// Create a provider for one record in one zone.
    ///
    /// The token needs Zone:DNS:Edit permission on the zone.
    pub fn new(
        api_token: impl Into<String>,
        zone_id: impl Into<String>,
        record: impl Into<String>,
        ttl: u32,
    ) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::provider("cloudflare", format!("cannot build client: {}", e)))?;

        Ok(Self {
            api_token,
            zone_id: zone_id.into(),
            record: record.into(),
            ttl,
            client,
        })
    }

    fn records_url(&self) -> String {
        format!(
            "{}/zones/{}/dns_records",
            CLOUDFLARE_API_BASE, self.zone_id
        )
    }

    /// Find an existing record of one type at the configured name
    async fn find_record(&self, record_type: &str) -> Result<Option<Value>> {
        let response = self
            .client
            .get(self.records_url())
            .query(&[("type", record_type), ("name", self.record.as_str())])
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| Error::provider("cloudflare", format!("lookup request failed: {}", e)))?;

        let json = Self::parse_response(response, "record lookup").await?;
        Ok(json["result"].as_array().and_then(|r| r.first()).cloned())
    }

    /// Upsert one record of the pair
    async fn upsert(&self, record_type: &str, content: &str) -> Result<()> {
        let body = json!({
            "type": record_type,
            "name": self.record,
            "content": content,
            "ttl": self.ttl,
        });

        let response = match self.find_record(record_type).await? {
            Some(existing) => {
                let id = existing["id"].as_str().ok_or_else(|| {
                    Error::provider("cloudflare", "record id missing from lookup response")
                })?;
                self.client
                    .put(format!("{}/{}", self.records_url(), id))
                    .bearer_auth(&self.api_token)
                    .json(&body)
                    .send()
                    .await
            }
            None => {
                self.client
                    .post(self.records_url())
                    .bearer_auth(&self.api_token)
                    .json(&body)
                    .send()
                    .await
            }
        }
        .map_err(|e| Error::provider("cloudflare", format!("upsert request failed: {}", e)))?;

        Self::parse_response(response, "record upsert").await?;
        Ok(())
    }

    /// Map an API response to either its JSON body or a provider error
    async fn parse_response(response: reqwest::Response, what: &str) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unreadable error body".to_string());
            return match status.as_u16() {
                401 | 403 => Err(Error::provider(
                    "cloudflare",
                    format!("{}: authentication failed ({})", what, status),
                )),
                429 => Err(Error::provider(
                    "cloudflare",
                    format!("{}: rate limited ({})", what, status),
                )),
                500..=599 => Err(Error::provider(
                    "cloudflare",
                    format!("{}: server error {} - {}", what, status, body),
                )),
                _ => Err(Error::provider(
                    "cloudflare",
                    format!("{}: {} - {}", what, status, body),
                )),
            };
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| Error::provider("cloudflare", format!("{}: bad JSON: {}", what, e)))?;

        if json["success"] != Value::Bool(true) {
            return Err(Error::provider(
                "cloudflare",
                format!("{}: API reported failure: {}", what, json["errors"]),
            ));
        }
        Ok(json)
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    async fn set_records(&self, ip: Ipv4Addr, owner: Role, expires_at: u64) -> Result<()> {
        let txt_value = Lease::encode(owner, expires_at);

        // A first, then TXT.
        self.upsert("A", &ip.to_string()).await?;
        self.upsert("TXT", &txt_value).await?;

        tracing::info!(ip = %ip, txt = %txt_value, "cloudflare records updated");
        Ok(())
    }

    async fn get_records(&self) -> Result<RecordSet> {
        let a = self
            .find_record("A")
            .await?
            .and_then(|r| r["content"].as_str().and_then(|s| s.parse().ok()));

        let txt = self
            .find_record("TXT")
            .await?
            .and_then(|r| r["content"].as_str().map(|s| s.trim_matches('"').to_string()));

        Ok(RecordSet { a, txt })
    }

    fn provider_name(&self) -> &'static str {
        "cloudflare"
    }
}

/// Factory wiring the provider into the registry
pub struct CloudflareFactory;

impl DnsProviderFactory for CloudflareFactory {
    fn create(
        &self,
        config: &ProviderConfig,
        record: &RecordSpec,
    ) -> Result<Box<dyn DnsProvider>> {
        match config {
            ProviderConfig::Cloudflare { api_token, zone_id } => Ok(Box::new(
                CloudflareProvider::new(api_token, zone_id, &record.record, record.ttl)?,
            )),
            other => Err(Error::config(format!(
                "cloudflare factory cannot build '{}' provider",
                other.type_name()
            ))),
        }
    }
}

/// Register this provider with a registry
pub fn register(registry: &failover_core::ProviderRegistry) {
    registry.register_provider("cloudflare", Box::new(CloudflareFactory));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_token_is_rejected() {
        assert!(CloudflareProvider::new("", "zone", "r.example.com", 30).is_err());
    }

    #[test]
    fn debug_redacts_the_token() {
        let provider =
            CloudflareProvider::new("secret-token", "zone123", "r.example.com", 30).unwrap();
        let debug = format!("{:?}", provider);
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn factory_rejects_other_configs() {
        let record = RecordSpec {
            record: "r.example.com".to_string(),
            zone: "example.com".to_string(),
            server: None,
            ttl: 30,
        };
        let err = CloudflareFactory
            .create(
                &ProviderConfig::File {
                    path: "/tmp/zone.json".into(),
                },
                &record,
            )
            .err()
            .expect("expected an error");
        assert!(matches!(err, Error::Config(_)));
    }
}
