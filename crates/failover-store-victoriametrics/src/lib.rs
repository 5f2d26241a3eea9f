// # VictoriaMetrics Store Adapter
//
// Bucket-unit datastore adapter over the VictoriaMetrics HTTP API.
// There is one implicit collection ("samples"); units are time-bucket
// start timestamps, counted with the lightweight canary query
// `count(count_over_time(up[5m]))` over a sliding window.
//
// Repair exports every series for a time range from the source and
// imports it into the destination. Import is idempotent — the same
// samples land on the same timestamps — so re-running a partial repair
// converges. The "row" figure reported per repair is the transferred
// byte volume.

use async_trait::async_trait;
use failover_core::traits::{GapPolicy, Site, UnitStore};
use failover_core::{Error, Result};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const PING_TIMEOUT: Duration = Duration::from_secs(5);
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(120);

/// The single collection name bucketed stores expose
pub const SAMPLES_COLLECTION: &str = "samples";

/// Parity canary: cheap and present wherever anything is scraped
const PARITY_QUERY: &str = "count(count_over_time(up[5m]))";

/// VictoriaMetrics store adapter
#[derive(Debug, Clone)]
pub struct VictoriaMetricsStore {
    local_url: String,
    remote_url: String,
    query_window: u64,
    query_step: u64,
    gap_threshold: f64,
    chunk_size: u64,
    client: reqwest::Client,
}

impl VictoriaMetricsStore {
    pub fn new(
        local_url: impl Into<String>,
        remote_url: impl Into<String>,
        query_window: u64,
        query_step: u64,
        gap_threshold: f64,
        chunk_size: u64,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::datastore(format!("cannot build client: {}", e)))?;

        let local_url: String = local_url.into();
        let remote_url: String = remote_url.into();
        Ok(Self {
            local_url: local_url.trim_end_matches('/').to_string(),
            remote_url: remote_url.trim_end_matches('/').to_string(),
            query_window,
            query_step,
            gap_threshold,
            chunk_size,
            client,
        })
    }

    fn base_url(&self, site: Site) -> &str {
        match site {
            Site::Local => &self.local_url,
            Site::Remote => &self.remote_url,
        }
    }

    fn now_unix() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    /// Sum per-bucket sample counts across all returned series
    fn bucket_counts_from_response(json: &Value) -> BTreeMap<String, u64> {
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        let results = json["data"]["result"].as_array().cloned().unwrap_or_default();
        for series in results {
            for pair in series["values"].as_array().cloned().unwrap_or_default() {
                let Some(ts) = pair.get(0).and_then(value_as_u64) else {
                    continue;
                };
                let Some(count) = pair.get(1).and_then(value_as_u64) else {
                    continue;
                };
                *counts.entry(ts.to_string()).or_insert(0) += count;
            }
        }
        counts
    }
}

/// Range-query values arrive as numbers or numeric strings
fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_f64().map(|f| f as u64),
        Value::String(s) => s.parse::<f64>().ok().map(|f| f as u64),
        _ => None,
    }
}

#[async_trait]
impl UnitStore for VictoriaMetricsStore {
    async fn ping(&self, site: Site) -> Result<()> {
        let url = format!("{}/health", self.base_url(site));
        let response = self
            .client
            .get(&url)
            .timeout(PING_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::datastore(format!("{} health check failed: {}", site, e)))?;
        if !response.status().is_success() {
            return Err(Error::datastore(format!(
                "{} health returned {}",
                site,
                response.status()
            )));
        }
        Ok(())
    }

    async fn collections(&self, _site: Site) -> Result<BTreeSet<String>> {
        Ok(BTreeSet::from([SAMPLES_COLLECTION.to_string()]))
    }

    async fn create_collection(&self, _source: Site, _dest: Site, _collection: &str) -> Result<()> {
        // Metrics stores have no schema to create.
        Ok(())
    }

    async fn unit_counts(&self, site: Site, _collection: &str) -> Result<BTreeMap<String, u64>> {
        let end = Self::now_unix();
        let start = end.saturating_sub(self.query_window);
        let start_arg = start.to_string();
        let end_arg = end.to_string();
        let step_arg = format!("{}s", self.query_step);

        let url = format!("{}/api/v1/query_range", self.base_url(site));
        let response = self
            .client
            .get(&url)
            .timeout(QUERY_TIMEOUT)
            .query(&[
                ("query", PARITY_QUERY),
                ("start", start_arg.as_str()),
                ("end", end_arg.as_str()),
                ("step", step_arg.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::datastore(format!("{} range query failed: {}", site, e)))?;

        if !response.status().is_success() {
            return Err(Error::datastore(format!(
                "{} range query returned {}",
                site,
                response.status()
            )));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| Error::datastore(format!("{} returned invalid JSON: {}", site, e)))?;
        if json["status"] != "success" {
            return Err(Error::datastore(format!(
                "{} range query unsuccessful: {}",
                site, json["status"]
            )));
        }

        Ok(Self::bucket_counts_from_response(&json))
    }

    fn gap_policy(&self) -> GapPolicy {
        GapPolicy::SampleRatio {
            threshold: self.gap_threshold,
            step: self.query_step,
            max_span: self.chunk_size,
        }
    }

    async fn repair_range(&self, source: Site, dest: Site, start: u64, end: u64) -> Result<u64> {
        let export_url = format!("{}/api/v1/export", self.base_url(source));
        let start_arg = start.to_string();
        let end_arg = end.to_string();
        let response = self
            .client
            .get(&export_url)
            .timeout(TRANSFER_TIMEOUT)
            .query(&[
                ("match[]", "{__name__!=\"\"}"),
                ("start", start_arg.as_str()),
                ("end", end_arg.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::datastore(format!("{} export failed: {}", source, e)))?;
        if !response.status().is_success() {
            return Err(Error::datastore(format!(
                "{} export returned {}",
                source,
                response.status()
            )));
        }

        let payload = response
            .bytes()
            .await
            .map_err(|e| Error::datastore(format!("{} export body unreadable: {}", source, e)))?;
        if payload.is_empty() {
            tracing::debug!(start, end, "nothing to transfer for range");
            return Ok(0);
        }

        let import_url = format!("{}/api/v1/import", self.base_url(dest));
        let transferred = payload.len() as u64;
        let response = self
            .client
            .post(&import_url)
            .timeout(TRANSFER_TIMEOUT)
            .body(payload)
            .send()
            .await
            .map_err(|e| Error::datastore(format!("{} import failed: {}", dest, e)))?;
        if !response.status().is_success() {
            return Err(Error::datastore(format!(
                "{} import returned {}",
                dest,
                response.status()
            )));
        }

        tracing::info!(start, end, bytes = transferred, "range transferred");
        Ok(transferred)
    }

    fn store_name(&self) -> &'static str {
        "victoriametrics"
    }
}
