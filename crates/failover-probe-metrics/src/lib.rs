// # Metrics Progress Probe
//
// "Is the primary actually ingesting?" — answered by watching a named
// counter in a Prometheus text exposition. Healthy while the counter
// strictly increases between checks; a counter that is flat, missing, or
// unreachable increments a stale counter, and the probe flips to
// unhealthy once `stale_count` consecutive readings went nowhere.
//
// A TCP connect tells you the listener is up; this probe catches the
// worse failure mode where the collector accepts connections but data
// stopped flowing.
//
// The probe is stateful (last value + stale streak) and must not be
// shared across probe sites.

use async_trait::async_trait;
use failover_core::traits::{HealthProbe, HealthProbeFactory};
use failover_core::{Error, Result};
use std::sync::Mutex;
use std::time::Duration;

/// Sum every sample of one metric across its label permutations.
///
/// ```text
/// otelcol_receiver_accepted_metric_points{receiver="prometheus"} 12345
/// otelcol_receiver_accepted_metric_points{receiver="otlp"} 6789
/// ```
///
/// yields `Some(19134.0)`. Returns `None` when the metric never appears.
pub fn parse_metric_value(exposition: &str, metric_name: &str) -> Option<f64> {
    let mut total = 0.0;
    let mut found = false;

    for line in exposition.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some(rest) = line.strip_prefix(metric_name) else {
            continue;
        };
        // Name boundary: the metric name must be followed by a label set
        // or whitespace, not more identifier characters.
        let value_part = if let Some(labels_on) = rest.strip_prefix('{') {
            let Some((_, after)) = labels_on.split_once('}') else {
                continue;
            };
            after.trim()
        } else if rest.starts_with(char::is_whitespace) {
            rest.trim()
        } else {
            continue;
        };

        // Drop a trailing timestamp if one is present.
        let value_token = value_part.split_whitespace().next().unwrap_or("");
        if let Ok(value) = value_token.parse::<f64>() {
            total += value;
            found = true;
        }
    }

    found.then_some(total)
}

#[derive(Debug, Default)]
struct ProbeState {
    last_value: Option<f64>,
    stale_checks: u32,
}

/// Strictly-increasing counter probe
pub struct ProgressProbe {
    url: String,
    metric: String,
    stale_count: u32,
    client: reqwest::Client,
    state: Mutex<ProbeState>,
}

impl ProgressProbe {
    pub fn new(
        url: impl Into<String>,
        metric: impl Into<String>,
        stale_count: u32,
        fetch_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .build()
            .map_err(|e| Error::probe(format!("cannot build client: {}", e)))?;

        Ok(Self {
            url: url.into(),
            metric: metric.into(),
            stale_count: stale_count.max(1),
            client,
            state: Mutex::new(ProbeState::default()),
        })
    }

    async fn fetch_exposition(&self) -> Option<String> {
        match self.client.get(&self.url).send().await {
            Ok(response) if response.status().is_success() => response.text().await.ok(),
            Ok(response) => {
                tracing::warn!(url = %self.url, status = %response.status(), "metrics fetch rejected");
                None
            }
            Err(e) => {
                tracing::warn!(url = %self.url, error = %e, "metrics fetch failed");
                None
            }
        }
    }

    /// State transition for one reading; split out so the staleness
    /// machine is testable without HTTP.
    fn observe(&self, exposition: Option<&str>) -> bool {
        let mut state = self.state.lock().unwrap();

        let current = match exposition.and_then(|text| parse_metric_value(text, &self.metric)) {
            Some(value) => value,
            None => {
                state.stale_checks += 1;
                tracing::warn!(
                    metric = %self.metric,
                    stale = state.stale_checks,
                    threshold = self.stale_count,
                    "metric unreadable"
                );
                return state.stale_checks < self.stale_count;
            }
        };

        let Some(last) = state.last_value else {
            state.last_value = Some(current);
            tracing::info!(metric = %self.metric, baseline = current, "metrics baseline recorded");
            return true;
        };

        state.last_value = Some(current);
        if current > last {
            state.stale_checks = 0;
            tracing::debug!(metric = %self.metric, value = current, delta = current - last, "metric advancing");
            true
        } else {
            state.stale_checks += 1;
            tracing::warn!(
                metric = %self.metric,
                value = current,
                stale = state.stale_checks,
                threshold = self.stale_count,
                "metric not advancing"
            );
            state.stale_checks < self.stale_count
        }
    }
}

#[async_trait]
impl HealthProbe for ProgressProbe {
    async fn check(&self) -> bool {
        let exposition = self.fetch_exposition().await;
        self.observe(exposition.as_deref())
    }

    fn probe_name(&self) -> &'static str {
        "metrics"
    }
}

/// Factory wiring the probe into the registry
pub struct ProgressProbeFactory;

impl HealthProbeFactory for ProgressProbeFactory {
    fn create(
        &self,
        config: &failover_core::config::HealthConfig,
    ) -> Result<Box<dyn HealthProbe>> {
        match config {
            failover_core::config::HealthConfig::Metrics {
                url,
                metric,
                stale_count,
                timeout_secs,
            } => Ok(Box::new(ProgressProbe::new(
                url,
                metric,
                *stale_count,
                Duration::from_secs(*timeout_secs),
            )?)),
            other => Err(Error::config(format!(
                "metrics factory cannot build '{}' probe",
                other.type_name()
            ))),
        }
    }
}

/// Register this probe with a registry
pub fn register(registry: &failover_core::ProviderRegistry) {
    registry.register_probe("metrics", Box::new(ProgressProbeFactory));
}
