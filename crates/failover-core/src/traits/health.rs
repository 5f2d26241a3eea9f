// # Health Probe Trait
//
// A predicate the DR controller runs every tick: "is the primary up
// right now?".
//
// ## Implementations
//
// - TCP liveness (connect succeeds): this crate, `probe::tcp`
// - Metrics progress (named counter strictly increases):
//   `failover-probe-metrics` crate

use async_trait::async_trait;

/// Trait for health probe implementations
///
/// `check` never fails; an unreachable target is simply an unhealthy
/// answer. Probes may be stateful (the progress probe compares against its
/// previous reading), so a probe instance must not be shared across probe
/// sites.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Whether the probed site looks healthy right now
    async fn check(&self) -> bool;

    /// Get the probe name (for logging/debugging)
    fn probe_name(&self) -> &'static str;
}

/// Helper trait for constructing health probes from configuration
pub trait HealthProbeFactory: Send + Sync {
    /// Create a HealthProbe instance from configuration
    fn create(
        &self,
        config: &crate::config::HealthConfig,
    ) -> Result<Box<dyn HealthProbe>, crate::Error>;
}
