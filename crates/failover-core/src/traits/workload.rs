// # Workload Trait
//
// The side-effect the ownership follower drives on lease edges: start the
// managed workload when DNS points at this site, stop it when it moves
// away.
//
// ## Implementations (this crate, `workload` module)
//
// - Process: spawn and supervise a local subprocess
// - Container: start/stop a named container
// - Deployment: scale a deployment between two replica counts

use async_trait::async_trait;

/// Trait for managed workload implementations
///
/// `start` and `stop` must be idempotent from the follower's point of
/// view: starting a running workload or stopping a stopped one is a no-op,
/// not an error.
#[async_trait]
pub trait Workload: Send + Sync {
    /// Bring the workload up
    async fn start(&mut self) -> Result<(), crate::Error>;

    /// Take the workload down gracefully
    async fn stop(&mut self) -> Result<(), crate::Error>;

    /// Whether the workload is currently running
    async fn is_running(&mut self) -> Result<bool, crate::Error>;

    /// Get the workload name (for logging/debugging)
    fn workload_name(&self) -> &'static str;
}
