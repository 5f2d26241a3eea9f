// # failover-core
//
// Core library for DNS-coordinated active/passive failover.
//
// ## Architecture Overview
//
// A primary and a DR site agree on who is active through a single DNS
// *lease*: an A record carrying the active site's IP, co-located with a
// TXT record carrying `owner=<role> exp=<unix>`. Three control loops
// share that abstraction:
//
// - **FailoverController**: the only lease writer. The primary renews it
//   every tick; the DR watches the primary's health and takes over only
//   when health has failed repeatedly AND the lease has expired.
// - **OwnershipFollower**: resolves the record like any client and
//   starts/stops a local workload on ownership edges.
// - **ParityReconciler**: uses the lease to pick a sync direction, then
//   diffs and repairs append-only data units between the two sites and
//   reports when failback is safe.
//
// ## Design Principles
//
// 1. **One source of truth**: the record pair is the only cross-process
//    shared state; there is no consensus service.
// 2. **Plugin boundaries**: DNS providers, health probes, workloads and
//    datastores are narrow traits with a closed set of variants.
// 3. **Transients never kill a loop**: provider, resolver and datastore
//    failures are logged and retried on the next tick.
// 4. **Library-first**: the daemons in this workspace are thin wiring
//    around these types.

pub mod config;
pub mod controller;
pub mod error;
pub mod follower;
pub mod lease;
pub mod probe;
pub mod providers;
pub mod reconciler;
pub mod registry;
pub mod resolver;
pub mod state;
pub mod traits;
pub mod workload;

// Re-export core types for convenience
pub use config::{
    FailoverConfig, FollowerConfig, HealthConfig, NotifyConfig, ProviderConfig, ReconcilerConfig,
    RecordSpec, Role, WorkloadConfig,
};
pub use controller::{DrAction, DrTickOutcome, DrWatch, FailoverController, LeaseStatus, dr_decision};
pub use error::{Error, Result};
pub use follower::{FollowerTickOutcome, OwnershipFollower};
pub use lease::{Lease, unix_now};
pub use providers::FileProvider;
pub use reconciler::{CycleOutcome, ParityReconciler};
pub use registry::ProviderRegistry;
pub use resolver::{LeaseResolver, RecordResolver};
pub use state::{SyncState, SyncStateFile};
pub use traits::{
    DnsProvider, GapPolicy, HealthProbe, NoopNotifier, Notifier, NotifyEvent, RecordSet, Site,
    UnitStore, Workload,
};
