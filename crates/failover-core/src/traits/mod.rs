//! Core trait definitions
//!
//! These traits define the boundaries between the control loops and their
//! pluggable collaborators: DNS providers, health probes, managed
//! workloads, datastores, the lease resolver, and notifications.

pub mod dns_provider;
pub mod health;
pub mod notifier;
pub mod unit_store;
pub mod workload;

pub use dns_provider::{DnsProvider, DnsProviderFactory, RecordSet};
pub use health::{HealthProbe, HealthProbeFactory};
pub use notifier::{NoopNotifier, Notifier, NotifyEvent};
pub use unit_store::{GapPolicy, Site, UnitStore};
pub use workload::Workload;
