// # Notifier Trait
//
// One-shot operator notifications emitted by the parity reconciler.
// Delivery is best-effort: implementations log failures and never retry,
// and the reconciler never blocks its cycle on one.

use async_trait::async_trait;
use std::fmt;

/// Reconciler events worth telling an operator about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyEvent {
    /// Units with missing data were found this cycle
    GapDetected,
    /// A repair pass completed
    SyncComplete,
    /// Enough clean cycles have passed; failback is safe
    FailbackReady,
    /// The active side has collections this side lacks
    NewUnitDetected,
}

impl fmt::Display for NotifyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NotifyEvent::GapDetected => "gap_detected",
            NotifyEvent::SyncComplete => "sync_complete",
            NotifyEvent::FailbackReady => "failback_ready",
            NotifyEvent::NewUnitDetected => "new_unit_detected",
        })
    }
}

/// Trait for notification sinks
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one event; failures are the implementation's problem
    async fn notify(&self, event: NotifyEvent, message: &str);
}

/// A notifier that drops everything (the default when no webhook is set)
#[derive(Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _event: NotifyEvent, _message: &str) {}
}
