//! Failover controller
//!
//! The only writer of the DNS lease. Two role-specific loops share the
//! provider, probe and lease codec:
//!
//! - the **primary** loop renews the lease every tick; the record itself
//!   is the state, so a failed write is just retried next tick
//! - the **DR** loop watches the primary's health and promotes itself
//!   only when the probe has failed `fail_threshold` times in a row *and*
//!   the primary's lease has expired
//!
//! ```text
//!         ┌────────── healthy ──────────┐
//!         ▼                             │
//!     WATCHING ── fails≥F, lease valid ─┴── WAITING_LEASE ──┐
//!         │                                                 │
//!         │ fails≥F, lease expired                          │ lease expires
//!         ▼                                                 │
//!      ACTIVE ◄────────────────────────────────────────────┘
//! ```
//!
//! The double condition is the split-brain mitigation: a primary that is
//! merely unreachable from the DR keeps renewing its lease, and the DR
//! keeps waiting.

use serde::Serialize;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::{FailoverConfig, Role};
use crate::error::Result;
use crate::lease::{Lease, unix_now};
use crate::traits::{DnsProvider, HealthProbe};

/// What the DR loop decided to do once the fail threshold was crossed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrAction {
    /// DR already owns the lease; keep renewing it
    Renew,
    /// Primary's lease has lapsed; take over
    Promote,
    /// Primary is unreachable from here but still renewing; do nothing
    Wait {
        /// Seconds left on the primary's lease
        remaining: i64,
    },
}

/// Promotion decision for a DR that has already seen enough probe failures.
///
/// Pure so the promotion-safety invariant is testable without a clock or a
/// provider: promote only when the observed lease is not ours *and* has
/// expired.
pub fn dr_decision(lease: &Lease, now: u64) -> DrAction {
    if lease.owner == Some(Role::Dr) {
        DrAction::Renew
    } else if lease.is_expired(now) {
        DrAction::Promote
    } else {
        DrAction::Wait {
            remaining: lease.time_remaining(now),
        }
    }
}

/// Outcome of a single DR tick, for observability and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrTickOutcome {
    /// Probe succeeded; failure counter reset
    Healthy,
    /// Probe failed but the threshold is not reached yet
    Observing {
        /// Consecutive failures so far
        fails: u32,
    },
    /// Lease renewed while DR is the active site
    Renewed,
    /// DR promoted itself to active
    Promoted,
    /// Primary lease still valid; holding back
    Waiting {
        /// Seconds left on the primary's lease
        remaining: i64,
    },
}

/// Mutable state carried across DR ticks
#[derive(Debug, Default)]
pub struct DrWatch {
    /// Consecutive failed health probes
    pub consecutive_failures: u32,
}

/// Structured view of the published record pair, as emitted by `show`
#[derive(Debug, Clone, Serialize)]
pub struct LeaseStatus {
    /// Record name the pair lives at
    pub record: String,
    /// Current A record value
    #[serde(rename = "A")]
    pub a: Option<Ipv4Addr>,
    /// Lease owner, when the TXT decodes to one
    pub owner: Option<Role>,
    /// Lease expiry in unix seconds
    pub expires_at: Option<u64>,
    /// Seconds until expiry (negative once lapsed)
    pub time_remaining: Option<i64>,
}

/// Lease-based active/standby arbiter
pub struct FailoverController {
    cfg: FailoverConfig,
    provider: Box<dyn DnsProvider>,
    probe: Box<dyn HealthProbe>,
}

impl FailoverController {
    /// Create a controller. The probe is only consulted by the DR loop.
    pub fn new(
        cfg: FailoverConfig,
        provider: Box<dyn DnsProvider>,
        probe: Box<dyn HealthProbe>,
    ) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            provider,
            probe,
        })
    }

    /// Run the role-specific heartbeat loop until `shutdown` flips.
    ///
    /// The current tick always completes before the loop exits, so a DNS
    /// write in flight is never abandoned halfway.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        match self.cfg.role {
            Role::Primary => self.run_primary(shutdown).await,
            Role::Dr => self.run_dr(shutdown).await,
        }
    }

    async fn run_primary(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            record = %self.cfg.record.record,
            update_interval = self.cfg.update_interval,
            lease_ttl = self.cfg.lease_ttl,
            "starting primary heartbeat"
        );

        let mut ticks = tokio::time::interval(Duration::from_secs(self.cfg.update_interval));
        ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticks.tick() => {
                    match self.primary_tick().await {
                        Ok(expires_at) => debug!(expires_at, "lease renewed"),
                        Err(e) => error!(error = %e, "failed to renew lease"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("shutdown requested, stopping primary heartbeat");
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn run_dr(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            record = %self.cfg.record.record,
            probe = self.probe.probe_name(),
            fail_threshold = self.cfg.fail_threshold,
            check_interval = self.cfg.update_interval,
            "starting DR heartbeat"
        );

        let mut ticks = tokio::time::interval(Duration::from_secs(self.cfg.update_interval));
        ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut state = DrWatch::default();

        loop {
            tokio::select! {
                _ = ticks.tick() => {
                    // Transient errors leave `state` untouched; the next
                    // tick re-attempts from the same position.
                    if let Err(e) = self.dr_tick(&mut state).await {
                        error!(error = %e, "DR tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("shutdown requested, stopping DR heartbeat");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// One primary heartbeat: publish `(primary_ip, primary, now + L)`.
    ///
    /// Returns the expiry written. Expiries are monotone across successful
    /// ticks because each one is computed from the current wall clock.
    pub async fn primary_tick(&self) -> Result<u64> {
        self.write_lease(Role::Primary).await
    }

    /// One DR watch tick: probe, count failures, and consult the lease
    /// once the threshold is crossed.
    pub async fn dr_tick(&self, state: &mut DrWatch) -> Result<DrTickOutcome> {
        if self.probe.check().await {
            if state.consecutive_failures > 0 {
                info!("primary healthy again");
            }
            state.consecutive_failures = 0;
            return Ok(DrTickOutcome::Healthy);
        }

        state.consecutive_failures += 1;
        warn!(
            fails = state.consecutive_failures,
            threshold = self.cfg.fail_threshold,
            "primary health check failed"
        );

        if state.consecutive_failures < self.cfg.fail_threshold {
            return Ok(DrTickOutcome::Observing {
                fails: state.consecutive_failures,
            });
        }

        let records = self.provider.get_records().await?;
        let lease = Lease::parse(records.txt.as_deref().unwrap_or(""));
        let now = unix_now();

        match dr_decision(&lease, now) {
            DrAction::Renew => {
                self.write_lease(Role::Dr).await?;
                debug!("DR lease renewed");
                Ok(DrTickOutcome::Renewed)
            }
            DrAction::Promote => {
                warn!("primary lease expired, promoting DR to active");
                self.write_lease(Role::Dr).await?;
                Ok(DrTickOutcome::Promoted)
            }
            DrAction::Wait { remaining } => {
                warn!(remaining, "waiting for primary lease to expire");
                Ok(DrTickOutcome::Waiting { remaining })
            }
        }
    }

    /// One-shot: seed the record pair with primary as owner
    pub async fn init(&self) -> Result<()> {
        let expires_at = self.write_lease(Role::Primary).await?;
        info!(
            ip = %self.cfg.primary_ip,
            expires_at,
            "initialized DNS records with primary as owner"
        );
        Ok(())
    }

    /// One-shot: force DR as owner (operator-initiated failover)
    pub async fn promote(&self) -> Result<()> {
        let expires_at = self.write_lease(Role::Dr).await?;
        warn!(ip = %self.cfg.dr_ip, expires_at, "FAILOVER: promoted DR to active");
        Ok(())
    }

    /// One-shot: force primary as owner (operator-initiated failback)
    pub async fn failback(&self) -> Result<()> {
        let expires_at = self.write_lease(Role::Primary).await?;
        info!(ip = %self.cfg.primary_ip, expires_at, "FAILBACK: restored primary as active");
        Ok(())
    }

    /// Read the record pair into a structured view
    pub async fn status(&self) -> Result<LeaseStatus> {
        let records = self.provider.get_records().await?;
        let now = unix_now();

        let (owner, expires_at, time_remaining) = match records.txt.as_deref() {
            Some(txt) => {
                let lease = Lease::parse(txt);
                let remaining = (lease.expires_at > 0).then(|| lease.time_remaining(now));
                (lease.owner, Some(lease.expires_at), remaining)
            }
            None => (None, None, None),
        };

        Ok(LeaseStatus {
            record: self.cfg.record.record.clone(),
            a: records.a,
            owner,
            expires_at,
            time_remaining,
        })
    }

    async fn write_lease(&self, owner: Role) -> Result<u64> {
        let expires_at = unix_now() + self.cfg.lease_ttl;
        self.provider
            .set_records(self.cfg.ip_for(owner), owner, expires_at)
            .await?;
        Ok(expires_at)
    }
}
