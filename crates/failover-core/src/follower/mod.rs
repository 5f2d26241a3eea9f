//! Ownership follower
//!
//! A passive observer of the DNS lease: every tick it resolves the
//! coordinated record, decides whether this site should be active
//! (`resolved A == my_ip`), and drives the managed workload on edges of
//! that answer. Exactly one site runs the workload at a time, bounded by
//! DNS propagation.
//!
//! Resolution failures carry no information, so they preserve the last
//! decision and touch nothing.

use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::FollowerConfig;
use crate::error::Result;
use crate::resolver::LeaseResolver;
use crate::traits::Workload;

/// What a follower tick did, for observability and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowerTickOutcome {
    /// Resolution failed; state preserved, nothing driven
    NoInformation,
    /// Became active this tick; workload started
    Activated,
    /// Stopped being active this tick; workload stopped
    Deactivated,
    /// Active and the workload had died; started again
    Recovered,
    /// Nothing to do
    Unchanged {
        /// Whether this site is currently active
        active: bool,
    },
}

/// Lease follower driving a local side-effect
pub struct OwnershipFollower {
    cfg: FollowerConfig,
    resolver: Box<dyn LeaseResolver>,
    workload: Box<dyn Workload>,
    last_state: Option<bool>,
}

impl OwnershipFollower {
    pub fn new(
        cfg: FollowerConfig,
        resolver: Box<dyn LeaseResolver>,
        workload: Box<dyn Workload>,
    ) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            resolver,
            workload,
            last_state: None,
        })
    }

    /// Poll the record until `shutdown` flips, then stop the workload
    /// gracefully and exit.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            record = %self.cfg.record,
            my_ip = %self.cfg.my_ip,
            check_interval = self.cfg.check_interval,
            workload = self.workload.workload_name(),
            "starting ownership follower"
        );

        let mut ticks = tokio::time::interval(Duration::from_secs(self.cfg.check_interval));
        ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticks.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "follower tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("shutdown requested, stopping follower");
                        if let Err(e) = self.workload.stop().await {
                            warn!(error = %e, "failed to stop workload during shutdown");
                        }
                        return Ok(());
                    }
                }
            }
        }
    }

    /// One poll: resolve, compare, drive edges, recover crashes.
    pub async fn tick(&mut self) -> Result<FollowerTickOutcome> {
        let resolved = match self.resolver.resolve_ipv4().await {
            Ok(Some(ip)) => ip,
            Ok(None) => {
                warn!(record = %self.cfg.record, "record did not resolve, keeping current state");
                return Ok(FollowerTickOutcome::NoInformation);
            }
            Err(e) => {
                warn!(error = %e, "DNS lookup failed, keeping current state");
                return Ok(FollowerTickOutcome::NoInformation);
            }
        };

        let should_be_active = resolved == self.cfg.my_ip;
        let was_active = self.last_state.unwrap_or(false);

        if self.last_state != Some(should_be_active) {
            // First resolution or an edge; either way worth a line.
            if should_be_active {
                info!(resolved = %resolved, "DNS points to us, activating");
            } else {
                info!(resolved = %resolved, "DNS points elsewhere, deactivating");
            }
        }
        self.last_state = Some(should_be_active);

        let outcome = if should_be_active && !was_active {
            self.ensure_started().await?;
            FollowerTickOutcome::Activated
        } else if !should_be_active && was_active {
            self.workload.stop().await?;
            FollowerTickOutcome::Deactivated
        } else if should_be_active && !self.workload.is_running().await? {
            warn!("workload died while we hold the record, restarting");
            self.workload.start().await?;
            FollowerTickOutcome::Recovered
        } else {
            debug!(active = should_be_active, "no change");
            FollowerTickOutcome::Unchanged {
                active: should_be_active,
            }
        };

        Ok(outcome)
    }

    async fn ensure_started(&mut self) -> Result<()> {
        if !self.workload.is_running().await? {
            self.workload.start().await?;
        }
        Ok(())
    }

    /// Resolved-vs-mine comparison, exposed for tests
    pub fn should_be_active(&self, resolved: Ipv4Addr) -> bool {
        resolved == self.cfg.my_ip
    }
}
