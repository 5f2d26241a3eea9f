//! Parity reconciler
//!
//! Keeps the append-only datastores at the two sites in parity so a
//! failback is safe. Each cycle reads the DNS lease to decide direction:
//! the active site is the source of truth, and a passive site pulls
//! whatever its local copy lacks. After `failback_clean_checks`
//! consecutive cycles with nothing to repair (while the remote site is
//! active), the durable state flips `failback_ready` and a one-shot
//! notification goes out.
//!
//! The loop never trusts a single DNS read: one clean cycle can be a
//! stale answer, which is why the clean-check threshold is at least two.

pub mod diff;

use std::collections::BTreeSet;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::{ReconcilerConfig, Role};
use crate::error::Result;
use crate::resolver::LeaseResolver;
use crate::state::{SyncState, SyncStateFile};
use crate::traits::{GapPolicy, Notifier, NotifyEvent, Site, UnitStore};

/// What a cycle amounted to, for observability and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A datastore or the lease was unavailable; nothing was compared
    Skipped,
    /// This site is the active one; there is nothing to pull
    SourceOfTruth,
    /// Everything compared equal
    Clean {
        /// Clean cycles in a row, including this one
        consecutive_clean: u32,
        /// Whether this cycle flipped (or kept) failback readiness
        failback_ready: bool,
    },
    /// Gaps were found and repairs ran
    Synced {
        /// Units (or ranges) repaired
        units_repaired: u64,
        /// Rows or bytes transferred
        rows_synced: u64,
    },
    /// Gaps were found but nothing could be repaired this cycle
    GapsRemain,
}

/// Lease-directed sync daemon core
pub struct ParityReconciler {
    cfg: ReconcilerConfig,
    store: Box<dyn UnitStore>,
    resolver: Box<dyn LeaseResolver>,
    notifier: Box<dyn Notifier>,
    state_file: SyncStateFile,
    state: SyncState,
    exclude: Vec<glob::Pattern>,
}

impl ParityReconciler {
    /// Create a reconciler and load its durable state.
    pub async fn new(
        cfg: ReconcilerConfig,
        store: Box<dyn UnitStore>,
        resolver: Box<dyn LeaseResolver>,
        notifier: Box<dyn Notifier>,
    ) -> Result<Self> {
        cfg.validate()?;

        let exclude = cfg
            .exclude_patterns
            .iter()
            .map(|p| glob::Pattern::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| crate::Error::config(format!("invalid exclude pattern: {}", e)))?;

        let state_file = SyncStateFile::new(&cfg.state_file);
        let state = state_file.load().await;
        info!(
            consecutive_clean = state.consecutive_clean,
            failback_ready = state.failback_ready,
            "loaded sync state"
        );

        Ok(Self {
            cfg,
            store,
            resolver,
            notifier,
            state_file,
            state,
            exclude,
        })
    }

    /// The current in-memory state (persisted after every cycle)
    pub fn state(&self) -> &SyncState {
        &self.state
    }

    /// Run cycles until `shutdown` flips.
    ///
    /// A failing cycle is logged and retried next interval; a failing
    /// state-file write is fatal, because continuing would silently lose
    /// the progress the failback decision rests on.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            role = %self.cfg.role,
            store = self.store.store_name(),
            record = %self.cfg.record,
            check_interval = self.cfg.check_interval,
            "starting parity reconciler"
        );

        let mut ticks = tokio::time::interval(Duration::from_secs(self.cfg.check_interval));
        ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticks.tick() => {
                    match self.cycle().await {
                        Ok(outcome) => debug!(?outcome, "cycle finished"),
                        Err(e) => {
                            error!(error = %e, "cycle failed");
                            self.state.last_error = Some(e.to_string());
                        }
                    }
                    self.state_file.save(&self.state).await?;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("shutdown requested, stopping reconciler");
                        self.state_file.save(&self.state).await?;
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Run a single sync-check cycle against the store pair.
    pub async fn cycle(&mut self) -> Result<CycleOutcome> {
        self.state.last_check_ts = Some(chrono::Utc::now());
        self.state.units_with_gap = 0;
        self.state.new_units.clear();

        // Health first: an unhealthy side means no comparison is meaningful.
        if let Err(e) = self.store.ping(Site::Local).await {
            warn!(error = %e, "local datastore unhealthy, skipping cycle");
            self.state.last_error = Some(format!("local datastore unhealthy: {}", e));
            return Ok(CycleOutcome::Skipped);
        }
        if let Err(e) = self.store.ping(Site::Remote).await {
            warn!(error = %e, "remote datastore unhealthy, skipping cycle");
            self.state.last_error = Some(format!("remote datastore unhealthy: {}", e));
            return Ok(CycleOutcome::Skipped);
        }

        // Direction comes from the lease.
        let active_site = match self.resolver.resolve_ipv4().await {
            Ok(Some(ip)) => match self.cfg.site_for_ip(ip) {
                Some(site) => site,
                None => {
                    warn!(resolved = %ip, "record resolves to neither site, skipping cycle");
                    self.state.last_error = Some(format!("unexpected A record {}", ip));
                    return Ok(CycleOutcome::Skipped);
                }
            },
            Ok(None) | Err(_) => {
                warn!(record = %self.cfg.record, "could not determine active site, skipping cycle");
                self.state.last_error = Some("DNS lookup failed".to_string());
                return Ok(CycleOutcome::Skipped);
            }
        };
        // A clean streak is only meaningful under one ownership regime:
        // counts accumulated while we were the source of truth must not
        // vouch for parity after a failover.
        if self.state.active_site != Some(active_site) {
            if self.state.active_site.is_some() {
                info!(active = %active_site, "active site changed, clean streak reset");
            }
            self.state.consecutive_clean = 0;
            self.state.failback_ready = false;
        }
        self.state.active_site = Some(active_site);
        info!(active = %active_site, we_are = %self.cfg.role, "resolved active site");

        if active_site == self.cfg.role {
            // We are the source of truth; nothing to pull. Readiness is a
            // property of the passive side, so it never holds here.
            self.state.consecutive_clean = self.state.consecutive_clean.saturating_add(1);
            self.state.failback_ready = false;
            self.state.last_error = None;
            return Ok(CycleOutcome::SourceOfTruth);
        }

        self.reconcile_from_remote().await
    }

    /// Remote is active: discover, diff and repair local against it.
    async fn reconcile_from_remote(&mut self) -> Result<CycleOutcome> {
        let mut local_collections = self.filtered_collections(Site::Local).await?;
        let remote_collections = self.filtered_collections(Site::Remote).await?;
        debug!(
            local = local_collections.len(),
            remote = remote_collections.len(),
            "discovered collections"
        );

        // Collections only the active side has.
        let local_snapshot = local_collections.clone();
        for collection in remote_collections.difference(&local_snapshot) {
            if self.cfg.auto_create_units {
                match self
                    .store
                    .create_collection(Site::Remote, Site::Local, collection)
                    .await
                {
                    Ok(()) => {
                        info!(collection = %collection, "auto-created collection from active site");
                        local_collections.insert(collection.clone());
                    }
                    Err(e) => {
                        warn!(collection = %collection, error = %e, "auto-create failed");
                        self.state.new_units.push(collection.clone());
                    }
                }
            } else {
                warn!(collection = %collection, "new collection on active site needs manual creation");
                self.state.new_units.push(collection.clone());
            }
        }

        if !self.state.new_units.is_empty() && self.cfg.notify.on_new_unit {
            let message = format!(
                "Sync: new units on active site need manual creation: {}",
                self.state.new_units.join(", ")
            );
            self.notifier
                .notify(NotifyEvent::NewUnitDetected, &message)
                .await;
        }

        let mut units_checked = 0u64;
        let mut gaps_found = 0u64;
        let mut units_repaired = 0u64;
        let mut rows_synced = 0u64;
        let mut had_errors = false;

        for collection in local_collections.intersection(&remote_collections) {
            match self.reconcile_collection(collection).await {
                Ok(tally) => {
                    units_checked += tally.units_checked;
                    gaps_found += tally.gaps_found;
                    units_repaired += tally.units_repaired;
                    rows_synced += tally.rows_synced;
                    had_errors |= tally.had_errors;
                }
                Err(e) => {
                    warn!(collection = %collection, error = %e, "collection check failed, skipping");
                    self.state.last_error = Some(format!("{}: {}", collection, e));
                    had_errors = true;
                }
            }
        }

        self.state.units_checked = units_checked;
        self.state.units_with_gap = gaps_found;

        if gaps_found > 0 && self.cfg.notify.on_gap {
            let message = format!(
                "Sync: {} units have data gaps. Active site: {}",
                gaps_found,
                self.state
                    .active_site
                    .map(Role::as_str)
                    .unwrap_or("unknown")
            );
            self.notifier.notify(NotifyEvent::GapDetected, &message).await;
        }

        if units_repaired > 0 {
            self.state.last_sync_ts = Some(chrono::Utc::now());
            self.state.units_synced += units_repaired;
            self.state.rows_synced += rows_synced;
            self.state.consecutive_clean = 0;
            self.state.failback_ready = false;
            info!(units_repaired, rows_synced, "sync complete");

            if self.cfg.notify.on_sync {
                let message = format!(
                    "Sync: repaired {} units ({} rows) to restore parity",
                    units_repaired, rows_synced
                );
                self.notifier.notify(NotifyEvent::SyncComplete, &message).await;
            }
            return Ok(CycleOutcome::Synced {
                units_repaired,
                rows_synced,
            });
        }

        if gaps_found == 0 && self.state.new_units.is_empty() && !had_errors {
            self.state.consecutive_clean = self.state.consecutive_clean.saturating_add(1);
            self.state.last_error = None;
            info!(clean = self.state.consecutive_clean, "all units in sync");

            if self.state.consecutive_clean >= self.cfg.failback_clean_checks
                && !self.state.failback_ready
            {
                self.state.failback_ready = true;
                info!(
                    clean_checks = self.state.consecutive_clean,
                    units_checked, "FAILBACK READY: parity confirmed, safe to fail back"
                );
                if self.cfg.notify.on_failback_ready {
                    let message = format!(
                        "Sync: FAILBACK READY, parity confirmed after {} clean checks",
                        self.state.consecutive_clean
                    );
                    self.notifier
                        .notify(NotifyEvent::FailbackReady, &message)
                        .await;
                }
            }
            return Ok(CycleOutcome::Clean {
                consecutive_clean: self.state.consecutive_clean,
                failback_ready: self.state.failback_ready,
            });
        }

        // Gaps or new units we could not fix, or errors along the way.
        self.state.consecutive_clean = 0;
        self.state.failback_ready = false;
        Ok(CycleOutcome::GapsRemain)
    }

    async fn reconcile_collection(&mut self, collection: &str) -> Result<CollectionTally> {
        let mut tally = CollectionTally::default();

        match self.store.gap_policy() {
            GapPolicy::ExactRows => {
                let local = self.store.unit_counts(Site::Local, collection).await?;
                let remote = self.store.unit_counts(Site::Remote, collection).await?;
                tally.units_checked = remote.len() as u64;

                let gaps = diff::exact_gaps(&remote, &local);
                tally.gaps_found = gaps.len() as u64;
                if gaps.is_empty() {
                    return Ok(tally);
                }

                info!(collection = %collection, gaps = gaps.len(), "units need sync");
                for gap in gaps {
                    debug!(
                        unit = %gap.unit,
                        source = gap.source,
                        dest = gap.dest,
                        "repairing unit"
                    );
                    match self
                        .store
                        .repair_unit(Site::Remote, Site::Local, collection, &gap.unit)
                        .await
                    {
                        Ok(rows) => {
                            tally.units_repaired += 1;
                            tally.rows_synced += rows;
                        }
                        Err(e) => {
                            // Partial repair: next cycle re-diffs and retries.
                            warn!(unit = %gap.unit, error = %e, "unit repair failed");
                            self.state.last_error = Some(format!("{}/{}: {}", collection, gap.unit, e));
                            tally.had_errors = true;
                        }
                    }
                }
            }
            GapPolicy::SampleRatio {
                threshold,
                step,
                max_span,
            } => {
                let local_raw = self.store.unit_counts(Site::Local, collection).await?;
                let remote_raw = self.store.unit_counts(Site::Remote, collection).await?;
                let local = parse_bucket_counts(&local_raw);
                let remote = parse_bucket_counts(&remote_raw);
                tally.units_checked = remote.len() as u64;

                let gap_buckets = diff::ratio_gaps(&remote, &local, threshold);
                tally.gaps_found = gap_buckets.len() as u64;
                if gap_buckets.is_empty() {
                    return Ok(tally);
                }

                let ranges = diff::merge_consecutive(&gap_buckets, step);
                info!(
                    collection = %collection,
                    gaps = gap_buckets.len(),
                    ranges = ranges.len(),
                    "bucket gaps merged into ranges"
                );

                for (start, end) in ranges {
                    for (chunk_start, chunk_end) in diff::chunk_range(start, end, max_span) {
                        match self
                            .store
                            .repair_range(Site::Remote, Site::Local, chunk_start, chunk_end)
                            .await
                        {
                            Ok(volume) => {
                                tally.units_repaired += 1;
                                tally.rows_synced += volume;
                            }
                            Err(e) => {
                                warn!(
                                    start = chunk_start,
                                    end = chunk_end,
                                    error = %e,
                                    "range repair failed"
                                );
                                self.state.last_error =
                                    Some(format!("range {}..{}: {}", chunk_start, chunk_end, e));
                                tally.had_errors = true;
                            }
                        }
                    }
                }
            }
        }

        Ok(tally)
    }

    async fn filtered_collections(&self, site: Site) -> Result<BTreeSet<String>> {
        let all = self.store.collections(site).await?;
        Ok(all
            .into_iter()
            .filter(|name| {
                let excluded = self.exclude.iter().any(|p| p.matches(name));
                if excluded {
                    debug!(collection = %name, "excluded by pattern");
                }
                !excluded
            })
            .collect())
    }
}

#[derive(Debug, Default)]
struct CollectionTally {
    units_checked: u64,
    gaps_found: u64,
    units_repaired: u64,
    rows_synced: u64,
    had_errors: bool,
}

/// Bucket stores key units by their start timestamp; anything unparsable
/// is dropped rather than trusted.
fn parse_bucket_counts(
    counts: &std::collections::BTreeMap<String, u64>,
) -> std::collections::BTreeMap<u64, u64> {
    counts
        .iter()
        .filter_map(|(ts, &count)| ts.parse::<u64>().ok().map(|ts| (ts, count)))
        .collect()
}
