// # Unit Store Trait
//
// The parity reconciler's view of a pair of append-only datastores. A
// store adapter talks to the same datastore software on both sites and is
// parametric over the *data unit* being compared and repaired:
//
// - partitioned tables: a unit is `(database.table, partition_id)` with an
//   exact row count
// - time-bucketed metrics: a unit is a bucket start timestamp with a
//   sample count
//
// ## Implementations
//
// - ClickHouse (partitions): `failover-store-clickhouse` crate
// - VictoriaMetrics (buckets): `failover-store-victoriametrics` crate

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Which side of the pair an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Site {
    /// The datastore co-located with this reconciler
    Local,
    /// The datastore at the other site
    Remote,
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Site::Local => "local",
            Site::Remote => "remote",
        })
    }
}

/// How the reconciler decides a unit has a gap, and how it repairs one
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GapPolicy {
    /// Exact-row units: gap when the destination count is below the
    /// source count. Repaired one unit at a time via `repair_unit`.
    ExactRows,

    /// Count-bucketed units: gap when `dest/source < threshold` (source
    /// non-zero). Gap buckets are merged into contiguous ranges of width
    /// `step`, chunked to at most `max_span` seconds, and repaired via
    /// `repair_range`.
    SampleRatio {
        /// Acceptable destination/source ratio, in (0, 1]
        threshold: f64,
        /// Bucket width in seconds
        step: u64,
        /// Maximum seconds repaired per call
        max_span: u64,
    },
}

/// Trait for datastore adapters
///
/// Collections are the level at which data units are namespaced: tables
/// for a partitioned store, a single implicit collection for a bucketed
/// one. Repair must be idempotent — re-running a repair after a partial
/// failure converges to the same destination state.
#[async_trait]
pub trait UnitStore: Send + Sync {
    /// Health ping for one side
    async fn ping(&self, site: Site) -> Result<(), crate::Error>;

    /// Collections that exist on a site
    async fn collections(&self, site: Site) -> Result<BTreeSet<String>, crate::Error>;

    /// Create a collection on `dest` from the DDL published by `source`
    async fn create_collection(
        &self,
        source: Site,
        dest: Site,
        collection: &str,
    ) -> Result<(), crate::Error>;

    /// Per-unit counts within one collection on one site
    async fn unit_counts(
        &self,
        site: Site,
        collection: &str,
    ) -> Result<BTreeMap<String, u64>, crate::Error>;

    /// The gap predicate and repair shape for this store's units
    fn gap_policy(&self) -> GapPolicy;

    /// Idempotently replace `dest`'s copy of one unit with `source`'s.
    ///
    /// Returns the destination row count after repair. Only meaningful for
    /// `GapPolicy::ExactRows` stores.
    async fn repair_unit(
        &self,
        source: Site,
        dest: Site,
        collection: &str,
        unit: &str,
    ) -> Result<u64, crate::Error> {
        let _ = (source, dest, collection, unit);
        Err(crate::Error::datastore(format!(
            "{} does not support per-unit repair",
            self.store_name()
        )))
    }

    /// Idempotently copy the time range `[start, end)` from `source` to
    /// `dest`. Returns the transferred volume. Only meaningful for
    /// `GapPolicy::SampleRatio` stores.
    async fn repair_range(
        &self,
        source: Site,
        dest: Site,
        start: u64,
        end: u64,
    ) -> Result<u64, crate::Error> {
        let _ = (source, dest, start, end);
        Err(crate::Error::datastore(format!(
            "{} does not support range repair",
            self.store_name()
        )))
    }

    /// Get the store name (for logging/debugging)
    fn store_name(&self) -> &'static str;
}
