//! Test doubles and common utilities for the contract tests
//!
//! These doubles record every interaction so the tests can assert on what
//! the control loops actually did, not just on their return values.

use async_trait::async_trait;
use failover_core::config::{
    FailoverConfig, HealthConfig, NotifyConfig, ProviderConfig, ReconcilerConfig, RecordSpec, Role,
};
use failover_core::error::{Error, Result};
use failover_core::resolver::LeaseResolver;
use failover_core::traits::{
    DnsProvider, GapPolicy, HealthProbe, Notifier, NotifyEvent, RecordSet, Site, UnitStore,
    Workload,
};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const PRIMARY_IP: &str = "10.10.10.10";
pub const DR_IP: &str = "10.20.20.10";

pub fn primary_ip() -> Ipv4Addr {
    PRIMARY_IP.parse().unwrap()
}

pub fn dr_ip() -> Ipv4Addr {
    DR_IP.parse().unwrap()
}

/// One recorded provider write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCall {
    pub ip: Ipv4Addr,
    pub owner: Role,
    pub expires_at: u64,
}

#[derive(Default)]
struct MockProviderInner {
    records: RecordSet,
    writes: Vec<WriteCall>,
    fail_writes: bool,
    fail_reads: bool,
}

/// In-memory DNS provider with a write log
#[derive(Clone, Default)]
pub struct MockDnsProvider {
    inner: Arc<Mutex<MockProviderInner>>,
}

impl MockDnsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the stored record pair directly (simulates another writer)
    pub fn seed(&self, ip: Ipv4Addr, txt: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.records = RecordSet {
            a: Some(ip),
            txt: Some(txt.to_string()),
        };
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.lock().unwrap().fail_writes = fail;
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.inner.lock().unwrap().fail_reads = fail;
    }

    pub fn writes(&self) -> Vec<WriteCall> {
        self.inner.lock().unwrap().writes.clone()
    }

    pub fn records(&self) -> RecordSet {
        self.inner.lock().unwrap().records.clone()
    }
}

#[async_trait]
impl DnsProvider for MockDnsProvider {
    async fn set_records(&self, ip: Ipv4Addr, owner: Role, expires_at: u64) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_writes {
            return Err(Error::provider("mock", "write disabled"));
        }
        inner.records = RecordSet {
            a: Some(ip),
            txt: Some(failover_core::Lease::encode(owner, expires_at)),
        };
        inner.writes.push(WriteCall {
            ip,
            owner,
            expires_at,
        });
        Ok(())
    }

    async fn get_records(&self) -> Result<RecordSet> {
        let inner = self.inner.lock().unwrap();
        if inner.fail_reads {
            return Err(Error::provider("mock", "read disabled"));
        }
        Ok(inner.records.clone())
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// Probe that replays a scripted sequence of answers, then a default
#[derive(Clone)]
pub struct ScriptedProbe {
    answers: Arc<Mutex<VecDeque<bool>>>,
    default: bool,
}

impl ScriptedProbe {
    pub fn new(answers: impl IntoIterator<Item = bool>, default: bool) -> Self {
        Self {
            answers: Arc::new(Mutex::new(answers.into_iter().collect())),
            default,
        }
    }

    pub fn always(answer: bool) -> Self {
        Self::new([], answer)
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn check(&self) -> bool {
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.default)
    }

    fn probe_name(&self) -> &'static str {
        "scripted"
    }
}

/// Resolver answering from a shared, mutable slot
#[derive(Clone, Default)]
pub struct MockResolver {
    answer: Arc<Mutex<Option<Ipv4Addr>>>,
    fail: Arc<AtomicBool>,
}

impl MockResolver {
    pub fn pointing_at(ip: Ipv4Addr) -> Self {
        let resolver = Self::default();
        resolver.set_answer(Some(ip));
        resolver
    }

    pub fn set_answer(&self, ip: Option<Ipv4Addr>) {
        *self.answer.lock().unwrap() = ip;
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl LeaseResolver for MockResolver {
    async fn resolve_ipv4(&self) -> Result<Option<Ipv4Addr>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::resolve("resolver disabled"));
        }
        Ok(*self.answer.lock().unwrap())
    }
}

/// Workload tracking start/stop counts and a running flag
#[derive(Clone, Default)]
pub struct CountingWorkload {
    running: Arc<AtomicBool>,
    starts: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
}

impl CountingWorkload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Simulate the workload dying underneath the follower
    pub fn crash(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Workload for CountingWorkload {
    async fn start(&mut self) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn is_running(&mut self) -> Result<bool> {
        Ok(self.running.load(Ordering::SeqCst))
    }

    fn workload_name(&self) -> &'static str {
        "counting"
    }
}

type CollectionMap = BTreeMap<String, BTreeMap<String, u64>>;

#[derive(Default)]
struct FakeStoreInner {
    local: CollectionMap,
    remote: CollectionMap,
    unhealthy: Option<Site>,
    repair_calls: Vec<String>,
    fail_repairs: bool,
}

/// In-memory datastore pair; repair copies source counts to dest
#[derive(Clone)]
pub struct FakeUnitStore {
    inner: Arc<Mutex<FakeStoreInner>>,
    policy: GapPolicy,
}

impl FakeUnitStore {
    pub fn exact() -> Self {
        Self {
            inner: Arc::default(),
            policy: GapPolicy::ExactRows,
        }
    }

    pub fn buckets(threshold: f64, step: u64, max_span: u64) -> Self {
        Self {
            inner: Arc::default(),
            policy: GapPolicy::SampleRatio {
                threshold,
                step,
                max_span,
            },
        }
    }

    pub fn set_units(&self, site: Site, collection: &str, units: &[(&str, u64)]) {
        let mut inner = self.inner.lock().unwrap();
        let side = match site {
            Site::Local => &mut inner.local,
            Site::Remote => &mut inner.remote,
        };
        side.insert(
            collection.to_string(),
            units.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        );
    }

    pub fn set_unhealthy(&self, site: Option<Site>) {
        self.inner.lock().unwrap().unhealthy = site;
    }

    pub fn set_fail_repairs(&self, fail: bool) {
        self.inner.lock().unwrap().fail_repairs = fail;
    }

    pub fn repair_calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().repair_calls.clone()
    }

    pub fn local_count(&self, collection: &str, unit: &str) -> Option<u64> {
        self.inner
            .lock()
            .unwrap()
            .local
            .get(collection)
            .and_then(|units| units.get(unit))
            .copied()
    }
}

#[async_trait]
impl UnitStore for FakeUnitStore {
    async fn ping(&self, site: Site) -> Result<()> {
        if self.inner.lock().unwrap().unhealthy == Some(site) {
            return Err(Error::datastore(format!("{} store down", site)));
        }
        Ok(())
    }

    async fn collections(&self, site: Site) -> Result<BTreeSet<String>> {
        let inner = self.inner.lock().unwrap();
        let side = match site {
            Site::Local => &inner.local,
            Site::Remote => &inner.remote,
        };
        Ok(side.keys().cloned().collect())
    }

    async fn create_collection(&self, source: Site, dest: Site, collection: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let exists = match source {
            Site::Local => inner.local.contains_key(collection),
            Site::Remote => inner.remote.contains_key(collection),
        };
        if !exists {
            return Err(Error::datastore(format!("{} missing on {}", collection, source)));
        }
        let side = match dest {
            Site::Local => &mut inner.local,
            Site::Remote => &mut inner.remote,
        };
        side.entry(collection.to_string()).or_default();
        Ok(())
    }

    async fn unit_counts(&self, site: Site, collection: &str) -> Result<BTreeMap<String, u64>> {
        let inner = self.inner.lock().unwrap();
        let side = match site {
            Site::Local => &inner.local,
            Site::Remote => &inner.remote,
        };
        Ok(side.get(collection).cloned().unwrap_or_default())
    }

    fn gap_policy(&self) -> GapPolicy {
        self.policy
    }

    async fn repair_unit(
        &self,
        source: Site,
        dest: Site,
        collection: &str,
        unit: &str,
    ) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_repairs {
            return Err(Error::datastore("repair disabled"));
        }
        inner
            .repair_calls
            .push(format!("{}:{}", collection, unit));

        let count = match source {
            Site::Local => inner.local.get(collection).and_then(|u| u.get(unit)),
            Site::Remote => inner.remote.get(collection).and_then(|u| u.get(unit)),
        }
        .copied()
        .unwrap_or(0);

        let side = match dest {
            Site::Local => &mut inner.local,
            Site::Remote => &mut inner.remote,
        };
        side.entry(collection.to_string())
            .or_default()
            .insert(unit.to_string(), count);
        Ok(count)
    }

    async fn repair_range(&self, source: Site, dest: Site, start: u64, end: u64) -> Result<u64> {
        let GapPolicy::SampleRatio { step, .. } = self.policy else {
            return Err(Error::datastore("not a bucket store"));
        };

        let mut inner = self.inner.lock().unwrap();
        if inner.fail_repairs {
            return Err(Error::datastore("repair disabled"));
        }
        inner.repair_calls.push(format!("range:{}:{}", start, end));

        let mut transferred = 0;
        let mut bucket = start;
        while bucket < end {
            let key = bucket.to_string();
            let count = match source {
                Site::Local => inner.local.values().next().and_then(|u| u.get(&key)),
                Site::Remote => inner.remote.values().next().and_then(|u| u.get(&key)),
            }
            .copied();
            if let Some(count) = count {
                let side = match dest {
                    Site::Local => &mut inner.local,
                    Site::Remote => &mut inner.remote,
                };
                if let Some(units) = side.values_mut().next() {
                    units.insert(key, count);
                }
                transferred += count;
            }
            bucket += step;
        }
        Ok(transferred)
    }

    fn store_name(&self) -> &'static str {
        "fake"
    }
}

/// Notifier collecting every event it is handed
#[derive(Clone, Default)]
pub struct CollectingNotifier {
    events: Arc<Mutex<Vec<(NotifyEvent, String)>>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(NotifyEvent, String)> {
        self.events.lock().unwrap().clone()
    }

    pub fn count_of(&self, event: NotifyEvent) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _)| *e == event)
            .count()
    }
}

#[async_trait]
impl Notifier for CollectingNotifier {
    async fn notify(&self, event: NotifyEvent, message: &str) {
        self.events
            .lock()
            .unwrap()
            .push((event, message.to_string()));
    }
}

/// Controller config against the mock provider
pub fn controller_config(role: Role, fail_threshold: u32) -> FailoverConfig {
    FailoverConfig {
        role,
        record: RecordSpec {
            record: "ingest.example.com".to_string(),
            zone: "example.com".to_string(),
            server: None,
            ttl: 30,
        },
        primary_ip: primary_ip(),
        dr_ip: dr_ip(),
        lease_ttl: 60,
        update_interval: 1,
        fail_threshold,
        provider: ProviderConfig::Custom {
            factory: "mock".to_string(),
            config: serde_json::json!({"mock": true}),
        },
        health: HealthConfig::Tcp {
            host: PRIMARY_IP.to_string(),
            port: 6514,
            timeout_secs: 1,
        },
    }
}

/// Reconciler config for a given role and state-file path
pub fn reconciler_config(role: Role, state_file: &std::path::Path) -> ReconcilerConfig {
    ReconcilerConfig {
        role,
        record: "ingest.example.com".to_string(),
        server: None,
        primary_ip: primary_ip(),
        dr_ip: dr_ip(),
        check_interval: 120,
        exclude_patterns: vec!["system.*".to_string()],
        failback_clean_checks: 3,
        auto_create_units: false,
        state_file: state_file.to_path_buf(),
        notify: NotifyConfig::default(),
    }
}
