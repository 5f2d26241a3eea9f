//! Lease record resolution
//!
//! Followers and reconcilers never write DNS; they observe ownership by
//! resolving the coordinated A record like any other client. Resolution
//! goes through the system resolver by default, or a specific name server
//! when one is configured (matching what the controller writes through).

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::error::{Error, Result};

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Trait for resolving the coordinated record to its current A value
///
/// Abstracted so the follower and reconciler loops can be driven by test
/// doubles; production code uses [`RecordResolver`].
#[async_trait]
pub trait LeaseResolver: Send + Sync {
    /// Resolve the record. `Ok(None)` means the record does not exist;
    /// `Err` means resolution itself failed (observers treat that as "no
    /// information" and keep their last state).
    async fn resolve_ipv4(&self) -> Result<Option<Ipv4Addr>>;
}

/// Resolver backed by hickory-resolver
pub struct RecordResolver {
    record: String,
    resolver: TokioAsyncResolver,
}

impl RecordResolver {
    /// Build a resolver for one record.
    ///
    /// With `server` set, queries go to that server over UDP port 53;
    /// otherwise the system resolver configuration is used.
    pub fn new(record: impl Into<String>, server: Option<IpAddr>) -> Result<Self> {
        let mut opts = ResolverOpts::default();
        opts.timeout = LOOKUP_TIMEOUT;

        let resolver = match server {
            Some(addr) => {
                let mut config = ResolverConfig::new();
                config.add_name_server(NameServerConfig::new(
                    SocketAddr::new(addr, 53),
                    Protocol::Udp,
                ));
                TokioAsyncResolver::tokio(config, opts)
            }
            None => TokioAsyncResolver::tokio_from_system_conf()
                .map_err(|e| Error::resolve(format!("system resolver unavailable: {}", e)))?,
        };

        Ok(Self {
            record: record.into(),
            resolver,
        })
    }
}

#[async_trait]
impl LeaseResolver for RecordResolver {
    async fn resolve_ipv4(&self) -> Result<Option<Ipv4Addr>> {
        match self.resolver.lookup_ip(self.record.as_str()).await {
            Ok(lookup) => Ok(lookup.iter().find_map(|ip| match ip {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            })),
            Err(e) => match e.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => Ok(None),
                _ => Err(Error::resolve(format!(
                    "lookup of {} failed: {}",
                    self.record, e
                ))),
            },
        }
    }
}
