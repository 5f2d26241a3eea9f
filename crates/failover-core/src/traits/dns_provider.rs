// # DNS Provider Trait
//
// Defines the interface for publishing and reading the authoritative
// record pair: the A record the world resolves, and the TXT record
// carrying the lease token.
//
// ## Implementations
//
// - File (local JSON, tests and dry runs): this crate, `providers::file`
// - RFC 2136 / nsupdate: `failover-provider-rfc2136` crate
// - Cloudflare API v4: `failover-provider-cloudflare` crate
// - Script (caller-supplied executables): `failover-provider-script` crate
//
// Providers hold the record name, zone and TTL from construction; the
// controller only ever hands them the changing parts of the pair.

use async_trait::async_trait;
use std::net::Ipv4Addr;

use crate::config::Role;

/// The last durably published values of the record pair.
///
/// Either side may be `None` when the record does not exist yet. Readers
/// must also be prepared for the two records to disagree briefly: most
/// providers cannot commit the pair atomically, so an updated A with a
/// stale TXT (or vice versa) is not a protocol violation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordSet {
    /// A record value
    pub a: Option<Ipv4Addr>,
    /// Raw TXT record value (lease token)
    pub txt: Option<String>,
}

/// Trait for DNS provider implementations
///
/// Both operations are total from the controller's point of view: a
/// provider either succeeds or fails with a transient error the controller
/// retries on its next tick.
///
/// # Retries
///
/// Providers must not retry internally beyond one bounded attempt per
/// call. The controller owns the outer retry schedule; a provider that
/// sleeps and retries would stretch the heartbeat period and delay
/// promotion.
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Upsert the A and TXT records at the configured name.
    ///
    /// Must overwrite any prior values and must not fail on "already
    /// exists". The pair is not required to commit atomically; write the
    /// A record before the TXT record where the implementation has any
    /// ordering control.
    async fn set_records(
        &self,
        ip: Ipv4Addr,
        owner: Role,
        expires_at: u64,
    ) -> Result<(), crate::Error>;

    /// Read the last durably published record pair.
    ///
    /// Values cached up to the DNS TTL are acceptable; missing records
    /// come back as `None`, not as an error.
    async fn get_records(&self) -> Result<RecordSet, crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing DNS providers from configuration
pub trait DnsProviderFactory: Send + Sync {
    /// Create a DnsProvider instance from configuration
    fn create(
        &self,
        config: &crate::config::ProviderConfig,
        record: &crate::config::RecordSpec,
    ) -> Result<Box<dyn DnsProvider>, crate::Error>;
}
