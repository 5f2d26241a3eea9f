//! Lease token codec
//!
//! The coordination primitive of the whole system: a `(owner, expires_at)`
//! tuple serialised as `owner=<primary|dr> exp=<unix_seconds>` into the TXT
//! record that sits beside the authoritative A record.
//!
//! Parsing is total. Any malformed input decodes to `(owner: None, exp: 0)`,
//! which reads as an unowned, long-expired lease; promotion on top of it
//! is still gated behind the health-failure threshold.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::Role;

/// Decoded lease token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lease {
    /// Which site currently claims the record, if the token named one
    pub owner: Option<Role>,
    /// Unix-seconds expiry; 0 when absent or malformed
    pub expires_at: u64,
}

impl Lease {
    /// Encode a lease token for the TXT record
    pub fn encode(owner: Role, expires_at: u64) -> String {
        format!("owner={} exp={}", owner, expires_at)
    }

    /// Parse a TXT record value into a lease.
    ///
    /// Quotes (added by some providers) are stripped, the value is split on
    /// whitespace, and each `key=value` token is inspected. Unknown keys are
    /// ignored; missing or unparsable fields fall back to the defaults.
    pub fn parse(txt: &str) -> Self {
        let mut owner = None;
        let mut expires_at = 0;

        for token in txt.replace('"', "").split_whitespace() {
            let Some((key, value)) = token.split_once('=') else {
                continue;
            };
            match key {
                "owner" => owner = value.parse().ok(),
                "exp" => expires_at = value.parse().unwrap_or(0),
                _ => {}
            }
        }

        Self { owner, expires_at }
    }

    /// Whether the lease has lapsed at the given instant
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at < now
    }

    /// Seconds until expiry (negative once lapsed)
    pub fn time_remaining(&self, now: u64) -> i64 {
        self.expires_at as i64 - now as i64
    }
}

/// Current wall-clock time in unix seconds
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
