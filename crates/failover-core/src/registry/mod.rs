//! Plugin-based provider and probe registry
//!
//! The registry lets DNS providers and health probes be registered at
//! runtime, so daemons construct their collaborators from configuration
//! without hardcoded if-else chains.
//!
//! ## Registration
//!
//! Implementation crates expose a `register()` function:
//!
//! ```rust,ignore
//! // In failover-provider-cloudflare
//! pub fn register(registry: &ProviderRegistry) {
//!     registry.register_provider("cloudflare", Box::new(CloudflareFactory));
//! }
//! ```

use std::collections::HashMap;
use std::sync::RwLock;

use crate::config::{HealthConfig, ProviderConfig, RecordSpec};
use crate::error::{Error, Result};
use crate::traits::{DnsProvider, DnsProviderFactory, HealthProbe, HealthProbeFactory};

/// Registry mapping config type names to factories
///
/// Uses interior mutability with RwLock so registration and lookup can
/// share one instance across tasks.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, Box<dyn DnsProviderFactory>>>,
    probes: RwLock<HashMap<String, Box<dyn HealthProbeFactory>>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a DNS provider factory under a type name
    pub fn register_provider(&self, name: impl Into<String>, factory: Box<dyn DnsProviderFactory>) {
        self.providers.write().unwrap().insert(name.into(), factory);
    }

    /// Register a health probe factory under a type name
    pub fn register_probe(&self, name: impl Into<String>, factory: Box<dyn HealthProbeFactory>) {
        self.probes.write().unwrap().insert(name.into(), factory);
    }

    /// Create a DNS provider from configuration
    pub fn create_provider(
        &self,
        config: &ProviderConfig,
        record: &RecordSpec,
    ) -> Result<Box<dyn DnsProvider>> {
        let provider_type = config.type_name();
        let providers = self.providers.read().unwrap();

        let factory = providers
            .get(provider_type)
            .ok_or_else(|| Error::config(format!("unknown provider type: {}", provider_type)))?;

        factory.create(config, record)
    }

    /// Create a health probe from configuration
    pub fn create_probe(&self, config: &HealthConfig) -> Result<Box<dyn HealthProbe>> {
        let probe_type = config.type_name();
        let probes = self.probes.read().unwrap();

        let factory = probes
            .get(probe_type)
            .ok_or_else(|| Error::config(format!("unknown probe type: {}", probe_type)))?;

        factory.create(config)
    }

    /// List registered provider type names
    pub fn list_providers(&self) -> Vec<String> {
        self.providers.read().unwrap().keys().cloned().collect()
    }

    /// Check if a provider type is registered
    pub fn has_provider(&self, name: &str) -> bool {
        self.providers.read().unwrap().contains_key(name)
    }
}

/// Factory for the file provider that ships with this crate
pub struct FileProviderFactory;

impl DnsProviderFactory for FileProviderFactory {
    fn create(
        &self,
        config: &ProviderConfig,
        _record: &RecordSpec,
    ) -> Result<Box<dyn DnsProvider>> {
        match config {
            ProviderConfig::File { path } => {
                Ok(Box::new(crate::providers::FileProvider::new(path)))
            }
            other => Err(Error::config(format!(
                "file factory cannot build '{}' provider",
                other.type_name()
            ))),
        }
    }
}

/// Factory for the TCP probe that ships with this crate
pub struct TcpProbeFactory;

impl HealthProbeFactory for TcpProbeFactory {
    fn create(&self, config: &HealthConfig) -> Result<Box<dyn HealthProbe>> {
        match config {
            HealthConfig::Tcp {
                host,
                port,
                timeout_secs,
            } => Ok(Box::new(crate::probe::TcpProbe::new(
                host.clone(),
                *port,
                std::time::Duration::from_secs(*timeout_secs),
            ))),
            other => Err(Error::config(format!(
                "tcp factory cannot build '{}' probe",
                other.type_name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_builds_registered_providers() {
        let registry = ProviderRegistry::new();
        assert!(!registry.has_provider("file"));

        registry.register_provider("file", Box::new(FileProviderFactory));
        assert!(registry.has_provider("file"));
        assert!(registry.list_providers().contains(&"file".to_string()));

        let record = RecordSpec {
            record: "ingest.example.com".to_string(),
            zone: "example.com".to_string(),
            server: None,
            ttl: 30,
        };
        let provider = registry
            .create_provider(
                &ProviderConfig::File {
                    path: "/tmp/zone.json".into(),
                },
                &record,
            )
            .unwrap();
        assert_eq!(provider.provider_name(), "file");
    }

    #[test]
    fn unknown_provider_type_is_a_config_error() {
        let registry = ProviderRegistry::new();
        let record = RecordSpec {
            record: "r.example.com".to_string(),
            zone: "example.com".to_string(),
            server: None,
            ttl: 30,
        };
        let err = registry
            .create_provider(
                &ProviderConfig::Custom {
                    factory: "nope".to_string(),
                    config: serde_json::json!({}),
                },
                &record,
            )
            .err()
            .expect("expected an error");
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn tcp_factory_rejects_metrics_config() {
        let factory = TcpProbeFactory;
        let err = factory
            .create(&HealthConfig::Metrics {
                url: "http://x/metrics".to_string(),
                metric: "m".to_string(),
                stale_count: 3,
                timeout_secs: 2,
            })
            .err()
            .expect("expected an error");
        assert!(matches!(err, Error::Config(_)));
    }
}
