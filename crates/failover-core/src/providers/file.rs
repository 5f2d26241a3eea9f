// # File DNS Provider
//
// A "zone" held in a local JSON file. No real DNS is involved; this is
// the provider used by tests, dry runs, and single-host demos where the
// record pair only needs to be observable by co-located processes.
//
// ## File Format
//
// ```json
// {
//   "A": "10.10.10.10",
//   "TXT": "owner=primary exp=1700000000",
//   "updated_at": "2025-01-09T12:00:00Z"
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::Error;
use crate::config::Role;
use crate::lease::Lease;
use crate::traits::{DnsProvider, RecordSet};

/// Serializable zone file contents
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ZoneFile {
    #[serde(rename = "A")]
    a: Option<Ipv4Addr>,
    #[serde(rename = "TXT")]
    txt: Option<String>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

/// File-backed DNS provider
#[derive(Debug)]
pub struct FileProvider {
    path: PathBuf,
}

impl FileProvider {
    /// Create a provider writing to the given zone file path
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }
}

#[async_trait]
impl DnsProvider for FileProvider {
    async fn set_records(&self, ip: Ipv4Addr, owner: Role, expires_at: u64) -> Result<(), Error> {
        let zone = ZoneFile {
            a: Some(ip),
            txt: Some(Lease::encode(owner, expires_at)),
            updated_at: chrono::Utc::now(),
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::provider("file", format!("cannot create {}: {}", parent.display(), e))
                })?;
            }
        }

        let json = serde_json::to_string_pretty(&zone)?;

        // Write-then-rename so readers never observe a torn zone file.
        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::provider(
                    "file",
                    format!("cannot create {}: {}", temp_path.display(), e),
                )
            })?;
            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::provider(
                    "file",
                    format!("cannot write {}: {}", temp_path.display(), e),
                )
            })?;
            file.flush().await.map_err(|e| {
                Error::provider(
                    "file",
                    format!("cannot flush {}: {}", temp_path.display(), e),
                )
            })?;
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::provider(
                "file",
                format!("cannot rename into {}: {}", self.path.display(), e),
            )
        })?;

        tracing::debug!(ip = %ip, owner = %owner, expires_at, "zone file updated");
        Ok(())
    }

    async fn get_records(&self) -> Result<RecordSet, Error> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(RecordSet::default());
            }
            Err(e) => {
                return Err(Error::provider(
                    "file",
                    format!("cannot read {}: {}", self.path.display(), e),
                ));
            }
        };

        let zone: ZoneFile = serde_json::from_str(&content)?;
        Ok(RecordSet {
            a: zone.a,
            txt: zone.txt,
        })
    }

    fn provider_name(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn missing_file_reads_as_absent_records() {
        let dir = tempdir().unwrap();
        let provider = FileProvider::new(dir.path().join("zone.json"));

        let records = provider.get_records().await.unwrap();
        assert_eq!(records, RecordSet::default());
    }

    #[tokio::test]
    async fn pair_is_coherent_after_write() {
        let dir = tempdir().unwrap();
        let provider = FileProvider::new(dir.path().join("zone.json"));

        let ip: Ipv4Addr = "10.10.10.10".parse().unwrap();
        provider.set_records(ip, Role::Primary, 1700000000).await.unwrap();

        let records = provider.get_records().await.unwrap();
        assert_eq!(records.a, Some(ip));

        let lease = Lease::parse(records.txt.as_deref().unwrap());
        assert_eq!(lease.owner, Some(Role::Primary));
        assert_eq!(lease.expires_at, 1700000000);
    }

    #[tokio::test]
    async fn second_write_overwrites_first() {
        let dir = tempdir().unwrap();
        let provider = FileProvider::new(dir.path().join("zone.json"));

        provider
            .set_records("10.10.10.10".parse().unwrap(), Role::Primary, 100)
            .await
            .unwrap();
        provider
            .set_records("10.20.20.10".parse().unwrap(), Role::Dr, 200)
            .await
            .unwrap();

        let records = provider.get_records().await.unwrap();
        assert_eq!(records.a, Some("10.20.20.10".parse().unwrap()));
        let lease = Lease::parse(records.txt.as_deref().unwrap());
        assert_eq!(lease.owner, Some(Role::Dr));
        assert_eq!(lease.expires_at, 200);
    }

    #[tokio::test]
    async fn parent_directories_are_created() {
        let dir = tempdir().unwrap();
        let provider = FileProvider::new(dir.path().join("state/nested/zone.json"));

        provider
            .set_records("10.10.10.10".parse().unwrap(), Role::Primary, 1)
            .await
            .unwrap();
        assert!(provider.get_records().await.unwrap().a.is_some());
    }
}
