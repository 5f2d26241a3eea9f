// # ClickHouse Store Adapter
//
// Partition-unit datastore adapter over the ClickHouse HTTP interface.
// Collections are `database.table` names of MergeTree-family tables;
// units are partition ids with exact row counts from `system.parts`.
//
// Repair is DROP PARTITION on the destination (tolerated when absent)
// followed by `INSERT ... SELECT ... remote(...)` pulling the partition
// from the source's native port, then a row-count readback. Re-running a
// partial repair converges because the drop clears whatever half arrived.
//
// Assumes tables are partitioned (typically by toYYYYMMDD(timestamp));
// unpartitioned MergeTree tables surface as the single partition
// `tuple()`.

use async_trait::async_trait;
use failover_core::traits::{GapPolicy, Site, UnitStore};
use failover_core::{Error, Result};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

const PING_TIMEOUT: Duration = Duration::from_secs(5);
const QUERY_TIMEOUT: Duration = Duration::from_secs(60);
// Large partitions take a while to copy across sites.
const INSERT_TIMEOUT: Duration = Duration::from_secs(600);

/// Connection settings for one ClickHouse side
#[derive(Debug, Clone)]
pub struct Endpoint {
    /// HTTP interface base URL, e.g. "http://10.10.10.10:8123"
    pub url: String,
    pub user: String,
    pub password: String,
}

/// ClickHouse store adapter
pub struct ClickhouseStore {
    local: Endpoint,
    remote: Endpoint,
    /// Native-protocol address of the remote, for `remote()` table pulls
    remote_native_host: String,
    remote_native_port: u16,
    connect_timeout_ms: u64,
    max_insert_threads: u32,
    client: reqwest::Client,
}

impl std::fmt::Debug for ClickhouseStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClickhouseStore")
            .field("local", &self.local.url)
            .field("remote", &self.remote.url)
            .field("remote_native", &format!("{}:{}", self.remote_native_host, self.remote_native_port))
            .finish()
    }
}

impl ClickhouseStore {
    pub fn new(
        local: Endpoint,
        remote: Endpoint,
        remote_native_host: impl Into<String>,
        remote_native_port: u16,
        connect_timeout_ms: u64,
        max_insert_threads: u32,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::datastore(format!("cannot build client: {}", e)))?;

        Ok(Self {
            local,
            remote,
            remote_native_host: remote_native_host.into(),
            remote_native_port,
            connect_timeout_ms,
            max_insert_threads,
            client,
        })
    }

    fn endpoint(&self, site: Site) -> &Endpoint {
        match site {
            Site::Local => &self.local,
            Site::Remote => &self.remote,
        }
    }

    fn request(&self, site: Site, sql: String, timeout: Duration) -> reqwest::RequestBuilder {
        let endpoint = self.endpoint(site);
        let mut request = self
            .client
            .post(format!("{}/", endpoint.url))
            .timeout(timeout)
            .header("Content-Type", "text/plain")
            .body(sql);
        if !endpoint.password.is_empty() {
            request = request.basic_auth(&endpoint.user, Some(&endpoint.password));
        } else if !endpoint.user.is_empty() {
            request = request.header("X-ClickHouse-User", &endpoint.user);
        }
        request
    }

    async fn send(&self, site: Site, sql: String, timeout: Duration) -> Result<String> {
        let response = self
            .request(site, sql, timeout)
            .send()
            .await
            .map_err(|e| Error::datastore(format!("{} query failed: {}", site, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::datastore(format!("{} response unreadable: {}", site, e)))?;

        if !status.is_success() {
            return Err(Error::datastore(format!(
                "{} query rejected ({}): {}",
                site,
                status,
                body.trim()
            )));
        }
        Ok(body)
    }

    /// Run a SELECT and return its rows (`FORMAT JSON` is appended when
    /// the statement does not already carry a FORMAT clause).
    async fn query(&self, site: Site, sql: &str) -> Result<Vec<Value>> {
        let sql = if sql.to_uppercase().contains(" FORMAT ") {
            sql.to_string()
        } else {
            format!("{} FORMAT JSON", sql.trim().trim_end_matches(';'))
        };

        let body = self.send(site, sql, QUERY_TIMEOUT).await?;
        let json: Value = serde_json::from_str(&body)
            .map_err(|e| Error::datastore(format!("{} returned invalid JSON: {}", site, e)))?;
        Ok(json["data"].as_array().cloned().unwrap_or_default())
    }

    /// Run a statement for effect only
    async fn execute(&self, site: Site, sql: String, timeout: Duration) -> Result<()> {
        self.send(site, sql, timeout).await.map(|_| ())
    }

    fn split_collection(collection: &str) -> Result<(&str, &str)> {
        collection
            .split_once('.')
            .ok_or_else(|| Error::datastore(format!("malformed collection name: {}", collection)))
    }
}

/// Single-quote escape for values interpolated into SQL literals
fn sql_quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

#[async_trait]
impl UnitStore for ClickhouseStore {
    async fn ping(&self, site: Site) -> Result<()> {
        let url = format!("{}/ping", self.endpoint(site).url);
        let response = self
            .client
            .get(&url)
            .timeout(PING_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::datastore(format!("{} ping failed: {}", site, e)))?;
        if !response.status().is_success() {
            return Err(Error::datastore(format!(
                "{} ping returned {}",
                site,
                response.status()
            )));
        }
        Ok(())
    }

    async fn collections(&self, site: Site) -> Result<BTreeSet<String>> {
        let rows = self
            .query(
                site,
                "SELECT database, name AS table FROM system.tables \
                 WHERE database NOT IN ('system', 'INFORMATION_SCHEMA', 'information_schema') \
                 AND engine LIKE '%MergeTree%'",
            )
            .await?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                let database = row["database"].as_str()?;
                let table = row["table"].as_str()?;
                Some(format!("{}.{}", database, table))
            })
            .collect())
    }

    async fn create_collection(&self, source: Site, dest: Site, collection: &str) -> Result<()> {
        let (database, table) = Self::split_collection(collection)?;

        let rows = self
            .query(
                source,
                &format!("SHOW CREATE TABLE `{}`.`{}`", database, table),
            )
            .await?;
        let ddl = rows
            .first()
            .and_then(|row| row["statement"].as_str())
            .ok_or_else(|| Error::datastore(format!("no DDL returned for {}", collection)))?
            .to_string();

        self.execute(
            dest,
            format!("CREATE DATABASE IF NOT EXISTS `{}`", database),
            QUERY_TIMEOUT,
        )
        .await?;
        self.execute(dest, ddl, QUERY_TIMEOUT).await?;

        tracing::info!(collection = %collection, "created table from source DDL");
        Ok(())
    }

    async fn unit_counts(&self, site: Site, collection: &str) -> Result<BTreeMap<String, u64>> {
        let (database, table) = Self::split_collection(collection)?;
        let rows = self
            .query(
                site,
                &format!(
                    "SELECT partition, sum(rows) AS row_count FROM system.parts \
                     WHERE database = '{}' AND table = '{}' AND active = 1 \
                     GROUP BY partition ORDER BY partition",
                    sql_quote(database),
                    sql_quote(table)
                ),
            )
            .await?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                let partition = row["partition"].as_str()?.to_string();
                // sum() comes back as a JSON string for UInt64.
                let count = match &row["row_count"] {
                    Value::String(s) => s.parse().ok()?,
                    Value::Number(n) => n.as_u64()?,
                    _ => return None,
                };
                Some((partition, count))
            })
            .collect())
    }

    fn gap_policy(&self) -> GapPolicy {
        GapPolicy::ExactRows
    }

    async fn repair_unit(
        &self,
        source: Site,
        dest: Site,
        collection: &str,
        unit: &str,
    ) -> Result<u64> {
        if source != Site::Remote || dest != Site::Local {
            return Err(Error::datastore(
                "clickhouse repair only pulls from remote to local",
            ));
        }
        let (database, table) = Self::split_collection(collection)?;

        // Drop first so the insert cannot duplicate rows. The partition
        // may simply not exist locally yet.
        let drop_sql = format!(
            "ALTER TABLE `{}`.`{}` DROP PARTITION '{}'",
            database,
            table,
            sql_quote(unit)
        );
        if let Err(e) = self.execute(Site::Local, drop_sql, QUERY_TIMEOUT).await {
            tracing::debug!(unit = %unit, error = %e, "partition drop failed (may not exist)");
        }

        let insert_sql = format!(
            "INSERT INTO `{db}`.`{table}` \
             SELECT * FROM remote('{host}:{port}', '{db}.{table}', '{user}', '{password}') \
             WHERE _partition_id = '{partition}' \
             SETTINGS connect_timeout_with_failover_ms = {connect_timeout}, \
             max_insert_threads = {threads}",
            db = database,
            table = table,
            host = self.remote_native_host,
            port = self.remote_native_port,
            user = sql_quote(&self.remote.user),
            password = sql_quote(&self.remote.password),
            partition = sql_quote(unit),
            connect_timeout = self.connect_timeout_ms,
            threads = self.max_insert_threads,
        );
        self.execute(Site::Local, insert_sql, INSERT_TIMEOUT).await?;

        // Read back what actually landed.
        let rows = self
            .query(
                Site::Local,
                &format!(
                    "SELECT sum(rows) AS cnt FROM system.parts \
                     WHERE database = '{}' AND table = '{}' AND partition = '{}' AND active = 1",
                    sql_quote(database),
                    sql_quote(table),
                    sql_quote(unit)
                ),
            )
            .await?;
        let count = rows
            .first()
            .and_then(|row| match &row["cnt"] {
                Value::String(s) => s.parse().ok(),
                Value::Number(n) => n.as_u64(),
                _ => None,
            })
            .unwrap_or(0);

        tracing::info!(collection = %collection, unit = %unit, rows = count, "partition repaired");
        Ok(count)
    }

    fn store_name(&self) -> &'static str {
        "clickhouse"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ClickhouseStore {
        ClickhouseStore::new(
            Endpoint {
                url: "http://localhost:8123".to_string(),
                user: "default".to_string(),
                password: String::new(),
            },
            Endpoint {
                url: "http://localhost:8124".to_string(),
                user: "default".to_string(),
                password: String::new(),
            },
            "localhost",
            9000,
            2000,
            4,
        )
        .unwrap()
    }

    #[test]
    fn collection_names_split_on_the_first_dot() {
        assert_eq!(
            ClickhouseStore::split_collection("logs.syslog_raw").unwrap(),
            ("logs", "syslog_raw")
        );
        assert!(ClickhouseStore::split_collection("no_dot").is_err());
    }

    #[test]
    fn sql_quoting_escapes_quotes_and_backslashes() {
        assert_eq!(sql_quote("2024-01-02"), "2024-01-02");
        assert_eq!(sql_quote("o'clock"), "o\\'clock");
        assert_eq!(sql_quote("a\\b"), "a\\\\b");
    }

    #[test]
    fn repair_rejects_unsupported_direction() {
        let store = store();
        let err = tokio_test::block_on(store.repair_unit(
            Site::Local,
            Site::Remote,
            "db.t",
            "20240102",
        ))
        .unwrap_err();
        assert!(err.to_string().contains("remote to local"));
    }

    #[test]
    fn gap_policy_is_exact_rows() {
        assert_eq!(store().gap_policy(), GapPolicy::ExactRows);
    }
}
