use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::{debug, info, warn};

use crate::error::TreasuryError;

/// The persisted tables. Each is one JSON document, locally a file in the
/// data directory and remotely a keyed row in the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Balances,
    Loans,
    Transactions,
    Gdp,
}

impl Table {
    pub const ALL: [Table; 4] = [
        Table::Balances,
        Table::Loans,
        Table::Transactions,
        Table::Gdp,
    ];

    /// Remote mirror key and logical table name.
    pub fn key(&self) -> &'static str {
        match self {
            Table::Balances => "balances",
            Table::Loans => "loans",
            Table::Transactions => "transactions",
            Table::Gdp => "gdp",
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            Table::Balances => "balances.json",
            Table::Loans => "loans.json",
            Table::Transactions => "transactions.json",
            Table::Gdp => "gdp.json",
        }
    }

    /// Secondary on-disk replica, maintained on a subset of writes.
    pub fn replica_file_name(&self) -> &'static str {
        match self {
            Table::Balances => "balances_backup.json",
            Table::Loans => "loans_backup.json",
            Table::Transactions => "transactions_backup.json",
            Table::Gdp => "gdp_backup.json",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|table| table.key() == key)
    }
}

/// Local snapshot layer: one JSON file per table plus a probabilistic
/// secondary replica that limits write amplification while still giving a
/// fallback when the primary is missing or unparseable.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    data_dir: PathBuf,
    /// Probability that a write also refreshes the secondary replica.
    replica_odds: f64,
}

impl SnapshotStore {
    pub const DEFAULT_REPLICA_ODDS: f64 = 0.2;

    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self, TreasuryError> {
        Self::with_replica_odds(data_dir, Self::DEFAULT_REPLICA_ODDS)
    }

    pub fn with_replica_odds(
        data_dir: impl Into<PathBuf>,
        replica_odds: f64,
    ) -> Result<Self, TreasuryError> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)
            .map_err(|e| TreasuryError::Persistence(format!("create data dir failed: {e}")))?;
        Ok(Self {
            data_dir,
            replica_odds,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Write the primary document and, on a dice roll, the replica. A failed
    /// replica write is logged and swallowed; the primary write error
    /// propagates so the gateway can record a persistence failure.
    pub fn write(&self, table: Table, content: &str) -> Result<(), TreasuryError> {
        self.write_primary(table, content)?;
        if rand::random::<f64>() < self.replica_odds {
            let replica = self.data_dir.join(table.replica_file_name());
            if let Err(e) = std::fs::write(&replica, content) {
                warn!(table = table.key(), error = %e, "secondary replica write failed");
            }
        }
        Ok(())
    }

    /// Overwrite only the primary document. Used by the remote restore,
    /// which is authoritative and must not dilute the local replica.
    pub fn write_primary(&self, table: Table, content: &str) -> Result<(), TreasuryError> {
        let path = self.data_dir.join(table.file_name());
        std::fs::write(&path, content).map_err(|e| {
            TreasuryError::Persistence(format!("write {} failed: {e}", path.display()))
        })
    }

    /// Load and parse a table document, trying primary then replica. An
    /// unreadable pair is not fatal: the table initializes to its default.
    pub fn load<T>(&self, table: Table) -> T
    where
        T: DeserializeOwned + Default,
    {
        for (label, file) in [
            ("primary", table.file_name()),
            ("replica", table.replica_file_name()),
        ] {
            let path = self.data_dir.join(file);
            match std::fs::read_to_string(&path) {
                Ok(raw) => match serde_json::from_str::<T>(&raw) {
                    Ok(value) => {
                        debug!(table = table.key(), source = label, "loaded table snapshot");
                        return value;
                    }
                    Err(e) => {
                        warn!(table = table.key(), source = label, error = %e, "snapshot unparseable");
                    }
                },
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(table = table.key(), source = label, error = %e, "snapshot unreadable");
                }
            }
        }
        info!(table = table.key(), "no usable snapshot, table starts empty");
        T::default()
    }
}

/// One table document held by the remote mirror.
#[derive(Debug, Clone)]
pub struct RemoteSnapshot {
    pub key: String,
    pub content: String,
    pub updated_at: DateTime<Utc>,
}

/// Remote durable key/value backup, upsert-by-table-name.
#[async_trait]
pub trait RemoteMirror: Send + Sync {
    async fn upsert(&self, key: &str, content: &str) -> Result<(), TreasuryError>;
    async fn fetch_all(&self) -> Result<Vec<RemoteSnapshot>, TreasuryError>;
}

/// Remote mirror backend selection.
#[derive(Debug, Clone, Default)]
pub enum MirrorConfig {
    /// Local snapshots only; restarts lose nothing on the same host but the
    /// remote safety net is off.
    #[default]
    Disabled,
    /// Mirror every table document to PostgreSQL and treat it as
    /// authoritative across restarts.
    Postgres {
        database_url: String,
        max_connections: u32,
    },
}

impl MirrorConfig {
    pub fn disabled() -> Self {
        Self::Disabled
    }

    pub fn postgres(database_url: impl Into<String>, max_connections: u32) -> Self {
        Self::Postgres {
            database_url: database_url.into(),
            max_connections,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Postgres { .. } => "postgres",
        }
    }
}

/// PostgreSQL mirror: one row per table in `json_snapshots`.
#[derive(Debug, Clone)]
pub struct PostgresMirror {
    pool: PgPool,
}

impl PostgresMirror {
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
    ) -> Result<Self, TreasuryError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            // mirror calls are soft-fail; a hung pool must time out, not block
            .acquire_timeout(std::time::Duration::from_secs(10))
            .connect(database_url)
            .await
            .map_err(|e| TreasuryError::RemoteSync(format!("postgres connect failed: {e}")))?;
        let mirror = Self { pool };
        mirror.ensure_schema().await?;
        Ok(mirror)
    }

    async fn ensure_schema(&self) -> Result<(), TreasuryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS json_snapshots (
                table_name TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| TreasuryError::RemoteSync(format!("postgres schema create failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl RemoteMirror for PostgresMirror {
    async fn upsert(&self, key: &str, content: &str) -> Result<(), TreasuryError> {
        sqlx::query(
            r#"
            INSERT INTO json_snapshots (table_name, content, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (table_name)
            DO UPDATE SET content = EXCLUDED.content, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(key)
        .bind(content)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| TreasuryError::RemoteSync(format!("postgres upsert failed: {e}")))?;
        Ok(())
    }

    async fn fetch_all(&self) -> Result<Vec<RemoteSnapshot>, TreasuryError> {
        let rows = sqlx::query("SELECT table_name, content, updated_at FROM json_snapshots")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| TreasuryError::RemoteSync(format!("postgres fetch failed: {e}")))?;

        let mut snapshots = Vec::with_capacity(rows.len());
        for row in rows {
            snapshots.push(RemoteSnapshot {
                key: row
                    .try_get("table_name")
                    .map_err(|e| TreasuryError::RemoteSync(format!("decode table_name: {e}")))?,
                content: row
                    .try_get("content")
                    .map_err(|e| TreasuryError::RemoteSync(format!("decode content: {e}")))?,
                updated_at: row
                    .try_get("updated_at")
                    .map_err(|e| TreasuryError::RemoteSync(format!("decode updated_at: {e}")))?,
            });
        }
        Ok(snapshots)
    }
}

/// Dual-layer persistence: local snapshot files plus an optional remote
/// mirror.
///
/// Writes go local-first; the remote upsert is fire-and-forget so a slow or
/// failing mirror never blocks or fails a committed ledger mutation. On
/// boot, the remote copy is pulled down over local storage before anything
/// is loaded into memory.
#[derive(Clone)]
pub struct PersistenceGateway {
    local: SnapshotStore,
    mirror: Option<Arc<dyn RemoteMirror>>,
}

impl PersistenceGateway {
    pub async fn bootstrap(
        data_dir: impl Into<PathBuf>,
        config: MirrorConfig,
    ) -> Result<Self, TreasuryError> {
        let local = SnapshotStore::open(data_dir)?;
        let mirror: Option<Arc<dyn RemoteMirror>> = match config {
            MirrorConfig::Disabled => None,
            MirrorConfig::Postgres {
                database_url,
                max_connections,
            } => Some(Arc::new(
                PostgresMirror::connect(&database_url, max_connections).await?,
            )),
        };
        Ok(Self { local, mirror })
    }

    /// Gateway over an already constructed mirror, used by tests and
    /// alternative backends.
    pub fn with_mirror(local: SnapshotStore, mirror: Option<Arc<dyn RemoteMirror>>) -> Self {
        Self { local, mirror }
    }

    pub fn local(&self) -> &SnapshotStore {
        &self.local
    }

    pub fn has_mirror(&self) -> bool {
        self.mirror.is_some()
    }

    /// Pull every known table from the remote mirror over local storage.
    /// Remote is authoritative across restarts; unknown keys are ignored.
    pub async fn restore_from_remote(&self) -> Result<usize, TreasuryError> {
        let Some(mirror) = &self.mirror else {
            return Ok(0);
        };
        let snapshots = mirror.fetch_all().await?;
        let mut restored = 0;
        for snapshot in snapshots {
            let Some(table) = Table::from_key(&snapshot.key) else {
                debug!(key = %snapshot.key, "ignoring unknown remote key");
                continue;
            };
            self.local.write_primary(table, &snapshot.content)?;
            info!(
                table = table.key(),
                updated_at = %snapshot.updated_at,
                "restored table from remote mirror"
            );
            restored += 1;
        }
        Ok(restored)
    }

    /// Persist one table: local snapshot write-through, then a detached
    /// remote upsert. The remote leg logs failures and never propagates
    /// them; the next successful flush reconciles the mirror.
    pub fn flush(&self, table: Table, content: String) -> Result<(), TreasuryError> {
        self.local.write(table, &content)?;
        if let Some(mirror) = self.mirror.clone() {
            tokio::spawn(async move {
                if let Err(e) = mirror.upsert(table.key(), &content).await {
                    warn!(table = table.key(), error = %e, "remote mirror flush failed");
                }
            });
        }
        Ok(())
    }

    /// Flush one table and wait for the remote leg, for shutdown paths that
    /// must not race process exit.
    pub async fn flush_sync(&self, table: Table, content: String) -> Result<(), TreasuryError> {
        self.local.write(table, &content)?;
        if let Some(mirror) = &self.mirror {
            mirror.upsert(table.key(), &content).await?;
        }
        Ok(())
    }

    pub fn load<T>(&self, table: Table) -> T
    where
        T: DeserializeOwned + Default,
    {
        self.local.load(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// In-memory mirror standing in for PostgreSQL.
    #[derive(Default)]
    struct MemoryMirror {
        rows: Mutex<BTreeMap<String, RemoteSnapshot>>,
        fail_upserts: bool,
    }

    #[async_trait]
    impl RemoteMirror for MemoryMirror {
        async fn upsert(&self, key: &str, content: &str) -> Result<(), TreasuryError> {
            if self.fail_upserts {
                return Err(TreasuryError::RemoteSync("mirror offline".into()));
            }
            self.rows.lock().unwrap().insert(
                key.to_string(),
                RemoteSnapshot {
                    key: key.to_string(),
                    content: content.to_string(),
                    updated_at: Utc::now(),
                },
            );
            Ok(())
        }

        async fn fetch_all(&self) -> Result<Vec<RemoteSnapshot>, TreasuryError> {
            Ok(self.rows.lock().unwrap().values().cloned().collect())
        }
    }

    #[test]
    fn missing_files_load_default() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        let balances: BTreeMap<String, i64> = store.load(Table::Balances);
        assert!(balances.is_empty());
    }

    #[test]
    fn corrupt_primary_falls_back_to_replica() {
        let dir = TempDir::new().unwrap();
        // replica on every write so the fallback copy exists
        let store = SnapshotStore::with_replica_odds(dir.path(), 1.0).unwrap();
        store.write(Table::Balances, r#"{"A":42}"#).unwrap();

        std::fs::write(dir.path().join(Table::Balances.file_name()), "{oops").unwrap();

        let balances: BTreeMap<String, i64> = store.load(Table::Balances);
        assert_eq!(balances.get("A"), Some(&42));
    }

    #[test]
    fn corrupt_primary_and_replica_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(Table::Balances.file_name()), "{oops").unwrap();
        std::fs::write(dir.path().join(Table::Balances.replica_file_name()), "nope").unwrap();

        let store = SnapshotStore::open(dir.path()).unwrap();
        let balances: BTreeMap<String, i64> = store.load(Table::Balances);
        assert!(balances.is_empty());
    }

    #[test]
    fn zero_odds_never_writes_replica() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::with_replica_odds(dir.path(), 0.0).unwrap();
        for _ in 0..50 {
            store.write(Table::Loans, "[]").unwrap();
        }
        assert!(!dir.path().join(Table::Loans.replica_file_name()).exists());
    }

    #[tokio::test]
    async fn remote_restore_overwrites_local() {
        let dir = TempDir::new().unwrap();
        let local = SnapshotStore::open(dir.path()).unwrap();
        local.write_primary(Table::Balances, r#"{"A":1}"#).unwrap();

        let mirror = Arc::new(MemoryMirror::default());
        mirror.upsert("balances", r#"{"A":7,"B":3}"#).await.unwrap();
        mirror.upsert("stray_key", "{}").await.unwrap();

        let gateway = PersistenceGateway::with_mirror(local, Some(mirror));
        assert_eq!(gateway.restore_from_remote().await.unwrap(), 1);

        let balances: BTreeMap<String, i64> = gateway.load(Table::Balances);
        assert_eq!(balances.get("A"), Some(&7));
        assert_eq!(balances.get("B"), Some(&3));
    }

    #[tokio::test]
    async fn mirror_failure_does_not_fail_flush() {
        let dir = TempDir::new().unwrap();
        let local = SnapshotStore::with_replica_odds(dir.path(), 0.0).unwrap();
        let mirror = Arc::new(MemoryMirror {
            fail_upserts: true,
            ..MemoryMirror::default()
        });
        let gateway = PersistenceGateway::with_mirror(local, Some(mirror));

        gateway.flush(Table::Balances, r#"{"A":5}"#.into()).unwrap();
        // local layer committed despite the dead mirror
        let balances: BTreeMap<String, i64> = gateway.load(Table::Balances);
        assert_eq!(balances.get("A"), Some(&5));
    }

    #[tokio::test]
    async fn flush_sync_reaches_the_mirror() {
        let dir = TempDir::new().unwrap();
        let local = SnapshotStore::with_replica_odds(dir.path(), 0.0).unwrap();
        let mirror = Arc::new(MemoryMirror::default());
        let gateway = PersistenceGateway::with_mirror(local, Some(mirror.clone()));

        gateway
            .flush_sync(Table::Gdp, r#"{"nation-1":{"gdp":9}}"#.into())
            .await
            .unwrap();

        let rows = mirror.fetch_all().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key, "gdp");
    }
}
