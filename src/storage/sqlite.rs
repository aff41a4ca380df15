//! SQLite record store

use super::encoding::{decode_record, encode_record};
use super::{cascade_set, NormalizedStore, StoreStats};
use crate::metrics;
use crate::record::{merge_record, ChangedKeys, Record};
use crate::{NormCacheError, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, InterruptHandle, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const BACKEND: &str = "sqlite";

const UPSERT_RECORD: &str = "INSERT INTO records (key, record) VALUES (?1, ?2)
     ON CONFLICT(key) DO UPDATE SET record = excluded.record";

/// SQLite store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// Path to SQLite database file
    pub path: PathBuf,

    /// Enable WAL mode for better concurrency
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// How long a statement waits on a locked database
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_wal_mode() -> bool {
    true
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl SqliteConfig {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        // Always use ~/.config for consistency across platforms (macOS, Linux)
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".config");
        path.push("normcache");
        path.push("cache.db");

        Self {
            path,
            wal_mode: default_wal_mode(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// Cooperative cancellation flag for a batch merge
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Durable store: one row per record, batches merged in one transaction
pub struct SqliteStore {
    conn: Mutex<Connection>,
    interrupt: InterruptHandle,
    /// True while a batch transaction holds the connection
    merging: Mutex<bool>,
    path: Option<PathBuf>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SqliteStore {
    /// Open or create a record database
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        // Create parent directory if needed
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %config.path.display(), "Opening record database");

        let conn = Connection::open(&config.path)?;
        if config.wal_mode {
            conn.pragma_update(None, "journal_mode", "WAL")?;
        }
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;

        Self::with_connection(conn, Some(config.path.clone()))
    }

    /// Private in-memory database, mostly for tests
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, None)
    }

    fn with_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        init_schema(&conn)?;
        let interrupt = conn.get_interrupt_handle();
        Ok(Self {
            conn: Mutex::new(conn),
            interrupt,
            merging: Mutex::new(false),
            path,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// Database file, if not in-memory
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Batch merge that gives up, rolling back, once `token` is cancelled
    pub fn merge_all_cancellable(&self, records: &[Record], token: &CancelToken) -> Result<ChangedKeys> {
        let started = Instant::now();
        let mut conn = self.conn.lock();

        *self.merging.lock() = true;
        let result = merge_in_transaction(&mut conn, records, token);
        *self.merging.lock() = false;

        match result {
            Ok(changed) => {
                metrics::record_merge(BACKEND, records.len(), started.elapsed().as_secs_f64());
                tracing::debug!(
                    records = records.len(),
                    changed = changed.len(),
                    "Merged batch into record database"
                );
                Ok(changed)
            }
            Err(e) => {
                tracing::warn!(error = %e, records = records.len(), "Batch merge rolled back");
                Err(match e {
                    NormCacheError::MergeTransaction(_) => e,
                    other => NormCacheError::MergeTransaction(other.to_string()),
                })
            }
        }
    }

    /// Run a batch merge on a blocking thread, cancelling it after `timeout`
    ///
    /// The result always reflects what happened to the store: `Err` means the
    /// batch was rolled back, `Ok` means it committed, even if the commit
    /// landed after the deadline.
    pub async fn merge_with_timeout(
        self: &Arc<Self>,
        records: Vec<Record>,
        timeout: Duration,
    ) -> Result<ChangedKeys> {
        let token = CancelToken::new();
        let store = Arc::clone(self);
        let task_token = token.clone();
        let mut task = tokio::task::spawn_blocking(move || store.merge_all_cancellable(&records, &task_token));

        if let Ok(joined) = tokio::time::timeout(timeout, &mut task).await {
            return joined.map_err(|e| NormCacheError::MergeTransaction(e.to_string()))?;
        }

        token.cancel();
        self.interrupt_merge();
        let timeout_ms = timeout.as_millis() as u64;
        match task.await {
            Ok(Ok(changed)) => {
                tracing::warn!(timeout_ms, "Batch merge committed after its deadline");
                Ok(changed)
            }
            Ok(Err(e)) => {
                tracing::warn!(timeout_ms, error = %e, "Batch merge timed out and was rolled back");
                Err(NormCacheError::MergeTransaction(format!(
                    "timed out after {}ms",
                    timeout_ms
                )))
            }
            Err(e) => Err(NormCacheError::MergeTransaction(e.to_string())),
        }
    }

    /// Interrupt the running batch transaction, if there is one
    fn interrupt_merge(&self) {
        // Holding the flag keeps the merge from finishing and handing the
        // connection to another statement before the interrupt lands
        let merging = self.merging.lock();
        if *merging {
            self.interrupt.interrupt();
        }
    }
}

/// Initialize database schema
fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            _id INTEGER PRIMARY KEY AUTOINCREMENT,
            key TEXT NOT NULL,
            record TEXT NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_records_key ON records(key);
        "#,
    )?;
    Ok(())
}

fn dump_records(conn: &Connection) -> Result<BTreeMap<String, Arc<Record>>> {
    let mut stmt = conn.prepare("SELECT key, record FROM records ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

    let mut out = BTreeMap::new();
    for row in rows {
        let (key, text) = row?;
        let record = decode_record(&key, &text)?;
        out.insert(key, Arc::new(record));
    }
    Ok(out)
}

fn merge_in_transaction(conn: &mut Connection, records: &[Record], token: &CancelToken) -> Result<ChangedKeys> {
    let tx = conn.transaction()?;
    let mut changed = ChangedKeys::new();
    {
        let mut select = tx.prepare_cached("SELECT record FROM records WHERE key = ?1")?;
        let mut upsert = tx.prepare_cached(UPSERT_RECORD)?;

        for record in records {
            if token.is_cancelled() {
                return Err(NormCacheError::MergeTransaction("cancelled".to_string()));
            }
            let existing = select
                .query_row([record.key()], |row| row.get::<_, String>(0))
                .optional()?
                .map(|text| decode_record(record.key(), &text))
                .transpose()?;

            let outcome = merge_record(existing.as_ref(), record);
            if existing.is_none() || !outcome.is_unchanged() {
                upsert.execute(params![record.key(), encode_record(&outcome.record)])?;
                changed.extend(outcome.changed);
            }
        }
    }
    if token.is_cancelled() {
        return Err(NormCacheError::MergeTransaction("cancelled".to_string()));
    }
    tx.commit()?;
    Ok(changed)
}

impl NormalizedStore for SqliteStore {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn load(&self, key: &str) -> Result<Option<Arc<Record>>> {
        let text: Option<String> = self
            .conn
            .lock()
            .query_row("SELECT record FROM records WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;

        metrics::record_load(BACKEND, text.is_some());
        match text {
            Some(text) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(Arc::new(decode_record(key, &text)?)))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    fn load_many(&self, keys: &[String]) -> Result<Vec<Arc<Record>>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT record FROM records WHERE key = ?1")?;
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let text: Option<String> = stmt.query_row([key], |row| row.get(0)).optional()?;
            if let Some(text) = text {
                out.push(Arc::new(decode_record(key, &text)?));
            }
        }
        Ok(out)
    }

    fn merge_all(&self, records: &[Record]) -> Result<ChangedKeys> {
        self.merge_all_cancellable(records, &CancelToken::new())
    }

    fn remove(&self, key: &str, cascade: bool) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let keys = if cascade {
            cascade_set(&dump_records(&tx)?, key)
        } else {
            BTreeSet::from([key.to_string()])
        };

        let mut present = false;
        for k in &keys {
            let deleted = tx.execute("DELETE FROM records WHERE key = ?1", [k])?;
            if k == key {
                present = deleted > 0;
            }
        }
        tx.commit()?;

        tracing::debug!(key, cascade, removed = keys.len(), "Removed records");
        Ok(present)
    }

    fn clear_all(&self) -> Result<()> {
        tracing::info!("Clearing record database");
        self.conn.lock().execute("DELETE FROM records", [])?;
        Ok(())
    }

    fn dump(&self) -> Result<BTreeMap<String, Arc<Record>>> {
        dump_records(&self.conn.lock())
    }

    fn stats(&self) -> Result<StoreStats> {
        let (entries, weight): (i64, i64) = self.conn.lock().query_row(
            "SELECT COUNT(*), COALESCE(SUM(LENGTH(record)), 0) FROM records",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(StoreStats {
            backend: BACKEND.to_string(),
            entries: entries as usize,
            weight_bytes: weight as usize,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: 0,
            secondary: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FieldRef, RecordValue};
    use std::sync::mpsc;
    use std::thread;
    use tempfile::NamedTempFile;

    fn hero_root() -> Record {
        Record::builder("QUERY_ROOT")
            .field("hero", RecordValue::reference("Droid.2001"))
            .build()
    }

    fn droid(name: &str) -> Record {
        Record::builder("Droid.2001")
            .field("__typename", "Droid")
            .field("name", name)
            .build()
    }

    #[test]
    fn test_store_creation() {
        let temp_file = NamedTempFile::new().unwrap();
        let store = SqliteStore::open(&SqliteConfig::at(temp_file.path())).unwrap();
        assert!(store.path().unwrap().exists());
        assert_eq!(store.stats().unwrap().entries, 0);
    }

    #[test]
    fn test_merge_and_load() {
        let store = SqliteStore::open_in_memory().unwrap();
        let changed = store.merge_all(&[hero_root(), droid("R2-D2")]).unwrap();
        assert_eq!(changed.len(), 3);

        let loaded = store.load("Droid.2001").unwrap().unwrap();
        assert_eq!(loaded.field("name"), Some(&RecordValue::from("R2-D2")));
        let root = store.load("QUERY_ROOT").unwrap().unwrap();
        assert_eq!(
            root.field("hero").and_then(RecordValue::as_reference).map(|r| r.key()),
            Some("Droid.2001")
        );
        assert!(store.load("Human.1000").unwrap().is_none());
    }

    #[test]
    fn test_merge_reports_only_changes() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.merge(&droid("R2-D2")).unwrap();
        assert!(store.merge(&droid("R2-D2")).unwrap().is_empty());

        let changed = store.merge(&droid("Artoo")).unwrap();
        assert_eq!(changed.len(), 1);
        assert!(changed.contains(&FieldRef::new("Droid.2001", "name")));
    }

    #[test]
    fn test_persists_across_reopen() {
        let temp_file = NamedTempFile::new().unwrap();
        let config = SqliteConfig::at(temp_file.path());
        {
            let store = SqliteStore::open(&config).unwrap();
            store.merge_all(&[hero_root(), droid("R2-D2")]).unwrap();
        }
        let store = SqliteStore::open(&config).unwrap();
        assert_eq!(store.dump().unwrap().len(), 2);
    }

    #[test]
    fn test_cancelled_merge_rolls_back() {
        let store = SqliteStore::open_in_memory().unwrap();
        let token = CancelToken::new();
        token.cancel();

        let err = store
            .merge_all_cancellable(&[hero_root(), droid("R2-D2")], &token)
            .unwrap_err();
        assert!(matches!(err, NormCacheError::MergeTransaction(_)));
        assert!(store.dump().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_row_fails_whole_batch() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .conn
            .lock()
            .execute(
                "INSERT INTO records (key, record) VALUES ('Droid.2001', 'not json')",
                [],
            )
            .unwrap();

        let err = store.merge_all(&[hero_root(), droid("R2-D2")]).unwrap_err();
        assert!(matches!(err, NormCacheError::MergeTransaction(_)));
        assert!(store.load("QUERY_ROOT").unwrap().is_none());
        assert!(matches!(
            store.load("Droid.2001").unwrap_err(),
            NormCacheError::CorruptRecord { .. }
        ));
    }

    #[test]
    fn test_remove_and_clear() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.merge_all(&[hero_root(), droid("R2-D2")]).unwrap();

        assert!(store.remove("QUERY_ROOT", true).unwrap());
        assert!(store.dump().unwrap().is_empty());
        assert!(!store.remove("QUERY_ROOT", false).unwrap());

        store.merge_all(&[hero_root(), droid("R2-D2")]).unwrap();
        store.clear_all().unwrap();
        assert_eq!(store.stats().unwrap().entries, 0);
    }

    #[test]
    fn test_stats_count_hits_and_misses() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.merge(&droid("R2-D2")).unwrap();
        store.load("Droid.2001").unwrap();
        store.load("Droid.9999").unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.entries, 1);
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert!(stats.weight_bytes > 0);
    }

    #[tokio::test]
    async fn test_merge_with_timeout_completes() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let changed = store
            .merge_with_timeout(vec![hero_root(), droid("R2-D2")], Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(changed.len(), 3);
        assert_eq!(store.dump().unwrap().len(), 2);
    }

    #[test]
    fn test_load_many_keeps_order_and_skips_absent() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.merge_all(&[hero_root(), droid("R2-D2")]).unwrap();

        let keys = ["Droid.2001", "Human.1000", "QUERY_ROOT"].map(String::from);
        let loaded = store.load_many(&keys).unwrap();
        let loaded_keys: Vec<_> = loaded.iter().map(|r| r.key()).collect();
        assert_eq!(loaded_keys, vec!["Droid.2001", "QUERY_ROOT"]);
        assert_eq!(loaded[0].field("name"), Some(&RecordValue::from("R2-D2")));

        assert!(store.load_many(&["Human.1000".to_string()]).unwrap().is_empty());
    }

    #[test]
    fn test_cascade_remove_keeps_shared_records() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .merge_all(&[
                hero_root(),
                droid("R2-D2"),
                Record::builder("Human.1000")
                    .field("friend", RecordValue::reference("Droid.2001"))
                    .build(),
            ])
            .unwrap();

        assert!(store.remove("QUERY_ROOT", true).unwrap());
        let left: Vec<_> = store.dump().unwrap().into_keys().collect();
        assert_eq!(left, vec!["Droid.2001", "Human.1000"]);
    }

    #[tokio::test]
    async fn test_merge_timed_out_before_start_leaves_store_unchanged() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());

        // Keep the connection busy past the deadline
        let (locked_tx, locked_rx) = mpsc::channel();
        let holder = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let _conn = store.conn.lock();
                locked_tx.send(()).unwrap();
                thread::sleep(Duration::from_millis(200));
            })
        };
        locked_rx.recv().unwrap();

        let err = store
            .merge_with_timeout(vec![hero_root(), droid("R2-D2")], Duration::from_millis(20))
            .await
            .unwrap_err();
        holder.join().unwrap();

        assert!(err.to_string().contains("timed out"));
        assert!(store.dump().unwrap().is_empty());
        // The connection is still usable afterwards
        store.merge(&droid("R2-D2")).unwrap();
        assert!(store.load("Droid.2001").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_merge_timeout_result_matches_store() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let records: Vec<Record> = (0..20_000)
            .map(|i| Record::builder(format!("Droid.{}", i)).field("name", "R2-D2").build())
            .collect();

        let result = store.merge_with_timeout(records, Duration::from_millis(1)).await;
        let stored = store.dump().unwrap().len();
        match result {
            Ok(changed) => {
                assert_eq!(stored, 20_000);
                assert_eq!(changed.len(), 20_000);
            }
            Err(e) => {
                assert!(matches!(e, NormCacheError::MergeTransaction(_)));
                assert_eq!(stored, 0);
            }
        }
        assert!(store.load("Droid.0").is_ok());
    }
}
