use rusqlite::{params, Connection, OpenFlags};
use sha2::{Digest, Sha256};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::alert::ViolationRecord;
use crate::error::StoreError;

/// Persistence for violation records. Insert-only.
///
/// One store may be shared by several streams, hence `&self` and `Sync`.
pub trait ViolationStore: Send + Sync {
    fn insert(&self, record: &ViolationRecord) -> Result<(), StoreError>;

    /// Most recent records, newest first.
    fn recent(&self, limit: usize) -> Result<Vec<ViolationRecord>, StoreError>;
}

pub struct SqliteViolationStore {
    conn: Mutex<Connection>,
}

impl SqliteViolationStore {
    pub fn open(db_path: &str) -> Result<Self, StoreError> {
        let conn = open_db_connection(db_path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS violations (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              created_at INTEGER NOT NULL,
              camera_id TEXT NOT NULL,
              site TEXT NOT NULL,
              video_timestamp_seconds REAL NOT NULL,
              frame_name TEXT NOT NULL,
              violator_count INTEGER NOT NULL,
              payload_json TEXT NOT NULL,
              record_hash TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_violations_site ON violations(site, created_at);
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("sqlite connection lock poisoned".to_string()))
    }

    /// Number of stored records.
    pub fn count(&self) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM violations", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl ViolationStore for SqliteViolationStore {
    fn insert(&self, record: &ViolationRecord) -> Result<(), StoreError> {
        let payload_json = serde_json::to_string(record)?;
        let record_hash = hex::encode(Sha256::digest(payload_json.as_bytes()));
        let created_at = now_s();

        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO violations(created_at, camera_id, site, video_timestamp_seconds,
                                   frame_name, violator_count, payload_json, record_hash)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                created_at,
                record.camera_id,
                record.site,
                record.video_timestamp_seconds,
                record.frame_name,
                record.violations.len() as i64,
                payload_json,
                record_hash
            ],
        )?;
        Ok(())
    }

    fn recent(&self, limit: usize) -> Result<Vec<ViolationRecord>, StoreError> {
        let payloads = {
            let conn = self.lock()?;
            let mut stmt =
                conn.prepare("SELECT payload_json FROM violations ORDER BY id DESC LIMIT ?1")?;
            let mut rows = stmt.query(params![limit as i64])?;
            let mut payloads = Vec::new();
            while let Some(row) = rows.next()? {
                let payload: String = row.get(0)?;
                payloads.push(payload);
            }
            payloads
        };

        let mut out = Vec::with_capacity(payloads.len());
        for payload in payloads {
            out.push(serde_json::from_str(&payload)?);
        }
        Ok(out)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryViolationStore {
    records: Mutex<Vec<ViolationRecord>>,
    fail_with: Option<String>,
}

impl InMemoryViolationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every insert fails with `reason`.
    pub fn failing(reason: &str) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            fail_with: Some(reason.to_string()),
        }
    }

    pub fn records(&self) -> Vec<ViolationRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl ViolationStore for InMemoryViolationStore {
    fn insert(&self, record: &ViolationRecord) -> Result<(), StoreError> {
        if let Some(reason) = &self.fail_with {
            return Err(StoreError::Unavailable(reason.clone()));
        }
        self.records
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))?
            .push(record.clone());
        Ok(())
    }

    fn recent(&self, limit: usize) -> Result<Vec<ViolationRecord>, StoreError> {
        let records = self
            .records
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))?;
        Ok(records.iter().rev().take(limit).cloned().collect())
    }
}

/// Opens plain paths as files and `file:` URIs with URI handling enabled.
fn open_db_connection(db_path: &str) -> Result<Connection, StoreError> {
    if db_path.starts_with("file:") {
        return Ok(Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        )?);
    }
    Ok(Connection::open(db_path)?)
}

fn now_s() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::ViolationEntry;
    use crate::pipeline::{RequiredClasses, SafetyGear};

    fn record(ts: f64) -> ViolationRecord {
        ViolationRecord {
            camera_id: "cam-1".to_string(),
            site: "yard".to_string(),
            video_timestamp_seconds: ts,
            frame_name: crate::alert::frame_name("yard", ts),
            required_classes: RequiredClasses::new(["Helmet", "Vest"]),
            violations: vec![ViolationEntry {
                person_label: "Person 1".to_string(),
                safety_gear: SafetyGear::from_pairs([("Helmet", true), ("Vest", false)]),
            }],
        }
    }

    #[test]
    fn sqlite_store_round_trips_records() {
        let store = SqliteViolationStore::open(":memory:").unwrap();
        store.insert(&record(0.0)).unwrap();
        store.insert(&record(5.0)).unwrap();

        assert_eq!(store.count().unwrap(), 2);
        let recent = store.recent(10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0], record(5.0));
        assert_eq!(recent[1], record(0.0));
    }

    #[test]
    fn in_memory_store_failure_mode() {
        let store = InMemoryViolationStore::failing("disk full");
        assert!(store.insert(&record(1.0)).is_err());
        assert!(store.records().is_empty());

        let store = InMemoryViolationStore::new();
        store.insert(&record(1.0)).unwrap();
        store.insert(&record(2.0)).unwrap();
        let recent = store.recent(1).unwrap();
        assert_eq!(recent, vec![record(2.0)]);
    }
}
