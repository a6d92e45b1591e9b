// SQLite-backed store
//
// One connection per call, opened, used inside a single transaction and dropped
// before returning. Dropping an uncommitted rusqlite::Transaction rolls it back,
// so every early `?` return leaves the database untouched.

use crate::error::StoreError;
use crate::record::{IncomeStatistics, MajorIncome, MajorIncomeRecord, UpsertSummary};
use crate::store::{next_timestamp, validate_range, validate_record, IncomeStore};
use chrono::{DateTime, SecondsFormat, Utc};
use crate::normalizer::MAX_INCOME;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

const SELECT_COLUMNS: &str = "SELECT id, major, income, updated_at FROM majors";
const ORDER_BY_INCOME: &str = "ORDER BY income DESC, seq ASC";

/// Raw column values as read, before conversion into domain types
type RawRow = (String, String, i64, String);

pub fn setup_database(conn: &Connection) -> Result<(), StoreError> {
    // Enable WAL mode for crash recovery
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;

    // seq keeps insertion order for income ties and survives updates
    conn.execute(
        "CREATE TABLE IF NOT EXISTS majors (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT UNIQUE NOT NULL,
            major TEXT UNIQUE NOT NULL CHECK(length(major) > 0),
            income INTEGER NOT NULL CHECK(income >= 0),
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_majors_income ON majors(income)",
        [],
    )?;

    Ok(())
}

/// Fixed-width RFC 3339 so stored timestamps sort as text
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp '{}': {}", raw, e)))
}

fn to_record((id, major, income, updated_at): RawRow) -> Result<MajorIncomeRecord, StoreError> {
    Ok(MajorIncomeRecord {
        id: Uuid::parse_str(&id)
            .map_err(|e| StoreError::Corrupt(format!("bad id '{}': {}", id, e)))?,
        income: u64::try_from(income)
            .map_err(|_| StoreError::Corrupt(format!("negative income for '{}'", major)))?,
        timestamp: parse_timestamp(&updated_at)?,
        major,
    })
}

fn income_param(income: u64) -> Result<i64, StoreError> {
    i64::try_from(income)
        .map_err(|_| StoreError::InvalidRecord(format!("income {} is out of range", income)))
}

fn query_records<P: rusqlite::Params>(
    tx: &Transaction<'_>,
    sql: &str,
    params: P,
) -> Result<Vec<MajorIncomeRecord>, StoreError> {
    let mut stmt = tx.prepare(sql)?;
    let rows = stmt
        .query_map(params, |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?
        .collect::<Result<Vec<RawRow>, _>>()?;

    rows.into_iter().map(to_record).collect()
}

#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteStore {
    /// Nothing is opened here; each operation connects on its own.
    /// `:memory:` is not useful since every call gets a fresh connection.
    pub fn new(path: impl Into<PathBuf>, busy_timeout: Duration) -> Self {
        SqliteStore {
            path: path.into(),
            busy_timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
        .map_err(|e| {
            StoreError::Connection(format!("{}: {}", self.path.display(), e))
        })?;

        conn.busy_timeout(self.busy_timeout)
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        setup_database(&conn)?;

        Ok(conn)
    }

    /// Run `f` in its own transaction. Commit on success; on error the
    /// transaction and connection are dropped, which rolls back and releases.
    fn with_transaction<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.run_transaction(TransactionBehavior::Deferred, f)
    }

    /// Writers take the write lock up front so a concurrent commit makes them
    /// wait out `busy_timeout` instead of failing on lock upgrade.
    fn with_write_transaction<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.run_transaction(TransactionBehavior::Immediate, f)
    }

    fn run_transaction<T>(
        &self,
        behavior: TransactionBehavior,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(behavior)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

fn upsert_one(
    tx: &Transaction<'_>,
    record: &MajorIncome,
    now: DateTime<Utc>,
) -> Result<bool, StoreError> {
    validate_record(record)?;
    let income = income_param(record.income)?;

    let previous: Option<String> = tx
        .query_row(
            "SELECT updated_at FROM majors WHERE major = ?1",
            params![record.major],
            |row| row.get(0),
        )
        .optional()?;

    match previous {
        Some(prev) => {
            let ts = next_timestamp(Some(parse_timestamp(&prev)?), now);
            tx.execute(
                "UPDATE majors SET income = ?1, updated_at = ?2 WHERE major = ?3",
                params![income, format_timestamp(ts), record.major],
            )?;
            Ok(false)
        }
        None => {
            tx.execute(
                "INSERT INTO majors (id, major, income, updated_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    Uuid::new_v4().to_string(),
                    record.major,
                    income,
                    format_timestamp(now),
                ],
            )?;
            Ok(true)
        }
    }
}

impl IncomeStore for SqliteStore {
    fn upsert_all(&self, records: &[MajorIncome]) -> Result<UpsertSummary, StoreError> {
        let now = Utc::now();

        let result = self.with_write_transaction(|tx| {
            let mut summary = UpsertSummary::default();
            for record in records {
                if upsert_one(tx, record, now)? {
                    summary.inserted += 1;
                } else {
                    summary.updated += 1;
                }
            }
            Ok(summary)
        });

        match &result {
            Ok(summary) => info!(
                inserted = summary.inserted,
                updated = summary.updated,
                "upsert committed"
            ),
            Err(e) => warn!(error = %e, "upsert rolled back"),
        }
        result
    }

    fn get_all(&self) -> Result<Vec<MajorIncomeRecord>, StoreError> {
        let records = self.with_transaction(|tx| {
            query_records(tx, &format!("{} {}", SELECT_COLUMNS, ORDER_BY_INCOME), [])
        })?;
        debug!(count = records.len(), "retrieved majors");
        Ok(records)
    }

    fn get_top_n(&self, n: usize) -> Result<Vec<MajorIncomeRecord>, StoreError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let limit = i64::try_from(n).unwrap_or(i64::MAX);

        self.with_transaction(|tx| {
            query_records(
                tx,
                &format!("{} {} LIMIT ?1", SELECT_COLUMNS, ORDER_BY_INCOME),
                params![limit],
            )
        })
    }

    fn get_by_income_range(
        &self,
        min: u64,
        max: u64,
    ) -> Result<Vec<MajorIncomeRecord>, StoreError> {
        validate_range(min, max)?;
        // Nothing stored exceeds MAX_INCOME, so a higher floor matches nothing
        if min > MAX_INCOME {
            return Ok(Vec::new());
        }
        let min = income_param(min)?;
        let max = i64::try_from(max.min(MAX_INCOME)).unwrap_or(i64::MAX);

        self.with_transaction(|tx| {
            query_records(
                tx,
                &format!(
                    "{} WHERE income BETWEEN ?1 AND ?2 {}",
                    SELECT_COLUMNS, ORDER_BY_INCOME
                ),
                params![min, max],
            )
        })
    }

    fn get_by_name(&self, major: &str) -> Result<Option<MajorIncomeRecord>, StoreError> {
        let mut found = self.with_transaction(|tx| {
            query_records(
                tx,
                &format!("{} WHERE major = ?1", SELECT_COLUMNS),
                params![major],
            )
        })?;
        Ok(found.pop())
    }

    fn get_statistics(&self) -> Result<IncomeStatistics, StoreError> {
        let (count, average, min, max): (i64, Option<f64>, Option<i64>, Option<i64>) =
            self.with_transaction(|tx| {
                Ok(tx.query_row(
                    "SELECT COUNT(*), AVG(income), MIN(income), MAX(income) FROM majors",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )?)
            })?;

        if count == 0 {
            return Ok(IncomeStatistics::empty());
        }

        let non_negative = |v: Option<i64>| v.and_then(|v| u64::try_from(v).ok());
        Ok(IncomeStatistics {
            count: count as u64,
            average,
            min: non_negative(min),
            max: non_negative(max),
        })
    }

    fn clear_all(&self) -> Result<usize, StoreError> {
        let removed =
            self.with_write_transaction(|tx| Ok(tx.execute("DELETE FROM majors", [])?))?;
        info!(removed, "cleared store");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("majors.db"), Duration::from_secs(1));
        (dir, store)
    }

    fn seed(store: &SqliteStore) {
        store
            .upsert_all(&[
                MajorIncome::new("Biology", 50000),
                MajorIncome::new("Computer Science", 85000),
                MajorIncome::new("Nursing", 65000),
                MajorIncome::new("Chemistry", 65000),
                MajorIncome::new("Art", 40000),
            ])
            .unwrap();
    }

    #[test]
    fn test_idempotency_upsert_twice() {
        let (_dir, store) = temp_store();
        let batch = [MajorIncome::new("X", 1)];

        let first_summary = store.upsert_all(&batch).unwrap();
        let first = store.get_by_name("X").unwrap().unwrap();
        let second_summary = store.upsert_all(&batch).unwrap();
        let second = store.get_by_name("X").unwrap().unwrap();

        assert_eq!(first_summary, UpsertSummary { inserted: 1, updated: 0 });
        assert_eq!(second_summary, UpsertSummary { inserted: 0, updated: 1 });
        assert_eq!(store.get_all().unwrap().len(), 1);
        assert_eq!(second.income, 1);
        assert_eq!(first.id, second.id);
        assert!(second.timestamp >= first.timestamp);

        println!("✅ Upsert idempotency test PASSED");
    }

    #[test]
    fn test_update_replaces_income() {
        let (_dir, store) = temp_store();
        seed(&store);
        store.upsert_all(&[MajorIncome::new("Art", 45000)]).unwrap();

        assert_eq!(store.get_by_name("Art").unwrap().unwrap().income, 45000);
        assert_eq!(store.get_statistics().unwrap().count, 5);
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let (_dir, store) = temp_store();
        seed(&store);

        let result = store.upsert_all(&[
            MajorIncome::new("Physics", 70000),
            MajorIncome::new("Art", 1),
            MajorIncome::new("   ", 1),
        ]);

        assert!(matches!(result, Err(StoreError::InvalidRecord(_))));
        assert!(store.get_by_name("Physics").unwrap().is_none());
        assert_eq!(store.get_by_name("Art").unwrap().unwrap().income, 40000);
        assert_eq!(store.get_all().unwrap().len(), 5);
    }

    #[test]
    fn test_ordering_and_top_n() {
        let (_dir, store) = temp_store();
        seed(&store);

        let majors: Vec<String> = store.get_all().unwrap().into_iter().map(|r| r.major).collect();
        assert_eq!(
            majors,
            vec!["Computer Science", "Nursing", "Chemistry", "Biology", "Art"]
        );

        let top = store.get_top_n(2).unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[1].major, "Nursing");
        assert!(store.get_top_n(0).unwrap().is_empty());
    }

    #[test]
    fn test_income_range() {
        let (_dir, store) = temp_store();
        seed(&store);

        let in_range = store.get_by_income_range(40000, 50000).unwrap();
        let majors: Vec<&str> = in_range.iter().map(|r| r.major.as_str()).collect();
        assert_eq!(majors, vec!["Biology", "Art"]);

        assert!(matches!(
            store.get_by_income_range(50000, 40000),
            Err(StoreError::InvalidRange { .. })
        ));
        assert!(store.get_by_income_range(100000, u64::MAX).unwrap().is_empty());
    }

    #[test]
    fn test_income_range_above_storable_max() {
        let (_dir, store) = temp_store();
        store
            .upsert_all(&[MajorIncome::new("Big", MAX_INCOME), MajorIncome::new("Small", 1)])
            .unwrap();

        assert!(store
            .get_by_income_range(MAX_INCOME + 1, u64::MAX)
            .unwrap()
            .is_empty());

        let top: Vec<String> = store
            .get_by_income_range(MAX_INCOME, u64::MAX)
            .unwrap()
            .into_iter()
            .map(|r| r.major)
            .collect();
        assert_eq!(top, vec!["Big"]);
    }

    #[test]
    fn test_concurrent_batches_both_commit() {
        let (dir, store) = temp_store();
        store.upsert_all(&[MajorIncome::new("Seed", 1)]).unwrap();

        let handles: Vec<_> = (0..4u64)
            .map(|i| {
                let store = SqliteStore::new(dir.path().join("majors.db"), Duration::from_secs(5));
                std::thread::spawn(move || {
                    let batch: Vec<MajorIncome> = (0..20u64)
                        .map(|j| MajorIncome::new(format!("Major {}", j), i * 100 + j))
                        .collect();
                    store.upsert_all(&batch)
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap().is_ok());
        }
        assert_eq!(store.get_all().unwrap().len(), 21);
    }

    #[test]
    fn test_statistics() {
        let (_dir, store) = temp_store();
        assert_eq!(store.get_statistics().unwrap(), IncomeStatistics::empty());

        seed(&store);
        let stats = store.get_statistics().unwrap();
        assert_eq!(stats.count, 5);
        assert_eq!(stats.min, Some(40000));
        assert_eq!(stats.max, Some(85000));
        assert_eq!(stats.average, Some(61000.0));
    }

    #[test]
    fn test_clear_all() {
        let (_dir, store) = temp_store();
        seed(&store);

        assert_eq!(store.clear_all().unwrap(), 5);
        assert!(store.get_all().unwrap().is_empty());
        assert!(store.get_by_name("Art").unwrap().is_none());
    }

    #[test]
    fn test_unreachable_database_fails_with_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(
            dir.path().join("missing").join("majors.db"),
            Duration::from_millis(100),
        );

        assert!(matches!(store.get_all(), Err(StoreError::Connection(_))));
        assert!(matches!(
            store.upsert_all(&[MajorIncome::new("Law", 90000)]),
            Err(StoreError::Connection(_))
        ));
    }

    #[test]
    fn test_rows_survive_reconnect() {
        let (dir, store) = temp_store();
        seed(&store);

        let reopened = SqliteStore::new(dir.path().join("majors.db"), Duration::from_secs(1));
        assert_eq!(reopened.get_all().unwrap().len(), 5);
    }
}
