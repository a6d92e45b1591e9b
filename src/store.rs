// 🗄️ Store interface + in-process reference implementation
//
// Every call is its own transaction: acquire → execute → commit or roll back →
// release. A failed batch leaves nothing behind.

use crate::error::StoreError;
use crate::record::{IncomeStatistics, MajorIncome, MajorIncomeRecord, UpsertSummary};
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard};
use tracing::{info, warn};
use uuid::Uuid;

/// Persistence for major → income rows, keyed by exact major name
pub trait IncomeStore: Send + Sync {
    /// Insert or update every record in one all-or-nothing batch
    fn upsert_all(&self, records: &[MajorIncome]) -> Result<UpsertSummary, StoreError>;

    /// Every row, income descending, ties in insertion order
    fn get_all(&self) -> Result<Vec<MajorIncomeRecord>, StoreError>;

    fn get_top_n(&self, n: usize) -> Result<Vec<MajorIncomeRecord>, StoreError>;

    /// Rows with `min <= income <= max`, income descending
    fn get_by_income_range(&self, min: u64, max: u64)
        -> Result<Vec<MajorIncomeRecord>, StoreError>;

    fn get_by_name(&self, major: &str) -> Result<Option<MajorIncomeRecord>, StoreError>;

    fn get_statistics(&self) -> Result<IncomeStatistics, StoreError>;

    /// Remove every row. Reset/test use only; returns rows removed.
    fn clear_all(&self) -> Result<usize, StoreError>;
}

/// Reject rows the store must never hold
pub fn validate_record(record: &MajorIncome) -> Result<(), StoreError> {
    if record.major.trim().is_empty() {
        return Err(StoreError::InvalidRecord(
            "major name must not be empty".to_string(),
        ));
    }
    if record.income > crate::normalizer::MAX_INCOME {
        return Err(StoreError::InvalidRecord(format!(
            "income {} for '{}' is out of range",
            record.income, record.major
        )));
    }
    Ok(())
}

pub fn validate_range(min: u64, max: u64) -> Result<(), StoreError> {
    if min > max {
        return Err(StoreError::InvalidRange { min, max });
    }
    Ok(())
}

/// Timestamps never move backwards for a major, even if the clock does
pub fn next_timestamp(previous: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    match previous {
        Some(prev) if prev > now => prev,
        _ => now,
    }
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

#[derive(Debug, Clone)]
struct MemoryRow {
    seq: u64,
    record: MajorIncomeRecord,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    rows: Vec<MemoryRow>,
    next_seq: u64,
}

impl MemoryState {
    fn sorted(&self) -> Vec<MajorIncomeRecord> {
        let mut rows: Vec<&MemoryRow> = self.rows.iter().collect();
        rows.sort_by(|a, b| {
            b.record
                .income
                .cmp(&a.record.income)
                .then(a.seq.cmp(&b.seq))
        });
        rows.into_iter().map(|r| r.record.clone()).collect()
    }
}

/// Reference store held entirely in process memory.
///
/// Batches are applied to a working copy that replaces the live state only
/// when every row succeeded.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    offline: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the backing store being unreachable
    pub fn set_offline(&self, offline: bool) {
        if let Ok(mut flag) = self.offline.lock() {
            *flag = offline;
        }
    }

    fn connect(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        let offline = self
            .offline
            .lock()
            .map(|flag| *flag)
            .map_err(|_| StoreError::Connection("memory store lock poisoned".to_string()))?;
        if offline {
            return Err(StoreError::Connection("memory store is offline".to_string()));
        }
        self.state
            .lock()
            .map_err(|_| StoreError::Connection("memory store lock poisoned".to_string()))
    }
}

impl IncomeStore for MemoryStore {
    fn upsert_all(&self, records: &[MajorIncome]) -> Result<UpsertSummary, StoreError> {
        let mut live = self.connect()?;
        let mut working = live.clone();
        let now = Utc::now();
        let mut summary = UpsertSummary::default();

        for record in records {
            if let Err(e) = validate_record(record) {
                warn!(major = %record.major, error = %e, "rolling back batch");
                return Err(e);
            }

            match working.rows.iter_mut().find(|r| r.record.major == record.major) {
                Some(row) => {
                    row.record.income = record.income;
                    row.record.timestamp = next_timestamp(Some(row.record.timestamp), now);
                    summary.updated += 1;
                }
                None => {
                    let seq = working.next_seq;
                    working.next_seq += 1;
                    working.rows.push(MemoryRow {
                        seq,
                        record: MajorIncomeRecord {
                            id: Uuid::new_v4(),
                            major: record.major.clone(),
                            income: record.income,
                            timestamp: now,
                        },
                    });
                    summary.inserted += 1;
                }
            }
        }

        *live = working;
        info!(inserted = summary.inserted, updated = summary.updated, "upsert committed");
        Ok(summary)
    }

    fn get_all(&self) -> Result<Vec<MajorIncomeRecord>, StoreError> {
        Ok(self.connect()?.sorted())
    }

    fn get_top_n(&self, n: usize) -> Result<Vec<MajorIncomeRecord>, StoreError> {
        let mut all = self.connect()?.sorted();
        all.truncate(n);
        Ok(all)
    }

    fn get_by_income_range(
        &self,
        min: u64,
        max: u64,
    ) -> Result<Vec<MajorIncomeRecord>, StoreError> {
        validate_range(min, max)?;
        let all = self.connect()?.sorted();
        Ok(all
            .into_iter()
            .filter(|r| r.income >= min && r.income <= max)
            .collect())
    }

    fn get_by_name(&self, major: &str) -> Result<Option<MajorIncomeRecord>, StoreError> {
        let state = self.connect()?;
        Ok(state
            .rows
            .iter()
            .find(|r| r.record.major == major)
            .map(|r| r.record.clone()))
    }

    fn get_statistics(&self) -> Result<IncomeStatistics, StoreError> {
        let state = self.connect()?;
        if state.rows.is_empty() {
            return Ok(IncomeStatistics::empty());
        }

        let incomes: Vec<u64> = state.rows.iter().map(|r| r.record.income).collect();
        let sum: f64 = incomes.iter().map(|v| *v as f64).sum();

        Ok(IncomeStatistics {
            count: incomes.len() as u64,
            average: Some(sum / incomes.len() as f64),
            min: incomes.iter().copied().min(),
            max: incomes.iter().copied().max(),
        })
    }

    fn clear_all(&self) -> Result<usize, StoreError> {
        let mut state = self.connect()?;
        let removed = state.rows.len();
        state.rows.clear();
        info!(removed, "cleared store");
        Ok(removed)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .upsert_all(&[
                MajorIncome::new("Biology", 50000),
                MajorIncome::new("Computer Science", 85000),
                MajorIncome::new("Nursing", 65000),
                MajorIncome::new("Chemistry", 65000),
                MajorIncome::new("Art", 40000),
            ])
            .unwrap();
        store
    }

    #[test]
    fn test_upsert_idempotent() {
        let store = MemoryStore::new();
        let batch = [MajorIncome::new("X", 1)];

        store.upsert_all(&batch).unwrap();
        let first = store.get_by_name("X").unwrap().unwrap();

        let summary = store.upsert_all(&batch).unwrap();
        let second = store.get_by_name("X").unwrap().unwrap();

        assert_eq!(summary, UpsertSummary { inserted: 0, updated: 1 });
        assert_eq!(store.get_all().unwrap().len(), 1);
        assert_eq!(second.income, 1);
        assert_eq!(first.id, second.id);
        assert!(second.timestamp >= first.timestamp);
    }

    #[test]
    fn test_later_duplicate_in_batch_wins() {
        let store = MemoryStore::new();
        let summary = store
            .upsert_all(&[MajorIncome::new("Economics", 60000), MajorIncome::new("Economics", 65000)])
            .unwrap();

        assert_eq!(summary, UpsertSummary { inserted: 1, updated: 1 });
        assert_eq!(store.get_by_name("Economics").unwrap().unwrap().income, 65000);
    }

    #[test]
    fn test_major_is_case_sensitive() {
        let store = MemoryStore::new();
        store
            .upsert_all(&[MajorIncome::new("math", 1), MajorIncome::new("Math", 2)])
            .unwrap();

        assert_eq!(store.get_all().unwrap().len(), 2);
        assert!(store.get_by_name("MATH").unwrap().is_none());
    }

    #[test]
    fn test_batch_rolls_back_on_bad_row() {
        let store = seeded();
        let result = store.upsert_all(&[
            MajorIncome::new("Physics", 70000),
            MajorIncome::new("Biology", 99999),
            MajorIncome::new("", 1),
        ]);

        assert!(matches!(result, Err(StoreError::InvalidRecord(_))));
        assert!(store.get_by_name("Physics").unwrap().is_none());
        assert_eq!(store.get_by_name("Biology").unwrap().unwrap().income, 50000);
        assert_eq!(store.get_all().unwrap().len(), 5);
    }

    #[test]
    fn test_ordering_desc_with_stable_ties() {
        let store = seeded();
        let majors: Vec<String> = store.get_all().unwrap().into_iter().map(|r| r.major).collect();

        assert_eq!(
            majors,
            vec!["Computer Science", "Nursing", "Chemistry", "Biology", "Art"]
        );
    }

    #[test]
    fn test_update_keeps_insertion_position_for_ties() {
        let store = seeded();
        // Nursing was inserted before Chemistry; updating it must not move it behind
        store.upsert_all(&[MajorIncome::new("Nursing", 65000)]).unwrap();
        let top = store.get_top_n(3).unwrap();

        assert_eq!(top[1].major, "Nursing");
        assert_eq!(top[2].major, "Chemistry");
    }

    #[test]
    fn test_top_n() {
        let store = seeded();

        assert_eq!(store.get_top_n(2).unwrap().len(), 2);
        assert_eq!(store.get_top_n(2).unwrap()[0].major, "Computer Science");
        assert!(store.get_top_n(0).unwrap().is_empty());
        assert_eq!(store.get_top_n(100).unwrap().len(), 5);
    }

    #[test]
    fn test_range_is_inclusive() {
        let store = seeded();
        let in_range = store.get_by_income_range(50000, 65000).unwrap();
        let majors: Vec<&str> = in_range.iter().map(|r| r.major.as_str()).collect();

        assert_eq!(majors, vec!["Nursing", "Chemistry", "Biology"]);
        assert!(in_range.iter().all(|r| r.income >= 50000 && r.income <= 65000));
    }

    #[test]
    fn test_inverted_range_is_an_error() {
        let store = seeded();
        assert!(matches!(
            store.get_by_income_range(65000, 50000),
            Err(StoreError::InvalidRange { min: 65000, max: 50000 })
        ));
    }

    #[test]
    fn test_statistics() {
        let store = seeded();
        let stats = store.get_statistics().unwrap();

        assert_eq!(stats.count, 5);
        assert_eq!(stats.min, Some(40000));
        assert_eq!(stats.max, Some(85000));
        assert_eq!(stats.average, Some(61000.0));
    }

    #[test]
    fn test_statistics_on_empty_store() {
        let store = MemoryStore::new();
        assert_eq!(store.get_statistics().unwrap(), IncomeStatistics::empty());
    }

    #[test]
    fn test_clear_all() {
        let store = seeded();
        assert_eq!(store.clear_all().unwrap(), 5);
        assert!(store.get_all().unwrap().is_empty());
    }

    #[test]
    fn test_offline_store_fails_cleanly() {
        let store = seeded();
        store.set_offline(true);

        assert!(matches!(store.get_all(), Err(StoreError::Connection(_))));
        assert!(matches!(
            store.upsert_all(&[MajorIncome::new("Law", 90000)]),
            Err(StoreError::Connection(_))
        ));

        store.set_offline(false);
        assert!(store.get_by_name("Law").unwrap().is_none());
        assert_eq!(store.get_all().unwrap().len(), 5);
    }

    #[test]
    fn test_next_timestamp_never_goes_backwards() {
        let now = Utc::now();
        let later = now + Duration::seconds(5);

        assert_eq!(next_timestamp(None, now), now);
        assert_eq!(next_timestamp(Some(later), now), later);
        assert_eq!(next_timestamp(Some(now), later), later);
    }
}
