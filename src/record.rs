use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A parsed (major, income) pair, before the store assigns identity.
/// Constructed by the parser and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MajorIncome {
    pub major: String,
    pub income: u64,
}

impl MajorIncome {
    pub fn new(major: impl Into<String>, income: u64) -> Self {
        MajorIncome {
            major: major.into(),
            income,
        }
    }
}

/// A persisted row. `id` is assigned on first insert and survives updates;
/// `timestamp` is the last write time and only the store sets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MajorIncomeRecord {
    pub id: Uuid,
    pub major: String,
    pub income: u64,
    pub timestamp: DateTime<Utc>,
}

impl From<&MajorIncomeRecord> for MajorIncome {
    fn from(record: &MajorIncomeRecord) -> Self {
        MajorIncome::new(record.major.clone(), record.income)
    }
}

/// Aggregates over every stored row. On an empty store only `count` is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeStatistics {
    pub count: u64,
    pub average: Option<f64>,
    pub min: Option<u64>,
    pub max: Option<u64>,
}

impl IncomeStatistics {
    pub fn empty() -> Self {
        IncomeStatistics {
            count: 0,
            average: None,
            min: None,
            max: None,
        }
    }
}

/// What an `upsert_all` call did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
}

impl UpsertSummary {
    pub fn total(&self) -> usize {
        self.inserted + self.updated
    }
}
