// 🔄 Pipeline: fetch → parse → upsert → (mirror)
//
// Row-level problems are counted, fetch problems end the run quietly, and a
// store failure is the only thing that comes back as an error.

use crate::error::PipelineError;
use crate::mirror::write_mirror;
use crate::parser::RecordParser;
use crate::source::PayloadSource;
use crate::store::IncomeStore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PayloadStatus {
    Received,
    Absent,
    FetchFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MirrorStatus {
    NotConfigured,
    Written { path: String, entries: usize },
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    pub source: String,
    pub payload: PayloadStatus,
    /// SHA-256 of the payload, for provenance
    pub payload_digest: Option<String>,
    /// Data rows read (header and blank lines excluded)
    pub fetched: usize,
    pub parsed: usize,
    pub skipped: usize,
    pub stored: usize,
    pub inserted: usize,
    pub updated: usize,
    pub mirror: MirrorStatus,
}

impl PipelineReport {
    fn empty(source: String, payload: PayloadStatus) -> Self {
        PipelineReport {
            source,
            payload,
            payload_digest: None,
            fetched: 0,
            parsed: 0,
            skipped: 0,
            stored: 0,
            inserted: 0,
            updated: 0,
            mirror: MirrorStatus::NotConfigured,
        }
    }
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            PayloadStatus::Absent => write!(f, "✗ No payload available from {}", self.source),
            PayloadStatus::FetchFailed(e) => {
                write!(f, "✗ Unable to fetch {}: {}", self.source, e)
            }
            PayloadStatus::Received => write!(
                f,
                "✓ fetched {} rows, parsed {} ({} skipped), stored {} ({} new, {} updated)",
                self.fetched, self.parsed, self.skipped, self.stored, self.inserted, self.updated
            ),
        }
    }
}

pub fn payload_digest(payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub struct Pipeline<'a> {
    source: Box<dyn PayloadSource + 'a>,
    parser: RecordParser,
    store: &'a dyn IncomeStore,
    mirror_path: Option<PathBuf>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        source: Box<dyn PayloadSource + 'a>,
        parser: RecordParser,
        store: &'a dyn IncomeStore,
    ) -> Self {
        Pipeline {
            source,
            parser,
            store,
            mirror_path: None,
        }
    }

    /// Also dump the stored snapshot to a JSON file after each successful write
    pub fn with_mirror(mut self, path: impl Into<PathBuf>) -> Self {
        self.mirror_path = Some(path.into());
        self
    }

    pub fn run(&self) -> Result<PipelineReport, PipelineError> {
        let source = self.source.describe();

        let payload = match self.source.fetch() {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                warn!(%source, "no payload, stopping run");
                return Ok(PipelineReport::empty(source, PayloadStatus::Absent));
            }
            Err(e) => {
                warn!(%source, error = %e, "fetch failed, stopping run");
                return Ok(PipelineReport::empty(
                    source,
                    PayloadStatus::FetchFailed(e.to_string()),
                ));
            }
        };

        let digest = payload_digest(&payload);
        info!(%source, bytes = payload.len(), digest = %digest, "payload received");

        let output = self.parser.parse(&payload);
        let mut report = PipelineReport::empty(source, PayloadStatus::Received);
        report.payload_digest = Some(digest);
        report.fetched = output.report.rows_seen;
        report.parsed = output.report.parsed;
        report.skipped = output.report.skipped();

        if output.report.skipped() > 0 {
            info!(
                short_row = output.report.short_row,
                empty_major = output.report.empty_major,
                invalid_income = output.report.invalid_income,
                malformed = output.report.malformed,
                "rows skipped"
            );
        }

        if output.records.is_empty() {
            info!("nothing to store");
            return Ok(report);
        }

        let summary = self.store.upsert_all(&output.records)?;
        report.stored = summary.total();
        report.inserted = summary.inserted;
        report.updated = summary.updated;

        if let Some(path) = &self.mirror_path {
            report.mirror = self.mirror_snapshot(path);
        }

        info!(
            fetched = report.fetched,
            parsed = report.parsed,
            stored = report.stored,
            "pipeline run complete"
        );
        Ok(report)
    }

    fn mirror_snapshot(&self, path: &Path) -> MirrorStatus {
        let written = self
            .store
            .get_all()
            .map_err(|e| e.to_string())
            .and_then(|records| write_mirror(path, &records).map_err(|e| e.to_string()));

        match written {
            Ok(entries) => MirrorStatus::Written {
                path: path.display().to_string(),
                entries,
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "JSON mirror not written");
                MirrorStatus::Failed(e)
            }
        }
    }
}
