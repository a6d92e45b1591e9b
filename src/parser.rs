// 🏗️ Record Parser
// Delimited payload → MajorIncome records
//
// Lenient by design of the upstream data: bad rows are counted and dropped,
// never fatal. Deduplication by major is left to the store's upsert.

use crate::error::NormalizeError;
use crate::normalizer::normalize_income;
use crate::record::MajorIncome;
use csv::{ReaderBuilder, StringRecord};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ============================================================================
// CORE TYPES
// ============================================================================

/// Which columns hold the major and the income, and how cells are separated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParserConfig {
    pub major_column: usize,
    pub income_column: usize,
    pub delimiter: u8,
}

impl Default for ParserConfig {
    fn default() -> Self {
        ParserConfig {
            major_column: 0,
            income_column: 1,
            delimiter: b',',
        }
    }
}

/// Why a row was dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The CSV reader could not decode the row
    Malformed(String),
    /// Fewer columns than the configured indices need
    ShortRow { columns: usize, required: usize },
    EmptyMajor,
    InvalidIncome(NormalizeError),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Malformed(e) => write!(f, "malformed row: {}", e),
            SkipReason::ShortRow { columns, required } => {
                write!(f, "row has {} columns, needs {}", columns, required)
            }
            SkipReason::EmptyMajor => write!(f, "major name is empty"),
            SkipReason::InvalidIncome(e) => write!(f, "{}", e),
        }
    }
}

/// Per-payload counters. `rows_seen` excludes the header and blank lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseReport {
    pub rows_seen: usize,
    pub parsed: usize,
    pub malformed: usize,
    pub short_row: usize,
    pub empty_major: usize,
    pub invalid_income: usize,
}

impl ParseReport {
    pub fn skipped(&self) -> usize {
        self.malformed + self.short_row + self.empty_major + self.invalid_income
    }

    fn record_skip(&mut self, reason: &SkipReason) {
        match reason {
            SkipReason::Malformed(_) => self.malformed += 1,
            SkipReason::ShortRow { .. } => self.short_row += 1,
            SkipReason::EmptyMajor => self.empty_major += 1,
            SkipReason::InvalidIncome(_) => self.invalid_income += 1,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParseOutput {
    pub records: Vec<MajorIncome>,
    pub report: ParseReport,
}

// ============================================================================
// PARSER
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct RecordParser {
    config: ParserConfig,
}

impl RecordParser {
    pub fn new(config: ParserConfig) -> Self {
        RecordParser { config }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Minimum row width the configured column indices need
    pub fn required_columns(&self) -> usize {
        self.config.major_column.max(self.config.income_column) + 1
    }

    /// Parse a whole payload. The first line is a header and is discarded.
    ///
    /// Each line is decoded on its own, so a stray quote costs only its own
    /// row. Output keeps encounter order; the same major appearing twice
    /// yields two records and the later one wins at the store.
    pub fn parse(&self, payload: &str) -> ParseOutput {
        let mut output = ParseOutput::default();

        for (index, line) in payload.lines().enumerate().skip(1) {
            if line.trim().is_empty() {
                continue;
            }
            let line_number = index + 1;
            output.report.rows_seen += 1;

            match self.read_line(line).and_then(|row| self.parse_row(&row)) {
                Ok(record) => {
                    output.report.parsed += 1;
                    output.records.push(record);
                }
                Err(reason) => {
                    debug!(line = line_number, %reason, "skipping row");
                    output.report.record_skip(&reason);
                }
            }
        }

        output
    }

    /// Split one line into cells, honoring quoted delimiters
    fn read_line(&self, line: &str) -> Result<StringRecord, SkipReason> {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.config.delimiter)
            .from_reader(line.as_bytes());

        let mut row = StringRecord::new();
        match reader.read_record(&mut row) {
            Ok(true) => Ok(row),
            Ok(false) => Ok(StringRecord::new()),
            Err(e) => Err(SkipReason::Malformed(e.to_string())),
        }
    }

    /// Turn a single data row into a record, or say why it can't be
    pub fn parse_row(&self, row: &StringRecord) -> Result<MajorIncome, SkipReason> {
        let required = self.required_columns();
        if row.len() < required {
            return Err(SkipReason::ShortRow {
                columns: row.len(),
                required,
            });
        }

        let major = row.get(self.config.major_column).unwrap_or("").trim();
        if major.is_empty() {
            return Err(SkipReason::EmptyMajor);
        }

        let income = normalize_income(row.get(self.config.income_column))
            .map_err(SkipReason::InvalidIncome)?;

        Ok(MajorIncome::new(major, income))
    }
}

// ============================================================================
// TESTS
// ============================================================================
