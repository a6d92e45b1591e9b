// Major Income Ingest - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod mirror;
pub mod normalizer;
pub mod parser;
pub mod pipeline;
pub mod record;
pub mod source;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use db::SqliteStore;
pub use error::{
    ConfigError, FetchError, MirrorError, NormalizeError, PipelineError, StoreError,
};
pub use mirror::write_mirror;
pub use normalizer::normalize_income;
pub use parser::{ParseOutput, ParseReport, ParserConfig, RecordParser, SkipReason};
pub use pipeline::{MirrorStatus, PayloadStatus, Pipeline, PipelineReport};
pub use record::{IncomeStatistics, MajorIncome, MajorIncomeRecord, UpsertSummary};
pub use source::{FileSource, HttpSource, PayloadSource, StaticSource};
pub use store::{IncomeStore, MemoryStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
