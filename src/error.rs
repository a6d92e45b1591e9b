// Error taxonomy for the ingest pipeline
// Row-level failures are absorbed by the parser; batch-level failures propagate.

use thiserror::Error;

/// Why a single income cell could not be turned into a whole-dollar amount
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("income cell is empty")]
    EmptyInput,

    #[error("no digits found in income cell '{input}'")]
    NoDigitsFound { input: String },

    #[error("income value '{input}' does not fit in a 64-bit integer")]
    OutOfRange { input: String },
}

/// Failure to obtain the raw payload. Never fatal for the process.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("source returned HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("I/O error reading payload: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("could not connect to store: {0}")]
    Connection(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("corrupt row in store: {0}")]
    Corrupt(String),

    #[error("invalid income range: min {min} is greater than max {max}")]
    InvalidRange { min: u64, max: u64 },
}

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("could not write JSON mirror {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not serialize JSON mirror: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("store write failed, batch rolled back: {0}")]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
