// Configuration
// Everything the pipeline and store need is passed in explicitly from here;
// nothing is read from process-wide constants.

use crate::db::SqliteStore;
use crate::error::ConfigError;
use crate::parser::ParserConfig;
use crate::source::{FileSource, HttpSource, PayloadSource, DEFAULT_USER_AGENT};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub parser: ParserSection,
    pub database: DatabaseConfig,
    pub mirror: MirrorConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub url: Option<String>,
    pub file: Option<PathBuf>,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            url: None,
            file: None,
            timeout_secs: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ParserSection {
    pub major_column: usize,
    pub income_column: usize,
    pub delimiter: String,
}

impl Default for ParserSection {
    fn default() -> Self {
        ParserSection {
            major_column: 0,
            income_column: 1,
            delimiter: ",".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: PathBuf::from("majors.db"),
            busy_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: "0.0.0.0:3000".to_string(),
        }
    }
}

impl Config {
    /// Load from a TOML file, or use defaults when no file is given
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
                Self::from_toml(&content)?
            }
            None => Config::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.parser_config()?;
        if self.source.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "source.timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn parser_config(&self) -> Result<ParserConfig, ConfigError> {
        let delimiter = match self.parser.delimiter.as_bytes() {
            [b] if b.is_ascii() => *b,
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "parser.delimiter must be a single ASCII character, got '{}'",
                    self.parser.delimiter
                )))
            }
        };

        if self.parser.major_column == self.parser.income_column {
            return Err(ConfigError::Invalid(
                "parser.major_column and parser.income_column must differ".to_string(),
            ));
        }

        Ok(ParserConfig {
            major_column: self.parser.major_column,
            income_column: self.parser.income_column,
            delimiter,
        })
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.source.timeout_secs)
    }

    pub fn store(&self) -> SqliteStore {
        SqliteStore::new(
            self.database.path.clone(),
            Duration::from_millis(self.database.busy_timeout_ms),
        )
    }

    /// A local file wins over a URL when both are set
    pub fn payload_source(&self) -> Result<Box<dyn PayloadSource>, ConfigError> {
        if let Some(file) = &self.source.file {
            return Ok(Box::new(FileSource::new(file.clone())));
        }

        match &self.source.url {
            Some(url) => {
                let source = HttpSource::new(url.clone(), self.fetch_timeout(), &self.source.user_agent)
                    .map_err(|e| ConfigError::Invalid(format!("cannot build HTTP client: {}", e)))?;
                Ok(Box::new(source))
            }
            None => Err(ConfigError::Invalid(
                "no payload source configured (set source.url or source.file)".to_string(),
            )),
        }
    }
}
