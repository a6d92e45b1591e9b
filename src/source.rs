// Payload sources
// "A text payload arrives, possibly absent." Ok(None) means absent, not failed.

use crate::error::FetchError;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; CollegeIncomeScraper/1.0)";

pub trait PayloadSource {
    /// Human-readable origin for log lines
    fn describe(&self) -> String;

    fn fetch(&self) -> Result<Option<String>, FetchError>;
}

/// Fetch over HTTP with a bounded timeout. Timeouts are failures, never retried.
pub struct HttpSource {
    url: String,
    client: Client,
}

impl HttpSource {
    pub fn new(url: impl Into<String>, timeout: Duration, user_agent: &str) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(HttpSource {
            url: url.into(),
            client,
        })
    }
}

impl PayloadSource for HttpSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    fn fetch(&self) -> Result<Option<String>, FetchError> {
        debug!(url = %self.url, "fetching payload");
        let resp = self.client.get(&self.url).send()?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            info!(url = %self.url, "source has no payload (404)");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        let body = resp.text()?;
        Ok(non_empty(body))
    }
}

/// Read a payload from a local file. A missing file is an absent payload.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileSource { path: path.into() }
    }
}

impl PayloadSource for FileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn fetch(&self) -> Result<Option<String>, FetchError> {
        match std::fs::read_to_string(&self.path) {
            Ok(body) => Ok(non_empty(body)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// An injected payload, for tests and demos
pub struct StaticSource {
    payload: Option<String>,
}

impl StaticSource {
    pub fn new(payload: impl Into<String>) -> Self {
        StaticSource {
            payload: Some(payload.into()),
        }
    }

    pub fn absent() -> Self {
        StaticSource { payload: None }
    }
}

impl PayloadSource for StaticSource {
    fn describe(&self) -> String {
        "static payload".to_string()
    }

    fn fetch(&self) -> Result<Option<String>, FetchError> {
        Ok(self.payload.clone().and_then(non_empty))
    }
}

fn non_empty(body: String) -> Option<String> {
    if body.trim().is_empty() {
        None
    } else {
        Some(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_static_source() {
        assert_eq!(
            StaticSource::new("major,income\n").fetch().unwrap(),
            Some("major,income\n".to_string())
        );
        assert_eq!(StaticSource::absent().fetch().unwrap(), None);
        assert_eq!(StaticSource::new("  \n").fetch().unwrap(), None);
    }

    #[test]
    fn test_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("majors.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "major,income\nHistory,52000").unwrap();

        let body = FileSource::new(&path).fetch().unwrap().unwrap();
        assert!(body.contains("History"));
    }

    #[test]
    fn test_missing_file_is_absent_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileSource::new(dir.path().join("nope.csv"));
        assert!(source.fetch().unwrap().is_none());
    }

    #[test]
    fn test_directory_is_a_fetch_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileSource::new(dir.path());
        assert!(matches!(source.fetch(), Err(FetchError::Io(_))));
    }
}
