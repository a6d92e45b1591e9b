// JSON mirror: a non-authoritative dump of the stored snapshot.
// Written wholesale; a failure here never touches the store.

use crate::error::MirrorError;
use crate::record::{MajorIncome, MajorIncomeRecord};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Write `[{major, income}, ...]` to `path`, replacing any previous content.
/// Returns the number of entries written.
pub fn write_mirror(path: &Path, records: &[MajorIncomeRecord]) -> Result<usize, MirrorError> {
    let io_err = |source: std::io::Error| MirrorError::Io {
        path: path.display().to_string(),
        source,
    };

    let entries: Vec<MajorIncome> = records.iter().map(MajorIncome::from).collect();

    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &entries)?;
    writer.flush().map_err(io_err)?;

    Ok(entries.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn record(major: &str, income: u64) -> MajorIncomeRecord {
        MajorIncomeRecord {
            id: Uuid::new_v4(),
            major: major.to_string(),
            income,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_writes_major_and_income_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("majors.json");

        let written = write_mirror(&path, &[record("Math", 60000), record("Art", 40000)]).unwrap();
        assert_eq!(written, 2);

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!([
                {"major": "Math", "income": 60000},
                {"major": "Art", "income": 40000}
            ])
        );
    }

    #[test]
    fn test_overwrites_instead_of_appending() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("majors.json");

        write_mirror(&path, &[record("Math", 60000), record("Art", 40000)]).unwrap();
        write_mirror(&path, &[record("Law", 90000)]).unwrap();

        let value: Vec<MajorIncome> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value, vec![MajorIncome::new("Law", 90000)]);
    }

    #[test]
    fn test_unwritable_path_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no_such_dir").join("majors.json");

        assert!(matches!(
            write_mirror(&path, &[record("Math", 1)]),
            Err(MirrorError::Io { .. })
        ));
    }
}
