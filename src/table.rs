use std::fs;
use std::path::Path;

use csv::{ReaderBuilder, WriterBuilder};

use crate::error::PipelineError;

/// Name of the subject identifier column shared by all three file kinds.
pub const ID_COLUMN: &str = "VAERS_ID";

/// An in-memory delimited table: the header row plus every data row as a
/// `Vec<String>`. All pipeline stages after the scrubber work on these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Read a UTF-8 CSV file produced by an earlier stage. `flexible` so a
    /// ragged row surfaces as a short/long `Vec` for the caller to count and
    /// drop, not as a hard parse failure.
    pub fn read(path: &Path) -> Result<Table, PipelineError> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .map_err(|e| {
                if matches!(e.kind(), csv::ErrorKind::Io(_)) {
                    PipelineError::Parse {
                        path: path.to_path_buf(),
                        reason: format!("could not open: {e}"),
                    }
                } else {
                    PipelineError::Csv(e)
                }
            })?;

        let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(Table { headers, rows })
    }

    /// Write the table to `path` atomically: serialize next to the target
    /// and rename into place, so a crash mid-write never leaves a truncated
    /// file where a complete one used to be.
    pub fn write(&self, path: &Path) -> Result<(), PipelineError> {
        let tmp = path.with_extension("csv.tmp");
        let mut wtr = WriterBuilder::new()
            .from_path(&tmp)
            .map_err(PipelineError::Csv)?;
        wtr.write_record(&self.headers)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush().map_err(|e| PipelineError::io(&tmp, e))?;
        drop(wtr);
        fs::rename(&tmp, path).map_err(|e| PipelineError::io(path, e))?;
        Ok(())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_headers_and_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("t.csv");
        let table = Table {
            headers: vec!["VAERS_ID".into(), "STATE".into()],
            rows: vec![
                vec!["1001".into(), "WA".into()],
                vec!["1002".into(), "field, with comma".into()],
            ],
        };
        table.write(&path).unwrap();
        let back = Table::read(&path).unwrap();
        assert_eq!(back, table);
        assert!(!path.with_extension("csv.tmp").exists());
    }

    #[test]
    fn ragged_rows_survive_reading() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ragged.csv");
        fs::write(&path, "VAERS_ID,A,B\n1,x,y\n2,only-one\n").unwrap();
        let table = Table::read(&path).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1].len(), 2);
    }

    #[test]
    fn missing_file_is_a_parse_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = Table::read(&tmp.path().join("absent.csv")).unwrap_err();
        assert!(matches!(err, PipelineError::Parse { .. }));
    }
}
