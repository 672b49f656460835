// Pipeline ingestion: loading the raw record snapshot for one run

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::domain::RawRecord;
use crate::error::{PipelineError, Result};
use crate::observability::metrics;

/// Input collaborator: supplies the raw record set once per run.
pub trait RecordSource: Send + Sync {
    fn load(&self) -> Result<Vec<RawRecord>>;

    fn describe(&self) -> String;
}

/// Picks a source by file extension (`.json` or anything else as CSV).
pub fn source_for_path(path: &Path) -> Box<dyn RecordSource> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => Box::new(JsonRecordSource::new(path)),
        _ => Box::new(CsvRecordSource::new(path)),
    }
}

/// Reads a headed CSV file. Empty cells and cells that are not valid UTF-8
/// become `null`, everything else text.
pub struct CsvRecordSource {
    path: PathBuf,
}

impl CsvRecordSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RecordSource for CsvRecordSource {
    fn load(&self) -> Result<Vec<RawRecord>> {
        let file = File::open(&self.path).map_err(|e| {
            PipelineError::Input(format!("cannot open '{}': {}", self.path.display(), e))
        })?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::Headers)
            .flexible(true)
            .from_reader(BufReader::new(file));

        let headers = reader
            .byte_headers()?
            .iter()
            .map(|h| {
                std::str::from_utf8(h).map(|h| h.trim().to_string()).map_err(|_| {
                    PipelineError::Input(format!(
                        "'{}' has a header that is not valid UTF-8",
                        self.path.display()
                    ))
                })
            })
            .collect::<Result<Vec<String>>>()?;
        if headers.iter().all(|h| h.is_empty()) {
            return Err(PipelineError::Input(format!(
                "'{}' has no header row",
                self.path.display()
            )));
        }

        // Cells are decoded one by one so a bad byte only loses that cell
        let mut records = Vec::new();
        for (row, result) in reader.byte_records().enumerate() {
            let line = result?;
            let mut record = RawRecord::new(row);
            for (name, cell) in headers.iter().zip(line.iter()) {
                let value = match std::str::from_utf8(cell) {
                    Ok(text) if text.trim().is_empty() => Value::Null,
                    Ok(text) => Value::String(text.to_string()),
                    Err(e) => {
                        warn!(row, column = %name, "Cell is not valid UTF-8, treating as missing: {}", e);
                        metrics::normalize::anomaly(name);
                        Value::Null
                    }
                };
                record.fields.insert(name.clone(), value);
            }
            records.push(record);
        }

        info!("Loaded {} raw records from {}", records.len(), self.path.display());
        Ok(records)
    }

    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }
}

/// Reads a JSON array of flat objects.
pub struct JsonRecordSource {
    path: PathBuf,
}

impl JsonRecordSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RecordSource for JsonRecordSource {
    fn load(&self) -> Result<Vec<RawRecord>> {
        let file = File::open(&self.path).map_err(|e| {
            PipelineError::Input(format!("cannot open '{}': {}", self.path.display(), e))
        })?;
        let value: Value = serde_json::from_reader(BufReader::new(file))?;
        let Value::Array(items) = value else {
            return Err(PipelineError::Input(format!(
                "'{}' must contain a JSON array of records",
                self.path.display()
            )));
        };

        let mut records = Vec::with_capacity(items.len());
        for (row, item) in items.into_iter().enumerate() {
            match item {
                Value::Object(fields) => records.push(RawRecord { row, fields }),
                other => {
                    return Err(PipelineError::Input(format!(
                        "record {row} in '{}' is not an object: {other}",
                        self.path.display()
                    )))
                }
            }
        }

        info!("Loaded {} raw records from {}", records.len(), self.path.display());
        Ok(records)
    }

    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }
}

/// Holds a prepared snapshot, used by tests and embedders.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordSource {
    records: Vec<RawRecord>,
}

impl InMemoryRecordSource {
    /// Rows are renumbered to their position in `records`.
    pub fn new(records: Vec<RawRecord>) -> Self {
        let records = records
            .into_iter()
            .enumerate()
            .map(|(row, mut r)| {
                r.row = row;
                r
            })
            .collect();
        Self { records }
    }
}

impl RecordSource for InMemoryRecordSource {
    fn load(&self) -> Result<Vec<RawRecord>> {
        debug!("Serving {} in-memory records", self.records.len());
        Ok(self.records.clone())
    }

    fn describe(&self) -> String {
        format!("memory:{} records", self.records.len())
    }
}
