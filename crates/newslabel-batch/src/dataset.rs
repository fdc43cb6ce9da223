//! Dataset loading
//!
//! Reads the news CSV, checks the required columns, cleans the text fields,
//! and fingerprints the raw bytes so a checkpoint can be tied to the exact
//! file it was produced from.

use newslabel_core::text::TextCleaner;
use newslabel_core::{Error, Record, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const TITLE_COLUMN: &str = "Tieu_de";
pub const DESCRIPTION_COLUMN: &str = "Description";
pub const CONTENT_COLUMN: &str = "Noi_dung_tin_bai";

/// Columns every dataset must carry
pub const REQUIRED_COLUMNS: [&str; 3] = [TITLE_COLUMN, DESCRIPTION_COLUMN, CONTENT_COLUMN];

const MIN_TITLE_CHARS: usize = 5;

/// A loaded dataset
#[derive(Debug, Clone)]
pub struct Dataset {
    path: Option<PathBuf>,
    fingerprint: String,
    headers: csv::StringRecord,
    rows: Vec<csv::StringRecord>,
    records: Vec<Record>,
}

impl Dataset {
    /// Load and validate the dataset at `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            Error::validation(format!("failed to read dataset {}: {}", path.display(), e))
        })?;
        let mut dataset = Self::from_bytes(&bytes)?;
        dataset.path = Some(path.to_path_buf());
        info!(
            path = %path.display(),
            records = dataset.len(),
            fingerprint = %dataset.fingerprint,
            "Loaded dataset"
        );
        Ok(dataset)
    }

    /// Parse a dataset from raw CSV bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = csv::Reader::from_reader(bytes);
        let headers = reader.headers()?.clone();

        let position = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim_start_matches('\u{feff}').trim() == name)
        };
        let (Some(title_at), Some(description_at), Some(content_at)) = (
            position(TITLE_COLUMN),
            position(DESCRIPTION_COLUMN),
            position(CONTENT_COLUMN),
        ) else {
            let missing: Vec<&str> = REQUIRED_COLUMNS
                .iter()
                .copied()
                .filter(|c| position(c).is_none())
                .collect();
            return Err(Error::validation(format!(
                "missing required columns: {}",
                missing.join(", ")
            )));
        };

        let cleaner = TextCleaner::new()?;
        let mut rows = Vec::new();
        let mut records = Vec::new();
        for (index, row) in reader.records().enumerate() {
            let row = row?;
            let field = |at: usize| cleaner.clean(row.get(at).unwrap_or_default());
            let record = Record::new(
                index,
                field(title_at),
                field(description_at),
                field(content_at),
            );
            for problem in record_warnings(&record) {
                warn!(index, problem = %problem, "Record validation warning");
            }
            records.push(record);
            rows.push(row);
        }

        if records.is_empty() {
            return Err(Error::validation("dataset is empty"));
        }

        Ok(Self {
            path: None,
            fingerprint: fingerprint(bytes),
            headers,
            rows,
            records,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// SHA-256 of the dataset bytes, hex encoded
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Original header row
    pub fn headers(&self) -> &csv::StringRecord {
        &self.headers
    }

    /// Original rows, in record index order
    pub fn rows(&self) -> &[csv::StringRecord] {
        &self.rows
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Hex-encoded SHA-256 of `bytes`
pub fn fingerprint(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Non-fatal problems with a single record.
///
/// These are reported but never drop the record.
pub fn record_warnings(record: &Record) -> Vec<String> {
    let mut warnings = Vec::new();
    if record.title.is_empty() {
        warnings.push("empty title".to_string());
    } else if record.title.chars().count() < MIN_TITLE_CHARS {
        warnings.push(format!(
            "title shorter than {} characters",
            MIN_TITLE_CHARS
        ));
    }
    if record.description.is_empty() {
        warnings.push("empty description".to_string());
    }
    if record.content.is_empty() {
        warnings.push("empty content".to_string());
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "Tieu_de,Description,Noi_dung_tin_bai,Nguon\n\
        Ô nhiễm sông,Nước thải <b>công nghiệp</b>,Nội dung  bài viết,vnexpress\n\
        Bản đồ,,Đo đạc địa chính,tuoitre\n";

    #[test]
    fn test_load_cleans_fields_and_keeps_rows() {
        let dataset = Dataset::from_bytes(CSV.as_bytes()).unwrap();

        assert_eq!(dataset.len(), 2);
        let first = &dataset.records()[0];
        assert_eq!(first.index, 0);
        assert_eq!(first.description, "Nước thải công nghiệp");
        assert_eq!(first.content, "Nội dung bài viết");
        assert_eq!(dataset.records()[1].index, 1);
        assert_eq!(dataset.records()[1].description, "");

        // raw rows are untouched for the final export
        assert_eq!(dataset.headers().len(), 4);
        assert_eq!(&dataset.rows()[0][1], "Nước thải <b>công nghiệp</b>");
    }

    #[test]
    fn test_missing_columns_rejected() {
        let err = Dataset::from_bytes(b"Tieu_de,Body\nx,y\n").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("Description"));
        assert!(err.to_string().contains("Noi_dung_tin_bai"));
    }

    #[test]
    fn test_empty_dataset_rejected() {
        let err = Dataset::from_bytes(b"Tieu_de,Description,Noi_dung_tin_bai\n").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = Dataset::from_bytes(CSV.as_bytes()).unwrap();
        let b = Dataset::from_bytes(CSV.replace("tuoitre", "thanhnien").as_bytes()).unwrap();

        assert_eq!(a.fingerprint().len(), 64);
        assert_eq!(a.fingerprint(), fingerprint(CSV.as_bytes()));
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_record_warnings() {
        let record = Record::new(0, "Mưa", "", "Nội dung");
        let warnings = record_warnings(&record);
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("shorter than 5"));
        assert_eq!(warnings[1], "empty description");

        assert!(record_warnings(&Record::new(1, "Tiêu đề dài", "Mô tả", "Nội dung")).is_empty());
    }
}
