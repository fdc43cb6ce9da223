//! Result export
//!
//! Writes the end-of-run artifacts into the output directory:
//! - `classification_results.json`: every outcome, index-ordered
//! - `processing_summary.json`: the run summary
//! - `final_results.csv`: the input rows with prediction columns appended

use newslabel_core::{ClassificationOutcome, Error, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

pub const RESULTS_FILE: &str = "classification_results.json";
pub const SUMMARY_FILE: &str = "processing_summary.json";
pub const FINAL_CSV_FILE: &str = "final_results.csv";

/// Columns appended to the dataset in the final CSV
pub const PREDICTION_COLUMNS: [&str; 4] = [
    "predicted_labels",
    "prediction_confidence",
    "model_used",
    "classification_success",
];

const LIST_SEPARATOR: &str = "; ";

/// Writes run artifacts into one directory
#[derive(Debug, Clone)]
pub struct ResultWriter {
    dir: PathBuf,
}

impl ResultWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write all outcomes as a pretty-printed JSON array
    pub fn write_results(&self, outcomes: &[ClassificationOutcome]) -> Result<PathBuf> {
        let path = self.create_path(RESULTS_FILE)?;
        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(&mut writer, outcomes)?;
        writer.flush()?;
        info!(path = %path.display(), count = outcomes.len(), "Wrote detailed results");
        Ok(path)
    }

    /// Write the run summary as pretty-printed JSON
    pub fn write_summary<S: Serialize>(&self, summary: &S) -> Result<PathBuf> {
        let path = self.create_path(SUMMARY_FILE)?;
        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(&mut writer, summary)?;
        writer.flush()?;
        info!(path = %path.display(), "Wrote processing summary");
        Ok(path)
    }

    /// Write the dataset rows with prediction columns appended.
    ///
    /// Row `i` is matched to the outcome with index `i`. Rows without an
    /// outcome get empty prediction cells and `classification_success = false`.
    pub fn write_final_csv(
        &self,
        headers: &csv::StringRecord,
        rows: &[csv::StringRecord],
        outcomes: &[ClassificationOutcome],
    ) -> Result<PathBuf> {
        let path = self.create_path(FINAL_CSV_FILE)?;
        let by_index: HashMap<usize, &ClassificationOutcome> =
            outcomes.iter().map(|o| (o.index, o)).collect();

        let mut writer = csv::Writer::from_path(&path)?;
        let mut header = headers.clone();
        for column in PREDICTION_COLUMNS {
            header.push_field(column);
        }
        writer.write_record(&header)?;

        for (index, row) in rows.iter().enumerate() {
            let mut record = row.clone();
            for cell in prediction_cells(by_index.get(&index).copied()) {
                record.push_field(&cell);
            }
            writer.write_record(&record)?;
        }
        writer.flush()?;

        info!(path = %path.display(), rows = rows.len(), "Wrote final CSV");
        Ok(path)
    }

    fn create_path(&self, name: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            Error::persistence(format!("failed to create {}: {}", self.dir.display(), e))
        })?;
        Ok(self.dir.join(name))
    }
}

fn prediction_cells(outcome: Option<&ClassificationOutcome>) -> [String; 4] {
    let Some(outcome) = outcome else {
        return [String::new(), String::new(), String::new(), false.to_string()];
    };
    let labels = outcome
        .labels
        .iter()
        .map(|l| l.label.name())
        .collect::<Vec<_>>()
        .join(LIST_SEPARATOR);
    let confidences = outcome
        .labels
        .iter()
        .map(|l| format!("{:.2}", l.confidence))
        .collect::<Vec<_>>()
        .join(LIST_SEPARATOR);
    [
        labels,
        confidences,
        outcome.model_used.clone(),
        outcome.success.to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use newslabel_core::{Label, LabelScore};
    use tempfile::TempDir;

    fn outcome(index: usize, labels: Vec<LabelScore>) -> ClassificationOutcome {
        let mut outcome = ClassificationOutcome::failed(index, "primary", "x");
        outcome.success = true;
        outcome.error = None;
        outcome.labels = labels;
        outcome
    }

    #[test]
    fn test_write_results_json() {
        let temp_dir = TempDir::new().unwrap();
        let writer = ResultWriter::new(temp_dir.path().join("out"));

        let outcomes = vec![
            outcome(0, vec![LabelScore { label: Label::Land, confidence: 0.9 }]),
            ClassificationOutcome::failed(1, "primary", "timeout"),
        ];
        let path = writer.write_results(&outcomes).unwrap();

        let loaded: Vec<ClassificationOutcome> =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].labels[0].label, Label::Land);
        assert!(!loaded[1].success);
    }

    #[test]
    fn test_write_summary_json() {
        let temp_dir = TempDir::new().unwrap();
        let writer = ResultWriter::new(temp_dir.path());

        let path = writer
            .write_summary(&serde_json::json!({"total_records": 5}))
            .unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("\"total_records\": 5"));
    }

    #[test]
    fn test_final_csv_appends_prediction_columns() {
        let temp_dir = TempDir::new().unwrap();
        let writer = ResultWriter::new(temp_dir.path());

        let headers = csv::StringRecord::from(vec!["Tieu_de", "Description", "Noi_dung_tin_bai"]);
        let rows = vec![
            csv::StringRecord::from(vec!["a", "b", "c"]),
            csv::StringRecord::from(vec!["d", "e", "f"]),
        ];
        let outcomes = vec![outcome(
            0,
            vec![
                LabelScore { label: Label::Environment, confidence: 0.923 },
                LabelScore { label: Label::WaterResources, confidence: 0.7 },
            ],
        )];

        let path = writer.write_final_csv(&headers, &rows, &outcomes).unwrap();

        let mut reader = csv::Reader::from_path(path).unwrap();
        let header = reader.headers().unwrap().clone();
        assert_eq!(header.len(), 7);
        assert_eq!(&header[3], "predicted_labels");

        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(&records[0][3], "Môi trường; Tài nguyên nước");
        assert_eq!(&records[0][4], "0.92; 0.70");
        assert_eq!(&records[0][5], "primary");
        assert_eq!(&records[0][6], "true");
        // unprocessed row
        assert_eq!(&records[1][0], "d");
        assert_eq!(&records[1][3], "");
        assert_eq!(&records[1][6], "false");
    }
}
