//! JSON-lines result log: one `ComparisonRecord` per line, append-only.

use facevote_core::Outcome;
use facevote_pipeline::{ComparisonRecord, ResultSink, SinkError};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub struct JsonlSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for JsonlSink {
    fn record(&self, record: &ComparisonRecord) -> Result<(), SinkError> {
        let mut line =
            serde_json::to_string(record).map_err(|e| SinkError::Serialize(e.to_string()))?;
        line.push('\n');

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;

        tracing::debug!(path = %self.path.display(), run_id = %record.run_id, "comparison logged");
        Ok(())
    }
}

/// Read every record in the log. A missing file is an empty log; malformed lines are skipped.
pub fn read_records(path: &Path) -> std::io::Result<Vec<ComparisonRecord>> {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut records = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(path = %path.display(), line = i + 1, error = %e, "skipping malformed log line");
            }
        }
    }
    Ok(records)
}

/// Aggregate figures over the result log.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Statistics {
    pub total_comparisons: usize,
    pub same_count: usize,
    pub different_count: usize,
    pub average_confidence: f64,
    pub average_processing_ms: f64,
    pub total_oracle_calls: usize,
    pub early_stops: usize,
    /// Percentage of runs that stopped before the Aligned stage.
    pub early_stop_rate: f64,
}

impl Statistics {
    pub fn from_records(records: &[ComparisonRecord]) -> Self {
        let total = records.len();
        if total == 0 {
            return Self::default();
        }

        let same_count = records
            .iter()
            .filter(|r| r.decision.outcome == Outcome::Same)
            .count();
        let early_stops = records.iter().filter(|r| r.decision.stopped_early).count();
        let confidence_sum: f64 = records.iter().map(|r| r.decision.confidence_percent).sum();
        let ms_sum: u64 = records.iter().map(|r| r.processing_ms).sum();

        Self {
            total_comparisons: total,
            same_count,
            different_count: total - same_count,
            average_confidence: confidence_sum / total as f64,
            average_processing_ms: ms_sum as f64 / total as f64,
            total_oracle_calls: records.iter().map(|r| r.oracle_calls).sum(),
            early_stops,
            early_stop_rate: early_stops as f64 * 100.0 / total as f64,
        }
    }

    pub fn render(&self) -> String {
        if self.total_comparisons == 0 {
            return "No comparisons logged yet.".to_string();
        }
        format!(
            "Total comparisons:   {}\n\
             Same / different:    {} / {}\n\
             Average confidence:  {:.1}%\n\
             Average time:        {:.0} ms\n\
             Oracle calls:        {}\n\
             Early stops:         {} ({:.1}%)",
            self.total_comparisons,
            self.same_count,
            self.different_count,
            self.average_confidence,
            self.average_processing_ms,
            self.total_oracle_calls,
            self.early_stops,
            self.early_stop_rate,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use facevote_core::{build_breakdown, Decision};
    use facevote_pipeline::InputFingerprint;
    use uuid::Uuid;

    fn record(outcome: Outcome, confidence: f64, stopped_early: bool, ms: u64) -> ComparisonRecord {
        ComparisonRecord {
            run_id: Uuid::new_v4(),
            finished_at: Utc::now(),
            decision: Decision {
                outcome,
                confidence_percent: confidence,
                total_weight: 4.0,
                weight_same: 0.0,
                weight_different: 0.0,
                vote_count: 4,
                stopped_early,
            },
            breakdown: build_breakdown(&[]),
            processing_ms: ms,
            crop_success: None,
            align_success: None,
            oracle_calls: 4,
            abstentions: Vec::new(),
            inputs: vec![InputFingerprint {
                label: "a.jpg".into(),
                sha256: "00".into(),
            }],
        }
    }

    #[test]
    fn test_append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlSink::new(dir.path().join("nested/comparisons.jsonl"));
        let first = record(Outcome::Same, 100.0, true, 1200);
        let second = record(Outcome::Different, 60.0, false, 3000);
        sink.record(&first).unwrap();
        sink.record(&second).unwrap();

        let raw = std::fs::read_to_string(sink.path()).unwrap();
        assert_eq!(raw.lines().count(), 2);

        let records = read_records(sink.path()).unwrap();
        assert_eq!(records, vec![first, second]);
    }

    #[test]
    fn test_missing_log_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let records = read_records(&dir.path().join("absent.jsonl")).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlSink::new(dir.path().join("log.jsonl"));
        sink.record(&record(Outcome::Same, 90.0, false, 10)).unwrap();
        let mut file = OpenOptions::new().append(true).open(sink.path()).unwrap();
        writeln!(file, "{{not json").unwrap();
        writeln!(file).unwrap();
        sink.record(&record(Outcome::Same, 80.0, false, 10)).unwrap();

        assert_eq!(read_records(sink.path()).unwrap().len(), 2);
    }

    #[test]
    fn test_statistics() {
        let records = vec![
            record(Outcome::Same, 100.0, true, 1000),
            record(Outcome::Same, 80.0, false, 2000),
            record(Outcome::Different, 60.0, false, 3000),
            record(Outcome::Different, 100.0, true, 2000),
        ];
        let stats = Statistics::from_records(&records);
        assert_eq!(stats.total_comparisons, 4);
        assert_eq!(stats.same_count, 2);
        assert_eq!(stats.different_count, 2);
        assert!((stats.average_confidence - 85.0).abs() < 1e-9);
        assert!((stats.average_processing_ms - 2000.0).abs() < 1e-9);
        assert_eq!(stats.total_oracle_calls, 16);
        assert_eq!(stats.early_stops, 2);
        assert!((stats.early_stop_rate - 50.0).abs() < 1e-9);
        assert!(stats.render().contains("Early stops:         2 (50.0%)"));
    }

    #[test]
    fn test_statistics_empty() {
        let stats = Statistics::from_records(&[]);
        assert_eq!(stats, Statistics::default());
        assert_eq!(stats.render(), "No comparisons logged yet.");
    }
}
