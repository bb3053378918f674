// Evaluation progress tracing
// Append-only JSONL log of pipeline stages for one evaluation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Stages of an apnea evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingest,
    Features,
    Classification,
    Scoring,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub timestamp: DateTime<Utc>,

    pub stage: Stage,

    /// Overall evaluation progress [0.0, 1.0]
    pub progress: f32,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl TraceEntry {
    pub fn new(stage: Stage, progress: f32, message: impl Into<String>) -> Self {
        TraceEntry {
            timestamp: Utc::now(),
            stage,
            progress: progress.clamp(0.0, 1.0),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Serialize to JSON line (with newline)
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}\n", json))
    }
}

/// Writes trace entries to a JSONL file, creating it on first write
pub struct TraceWriter {
    file_path: PathBuf,
}

impl TraceWriter {
    pub fn new(file_path: PathBuf) -> Self {
        TraceWriter { file_path }
    }

    pub fn write(&self, entry: &TraceEntry) -> Result<(), TraceError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;

        file.write_all(entry.to_json_line()?.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Record an entry, logging rather than failing the evaluation on error
    pub fn record(&self, entry: TraceEntry) {
        if let Err(e) = self.write(&entry) {
            log::warn!(
                "Failed to write trace entry to {}: {}",
                self.file_path.display(),
                e
            );
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

/// Read trace entries from a JSONL file
pub fn read_trace_file(path: &Path) -> Result<Vec<TraceEntry>, TraceError> {
    let contents = std::fs::read_to_string(path)?;

    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(TraceError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_progress_clamping() {
        assert_eq!(TraceEntry::new(Stage::Ingest, -0.5, "x").progress, 0.0);
        assert_eq!(TraceEntry::new(Stage::Ingest, 1.5, "x").progress, 1.0);
    }

    #[test]
    fn test_stage_serialized_snake_case() {
        let line = TraceEntry::new(Stage::Classification, 0.5, "Classifying")
            .to_json_line()
            .unwrap();
        assert!(line.ends_with('\n'));
        assert!(line.contains("\"stage\":\"classification\""));
        assert!(!line.contains("\"data\""));
    }

    #[test]
    fn test_trace_writer_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let trace_path = temp_dir.path().join("trace.jsonl");
        let writer = TraceWriter::new(trace_path.clone());

        writer.record(TraceEntry::new(Stage::Ingest, 0.0, "Start"));
        writer.record(
            TraceEntry::new(Stage::Scoring, 1.0, "Done")
                .with_data(serde_json::json!({ "ai_max": 12.0 })),
        );

        let entries = read_trace_file(&trace_path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].stage, Stage::Ingest);
        assert_eq!(entries[1].progress, 1.0);
        assert_eq!(entries[1].data.as_ref().unwrap()["ai_max"], 12.0);
    }

    #[test]
    fn test_record_into_missing_directory_does_not_panic() {
        let writer = TraceWriter::new(PathBuf::from("/nonexistent/dir/trace.jsonl"));
        writer.record(TraceEntry::new(Stage::Ingest, 0.0, "Start"));
        assert!(writer.write(&TraceEntry::new(Stage::Ingest, 0.0, "x")).is_err());
    }
}
