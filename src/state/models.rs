// Data models for persisted recordings and evaluations
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub source_path: String,
    pub source_sha256: String,
    pub beat_count: i64,
    pub duration_min: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingSummary {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub duration_min: f64,
    pub evaluation_count: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationStatus {
    Completed,
    Rejected,
    Failed,
}

impl EvaluationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationStatus::Completed => "completed",
            EvaluationStatus::Rejected => "rejected",
            EvaluationStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(EvaluationStatus::Completed),
            "rejected" => Some(EvaluationStatus::Rejected),
            "failed" => Some(EvaluationStatus::Failed),
            _ => None,
        }
    }
}

/// Stored outcome of one evaluation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub id: Uuid,
    pub recording_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub model_version: String,
    pub status: EvaluationStatus,
    pub ai_max: Option<f64>,
    pub apnea_total: Option<i64>,
    pub minute_count: i64,

    /// Per-minute labels, one 0/1 per minute
    pub predictions: Vec<u8>,
}

/// Fields supplied when storing a new evaluation
#[derive(Debug, Clone)]
pub struct NewEvaluation {
    pub recording_id: Uuid,
    pub model_version: String,
    pub status: EvaluationStatus,
    pub ai_max: Option<f64>,
    pub apnea_total: Option<i64>,
    pub predictions: Vec<u8>,
}

/// Encode predictions as a compact "0101..." string for storage
pub fn encode_predictions(predictions: &[u8]) -> String {
    predictions
        .iter()
        .map(|&p| if p == 1 { '1' } else { '0' })
        .collect()
}

pub fn decode_predictions(encoded: &str) -> Option<Vec<u8>> {
    encoded
        .chars()
        .map(|c| match c {
            '0' => Some(0),
            '1' => Some(1),
            _ => None,
        })
        .collect()
}
