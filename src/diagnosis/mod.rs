// Diagnosis module
// Severity scoring over per-minute apnea predictions

pub mod scorer;

pub use scorer::{apnea_diagnose, apnea_total, Diagnosis, ScoreError, TailSegment};
