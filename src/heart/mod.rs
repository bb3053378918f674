// Heartbeat processing module
// Handles upload ingestion, duration checks and minute-wise feature extraction

pub mod features;
pub mod ingest;

pub use features::{extract_features, FeatureConfig, FeatureError, FeatureTable, FEATURE_COLUMNS};
pub use ingest::{
    check_duration, ingest_beats, DurationBounds, HeartRateSeries, HeartbeatData, IngestError,
    DURATION_WARNING,
};
