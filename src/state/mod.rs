// State management module
// Handles SQLite persistence and file system operations

pub mod db;
pub mod models;
pub mod queries;
pub mod storage;

pub use db::{init_db, init_in_memory, DbConnection, DbError};
pub use models::{EvaluationRecord, EvaluationStatus, NewEvaluation, Recording, RecordingSummary};
pub use queries::{
    create_evaluation, create_recording, get_evaluation, get_recording,
    list_evaluations_for_recording, list_recordings,
};
pub use storage::{calculate_sha256, AppPaths, StorageError};
