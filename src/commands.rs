// Tauri IPC Commands
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tauri::State;
use uuid::Uuid;

use crate::detect::ModelInfo;
use crate::heart;
use crate::pipeline::{Evaluation, EvaluationOutcome, Evaluator, TraceWriter};
use crate::samples::{SampleInfo, SampleStore};
use crate::state::{
    self, AppPaths, DbConnection, EvaluationRecord, EvaluationStatus, NewEvaluation, Recording,
    RecordingSummary,
};

#[derive(Debug, Serialize)]
pub struct CommandError {
    message: String,
}

impl<E: std::fmt::Display> From<E> for CommandError {
    fn from(error: E) -> Self {
        CommandError {
            message: error.to_string(),
        }
    }
}

type CommandResult<T> = Result<T, CommandError>;

/// Long-lived services shared by all commands
#[derive(Clone)]
pub struct AppState {
    pub evaluator: Arc<Evaluator>,
    pub samples: Arc<SampleStore>,
    pub paths: Arc<AppPaths>,
}

// ==================== EVALUATION COMMANDS ====================

#[derive(Debug, Deserialize)]
pub struct EvaluateUploadInput {
    pub name: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Serialize)]
pub struct UploadEvaluation {
    pub recording: Recording,
    pub evaluation_id: Uuid,
    pub outcome: EvaluationOutcome,
}

/// Store an uploaded heartbeat file, evaluate it and persist the result
#[tauri::command]
pub async fn evaluate_upload(
    app: State<'_, AppState>,
    db: State<'_, DbConnection>,
    input: EvaluateUploadInput,
) -> CommandResult<UploadEvaluation> {
    let app = app.inner().clone();
    let db = db.inner().clone();

    tokio::task::spawn_blocking(move || run_upload(&app, &db, input)).await?
}

fn run_upload(
    app: &AppState,
    db: &DbConnection,
    input: EvaluateUploadInput,
) -> CommandResult<UploadEvaluation> {
    // Validate before anything touches disk
    let beats = heart::ingest_beats(&input.data).map_err(|e| CommandError {
        message: format!("Failed to read heartbeat file: {}", e),
    })?;

    let recording_id = Uuid::new_v4();
    let (source_path, source_sha256) = app.paths.store_upload(&recording_id, &input.data)?;

    let recording = state::create_recording(
        db,
        recording_id,
        input.name,
        source_path.to_string_lossy().to_string(),
        source_sha256,
        beats.beat_count() as i64,
        beats.span_minutes(),
    )?;

    let evaluation_id = Uuid::new_v4();
    let trace = TraceWriter::new(app.paths.trace_path(&recording_id, &evaluation_id)?);
    let model_version = app.evaluator.bundle().version.clone();

    let outcome = match app.evaluator.evaluate_beats(&beats, Some(&trace)) {
        Ok(outcome) => outcome,
        Err(e) => {
            log::error!("Evaluation of recording {} failed: {}", recording_id, e);
            state::create_evaluation(
                db,
                evaluation_id,
                NewEvaluation {
                    recording_id,
                    model_version,
                    status: EvaluationStatus::Failed,
                    ai_max: None,
                    apnea_total: None,
                    predictions: Vec::new(),
                },
            )?;
            return Err(e.into());
        }
    };

    let new = match &outcome {
        EvaluationOutcome::Completed(evaluation) => NewEvaluation {
            recording_id,
            model_version,
            status: EvaluationStatus::Completed,
            ai_max: Some(evaluation.diagnosis.ai_max),
            apnea_total: Some(i64::from(evaluation.diagnosis.apnea_total)),
            predictions: evaluation.predictions.clone(),
        },
        EvaluationOutcome::Rejected { .. } => NewEvaluation {
            recording_id,
            model_version,
            status: EvaluationStatus::Rejected,
            ai_max: None,
            apnea_total: None,
            predictions: Vec::new(),
        },
    };
    state::create_evaluation(db, evaluation_id, new)?;

    log::info!(
        "Evaluated recording {} ({} beats, {:.1} min)",
        recording.id,
        recording.beat_count,
        recording.duration_min
    );

    Ok(UploadEvaluation {
        recording,
        evaluation_id,
        outcome,
    })
}

/// Evaluate one of the built-in sample recordings
#[tauri::command]
pub async fn evaluate_sample(app: State<'_, AppState>, name: String) -> CommandResult<Evaluation> {
    let app = app.inner().clone();

    tokio::task::spawn_blocking(move || -> CommandResult<Evaluation> {
        let sample = app.samples.load(&name)?;
        Ok(app.evaluator.evaluate_sample(&sample, None)?)
    })
    .await?
}

#[tauri::command]
pub fn list_samples(app: State<'_, AppState>) -> Vec<SampleInfo> {
    app.samples.available()
}

#[tauri::command]
pub fn get_model_info(app: State<'_, AppState>) -> ModelInfo {
    app.evaluator.bundle().info()
}

// ==================== HISTORY COMMANDS ====================

#[tauri::command]
pub fn list_recordings(db: State<'_, DbConnection>) -> CommandResult<Vec<RecordingSummary>> {
    Ok(state::list_recordings(&db)?)
}

#[tauri::command]
pub fn get_recording(db: State<'_, DbConnection>, id: String) -> CommandResult<Option<Recording>> {
    let uuid = Uuid::parse_str(&id)?;
    Ok(state::get_recording(&db, &uuid)?)
}

#[tauri::command]
pub fn list_evaluations_for_recording(
    db: State<'_, DbConnection>,
    recording_id: String,
) -> CommandResult<Vec<EvaluationRecord>> {
    let uuid = Uuid::parse_str(&recording_id)?;
    Ok(state::list_evaluations_for_recording(&db, &uuid)?)
}

#[tauri::command]
pub fn get_evaluation(
    db: State<'_, DbConnection>,
    id: String,
) -> CommandResult<Option<EvaluationRecord>> {
    let uuid = Uuid::parse_str(&id)?;
    Ok(state::get_evaluation(&db, &uuid)?)
}
