// Database CRUD operations
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Row};
use uuid::Uuid;

use super::db::{DbConnection, DbResult};
use super::models::{
    decode_predictions, encode_predictions, EvaluationRecord, EvaluationStatus, NewEvaluation,
    Recording, RecordingSummary,
};

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

#[derive(Debug, thiserror::Error)]
#[error("unrecognised value {0:?}")]
struct BadValue(String);

// ==================== RECORDING QUERIES ====================

/// Create a new recording
pub fn create_recording(
    db: &DbConnection,
    id: Uuid,
    name: String,
    source_path: String,
    source_sha256: String,
    beat_count: i64,
    duration_min: f64,
) -> DbResult<Recording> {
    let recording = Recording {
        id,
        created_at: Utc::now(),
        name,
        source_path,
        source_sha256,
        beat_count,
        duration_min,
    };

    let conn = db.lock();
    conn.execute(
        "INSERT INTO recordings (id, created_at, name, source_path, source_sha256, beat_count, duration_min)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            recording.id.to_string(),
            recording.created_at.to_rfc3339(),
            recording.name,
            recording.source_path,
            recording.source_sha256,
            recording.beat_count,
            recording.duration_min,
        ],
    )?;

    Ok(recording)
}

/// Get a recording by ID
pub fn get_recording(db: &DbConnection, id: &Uuid) -> DbResult<Option<Recording>> {
    let conn = db.lock();
    let mut stmt = conn.prepare(
        "SELECT id, created_at, name, source_path, source_sha256, beat_count, duration_min
         FROM recordings WHERE id = ?1",
    )?;

    let result = stmt.query_row([id.to_string()], |row| {
        Ok(Recording {
            id: uuid_at(row, 0)?,
            created_at: timestamp_at(row, 1)?,
            name: row.get(2)?,
            source_path: row.get(3)?,
            source_sha256: row.get(4)?,
            beat_count: row.get(5)?,
            duration_min: row.get(6)?,
        })
    });

    match result {
        Ok(recording) => Ok(Some(recording)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// List all recordings with evaluation counts, newest first
pub fn list_recordings(db: &DbConnection) -> DbResult<Vec<RecordingSummary>> {
    let conn = db.lock();
    let mut stmt = conn.prepare(
        "SELECT r.id, r.name, r.created_at, r.duration_min,
                COUNT(e.id) as evaluation_count
         FROM recordings r
         LEFT JOIN evaluations e ON e.recording_id = r.id
         GROUP BY r.id
         ORDER BY r.created_at DESC",
    )?;

    let recordings = stmt
        .query_map([], |row| {
            Ok(RecordingSummary {
                id: uuid_at(row, 0)?,
                name: row.get(1)?,
                created_at: timestamp_at(row, 2)?,
                duration_min: row.get(3)?,
                evaluation_count: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(recordings)
}

// ==================== EVALUATION QUERIES ====================

fn evaluation_from_row(row: &Row<'_>) -> rusqlite::Result<EvaluationRecord> {
    let status_raw: String = row.get(4)?;
    let status = EvaluationStatus::parse(&status_raw)
        .ok_or_else(|| conversion_error(4, BadValue(status_raw.clone())))?;

    let predictions_raw: String = row.get(8)?;
    let predictions = decode_predictions(&predictions_raw)
        .ok_or_else(|| conversion_error(8, BadValue(predictions_raw.clone())))?;

    Ok(EvaluationRecord {
        id: uuid_at(row, 0)?,
        recording_id: uuid_at(row, 1)?,
        created_at: timestamp_at(row, 2)?,
        model_version: row.get(3)?,
        status,
        ai_max: row.get(5)?,
        apnea_total: row.get(6)?,
        minute_count: row.get(7)?,
        predictions,
    })
}

/// Store a new evaluation under an existing recording
pub fn create_evaluation(
    db: &DbConnection,
    id: Uuid,
    new: NewEvaluation,
) -> DbResult<EvaluationRecord> {
    let evaluation = EvaluationRecord {
        id,
        recording_id: new.recording_id,
        created_at: Utc::now(),
        model_version: new.model_version,
        status: new.status,
        ai_max: new.ai_max,
        apnea_total: new.apnea_total,
        minute_count: new.predictions.len() as i64,
        predictions: new.predictions,
    };

    let conn = db.lock();
    conn.execute(
        "INSERT INTO evaluations (id, recording_id, created_at, model_version, status,
                                  ai_max, apnea_total, minute_count, predictions)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            evaluation.id.to_string(),
            evaluation.recording_id.to_string(),
            evaluation.created_at.to_rfc3339(),
            evaluation.model_version,
            evaluation.status.as_str(),
            evaluation.ai_max,
            evaluation.apnea_total,
            evaluation.minute_count,
            encode_predictions(&evaluation.predictions),
        ],
    )?;

    Ok(evaluation)
}

/// Get an evaluation by ID
pub fn get_evaluation(db: &DbConnection, id: &Uuid) -> DbResult<Option<EvaluationRecord>> {
    let conn = db.lock();
    let mut stmt = conn.prepare(
        "SELECT id, recording_id, created_at, model_version, status,
                ai_max, apnea_total, minute_count, predictions
         FROM evaluations WHERE id = ?1",
    )?;

    match stmt.query_row([id.to_string()], evaluation_from_row) {
        Ok(evaluation) => Ok(Some(evaluation)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// List evaluations for a recording, newest first
pub fn list_evaluations_for_recording(
    db: &DbConnection,
    recording_id: &Uuid,
) -> DbResult<Vec<EvaluationRecord>> {
    let conn = db.lock();
    let mut stmt = conn.prepare(
        "SELECT id, recording_id, created_at, model_version, status,
                ai_max, apnea_total, minute_count, predictions
         FROM evaluations WHERE recording_id = ?1
         ORDER BY created_at DESC",
    )?;

    let evaluations = stmt
        .query_map([recording_id.to_string()], evaluation_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(evaluations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::db::init_in_memory;

    fn sample_recording(db: &DbConnection, name: &str) -> Recording {
        create_recording(
            db,
            Uuid::new_v4(),
            name.to_string(),
            format!("/tmp/{}/upload.csv", name),
            "abc123".to_string(),
            28_800,
            480.0,
        )
        .unwrap()
    }

    fn completed(recording_id: Uuid, predictions: Vec<u8>) -> NewEvaluation {
        NewEvaluation {
            recording_id,
            model_version: "logreg-v1".to_string(),
            status: EvaluationStatus::Completed,
            ai_max: Some(12.0),
            apnea_total: Some(predictions.iter().map(|&p| p as i64).sum()),
            predictions,
        }
    }

    #[test]
    fn test_recording_round_trip() {
        let db = init_in_memory().unwrap();
        let recording = sample_recording(&db, "night-1");

        let fetched = get_recording(&db, &recording.id).unwrap().unwrap();
        assert_eq!(fetched.name, "night-1");
        assert_eq!(fetched.beat_count, 28_800);
        assert_eq!(fetched.duration_min, 480.0);
        assert_eq!(fetched.created_at, recording.created_at);

        assert!(get_recording(&db, &Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_list_recordings_counts_evaluations() {
        let db = init_in_memory().unwrap();
        let a = sample_recording(&db, "a");
        let b = sample_recording(&db, "b");

        create_evaluation(&db, Uuid::new_v4(), completed(a.id, vec![0, 1])).unwrap();
        create_evaluation(&db, Uuid::new_v4(), completed(a.id, vec![1, 1])).unwrap();

        let summaries = list_recordings(&db).unwrap();
        assert_eq!(summaries.len(), 2);
        let count_for = |id: Uuid| {
            summaries
                .iter()
                .find(|s| s.id == id)
                .map(|s| s.evaluation_count)
                .unwrap()
        };
        assert_eq!(count_for(a.id), 2);
        assert_eq!(count_for(b.id), 0);
    }

    #[test]
    fn test_evaluation_round_trip() {
        let db = init_in_memory().unwrap();
        let recording = sample_recording(&db, "night");
        let id = Uuid::new_v4();

        let stored = create_evaluation(&db, id, completed(recording.id, vec![0, 1, 1, 0])).unwrap();
        assert_eq!(stored.minute_count, 4);

        let fetched = get_evaluation(&db, &id).unwrap().unwrap();
        assert_eq!(fetched.predictions, vec![0, 1, 1, 0]);
        assert_eq!(fetched.apnea_total, Some(2));
        assert_eq!(fetched.status, EvaluationStatus::Completed);

        let listed = list_evaluations_for_recording(&db, &recording.id).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
    }

    #[test]
    fn test_rejected_evaluation_has_no_scores() {
        let db = init_in_memory().unwrap();
        let recording = sample_recording(&db, "short");
        let id = Uuid::new_v4();

        create_evaluation(
            &db,
            id,
            NewEvaluation {
                recording_id: recording.id,
                model_version: "logreg-v1".to_string(),
                status: EvaluationStatus::Rejected,
                ai_max: None,
                apnea_total: None,
                predictions: Vec::new(),
            },
        )
        .unwrap();

        let fetched = get_evaluation(&db, &id).unwrap().unwrap();
        assert_eq!(fetched.status, EvaluationStatus::Rejected);
        assert!(fetched.ai_max.is_none());
        assert_eq!(fetched.minute_count, 0);
    }

    #[test]
    fn test_evaluation_requires_recording() {
        let db = init_in_memory().unwrap();
        let result = create_evaluation(&db, Uuid::new_v4(), completed(Uuid::new_v4(), vec![0]));
        assert!(result.is_err());
    }
}
