// Apnea evaluation pipeline
// Upload -> duration check -> features -> scale -> classify -> score -> charts

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::detect::{ModelBundle, ModelError};
use crate::diagnosis::{apnea_diagnose, Diagnosis, ScoreError};
use crate::heart::{
    self, check_duration, DurationBounds, FeatureConfig, FeatureTable, HeartRateSeries,
    HeartbeatData, IngestError, DURATION_WARNING,
};
use crate::pipeline::trace::{Stage, TraceEntry, TraceWriter};
use crate::report::{self, DiagnosisChart, HeartRateChart};
use crate::samples::SampleRecording;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid upload: {0}")]
    Ingest(#[from] IngestError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Scoring error: {0}")]
    Score(#[from] ScoreError),

    #[error("Recording produced no complete minutes")]
    NoMinutes,
}

/// Where the evaluated recording came from
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvaluationSource {
    Upload { beat_count: usize, duration_hours: f64 },
    Sample { label: String, code: String },
}

/// Completed evaluation: predictions, diagnosis and chart series
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub source: EvaluationSource,
    pub model_version: String,
    pub predictions: Vec<u8>,
    pub diagnosis: Diagnosis,
    pub heart_rate_chart: HeartRateChart,
    pub diagnosis_chart: DiagnosisChart,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EvaluationOutcome {
    Completed(Evaluation),

    /// Recording length is implausible; nothing was evaluated
    Rejected { warning: String, duration_hours: f64 },
}

impl EvaluationOutcome {
    pub fn evaluation(&self) -> Option<&Evaluation> {
        match self {
            EvaluationOutcome::Completed(evaluation) => Some(evaluation),
            EvaluationOutcome::Rejected { .. } => None,
        }
    }
}

/// Runs evaluations against a shared, read-only model
#[derive(Debug, Clone)]
pub struct Evaluator {
    bundle: Arc<ModelBundle>,
    duration: DurationBounds,
    features: FeatureConfig,
}

impl Evaluator {
    pub fn new(bundle: Arc<ModelBundle>, duration: DurationBounds, features: FeatureConfig) -> Self {
        Evaluator {
            bundle,
            duration,
            features,
        }
    }

    pub fn bundle(&self) -> &ModelBundle {
        &self.bundle
    }

    /// Evaluate an uploaded single-column file of beat times in minutes
    pub fn evaluate_upload(
        &self,
        data: &[u8],
        trace: Option<&TraceWriter>,
    ) -> Result<EvaluationOutcome, PipelineError> {
        record(trace, TraceEntry::new(Stage::Ingest, 0.0, "Reading heartbeat timestamps"));
        let beats = heart::ingest_beats(data)?;
        self.evaluate_beats(&beats, trace)
    }

    /// Evaluate heartbeats that have already been parsed
    pub fn evaluate_beats(
        &self,
        beats: &HeartbeatData,
        trace: Option<&TraceWriter>,
    ) -> Result<EvaluationOutcome, PipelineError> {
        let duration_hours = beats.duration_hours();

        if !check_duration(&beats.beats_min, &self.duration) {
            log::warn!(
                "Rejected recording spanning {:.2} hours (accepted {}..{})",
                duration_hours,
                self.duration.min_hours,
                self.duration.max_hours
            );
            record(
                trace,
                TraceEntry::new(Stage::Ingest, 1.0, "Recording rejected")
                    .with_data(serde_json::json!({ "duration_hours": duration_hours })),
            );
            return Ok(EvaluationOutcome::Rejected {
                warning: DURATION_WARNING.to_string(),
                duration_hours,
            });
        }

        record(
            trace,
            TraceEntry::new(
                Stage::Ingest,
                0.1,
                format!("Read {} beats over {:.2} hours", beats.beat_count(), duration_hours),
            ),
        );

        record(trace, TraceEntry::new(Stage::Features, 0.2, "Extracting features"));
        let heart_rate = HeartRateSeries::from_beats(&beats.beats_min);
        let table = heart::extract_features(&beats.beats_min, &self.features);
        record(
            trace,
            TraceEntry::new(Stage::Features, 0.5, format!("Extracted {} minutes", table.len())),
        );

        // Feature minutes are counted from the minute of the first beat
        let origin_min = beats.beats_min.first().map_or(0.0, |t| t.floor());
        let source = EvaluationSource::Upload {
            beat_count: beats.beat_count(),
            duration_hours,
        };
        let evaluation =
            self.classify_and_score(source, &table, &heart_rate, origin_min, trace)?;
        Ok(EvaluationOutcome::Completed(evaluation))
    }

    /// Evaluate a sample with precomputed features; the duration check does not apply
    pub fn evaluate_sample(
        &self,
        sample: &SampleRecording,
        trace: Option<&TraceWriter>,
    ) -> Result<Evaluation, PipelineError> {
        record(
            trace,
            TraceEntry::new(
                Stage::Features,
                0.5,
                format!("Loaded {} precomputed minutes", sample.features.len()),
            ),
        );

        let source = EvaluationSource::Sample {
            label: sample.info.label.to_string(),
            code: sample.info.code.to_string(),
        };
        let origin_min = sample.heart_rate.t.first().map_or(0.0, |t| t.floor());
        self.classify_and_score(
            source,
            &sample.features,
            &sample.heart_rate,
            origin_min,
            trace,
        )
    }

    fn classify_and_score(
        &self,
        source: EvaluationSource,
        table: &FeatureTable,
        heart_rate: &HeartRateSeries,
        origin_min: f64,
        trace: Option<&TraceWriter>,
    ) -> Result<Evaluation, PipelineError> {
        if table.is_empty() {
            return Err(PipelineError::NoMinutes);
        }

        record(trace, TraceEntry::new(Stage::Classification, 0.6, "Classifying minutes"));
        let predictions = self.bundle.predict_minutes(table)?;
        record(
            trace,
            TraceEntry::new(Stage::Classification, 0.8, "Classified minutes").with_data(
                serde_json::json!({
                    "minutes": predictions.len(),
                    "apnea_minutes": predictions.iter().filter(|&&p| p == 1).count(),
                }),
            ),
        );

        let diagnosis = apnea_diagnose(&predictions)?;
        log::info!(
            "Diagnosis: AI max {:.1}/h, {} apnea minutes over {} minutes",
            diagnosis.ai_max,
            diagnosis.apnea_total,
            diagnosis.minute_count
        );
        record(
            trace,
            TraceEntry::new(Stage::Scoring, 1.0, "Scored recording").with_data(serde_json::json!({
                "ai_max": diagnosis.ai_max,
                "apnea_total": diagnosis.apnea_total,
                "effective_hours": diagnosis.effective_hours,
            })),
        );

        Ok(Evaluation {
            source,
            model_version: self.bundle.version.clone(),
            heart_rate_chart: report::heart_rate_chart(heart_rate, &predictions, origin_min),
            diagnosis_chart: report::diagnosis_chart(&diagnosis, &predictions),
            diagnosis,
            predictions,
        })
    }
}

fn record(trace: Option<&TraceWriter>, entry: TraceEntry) {
    if let Some(writer) = trace {
        writer.record(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::model::tests::test_bundle;
    use crate::pipeline::trace::read_trace_file;
    use crate::samples::{tests::write_sample, SampleStore};
    use tempfile::TempDir;

    fn evaluator() -> Evaluator {
        Evaluator::new(
            Arc::new(test_bundle()),
            DurationBounds::default(),
            FeatureConfig::default(),
        )
    }

    /// Beat times for `hours` of sleep at 60 bpm, with 90 bpm during `fast_hour`
    fn night_upload(hours: f64, fast_hour: Option<usize>) -> Vec<u8> {
        let mut out = String::from("0.000000\n");
        let mut t_sec = 0.0_f64;
        while t_sec < hours * 3600.0 {
            let hour = (t_sec / 3600.0) as usize;
            let rr = if Some(hour) == fast_hour { 2.0 / 3.0 } else { 1.0 };
            t_sec += rr;
            out.push_str(&format!("{:.6}\n", t_sec / 60.0));
        }
        out.into_bytes()
    }

    #[test]
    fn test_upload_evaluation() {
        let upload = night_upload(6.0, Some(3));
        let outcome = evaluator().evaluate_upload(&upload, None).unwrap();
        let evaluation = outcome.evaluation().expect("evaluation should complete");

        assert_eq!(evaluation.predictions.len(), 360);
        assert_eq!(evaluation.diagnosis.full_hours, 6);
        assert!(evaluation.diagnosis.ai_max >= 58.0);
        assert!(evaluation.diagnosis.apnea_total >= 58 && evaluation.diagnosis.apnea_total <= 62);

        let worst = evaluation
            .diagnosis
            .hourly_ai
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(h, _)| h);
        assert_eq!(worst, Some(3));
        assert_eq!(evaluation.model_version, "test-logreg");
    }

    #[test]
    fn test_apnea_spans_on_recording_clock() {
        // Starts at minute 30; heart races between minutes 210 and 270
        let mut out = String::new();
        let mut t_min = 30.0_f64;
        while t_min < 30.0 + 5.0 * 60.0 {
            out.push_str(&format!("{:.6}\n", t_min));
            let rr_sec = if (210.0..270.0).contains(&t_min) { 2.0 / 3.0 } else { 1.0 };
            t_min += rr_sec / 60.0;
        }

        let outcome = evaluator().evaluate_upload(out.as_bytes(), None).unwrap();
        let chart = &outcome.evaluation().unwrap().heart_rate_chart;

        assert!(chart.t_min[0] > 30.0 && chart.t_min[0] < 30.1);
        let longest = chart
            .apnea_spans
            .iter()
            .max_by(|a, b| a.minutes().total_cmp(&b.minutes()))
            .copied()
            .unwrap();
        assert!((longest.start_min - 210.0).abs() <= 1.0, "{:?}", longest);
        assert!((longest.end_min - 270.0).abs() <= 1.0, "{:?}", longest);
    }

    #[test]
    fn test_evaluate_beats_matches_upload() {
        let upload = night_upload(4.5, Some(1));
        let beats = heart::ingest_beats(&upload).unwrap();

        let from_beats = evaluator().evaluate_beats(&beats, None).unwrap();
        let from_bytes = evaluator().evaluate_upload(&upload, None).unwrap();
        assert_eq!(
            from_beats.evaluation().unwrap().predictions,
            from_bytes.evaluation().unwrap().predictions
        );
    }

    #[test]
    fn test_quiet_night() {
        let upload = night_upload(5.0, None);
        let outcome = evaluator().evaluate_upload(&upload, None).unwrap();
        let evaluation = outcome.evaluation().unwrap();

        assert_eq!(evaluation.diagnosis.apnea_total, 0);
        assert_eq!(evaluation.diagnosis.ai_max, 0.0);
        assert!(evaluation.heart_rate_chart.apnea_spans.is_empty());
    }

    #[test]
    fn test_short_recording_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let writer = TraceWriter::new(temp_dir.path().join("trace.jsonl"));

        let upload = night_upload(2.0, None);
        let outcome = evaluator().evaluate_upload(&upload, Some(&writer)).unwrap();

        match outcome {
            EvaluationOutcome::Rejected {
                warning,
                duration_hours,
            } => {
                assert_eq!(warning, DURATION_WARNING);
                assert!((duration_hours - 2.0).abs() < 0.01);
            }
            EvaluationOutcome::Completed(_) => panic!("short recording should be rejected"),
        }

        let entries = read_trace_file(writer.path()).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.stage == Stage::Ingest));
    }

    #[test]
    fn test_malformed_upload_is_error() {
        let err = evaluator()
            .evaluate_upload(b"0.0\nnot-a-number\n", None)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Ingest(IngestError::InvalidValue { .. })));
    }

    #[test]
    fn test_trace_covers_all_stages() {
        let temp_dir = TempDir::new().unwrap();
        let writer = TraceWriter::new(temp_dir.path().join("trace.jsonl"));

        let upload = night_upload(4.5, None);
        evaluator().evaluate_upload(&upload, Some(&writer)).unwrap();

        let entries = read_trace_file(writer.path()).unwrap();
        for stage in [Stage::Ingest, Stage::Features, Stage::Classification, Stage::Scoring] {
            assert!(entries.iter().any(|e| e.stage == stage), "missing {:?}", stage);
        }
        assert_eq!(entries.last().unwrap().progress, 1.0);
    }

    #[test]
    fn test_sample_evaluation() {
        let dir = TempDir::new().unwrap();
        write_sample(dir.path(), "c18", 450);
        let sample = SampleStore::new(dir.path().to_path_buf()).load("Sample 1").unwrap();

        let evaluation = evaluator().evaluate_sample(&sample, None).unwrap();

        // Hours 3 and 6 (index 2 and 5) run fast
        assert_eq!(evaluation.diagnosis.apnea_total, 120);
        assert_eq!(evaluation.diagnosis.ai_max, 60.0);
        assert_eq!(evaluation.diagnosis.hourly_ai[2], 60.0);
        assert!(matches!(evaluation.source, EvaluationSource::Sample { .. }));
    }
}
