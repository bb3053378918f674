// Apnea severity scoring
// Turns per-minute apnea predictions into total apnea minutes and hourly Apnea Index

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minutes in one hourly bucket
pub const MINUTES_PER_HOUR: usize = 60;

/// Fixed start of the tail segment (a typical night is taken to be 7 hours)
pub const TAIL_OFFSET_MINUTES: usize = 420;

/// Minimum tail length for the tail to be extrapolated into an extra hour
pub const MIN_TAIL_MINUTES: usize = 30;

#[derive(Debug, Error, PartialEq)]
pub enum ScoreError {
    #[error("Invalid prediction {value} at minute {index}: expected 0 or 1")]
    InvalidInput { index: usize, value: u8 },
}

/// Trailing segment starting at minute 420
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TailSegment {
    /// Number of minutes in the tail slice
    pub minutes: usize,

    /// Apnea minutes within the tail slice
    pub apnea_minutes: u32,

    /// Hour-equivalent rate, present only when the tail is long enough
    pub ai: Option<f64>,
}

/// Result of scoring one prediction sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    /// Highest hourly Apnea Index (0.0 when no hour could be rated)
    pub ai_max: f64,

    /// Apnea minutes across the whole recording
    pub apnea_total: u32,

    /// AI value per full hour, followed by the tail value when it applies
    pub hourly_ai: Vec<f64>,

    /// floor(minutes / 60)
    pub full_hours: usize,

    /// Full hours plus one if the tail was rated
    pub effective_hours: usize,

    /// Tail segment details (None when the recording ends before minute 420)
    pub tail: Option<TailSegment>,

    /// Length of the prediction sequence
    pub minute_count: usize,
}

impl Diagnosis {
    /// Number of AI values the maximum was taken over
    pub fn rated_hours(&self) -> usize {
        self.hourly_ai.len()
    }

    /// False when the recording was too short to produce any AI value
    pub fn is_rated(&self) -> bool {
        !self.hourly_ai.is_empty()
    }
}

/// Total apnea minutes
pub fn apnea_total(predictions: &[u8]) -> u32 {
    predictions.iter().map(|&p| p as u32).sum()
}

/// Score a per-minute prediction sequence
///
/// Full hours are rated by their apnea count. Minutes from index 420 onward
/// form one extra bucket when there are at least 30 of them, rated as
/// `sum * 60 / len`. A sequence too short to rate any hour yields `ai_max` 0.
pub fn apnea_diagnose(predictions: &[u8]) -> Result<Diagnosis, ScoreError> {
    validate_predictions(predictions)?;

    let total = apnea_total(predictions);

    let full_hours = predictions.len() / MINUTES_PER_HOUR;
    let mut hourly_ai: Vec<f64> = predictions[..full_hours * MINUTES_PER_HOUR]
        .chunks_exact(MINUTES_PER_HOUR)
        .map(|hour| apnea_total_f64(hour))
        .collect();
    let mut effective_hours = full_hours;

    let tail = predictions.get(TAIL_OFFSET_MINUTES..).and_then(|slice| {
        if slice.is_empty() {
            return None;
        }
        let apnea_minutes = apnea_total(slice);
        let ai = if slice.len() >= MIN_TAIL_MINUTES {
            Some(apnea_minutes as f64 * MINUTES_PER_HOUR as f64 / slice.len() as f64)
        } else {
            None
        };
        Some(TailSegment {
            minutes: slice.len(),
            apnea_minutes,
            ai,
        })
    });

    if let Some(ai) = tail.as_ref().and_then(|t| t.ai) {
        hourly_ai.push(ai);
        effective_hours += 1;
    }

    let ai_max = hourly_ai.iter().copied().fold(0.0_f64, f64::max);

    if hourly_ai.is_empty() {
        log::debug!(
            "Recording of {} minutes is too short to rate any hour",
            predictions.len()
        );
    }

    Ok(Diagnosis {
        ai_max,
        apnea_total: total,
        hourly_ai,
        full_hours,
        effective_hours,
        tail,
        minute_count: predictions.len(),
    })
}

fn apnea_total_f64(predictions: &[u8]) -> f64 {
    apnea_total(predictions) as f64
}

fn validate_predictions(predictions: &[u8]) -> Result<(), ScoreError> {
    match predictions.iter().position(|&p| p > 1) {
        Some(index) => Err(ScoreError::InvalidInput {
            index,
            value: predictions[index],
        }),
        None => Ok(()),
    }
}
