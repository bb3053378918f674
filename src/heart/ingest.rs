// Heartbeat ingestion module
// Parses uploaded beat timestamps, checks recording length, derives heart rate

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Upload is not valid UTF-8 text")]
    NotText(#[from] std::str::Utf8Error),

    #[error("Invalid value on line {line}: {value:?}")]
    InvalidValue { line: usize, value: String },

    #[error("Expected a single column on line {line}, found {columns}")]
    TooManyColumns { line: usize, columns: usize },

    #[error("Timestamps must be strictly increasing (line {line})")]
    NotIncreasing { line: usize },

    #[error("At least two heartbeats are required, found {0}")]
    TooFewBeats(usize),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Accepted recording length in hours
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DurationBounds {
    pub min_hours: f64,
    pub max_hours: f64,
}

impl Default for DurationBounds {
    fn default() -> Self {
        DurationBounds {
            min_hours: 4.0,
            max_hours: 12.0,
        }
    }
}

/// Warning shown when a recording fails the duration check
pub const DURATION_WARNING: &str = "A typical recording of heart rate should be around 8 hours. \
Please make sure the heart rate data is in minutes.";

#[derive(Debug, Clone)]
pub struct HeartbeatData {
    /// Beat times in minutes, strictly increasing
    pub beats_min: Vec<f64>,
}

impl HeartbeatData {
    pub fn beat_count(&self) -> usize {
        self.beats_min.len()
    }

    /// Time between first and last beat in minutes
    pub fn span_minutes(&self) -> f64 {
        match (self.beats_min.first(), self.beats_min.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }

    pub fn duration_hours(&self) -> f64 {
        self.span_minutes() / 60.0
    }
}

/// Heart rate sampled at each beat after the first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartRateSeries {
    /// Beat time in minutes
    pub t: Vec<f64>,

    /// Instantaneous heart rate in beats per second
    pub hr: Vec<f64>,
}

impl HeartRateSeries {
    /// hr[i] = 1 / (seconds between beat i and beat i+1), stamped at beat i+1
    pub fn from_beats(beats_min: &[f64]) -> Self {
        let hr = beats_min
            .windows(2)
            .map(|pair| 1.0 / ((pair[1] - pair[0]) * 60.0))
            .collect();
        let t = beats_min.iter().skip(1).copied().collect();

        HeartRateSeries { t, hr }
    }

    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    /// Heart rate in beats per minute
    pub fn bpm(&self) -> Vec<f64> {
        self.hr.iter().map(|hr| hr * 60.0).collect()
    }
}

/// Parse a single-column file of beat timestamps in minutes
pub fn ingest_beats(data: &[u8]) -> Result<HeartbeatData, IngestError> {
    let text = std::str::from_utf8(data)?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut beats_min: Vec<f64> = Vec::new();

    for result in reader.records() {
        let record = result?;
        let line = record.position().map(|p| p.line() as usize).unwrap_or(0);

        // A trailing delimiter leaves an empty second field
        let fields: Vec<&str> = record.iter().filter(|f| !f.is_empty()).collect();
        match fields.len() {
            0 => continue,
            1 => {}
            columns => return Err(IngestError::TooManyColumns { line, columns }),
        }

        let value: f64 = fields[0].parse().map_err(|_| IngestError::InvalidValue {
            line,
            value: fields[0].to_string(),
        })?;
        if !value.is_finite() {
            return Err(IngestError::InvalidValue {
                line,
                value: fields[0].to_string(),
            });
        }

        if let Some(&prev) = beats_min.last() {
            if value <= prev {
                return Err(IngestError::NotIncreasing { line });
            }
        }
        beats_min.push(value);
    }

    if beats_min.len() < 2 {
        return Err(IngestError::TooFewBeats(beats_min.len()));
    }

    log::debug!(
        "Ingested {} beats spanning {:.1} minutes",
        beats_min.len(),
        beats_min[beats_min.len() - 1] - beats_min[0]
    );

    Ok(HeartbeatData { beats_min })
}

/// True when the recording spans a plausible night of sleep
/// Never fails: an empty input simply does not pass
pub fn check_duration(beats_min: &[f64], bounds: &DurationBounds) -> bool {
    let (first, last) = match (beats_min.first(), beats_min.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return false,
    };

    let duration = (last - first) / 60.0;
    duration >= bounds.min_hours && duration <= bounds.max_hours
}
