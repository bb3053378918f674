// Chart series for the rendering surface
// Minute-wise evaluation chart and severity diagnosis chart

use serde::{Deserialize, Serialize};

use crate::diagnosis::Diagnosis;
use crate::heart::HeartRateSeries;

/// Contiguous run of apnea minutes, [start_min, end_min) on the recording clock
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ApneaSpan {
    pub start_min: f64,
    pub end_min: f64,
}

impl ApneaSpan {
    pub fn minutes(&self) -> f64 {
        self.end_min - self.start_min
    }
}

/// Heart rate trace with apnea minutes highlighted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartRateChart {
    /// Beat time in minutes
    pub t_min: Vec<f64>,

    /// Heart rate in beats per minute
    pub bpm: Vec<f64>,

    pub apnea_spans: Vec<ApneaSpan>,
}

/// One bar of the hourly Apnea Index chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourBar {
    pub label: String,
    pub ai: f64,

    /// True for the tail value extrapolated from minute 420 onward
    pub extrapolated: bool,
}

/// Inputs for the severity diagnosis charts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisChart {
    pub ai_max: f64,
    pub apnea_total: u32,
    pub hours: Vec<HourBar>,
    pub minute_labels: Vec<u8>,
}

/// Group consecutive apnea minutes into spans
///
/// Prediction `i` covers minute `origin_min + i` of the recording.
pub fn apnea_spans(predictions: &[u8], origin_min: f64) -> Vec<ApneaSpan> {
    let mut spans = Vec::new();
    let mut open: Option<usize> = None;
    let span = |start: usize, end: usize| ApneaSpan {
        start_min: origin_min + start as f64,
        end_min: origin_min + end as f64,
    };

    for (minute, &label) in predictions.iter().enumerate() {
        match (label == 1, open) {
            (true, None) => open = Some(minute),
            (false, Some(start)) => {
                spans.push(span(start, minute));
                open = None;
            }
            _ => {}
        }
    }

    if let Some(start) = open {
        spans.push(span(start, predictions.len()));
    }

    spans
}

/// `origin_min` is the start of the first predicted minute, on the same clock as `series.t`
pub fn heart_rate_chart(
    series: &HeartRateSeries,
    predictions: &[u8],
    origin_min: f64,
) -> HeartRateChart {
    HeartRateChart {
        t_min: series.t.clone(),
        bpm: series.bpm(),
        apnea_spans: apnea_spans(predictions, origin_min),
    }
}

pub fn diagnosis_chart(diagnosis: &Diagnosis, predictions: &[u8]) -> DiagnosisChart {
    let mut hours: Vec<HourBar> = diagnosis
        .hourly_ai
        .iter()
        .take(diagnosis.full_hours)
        .enumerate()
        .map(|(h, &ai)| HourBar {
            label: format!("Hour {}", h + 1),
            ai,
            extrapolated: false,
        })
        .collect();

    if let Some(ai) = diagnosis.tail.as_ref().and_then(|t| t.ai) {
        hours.push(HourBar {
            label: "After hour 7".to_string(),
            ai,
            extrapolated: true,
        });
    }

    DiagnosisChart {
        ai_max: diagnosis.ai_max,
        apnea_total: diagnosis.apnea_total,
        hours,
        minute_labels: predictions.to_vec(),
    }
}
