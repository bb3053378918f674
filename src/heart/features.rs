// Minute-wise heart rate variability features
// One feature row per recorded minute, fed to the apnea classifier

use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};
use std::io::Read;
use thiserror::Error;

use crate::heart::HeartRateSeries;

/// Columns produced by `extract_features`, in order
pub const FEATURE_COLUMNS: [&str; 12] = [
    "beat_count",
    "hr_mean",
    "hr_std",
    "hr_min",
    "hr_max",
    "rr_mean",
    "sdnn",
    "rmssd",
    "pnn50",
    "lf_power",
    "hf_power",
    "lf_hf_ratio",
];

/// Label and bookkeeping columns carried by precomputed feature files
pub const NON_FEATURE_COLUMNS: [&str; 3] = ["apn", "group", "file"];

const LF_BAND_HZ: (f64, f64) = (0.04, 0.15);
const HF_BAND_HZ: (f64, f64) = (0.15, 0.40);

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("Unknown feature column: {0}")]
    UnknownColumn(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid value {value:?} in row {row}, column {column}")]
    InvalidValue {
        row: usize,
        column: String,
        value: String,
    },

    #[error("Row {row} has {found} values, expected {expected}")]
    RaggedRow {
        row: usize,
        found: usize,
        expected: usize,
    },
}

/// Configuration for feature extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Width of the window used for spectral features, centred on each minute
    pub context_minutes: f64,

    /// Resampling rate for the RR tachogram in Hz
    pub resample_hz: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        FeatureConfig {
            context_minutes: 5.0,
            resample_hz: 4.0,
        }
    }
}

/// Named feature columns with one row per minute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl FeatureTable {
    pub fn new(columns: Vec<String>) -> Self {
        FeatureTable {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of one column across all rows
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row[idx]).collect())
    }

    /// Row-major matrix restricted to `columns`, in the given order
    pub fn select(&self, columns: &[String]) -> Result<Vec<Vec<f64>>, FeatureError> {
        let indices = columns
            .iter()
            .map(|name| {
                self.column_index(name)
                    .ok_or_else(|| FeatureError::UnknownColumn(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i]).collect())
            .collect())
    }

    /// Read a headered CSV feature file, dropping label/bookkeeping columns
    /// An unnamed leading index column (as written by dataframe exports) is dropped too
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, FeatureError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = csv_reader.headers()?.clone();
        let keep: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .filter(|(_, name)| !name.trim().is_empty() && !NON_FEATURE_COLUMNS.contains(name))
            .map(|(i, name)| (i, name.trim().to_string()))
            .collect();

        let mut table = FeatureTable::new(keep.iter().map(|(_, name)| name.clone()).collect());

        for (row_idx, record) in csv_reader.records().enumerate() {
            let record = record?;
            if record.len() != headers.len() {
                return Err(FeatureError::RaggedRow {
                    row: row_idx + 1,
                    found: record.len(),
                    expected: headers.len(),
                });
            }

            let mut row = Vec::with_capacity(keep.len());
            for (col_idx, name) in &keep {
                let raw = record.get(*col_idx).unwrap_or("").trim();
                let value: f64 = raw.parse().map_err(|_| FeatureError::InvalidValue {
                    row: row_idx + 1,
                    column: name.clone(),
                    value: raw.to_string(),
                })?;
                row.push(value);
            }
            table.rows.push(row);
        }

        Ok(table)
    }
}

/// Extract one feature row per recorded minute
///
/// Minutes start at floor(first beat). Minutes with fewer than two RR
/// intervals get zeros for every column except `beat_count`.
pub fn extract_features(beats_min: &[f64], config: &FeatureConfig) -> FeatureTable {
    let mut table = FeatureTable::new(FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect());

    let (first, last) = match (beats_min.first(), beats_min.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return table,
    };

    let start = first.floor();
    let minute_count = (last - start).floor().max(0.0) as usize;

    let series = HeartRateSeries::from_beats(beats_min);
    // RR intervals in milliseconds, stamped at the closing beat
    let rr_ms: Vec<f64> = series.hr.iter().map(|hr| 1000.0 / hr).collect();

    let mut planner = RealFftPlanner::<f64>::new();

    for m in 0..minute_count {
        let lo = start + m as f64;
        let hi = lo + 1.0;

        let beat_count = count_in_range(beats_min, lo, hi);
        let (rr_lo, rr_hi) = index_range(&series.t, lo, hi);
        let rr = &rr_ms[rr_lo..rr_hi];

        if rr.len() < 2 {
            let mut row = vec![0.0; FEATURE_COLUMNS.len()];
            row[0] = beat_count as f64;
            table.rows.push(row);
            continue;
        }

        let hr_bpm: Vec<f64> = rr.iter().map(|rr| 60_000.0 / rr).collect();
        let (hr_mean, hr_std) = mean_std(&hr_bpm);
        let hr_min = hr_bpm.iter().copied().fold(f64::INFINITY, f64::min);
        let hr_max = hr_bpm.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let (rr_mean, sdnn) = mean_std(rr);
        let (rmssd, pnn50) = successive_differences(rr);

        let centre = lo + 0.5;
        let half = config.context_minutes / 2.0;
        let (ctx_lo, ctx_hi) = index_range(&series.t, centre - half, centre + half);
        let (lf_power, hf_power) = spectral_power(
            &series.t[ctx_lo..ctx_hi],
            &rr_ms[ctx_lo..ctx_hi],
            config.resample_hz,
            &mut planner,
        );
        let lf_hf_ratio = if hf_power > 0.0 { lf_power / hf_power } else { 0.0 };

        table.rows.push(vec![
            beat_count as f64,
            hr_mean,
            hr_std,
            hr_min,
            hr_max,
            rr_mean,
            sdnn,
            rmssd,
            pnn50,
            lf_power,
            hf_power,
            lf_hf_ratio,
        ]);
    }

    table
}

/// Half-open index range of sorted `values` falling in [lo, hi)
fn index_range(values: &[f64], lo: f64, hi: f64) -> (usize, usize) {
    let start = values.partition_point(|&v| v < lo);
    let end = values.partition_point(|&v| v < hi);
    (start, end.max(start))
}

fn count_in_range(values: &[f64], lo: f64, hi: f64) -> usize {
    let (start, end) = index_range(values, lo, hi);
    end - start
}

/// Mean and population standard deviation
fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// RMSSD (ms) and pNN50 (fraction of successive differences above 50 ms)
fn successive_differences(rr_ms: &[f64]) -> (f64, f64) {
    if rr_ms.len() < 2 {
        return (0.0, 0.0);
    }
    let diffs: Vec<f64> = rr_ms.windows(2).map(|w| w[1] - w[0]).collect();
    let n = diffs.len() as f64;
    let rmssd = (diffs.iter().map(|d| d * d).sum::<f64>() / n).sqrt();
    let pnn50 = diffs.iter().filter(|d| d.abs() > 50.0).count() as f64 / n;
    (rmssd, pnn50)
}

/// LF and HF power (ms^2) of an RR tachogram
fn spectral_power(
    t_min: &[f64],
    rr_ms: &[f64],
    resample_hz: f64,
    planner: &mut RealFftPlanner<f64>,
) -> (f64, f64) {
    if t_min.len() < 4 || resample_hz <= 0.0 {
        return (0.0, 0.0);
    }

    let t_sec: Vec<f64> = t_min.iter().map(|t| t * 60.0).collect();
    let mut resampled = resample_linear(&t_sec, rr_ms, resample_hz);
    let n = resampled.len();
    if n < 8 {
        return (0.0, 0.0);
    }

    let mean = resampled.iter().sum::<f64>() / n as f64;
    for v in resampled.iter_mut() {
        *v -= mean;
    }
    apply_hann_window(&mut resampled);

    let fft = planner.plan_fft_forward(n);
    let mut spectrum = fft.make_output_vec();
    if fft.process(&mut resampled, &mut spectrum).is_err() {
        log::warn!("FFT failed on a {}-sample tachogram", n);
        return (0.0, 0.0);
    }

    // One-sided periodogram integrated over each band
    let df = resample_hz / n as f64;
    let scale = 2.0 / (resample_hz * n as f64);
    let mut lf = 0.0;
    let mut hf = 0.0;
    for (k, c) in spectrum.iter().enumerate() {
        let f = k as f64 * df;
        let power = c.norm_sqr() * scale * df;
        if f >= LF_BAND_HZ.0 && f < LF_BAND_HZ.1 {
            lf += power;
        } else if f >= HF_BAND_HZ.0 && f < HF_BAND_HZ.1 {
            hf += power;
        }
    }

    (lf, hf)
}

/// Linear interpolation of (t, y) onto a uniform grid starting at t[0]
fn resample_linear(t: &[f64], y: &[f64], rate_hz: f64) -> Vec<f64> {
    let span = t[t.len() - 1] - t[0];
    let n = (span * rate_hz).floor() as usize + 1;
    let mut out = Vec::with_capacity(n);
    let mut j = 0;

    for i in 0..n {
        let x = t[0] + i as f64 / rate_hz;
        while j + 1 < t.len() - 1 && t[j + 1] <= x {
            j += 1;
        }
        let (x0, x1) = (t[j], t[j + 1]);
        let frac = if x1 > x0 { ((x - x0) / (x1 - x0)).clamp(0.0, 1.0) } else { 0.0 };
        out.push(y[j] + frac * (y[j + 1] - y[j]));
    }

    out
}

fn apply_hann_window(samples: &mut [f64]) {
    let n = samples.len();
    if n == 0 {
        return;
    }
    for (i, s) in samples.iter_mut().enumerate() {
        *s *= 0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / n as f64).cos());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Beats at a fixed rate, with RR modulated by a sine at `mod_hz`
    fn synthetic_beats(minutes: f64, bpm: f64, mod_hz: f64, depth_s: f64) -> Vec<f64> {
        let mut beats = vec![0.0];
        let base_rr = 60.0 / bpm;
        let mut t_sec = 0.0;
        while t_sec < minutes * 60.0 {
            let rr = base_rr + depth_s * (2.0 * std::f64::consts::PI * mod_hz * t_sec).sin();
            t_sec += rr;
            beats.push(t_sec / 60.0);
        }
        beats
    }

    #[test]
    fn test_one_row_per_minute() {
        let beats = synthetic_beats(10.0, 60.0, 0.0, 0.0);
        let table = extract_features(&beats, &FeatureConfig::default());

        assert_eq!(table.columns.len(), FEATURE_COLUMNS.len());
        assert_eq!(table.len(), 10);
    }

    #[test]
    fn test_steady_rhythm_statistics() {
        let beats = synthetic_beats(6.0, 60.0, 0.0, 0.0);
        let table = extract_features(&beats, &FeatureConfig::default());

        let hr_mean = table.column("hr_mean").unwrap();
        let sdnn = table.column("sdnn").unwrap();
        let rr_mean = table.column("rr_mean").unwrap();

        assert!((hr_mean[2] - 60.0).abs() < 1e-6);
        assert!(sdnn[2] < 1e-6);
        assert!((rr_mean[2] - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn test_sparse_minute_zeroed() {
        // Gap between minute 1 and minute 3 leaves minute 2 without beats
        let mut beats: Vec<f64> = (0..120).map(|i| i as f64 / 60.0).collect();
        beats.extend((180..300).map(|i| i as f64 / 60.0));

        let table = extract_features(&beats, &FeatureConfig::default());
        assert_eq!(table.len(), 4);
        assert!(table.rows[2].iter().all(|&v| v == 0.0));
        assert!(table.rows[1][1] > 0.0);
    }

    #[test]
    fn test_respiratory_modulation_lands_in_hf() {
        // 0.25 Hz is a typical breathing rate and sits in the HF band
        let beats = synthetic_beats(8.0, 60.0, 0.25, 0.05);
        let table = extract_features(&beats, &FeatureConfig::default());

        let lf = table.column("lf_power").unwrap();
        let hf = table.column("hf_power").unwrap();
        assert!(hf[4] > lf[4]);
    }

    #[test]
    fn test_select_orders_columns() {
        let mut table = FeatureTable::new(vec!["a".into(), "b".into(), "c".into()]);
        table.rows.push(vec![1.0, 2.0, 3.0]);

        let matrix = table.select(&["c".to_string(), "a".to_string()]).unwrap();
        assert_eq!(matrix, vec![vec![3.0, 1.0]]);
    }

    #[test]
    fn test_select_unknown_column() {
        let table = FeatureTable::new(vec!["a".into()]);
        let err = table.select(&["missing".to_string()]).unwrap_err();
        assert!(matches!(err, FeatureError::UnknownColumn(ref c) if c == "missing"));
    }

    #[test]
    fn test_from_csv_drops_label_columns() {
        let csv = ",hr_mean,sdnn,apn,group,file\n0,61.0,20.5,0,a,a01\n1,75.0,40.0,1,a,a01\n";
        let table = FeatureTable::from_csv_reader(csv.as_bytes()).unwrap();

        assert_eq!(table.columns, vec!["hr_mean", "sdnn"]);
        assert_eq!(table.rows, vec![vec![61.0, 20.5], vec![75.0, 40.0]]);
    }

    #[test]
    fn test_from_csv_rejects_text_value() {
        let csv = "hr_mean\nfast\n";
        let err = FeatureTable::from_csv_reader(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, FeatureError::InvalidValue { row: 1, .. }));
    }

    #[test]
    fn test_empty_input() {
        let table = extract_features(&[], &FeatureConfig::default());
        assert!(table.is_empty());
    }
}
