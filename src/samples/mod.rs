// Built-in sample recordings
// Precomputed minute features plus the heart rate series used for plotting

use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::heart::{FeatureError, FeatureTable, HeartRateSeries};

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("Unknown sample: {0}")]
    UnknownSample(String),

    #[error("Failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid feature file: {0}")]
    Features(#[from] FeatureError),

    #[error("Invalid heart rate file: {0}")]
    HeartRate(#[from] serde_json::Error),

    #[error("Heart rate file has {t} timestamps but {hr} values")]
    LengthMismatch { t: usize, hr: usize },
}

/// Entry in the sample catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SampleInfo {
    /// Name shown to the user
    pub label: &'static str,

    /// Recording code used for file names
    pub code: &'static str,
}

pub const SAMPLE_CATALOG: [SampleInfo; 3] = [
    SampleInfo {
        label: "Sample 1",
        code: "c18",
    },
    SampleInfo {
        label: "Sample 2",
        code: "b09",
    },
    SampleInfo {
        label: "Sample 3",
        code: "a12",
    },
];

/// Look a sample up by label ("Sample 2") or code ("b09")
pub fn find_sample(name: &str) -> Option<SampleInfo> {
    SAMPLE_CATALOG
        .iter()
        .find(|s| s.label.eq_ignore_ascii_case(name) || s.code.eq_ignore_ascii_case(name))
        .copied()
}

/// A loaded sample recording
#[derive(Debug, Clone)]
pub struct SampleRecording {
    pub info: SampleInfo,
    pub features: FeatureTable,
    pub heart_rate: HeartRateSeries,
}

/// Reads samples laid out as `features/<code>.csv` and `hr_data/<code>.json`
#[derive(Debug, Clone)]
pub struct SampleStore {
    root: PathBuf,
}

impl SampleStore {
    pub fn new(root: PathBuf) -> Self {
        SampleStore { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn features_path(&self, code: &str) -> PathBuf {
        self.root.join("features").join(format!("{}.csv", code))
    }

    pub fn heart_rate_path(&self, code: &str) -> PathBuf {
        self.root.join("hr_data").join(format!("{}.json", code))
    }

    /// Catalog entries whose files are present on disk
    pub fn available(&self) -> Vec<SampleInfo> {
        SAMPLE_CATALOG
            .iter()
            .filter(|s| self.features_path(s.code).exists() && self.heart_rate_path(s.code).exists())
            .copied()
            .collect()
    }

    pub fn load(&self, name: &str) -> Result<SampleRecording, SampleError> {
        let info = find_sample(name).ok_or_else(|| SampleError::UnknownSample(name.to_string()))?;

        let features_path = self.features_path(info.code);
        let features_file = open(&features_path)?;
        let features = FeatureTable::from_csv_reader(features_file)?;

        let hr_path = self.heart_rate_path(info.code);
        let hr_file = open(&hr_path)?;
        let heart_rate: HeartRateSeries = serde_json::from_reader(std::io::BufReader::new(hr_file))?;
        if heart_rate.t.len() != heart_rate.hr.len() {
            return Err(SampleError::LengthMismatch {
                t: heart_rate.t.len(),
                hr: heart_rate.hr.len(),
            });
        }

        log::info!(
            "Loaded {} ({}): {} minutes, {} heart rate samples",
            info.label,
            info.code,
            features.len(),
            heart_rate.len()
        );

        Ok(SampleRecording {
            info,
            features,
            heart_rate,
        })
    }
}

fn open(path: &Path) -> Result<File, SampleError> {
    File::open(path).map_err(|source| SampleError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    pub(crate) fn write_sample(root: &Path, code: &str, minutes: usize) {
        fs::create_dir_all(root.join("features")).unwrap();
        fs::create_dir_all(root.join("hr_data")).unwrap();

        let mut csv = String::from(",hr_mean,sdnn,apn,group,file\n");
        for m in 0..minutes {
            // Every third hour runs fast
            let hr = if (m / 60) % 3 == 2 { 90.0 } else { 60.0 };
            csv.push_str(&format!("{},{},40.0,0,x,{}\n", m, hr, code));
        }
        fs::write(root.join("features").join(format!("{}.csv", code)), csv).unwrap();

        let t: Vec<f64> = (1..=minutes).map(|m| m as f64).collect();
        let hr: Vec<f64> = vec![1.0; minutes];
        let json = serde_json::json!({ "t": t, "hr": hr });
        fs::write(
            root.join("hr_data").join(format!("{}.json", code)),
            serde_json::to_vec(&json).unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn test_find_sample() {
        assert_eq!(find_sample("Sample 1").unwrap().code, "c18");
        assert_eq!(find_sample("b09").unwrap().label, "Sample 2");
        assert!(find_sample("Select one").is_none());
    }

    #[test]
    fn test_load_sample() {
        let dir = TempDir::new().unwrap();
        write_sample(dir.path(), "a12", 120);

        let store = SampleStore::new(dir.path().to_path_buf());
        let sample = store.load("Sample 3").unwrap();

        assert_eq!(sample.features.columns, vec!["hr_mean", "sdnn"]);
        assert_eq!(sample.features.len(), 120);
        assert_eq!(sample.heart_rate.len(), 120);
        assert_eq!(store.available(), vec![SAMPLE_CATALOG[2]]);
    }

    #[test]
    fn test_missing_files() {
        let dir = TempDir::new().unwrap();
        let store = SampleStore::new(dir.path().to_path_buf());

        assert!(matches!(store.load("c18"), Err(SampleError::Io { .. })));
        assert!(matches!(store.load("z99"), Err(SampleError::UnknownSample(_))));
        assert!(store.available().is_empty());
    }
}
