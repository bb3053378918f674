// Pretrained apnea model
// Standard scaler + logistic regression loaded from a JSON artifact

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::detect::backend::{check_width, ApneaClassifier, FeatureScaler, ModelError};
use crate::heart::FeatureTable;

/// Per-column standardization fitted on the training set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn width(&self) -> usize {
        self.mean.len()
    }
}

impl FeatureScaler for StandardScaler {
    fn transform(&self, features: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ModelError> {
        check_width(features, self.width())?;

        Ok(features
            .iter()
            .map(|row| {
                row.iter()
                    .zip(self.mean.iter().zip(self.scale.iter()))
                    .map(|(x, (mean, scale))| {
                        // Constant training columns are stored with a zero scale
                        let scale = if *scale == 0.0 { 1.0 } else { *scale };
                        (x - mean) / scale
                    })
                    .collect()
            })
            .collect())
    }
}

fn default_threshold() -> f64 {
    0.5
}

/// Binary logistic regression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub coef: Vec<f64>,
    pub intercept: f64,

    /// Probability at or above which a minute is labelled apnea
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

impl LogisticRegression {
    pub fn width(&self) -> usize {
        self.coef.len()
    }

    /// Apnea probability for each row
    pub fn predict_proba(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        check_width(features, self.width())?;

        Ok(features
            .iter()
            .map(|row| {
                let z: f64 = row
                    .iter()
                    .zip(self.coef.iter())
                    .map(|(x, w)| x * w)
                    .sum::<f64>()
                    + self.intercept;
                sigmoid(z)
            })
            .collect())
    }
}

impl ApneaClassifier for LogisticRegression {
    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<u8>, ModelError> {
        Ok(self
            .predict_proba(features)?
            .into_iter()
            .map(|p| (p >= self.threshold) as u8)
            .collect())
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Summary of the loaded model for display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub version: String,
    pub feature_columns: Vec<String>,
    pub threshold: f64,
}

/// Everything needed to turn a feature table into per-minute predictions
/// Built once at startup and shared read-only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBundle {
    pub version: String,

    /// Columns the model was trained on, in training order
    pub feature_columns: Vec<String>,

    pub scaler: StandardScaler,
    pub classifier: LogisticRegression,
}

impl ModelBundle {
    /// Load and validate a model artifact from disk
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        if !path.exists() {
            return Err(ModelError::NotFound(path.to_path_buf()));
        }
        let bytes = std::fs::read(path)?;
        let bundle = Self::from_json_bytes(&bytes)?;

        log::info!(
            "Loaded model {} ({} features) from {}",
            bundle.version,
            bundle.feature_columns.len(),
            path.display()
        );

        Ok(bundle)
    }

    pub fn from_json_bytes(data: &[u8]) -> Result<Self, ModelError> {
        let bundle: ModelBundle = serde_json::from_slice(data)?;
        bundle.validate()?;
        Ok(bundle)
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    fn validate(&self) -> Result<(), ModelError> {
        let width = self.feature_columns.len();
        if width == 0 {
            return Err(ModelError::Inconsistent("no feature columns".to_string()));
        }
        if self.scaler.mean.len() != width || self.scaler.scale.len() != width {
            return Err(ModelError::Inconsistent(format!(
                "scaler has {}/{} parameters for {} columns",
                self.scaler.mean.len(),
                self.scaler.scale.len(),
                width
            )));
        }
        if self.classifier.coef.len() != width {
            return Err(ModelError::Inconsistent(format!(
                "classifier has {} coefficients for {} columns",
                self.classifier.coef.len(),
                width
            )));
        }
        if !(0.0..=1.0).contains(&self.classifier.threshold) {
            return Err(ModelError::Inconsistent(format!(
                "threshold {} outside [0, 1]",
                self.classifier.threshold
            )));
        }
        Ok(())
    }

    /// Select, scale and classify every minute in the table
    pub fn predict_minutes(&self, table: &FeatureTable) -> Result<Vec<u8>, ModelError> {
        let selected = table.select(&self.feature_columns)?;
        let scaled = self.scaler.transform(&selected)?;
        self.classifier.predict(&scaled)
    }

    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            version: self.version.clone(),
            feature_columns: self.feature_columns.clone(),
            threshold: self.classifier.threshold,
        }
    }
}
