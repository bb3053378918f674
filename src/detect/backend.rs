// Detection backend abstraction
// Seams for the fitted feature scaler and the per-minute apnea classifier

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading or running a model
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model artifact not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read model artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse model artifact: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Inconsistent model artifact: {0}")]
    Inconsistent(String),

    #[error("Feature width mismatch: expected {expected}, got {found} (row {row})")]
    DimensionMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Feature selection failed: {0}")]
    Features(#[from] crate::heart::FeatureError),
}

/// Normalizes a feature matrix the way it was normalized during training
pub trait FeatureScaler {
    fn transform(&self, features: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ModelError>;
}

/// Labels each feature row 1 (apnea) or 0 (normal)
pub trait ApneaClassifier {
    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<u8>, ModelError>;
}

/// Check every row has `expected` columns
pub(crate) fn check_width(features: &[Vec<f64>], expected: usize) -> Result<(), ModelError> {
    for (row, values) in features.iter().enumerate() {
        if values.len() != expected {
            return Err(ModelError::DimensionMismatch {
                row,
                expected,
                found: values.len(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysApnea;

    impl ApneaClassifier for AlwaysApnea {
        fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<u8>, ModelError> {
            Ok(vec![1; features.len()])
        }
    }

    #[test]
    fn test_trait_object_dispatch() {
        let classifier: Box<dyn ApneaClassifier> = Box::new(AlwaysApnea);
        let labels = classifier.predict(&[vec![0.0], vec![1.0]]).unwrap();
        assert_eq!(labels, vec![1, 1]);
    }

    #[test]
    fn test_check_width() {
        assert!(check_width(&[vec![1.0, 2.0], vec![3.0, 4.0]], 2).is_ok());

        let err = check_width(&[vec![1.0, 2.0], vec![3.0]], 2).unwrap_err();
        assert!(matches!(
            err,
            ModelError::DimensionMismatch { row: 1, expected: 2, found: 1 }
        ));
    }
}
