// Apnea detection module
// Feature scaling and per-minute classification with a pretrained model

pub mod backend;
pub mod model;

pub use backend::{ApneaClassifier, FeatureScaler, ModelError};
pub use model::{LogisticRegression, ModelBundle, ModelInfo, StandardScaler};
