// File system layout for uploads and evaluation traces
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to get app data directory")]
    NoAppDataDir,
}

pub type StorageResult<T> = Result<T, StorageError>;

const APP_DIR_NAME: &str = "com.apneascope.app";

/// Root of everything the app writes to disk
#[derive(Debug, Clone)]
pub struct AppPaths {
    root: PathBuf,
}

impl AppPaths {
    pub fn new(root: PathBuf) -> Self {
        AppPaths { root }
    }

    /// Platform data directory, e.g. ~/.local/share/com.apneascope.app
    pub fn from_data_dir() -> StorageResult<Self> {
        let data_dir = dirs::data_dir().ok_or(StorageError::NoAppDataDir)?;
        let root = data_dir.join(APP_DIR_NAME);
        fs::create_dir_all(&root)?;
        Ok(AppPaths { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn db_path(&self) -> PathBuf {
        self.root.join("apneascope.db")
    }

    pub fn recording_dir(&self, recording_id: &Uuid) -> StorageResult<PathBuf> {
        let dir = self.root.join("recordings").join(recording_id.to_string());
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    pub fn trace_path(&self, recording_id: &Uuid, evaluation_id: &Uuid) -> StorageResult<PathBuf> {
        let dir = self.recording_dir(recording_id)?.join("evaluations");
        fs::create_dir_all(&dir)?;
        Ok(dir.join(format!("{}.jsonl", evaluation_id)))
    }

    /// Store an uploaded file and return its path and SHA256 hash
    pub fn store_upload(&self, recording_id: &Uuid, data: &[u8]) -> StorageResult<(PathBuf, String)> {
        let path = self.recording_dir(recording_id)?.join("upload.csv");
        fs::write(&path, data)?;
        Ok((path, calculate_sha256(data)))
    }
}

/// Calculate SHA256 hash of data
pub fn calculate_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
