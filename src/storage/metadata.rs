use super::{FileMeta, StorageError, META_SUFFIX};
use std::path::{Path, PathBuf};
use tokio::fs;

/// JSON sidecar records, stored at `{root}/{tag}/{file_id}.meta.json`.
pub struct MetadataStore {
    root: PathBuf,
}

impl MetadataStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn meta_path(&self, tag: &str, file_id: &str) -> PathBuf {
        self.root.join(tag).join(format!("{}{}", file_id, META_SUFFIX))
    }

    /// Write the full record, replacing any previous one.
    pub async fn save(&self, meta: &FileMeta) -> Result<(), StorageError> {
        let path = self.meta_path(&meta.tag, &meta.file_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(meta)?;
        fs::write(&path, json).await?;
        Ok(())
    }

    pub async fn load(&self, tag: &str, file_id: &str) -> Result<FileMeta, StorageError> {
        read_meta_file(&self.meta_path(tag, file_id), file_id).await
    }

    pub async fn exists(&self, tag: &str, file_id: &str) -> Result<bool, StorageError> {
        Ok(fs::try_exists(self.meta_path(tag, file_id)).await?)
    }

    /// Remove a record. Missing records are not an error.
    pub async fn delete(&self, tag: &str, file_id: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.meta_path(tag, file_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Read and parse one sidecar file. Absent files are `NotFound`, unparseable
/// ones are `Corrupt`.
pub(crate) async fn read_meta_file(path: &Path, what: &str) -> Result<FileMeta, StorageError> {
    let data = fs::read(path)
        .await
        .map_err(|e| super::not_found_or_io(e, what))?;
    serde_json::from_slice(&data)
        .map_err(|e| StorageError::Corrupt(what.to_string(), e.to_string()))
}
