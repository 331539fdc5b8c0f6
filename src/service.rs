//! File record service: the only writer of blobs and metadata records.
//!
//! Blob and metadata live in separate files and are never written
//! atomically as a pair. Upload writes the blob first and compensates with a
//! blob delete if the metadata write fails; delete removes the blob first
//! and treats a failed metadata delete as a logged, tolerated orphan.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::storage::naming::{self, check_extension, is_safe_file_id, is_valid_tag};
use crate::storage::sniff::{detect_content_type, FALLBACK_CONTENT_TYPE};
use crate::storage::{
    BlobStore, ByteStream, Catalog, FileMeta, FilesystemCatalog, MetadataStore, ScanFilter,
    StorageError, StorageStats,
};

/// Fresh identifiers tried before accepting a taken one.
const MAX_ID_ATTEMPTS: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error("invalid tag: {0}")]
    InvalidNamespace(String),
    #[error("file size exceeds maximum limit of {max} bytes")]
    FileTooLarge { max: u64 },
    #[error("file is empty")]
    EmptyFile,
    #[error("file extension '{0}' is not allowed")]
    ExtensionNotAllowed(String),
    #[error("file not found")]
    NotFound,
    #[error("corrupt metadata: {0}")]
    CorruptMetadata(String),
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
}

impl FileError {
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidNamespace(_)
                | Self::FileTooLarge { .. }
                | Self::EmptyFile
                | Self::ExtensionNotAllowed(_)
        )
    }

    fn from_lookup(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(_) => Self::NotFound,
            StorageError::Corrupt(id, cause) => Self::CorruptMetadata(format!("{}: {}", id, cause)),
            other => Self::Storage(other),
        }
    }
}

/// The slice of configuration the storage core depends on.
#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub root: PathBuf,
    pub max_file_size: u64,
    pub allowed_extensions: Vec<String>,
    pub base_url: String,
}

pub struct UploadRequest {
    pub tag: String,
    pub filename: String,
    pub size_hint: i64,
    pub public: bool,
    pub uploaded_by: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadResult {
    pub file_id: String,
    pub original_name: String,
    pub url: String,
    pub tag: String,
    pub size: u64,
    pub content_type: String,
    pub public: bool,
    pub uploaded_at: DateTime<Utc>,
    pub uploaded_by: String,
}

#[derive(Debug, Clone)]
pub struct ListQuery {
    pub filter: ScanFilter,
    pub page: usize,
    pub page_size: usize,
    pub descending: bool,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            filter: ScanFilter::default(),
            page: 1,
            page_size: 50,
            descending: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ListPage {
    pub files: Vec<FileMeta>,
    pub total: usize,
}

pub struct FileService {
    settings: StorageSettings,
    blobs: BlobStore,
    metadata: MetadataStore,
    catalog: Arc<dyn Catalog>,
}

impl FileService {
    pub async fn new(settings: StorageSettings) -> Result<Self, StorageError> {
        let catalog = Arc::new(FilesystemCatalog::new(settings.root.clone()));
        Self::with_catalog(settings, catalog).await
    }

    pub async fn with_catalog(
        settings: StorageSettings,
        catalog: Arc<dyn Catalog>,
    ) -> Result<Self, StorageError> {
        tokio::fs::create_dir_all(&settings.root).await?;
        Ok(Self {
            blobs: BlobStore::new(settings.root.clone()),
            metadata: MetadataStore::new(settings.root.clone()),
            catalog,
            settings,
        })
    }

    pub fn settings(&self) -> &StorageSettings {
        &self.settings
    }

    /// Public URL of a stored file.
    pub fn file_url(&self, tag: &str, file_id: &str) -> String {
        format!(
            "{}/{}/{}",
            self.settings.base_url.trim_end_matches('/'),
            tag,
            file_id
        )
    }

    fn validate_upload(&self, req: &UploadRequest) -> Result<(), FileError> {
        if !is_valid_tag(&req.tag) {
            return Err(FileError::InvalidNamespace(req.tag.clone()));
        }
        if req.size_hint <= 0 {
            return Err(FileError::EmptyFile);
        }
        if req.size_hint as u64 > self.settings.max_file_size {
            return Err(FileError::FileTooLarge {
                max: self.settings.max_file_size,
            });
        }
        check_extension(&req.filename, &self.settings.allowed_extensions)
            .map_err(FileError::ExtensionNotAllowed)?;
        Ok(())
    }

    async fn is_taken(&self, tag: &str, file_id: &str) -> Result<bool, StorageError> {
        Ok(self.metadata.exists(tag, file_id).await? || self.blobs.exists(tag, file_id).await?)
    }

    async fn allocate_id(&self, tag: &str, filename: &str) -> Result<String, StorageError> {
        let mut candidate = naming::generate_file_id(filename);
        for _ in 1..MAX_ID_ATTEMPTS {
            if !self.is_taken(tag, &candidate).await? {
                return Ok(candidate);
            }
            tracing::debug!(tag, file_id = %candidate, "identifier taken, regenerating");
            candidate = naming::generate_file_id(filename);
        }
        if self.is_taken(tag, &candidate).await? {
            tracing::warn!(tag, file_id = %candidate, "identifier still taken, overwriting");
        }
        Ok(candidate)
    }

    /// Roll back a written blob, logging (not returning) a failed rollback.
    async fn discard_blob(&self, tag: &str, file_id: &str) {
        if let Err(e) = self.blobs.remove(tag, file_id).await {
            tracing::error!(tag, file_id, error = %e, "failed to remove orphaned blob");
        }
    }

    pub async fn upload(
        &self,
        req: UploadRequest,
        body: ByteStream<'_>,
    ) -> Result<UploadResult, FileError> {
        self.validate_upload(&req)?;

        let file_id = self.allocate_id(&req.tag, &req.filename).await?;
        let meta = self.store(req, file_id, body).await?;

        tracing::info!(
            tag = %meta.tag,
            file_id = %meta.file_id,
            size = meta.size,
            public = meta.public,
            "file uploaded"
        );

        Ok(UploadResult {
            url: self.file_url(&meta.tag, &meta.file_id),
            file_id: meta.file_id,
            original_name: meta.original_name,
            tag: meta.tag,
            size: meta.size,
            content_type: meta.content_type,
            public: meta.public,
            uploaded_at: meta.uploaded_at,
            uploaded_by: meta.uploaded_by,
        })
    }

    /// Write blob then record under an already allocated `file_id`. Any
    /// failure after the blob lands removes the blob again.
    async fn store(
        &self,
        req: UploadRequest,
        file_id: String,
        body: ByteStream<'_>,
    ) -> Result<FileMeta, FileError> {
        let tag = req.tag.as_str();
        let size = self.blobs.save(tag, &file_id, body).await?;

        // The transport's size hint is trusted for validation; re-check what
        // actually landed on disk.
        if size == 0 {
            self.discard_blob(tag, &file_id).await;
            return Err(FileError::EmptyFile);
        }
        if size > self.settings.max_file_size {
            self.discard_blob(tag, &file_id).await;
            return Err(FileError::FileTooLarge {
                max: self.settings.max_file_size,
            });
        }

        let blob_path = match self.blobs.locate(tag, &file_id).await {
            Ok(p) => p,
            Err(e) => {
                self.discard_blob(tag, &file_id).await;
                return Err(e.into());
            }
        };

        let content_type = match detect_content_type(&blob_path).await {
            Ok(ct) => ct,
            Err(e) => {
                tracing::warn!(
                    tag,
                    file_id = %file_id,
                    error = %e,
                    "content type detection failed"
                );
                FALLBACK_CONTENT_TYPE.to_string()
            }
        };

        let meta = FileMeta {
            file_id,
            original_name: req.filename,
            tag: req.tag.clone(),
            size,
            content_type,
            public: req.public,
            uploaded_at: Utc::now(),
            uploaded_by: req.uploaded_by,
        };

        if let Err(e) = self.metadata.save(&meta).await {
            self.discard_blob(&meta.tag, &meta.file_id).await;
            return Err(e.into());
        }
        Ok(meta)
    }

    /// Resolve a file for reading. A record whose blob is gone is reported
    /// exactly like a missing record.
    pub async fn download(
        &self,
        tag: &str,
        file_id: &str,
    ) -> Result<(FileMeta, PathBuf), FileError> {
        if !is_valid_tag(tag) || !is_safe_file_id(file_id) {
            return Err(FileError::NotFound);
        }
        let meta = self
            .metadata
            .load(tag, file_id)
            .await
            .map_err(FileError::from_lookup)?;
        let path = self.blobs.locate(tag, file_id).await.map_err(|e| {
            if e.is_not_found() {
                tracing::debug!(tag, file_id, "metadata without blob");
            }
            FileError::from_lookup(e)
        })?;
        Ok((meta, path))
    }

    pub async fn list(&self, query: &ListQuery) -> Result<ListPage, FileError> {
        let mut files = self.catalog.scan(&query.filter).await?;

        files.sort_by(|a, b| {
            a.uploaded_at
                .cmp(&b.uploaded_at)
                .then_with(|| a.file_id.cmp(&b.file_id))
        });
        if query.descending {
            files.reverse();
        }

        let total = files.len();
        let page = query.page.max(1);
        let page_size = query.page_size.max(1);
        let start = (page - 1).saturating_mul(page_size);
        if start >= total {
            return Ok(ListPage { files: Vec::new(), total });
        }
        let end = start.saturating_add(page_size).min(total);
        let files = files.drain(start..end).collect();

        Ok(ListPage { files, total })
    }

    pub async fn delete(&self, tag: &str, file_id: &str) -> Result<(), FileError> {
        if !is_valid_tag(tag) || !is_safe_file_id(file_id) {
            return Err(FileError::NotFound);
        }
        self.metadata
            .load(tag, file_id)
            .await
            .map_err(FileError::from_lookup)?;

        self.blobs.remove(tag, file_id).await?;

        if let Err(e) = self.metadata.delete(tag, file_id).await {
            tracing::warn!(
                tag,
                file_id,
                error = %e,
                "failed to delete metadata, record left behind"
            );
        }

        tracing::info!(tag, file_id, "file deleted");
        Ok(())
    }

    pub async fn stats(&self) -> Result<StorageStats, FileError> {
        Ok(self.catalog.stats().await?)
    }
}
