pub mod blob;
pub mod catalog;
pub mod metadata;
pub mod naming;
pub mod sniff;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio::io::AsyncRead;

pub use blob::BlobStore;
pub use catalog::{Catalog, FilesystemCatalog};
pub use metadata::MetadataStore;

/// Upload body; may borrow from the request, e.g. a multipart field.
pub type ByteStream<'a> = Pin<Box<dyn AsyncRead + Send + 'a>>;

/// Suffix of the metadata sidecar written next to every blob.
pub const META_SUFFIX: &str = ".meta.json";

/// Metadata record persisted as `{root}/{tag}/{file_id}.meta.json`.
///
/// Field names are part of the on-disk format and must stay stable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileMeta {
    pub file_id: String,
    pub original_name: String,
    pub tag: String,
    pub size: u64,
    pub content_type: String,
    pub public: bool,
    pub uploaded_at: DateTime<Utc>,
    pub uploaded_by: String,
}

/// Optional filters applied to every record found by a catalog scan.
#[derive(Debug, Clone, Default)]
pub struct ScanFilter {
    pub tag: Option<String>,
    pub public: Option<bool>,
    pub search: Option<String>,
}

impl ScanFilter {
    pub fn matches(&self, meta: &FileMeta) -> bool {
        if let Some(tag) = self.tag.as_deref().filter(|t| !t.is_empty()) {
            if meta.tag != tag {
                return false;
            }
        }
        if let Some(public) = self.public {
            if meta.public != public {
                return false;
            }
        }
        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            let needle = search.to_lowercase();
            if !meta.original_name.to_lowercase().contains(&needle)
                && !meta.file_id.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        true
    }
}

/// Aggregate blob statistics over the whole storage root.
#[derive(Debug, Clone, Serialize)]
pub struct StorageStats {
    pub total_files: u64,
    pub total_bytes: u64,
    pub total_size: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Corrupt metadata for {0}: {1}")]
    Corrupt(String, String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Map an IO error to `NotFound` when the target is absent.
pub(crate) fn not_found_or_io(e: std::io::Error, what: &str) -> StorageError {
    if e.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound(what.to_string())
    } else {
        StorageError::Io(e)
    }
}
