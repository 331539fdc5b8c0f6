use super::metadata::read_meta_file;
use super::{FileMeta, ScanFilter, StorageError, StorageStats, META_SUFFIX};
use async_trait::async_trait;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::fs;

type WalkFuture<'a> = Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + 'a>>;

/// Source of the full set of metadata records.
///
/// The filesystem implementation re-walks the whole storage root on every
/// call, so cost grows with the total number of stored files rather than the
/// size of the result. An indexed implementation can replace it behind the
/// same contract.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Every readable record matching `filter`, in no particular order.
    /// Unreadable records are skipped, never reported as errors.
    async fn scan(&self, filter: &ScanFilter) -> Result<Vec<FileMeta>, StorageError>;

    /// Count and total size of stored blobs, ignoring metadata and hidden files.
    async fn stats(&self) -> Result<StorageStats, StorageError>;
}

pub struct FilesystemCatalog {
    root: PathBuf,
}

impl FilesystemCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn walk_meta<'a>(
        &'a self,
        dir: &'a Path,
        filter: &'a ScanFilter,
        results: &'a mut Vec<FileMeta>,
    ) -> WalkFuture<'a> {
        Box::pin(async move {
            let mut entries = match fs::read_dir(dir).await {
                Ok(e) => e,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
                Err(e) => return Err(e.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;

                if file_type.is_dir() {
                    self.walk_meta(&path, filter, results).await?;
                    continue;
                }

                let fname = entry.file_name().to_string_lossy().to_string();
                if !file_type.is_file() || !fname.ends_with(META_SUFFIX) {
                    continue;
                }

                match read_meta_file(&path, &fname).await {
                    Ok(meta) => {
                        if filter.matches(&meta) {
                            results.push(meta);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "skipping unreadable metadata"
                        );
                    }
                }
            }
            Ok(())
        })
    }

    fn walk_blobs<'a>(
        &'a self,
        dir: &'a Path,
        files: &'a mut u64,
        bytes: &'a mut u64,
    ) -> WalkFuture<'a> {
        Box::pin(async move {
            let mut entries = match fs::read_dir(dir).await {
                Ok(e) => e,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
                Err(e) => return Err(e.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    self.walk_blobs(&entry.path(), files, bytes).await?;
                    continue;
                }

                let fname = entry.file_name().to_string_lossy().to_string();
                if !file_type.is_file() || fname.ends_with(META_SUFFIX) || fname.starts_with('.') {
                    continue;
                }

                match entry.metadata().await {
                    Ok(m) => {
                        *files += 1;
                        *bytes += m.len();
                    }
                    // Deleted between read_dir and stat.
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
            Ok(())
        })
    }
}

#[async_trait]
impl Catalog for FilesystemCatalog {
    async fn scan(&self, filter: &ScanFilter) -> Result<Vec<FileMeta>, StorageError> {
        let mut results = Vec::new();
        self.walk_meta(&self.root, filter, &mut results).await?;
        Ok(results)
    }

    async fn stats(&self) -> Result<StorageStats, StorageError> {
        let mut total_files = 0u64;
        let mut total_bytes = 0u64;
        self.walk_blobs(&self.root, &mut total_files, &mut total_bytes)
            .await?;
        Ok(StorageStats {
            total_files,
            total_bytes,
            total_size: format_size(total_bytes),
        })
    }
}

/// Human readable size using 1024-based units, e.g. `512 B`, `1.5 KB`.
pub fn format_size(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    const PREFIXES: [char; 6] = ['K', 'M', 'G', 'T', 'P', 'E'];
    if bytes < UNIT {
        return format!("{} B", bytes);
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    format!("{:.1} {}B", bytes as f64 / div as f64, PREFIXES[exp])
}
