use super::{ByteStream, StorageError};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const COPY_BUF_SIZE: usize = 64 * 1024;

/// Raw file bytes, stored at `{root}/{tag}/{file_id}`.
///
/// There is no locking: two writers on the same key race and the last one
/// wins. Keys are generated, never chosen by callers.
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, tag: &str, file_id: &str) -> PathBuf {
        self.root.join(tag).join(file_id)
    }

    /// Stream `body` into the blob file and return the number of bytes written.
    ///
    /// A failed copy removes the partial file before the error is returned.
    pub async fn save(
        &self,
        tag: &str,
        file_id: &str,
        body: ByteStream<'_>,
    ) -> Result<u64, StorageError> {
        let tag_dir = self.root.join(tag);
        fs::create_dir_all(&tag_dir).await?;

        let path = tag_dir.join(file_id);
        let file = fs::File::create(&path).await?;

        match Self::copy_into(file, body).await {
            Ok(size) => {
                Self::set_permissions(&path).await;
                Ok(size)
            }
            Err(e) => {
                let _ = fs::remove_file(&path).await;
                Err(e.into())
            }
        }
    }

    async fn copy_into(mut file: fs::File, mut body: ByteStream<'_>) -> std::io::Result<u64> {
        let mut size: u64 = 0;
        let mut buf = vec![0u8; COPY_BUF_SIZE];
        loop {
            let n = body.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n]).await?;
            size += n as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok(size)
    }

    #[cfg(unix)]
    async fn set_permissions(path: &Path) {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(path, std::fs::Permissions::from_mode(0o644)).await {
            tracing::warn!(path = %path.display(), error = %e, "failed to set blob permissions");
        }
    }

    #[cfg(not(unix))]
    async fn set_permissions(_path: &Path) {}

    /// Path of an existing blob. Never returns a path to a missing file.
    pub async fn locate(&self, tag: &str, file_id: &str) -> Result<PathBuf, StorageError> {
        let path = self.blob_path(tag, file_id);
        match fs::metadata(&path).await {
            Ok(m) if m.is_file() => Ok(path),
            Ok(_) => Err(StorageError::NotFound(file_id.to_string())),
            Err(e) => Err(super::not_found_or_io(e, file_id)),
        }
    }

    pub async fn exists(&self, tag: &str, file_id: &str) -> Result<bool, StorageError> {
        Ok(fs::try_exists(self.blob_path(tag, file_id)).await?)
    }

    /// Remove a blob. Missing blobs are not an error.
    pub async fn remove(&self, tag: &str, file_id: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.blob_path(tag, file_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
