use std::path::Path;
use tokio::fs;
use tokio::io::AsyncReadExt;

pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Bytes inspected for magic-number detection.
const SNIFF_LEN: u64 = 8 * 1024;

/// Content type of a stored file: magic bytes first, then the extension of
/// `path`, then [`FALLBACK_CONTENT_TYPE`].
pub async fn detect_content_type(path: &Path) -> std::io::Result<String> {
    let mut head = Vec::with_capacity(SNIFF_LEN as usize);
    fs::File::open(path)
        .await?
        .take(SNIFF_LEN)
        .read_to_end(&mut head)
        .await?;
    Ok(content_type_for(&head, path))
}

pub fn content_type_for(head: &[u8], path: &Path) -> String {
    if let Some(kind) = infer::get(head) {
        return kind.mime_type().to_string();
    }
    mime_guess::from_path(path)
        .first()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string())
}
