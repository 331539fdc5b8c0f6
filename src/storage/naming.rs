//! Filename sanitizing, identifier generation and the input checks that run
//! before anything touches the storage root.

use rand::RngExt;

pub const MAX_TAG_LEN: usize = 50;
pub const MAX_FILENAME_LEN: usize = 200;

/// Stem used when nothing survives sanitizing.
const PLACEHOLDER_STEM: &str = "file";

/// A tag must match `^[A-Za-z0-9_-]{1,50}$`.
pub fn is_valid_tag(tag: &str) -> bool {
    !tag.is_empty()
        && tag.len() <= MAX_TAG_LEN
        && tag
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Reject identifiers that could escape the tag directory or name a hidden file.
pub fn is_safe_file_id(file_id: &str) -> bool {
    !file_id.is_empty()
        && !file_id.starts_with('.')
        && !file_id.contains("..")
        && !file_id.contains('/')
        && !file_id.contains('\\')
        && !file_id.contains('\0')
}

/// Final path segment, ignoring trailing separators.
fn base_name(name: &str) -> &str {
    let trimmed = name.trim_end_matches(['/', '\\']);
    trimmed.rsplit(['/', '\\']).next().unwrap_or(trimmed)
}

/// Lowercased extension of the final path segment, without the dot.
pub fn extension(filename: &str) -> Option<String> {
    let base = base_name(filename);
    let (_, ext) = base.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_lowercase())
    }
}

/// Reduce an untrusted filename to a single safe path segment.
///
/// Never fails; the result may be empty.
pub fn sanitize_filename(filename: &str) -> String {
    let cleaned: String = base_name(filename)
        .chars()
        .filter(|c| *c != '\0')
        .map(|c| if c == ' ' { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let cleaned = cleaned.strip_prefix('.').unwrap_or(&cleaned);

    if cleaned.len() <= MAX_FILENAME_LEN {
        return cleaned.to_string();
    }

    // Everything left is ASCII, so byte offsets are char boundaries.
    match cleaned.rfind('.') {
        Some(dot) if cleaned.len() - dot < MAX_FILENAME_LEN => {
            let ext = &cleaned[dot..];
            format!("{}{}", &cleaned[..MAX_FILENAME_LEN - ext.len()], ext)
        }
        _ => cleaned[..MAX_FILENAME_LEN].to_string(),
    }
}

/// Drop outer dots and collapse dot runs so the identifier is never hidden
/// and never contains `..`.
fn safe_stem(stem: &str) -> String {
    let mut out = String::with_capacity(stem.len());
    for c in stem.trim_matches('.').chars() {
        if c == '.' && out.ends_with('.') {
            continue;
        }
        out.push(c);
    }
    out
}

fn random_suffix() -> String {
    let n: u32 = rand::rng().random();
    format!("{:08x}", n)
}

/// Build a storage identifier of the form `{stem}_{suffix}.{ext}`.
///
/// The suffix carries 32 random bits. Uniqueness is not guaranteed here;
/// callers that care check the namespace before writing.
pub fn generate_file_id(original_name: &str) -> String {
    let sanitized = sanitize_filename(original_name);
    let ext = extension(&sanitized);

    let stem = match &ext {
        Some(e) => &sanitized[..sanitized.len() - e.len() - 1],
        None => sanitized.as_str(),
    };
    let stem = safe_stem(stem);
    let stem = if stem.is_empty() { PLACEHOLDER_STEM } else { &stem };

    match ext {
        Some(e) => format!("{}_{}.{}", stem, random_suffix(), e),
        None => format!("{}_{}", stem, random_suffix()),
    }
}

/// Normalize a configured extension list entry (`".PNG"` -> `"png"`).
pub fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

/// Check `filename`'s extension against an allow-list. Returns the
/// offending extension (possibly empty) on rejection.
pub fn check_extension(filename: &str, allowed: &[String]) -> Result<String, String> {
    let Some(ext) = extension(filename) else {
        return Err(String::new());
    };
    if allowed.iter().any(|a| normalize_extension(a) == ext) {
        Ok(ext)
    } else {
        Err(ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_name_strips_directories() {
        assert_eq!(base_name("a/b/c.txt"), "c.txt");
        assert_eq!(base_name("dir/"), "dir");
        assert_eq!(base_name(r"C:\tmp\x.png"), "x.png");
    }

    #[test]
    fn long_names_keep_extension() {
        let name = format!("{}.pdf", "a".repeat(300));
        let out = sanitize_filename(&name);
        assert_eq!(out.len(), MAX_FILENAME_LEN);
        assert!(out.ends_with(".pdf"));
    }
}
