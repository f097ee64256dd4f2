use lectern_core::{IngestError, IngestResult};
use percent_encoding::percent_decode_str;

/// Literal traversal sequences, checked case-insensitively on the raw name.
/// Overlong UTF-8 forms do not survive percent-decoding so they are listed here.
const TRAVERSAL_PATTERNS: &[&str] = &[
    "../",
    "..\\",
    ".../",
    "...\\",
    "%2e%2e%2f",
    "%2e%2e%5c",
    "%2e%2e/",
    "%2e%2e\\",
    "..%2f",
    "..%5c",
    "..%c0%af",
    "..%c1%9c",
    "%c0%ae%c0%ae",
    "%252e%252e",
    "..%252f",
    "..%255c",
];

/// Maximum rounds of percent-decoding before giving up on a name.
const MAX_DECODE_ROUNDS: usize = 3;

/// Rejects names that try to escape the upload directory.
///
/// Runs separately from [`super::FilenameValidator`] so the two concerns can be
/// reasoned about on their own.
#[derive(Debug, Default, Clone, Copy)]
pub struct PathTraversalGuard;

impl PathTraversalGuard {
    pub fn check(&self, filename: &str) -> IngestResult<()> {
        if is_absolute(filename) {
            tracing::warn!(filename = %filename, "Absolute path in upload filename");
            return Err(IngestError::PathTraversal(filename.to_string()));
        }

        let lowered = filename.to_lowercase();
        if let Some(pattern) = TRAVERSAL_PATTERNS.iter().find(|p| lowered.contains(*p)) {
            tracing::warn!(
                filename = %filename,
                pattern = %pattern,
                "Path traversal sequence in upload filename"
            );
            return Err(IngestError::PathTraversal(filename.to_string()));
        }

        // Decode repeatedly to catch encodings not in the literal list.
        let mut current = lowered;
        for _ in 0..MAX_DECODE_ROUNDS {
            let decoded = percent_decode_str(&current).decode_utf8_lossy().to_string();
            if has_parent_component(&decoded) || is_absolute(&decoded) {
                tracing::warn!(filename = %filename, "Encoded path traversal in upload filename");
                return Err(IngestError::PathTraversal(filename.to_string()));
            }
            if decoded == current {
                break;
            }
            current = decoded;
        }

        Ok(())
    }
}

fn is_absolute(name: &str) -> bool {
    if name.starts_with('/') || name.starts_with('\\') {
        return true;
    }
    let bytes = name.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// True when any `/`- or `\`-separated component is exactly `..`.
fn has_parent_component(name: &str) -> bool {
    name.split(['/', '\\']).any(|component| component == "..")
}
