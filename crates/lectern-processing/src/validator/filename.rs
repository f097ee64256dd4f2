use lectern_core::{IngestError, IngestResult, SecuritySettings};
use regex::Regex;
use std::path::Path;

const RESERVED_DEVICE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Rejects filenames that are unsafe to handle regardless of content.
pub struct FilenameValidator {
    max_length: usize,
    blocked_patterns: Vec<Regex>,
}

impl FilenameValidator {
    pub fn new(max_length: usize, blocked_patterns: Vec<Regex>) -> Self {
        Self {
            max_length,
            blocked_patterns,
        }
    }

    /// Build from settings. Patterns are anchored so they must match the
    /// whole filename.
    pub fn from_settings(settings: &SecuritySettings) -> Result<Self, regex::Error> {
        let blocked_patterns = settings
            .blocked_filename_patterns
            .iter()
            .map(|p| Regex::new(&format!("^(?:{})$", p)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(settings.max_filename_length, blocked_patterns))
    }

    /// Checks emptiness, control characters, reserved device names and length.
    pub fn validate(&self, filename: &str) -> IngestResult<()> {
        if filename.trim().is_empty() {
            return Err(IngestError::InvalidFilename("filename is empty".to_string()));
        }

        if filename.contains('\0') {
            return Err(IngestError::InvalidFilename(
                "filename contains a NUL byte".to_string(),
            ));
        }

        if filename.chars().any(|c| c.is_ascii_control()) {
            return Err(IngestError::InvalidFilename(
                "filename contains control characters".to_string(),
            ));
        }

        if is_reserved_device_name(filename) {
            return Err(IngestError::InvalidFilename(format!(
                "'{}' is a reserved device name",
                filename
            )));
        }

        let length = filename.chars().count();
        if length > self.max_length {
            return Err(IngestError::InvalidFilename(format!(
                "filename is {} characters long (max: {})",
                length, self.max_length
            )));
        }

        Ok(())
    }

    /// Checks the lower-cased filename against the configured deny-list.
    pub fn check_blocked_patterns(&self, filename: &str) -> IngestResult<()> {
        let lowered = filename.to_lowercase();
        if let Some(pattern) = self.blocked_patterns.iter().find(|p| p.is_match(&lowered)) {
            return Err(IngestError::BlockedFilename {
                filename: filename.to_string(),
                pattern: pattern.as_str().to_string(),
            });
        }
        Ok(())
    }
}

/// Reserved names are matched on the last path component, case-insensitively,
/// ignoring everything after the first dot (`con.tar.gz` is still `CON`).
fn is_reserved_device_name(filename: &str) -> bool {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let stem = base.split('.').next().unwrap_or(base).trim_end();
    RESERVED_DEVICE_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(stem))
}

/// Lower-cased extension of `filename`, if any.
pub fn file_extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

/// Make a declared filename safe to use as a path component.
pub fn sanitize_filename(filename: &str, max_length: usize) -> String {
    if filename.trim().is_empty() {
        return "unnamed_file".to_string();
    }

    let without_traversal = filename.replace("../", "").replace("..\\", "");
    let mut sanitized: String = without_traversal
        .chars()
        .filter(|c| !c.is_ascii_control())
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            other => other,
        })
        .collect();

    if sanitized.chars().count() > max_length {
        let (stem, extension) = match sanitized.rfind('.') {
            Some(idx) if idx > 0 => (sanitized[..idx].to_string(), sanitized[idx..].to_string()),
            _ => (sanitized.clone(), String::new()),
        };
        let keep = max_length.saturating_sub(extension.chars().count());
        sanitized = stem.chars().take(keep).collect::<String>() + &extension;
    }

    let trimmed = sanitized.trim().trim_matches('.');
    if trimmed.is_empty() {
        return "sanitized_file".to_string();
    }
    trimmed.to_string()
}

/// `<stem>_<8 hex chars>.<ext>`, so two uploads of `report.pdf` never collide.
pub fn unique_filename(sanitized: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let suffix = &suffix[..8];
    match sanitized.rfind('.') {
        Some(idx) if idx > 0 => format!("{}_{}{}", &sanitized[..idx], suffix, &sanitized[idx..]),
        _ => format!("{}_{}", sanitized, suffix),
    }
}
