use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::scan::{Disposition, ScanMethod, ThreatLevel};
use crate::error::{ErrorMetadata, IngestError};

/// Result of normalizing an image before storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscodeResult {
    pub final_path: PathBuf,
    /// Thumbnail paths relative to the upload root
    pub thumbnails: Vec<String>,
    pub resized: bool,
    pub metadata_stripped: bool,
    pub width: u32,
    pub height: u32,
    pub format: String,
    /// Whether the source carried EXIF data before stripping
    pub had_exif: bool,
}

/// What the pipeline hands back to its caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionResult {
    pub success: bool,
    pub original_filename: String,
    /// Path relative to the upload root, set only on success
    pub path: Option<String>,
    pub size: u64,
    pub mime_type: String,
    pub category: String,
    #[serde(default)]
    pub thumbnails: Vec<String>,
    pub scan_method: Option<ScanMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disposition: Option<Disposition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcode: Option<TranscodeResult>,
    pub error_code: Option<String>,
    pub error: Option<String>,
}

impl IngestionResult {
    pub fn stored(
        original_filename: impl Into<String>,
        path: impl Into<String>,
        size: u64,
        mime_type: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            success: true,
            original_filename: original_filename.into(),
            path: Some(path.into()),
            size,
            mime_type: mime_type.into(),
            category: category.into(),
            thumbnails: Vec::new(),
            scan_method: None,
            disposition: None,
            transcode: None,
            error_code: None,
            error: None,
        }
    }

    /// Failure result carrying the caller-safe code and message for `err`.
    pub fn rejected(
        original_filename: impl Into<String>,
        size: u64,
        mime_type: impl Into<String>,
        category: impl Into<String>,
        err: &IngestError,
    ) -> Self {
        Self {
            success: false,
            original_filename: original_filename.into(),
            path: None,
            size,
            mime_type: mime_type.into(),
            category: category.into(),
            thumbnails: Vec::new(),
            scan_method: None,
            disposition: None,
            transcode: None,
            error_code: Some(err.public_error_code().to_string()),
            error: Some(err.client_message()),
        }
    }

    /// True when the file was accepted on the strength of the fallback scanner
    /// or without scanning at all.
    pub fn advisory_scan(&self) -> bool {
        self.scan_method.map(|m| m.is_advisory()).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityStatus {
    Safe,
    Blocked,
}

/// Output of the "check without storing" mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSecurityReport {
    pub filename: String,
    pub size: u64,
    pub mime_type: String,
    pub status: SecurityStatus,
    pub threat_level: ThreatLevel,
    pub issues: Vec<String>,
    pub scan_method: Option<ScanMethod>,
    pub scan_timestamp: DateTime<Utc>,
}
