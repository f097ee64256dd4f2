//! Error types module
//!
//! Every failure the ingestion pipeline can report is an [`IngestError`]. Each
//! variant maps to a stable [`ErrorKind`] and to one of the error classes the
//! pipeline reasons about (validation, security, scan, transcode, disposition).
//!
//! Security-class errors are hostile input. Their `Display` output names the
//! check that tripped and is meant for logs; callers must surface
//! [`ErrorMetadata::client_message`] instead, which never reveals the check.

use std::io;

use serde::{Deserialize, Serialize};

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for hostile input and infected files
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Broad class of an ingestion failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorClass {
    Validation,
    Security,
    Scan,
    Transcode,
    Disposition,
    Internal,
}

/// Discriminant of an [`IngestError`], stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidFilename,
    PathTraversal,
    BlockedFilename,
    BlockedMimeType,
    DisallowedForCategory,
    DisallowedExtension,
    ExtensionMismatch,
    FileTooLarge,
    EmptyFile,
    UnknownCategory,
    SignatureMismatch,
    ExecutableContent,
    ScriptInjection,
    VirusDetected,
    ScanFailed,
    ImageDecodeError,
    ImageProcessing,
    QuarantineFailed,
    Storage,
    Internal,
}

/// Metadata for error responses - defines how an error should be presented
/// to whoever called the pipeline.
pub trait ErrorMetadata {
    /// HTTP status code the calling web layer should use
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "SIGNATURE_MISMATCH")
    fn error_code(&self) -> &'static str;

    /// Which part of the pipeline rejected the upload
    fn error_class(&self) -> ErrorClass;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden from the uploader
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

pub type IngestResult<T> = Result<T, IngestError>;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("Path traversal attempt in filename: {0}")]
    PathTraversal(String),

    #[error("Filename matches blocked pattern '{pattern}': {filename}")]
    BlockedFilename { filename: String, pattern: String },

    #[error("MIME type is blocked: {0}")]
    BlockedMimeType(String),

    #[error("MIME type '{content_type}' is not allowed for category '{category}'")]
    DisallowedForCategory {
        content_type: String,
        category: String,
    },

    #[error("Extension '{extension}' is not allowed for category '{category}'")]
    DisallowedExtension { extension: String, category: String },

    #[error("Extension '{extension}' does not match content type '{content_type}'")]
    ExtensionMismatch {
        extension: String,
        content_type: String,
    },

    #[error("File too large: {size} bytes exceeds maximum of {max} bytes")]
    FileTooLarge { size: u64, max: u64 },

    #[error("File is empty")]
    EmptyFile,

    #[error("Unknown upload category: {0}")]
    UnknownCategory(String),

    #[error("File content does not match declared type {0}")]
    SignatureMismatch(String),

    #[error("Executable header detected: {0}")]
    ExecutableContent(String),

    #[error("Script injection token detected: {0}")]
    ScriptInjection(String),

    #[error("Virus detected: {0}")]
    VirusDetected(String),

    #[error("Virus scan failed: {0}")]
    ScanFailed(String),

    #[error("Failed to decode image: {0}")]
    ImageDecode(String),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Failed to quarantine {path}: {reason}")]
    QuarantineFailed { path: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<io::Error> for IngestError {
    fn from(err: io::Error) -> Self {
        IngestError::Storage(format!("IO error: {}", err))
    }
}

impl From<tokio::task::JoinError> for IngestError {
    fn from(err: tokio::task::JoinError) -> Self {
        IngestError::Internal(format!("Worker task failed: {}", err))
    }
}

/// Static metadata for each kind: (http_status, error_code, class, sensitive, log_level).
fn kind_static_metadata(kind: ErrorKind) -> (u16, &'static str, ErrorClass, bool, LogLevel) {
    use ErrorClass::*;
    match kind {
        ErrorKind::InvalidFilename => (400, "INVALID_FILENAME", Validation, false, LogLevel::Debug),
        ErrorKind::BlockedMimeType => (415, "BLOCKED_MIME_TYPE", Validation, false, LogLevel::Debug),
        ErrorKind::DisallowedForCategory => (
            415,
            "DISALLOWED_FOR_CATEGORY",
            Validation,
            false,
            LogLevel::Debug,
        ),
        ErrorKind::DisallowedExtension => (
            415,
            "DISALLOWED_EXTENSION",
            Validation,
            false,
            LogLevel::Debug,
        ),
        ErrorKind::ExtensionMismatch => (400, "EXTENSION_MISMATCH", Validation, false, LogLevel::Debug),
        ErrorKind::FileTooLarge => (413, "FILE_TOO_LARGE", Validation, false, LogLevel::Debug),
        ErrorKind::EmptyFile => (400, "EMPTY_FILE", Validation, false, LogLevel::Debug),
        ErrorKind::UnknownCategory => (400, "UNKNOWN_CATEGORY", Validation, false, LogLevel::Debug),
        ErrorKind::PathTraversal => (400, "PATH_TRAVERSAL", Security, true, LogLevel::Warn),
        ErrorKind::BlockedFilename => (400, "BLOCKED_FILENAME", Security, true, LogLevel::Warn),
        ErrorKind::SignatureMismatch => (400, "SIGNATURE_MISMATCH", Security, true, LogLevel::Warn),
        ErrorKind::ExecutableContent => (400, "EXECUTABLE_CONTENT", Security, true, LogLevel::Warn),
        ErrorKind::ScriptInjection => (400, "SCRIPT_INJECTION", Security, true, LogLevel::Warn),
        ErrorKind::VirusDetected => (422, "VIRUS_DETECTED", Security, true, LogLevel::Warn),
        ErrorKind::ScanFailed => (503, "SCAN_FAILED", Scan, true, LogLevel::Error),
        ErrorKind::ImageDecodeError => (400, "IMAGE_DECODE_ERROR", Transcode, false, LogLevel::Warn),
        ErrorKind::ImageProcessing => (
            500,
            "IMAGE_PROCESSING_ERROR",
            Transcode,
            false,
            LogLevel::Warn,
        ),
        ErrorKind::QuarantineFailed => (500, "QUARANTINE_FAILED", Disposition, true, LogLevel::Error),
        ErrorKind::Storage => (500, "STORAGE_ERROR", Internal, true, LogLevel::Error),
        ErrorKind::Internal => (500, "INTERNAL_ERROR", Internal, true, LogLevel::Error),
    }
}

const SECURITY_REJECTION_MESSAGE: &str = "File failed security requirements";

/// Code reported to the uploader for every security rejection.
pub const SECURITY_REJECTED_CODE: &str = "SECURITY_REJECTED";

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::InvalidFilename(_) => ErrorKind::InvalidFilename,
            IngestError::PathTraversal(_) => ErrorKind::PathTraversal,
            IngestError::BlockedFilename { .. } => ErrorKind::BlockedFilename,
            IngestError::BlockedMimeType(_) => ErrorKind::BlockedMimeType,
            IngestError::DisallowedForCategory { .. } => ErrorKind::DisallowedForCategory,
            IngestError::DisallowedExtension { .. } => ErrorKind::DisallowedExtension,
            IngestError::ExtensionMismatch { .. } => ErrorKind::ExtensionMismatch,
            IngestError::FileTooLarge { .. } => ErrorKind::FileTooLarge,
            IngestError::EmptyFile => ErrorKind::EmptyFile,
            IngestError::UnknownCategory(_) => ErrorKind::UnknownCategory,
            IngestError::SignatureMismatch(_) => ErrorKind::SignatureMismatch,
            IngestError::ExecutableContent(_) => ErrorKind::ExecutableContent,
            IngestError::ScriptInjection(_) => ErrorKind::ScriptInjection,
            IngestError::VirusDetected(_) => ErrorKind::VirusDetected,
            IngestError::ScanFailed(_) => ErrorKind::ScanFailed,
            IngestError::ImageDecode(_) => ErrorKind::ImageDecodeError,
            IngestError::ImageProcessing(_) => ErrorKind::ImageProcessing,
            IngestError::QuarantineFailed { .. } => ErrorKind::QuarantineFailed,
            IngestError::Storage(_) => ErrorKind::Storage,
            IngestError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// True for failures caused by hostile input rather than mistakes.
    pub fn is_security(&self) -> bool {
        self.error_class() == ErrorClass::Security
    }

    /// Code safe to hand back to the uploader. Security rejections all share
    /// [`SECURITY_REJECTED_CODE`]; the specific code only goes to the logs.
    pub fn public_error_code(&self) -> &'static str {
        if self.is_security() {
            SECURITY_REJECTED_CODE
        } else {
            self.error_code()
        }
    }
}

impl ErrorMetadata for IngestError {
    fn http_status_code(&self) -> u16 {
        kind_static_metadata(self.kind()).0
    }

    fn error_code(&self) -> &'static str {
        kind_static_metadata(self.kind()).1
    }

    fn error_class(&self) -> ErrorClass {
        kind_static_metadata(self.kind()).2
    }

    fn is_sensitive(&self) -> bool {
        kind_static_metadata(self.kind()).3
    }

    fn log_level(&self) -> LogLevel {
        kind_static_metadata(self.kind()).4
    }

    fn client_message(&self) -> String {
        match self {
            IngestError::PathTraversal(_)
            | IngestError::BlockedFilename { .. }
            | IngestError::SignatureMismatch(_)
            | IngestError::ExecutableContent(_)
            | IngestError::ScriptInjection(_)
            | IngestError::VirusDetected(_) => SECURITY_REJECTION_MESSAGE.to_string(),
            IngestError::ScanFailed(_) => "Virus scanning temporarily unavailable".to_string(),
            IngestError::QuarantineFailed { .. } => SECURITY_REJECTION_MESSAGE.to_string(),
            IngestError::Storage(_) => "Failed to store file".to_string(),
            IngestError::Internal(_) => "Internal server error".to_string(),
            IngestError::ImageProcessing(_) => "Failed to process image".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_errors_share_generic_message() {
        let errors = [
            IngestError::PathTraversal("../etc/passwd".to_string()),
            IngestError::SignatureMismatch("image/png".to_string()),
            IngestError::ExecutableContent("MZ".to_string()),
            IngestError::ScriptInjection("<?php".to_string()),
        ];
        for err in &errors {
            assert_eq!(err.error_class(), ErrorClass::Security);
            assert_eq!(err.client_message(), "File failed security requirements");
            assert!(err.is_sensitive());
            assert_eq!(err.log_level(), LogLevel::Warn);
        }
    }

    #[test]
    fn test_public_code_hides_which_check_tripped() {
        let errors = [
            IngestError::PathTraversal("../a.txt".to_string()),
            IngestError::SignatureMismatch("application/pdf".to_string()),
            IngestError::ScriptInjection("<script".to_string()),
            IngestError::VirusDetected("Eicar".to_string()),
        ];
        for err in &errors {
            assert_eq!(err.public_error_code(), SECURITY_REJECTED_CODE);
            assert_ne!(err.error_code(), SECURITY_REJECTED_CODE);
        }
        let too_large = IngestError::FileTooLarge { size: 10, max: 5 };
        assert_eq!(too_large.public_error_code(), "FILE_TOO_LARGE");
        assert_eq!(
            IngestError::ScanFailed("timeout".to_string()).public_error_code(),
            "SCAN_FAILED"
        );
    }

    #[test]
    fn test_validation_error_keeps_detail() {
        let err = IngestError::FileTooLarge { size: 20, max: 10 };
        assert_eq!(err.kind(), ErrorKind::FileTooLarge);
        assert_eq!(err.error_code(), "FILE_TOO_LARGE");
        assert_eq!(err.http_status_code(), 413);
        assert!(err.client_message().contains("20 bytes"));
        assert!(!err.is_security());
    }

    #[test]
    fn test_scan_failure_is_not_security() {
        let err = IngestError::ScanFailed("timeout".to_string());
        assert_eq!(err.error_class(), ErrorClass::Scan);
        assert_eq!(err.log_level(), LogLevel::Error);
        assert!(!err.is_security());
    }

    #[test]
    fn test_io_error_maps_to_storage() {
        let err: IngestError = io::Error::new(io::ErrorKind::PermissionDenied, "denied").into();
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert_eq!(err.client_message(), "Failed to store file");
    }

    #[test]
    fn test_kind_serializes_screaming_snake() {
        let json = serde_json::to_string(&ErrorKind::SignatureMismatch).unwrap();
        assert_eq!(json, "\"SIGNATURE_MISMATCH\"");
    }
}
