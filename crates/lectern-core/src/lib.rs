//! Lectern Core Library
//!
//! Domain models, error taxonomy and configuration shared by every stage of the
//! file ingestion pipeline.

pub mod config;
pub mod error;
pub mod models;

// Re-export commonly used types
pub use config::{
    CategoryProfile, ImageProcessingSettings, IngestConfig, ScanErrorPolicy, SecuritySettings,
    VirusAction, VirusScanSettings,
};
pub use error::{
    ErrorClass, ErrorKind, ErrorMetadata, IngestError, IngestResult, LogLevel,
    SECURITY_REJECTED_CODE,
};
pub use models::{
    Disposition, FileSecurityReport, IngestionResult, ScanMethod, ScanResult, SecurityFailure,
    SecurityIssue, SecurityStatus, SecurityVerdict, ThreatLevel, TranscodeResult, UploadRequest,
};
