mod report;
mod scan;
mod upload;

pub use report::{FileSecurityReport, IngestionResult, SecurityStatus, TranscodeResult};
pub use scan::{Disposition, ScanMethod, ScanResult, ThreatLevel};
pub use upload::{SecurityFailure, SecurityIssue, SecurityVerdict, UploadRequest};
