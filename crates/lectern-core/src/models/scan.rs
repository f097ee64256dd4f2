use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a scan verdict was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMethod {
    /// Verdict from the external scanning daemon.
    Daemon,
    /// Local pattern match over the first kilobyte. Advisory grade only.
    Fallback,
    /// Virus scanning is disabled for this deployment.
    Skipped,
}

impl ScanMethod {
    pub fn label(&self) -> &'static str {
        match self {
            ScanMethod::Daemon => "ClamAV",
            ScanMethod::Fallback => "Basic Pattern Scan (advisory)",
            ScanMethod::Skipped => "Not scanned",
        }
    }

    pub fn is_advisory(&self) -> bool {
        !matches!(self, ScanMethod::Daemon)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreatLevel {
    None,
    Low,
    Medium,
    High,
}

/// Outcome of the virus-scan stage.
///
/// `error` is set when no verdict could be obtained. A scan error is never
/// reported as clean and never as infected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub method: ScanMethod,
    pub infected: bool,
    pub threat_name: Option<String>,
    pub threat_level: ThreatLevel,
    pub raw_output: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl ScanResult {
    pub fn clean(method: ScanMethod, raw_output: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            method,
            infected: false,
            threat_name: None,
            threat_level: ThreatLevel::None,
            raw_output: raw_output.into(),
            started_at,
            finished_at: Utc::now(),
            error: None,
        }
    }

    pub fn infected(
        method: ScanMethod,
        threat_name: impl Into<String>,
        threat_level: ThreatLevel,
        raw_output: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            method,
            infected: true,
            threat_name: Some(threat_name.into()),
            threat_level,
            raw_output: raw_output.into(),
            started_at,
            finished_at: Utc::now(),
            error: None,
        }
    }

    pub fn failed(method: ScanMethod, error: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        let error = error.into();
        Self {
            method,
            infected: false,
            threat_name: None,
            threat_level: ThreatLevel::None,
            raw_output: String::new(),
            started_at,
            finished_at: Utc::now(),
            error: Some(error),
        }
    }

    pub fn skipped() -> Self {
        Self::clean(ScanMethod::Skipped, "", Utc::now())
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn is_clean(&self) -> bool {
        !self.infected && self.error.is_none()
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Action taken on an infected file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Disposition {
    Deleted,
    Quarantined { path: PathBuf, report_path: PathBuf },
    Rejected,
}
