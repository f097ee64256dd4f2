use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

use crate::error::{ErrorKind, IngestError};

/// One upload handed to the pipeline by its caller.
///
/// The caller owns the request and its byte source; the pipeline only borrows
/// it for the duration of a single ingestion call. An absent filename is
/// represented by an empty string.
pub struct UploadRequest<R> {
    pub original_filename: String,
    pub content_type: String,
    /// Declared size. Never trusted on its own, the actual byte count is
    /// bounded while staging.
    pub size: u64,
    pub category: String,
    pub body: R,
}

impl<R: AsyncRead + Unpin + Send> UploadRequest<R> {
    pub fn new(
        original_filename: impl Into<String>,
        content_type: impl Into<String>,
        size: u64,
        category: impl Into<String>,
        body: R,
    ) -> Self {
        Self {
            original_filename: original_filename.into(),
            content_type: content_type.into(),
            size,
            category: category.into(),
            body,
        }
    }
}

impl<R> std::fmt::Debug for UploadRequest<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadRequest")
            .field("original_filename", &self.original_filename)
            .field("content_type", &self.content_type)
            .field("size", &self.size)
            .field("category", &self.category)
            .finish_non_exhaustive()
    }
}

/// Which layer of the pre-scan chain rejected a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityFailure {
    Filename,
    ContentType,
    PathTraversal,
    SignatureMismatch,
    HeuristicHit,
    Size,
}

impl SecurityFailure {
    /// Maps a chain error to the layer that raised it. Scan, transcode and
    /// storage errors are not part of the chain and map to `None`.
    pub fn from_kind(kind: ErrorKind) -> Option<Self> {
        match kind {
            ErrorKind::InvalidFilename | ErrorKind::BlockedFilename => Some(Self::Filename),
            ErrorKind::BlockedMimeType
            | ErrorKind::DisallowedForCategory
            | ErrorKind::DisallowedExtension
            | ErrorKind::ExtensionMismatch
            | ErrorKind::UnknownCategory => Some(Self::ContentType),
            ErrorKind::PathTraversal => Some(Self::PathTraversal),
            ErrorKind::SignatureMismatch => Some(Self::SignatureMismatch),
            ErrorKind::ExecutableContent | ErrorKind::ScriptInjection => Some(Self::HeuristicHit),
            ErrorKind::FileTooLarge | ErrorKind::EmptyFile => Some(Self::Size),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityIssue {
    pub failure: SecurityFailure,
    pub kind: ErrorKind,
    pub detail: String,
}

/// Outcome of the pre-scan validation chain for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "issues", rename_all = "snake_case")]
pub enum SecurityVerdict {
    Pass,
    Fail(Vec<SecurityIssue>),
}

impl SecurityVerdict {
    pub fn from_issues(issues: Vec<SecurityIssue>) -> Self {
        if issues.is_empty() {
            SecurityVerdict::Pass
        } else {
            SecurityVerdict::Fail(issues)
        }
    }

    pub fn passed(&self) -> bool {
        matches!(self, SecurityVerdict::Pass)
    }

    pub fn issues(&self) -> &[SecurityIssue] {
        match self {
            SecurityVerdict::Pass => &[],
            SecurityVerdict::Fail(issues) => issues,
        }
    }
}

impl From<&IngestError> for SecurityIssue {
    fn from(err: &IngestError) -> Self {
        let kind = err.kind();
        SecurityIssue {
            failure: SecurityFailure::from_kind(kind).unwrap_or(SecurityFailure::ContentType),
            kind,
            detail: err.to_string(),
        }
    }
}
