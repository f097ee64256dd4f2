//! Virus scanning: a clamd client with a local pattern fallback.

mod client;
mod fallback;
pub mod protocol;

pub use client::VirusScanClient;
pub use fallback::{FallbackScanner, FALLBACK_WINDOW};
pub use protocol::ScanVerdict;

use async_trait::async_trait;
use lectern_core::ScanResult;
use std::path::Path;

/// Produces a verdict for a staged file.
///
/// Implementations report failures through [`ScanResult::error`] instead of
/// returning an error, so the caller can apply its own scan-error policy.
#[async_trait]
pub trait VirusScanner: Send + Sync {
    async fn scan_file(&self, path: &Path) -> ScanResult;
}
