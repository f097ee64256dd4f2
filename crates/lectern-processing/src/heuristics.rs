//! Shallow content heuristics over the head of an upload.
//!
//! This is pattern matching, not parsing. Obfuscated payloads will get
//! through; benign text that happens to contain a token will not.

use lectern_core::{IngestError, IngestResult};

use crate::validator::normalize_mime_type;

/// How much of the upload the heuristics look at.
pub const HEURISTIC_WINDOW: usize = 1024;

const PE_MARKER: &[u8] = b"MZ";
const ELF_MARKER: &[u8] = b"\x7fELF";

const SCRIPT_TOKENS: &[&str] = &[
    "<script",
    "javascript:",
    "vbscript:",
    "onload=",
    "onerror=",
    "<?php",
    "<%@",
    "<%",
    "<jsp:",
    "eval(",
    "exec(",
];

/// Zip archives smaller than this are logged as suspicious.
const SUSPICIOUS_ZIP_SIZE: u64 = 100;

#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicContentScanner;

impl HeuristicContentScanner {
    pub fn scan(&self, header: &[u8], content_type: &str) -> IngestResult<()> {
        let window = &header[..header.len().min(HEURISTIC_WINDOW)];

        if window.starts_with(PE_MARKER) {
            return Err(IngestError::ExecutableContent(
                "Windows PE header".to_string(),
            ));
        }
        if window.starts_with(ELF_MARKER) {
            return Err(IngestError::ExecutableContent("ELF header".to_string()));
        }

        if is_textual(content_type) {
            let text = String::from_utf8_lossy(window).to_lowercase();
            if let Some(token) = SCRIPT_TOKENS.iter().find(|t| text.contains(*t)) {
                return Err(IngestError::ScriptInjection((*token).to_string()));
            }
        }

        Ok(())
    }

    /// Advisory only: tiny zip files are often crafted rather than created by
    /// an archiver. Never rejects.
    pub fn warn_if_suspicious_archive(&self, filename: &str, size: u64) -> bool {
        let is_zip = filename.to_lowercase().ends_with(".zip");
        if is_zip && size < SUSPICIOUS_ZIP_SIZE {
            tracing::warn!(
                filename = %filename,
                size_bytes = size,
                "Suspiciously small zip archive"
            );
            return true;
        }
        false
    }
}

/// Types whose bytes a browser or interpreter may treat as markup or code.
pub fn is_textual(content_type: &str) -> bool {
    let normalized = normalize_mime_type(content_type);
    normalized.starts_with("text/")
        || normalized.ends_with("+xml")
        || matches!(
            normalized.as_str(),
            "application/xml" | "application/json" | "application/javascript"
        )
}
