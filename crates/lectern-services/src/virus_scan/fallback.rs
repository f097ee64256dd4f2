//! Local pattern scan used when the daemon is disabled or unreachable.
//!
//! Only the first kilobyte is inspected. Findings are advisory.

use chrono::Utc;
use lectern_core::{ScanMethod, ScanResult, ThreatLevel};
use std::io;
use std::path::Path;
use tokio::io::AsyncReadExt;

pub const FALLBACK_WINDOW: usize = 1024;

const MALICIOUS_PATTERNS: &[&str] = &[
    "eval(",
    "exec(",
    "system(",
    "shell_exec(",
    "<script",
    "javascript:",
    "vbscript:",
    "<?php",
    "<%",
    "<jsp:",
    "cmd.exe",
    "powershell.exe",
    "wget ",
    "curl ",
    "nc -",
    "base64_decode",
    "gzinflate",
];

#[derive(Debug, Default, Clone, Copy)]
pub struct FallbackScanner;

impl FallbackScanner {
    /// Name of the first pattern found in `data`, if any.
    pub fn find_pattern(&self, data: &[u8]) -> Option<String> {
        let window = &data[..data.len().min(FALLBACK_WINDOW)];

        if window.starts_with(b"MZ") {
            return Some("Suspicious.Executable.PE".to_string());
        }
        if window.starts_with(b"\x7fELF") {
            return Some("Suspicious.Executable.ELF".to_string());
        }

        let text = String::from_utf8_lossy(window).to_lowercase();
        MALICIOUS_PATTERNS
            .iter()
            .find(|p| text.contains(*p))
            .map(|p| format!("Suspicious.Pattern[{}]", p.trim()))
    }

    pub fn scan_bytes(&self, data: &[u8]) -> ScanResult {
        let started = Utc::now();
        match self.find_pattern(data) {
            Some(name) => {
                tracing::warn!(pattern = %name, "Fallback scan matched a malicious pattern");
                ScanResult::infected(
                    ScanMethod::Fallback,
                    name.clone(),
                    ThreatLevel::Medium,
                    format!("pattern match: {}", name),
                    started,
                )
            }
            None => ScanResult::clean(ScanMethod::Fallback, "no pattern matched", started),
        }
    }

    pub async fn scan_file(&self, path: &Path) -> io::Result<ScanResult> {
        let file = tokio::fs::File::open(path).await?;
        let mut head = Vec::with_capacity(FALLBACK_WINDOW);
        file.take(FALLBACK_WINDOW as u64)
            .read_to_end(&mut head)
            .await?;
        Ok(self.scan_bytes(&head))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_content() {
        let result = FallbackScanner.scan_bytes(b"%PDF-1.4 quarterly report");
        assert!(result.is_clean());
        assert_eq!(result.method, ScanMethod::Fallback);
    }

    #[test]
    fn test_script_patterns() {
        let result = FallbackScanner.scan_bytes(b"<?PHP echo 1;");
        assert!(result.infected);
        assert_eq!(result.threat_level, ThreatLevel::Medium);
        assert_eq!(result.threat_name.as_deref(), Some("Suspicious.Pattern[<?php]"));

        assert!(FallbackScanner.scan_bytes(b"run: powershell.exe -enc").infected);
        assert!(FallbackScanner.scan_bytes(b"x = base64_decode($y)").infected);
    }

    #[test]
    fn test_executable_headers() {
        let result = FallbackScanner.scan_bytes(b"MZ\x90\x00");
        assert_eq!(result.threat_name.as_deref(), Some("Suspicious.Executable.PE"));
        assert!(FallbackScanner.scan_bytes(b"\x7fELF\x02").infected);
    }

    #[test]
    fn test_patterns_beyond_window_ignored() {
        let mut data = vec![b' '; FALLBACK_WINDOW];
        data.extend_from_slice(b"eval(");
        assert!(FallbackScanner.scan_bytes(&data).is_clean());
    }

    #[tokio::test]
    async fn test_scan_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"<script>alert(1)</script>").unwrap();
        let result = FallbackScanner.scan_file(&path).await.unwrap();
        assert!(result.infected);
    }
}
