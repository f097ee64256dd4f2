//! What happens to a file once the scanner calls it infected.

use chrono::Utc;
use lectern_core::{Disposition, IngestConfig, IngestError, IngestResult, ScanResult, VirusAction};
use lectern_processing::sanitize_filename;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

const QUARANTINE_SUFFIX: &str = ".quarantine";
const REPORT_SUFFIX: &str = ".info";
const MAX_QUARANTINE_NAME_LEN: usize = 200;
const MAX_NAME_ATTEMPTS: u32 = 100;

/// Applies the configured [`VirusAction`] to infected files.
///
/// Exactly one action runs per infected verdict. A failed quarantine leaves
/// the original in place and surfaces [`IngestError::QuarantineFailed`].
#[derive(Debug, Clone)]
pub struct DispositionHandler {
    quarantine_dir: PathBuf,
    action: VirusAction,
}

impl DispositionHandler {
    pub fn new(quarantine_dir: impl Into<PathBuf>, action: VirusAction) -> Self {
        Self {
            quarantine_dir: quarantine_dir.into(),
            action,
        }
    }

    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(config.quarantine_path(), config.virus_scan.action)
    }

    pub fn action(&self) -> VirusAction {
        self.action
    }

    pub fn quarantine_dir(&self) -> &Path {
        &self.quarantine_dir
    }

    /// `Ok(None)` for anything that is not an infected verdict, including
    /// scan errors. `Reject` surfaces [`IngestError::VirusDetected`] and leaves
    /// the file where it is.
    pub async fn handle(
        &self,
        scan: &ScanResult,
        path: &Path,
        original_filename: &str,
    ) -> IngestResult<Option<Disposition>> {
        if !scan.infected {
            return Ok(None);
        }

        let threat = scan.threat_name.as_deref().unwrap_or("Unknown");
        tracing::warn!(
            filename = %original_filename,
            threat = %threat,
            method = scan.method.label(),
            action = ?self.action,
            "Virus detected"
        );

        match self.action {
            VirusAction::Delete => {
                match fs::remove_file(path).await {
                    Ok(()) => tracing::info!(path = %path.display(), "Infected file deleted"),
                    Err(e) => tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to delete infected file"
                    ),
                }
                Ok(Some(Disposition::Deleted))
            }
            VirusAction::Quarantine => {
                let (quarantined, report) = self.quarantine(scan, path, original_filename).await?;
                Ok(Some(Disposition::Quarantined {
                    path: quarantined,
                    report_path: report,
                }))
            }
            VirusAction::Reject => Err(IngestError::VirusDetected(threat.to_string())),
        }
    }

    async fn quarantine(
        &self,
        scan: &ScanResult,
        path: &Path,
        original_filename: &str,
    ) -> IngestResult<(PathBuf, PathBuf)> {
        let failed = |reason: String| IngestError::QuarantineFailed {
            path: path.display().to_string(),
            reason,
        };

        fs::create_dir_all(&self.quarantine_dir)
            .await
            .map_err(|e| failed(format!("cannot create quarantine directory: {}", e)))?;

        let target = self
            .reserve_name(original_filename)
            .await
            .map_err(|e| failed(format!("cannot reserve quarantine entry: {}", e)))?;

        if let Err(rename_err) = fs::rename(path, &target).await {
            tracing::debug!(error = %rename_err, "Rename into quarantine failed, copying instead");
            if let Err(copy_err) = fs::copy(path, &target).await {
                let _ = fs::remove_file(&target).await;
                tracing::error!(
                    path = %path.display(),
                    error = %copy_err,
                    "Failed to quarantine infected file"
                );
                return Err(failed(copy_err.to_string()));
            }
            if let Err(e) = fs::remove_file(path).await {
                tracing::error!(
                    path = %path.display(),
                    error = %e,
                    "Infected file copied to quarantine but original could not be removed"
                );
            }
        }

        let report_path = append_suffix(&target, REPORT_SUFFIX);
        fs::write(&report_path, quarantine_report(scan, path, original_filename))
            .await
            .map_err(|e| {
                tracing::error!(
                    report = %report_path.display(),
                    error = %e,
                    "Failed to write quarantine report"
                );
                failed(format!("quarantine report not written: {}", e))
            })?;

        tracing::info!(
            from = %path.display(),
            to = %target.display(),
            "File quarantined"
        );
        Ok((target, report_path))
    }

    /// Create an empty placeholder so concurrent quarantines never share a name.
    async fn reserve_name(&self, original_filename: &str) -> io::Result<PathBuf> {
        let millis = Utc::now().timestamp_millis();
        let base = sanitize_filename(original_filename, MAX_QUARANTINE_NAME_LEN);

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                format!("{}_{}{}", millis, base, QUARANTINE_SUFFIX)
            } else {
                format!("{}_{}_{}{}", millis, attempt, base, QUARANTINE_SUFFIX)
            };
            let candidate = self.quarantine_dir.join(name);
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
                .await
            {
                Ok(_) => return Ok(candidate),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }
        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "no free quarantine name",
        ))
    }
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn quarantine_report(scan: &ScanResult, path: &Path, original_filename: &str) -> String {
    format!(
        "Original file: {}\nOriginal filename: {}\nVirus detected: {}\nThreat level: {:?}\n\
Scan started: {}\nScan finished: {}\nScan method: {}\n",
        path.display(),
        original_filename,
        scan.threat_name.as_deref().unwrap_or("Unknown"),
        scan.threat_level,
        scan.started_at.to_rfc3339(),
        scan.finished_at.to_rfc3339(),
        scan.method.label(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectern_core::{ErrorKind, ScanMethod, ThreatLevel};
    use tempfile::tempdir;

    fn infected() -> ScanResult {
        ScanResult::infected(
            ScanMethod::Daemon,
            "Eicar-Test-Signature",
            ThreatLevel::High,
            "stream: Eicar-Test-Signature FOUND",
            Utc::now(),
        )
    }

    fn write_file(dir: &Path, content: &[u8]) -> PathBuf {
        let path = dir.join("upload-1.part");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_clean_is_noop() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), b"clean");
        let handler = DispositionHandler::new(dir.path().join("q"), VirusAction::Delete);

        let clean = ScanResult::clean(ScanMethod::Daemon, "stream: OK", Utc::now());
        assert_eq!(handler.handle(&clean, &path, "a.txt").await.unwrap(), None);

        let failed = ScanResult::failed(ScanMethod::Daemon, "timeout", Utc::now());
        assert_eq!(handler.handle(&failed, &path, "a.txt").await.unwrap(), None);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_delete() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), b"bad");
        let handler = DispositionHandler::new(dir.path().join("q"), VirusAction::Delete);

        let disposition = handler.handle(&infected(), &path, "a.txt").await.unwrap();
        assert_eq!(disposition, Some(Disposition::Deleted));
        assert!(!path.exists());
        assert!(!dir.path().join("q").exists());
    }

    #[tokio::test]
    async fn test_quarantine_moves_and_writes_report() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), b"bad bytes");
        let quarantine_dir = dir.path().join("quarantine");
        let handler = DispositionHandler::new(&quarantine_dir, VirusAction::Quarantine);

        let disposition = handler
            .handle(&infected(), &path, "homework.docx")
            .await
            .unwrap();

        let (quarantined, report) = match disposition {
            Some(Disposition::Quarantined { path, report_path }) => (path, report_path),
            other => panic!("unexpected disposition: {:?}", other),
        };
        assert!(!path.exists());
        assert!(quarantined.starts_with(&quarantine_dir));
        assert!(quarantined
            .to_string_lossy()
            .ends_with("_homework.docx.quarantine"));
        assert_eq!(std::fs::read(&quarantined).unwrap(), b"bad bytes");

        let report = std::fs::read_to_string(&report).unwrap();
        assert!(report.contains(&path.display().to_string()));
        assert!(report.contains("Eicar-Test-Signature"));
        assert!(report.contains("Scan method: ClamAV"));
    }

    #[tokio::test]
    async fn test_quarantine_names_never_collide() {
        let dir = tempdir().unwrap();
        let handler =
            DispositionHandler::new(dir.path().join("quarantine"), VirusAction::Quarantine);

        let mut targets = Vec::new();
        for i in 0..3 {
            let path = dir.path().join(format!("upload-{}.part", i));
            std::fs::write(&path, b"bad").unwrap();
            match handler.handle(&infected(), &path, "same.txt").await.unwrap() {
                Some(Disposition::Quarantined { path, .. }) => targets.push(path),
                other => panic!("unexpected disposition: {:?}", other),
            }
        }
        targets.sort();
        targets.dedup();
        assert_eq!(targets.len(), 3);
    }

    #[tokio::test]
    async fn test_reject_leaves_file() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), b"bad");
        let handler = DispositionHandler::new(dir.path().join("q"), VirusAction::Reject);

        let err = handler.handle(&infected(), &path, "a.txt").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::VirusDetected);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_failed_quarantine_keeps_original() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), b"bad");
        // A regular file where the quarantine directory should be.
        let blocker = dir.path().join("quarantine");
        std::fs::write(&blocker, b"").unwrap();
        let handler = DispositionHandler::new(&blocker, VirusAction::Quarantine);

        let err = handler.handle(&infected(), &path, "a.txt").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::QuarantineFailed);
        assert!(path.exists());
    }
}
