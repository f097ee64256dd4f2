//! "Check without storing" mode for administrative tooling.

use chrono::Utc;
use lectern_core::{
    FileSecurityReport, ScanErrorPolicy, ScanMethod, SecurityStatus, ThreatLevel, UploadRequest,
};
use lectern_processing::normalize_mime_type;
use lectern_processing::security::resolve_category;
use tokio::io::AsyncRead;

use super::IngestionPipeline;

impl IngestionPipeline {
    /// Run every check against an upload without storing it.
    ///
    /// Unlike [`IngestionPipeline::ingest`] nothing short-circuits: all
    /// failing checks are listed, and the bytes are always scanned. The staged
    /// copy is removed before this returns.
    pub async fn check<R>(&self, request: &mut UploadRequest<R>) -> FileSecurityReport
    where
        R: AsyncRead + Unpin + Send,
    {
        let scan_timestamp = Utc::now();
        let filename = request.original_filename.as_str();
        let mime_type = normalize_mime_type(&request.content_type);

        let mut issues: Vec<String> = Vec::new();
        let mut threat_level = ThreatLevel::None;
        let mut size = request.size;
        let mut scan_method: Option<ScanMethod> = None;

        let category = resolve_category(&self.config, &request.category);
        let limit = match &category {
            Ok(category) => category.max_file_size,
            Err(_) => self.largest_category_limit(),
        };

        match lectern_processing::peek_prefix(&mut request.body, self.chain.header_len()).await {
            Ok((header, body)) => {
                match category {
                    Ok(category) => {
                        let verdict = self.chain.evaluate(
                            filename,
                            &request.content_type,
                            request.size,
                            category,
                            &header,
                        );
                        issues.extend(verdict.issues().iter().map(|issue| issue.detail.clone()));
                    }
                    Err(e) => {
                        issues.push(e.to_string());
                        if let Err(e) = self.chain.check_content(&header, &request.content_type) {
                            issues.push(e.to_string());
                        }
                    }
                }
                if !issues.is_empty() {
                    threat_level = ThreatLevel::High;
                }

                match self.staging.stage(body, limit).await {
                    Ok(staged) => {
                        size = staged.size();
                        let scan = self.scanner.scan_file(staged.path()).await;
                        scan_method = Some(scan.method);

                        if scan.infected {
                            issues.push(format!(
                                "Virus detected: {}",
                                scan.threat_name.as_deref().unwrap_or("Unknown")
                            ));
                            threat_level = threat_level.max(scan.threat_level);
                        } else if let Some(error) = &scan.error {
                            if self.config.virus_scan.on_error == ScanErrorPolicy::Reject {
                                issues.push(format!("Virus scan failed: {}", error));
                                threat_level = threat_level.max(ThreatLevel::Medium);
                            }
                        }
                    }
                    Err(e) => {
                        issues.push(e.to_string());
                        threat_level = threat_level.max(ThreatLevel::Medium);
                    }
                }
            }
            Err(e) => {
                issues.push(format!("Upload could not be read: {}", e));
                threat_level = ThreatLevel::Medium;
            }
        }

        let status = if issues.is_empty() {
            threat_level = ThreatLevel::Low;
            SecurityStatus::Safe
        } else {
            SecurityStatus::Blocked
        };

        tracing::info!(
            filename = %filename,
            status = ?status,
            threat_level = ?threat_level,
            issues = issues.len(),
            "Security check completed"
        );

        FileSecurityReport {
            filename: filename.to_string(),
            size,
            mime_type,
            status,
            threat_level,
            issues,
            scan_method,
            scan_timestamp,
        }
    }

    fn largest_category_limit(&self) -> u64 {
        self.config
            .categories
            .values()
            .map(|c| c.max_file_size)
            .max()
            .unwrap_or(0)
    }
}
