mod common;

use common::{config, files_under, request, DaemonMode, FakeDaemon};
use lectern_core::{ScanMethod, SecurityStatus, ThreatLevel};
use lectern_services::IngestionPipeline;
use std::sync::Arc;
use tempfile::tempdir;

#[tokio::test]
async fn test_safe_file_report() {
    let daemon = FakeDaemon::start(DaemonMode::Clean).await;
    let dir = tempdir().unwrap();
    let pipeline = IngestionPipeline::new(Arc::new(config(dir.path(), daemon.port)))
        .await
        .unwrap();

    let mut upload = request("invoice.pdf", "application/pdf", "document", b"%PDF-1.4 x".to_vec());
    let report = pipeline.check(&mut upload).await;

    assert_eq!(report.status, SecurityStatus::Safe);
    assert_eq!(report.threat_level, ThreatLevel::Low);
    assert!(report.issues.is_empty());
    assert_eq!(report.scan_method, Some(ScanMethod::Daemon));
    assert_eq!(report.size, 10);
    assert!(files_under(dir.path()).is_empty());
}

#[tokio::test]
async fn test_report_collects_every_issue() {
    let daemon = FakeDaemon::start(DaemonMode::Infected("Win.Trojan.Agent")).await;
    let dir = tempdir().unwrap();
    let pipeline = IngestionPipeline::new(Arc::new(config(dir.path(), daemon.port)))
        .await
        .unwrap();

    let mut upload = request("../evil.pdf", "application/pdf", "document", b"MZ\x90\x00".to_vec());
    let report = pipeline.check(&mut upload).await;

    assert_eq!(report.status, SecurityStatus::Blocked);
    assert_eq!(report.threat_level, ThreatLevel::High);
    assert!(report.issues.len() >= 4, "{:?}", report.issues);
    assert!(report.issues.iter().any(|i| i.contains("Win.Trojan.Agent")));
    assert_eq!(daemon.scans(), 1);
    // Check mode never stores or quarantines.
    assert!(files_under(dir.path()).is_empty());
}

#[tokio::test]
async fn test_unknown_category_is_reported() {
    let daemon = FakeDaemon::start(DaemonMode::Clean).await;
    let dir = tempdir().unwrap();
    let pipeline = IngestionPipeline::new(Arc::new(config(dir.path(), daemon.port)))
        .await
        .unwrap();

    let mut upload = request("notes.txt", "text/plain", "secret", b"hi".to_vec());
    let report = pipeline.check(&mut upload).await;
    assert_eq!(report.status, SecurityStatus::Blocked);
    assert_eq!(report.issues.len(), 1);
}
