mod common;

use common::{config, files_under, jpeg, request, DaemonMode, FakeDaemon};
use lectern_core::{
    Disposition, ErrorKind, IngestConfig, ScanErrorPolicy, ScanMethod, VirusAction,
    SECURITY_REJECTED_CODE,
};
use lectern_processing::security::resolve_category;
use lectern_processing::SecurityChain;
use lectern_services::IngestionPipeline;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

async fn pipeline(config: IngestConfig) -> IngestionPipeline {
    IngestionPipeline::new(Arc::new(config)).await.unwrap()
}

/// The check that turns an upload away before scanning, as seen in the logs.
fn rejected_by(
    config: &IngestConfig,
    filename: &str,
    content_type: &str,
    category: &str,
    body: &[u8],
) -> Option<ErrorKind> {
    let chain = SecurityChain::from_config(config).unwrap();
    let profile = resolve_category(config, category).unwrap();
    let header = &body[..body.len().min(chain.header_len())];
    chain
        .check_declared(filename, content_type, body.len() as u64, profile)
        .and_then(|_| chain.check_content(header, content_type))
        .err()
        .map(|e| e.kind())
}

#[tokio::test]
async fn test_pdf_is_stored_after_clean_scan() {
    let daemon = FakeDaemon::start(DaemonMode::Clean).await;
    let dir = tempdir().unwrap();
    let config = config(dir.path(), daemon.port);
    let staging = config.staging_path();
    let pipeline = pipeline(config).await;

    let body = b"%PDF-1.4\n1 0 obj << /Type /Catalog >> endobj\n".to_vec();
    let mut upload = request("invoice.pdf", "application/pdf", "document", body.clone());
    let result = pipeline.ingest(&mut upload).await;

    assert!(result.success, "{:?}", result);
    assert_eq!(result.scan_method, Some(ScanMethod::Daemon));
    assert!(!result.advisory_scan());
    assert_eq!(result.mime_type, "application/pdf");
    assert_eq!(result.size, body.len() as u64);

    let path = result.path.unwrap();
    assert!(path.starts_with("documents/invoice_"));
    assert!(path.ends_with(".pdf"));
    assert_eq!(std::fs::read(dir.path().join(&path)).unwrap(), body);
    assert_eq!(daemon.scans(), 1);
    assert!(files_under(&staging).is_empty());
}

#[tokio::test]
async fn test_large_photo_is_resized_with_thumbnails() {
    let daemon = FakeDaemon::start(DaemonMode::Clean).await;
    let dir = tempdir().unwrap();
    let mut config = config(dir.path(), daemon.port);
    config.image.max_width = 1920;
    config.image.max_height = 1080;
    config.image.thumbnail_sizes = vec!["150x150".to_string(), "400x400".to_string()];
    if let Some(image) = config.categories.get_mut("image") {
        image.max_file_size = 64 * 1024 * 1024;
    }
    let pipeline = pipeline(config).await;

    let mut upload = request("photo.jpg", "image/jpeg", "image", jpeg(4000, 3000));
    let result = pipeline.ingest(&mut upload).await;
    assert!(result.success, "{:?}", result);

    let stored = dir.path().join(result.path.as_deref().unwrap());
    let (width, height) = image::image_dimensions(&stored).unwrap();
    assert!(width <= 1920 && height <= 1080);
    assert_eq!((width, height), (1440, 1080));

    let transcode = result.transcode.as_ref().unwrap();
    assert!(transcode.resized);
    assert!(transcode.metadata_stripped);
    assert_eq!(transcode.final_path, stored);

    assert_eq!(result.thumbnails.len(), 2);
    for (thumbnail, bound) in result.thumbnails.iter().zip([150u32, 400]) {
        assert!(thumbnail.starts_with("thumbnails/photo_"));
        let (w, h) = image::image_dimensions(dir.path().join(thumbnail)).unwrap();
        assert!(w <= bound && h <= bound);
    }
}

#[tokio::test]
async fn test_php_shell_never_reaches_scan() {
    let daemon = FakeDaemon::start(DaemonMode::Clean).await;
    let dir = tempdir().unwrap();
    let body = b"<?php system($_GET['cmd']); ?>".to_vec();

    // Default deny-list catches the name first.
    let default_config = config(dir.path(), daemon.port);
    assert_eq!(
        rejected_by(&default_config, "shell.php", "text/plain", "document", &body),
        Some(ErrorKind::BlockedFilename)
    );
    let pipeline_default = pipeline(default_config).await;
    let mut upload = request("shell.php", "text/plain", "document", body.clone());
    let result = pipeline_default.ingest(&mut upload).await;
    assert!(!result.success);
    assert_eq!(result.error_code.as_deref(), Some(SECURITY_REJECTED_CODE));

    // With the name allowed, the content heuristics catch it.
    let mut permissive = config(dir.path(), daemon.port);
    permissive.security.blocked_filename_patterns.clear();
    if let Some(document) = permissive.categories.get_mut("document") {
        document.allowed_extensions.push("php".to_string());
    }
    assert_eq!(
        rejected_by(&permissive, "shell.php", "text/plain", "document", &body),
        Some(ErrorKind::ScriptInjection)
    );
    let pipeline_permissive = pipeline(permissive).await;
    let mut upload = request("shell.php", "text/plain", "document", body);
    let result = pipeline_permissive.ingest(&mut upload).await;
    assert!(!result.success);
    assert_eq!(result.error_code.as_deref(), Some(SECURITY_REJECTED_CODE));
    assert_eq!(result.error.as_deref(), Some("File failed security requirements"));
    assert!(result.scan_method.is_none());

    assert_eq!(daemon.scans(), 0);
    assert!(!dir.path().join("documents").exists());
}

#[tokio::test]
async fn test_executable_declared_as_pdf_is_rejected() {
    let daemon = FakeDaemon::start(DaemonMode::Clean).await;
    let dir = tempdir().unwrap();
    let mut pe = b"MZ\x90\x00\x03\x00\x00\x00\x04\x00\x00\x00\xff\xff".to_vec();
    pe.resize(512, 0);

    // Signature verification runs first when enabled.
    let default_config = config(dir.path(), daemon.port);
    assert_eq!(
        rejected_by(&default_config, "report.pdf", "application/pdf", "document", &pe),
        Some(ErrorKind::SignatureMismatch)
    );
    let pipeline_default = pipeline(default_config).await;
    let mut upload = request("report.pdf", "application/pdf", "document", pe.clone());
    let result = pipeline_default.ingest(&mut upload).await;
    assert_eq!(result.error_code.as_deref(), Some(SECURITY_REJECTED_CODE));

    let mut no_signatures = config(dir.path(), daemon.port);
    no_signatures.security.enable_content_validation = false;
    assert_eq!(
        rejected_by(&no_signatures, "report.pdf", "application/pdf", "document", &pe),
        Some(ErrorKind::ExecutableContent)
    );
    let pipeline_heuristics = pipeline(no_signatures).await;
    let mut upload = request("report.pdf", "application/pdf", "document", pe);
    let result = pipeline_heuristics.ingest(&mut upload).await;
    assert!(!result.success);
    assert_eq!(result.error_code.as_deref(), Some(SECURITY_REJECTED_CODE));
    assert_eq!(result.error.as_deref(), Some("File failed security requirements"));

    assert_eq!(daemon.scans(), 0);
}

#[tokio::test]
async fn test_unresponsive_daemon_is_a_scan_error() {
    let daemon = FakeDaemon::start(DaemonMode::Hang).await;
    let dir = tempdir().unwrap();
    let config = config(dir.path(), daemon.port);
    let staging = config.staging_path();
    let pipeline = pipeline(config).await;

    let mut upload = request("notes.txt", "text/plain", "document", b"lesson plan".to_vec());
    let result = pipeline.ingest(&mut upload).await;

    assert!(!result.success);
    assert_eq!(result.error_code.as_deref(), Some("SCAN_FAILED"));
    assert_eq!(result.scan_method, Some(ScanMethod::Daemon));
    assert!(result.disposition.is_none());
    assert!(!dir.path().join("documents").exists());
    assert!(files_under(&staging).is_empty());
}

#[tokio::test]
async fn test_continue_policy_accepts_without_verdict() {
    let daemon = FakeDaemon::start(DaemonMode::Hang).await;
    let dir = tempdir().unwrap();
    let mut config = config(dir.path(), daemon.port);
    config.virus_scan.on_error = ScanErrorPolicy::Continue;
    let pipeline = pipeline(config).await;

    let mut upload = request("notes.txt", "text/plain", "document", b"lesson plan".to_vec());
    let result = pipeline.ingest(&mut upload).await;
    assert!(result.success, "{:?}", result);
    assert_eq!(result.scan_method, Some(ScanMethod::Daemon));
}

#[tokio::test]
async fn test_infected_upload_is_quarantined() {
    let daemon = FakeDaemon::start(DaemonMode::Infected("Eicar-Test-Signature")).await;
    let dir = tempdir().unwrap();
    let config = config(dir.path(), daemon.port);
    let quarantine_dir = config.quarantine_path();
    let pipeline = pipeline(config).await;

    let body = b"X5O!P%@AP[4\\PZX54(P^)7CC)7}$EICAR".to_vec();
    let mut upload = request("homework.txt", "text/plain", "document", body.clone());
    let result = pipeline.ingest(&mut upload).await;

    assert!(!result.success);
    assert_eq!(result.error_code.as_deref(), Some(SECURITY_REJECTED_CODE));
    assert_eq!(result.error.as_deref(), Some("File failed security requirements"));
    assert!(result.path.is_none());

    let (quarantined, report) = match result.disposition {
        Some(Disposition::Quarantined { path, report_path }) => (path, report_path),
        other => panic!("unexpected disposition: {:?}", other),
    };
    assert!(quarantined.starts_with(&quarantine_dir));
    assert_eq!(std::fs::read(&quarantined).unwrap(), body);

    let report = std::fs::read_to_string(report).unwrap();
    assert!(report.contains("Eicar-Test-Signature"));
    assert!(report.contains("Original filename: homework.txt"));
    assert!(!dir.path().join("documents").exists());
}

#[tokio::test]
async fn test_reject_action_discards_staged_bytes() {
    let daemon = FakeDaemon::start(DaemonMode::Infected("Win.Test")).await;
    let dir = tempdir().unwrap();
    let mut config = config(dir.path(), daemon.port);
    config.virus_scan.action = VirusAction::Reject;
    let staging = config.staging_path();
    let pipeline = pipeline(config).await;

    let mut upload = request("notes.txt", "text/plain", "document", b"payload".to_vec());
    let result = pipeline.ingest(&mut upload).await;
    assert_eq!(result.error_code.as_deref(), Some(SECURITY_REJECTED_CODE));
    assert_eq!(result.disposition, Some(Disposition::Rejected));
    assert!(files_under(&staging).is_empty());
    assert!(!dir.path().join("quarantine").exists());
}

#[tokio::test]
async fn test_fallback_scan_when_daemon_disabled() {
    let dir = tempdir().unwrap();
    let mut config = config(dir.path(), 1);
    config.virus_scan.daemon_enabled = false;
    config.virus_scan.action = VirusAction::Delete;
    let pipeline = pipeline(config).await;

    let mut upload = request(
        "report.pdf",
        "application/pdf",
        "document",
        b"%PDF-1.4 /JS (eval(unescape(x)))".to_vec(),
    );
    let result = pipeline.ingest(&mut upload).await;
    assert!(!result.success);
    assert_eq!(result.scan_method, Some(ScanMethod::Fallback));
    assert_eq!(result.disposition, Some(Disposition::Deleted));

    let mut upload = request("clean.pdf", "application/pdf", "document", b"%PDF-1.4 ok".to_vec());
    let result = pipeline.ingest(&mut upload).await;
    assert!(result.success);
    assert!(result.advisory_scan());
}

#[tokio::test]
async fn test_traversal_writes_nothing() {
    let daemon = FakeDaemon::start(DaemonMode::Clean).await;
    let dir = tempdir().unwrap();
    let config = config(dir.path(), daemon.port);
    let names = ["../../etc/passwd.txt", "..%2f..%2fsecret.txt", "%252e%252e%252fx.txt", "/etc/notes.txt"];
    for name in names {
        assert_eq!(
            rejected_by(&config, name, "text/plain", "document", b"hello"),
            Some(ErrorKind::PathTraversal),
            "{}",
            name
        );
    }
    let pipeline = pipeline(config).await;

    for name in names {
        let mut upload = request(name, "text/plain", "document", b"hello".to_vec());
        let result = pipeline.ingest(&mut upload).await;
        assert!(!result.success, "{} was accepted", name);
        assert_eq!(result.error_code.as_deref(), Some(SECURITY_REJECTED_CODE), "{}", name);
    }
    assert!(files_under(dir.path()).is_empty());
    assert_eq!(daemon.scans(), 0);
}

#[tokio::test]
async fn test_double_dots_inside_a_name_are_stored() {
    let daemon = FakeDaemon::start(DaemonMode::Clean).await;
    let dir = tempdir().unwrap();
    let pipeline = pipeline(config(dir.path(), daemon.port)).await;

    let mut upload = request("report..final.pdf", "application/pdf", "document", b"%PDF-1.4 ok".to_vec());
    let result = pipeline.ingest(&mut upload).await;

    assert!(result.success, "{:?}", result);
    let path = result.path.unwrap();
    assert!(path.starts_with("documents/report..final_"));
    assert_eq!(std::fs::read(dir.path().join(&path)).unwrap(), b"%PDF-1.4 ok");
    assert_eq!(daemon.scans(), 1);
}

#[tokio::test]
async fn test_cancelled_ingest_leaves_no_staged_file() {
    let daemon = FakeDaemon::start(DaemonMode::Hang).await;
    let dir = tempdir().unwrap();
    let mut config = config(dir.path(), daemon.port);
    config.virus_scan.timeout_secs = 30;
    let staging = config.staging_path();
    let pipeline = pipeline(config).await;

    let mut upload = request("notes.txt", "text/plain", "document", b"lesson plan".to_vec());
    let outcome = tokio::time::timeout(Duration::from_millis(300), pipeline.ingest(&mut upload)).await;
    assert!(outcome.is_err(), "ingest finished before the deadline");

    assert!(files_under(&staging).is_empty());
    assert!(!dir.path().join("documents").exists());
}

#[tokio::test]
async fn test_actual_size_is_bounded() {
    let daemon = FakeDaemon::start(DaemonMode::Clean).await;
    let dir = tempdir().unwrap();
    let mut config = config(dir.path(), daemon.port);
    if let Some(document) = config.categories.get_mut("document") {
        document.max_file_size = 1024;
    }
    let pipeline = pipeline(config).await;

    let mut body = b"%PDF-1.4 ".to_vec();
    body.resize(4096, b'a');
    let mut upload = request("big.pdf", "application/pdf", "document", body);
    // Declared size lies.
    upload.size = 100;

    let result = pipeline.ingest(&mut upload).await;
    assert_eq!(result.error_code.as_deref(), Some("FILE_TOO_LARGE"));
    assert!(files_under(dir.path()).is_empty());
    assert_eq!(daemon.scans(), 0);
}

#[tokio::test]
async fn test_required_image_processing_failure_is_fatal() {
    let daemon = FakeDaemon::start(DaemonMode::Clean).await;
    let dir = tempdir().unwrap();
    let pipeline = pipeline(config(dir.path(), daemon.port)).await;

    let mut broken = b"\x89PNG\r\n\x1a\n".to_vec();
    broken.extend_from_slice(&[0u8; 64]);

    let mut upload = request("me.png", "image/png", "avatar", broken.clone());
    let result = pipeline.ingest(&mut upload).await;
    assert!(!result.success);
    assert_eq!(result.error_code.as_deref(), Some("IMAGE_DECODE_ERROR"));
    assert!(!dir.path().join("avatars").exists());

    // The plain image category keeps the original bytes.
    let mut upload = request("scan.png", "image/png", "image", broken.clone());
    let result = pipeline.ingest(&mut upload).await;
    assert!(result.success, "{:?}", result);
    assert!(result.transcode.is_none());
    let stored = dir.path().join(result.path.unwrap());
    assert_eq!(std::fs::read(stored).unwrap(), broken);
}

#[tokio::test]
async fn test_ingest_many_preserves_order() {
    let daemon = FakeDaemon::start(DaemonMode::Clean).await;
    let dir = tempdir().unwrap();
    let pipeline = pipeline(config(dir.path(), daemon.port)).await;

    let mut uploads = vec![
        request("a.txt", "text/plain", "document", b"first".to_vec()),
        request("b.exe", "application/x-msdownload", "document", b"MZ".to_vec()),
        request("c.txt", "text/plain", "document", b"third".to_vec()),
    ];
    let results = pipeline.ingest_many(&mut uploads).await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].original_filename, "a.txt");
    assert!(results[0].success);
    assert!(!results[1].success);
    assert!(results[2].success);
    assert_ne!(results[0].path, results[2].path);
}

#[tokio::test]
async fn test_duplicate_names_do_not_collide() {
    let daemon = FakeDaemon::start(DaemonMode::Clean).await;
    let dir = tempdir().unwrap();
    let pipeline = pipeline(config(dir.path(), daemon.port)).await;

    let mut first = request("notes.txt", "text/plain", "document", b"one".to_vec());
    let mut second = request("notes.txt", "text/plain", "document", b"two".to_vec());
    let a = pipeline.ingest(&mut first).await;
    let b = pipeline.ingest(&mut second).await;
    assert!(a.success && b.success);
    assert_ne!(a.path, b.path);
}
