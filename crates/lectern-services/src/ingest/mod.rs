//! The ingestion orchestrator.
//!
//! One call to [`IngestionPipeline::ingest`] runs every stage for one upload:
//! declared-metadata checks, header checks, staging, virus scan, disposition,
//! image transcoding and promotion into the category directory. Nothing is
//! linked into a category directory until every stage has passed.

mod check;

use anyhow::Context;
use lectern_core::{
    CategoryProfile, Disposition, ErrorMetadata, IngestConfig, IngestError, IngestResult,
    IngestionResult, LogLevel, ScanErrorPolicy, ScanMethod, TranscodeResult, UploadRequest,
};
use lectern_processing::image::is_transcodable;
use lectern_processing::security::resolve_category;
use lectern_processing::{
    normalize_mime_type, peek_prefix, sanitize_filename, unique_filename, ImageTranscoder,
    SecurityChain,
};
use lectern_storage::{StagedUpload, StagingArea, UploadStore};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncRead;

use crate::disposition::DispositionHandler;
use crate::virus_scan::{VirusScanClient, VirusScanner};

/// Sequences the ingestion stages. Holds no per-request state, so one
/// instance serves any number of concurrent requests.
pub struct IngestionPipeline {
    config: Arc<IngestConfig>,
    chain: SecurityChain,
    scanner: Arc<dyn VirusScanner>,
    staging: StagingArea,
    store: UploadStore,
    transcoder: ImageTranscoder,
    disposition: DispositionHandler,
}

/// Why a request failed, plus whatever the pipeline learned before it did.
struct Rejection {
    error: IngestError,
    scan_method: Option<ScanMethod>,
    disposition: Option<Disposition>,
}

impl From<IngestError> for Rejection {
    fn from(error: IngestError) -> Self {
        Self {
            error,
            scan_method: None,
            disposition: None,
        }
    }
}

impl IngestionPipeline {
    /// Build a pipeline that scans with [`VirusScanClient`].
    pub async fn new(config: Arc<IngestConfig>) -> anyhow::Result<Self> {
        let scanner = Arc::new(VirusScanClient::new(config.virus_scan.clone()));
        Self::with_scanner(config, scanner).await
    }

    pub async fn with_scanner(
        config: Arc<IngestConfig>,
        scanner: Arc<dyn VirusScanner>,
    ) -> anyhow::Result<Self> {
        config.validate()?;

        let chain = SecurityChain::from_config(&config)
            .context("Failed to compile blocked filename patterns")?;
        let staging = StagingArea::new(config.staging_path())
            .await
            .context("Failed to initialize staging area")?;
        let store = UploadStore::new(&config.upload_dir)
            .await
            .context("Failed to initialize upload directory")?;
        let transcoder = ImageTranscoder::new(config.image.clone(), &config.upload_dir);
        let disposition = DispositionHandler::from_config(&config);

        tracing::info!(
            upload_dir = %config.upload_dir.display(),
            categories = config.categories.len(),
            scan_enabled = config.virus_scan.enabled,
            daemon_enabled = config.virus_scan.daemon_enabled,
            "Ingestion pipeline initialized"
        );

        Ok(Self {
            config,
            chain,
            scanner,
            staging,
            store,
            transcoder,
            disposition,
        })
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Ingest one upload. Failures are reported in the returned result, never
    /// as a panic or an `Err`.
    pub async fn ingest<R>(&self, request: &mut UploadRequest<R>) -> IngestionResult
    where
        R: AsyncRead + Unpin + Send,
    {
        let start = Instant::now();
        let mime_type = normalize_mime_type(&request.content_type);

        match self.run(request, &mime_type).await {
            Ok(result) => {
                tracing::info!(
                    filename = %request.original_filename,
                    category = %request.category,
                    path = result.path.as_deref().unwrap_or_default(),
                    size_bytes = result.size,
                    scan_method = result.scan_method.map(|m| m.label()).unwrap_or_default(),
                    thumbnails = result.thumbnails.len(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Upload ingested"
                );
                result
            }
            Err(rejection) => {
                log_rejection(&rejection.error, request);
                let mut result = IngestionResult::rejected(
                    request.original_filename.clone(),
                    request.size,
                    mime_type,
                    request.category.clone(),
                    &rejection.error,
                );
                result.scan_method = rejection.scan_method;
                result.disposition = rejection.disposition;
                result
            }
        }
    }

    /// Ingest independent uploads concurrently. Results are in input order.
    pub async fn ingest_many<R>(&self, requests: &mut [UploadRequest<R>]) -> Vec<IngestionResult>
    where
        R: AsyncRead + Unpin + Send,
    {
        futures::future::join_all(requests.iter_mut().map(|request| self.ingest(request))).await
    }

    async fn run<R>(
        &self,
        request: &mut UploadRequest<R>,
        mime_type: &str,
    ) -> Result<IngestionResult, Rejection>
    where
        R: AsyncRead + Unpin + Send,
    {
        let filename = request.original_filename.as_str();
        let category = resolve_category(&self.config, &request.category)?;

        self.chain
            .check_declared(filename, &request.content_type, request.size, category)?;

        let (header, body) = peek_prefix(&mut request.body, self.chain.header_len())
            .await
            .map_err(IngestError::from)?;
        self.chain.check_content(&header, &request.content_type)?;
        tracing::debug!(filename = %filename, "Security checks passed");

        let mut staged = self
            .staging
            .stage(body, category.max_file_size)
            .await
            .map_err(IngestError::from)?;
        if staged.size() == 0 {
            return Err(IngestError::EmptyFile.into());
        }
        self.chain
            .heuristics()
            .warn_if_suspicious_archive(filename, staged.size());

        let scan_method = self.scan(&staged, filename).await?;

        let stored_name = unique_filename(&sanitize_filename(
            filename,
            self.config.security.max_filename_length,
        ));

        let mut transcode = self
            .transcode(&mut staged, &stored_name, mime_type, category)
            .await
            .map_err(|error| Rejection {
                error,
                scan_method: Some(scan_method),
                disposition: None,
            })?;
        let thumbnails = transcode
            .as_ref()
            .map(|t| t.thumbnails.clone())
            .unwrap_or_default();

        let stored = match self
            .store
            .promote(staged, &category.upload_path, &stored_name)
            .await
        {
            Ok(stored) => stored,
            Err(e) => {
                self.transcoder.remove_thumbnails(&thumbnails).await;
                return Err(Rejection {
                    error: e.into(),
                    scan_method: Some(scan_method),
                    disposition: None,
                });
            }
        };

        let final_mime = transcode
            .as_ref()
            .map(|t| t.format.clone())
            .unwrap_or_else(|| mime_type.to_string());
        if let Some(t) = transcode.as_mut() {
            t.final_path = stored.path.clone();
        }

        let mut result = IngestionResult::stored(
            filename,
            stored.relative_path,
            stored.size,
            final_mime,
            category.name.clone(),
        );
        result.scan_method = Some(scan_method);
        result.thumbnails = thumbnails;
        result.transcode = transcode;
        Ok(result)
    }

    /// Scan the staged bytes and apply the scan-error policy and disposition.
    async fn scan(&self, staged: &StagedUpload, filename: &str) -> Result<ScanMethod, Rejection> {
        let scan = self.scanner.scan_file(staged.path()).await;
        let method = scan.method;

        if let Some(error) = &scan.error {
            match self.config.virus_scan.on_error {
                ScanErrorPolicy::Reject => {
                    return Err(Rejection {
                        error: IngestError::ScanFailed(error.clone()),
                        scan_method: Some(method),
                        disposition: None,
                    });
                }
                ScanErrorPolicy::Continue => {
                    tracing::warn!(
                        filename = %filename,
                        error = %error,
                        "No scan verdict, accepting upload under CONTINUE policy"
                    );
                    return Ok(method);
                }
            }
        }

        if !scan.infected {
            if method == ScanMethod::Fallback {
                tracing::debug!(filename = %filename, "Clean by advisory pattern scan only");
            }
            return Ok(method);
        }

        let threat = scan
            .threat_name
            .clone()
            .unwrap_or_else(|| "Unknown".to_string());
        let rejection = match self.disposition.handle(&scan, staged.path(), filename).await {
            Ok(disposition) => Rejection {
                error: IngestError::VirusDetected(threat),
                scan_method: Some(method),
                disposition,
            },
            Err(error @ IngestError::VirusDetected(_)) => Rejection {
                error,
                scan_method: Some(method),
                disposition: Some(Disposition::Rejected),
            },
            Err(error) => Rejection {
                error,
                scan_method: Some(method),
                disposition: None,
            },
        };
        Err(rejection)
    }

    /// Transcode the staged image in place when the category asks for it.
    /// A failed base transcode is fatal only for categories that require it.
    async fn transcode(
        &self,
        staged: &mut StagedUpload,
        stored_name: &str,
        mime_type: &str,
        category: &CategoryProfile,
    ) -> IngestResult<Option<TranscodeResult>> {
        if !category.process_images
            || !is_transcodable(mime_type)
            || !self.transcoder.settings().any_enabled()
        {
            return Ok(None);
        }

        let outcome = self
            .transcoder
            .transcode(staged.path().to_path_buf(), stored_name.to_string())
            .await;

        match outcome {
            Ok(result) => {
                if let Err(e) = staged.refresh_size().await {
                    self.transcoder.remove_thumbnails(&result.thumbnails).await;
                    return Err(e.into());
                }
                Ok(Some(result))
            }
            Err(e) if category.require_image_processing => Err(e),
            Err(e) => {
                tracing::warn!(
                    stored_name = %stored_name,
                    error = %e,
                    "Image transcoding failed, storing original bytes"
                );
                Ok(None)
            }
        }
    }
}

fn log_rejection<R>(error: &IngestError, request: &UploadRequest<R>) {
    let code = error.error_code();
    let filename = request.original_filename.as_str();
    let category = request.category.as_str();
    match error.log_level() {
        LogLevel::Debug => tracing::debug!(
            filename = %filename,
            category = %category,
            error_code = code,
            error = %error,
            "Upload rejected"
        ),
        LogLevel::Warn => tracing::warn!(
            filename = %filename,
            category = %category,
            error_code = code,
            error = %error,
            "Upload rejected"
        ),
        LogLevel::Error => tracing::error!(
            filename = %filename,
            category = %category,
            error_code = code,
            error = %error,
            "Upload failed"
        ),
    }
}
