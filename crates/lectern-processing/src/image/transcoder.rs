use image::{DynamicImage, GenericImageView, ImageReader};
use lectern_core::{ImageProcessingSettings, IngestError, IngestResult, TranscodeResult};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::encode::{ImageEncoder, OutputFormat};
use super::metadata::ExifSummary;
use super::resize::{ImageResize, ThumbnailSize};
use crate::validator::file_extension;

pub const THUMBNAIL_DIR: &str = "thumbnails";

const MAX_DECODE_DIMENSION: u32 = 16_384;
const MAX_DECODE_ALLOC: u64 = 512 * 1024 * 1024;

/// Normalizes an accepted image in place and renders its thumbnails.
#[derive(Debug, Clone)]
pub struct ImageTranscoder {
    settings: ImageProcessingSettings,
    upload_dir: PathBuf,
}

impl ImageTranscoder {
    pub fn new(settings: ImageProcessingSettings, upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            settings,
            upload_dir: upload_dir.into(),
        }
    }

    pub fn settings(&self) -> &ImageProcessingSettings {
        &self.settings
    }

    pub fn thumbnail_dir(&self) -> PathBuf {
        self.upload_dir.join(THUMBNAIL_DIR)
    }

    /// Decode with allocation and dimension limits so a decompression bomb
    /// fails instead of exhausting memory.
    pub fn decode(data: &[u8]) -> IngestResult<DynamicImage> {
        let mut reader = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|e| IngestError::ImageDecode(e.to_string()))?;

        let mut limits = image::Limits::default();
        limits.max_image_width = Some(MAX_DECODE_DIMENSION);
        limits.max_image_height = Some(MAX_DECODE_DIMENSION);
        limits.max_alloc = Some(MAX_DECODE_ALLOC);
        reader.limits(limits);

        reader
            .decode()
            .map_err(|e| IngestError::ImageDecode(e.to_string()))
    }

    /// Runs [`Self::transcode_blocking`] on the blocking pool.
    pub async fn transcode(&self, source: PathBuf, stored_name: String) -> IngestResult<TranscodeResult> {
        let transcoder = self.clone();
        tokio::task::spawn_blocking(move || transcoder.transcode_blocking(&source, &stored_name))
            .await?
    }

    /// Resize, strip and re-encode `source` in place, then write thumbnails
    /// named after `stored_name`. Thumbnail failures are logged and skipped.
    pub fn transcode_blocking(&self, source: &Path, stored_name: &str) -> IngestResult<TranscodeResult> {
        let start = Instant::now();
        let data = std::fs::read(source)?;
        let exif = ExifSummary::read(&data);
        let mut img = Self::decode(&data)?;
        drop(data);

        let format = file_extension(stored_name)
            .and_then(|ext| OutputFormat::from_extension(&ext))
            .ok_or_else(|| {
                IngestError::ImageProcessing(format!("Unsupported image format: {}", stored_name))
            })?;

        let (orig_width, orig_height) = img.dimensions();

        if self.settings.strip_metadata && exif.orientation != 1 {
            img = exif.apply_orientation(img);
        }

        let mut resized = false;
        if self.settings.resize_enabled {
            let (width, height) = img.dimensions();
            if let Some((new_width, new_height)) =
                ImageResize::fit_within(width, height, self.settings.max_width, self.settings.max_height)
            {
                tracing::debug!(
                    from_width = width,
                    from_height = height,
                    to_width = new_width,
                    to_height = new_height,
                    "Resizing image"
                );
                img = ImageResize::resize_image(&img, new_width, new_height);
                resized = true;
            }
        }

        let mut metadata_stripped = false;
        if self.settings.strip_metadata {
            img = ImageResize::redraw(&img);
            metadata_stripped = true;
        }

        if resized || metadata_stripped {
            let encoded = ImageEncoder::encode(&img, format, self.settings.quality)?;
            write_atomically(source, &encoded)?;
        }

        let thumbnails = if self.settings.thumbnails_enabled {
            self.generate_thumbnails(&img, stored_name, format)
        } else {
            Vec::new()
        };

        let (width, height) = img.dimensions();
        tracing::info!(
            stored_name = %stored_name,
            original_width = orig_width,
            original_height = orig_height,
            width,
            height,
            resized,
            metadata_stripped,
            had_exif = exif.present,
            thumbnails = thumbnails.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Image transcoded"
        );

        Ok(TranscodeResult {
            final_path: source.to_path_buf(),
            thumbnails,
            resized,
            metadata_stripped,
            width,
            height,
            format: format.to_mime_type().to_string(),
            had_exif: exif.present,
        })
    }

    /// Render every configured size. Returns paths relative to the upload root.
    pub fn generate_thumbnails(
        &self,
        img: &DynamicImage,
        stored_name: &str,
        format: OutputFormat,
    ) -> Vec<String> {
        let dir = self.thumbnail_dir();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::error!(error = %e, dir = %dir.display(), "Failed to create thumbnail directory");
            return Vec::new();
        }

        let mut generated = Vec::with_capacity(self.settings.thumbnail_sizes.len());
        for token in &self.settings.thumbnail_sizes {
            let size = match ThumbnailSize::parse(token) {
                Ok(size) => size,
                Err(e) => {
                    tracing::warn!(token = %token, error = %e, "Skipping invalid thumbnail size");
                    continue;
                }
            };

            let name = thumbnail_name(stored_name, size);
            let thumbnail = ImageResize::fit_on_canvas(img, size);
            let written = ImageEncoder::encode(&thumbnail, format, self.settings.quality)
                .and_then(|bytes| write_atomically(&dir.join(&name), &bytes));

            match written {
                Ok(()) => {
                    tracing::debug!(thumbnail = %name, "Generated thumbnail");
                    generated.push(format!("{}/{}", THUMBNAIL_DIR, name));
                }
                Err(e) => {
                    tracing::warn!(thumbnail = %name, error = %e, "Failed to generate thumbnail");
                }
            }
        }
        generated
    }

    /// Best-effort removal of thumbnails for an upload that was not kept.
    pub async fn remove_thumbnails(&self, relative_paths: &[String]) {
        for relative in relative_paths {
            let path = self.upload_dir.join(relative);
            if let Err(e) = tokio::fs::remove_file(&path).await {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove thumbnail");
            }
        }
    }
}

/// `{stem}_{W}x{H}.{ext}`, stable for a given stored name and size.
pub fn thumbnail_name(stored_name: &str, size: ThumbnailSize) -> String {
    let path = Path::new(stored_name);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(stored_name);
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("jpg");
    format!("{}_{}x{}.{}", stem, size.width, size.height, extension.to_lowercase())
}

/// Replace `path` without ever exposing a half-written file.
fn write_atomically(path: &Path, bytes: &[u8]) -> IngestResult<()> {
    let dir = path
        .parent()
        .ok_or_else(|| IngestError::Storage(format!("No parent directory for {}", path.display())))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| IngestError::from(e.error))?;
    Ok(())
}
