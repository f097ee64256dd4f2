//! Declared-metadata checks that run before any content byte is read.

mod content_type;
mod filename;
mod path;

pub use content_type::{normalize_mime_type, ContentTypeGuard};
pub use filename::{file_extension, sanitize_filename, unique_filename, FilenameValidator};
pub use path::PathTraversalGuard;

use lectern_core::{CategoryProfile, IngestError, IngestResult};

/// Size and extension checks against one category profile.
pub struct UploadValidator<'a> {
    category: &'a CategoryProfile,
}

impl<'a> UploadValidator<'a> {
    pub fn new(category: &'a CategoryProfile) -> Self {
        Self { category }
    }

    /// Validate file size
    pub fn validate_file_size(&self, size: u64) -> IngestResult<()> {
        if size == 0 {
            return Err(IngestError::EmptyFile);
        }

        if size > self.category.max_file_size {
            return Err(IngestError::FileTooLarge {
                size,
                max: self.category.max_file_size,
            });
        }

        Ok(())
    }

    /// Validate file extension
    pub fn validate_extension(&self, filename: &str) -> IngestResult<()> {
        let extension = file_extension(filename).unwrap_or_default();

        if !self.category.allows_extension(&extension) {
            return Err(IngestError::DisallowedExtension {
                extension,
                category: self.category.name.clone(),
            });
        }

        Ok(())
    }

    /// Validate that the declared MIME type matches the file extension, so a
    /// `.exe` cannot be uploaded as `image/png` under a `.png` allow-list entry.
    pub fn validate_extension_content_type_match(
        &self,
        filename: &str,
        content_type: &str,
    ) -> IngestResult<()> {
        let extension = file_extension(filename).unwrap_or_default();
        let normalized = normalize_mime_type(content_type);

        let Some(expected) = expected_content_types(&extension) else {
            tracing::debug!(
                extension = %extension,
                content_type = %content_type,
                "Unknown extension, skipping Content-Type/extension cross-validation"
            );
            return Ok(());
        };

        if !expected.iter().any(|ct| *ct == normalized) {
            return Err(IngestError::ExtensionMismatch {
                extension,
                content_type: normalized,
            });
        }

        Ok(())
    }

    /// Extension allow-list, extension/MIME match and declared size.
    pub fn validate_all(&self, filename: &str, content_type: &str, size: u64) -> IngestResult<()> {
        self.validate_extension(filename)?;
        self.validate_extension_content_type_match(filename, content_type)?;
        self.validate_file_size(size)?;
        Ok(())
    }
}

/// Canonical MIME type for a well-known extension, for callers that only
/// have a filename.
pub fn guess_content_type(filename: &str) -> Option<&'static str> {
    let extension = file_extension(filename)?;
    expected_content_types(&extension).and_then(|types| types.first().copied())
}

fn expected_content_types(extension: &str) -> Option<&'static [&'static str]> {
    let expected: &'static [&'static str] = match extension {
        // Images
        "jpg" | "jpeg" => &["image/jpeg"],
        "png" => &["image/png"],
        "gif" => &["image/gif"],
        "webp" => &["image/webp"],
        "bmp" => &["image/bmp", "image/x-ms-bmp"],
        // Videos
        "mp4" => &["video/mp4"],
        "webm" => &["video/webm"],
        "mov" => &["video/quicktime"],
        "avi" => &["video/avi", "video/x-msvideo"],
        "wmv" => &["video/x-ms-wmv"],
        "flv" => &["video/x-flv"],
        // Audio
        "mp3" => &["audio/mpeg", "audio/mp3"],
        "wav" => &["audio/wav", "audio/wave", "audio/x-wav"],
        "ogg" => &["audio/ogg", "application/ogg"],
        "flac" => &["audio/flac"],
        "aac" => &["audio/aac"],
        // Documents
        "pdf" => &["application/pdf"],
        "doc" => &["application/msword"],
        "docx" => &["application/vnd.openxmlformats-officedocument.wordprocessingml.document"],
        "xls" => &["application/vnd.ms-excel"],
        "xlsx" => &["application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"],
        "ppt" => &["application/vnd.ms-powerpoint"],
        "pptx" => &["application/vnd.openxmlformats-officedocument.presentationml.presentation"],
        "txt" => &["text/plain"],
        // Archives
        "zip" => &["application/zip", "application/x-zip-compressed"],
        "rar" => &["application/x-rar-compressed", "application/vnd.rar"],
        "7z" => &["application/x-7z-compressed"],
        "tar" => &["application/x-tar"],
        "gz" => &["application/gzip", "application/x-gzip"],
        _ => return None,
    };
    Some(expected)
}
