//! Image normalization: resize, metadata strip, re-encode, thumbnails.

mod encode;
mod metadata;
mod resize;
mod transcoder;

pub use encode::{ImageEncoder, OutputFormat};
pub use metadata::ExifSummary;
pub use resize::{ImageResize, ThumbnailSize};
pub use transcoder::{thumbnail_name, ImageTranscoder, THUMBNAIL_DIR};

/// MIME types the transcoder knows how to decode and re-encode.
pub fn is_transcodable(content_type: &str) -> bool {
    matches!(
        crate::validator::normalize_mime_type(content_type).as_str(),
        "image/jpeg" | "image/png" | "image/gif" | "image/bmp" | "image/webp"
    )
}
