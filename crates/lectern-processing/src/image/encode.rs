use bytes::Bytes;
use image::{DynamicImage, GenericImageView, ImageFormat};
use lectern_core::{IngestError, IngestResult};
use std::io::Cursor;

/// Output encodings the transcoder writes back to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
    WebP,
    Gif,
    Bmp,
}

impl OutputFormat {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_lowercase().as_str() {
            "jpeg" | "jpg" => Some(OutputFormat::Jpeg),
            "png" => Some(OutputFormat::Png),
            "webp" => Some(OutputFormat::WebP),
            "gif" => Some(OutputFormat::Gif),
            "bmp" => Some(OutputFormat::Bmp),
            _ => None,
        }
    }

    pub fn to_mime_type(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::WebP => "image/webp",
            OutputFormat::Gif => "image/gif",
            OutputFormat::Bmp => "image/bmp",
        }
    }

    pub fn to_image_format(self) -> ImageFormat {
        match self {
            OutputFormat::Jpeg => ImageFormat::Jpeg,
            OutputFormat::Png => ImageFormat::Png,
            OutputFormat::WebP => ImageFormat::WebP,
            OutputFormat::Gif => ImageFormat::Gif,
            OutputFormat::Bmp => ImageFormat::Bmp,
        }
    }

    pub fn is_lossy(self) -> bool {
        matches!(self, OutputFormat::Jpeg | OutputFormat::WebP)
    }
}

/// Encodes decoded pixels. Lossy formats honor `quality` (0-100); lossless
/// formats ignore it.
pub struct ImageEncoder;

impl ImageEncoder {
    pub fn encode(img: &DynamicImage, format: OutputFormat, quality: u8) -> IngestResult<Bytes> {
        let quality = quality.min(100);
        match format {
            OutputFormat::Jpeg => Self::encode_jpeg(img, quality),
            OutputFormat::WebP => Self::encode_webp(img, quality),
            lossless => Self::encode_lossless(img, lossless.to_image_format()),
        }
    }

    /// Encode JPEG using mozjpeg
    fn encode_jpeg(img: &DynamicImage, quality: u8) -> IngestResult<Bytes> {
        let rgb_img = img.to_rgb8();
        let (width, height) = rgb_img.dimensions();

        let mut comp = mozjpeg::Compress::new(mozjpeg::ColorSpace::JCS_RGB);
        comp.set_size(width as usize, height as usize);
        comp.set_quality(quality as f32);
        comp.set_progressive_mode();
        comp.set_optimize_coding(true);

        let jpeg_err = |e: std::io::Error| IngestError::ImageProcessing(format!("JPEG encode failed: {}", e));
        let mut comp = comp.start_compress(Vec::new()).map_err(jpeg_err)?;
        comp.write_scanlines(rgb_img.as_raw()).map_err(jpeg_err)?;
        let jpeg_data = comp.finish().map_err(jpeg_err)?;

        Ok(Bytes::from(jpeg_data))
    }

    /// Encode WebP, quality mapped straight onto libwebp's 0-100 scale
    fn encode_webp(img: &DynamicImage, quality: u8) -> IngestResult<Bytes> {
        let (width, height) = img.dimensions();
        let rgba_img = img.to_rgba8();

        let encoder = webp::Encoder::from_rgba(&rgba_img, width, height);
        let webp_data = encoder.encode(quality as f32);

        Ok(Bytes::copy_from_slice(&webp_data))
    }

    fn encode_lossless(img: &DynamicImage, format: ImageFormat) -> IngestResult<Bytes> {
        let mut buffer = Vec::new();
        let mut cursor = Cursor::new(&mut buffer);

        // GIF and BMP encoders want 8-bit RGBA rather than whatever was decoded.
        let img = DynamicImage::ImageRgba8(img.to_rgba8());
        img.write_to(&mut cursor, format).map_err(|e| {
            IngestError::ImageProcessing(format!("{:?} encode failed: {}", format, e))
        })?;

        Ok(Bytes::from(buffer))
    }
}
