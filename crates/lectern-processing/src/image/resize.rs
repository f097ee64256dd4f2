use image::{imageops, DynamicImage, GenericImageView, Rgba, RgbaImage};

/// Target box for a thumbnail, parsed from a `WxH` token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbnailSize {
    pub width: u32,
    pub height: u32,
}

impl ThumbnailSize {
    /// Parse dimensions from string format: "WxH". Both sides are required
    /// and must be non-zero.
    pub fn parse(s: &str) -> Result<Self, String> {
        let parts: Vec<&str> = s.trim().split(['x', 'X']).collect();

        if parts.len() != 2 {
            return Err(format!("Invalid thumbnail size '{}'. Expected: WxH", s));
        }

        let width = parts[0]
            .parse::<u32>()
            .map_err(|_| format!("Invalid width: {}", parts[0]))?;
        let height = parts[1]
            .parse::<u32>()
            .map_err(|_| format!("Invalid height: {}", parts[1]))?;

        if width == 0 || height == 0 {
            return Err(format!("Thumbnail dimensions must be non-zero: {}", s));
        }

        Ok(ThumbnailSize { width, height })
    }
}

/// Image resize operations
pub struct ImageResize;

impl ImageResize {
    /// Dimensions that fit within the bounding box using one uniform scale
    /// factor, or `None` when the image already fits. Never upscales.
    pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> Option<(u32, u32)> {
        if width <= max_width && height <= max_height {
            return None;
        }
        Some(scale_to_fit(width, height, max_width, max_height))
    }

    /// Select appropriate filter type based on resize ratio
    pub fn select_filter(
        orig_width: u32,
        orig_height: u32,
        new_width: u32,
        new_height: u32,
    ) -> imageops::FilterType {
        let width_ratio = orig_width as f32 / new_width.max(1) as f32;
        let height_ratio = orig_height as f32 / new_height.max(1) as f32;
        let max_ratio = width_ratio.max(height_ratio);

        if max_ratio > 2.0 {
            imageops::FilterType::Triangle
        } else if max_ratio > 1.5 {
            imageops::FilterType::CatmullRom
        } else {
            imageops::FilterType::Lanczos3
        }
    }

    /// Resize image to exact dimensions
    pub fn resize_image(img: &DynamicImage, width: u32, height: u32) -> DynamicImage {
        let (orig_width, orig_height) = img.dimensions();
        let filter = Self::select_filter(orig_width, orig_height, width, height);
        img.resize_exact(width, height, filter)
    }

    /// Scale to fit inside `size` and center on an opaque white canvas of
    /// exactly that size.
    pub fn fit_on_canvas(img: &DynamicImage, size: ThumbnailSize) -> DynamicImage {
        let (orig_width, orig_height) = img.dimensions();

        let (scaled_width, scaled_height) =
            scale_to_fit(orig_width, orig_height, size.width, size.height);

        let bg_color = Rgba([255u8, 255u8, 255u8, 255u8]);
        let mut canvas = RgbaImage::from_pixel(size.width, size.height, bg_color);

        let resized = Self::resize_image(img, scaled_width, scaled_height).to_rgba8();
        let x_offset = (size.width - scaled_width) / 2;
        let y_offset = (size.height - scaled_height) / 2;
        imageops::overlay(&mut canvas, &resized, x_offset as i64, y_offset as i64);

        DynamicImage::ImageRgba8(canvas)
    }

    /// Redraw onto a fresh canvas of identical dimensions. Only pixels survive.
    pub fn redraw(img: &DynamicImage) -> DynamicImage {
        let (width, height) = img.dimensions();
        let mut canvas = RgbaImage::new(width, height);
        imageops::replace(&mut canvas, &img.to_rgba8(), 0, 0);
        DynamicImage::ImageRgba8(canvas)
    }
}

/// Scale `width`x`height` by min(box_w/w, box_h/h), in integer arithmetic so
/// the limiting side lands exactly on the box edge.
fn scale_to_fit(width: u32, height: u32, box_width: u32, box_height: u32) -> (u32, u32) {
    let (w, h) = (width.max(1) as u64, height.max(1) as u64);
    let (bw, bh) = (box_width as u64, box_height as u64);

    let (new_width, new_height) = if bw * h <= bh * w {
        (bw, h * bw / w)
    } else {
        (w * bh / h, bh)
    };
    (
        (new_width as u32).clamp(1, box_width.max(1)),
        (new_height as u32).clamp(1, box_height.max(1)),
    )
}
