use image::{imageops, DynamicImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// What the embedded EXIF block said before it was discarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExifSummary {
    pub present: bool,
    /// EXIF orientation tag, 1 when absent or unreadable
    pub orientation: u32,
}

impl ExifSummary {
    pub fn read(data: &[u8]) -> Self {
        let reader = exif::Reader::new();
        match reader.read_from_container(&mut Cursor::new(data)) {
            Ok(exif) => {
                let orientation = exif
                    .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
                    .and_then(|field| field.value.get_uint(0))
                    .filter(|o| (1..=8).contains(o))
                    .unwrap_or(1);
                ExifSummary {
                    present: true,
                    orientation,
                }
            }
            Err(_) => ExifSummary {
                present: false,
                orientation: 1,
            },
        }
    }

    /// Bake the orientation into the pixels, since stripping drops the tag
    /// that told viewers how to rotate.
    pub fn apply_orientation(&self, img: DynamicImage) -> DynamicImage {
        match self.orientation {
            2 => DynamicImage::ImageRgba8(imageops::flip_horizontal(&img.to_rgba8())),
            3 => DynamicImage::ImageRgba8(imageops::rotate180(&img.to_rgba8())),
            4 => DynamicImage::ImageRgba8(imageops::flip_vertical(&img.to_rgba8())),
            5 => {
                let rotated = imageops::rotate90(&img.to_rgba8());
                DynamicImage::ImageRgba8(imageops::flip_horizontal(&rotated))
            }
            6 => DynamicImage::ImageRgba8(imageops::rotate90(&img.to_rgba8())),
            7 => {
                let rotated = imageops::rotate270(&img.to_rgba8());
                DynamicImage::ImageRgba8(imageops::flip_horizontal(&rotated))
            }
            8 => DynamicImage::ImageRgba8(imageops::rotate270(&img.to_rgba8())),
            _ => img,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgba, RgbaImage};

    #[test]
    fn test_no_exif() {
        let summary = ExifSummary::read(b"not an image");
        assert!(!summary.present);
        assert_eq!(summary.orientation, 1);
    }

    #[test]
    fn test_orientation_rotation_swaps_dimensions() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 2, Rgba([0, 0, 255, 255])));
        let summary = ExifSummary {
            present: true,
            orientation: 6,
        };
        assert_eq!(summary.apply_orientation(img.clone()).dimensions(), (2, 4));

        let summary = ExifSummary {
            present: true,
            orientation: 3,
        };
        assert_eq!(summary.apply_orientation(img.clone()).dimensions(), (4, 2));

        assert_eq!(
            ExifSummary::default().apply_orientation(img).dimensions(),
            (4, 2)
        );
    }
}
