//! JPEG encoding

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType};

use crate::error::Result;

pub const MIN_QUALITY: u8 = 1;
pub const MAX_QUALITY: u8 = 100;

/// Clamp a requested quality into the codec's accepted range.
pub fn clamp_quality(quality: u32) -> u8 {
    quality.clamp(u32::from(MIN_QUALITY), u32::from(MAX_QUALITY)) as u8
}

/// Encode as baseline JPEG. Alpha is dropped.
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let rgb = img.to_rgb8();
    let mut out = Vec::with_capacity(rgb.as_raw().len() / 8);
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
    encoder.encode(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage, RgbaImage};

    fn checker(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            if (x / 4 + y / 4) % 2 == 0 {
                Rgb([240, 240, 240])
            } else {
                Rgb([16, 16, 16])
            }
        })
    }

    #[test]
    fn quality_is_clamped() {
        assert_eq!(clamp_quality(0), 1);
        assert_eq!(clamp_quality(80), 80);
        assert_eq!(clamp_quality(500), 100);
    }

    #[test]
    fn output_is_decodable_jpeg() {
        let img = DynamicImage::ImageRgb8(checker(32, 24));
        let jpeg = encode_jpeg(&img, 90).unwrap();
        assert_eq!(&jpeg[..2], &[0xff, 0xd8]);

        let decoded = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
    }

    #[test]
    fn lower_quality_is_smaller() {
        let img = DynamicImage::ImageRgb8(checker(64, 64));
        let high = encode_jpeg(&img, 95).unwrap();
        let low = encode_jpeg(&img, 10).unwrap();
        assert!(low.len() < high.len());
    }

    #[test]
    fn rgba_input_is_flattened() {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(16, 16));
        assert!(encode_jpeg(&img, 50).is_ok());
    }
}
