//! Pixel decoders for raw capture formats
//!
//! Every decodable FourCC maps to one entry in an immutable table built on
//! first use. Passthrough formats (hardware JPEG) have no entry.

use std::collections::HashMap;

use image::{RgbImage, RgbaImage};
use once_cell::sync::Lazy;

use crate::capture::PixelFormat;
use crate::error::{Error, Result};
use crate::pipeline::image::{DecodedImage, Subsampling, YCbCrImage};

/// Chroma storage of a 4:2:0 planar frame, after the luma plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChromaLayout {
    /// Cb plane, then Cr plane
    CbThenCr,
    /// Cr plane, then Cb plane
    CrThenCb,
    /// One plane of Cb,Cr pairs
    InterleavedCbCr,
    /// One plane of Cr,Cb pairs
    InterleavedCrCb,
}

/// Byte-reordering rule for one format family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decoder {
    /// Byte offsets of each sample inside a 4-byte, 2-pixel group
    Packed422 { y0: usize, y1: usize, cb: usize, cr: usize },
    Planar420(ChromaLayout),
    /// Byte offsets of R, G, B inside a 3-byte pixel
    Rgb24 { r: usize, g: usize, b: usize },
    /// Byte offsets of R, G, B, A inside a 4-byte pixel
    Rgba32 { r: usize, g: usize, b: usize, a: usize },
}

static DECODERS: Lazy<HashMap<PixelFormat, Decoder>> = Lazy::new(|| {
    use ChromaLayout::*;

    let yuyv = Decoder::Packed422 { y0: 0, cb: 1, y1: 2, cr: 3 };
    HashMap::from([
        (PixelFormat::YUYV, yuyv),
        (PixelFormat::YUNV, yuyv),
        (PixelFormat::YVYU, Decoder::Packed422 { y0: 0, cr: 1, y1: 2, cb: 3 }),
        (PixelFormat::UYVY, Decoder::Packed422 { cb: 0, y0: 1, cr: 2, y1: 3 }),
        (PixelFormat::VYUY, Decoder::Packed422 { cr: 0, y0: 1, cb: 2, y1: 3 }),
        (PixelFormat::YU12, Decoder::Planar420(CbThenCr)),
        (PixelFormat::I420, Decoder::Planar420(CbThenCr)),
        (PixelFormat::YV12, Decoder::Planar420(CrThenCb)),
        (PixelFormat::NV12, Decoder::Planar420(InterleavedCbCr)),
        (PixelFormat::NV21, Decoder::Planar420(InterleavedCrCb)),
        (PixelFormat::RGB3, Decoder::Rgb24 { r: 0, g: 1, b: 2 }),
        (PixelFormat::BGR3, Decoder::Rgb24 { r: 2, g: 1, b: 0 }),
        (PixelFormat::RGB4, Decoder::Rgba32 { r: 2, g: 1, b: 0, a: 3 }),
        (PixelFormat::BGR4, Decoder::Rgba32 { r: 0, g: 1, b: 2, a: 3 }),
    ])
});

/// Whether `format` has a software decoder.
pub fn is_supported(format: PixelFormat) -> bool {
    DECODERS.contains_key(&format)
}

/// Whether `format` is already compressed by the hardware.
pub fn is_passthrough(format: PixelFormat) -> bool {
    format == PixelFormat::JPEG || format == PixelFormat::MJPG
}

/// Whether `compress` accepts frames in `format` at all.
pub fn can_compress(format: PixelFormat) -> bool {
    is_passthrough(format) || is_supported(format)
}

/// Formats with a software decoder, in code order.
pub fn supported_formats() -> Vec<PixelFormat> {
    let mut formats: Vec<_> = DECODERS.keys().copied().collect();
    formats.sort();
    formats
}

/// Decode a raw `width`x`height` frame into its canonical image.
pub fn decode(frame: &[u8], format: PixelFormat, width: u32, height: u32) -> Result<DecodedImage> {
    let decoder = DECODERS
        .get(&format)
        .copied()
        .ok_or(Error::UnsupportedFormat(format))?;

    let expected = decoder.frame_len(width, height);
    if frame.len() < expected {
        return Err(Error::FrameTooShort {
            format,
            expected,
            actual: frame.len(),
        });
    }

    Ok(match decoder {
        Decoder::Packed422 { y0, y1, cb, cr } => {
            DecodedImage::YCbCr(packed_422(frame, width, height, [y0, y1, cb, cr]))
        }
        Decoder::Planar420(layout) => DecodedImage::YCbCr(planar_420(frame, width, height, layout)),
        Decoder::Rgb24 { r, g, b } => DecodedImage::Rgb(rgb24(frame, width, height, [r, g, b])),
        Decoder::Rgba32 { r, g, b, a } => {
            DecodedImage::Rgba(rgba32(frame, width, height, [r, g, b, a]))
        }
    })
}

impl Decoder {
    /// Minimum frame length for the given dimensions.
    fn frame_len(self, width: u32, height: u32) -> usize {
        let (w, h) = (width as usize, height as usize);
        let pairs = w.div_ceil(2);
        match self {
            Decoder::Packed422 { .. } => pairs * 4 * h,
            Decoder::Planar420(_) => w * h + 2 * pairs * h.div_ceil(2),
            Decoder::Rgb24 { .. } => w * h * 3,
            Decoder::Rgba32 { .. } => w * h * 4,
        }
    }
}

fn packed_422(frame: &[u8], width: u32, height: u32, [y0, y1, cb, cr]: [usize; 4]) -> YCbCrImage {
    let mut img = YCbCrImage::new(width, height, Subsampling::Ratio422);
    let w = width as usize;
    let pairs = img.chroma_stride();

    for (row, line) in frame.chunks_exact(pairs * 4).take(height as usize).enumerate() {
        let luma = &mut img.y[row * w..(row + 1) * w];
        for (pair, group) in line.chunks_exact(4).enumerate() {
            let x = pair * 2;
            luma[x] = group[y0];
            if x + 1 < w {
                luma[x + 1] = group[y1];
            }
            img.cb[row * pairs + pair] = group[cb];
            img.cr[row * pairs + pair] = group[cr];
        }
    }
    img
}

fn planar_420(frame: &[u8], width: u32, height: u32, layout: ChromaLayout) -> YCbCrImage {
    let mut img = YCbCrImage::new(width, height, Subsampling::Ratio420);
    let luma_len = img.y.len();
    let chroma_len = img.cb.len();
    img.y.copy_from_slice(&frame[..luma_len]);

    let chroma = &frame[luma_len..];
    let (first, second) = chroma.split_at(chroma_len);
    match layout {
        ChromaLayout::CbThenCr => {
            img.cb.copy_from_slice(first);
            img.cr.copy_from_slice(&second[..chroma_len]);
        }
        ChromaLayout::CrThenCb => {
            img.cr.copy_from_slice(first);
            img.cb.copy_from_slice(&second[..chroma_len]);
        }
        ChromaLayout::InterleavedCbCr | ChromaLayout::InterleavedCrCb => {
            let (cb, cr) = match layout {
                ChromaLayout::InterleavedCbCr => (0, 1),
                _ => (1, 0),
            };
            for (i, pair) in chroma.chunks_exact(2).take(chroma_len).enumerate() {
                img.cb[i] = pair[cb];
                img.cr[i] = pair[cr];
            }
        }
    }
    img
}

fn rgb24(frame: &[u8], width: u32, height: u32, [r, g, b]: [usize; 3]) -> RgbImage {
    let pixels = frame
        .chunks_exact(3)
        .take((width * height) as usize)
        .flat_map(|px| [px[r], px[g], px[b]])
        .collect();
    // Length is checked against the layout before decoding
    RgbImage::from_raw(width, height, pixels).unwrap_or_else(|| RgbImage::new(width, height))
}

fn rgba32(frame: &[u8], width: u32, height: u32, [r, g, b, a]: [usize; 4]) -> RgbaImage {
    let pixels = frame
        .chunks_exact(4)
        .take((width * height) as usize)
        .flat_map(|px| [px[r], px[g], px[b], px[a]])
        .collect();
    RgbaImage::from_raw(width, height, pixels).unwrap_or_else(|| RgbaImage::new(width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planes(img: DecodedImage) -> YCbCrImage {
        match img {
            DecodedImage::YCbCr(img) => img,
            other => panic!("expected YCbCr, got {:?}", other.layout()),
        }
    }

    #[test]
    fn yuyv_pair_splits_into_planes() {
        let img = planes(decode(&[10, 20, 30, 40], PixelFormat::YUYV, 2, 1).unwrap());
        assert_eq!(img.y, [10, 30]);
        assert_eq!(img.cb, [20]);
        assert_eq!(img.cr, [40]);
    }

    #[test]
    fn yvyu_swaps_chroma() {
        let img = planes(decode(&[10, 20, 30, 40], PixelFormat::YVYU, 2, 1).unwrap());
        assert_eq!(img.y, [10, 30]);
        assert_eq!(img.cb, [40]);
        assert_eq!(img.cr, [20]);
    }

    #[test]
    fn luma_at_odd_offsets() {
        let uyvy = planes(decode(&[1, 2, 3, 4], PixelFormat::UYVY, 2, 1).unwrap());
        assert_eq!((uyvy.y.as_slice(), uyvy.cb[0], uyvy.cr[0]), (&[2, 4][..], 1, 3));

        let vyuy = planes(decode(&[1, 2, 3, 4], PixelFormat::VYUY, 2, 1).unwrap());
        assert_eq!((vyuy.y.as_slice(), vyuy.cb[0], vyuy.cr[0]), (&[2, 4][..], 3, 1));
    }

    #[test]
    fn yunv_matches_yuyv() {
        let frame = [5, 6, 7, 8, 9, 10, 11, 12];
        assert_eq!(
            decode(&frame, PixelFormat::YUNV, 2, 2).unwrap(),
            decode(&frame, PixelFormat::YUYV, 2, 2).unwrap()
        );
    }

    #[test]
    fn packed_rows_use_their_own_chroma() {
        let frame = [0, 1, 0, 2, 0, 3, 0, 4];
        let img = planes(decode(&frame, PixelFormat::YUYV, 2, 2).unwrap());
        assert_eq!(img.cb, [1, 3]);
        assert_eq!(img.cr, [2, 4]);
    }

    // 2x2 luma followed by one chroma sample per plane
    const PLANAR: [u8; 6] = [1, 2, 3, 4, 50, 60];

    #[test]
    fn planar_plane_order_per_format() {
        for (format, cb, cr) in [
            (PixelFormat::YU12, 50, 60),
            (PixelFormat::I420, 50, 60),
            (PixelFormat::YV12, 60, 50),
            (PixelFormat::NV12, 50, 60),
            (PixelFormat::NV21, 60, 50),
        ] {
            let img = planes(decode(&PLANAR, format, 2, 2).unwrap());
            assert_eq!(img.y, [1, 2, 3, 4], "{format}");
            assert_eq!((img.cb[0], img.cr[0]), (cb, cr), "{format}");
        }
    }

    #[test]
    fn separate_and_interleaved_planes_differ() {
        // 4x2 image: two chroma samples per plane
        let frame = [0, 0, 0, 0, 0, 0, 0, 0, 1, 2, 3, 4];
        let yu12 = planes(decode(&frame, PixelFormat::YU12, 4, 2).unwrap());
        assert_eq!((yu12.cb.as_slice(), yu12.cr.as_slice()), (&[1, 2][..], &[3, 4][..]));
        let nv12 = planes(decode(&frame, PixelFormat::NV12, 4, 2).unwrap());
        assert_eq!((nv12.cb.as_slice(), nv12.cr.as_slice()), (&[1, 3][..], &[2, 4][..]));
    }

    #[test]
    fn rgb_channel_order() {
        let rgb = decode(&[1, 2, 3], PixelFormat::RGB3, 1, 1).unwrap();
        let bgr = decode(&[1, 2, 3], PixelFormat::BGR3, 1, 1).unwrap();
        match (rgb, bgr) {
            (DecodedImage::Rgb(rgb), DecodedImage::Rgb(bgr)) => {
                assert_eq!(rgb.get_pixel(0, 0).0, [1, 2, 3]);
                assert_eq!(bgr.get_pixel(0, 0).0, [3, 2, 1]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rgba_keeps_alpha() {
        let rgb4 = decode(&[1, 2, 3, 4], PixelFormat::RGB4, 1, 1).unwrap();
        let bgr4 = decode(&[1, 2, 3, 4], PixelFormat::BGR4, 1, 1).unwrap();
        match (rgb4, bgr4) {
            (DecodedImage::Rgba(rgb4), DecodedImage::Rgba(bgr4)) => {
                assert_eq!(rgb4.get_pixel(0, 0).0, [3, 2, 1, 4]);
                assert_eq!(bgr4.get_pixel(0, 0).0, [1, 2, 3, 4]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn short_frames_are_rejected() {
        let err = decode(&[0; 7], PixelFormat::YUYV, 2, 2).unwrap_err();
        assert!(matches!(
            err,
            Error::FrameTooShort { expected: 8, actual: 7, .. }
        ));
        assert!(decode(&[0; 5], PixelFormat::NV12, 2, 2).is_err());
        assert!(decode(&[0; 11], PixelFormat::BGR4, 3, 1).is_err());
    }

    #[test]
    fn registry_covers_raw_formats_only() {
        assert!(is_supported(PixelFormat::YUYV));
        assert!(is_supported(PixelFormat::NV21));
        assert!(!is_supported(PixelFormat::MJPG));
        assert!(!is_supported(PixelFormat::from_tag("H264")));
        assert!(is_passthrough(PixelFormat::JPEG));
        assert!(is_passthrough(PixelFormat::MJPG));
        assert_eq!(supported_formats().len(), 14);
        assert!(matches!(
            decode(&[0; 16], PixelFormat::MJPG, 2, 2),
            Err(Error::UnsupportedFormat(PixelFormat::MJPG))
        ));
    }
}
