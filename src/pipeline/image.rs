//! Canonical decoded image

use image::{DynamicImage, RgbImage, RgbaImage};

/// Chroma subsampling of a [`YCbCrImage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsampling {
    /// Half horizontal chroma resolution
    Ratio422,
    /// Half horizontal and half vertical chroma resolution
    Ratio420,
}

impl Subsampling {
    /// Chroma plane dimensions for a `width`x`height` image.
    pub fn chroma_size(self, width: u32, height: u32) -> (u32, u32) {
        let cw = width.div_ceil(2);
        match self {
            Subsampling::Ratio422 => (cw, height),
            Subsampling::Ratio420 => (cw, height.div_ceil(2)),
        }
    }
}

/// Planar Y'CbCr image with full-resolution luma.
///
/// `y` has `width * height` samples; `cb` and `cr` each have
/// `chroma_size` samples, row-major with no padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YCbCrImage {
    pub width: u32,
    pub height: u32,
    pub subsampling: Subsampling,
    pub y: Vec<u8>,
    pub cb: Vec<u8>,
    pub cr: Vec<u8>,
}

impl YCbCrImage {
    pub fn new(width: u32, height: u32, subsampling: Subsampling) -> Self {
        let (cw, ch) = subsampling.chroma_size(width, height);
        let chroma = (cw * ch) as usize;
        Self {
            width,
            height,
            subsampling,
            y: vec![0; (width * height) as usize],
            cb: vec![0; chroma],
            cr: vec![0; chroma],
        }
    }

    pub fn chroma_stride(&self) -> usize {
        self.width.div_ceil(2) as usize
    }

    /// Index into `cb`/`cr` for the pixel at (`x`, `y`).
    pub fn chroma_index(&self, x: u32, y: u32) -> usize {
        let row = match self.subsampling {
            Subsampling::Ratio422 => y,
            Subsampling::Ratio420 => y / 2,
        };
        row as usize * self.chroma_stride() + (x / 2) as usize
    }

    /// Convert to packed RGB using full-range BT.601 (JFIF) coefficients.
    pub fn to_rgb(&self) -> RgbImage {
        RgbImage::from_fn(self.width, self.height, |x, y| {
            let luma = self.y[(y * self.width + x) as usize];
            let c = self.chroma_index(x, y);
            image::Rgb(ycbcr_to_rgb(luma, self.cb[c], self.cr[c]))
        })
    }
}

/// Fixed-point JFIF conversion, 16 fractional bits.
pub fn ycbcr_to_rgb(y: u8, cb: u8, cr: u8) -> [u8; 3] {
    let yy = i32::from(y) * 0x10101;
    let cb = i32::from(cb) - 128;
    let cr = i32::from(cr) - 128;

    let channel = |v: i32| (v.clamp(0, 0xff_ffff) >> 16) as u8;
    [
        channel(yy + 91881 * cr),
        channel(yy - 22554 * cb - 46802 * cr),
        channel(yy + 116130 * cb),
    ]
}

/// Image layout tag of a [`DecodedImage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    YCbCr422,
    YCbCr420,
    Rgb,
    Rgba,
}

/// Decoder output, before any post-processing.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedImage {
    YCbCr(YCbCrImage),
    Rgb(RgbImage),
    Rgba(RgbaImage),
}

impl DecodedImage {
    pub fn layout(&self) -> Layout {
        match self {
            DecodedImage::YCbCr(img) => match img.subsampling {
                Subsampling::Ratio422 => Layout::YCbCr422,
                Subsampling::Ratio420 => Layout::YCbCr420,
            },
            DecodedImage::Rgb(_) => Layout::Rgb,
            DecodedImage::Rgba(_) => Layout::Rgba,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            DecodedImage::YCbCr(img) => (img.width, img.height),
            DecodedImage::Rgb(img) => img.dimensions(),
            DecodedImage::Rgba(img) => img.dimensions(),
        }
    }

    /// Hand the pixels to the `image` crate for transforms and encoding.
    pub fn into_dynamic(self) -> DynamicImage {
        match self {
            DecodedImage::YCbCr(img) => DynamicImage::ImageRgb8(img.to_rgb()),
            DecodedImage::Rgb(img) => DynamicImage::ImageRgb8(img),
            DecodedImage::Rgba(img) => DynamicImage::ImageRgba8(img),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_chroma_is_grey() {
        assert_eq!(ycbcr_to_rgb(0, 128, 128), [0, 0, 0]);
        assert_eq!(ycbcr_to_rgb(255, 128, 128), [255, 255, 255]);
        assert_eq!(ycbcr_to_rgb(100, 128, 128), [100, 100, 100]);
    }

    #[test]
    fn saturated_chroma_clamps() {
        let [r, _, b] = ycbcr_to_rgb(255, 255, 255);
        assert_eq!((r, b), (255, 255));
        let [r, _, b] = ycbcr_to_rgb(0, 0, 0);
        assert_eq!((r, b), (0, 0));
    }

    #[test]
    fn chroma_plane_sizes_round_up() {
        assert_eq!(Subsampling::Ratio422.chroma_size(5, 3), (3, 3));
        assert_eq!(Subsampling::Ratio420.chroma_size(5, 3), (3, 2));
        let img = YCbCrImage::new(4, 4, Subsampling::Ratio420);
        assert_eq!((img.y.len(), img.cb.len(), img.cr.len()), (16, 4, 4));
    }

    #[test]
    fn chroma_index_follows_subsampling() {
        let img422 = YCbCrImage::new(4, 2, Subsampling::Ratio422);
        assert_eq!(img422.chroma_index(3, 1), 3);
        let img420 = YCbCrImage::new(4, 2, Subsampling::Ratio420);
        assert_eq!(img420.chroma_index(3, 1), 1);
    }

    #[test]
    fn ycbcr_converts_to_rgb_dynamic_image() {
        let mut img = YCbCrImage::new(2, 2, Subsampling::Ratio420);
        img.y.fill(200);
        img.cb.fill(128);
        img.cr.fill(128);
        let decoded = DecodedImage::YCbCr(img);
        assert_eq!(decoded.layout(), Layout::YCbCr420);
        let rgb = decoded.into_dynamic().to_rgb8();
        assert!(rgb.pixels().all(|p| p.0 == [200, 200, 200]));
    }
}
