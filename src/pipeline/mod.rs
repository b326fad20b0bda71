//! Raw frame to JPEG pipeline: decode, rotate, resize, encode.

pub mod decode;
pub mod encode;
pub mod image;
pub mod transform;

use std::time::Instant;

use bytes::Bytes;
use tracing::{debug, instrument};

use crate::capture::PixelFormat;
use crate::error::{Error, Result};

pub use self::decode::{can_compress, decode, is_passthrough, is_supported, supported_formats};
pub use self::encode::{clamp_quality, encode_jpeg};
pub use self::image::{DecodedImage, Layout, Subsampling, YCbCrImage};
pub use self::transform::{filter_for_quality, Resize, Rotation};

/// Frames with any dimension (or length) at or below this are rejected.
pub const MIN_INPUT: usize = 10;

/// Post-processing and encoder settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressOptions {
    /// JPEG quality, 1..=100; also picks the resize filter
    pub quality: u8,
    pub rotation: Rotation,
    pub resize: Option<Resize>,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            quality: 80,
            rotation: Rotation::None,
            resize: None,
        }
    }
}

/// Output of [`compress`].
#[derive(Debug, Clone)]
pub struct CompressedFrame {
    pub data: Bytes,
    /// Human-readable summary of what was done
    pub diagnostic: String,
    /// Whether the input was already compressed and returned unchanged
    pub passthrough: bool,
}

/// Turn one raw `width`x`height` frame into a JPEG.
///
/// Hardware-compressed formats skip every stage and return the input bytes.
#[instrument(skip(frame, options), fields(len = frame.len()))]
pub fn compress(
    frame: &[u8],
    format: PixelFormat,
    width: u32,
    height: u32,
    options: &CompressOptions,
) -> Result<CompressedFrame> {
    if is_passthrough(format) {
        let diagnostic = format!(
            "hardware compressed {format} of length {}; resolution {width} x {height}",
            frame.len()
        );
        debug!("{diagnostic}");
        return Ok(CompressedFrame {
            data: Bytes::copy_from_slice(frame),
            diagnostic,
            passthrough: true,
        });
    }

    if !is_supported(format) {
        return Err(Error::UnsupportedFormat(format));
    }

    if width as usize <= MIN_INPUT || height as usize <= MIN_INPUT || frame.len() <= MIN_INPUT {
        return Err(Error::CompressionInput {
            width,
            height,
            length: frame.len(),
        });
    }

    let start = Instant::now();
    let decoded = decode(frame, format, width, height)?;
    let mut img = options.rotation.apply(decoded.into_dynamic());
    if let Some(resize) = options.resize {
        img = resize.apply(&img, options.quality);
    }
    let jpeg = encode_jpeg(&img, clamp_quality(options.quality.into()))?;
    let elapsed = start.elapsed();

    metrics::counter!("frames_compressed").increment(1);
    metrics::histogram!("encode_time_us").record(elapsed.as_micros() as f64);

    let diagnostic = format!(
        "Encoded image format {format}; length {}; resolution {width} x {height}; to jpeg of length {} in {elapsed:?}",
        frame.len(),
        jpeg.len(),
    );
    debug!("{diagnostic}");

    Ok(CompressedFrame {
        data: Bytes::from(jpeg),
        diagnostic,
        passthrough: false,
    })
}
