use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Four-character pixel format code as used by the V4L2 subsystem.
///
/// The code packs the tag little-endian: `b0 | b1 << 8 | b2 << 16 | b3 << 24`.
/// Serialized as its tag when every byte is printable ASCII, otherwise as
/// the numeric code (big-endian variants set bit 31).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "FourccRepr", into = "FourccRepr")]
pub struct PixelFormat(u32);

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum FourccRepr {
    Tag(String),
    Code(u32),
}

impl From<PixelFormat> for FourccRepr {
    fn from(format: PixelFormat) -> Self {
        if format.is_printable() {
            FourccRepr::Tag(format.tag())
        } else {
            FourccRepr::Code(format.code())
        }
    }
}

impl From<FourccRepr> for PixelFormat {
    fn from(repr: FourccRepr) -> Self {
        match repr {
            FourccRepr::Tag(tag) => Self::from_tag(&tag),
            FourccRepr::Code(code) => Self::from_code(code),
        }
    }
}

impl PixelFormat {
    pub const YUYV: Self = Self::from_bytes(*b"YUYV");
    pub const YUNV: Self = Self::from_bytes(*b"YUNV");
    pub const YVYU: Self = Self::from_bytes(*b"YVYU");
    pub const UYVY: Self = Self::from_bytes(*b"UYVY");
    pub const VYUY: Self = Self::from_bytes(*b"VYUY");
    pub const YU12: Self = Self::from_bytes(*b"YU12");
    pub const YV12: Self = Self::from_bytes(*b"YV12");
    pub const I420: Self = Self::from_bytes(*b"I420");
    pub const NV12: Self = Self::from_bytes(*b"NV12");
    pub const NV21: Self = Self::from_bytes(*b"NV21");
    pub const RGB3: Self = Self::from_bytes(*b"RGB3");
    pub const BGR3: Self = Self::from_bytes(*b"BGR3");
    pub const RGB4: Self = Self::from_bytes(*b"RGB4");
    pub const BGR4: Self = Self::from_bytes(*b"BGR4");
    pub const JPEG: Self = Self::from_bytes(*b"JPEG");
    pub const MJPG: Self = Self::from_bytes(*b"MJPG");

    pub const fn from_code(code: u32) -> Self {
        Self(code)
    }

    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_le_bytes(bytes))
    }

    /// Encode a tag of up to four characters, right-padding with spaces.
    /// Bytes past the fourth are ignored.
    pub fn from_tag(tag: &str) -> Self {
        let mut bytes = [b' '; 4];
        for (slot, byte) in bytes.iter_mut().zip(tag.bytes()) {
            *slot = byte;
        }
        Self::from_bytes(bytes)
    }

    pub const fn code(self) -> u32 {
        self.0
    }

    pub const fn bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    /// The four-character tag, one `char` per byte.
    pub fn tag(self) -> String {
        self.bytes().iter().map(|&b| b as char).collect()
    }

    /// Whether the tag survives a trip through [`PixelFormat::from_tag`].
    pub fn is_printable(self) -> bool {
        self.bytes().iter().all(|&b| b == b' ' || b.is_ascii_graphic())
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag())
    }
}

impl From<&str> for PixelFormat {
    fn from(tag: &str) -> Self {
        Self::from_tag(tag)
    }
}

impl From<String> for PixelFormat {
    fn from(tag: String) -> Self {
        Self::from_tag(&tag)
    }
}

impl From<PixelFormat> for String {
    fn from(format: PixelFormat) -> Self {
        format.tag()
    }
}

impl From<u32> for PixelFormat {
    fn from(code: u32) -> Self {
        Self(code)
    }
}

impl From<PixelFormat> for u32 {
    fn from(format: PixelFormat) -> Self {
        format.0
    }
}

impl From<v4l::FourCC> for PixelFormat {
    fn from(fourcc: v4l::FourCC) -> Self {
        Self::from_bytes(fourcc.repr)
    }
}

impl From<PixelFormat> for v4l::FourCC {
    fn from(format: PixelFormat) -> Self {
        v4l::FourCC::new(&format.bytes())
    }
}

/// A pixel format as enumerated by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatDescription {
    pub format: PixelFormat,
    pub description: String,
}

/// Frame size supported by a device for one pixel format.
///
/// Fixed sizes have `min == max` and a step of zero on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FrameSize {
    pub min_width: u32,
    pub max_width: u32,
    pub step_width: u32,

    pub min_height: u32,
    pub max_height: u32,
    pub step_height: u32,
}

impl FrameSize {
    pub fn fixed(width: u32, height: u32) -> Self {
        Self {
            min_width: width,
            max_width: width,
            step_width: 0,
            min_height: height,
            max_height: height,
            step_height: 0,
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.step_width == 0 && self.step_height == 0
    }

    /// Whether `width`x`height` lies on this size's grid.
    pub fn contains(&self, width: u32, height: u32) -> bool {
        fn axis(value: u32, min: u32, max: u32, step: u32) -> bool {
            if step == 0 {
                return value == max;
            }
            (min..=max).contains(&value) && (value - min) % step == 0
        }
        axis(width, self.min_width, self.max_width, self.step_width)
            && axis(height, self.min_height, self.max_height, self.step_height)
    }
}

/// `1280x720` for fixed sizes, `[320-640;160]x[240-480;160]` for stepwise.
impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_fixed() {
            write!(f, "{}x{}", self.max_width, self.max_height)
        } else {
            write!(
                f,
                "[{}-{};{}]x[{}-{};{}]",
                self.min_width,
                self.max_width,
                self.step_width,
                self.min_height,
                self.max_height,
                self.step_height
            )
        }
    }
}

/// Format the device settled on after negotiation. The driver may adjust
/// both the code and the resolution away from what was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedFormat {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub bytes_per_line: u32,
    pub size_image: u32,
}

/// A dequeued buffer, borrowed from the pool.
///
/// `data` is truncated to the payload length the driver reported. The buffer
/// stays with the application until `Session::release_frame(index)`.
#[derive(Debug)]
pub struct Frame<'a> {
    pub index: u32,
    pub data: &'a [u8],
    pub sequence: u32,
    /// Driver timestamp (monotonic clock on most drivers)
    pub timestamp: Duration,
}

impl Frame<'_> {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
