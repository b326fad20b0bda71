//! Rotation and resizing of decoded images

use std::fmt;

use image::imageops::FilterType;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Absolute clockwise rotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Rotation {
    #[default]
    None,
    Clockwise90,
    Half,
    Clockwise270,
}

impl Rotation {
    /// Parse a rotation tag such as `"90"`, `"90cw"` or `"270ccw"`.
    ///
    /// A bare angle is clockwise. `ccw` angles map onto the equivalent
    /// clockwise rotation. Anything unrecognised is [`Rotation::None`].
    pub fn from_tag(tag: &str) -> Self {
        let tag = tag.trim().to_ascii_lowercase();
        let (angle, counter) = if let Some(angle) = tag.strip_suffix("ccw") {
            (angle, true)
        } else if let Some(angle) = tag.strip_suffix("cw") {
            (angle, false)
        } else {
            (tag.as_str(), false)
        };

        match (angle, counter) {
            ("90", false) | ("270", true) => Rotation::Clockwise90,
            ("180", _) => Rotation::Half,
            ("270", false) | ("90", true) => Rotation::Clockwise270,
            _ => Rotation::None,
        }
    }

    pub fn degrees(self) -> u32 {
        match self {
            Rotation::None => 0,
            Rotation::Clockwise90 => 90,
            Rotation::Half => 180,
            Rotation::Clockwise270 => 270,
        }
    }

    pub fn apply(self, img: DynamicImage) -> DynamicImage {
        match self {
            Rotation::None => img,
            Rotation::Clockwise90 => img.rotate90(),
            Rotation::Half => img.rotate180(),
            Rotation::Clockwise270 => img.rotate270(),
        }
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rotation::None => f.write_str("none"),
            rotation => write!(f, "{}", rotation.degrees()),
        }
    }
}

impl From<&str> for Rotation {
    fn from(tag: &str) -> Self {
        Self::from_tag(tag)
    }
}

impl From<String> for Rotation {
    fn from(tag: String) -> Self {
        Self::from_tag(&tag)
    }
}

impl From<Rotation> for String {
    fn from(rotation: Rotation) -> Self {
        rotation.to_string()
    }
}

/// Resampling filter for the given encode quality.
pub fn filter_for_quality(quality: u8) -> FilterType {
    if quality >= 75 {
        FilterType::Lanczos3
    } else if quality >= 50 {
        FilterType::CatmullRom
    } else {
        FilterType::Nearest
    }
}

/// Target resize. A `height` of zero keeps the source aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resize {
    pub width: u32,
    pub height: u32,
}

impl Resize {
    /// `None` unless a target width is set.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        (width > 0).then_some(Self { width, height })
    }

    /// Output dimensions for a `src_width`x`src_height` source.
    pub fn dimensions(self, src_width: u32, src_height: u32) -> (u32, u32) {
        if self.height > 0 || src_width == 0 {
            return (self.width, self.height.max(1));
        }
        let height = (u64::from(src_height) * u64::from(self.width) + u64::from(src_width) / 2)
            / u64::from(src_width);
        (self.width, (height as u32).max(1))
    }

    pub fn apply(self, img: &DynamicImage, quality: u8) -> DynamicImage {
        let (width, height) = self.dimensions(img.width(), img.height());
        img.resize_exact(width, height, filter_for_quality(quality))
    }
}
