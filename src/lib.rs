//! Webcam capture over V4L2 with a raw-frame to JPEG pipeline

pub mod capture;
pub mod error;
pub mod pipeline;
pub mod utils;

use std::path::{Path, PathBuf};

use config::{Environment, File};
use serde::{Deserialize, Serialize};

pub use capture::{
    BooleanControl, Capabilities, ControlId, Frame, FrameSize, NegotiatedFormat, PixelFormat,
    Session, StreamState, Transport, V4l2Transport,
};
pub use error::{Error, Result};
pub use pipeline::{compress, CompressOptions, CompressedFrame, Resize, Rotation};

/// Prefix of environment overrides, e.g. `WEBCAM_CAPTURE__WIDTH=1280`
pub const ENV_PREFIX: &str = "WEBCAM";

/// Runtime configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub encode: EncodeConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Device node; empty to auto-detect
    pub device: String,
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub buffer_count: u32,
    pub wait_timeout_ms: u64,
    /// Frames to capture before exiting
    pub frames: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeConfig {
    pub quality: u8,
    pub rotation: Rotation,
    /// Zero disables resizing
    pub resize_width: u32,
    /// Zero keeps the aspect ratio
    pub resize_height: u32,
    pub output_dir: PathBuf,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            format: PixelFormat::MJPG,
            width: 640,
            height: 480,
            buffer_count: 4,
            wait_timeout_ms: 1000,
            frames: 10,
        }
    }
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            quality: 80,
            rotation: Rotation::None,
            resize_width: 0,
            resize_height: 0,
            output_dir: PathBuf::from("."),
        }
    }
}

impl EncodeConfig {
    pub fn options(&self) -> CompressOptions {
        CompressOptions {
            quality: pipeline::clamp_quality(self.quality.into()),
            rotation: self.rotation,
            resize: Resize::new(self.resize_width, self.resize_height),
        }
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}

impl Config {
    /// Defaults, then the optional TOML file, then `WEBCAM_` environment
    /// variables (`__` separates sections).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, environment())
    }

    fn load_with(path: Option<&Path>, env: Environment) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let config = builder.add_source(env).build()?.try_deserialize()?;
        Ok(config)
    }
}
