//! Error types for the capture engine and pixel pipeline

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::capture::{ControlId, PixelFormat};

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong between opening a device and handing out a
/// compressed image.
#[derive(Debug, Error)]
pub enum Error {
    /// The device node could not be opened
    #[error("failed to open {}: {source}", .path.display())]
    DeviceOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The device lacks video capture or memory-mapped streaming support
    #[error("unsupported device: {0}")]
    Capability(String),

    /// The device rejected the requested format
    #[error("format negotiation failed: {0}")]
    FormatNegotiation(#[source] io::Error),

    /// A device buffer could not be queried or mapped
    #[error("failed to map buffer {index}: {source}")]
    BufferMapping {
        index: u32,
        #[source]
        source: io::Error,
    },

    /// A buffer could not be handed to the device queue
    #[error("failed to enqueue buffer {index}: {source}")]
    Enqueue {
        index: u32,
        #[source]
        source: io::Error,
    },

    /// The device granted no buffers at all
    #[error("device granted no buffers")]
    NoBuffersGranted,

    /// `start_streaming` while already streaming
    #[error("already streaming")]
    AlreadyStreaming,

    /// Stream-gated operation while not streaming
    #[error("not streaming")]
    NotStreaming,

    /// Buffer count changed while streaming
    #[error("cannot set buffer count while streaming")]
    BufferCountLocked,

    /// No frame became ready before the wait expired
    #[error("timed out waiting for a frame")]
    Timeout,

    /// Dequeue failed or reported a buffer the device did not own
    #[error("failed to dequeue buffer: {0}")]
    Dequeue(#[source] io::Error),

    /// Index outside the buffer pool
    #[error("buffer index {index} out of range (pool size {size})")]
    InvalidIndex { index: u32, size: u32 },

    /// Release of a buffer the application does not hold
    #[error("buffer {0} is not held by the application")]
    NotHeld(u32),

    /// One or more buffers failed to unmap during teardown
    #[error("failed to unmap {} buffer(s): {}", .failures.len(), summarize(.failures))]
    BufferRelease { failures: Vec<(u32, io::Error)> },

    /// Control query or update rejected by the device
    #[error("control {id}: {source}")]
    Control {
        id: ControlId,
        #[source]
        source: io::Error,
    },

    /// Any other transport fault, tagged with the failing operation
    #[error("{op} failed: {source}")]
    Transport {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    /// No decoder exists for this pixel format
    #[error("format {0} is not supported by this encoder")]
    UnsupportedFormat(PixelFormat),

    /// Degenerate dimensions or frame length
    #[error("input error: {width}x{height} frame of {length} bytes")]
    CompressionInput { width: u32, height: u32, length: usize },

    /// Frame shorter than its declared layout requires
    #[error("{format} frame too short: need {expected} bytes, got {actual}")]
    FrameTooShort {
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },

    /// Image codec failure
    #[error("encoding failed: {0}")]
    Encoding(#[from] image::ImageError),

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

fn summarize(failures: &[(u32, io::Error)]) -> String {
    failures
        .iter()
        .map(|(index, err)| format!("buffer {index}: {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    pub(crate) fn transport(op: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| Error::Transport { op, source }
    }

    /// Expected, non-corrupting outcomes the caller may simply retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Timeout | Error::AlreadyStreaming | Error::NotStreaming | Error::BufferCountLocked
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout)
    }
}
