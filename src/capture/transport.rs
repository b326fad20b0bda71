//! Primitive device operations the capture engine is built on.
//!
//! Enumeration primitives return `Ok(None)` once the index runs past the last
//! entry, so a genuine fault (`Err`) is never confused with exhaustion.

use std::io;
use std::time::Duration;

use crate::capture::controls::ControlId;
use crate::capture::frame::{FormatDescription, FrameSize, NegotiatedFormat, PixelFormat};

/// What the device reports about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub driver: String,
    pub card: String,
    pub bus_info: String,
    pub video_capture: bool,
    pub streaming: bool,
}

/// Control as enumerated by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlDescription {
    pub id: ControlId,
    pub name: String,
    pub min: i32,
    pub max: i32,
}

/// A buffer handed back by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dequeued {
    pub index: u32,
    /// Payload length; never more than the mapped region
    pub bytes_used: u32,
    pub sequence: u32,
    pub timestamp: Duration,
}

/// Device-control transport.
///
/// A transport is owned by exactly one session and is driven from a single
/// thread; nothing here is synchronized.
pub trait Transport {
    /// A mapped device buffer. Dropping it must release the mapping.
    type Region: AsRef<[u8]>;

    fn capabilities(&self) -> io::Result<Capabilities>;

    fn enum_format(&self, index: u32) -> io::Result<Option<FormatDescription>>;

    fn enum_frame_size(&self, index: u32, format: PixelFormat) -> io::Result<Option<FrameSize>>;

    fn set_format(
        &mut self,
        format: PixelFormat,
        width: u32,
        height: u32,
    ) -> io::Result<NegotiatedFormat>;

    fn enum_controls(&self) -> io::Result<Vec<ControlDescription>>;

    fn control(&self, id: ControlId) -> io::Result<i32>;

    fn set_control(&mut self, id: ControlId, value: i32) -> io::Result<()>;

    /// Ask for `count` buffers; the granted count may be lower. Zero frees
    /// the current allocation.
    fn request_buffers(&mut self, count: u32) -> io::Result<u32>;

    fn map_buffer(&mut self, index: u32) -> io::Result<Self::Region>;

    fn unmap_buffer(&mut self, region: Self::Region) -> io::Result<()>;

    fn enqueue_buffer(&mut self, index: u32) -> io::Result<()>;

    /// Non-blocking; `Ok(None)` when no buffer is ready.
    fn dequeue_buffer(&mut self) -> io::Result<Option<Dequeued>>;

    fn stream_on(&mut self) -> io::Result<()>;

    fn stream_off(&mut self) -> io::Result<()>;

    /// Block until a buffer is ready (`true`) or `timeout` elapses (`false`).
    fn wait_readable(&self, timeout: Duration) -> io::Result<bool>;

    fn close(self) -> io::Result<()>;
}
