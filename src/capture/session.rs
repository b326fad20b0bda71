//! Capture session: format negotiation, the streaming state machine and
//! frame acquisition over a [`Transport`].

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, instrument, warn};

use crate::capture::controls::{BooleanControl, Control, ControlId};
use crate::capture::frame::{FormatDescription, Frame, FrameSize, NegotiatedFormat, PixelFormat};
use crate::capture::pool::{BufferPool, Owner};
use crate::capture::transport::{Capabilities, Transport};
use crate::capture::v4l2::V4l2Transport;
use crate::error::{Error, Result};

/// Buffer count hint used until `set_buffer_count` is called. Drivers cap the
/// grant well below this.
pub const DEFAULT_BUFFER_COUNT: u32 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Streaming,
}

enum Stream<R> {
    Idle,
    Streaming(BufferPool<R>),
}

/// Walk an index-based enumeration until the transport reports exhaustion.
/// A fault is yielded once and ends the sequence.
fn enumerate<'a, V: 'a>(
    op: &'static str,
    mut query: impl FnMut(u32) -> io::Result<Option<V>> + 'a,
) -> impl Iterator<Item = Result<V>> + 'a {
    let mut index = 0;
    let mut done = false;
    std::iter::from_fn(move || {
        if done {
            return None;
        }
        match query(index) {
            Ok(Some(value)) => {
                index += 1;
                Some(Ok(value))
            }
            Ok(None) => {
                done = true;
                None
            }
            Err(source) => {
                done = true;
                Some(Err(Error::Transport { op, source }))
            }
        }
    })
}

/// One open capture device.
///
/// Not synchronized: drive a session from one thread, or wrap it in a lock.
pub struct Session<T: Transport = V4l2Transport> {
    transport: T,
    capabilities: Capabilities,
    buffer_count: u32,
    format: Option<NegotiatedFormat>,
    stream: Stream<T::Region>,
}

impl Session<V4l2Transport> {
    /// Open a V4L2 device node non-blocking and check it can stream video.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let transport = V4l2Transport::open(path).map_err(|source| Error::DeviceOpen {
            path: path.to_path_buf(),
            source,
        })?;
        Self::with_transport(transport)
    }
}

impl<T: Transport> Session<T> {
    /// Wrap an already opened transport, validating its capabilities.
    #[instrument(skip(transport))]
    pub fn with_transport(transport: T) -> Result<Self> {
        let capabilities = transport
            .capabilities()
            .map_err(|err| Error::Capability(format!("capability query failed: {err}")))?;

        if !capabilities.video_capture {
            return Err(Error::Capability("not a video capture device".into()));
        }
        if !capabilities.streaming {
            return Err(Error::Capability(
                "device does not support the streaming I/O method".into(),
            ));
        }
        info!("Device: {} ({})", capabilities.card, capabilities.driver);

        Ok(Self {
            transport,
            capabilities,
            buffer_count: DEFAULT_BUFFER_COUNT,
            format: None,
            stream: Stream::Idle,
        })
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn state(&self) -> StreamState {
        match self.stream {
            Stream::Idle => StreamState::Idle,
            Stream::Streaming(_) => StreamState::Streaming,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.state() == StreamState::Streaming
    }

    /// Last negotiated format, if any.
    pub fn format(&self) -> Option<NegotiatedFormat> {
        self.format
    }

    /// Requested count while idle, granted count once streaming has started.
    pub fn buffer_count(&self) -> u32 {
        self.buffer_count
    }

    /// Number of mapped buffers; zero while idle.
    pub fn pool_size(&self) -> u32 {
        match &self.stream {
            Stream::Streaming(pool) => pool.size(),
            Stream::Idle => 0,
        }
    }

    pub fn buffer_owner(&self, index: u32) -> Option<Owner> {
        match &self.stream {
            Stream::Streaming(pool) => pool.owner(index),
            Stream::Idle => None,
        }
    }

    // ===== Capability negotiation =====

    /// Lazily enumerate pixel formats.
    pub fn formats(&self) -> impl Iterator<Item = Result<FormatDescription>> + '_ {
        enumerate("enumerate formats", move |index| {
            self.transport.enum_format(index)
        })
    }

    /// Lazily enumerate frame sizes for `format`.
    pub fn frame_sizes(&self, format: PixelFormat) -> impl Iterator<Item = Result<FrameSize>> + '_ {
        enumerate("enumerate frame sizes", move |index| {
            self.transport.enum_frame_size(index, format)
        })
    }

    /// Supported formats with their descriptions. Enumeration stops at the
    /// first failure; a genuine fault is logged, not returned.
    pub fn supported_formats(&self) -> HashMap<PixelFormat, String> {
        let mut result = HashMap::new();
        for item in self.formats() {
            match item {
                Ok(desc) => {
                    result.insert(desc.format, desc.description);
                }
                Err(err) => {
                    warn!("Format enumeration stopped early: {err}");
                    break;
                }
            }
        }
        result
    }

    /// Like [`Session::supported_formats`] but propagates faults.
    pub fn try_supported_formats(&self) -> Result<HashMap<PixelFormat, String>> {
        self.formats()
            .map(|item| item.map(|desc| (desc.format, desc.description)))
            .collect()
    }

    /// Supported frame sizes for `format`, possibly empty. Same failure
    /// policy as [`Session::supported_formats`].
    pub fn supported_frame_sizes(&self, format: PixelFormat) -> Vec<FrameSize> {
        let mut result = Vec::new();
        for item in self.frame_sizes(format) {
            match item {
                Ok(size) => result.push(size),
                Err(err) => {
                    warn!(%format, "Frame size enumeration stopped early: {err}");
                    break;
                }
            }
        }
        result
    }

    pub fn try_supported_frame_sizes(&self, format: PixelFormat) -> Result<Vec<FrameSize>> {
        self.frame_sizes(format).collect()
    }

    /// Request a format and resolution. The returned record carries what the
    /// driver actually settled on, which may differ from the request.
    #[instrument(skip(self))]
    pub fn set_image_format(
        &mut self,
        format: PixelFormat,
        width: u32,
        height: u32,
    ) -> Result<NegotiatedFormat> {
        let negotiated = self
            .transport
            .set_format(format, width, height)
            .map_err(Error::FormatNegotiation)?;

        if negotiated.format != format || negotiated.width != width || negotiated.height != height {
            info!(
                "Driver adjusted format to {} {}x{}",
                negotiated.format, negotiated.width, negotiated.height
            );
        }
        self.format = Some(negotiated);
        Ok(negotiated)
    }

    pub fn set_buffer_count(&mut self, count: u32) -> Result<()> {
        if self.is_streaming() {
            return Err(Error::BufferCountLocked);
        }
        self.buffer_count = count;
        Ok(())
    }

    // ===== Controls =====

    /// Enumerate the device's enabled controls.
    pub fn controls(&self) -> Result<HashMap<ControlId, Control>> {
        let controls = self
            .transport
            .enum_controls()
            .map_err(Error::transport("enumerate controls"))?;
        Ok(controls
            .into_iter()
            .map(|c| {
                (
                    c.id,
                    Control {
                        name: c.name,
                        min: c.min,
                        max: c.max,
                    },
                )
            })
            .collect())
    }

    pub fn control(&self, id: ControlId) -> Result<i32> {
        self.transport
            .control(id)
            .map_err(|source| Error::Control { id, source })
    }

    pub fn set_control(&mut self, id: ControlId, value: i32) -> Result<()> {
        self.transport
            .set_control(id, value)
            .map_err(|source| Error::Control { id, source })
    }

    pub fn set_toggle(&mut self, toggle: BooleanControl, on: bool) -> Result<()> {
        self.set_control(toggle.id(), toggle.value(on))
    }

    /// Automatic white balance correction on (1) or off (0).
    pub fn set_auto_white_balance(&mut self, on: bool) -> Result<()> {
        self.set_toggle(BooleanControl::AutoWhiteBalance, on)
    }

    // ===== Streaming =====

    /// Allocate, map and enqueue the buffer pool, then start the stream.
    ///
    /// Nothing is left mapped or allocated if any step fails.
    #[instrument(skip(self))]
    pub fn start_streaming(&mut self) -> Result<()> {
        if self.is_streaming() {
            return Err(Error::AlreadyStreaming);
        }

        let granted = self
            .transport
            .request_buffers(self.buffer_count)
            .map_err(Error::transport("request buffers"))?;
        if granted == 0 {
            return Err(Error::NoBuffersGranted);
        }
        if granted != self.buffer_count {
            debug!(requested = self.buffer_count, granted, "Driver adjusted buffer count");
        }
        self.buffer_count = granted;

        let mut pool = match BufferPool::map(&mut self.transport, granted) {
            Ok(pool) => pool,
            Err(err) => {
                self.release_allocation();
                return Err(err);
            }
        };

        if let Err(err) = pool.enqueue_all(&mut self.transport) {
            self.rollback(pool);
            return Err(err);
        }
        if let Err(source) = self.transport.stream_on() {
            self.rollback(pool);
            return Err(Error::Transport {
                op: "start stream",
                source,
            });
        }

        info!("Capture stream started with {} buffers", granted);
        self.stream = Stream::Streaming(pool);
        Ok(())
    }

    /// Unmap every buffer and stop the stream. The session is idle afterwards
    /// even when this reports an error.
    #[instrument(skip(self))]
    pub fn stop_streaming(&mut self) -> Result<()> {
        let pool = match std::mem::replace(&mut self.stream, Stream::Idle) {
            Stream::Streaming(pool) => pool,
            Stream::Idle => return Err(Error::NotStreaming),
        };

        let held = pool.held();
        if held > 0 {
            warn!(held, "Stopping stream with frames still held");
        }

        let unmapped = pool.unmap(&mut self.transport);
        let stopped = self
            .transport
            .stream_off()
            .map_err(Error::transport("stop stream"));
        if stopped.is_ok() {
            self.release_allocation();
        }

        info!("Capture stream stopped");
        unmapped.and(stopped)
    }

    fn rollback(&mut self, pool: BufferPool<T::Region>) {
        if let Err(err) = pool.unmap(&mut self.transport) {
            warn!("Rollback failed to unmap buffers: {err}");
        }
        self.release_allocation();
    }

    fn release_allocation(&mut self) {
        if let Err(err) = self.transport.request_buffers(0) {
            warn!("Failed to release device buffers: {err}");
        }
    }

    // ===== Frame acquisition =====

    /// Dequeue a ready frame without blocking; `Ok(None)` if none is ready.
    ///
    /// The buffer belongs to the application until
    /// [`Session::release_frame`] is called with the frame's index.
    pub fn get_frame(&mut self) -> Result<Option<Frame<'_>>> {
        let Stream::Streaming(pool) = &mut self.stream else {
            return Err(Error::NotStreaming);
        };
        let Some(dequeued) = self.transport.dequeue_buffer().map_err(Error::Dequeue)? else {
            return Ok(None);
        };

        let data = pool.acquire(dequeued.index, dequeued.bytes_used)?;
        metrics::counter!("frames_acquired").increment(1);

        Ok(Some(Frame {
            index: dequeued.index,
            data,
            sequence: dequeued.sequence,
            timestamp: dequeued.timestamp,
        }))
    }

    /// Hand a frame obtained from [`Session::get_frame`] back to the device.
    ///
    /// Indexes the application does not hold are rejected.
    pub fn release_frame(&mut self, index: u32) -> Result<()> {
        let Stream::Streaming(pool) = &mut self.stream else {
            return Err(Error::NotStreaming);
        };
        pool.check_held(index)?;
        self.transport
            .enqueue_buffer(index)
            .map_err(|source| Error::Enqueue { index, source })?;
        pool.mark_queued(index);
        Ok(())
    }

    /// Acquire a frame, copy it out and release the buffer right away.
    ///
    /// The copy is owned; the device may refill the buffer as soon as it is
    /// released.
    pub fn read_frame(&mut self) -> Result<Option<Bytes>> {
        let (index, data) = match self.get_frame()? {
            Some(frame) => (frame.index, Bytes::copy_from_slice(frame.data)),
            None => return Ok(None),
        };
        self.release_frame(index)?;
        Ok(Some(data))
    }

    /// Block until a frame is ready, or fail with [`Error::Timeout`].
    pub fn wait_for_frame(&self, timeout: Duration) -> Result<()> {
        if !self.is_streaming() {
            return Err(Error::NotStreaming);
        }
        match self.transport.wait_readable(timeout) {
            Ok(true) => Ok(()),
            Ok(false) => Err(Error::Timeout),
            Err(source) => Err(Error::Transport {
                op: "wait for frame",
                source,
            }),
        }
    }

    /// Stop streaming best-effort and close the device. Only the close
    /// failure is reported.
    #[instrument(skip(self))]
    pub fn close(mut self) -> Result<()> {
        if self.is_streaming() {
            if let Err(err) = self.stop_streaming() {
                warn!("Ignoring stop failure during close: {err}");
            }
        }
        self.transport
            .close()
            .map_err(Error::transport("close device"))
    }
}

impl<T: Transport> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("Session");
        s.field("card", &self.capabilities.card)
            .field("buffer_count", &self.buffer_count)
            .field("format", &self.format)
            .field("state", &self.state());
        if let Stream::Streaming(pool) = &self.stream {
            s.field("pool", pool);
        }
        s.finish()
    }
}
