//! Scripted in-memory transport for driving a `Session` without hardware.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::io;
use std::rc::Rc;
use std::time::Duration;

use webcam_capture::capture::{
    Capabilities, ControlDescription, ControlId, Dequeued, FormatDescription, FrameSize,
    NegotiatedFormat, PixelFormat, Transport,
};
use webcam_capture::Session;

pub fn fault(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Other, msg.to_string())
}

/// Device behaviour and the record of every call made against it.
#[derive(Debug)]
pub struct State {
    pub caps: io::Result<Capabilities>,
    pub formats: Vec<FormatDescription>,
    /// `enum_format` fails at this index instead of answering
    pub format_fault_at: Option<u32>,
    pub sizes: HashMap<PixelFormat, Vec<FrameSize>>,
    /// Largest size `set_format` will settle on
    pub max_size: (u32, u32),
    pub reject_format: bool,
    pub controls: Vec<ControlDescription>,
    pub values: HashMap<ControlId, i32>,

    /// Most buffers `request_buffers` will grant
    pub max_buffers: u32,
    /// Bytes copied into every mapped buffer
    pub payload: Vec<u8>,
    /// Mapped length of every buffer
    pub buffer_len: usize,
    /// Reported `bytes_used` of every dequeue; defaults to the payload length
    pub bytes_used: Option<u32>,

    pub fail_request: bool,
    pub fail_map_at: Option<u32>,
    pub fail_enqueue_at: Option<u32>,
    pub fail_unmap: BTreeSet<u32>,
    pub fail_stream_on: bool,
    pub fail_stream_off: bool,
    pub fail_wait: bool,
    pub fail_close: bool,

    /// Dequeues that report "not ready" before the queue is served
    pub not_ready: u32,
    /// Indexes reported by dequeue ahead of the real queue
    pub rogue_dequeues: VecDeque<u32>,
    /// Hold frames back from `wait_readable`
    pub stalled: bool,

    pub allocated: u32,
    pub mapped: BTreeSet<u32>,
    pub queue: VecDeque<u32>,
    pub streaming: bool,
    pub sequence: u32,
    pub log: Vec<String>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            caps: Ok(Capabilities {
                driver: "mock".into(),
                card: "Scripted Camera".into(),
                bus_info: "mock:0".into(),
                video_capture: true,
                streaming: true,
            }),
            formats: vec![
                FormatDescription {
                    format: PixelFormat::YUYV,
                    description: "YUYV 4:2:2".into(),
                },
                FormatDescription {
                    format: PixelFormat::MJPG,
                    description: "Motion-JPEG".into(),
                },
            ],
            format_fault_at: None,
            sizes: HashMap::from([
                (
                    PixelFormat::YUYV,
                    vec![FrameSize::fixed(640, 480), FrameSize::fixed(1280, 720)],
                ),
                (
                    PixelFormat::MJPG,
                    vec![FrameSize {
                        min_width: 160,
                        max_width: 1920,
                        step_width: 16,
                        min_height: 120,
                        max_height: 1080,
                        step_height: 8,
                    }],
                ),
            ]),
            max_size: (1280, 720),
            reject_format: false,
            controls: vec![
                ControlDescription {
                    id: ControlId::BRIGHTNESS,
                    name: "Brightness".into(),
                    min: 0,
                    max: 255,
                },
                ControlDescription {
                    id: ControlId::AUTO_WHITE_BALANCE,
                    name: "White Balance, Automatic".into(),
                    min: 0,
                    max: 1,
                },
            ],
            values: HashMap::new(),
            max_buffers: 4,
            payload: (0..32).collect(),
            buffer_len: 64,
            bytes_used: None,
            fail_request: false,
            fail_map_at: None,
            fail_enqueue_at: None,
            fail_unmap: BTreeSet::new(),
            fail_stream_on: false,
            fail_stream_off: false,
            fail_wait: false,
            fail_close: false,
            not_ready: 0,
            rogue_dequeues: VecDeque::new(),
            stalled: false,
            allocated: 0,
            mapped: BTreeSet::new(),
            queue: VecDeque::new(),
            streaming: false,
            sequence: 0,
            log: Vec::new(),
        }
    }
}

impl State {
    pub fn calls(&self, op: &str) -> usize {
        self.log.iter().filter(|entry| entry.starts_with(op)).count()
    }
}

pub type Shared = Rc<RefCell<State>>;

/// A mapped buffer: the scripted payload at the buffer's length.
#[derive(Debug)]
pub struct Region {
    pub index: u32,
    data: Vec<u8>,
}

impl AsRef<[u8]> for Region {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

pub struct MockTransport {
    state: Shared,
}

impl MockTransport {
    pub fn new(state: State) -> (Self, Shared) {
        let state = Rc::new(RefCell::new(state));
        (
            Self {
                state: Rc::clone(&state),
            },
            state,
        )
    }

    fn record(&self, entry: String) {
        self.state.borrow_mut().log.push(entry);
    }
}

/// A session over a default scripted device.
pub fn session() -> (Session<MockTransport>, Shared) {
    session_with(State::default())
}

pub fn session_with(state: State) -> (Session<MockTransport>, Shared) {
    let (transport, state) = MockTransport::new(state);
    let session = Session::with_transport(transport).expect("scripted device is capable");
    (session, state)
}

/// A session that is already streaming with `count` buffers requested.
pub fn streaming(count: u32) -> (Session<MockTransport>, Shared) {
    streaming_with(State::default(), count)
}

pub fn streaming_with(state: State, count: u32) -> (Session<MockTransport>, Shared) {
    let (mut session, state) = session_with(state);
    session.set_buffer_count(count).unwrap();
    session.start_streaming().unwrap();
    (session, state)
}

impl Transport for MockTransport {
    type Region = Region;

    fn capabilities(&self) -> io::Result<Capabilities> {
        match &self.state.borrow().caps {
            Ok(caps) => Ok(caps.clone()),
            Err(err) => Err(fault(&err.to_string())),
        }
    }

    fn enum_format(&self, index: u32) -> io::Result<Option<FormatDescription>> {
        let state = self.state.borrow();
        if state.format_fault_at == Some(index) {
            return Err(fault("enum format"));
        }
        Ok(state.formats.get(index as usize).cloned())
    }

    fn enum_frame_size(&self, index: u32, format: PixelFormat) -> io::Result<Option<FrameSize>> {
        let state = self.state.borrow();
        Ok(state
            .sizes
            .get(&format)
            .and_then(|sizes| sizes.get(index as usize))
            .copied())
    }

    fn set_format(
        &mut self,
        format: PixelFormat,
        width: u32,
        height: u32,
    ) -> io::Result<NegotiatedFormat> {
        self.record(format!("set_format {format} {width}x{height}"));
        let state = self.state.borrow();
        if state.reject_format {
            return Err(fault("set format"));
        }
        let format = if state.formats.iter().any(|f| f.format == format) {
            format
        } else {
            state.formats[0].format
        };
        let (width, height) = (width.min(state.max_size.0), height.min(state.max_size.1));
        Ok(NegotiatedFormat {
            format,
            width,
            height,
            bytes_per_line: width * 2,
            size_image: width * height * 2,
        })
    }

    fn enum_controls(&self) -> io::Result<Vec<ControlDescription>> {
        Ok(self.state.borrow().controls.clone())
    }

    fn control(&self, id: ControlId) -> io::Result<i32> {
        let state = self.state.borrow();
        if !state.controls.iter().any(|c| c.id == id) {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        Ok(state.values.get(&id).copied().unwrap_or_default())
    }

    fn set_control(&mut self, id: ControlId, value: i32) -> io::Result<()> {
        self.record(format!("set_control {id} {value}"));
        let mut state = self.state.borrow_mut();
        let Some(control) = state.controls.iter().find(|c| c.id == id).cloned() else {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        };
        state.values.insert(id, value.clamp(control.min, control.max));
        Ok(())
    }

    fn request_buffers(&mut self, count: u32) -> io::Result<u32> {
        self.record(format!("request_buffers {count}"));
        let mut state = self.state.borrow_mut();
        if state.fail_request {
            return Err(fault("request buffers"));
        }
        state.allocated = count.min(state.max_buffers);
        state.queue.clear();
        Ok(state.allocated)
    }

    fn map_buffer(&mut self, index: u32) -> io::Result<Region> {
        self.record(format!("map {index}"));
        let mut state = self.state.borrow_mut();
        if state.fail_map_at == Some(index) || index >= state.allocated {
            return Err(fault("map"));
        }
        state.mapped.insert(index);
        let mut data = state.payload.clone();
        data.resize(state.buffer_len, 0);
        Ok(Region { index, data })
    }

    fn unmap_buffer(&mut self, region: Region) -> io::Result<()> {
        self.record(format!("unmap {}", region.index));
        let mut state = self.state.borrow_mut();
        if state.fail_unmap.contains(&region.index) {
            return Err(fault("unmap"));
        }
        state.mapped.remove(&region.index);
        Ok(())
    }

    fn enqueue_buffer(&mut self, index: u32) -> io::Result<()> {
        self.record(format!("enqueue {index}"));
        let mut state = self.state.borrow_mut();
        if state.fail_enqueue_at == Some(index) {
            return Err(fault("enqueue"));
        }
        state.queue.push_back(index);
        Ok(())
    }

    fn dequeue_buffer(&mut self) -> io::Result<Option<Dequeued>> {
        let mut state = self.state.borrow_mut();
        if !state.streaming {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        if state.not_ready > 0 {
            state.not_ready -= 1;
            return Ok(None);
        }
        let index = match state.rogue_dequeues.pop_front() {
            Some(index) => index,
            None => match state.queue.pop_front() {
                Some(index) => index,
                None => return Ok(None),
            },
        };
        state.sequence += 1;
        let bytes_used = state.bytes_used.unwrap_or(state.payload.len() as u32);
        Ok(Some(Dequeued {
            index,
            bytes_used,
            sequence: state.sequence,
            timestamp: Duration::from_millis(u64::from(state.sequence) * 33),
        }))
    }

    fn stream_on(&mut self) -> io::Result<()> {
        self.record("stream_on".into());
        let mut state = self.state.borrow_mut();
        if state.fail_stream_on {
            return Err(fault("stream on"));
        }
        state.streaming = true;
        Ok(())
    }

    fn stream_off(&mut self) -> io::Result<()> {
        self.record("stream_off".into());
        let mut state = self.state.borrow_mut();
        if state.fail_stream_off {
            return Err(fault("stream off"));
        }
        state.streaming = false;
        state.queue.clear();
        Ok(())
    }

    fn wait_readable(&self, _timeout: Duration) -> io::Result<bool> {
        let state = self.state.borrow();
        if state.fail_wait {
            return Err(fault("poll"));
        }
        Ok(!state.stalled && !state.queue.is_empty())
    }

    fn close(self) -> io::Result<()> {
        self.record("close".into());
        if self.state.borrow().fail_close {
            return Err(fault("close"));
        }
        Ok(())
    }
}
