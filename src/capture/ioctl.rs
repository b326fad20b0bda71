//! V4L2 ioctl bindings and the kernel structs they use.
//!
//! Layouts follow `linux/videodev2.h`; see
//! https://www.kernel.org/doc/html/latest/userspace-api/media/v4l/user-func.html

use std::ffi::c_void;

pub const V4L2_BUF_TYPE_VIDEO_CAPTURE: u32 = 1;
pub const V4L2_MEMORY_MMAP: u32 = 1;
pub const V4L2_FIELD_ANY: u32 = 0;

pub const V4L2_FRMSIZE_TYPE_DISCRETE: u32 = 1;
pub const V4L2_FRMSIZE_TYPE_CONTINUOUS: u32 = 2;
pub const V4L2_FRMSIZE_TYPE_STEPWISE: u32 = 3;

pub const V4L2_CTRL_FLAG_DISABLED: u32 = 0x0001;
pub const V4L2_CTRL_FLAG_NEXT_CTRL: u32 = 0x8000_0000;
pub const V4L2_CTRL_TYPE_CTRL_CLASS: u32 = 6;

const VIDIOC: u8 = b'V';
const VIDIOC_QUERYCAP: u8 = 0;
const VIDIOC_ENUM_FMT: u8 = 2;
const VIDIOC_S_FMT: u8 = 5;
const VIDIOC_REQBUFS: u8 = 8;
const VIDIOC_QUERYBUF: u8 = 9;
const VIDIOC_QBUF: u8 = 15;
const VIDIOC_DQBUF: u8 = 17;
const VIDIOC_STREAMON: u8 = 18;
const VIDIOC_STREAMOFF: u8 = 19;
const VIDIOC_G_CTRL: u8 = 27;
const VIDIOC_S_CTRL: u8 = 28;
const VIDIOC_QUERYCTRL: u8 = 36;
const VIDIOC_ENUM_FRAMESIZES: u8 = 74;

/// Decode a fixed-size, NUL-padded kernel string.
pub fn c_string(bytes: &[u8]) -> String {
    let len = bytes.iter().position(|&c| c == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..len]).into_owned()
}

#[repr(C)]
#[derive(Default)]
pub struct V4l2Capability {
    pub driver: [u8; 16],
    pub card: [u8; 32],
    pub bus_info: [u8; 32],
    pub version: u32,
    pub capabilities: u32,
    pub device_caps: u32,
    pub reserved: [u32; 3],
}

nix::ioctl_read!(vidioc_querycap, VIDIOC, VIDIOC_QUERYCAP, V4l2Capability);

#[repr(C)]
#[derive(Default)]
pub struct V4l2Fmtdesc {
    pub index: u32,
    pub typ: u32,
    pub flags: u32,
    pub description: [u8; 32],
    pub pixel_format: u32,
    pub mbus_code: u32,
    pub reserved: [u32; 3],
}

nix::ioctl_readwrite!(vidioc_enum_fmt, VIDIOC, VIDIOC_ENUM_FMT, V4l2Fmtdesc);

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct V4l2FrmsizeDiscrete {
    pub width: u32,
    pub height: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct V4l2FrmsizeStepwise {
    pub min_width: u32,
    pub max_width: u32,
    pub step_width: u32,
    pub min_height: u32,
    pub max_height: u32,
    pub step_height: u32,
}

#[repr(C)]
pub union V4l2Frmsize {
    pub discrete: V4l2FrmsizeDiscrete,
    pub stepwise: V4l2FrmsizeStepwise,
}

#[repr(C)]
pub struct V4l2Frmsizeenum {
    pub index: u32,
    pub pixel_format: u32,
    pub typ: u32,
    pub frmsize: V4l2Frmsize,
    pub reserved: [u32; 2],
}

impl V4l2Frmsizeenum {
    pub fn new(index: u32, pixel_format: u32) -> Self {
        Self {
            index,
            pixel_format,
            typ: 0,
            frmsize: V4l2Frmsize {
                stepwise: V4l2FrmsizeStepwise::default(),
            },
            reserved: [0; 2],
        }
    }
}

nix::ioctl_readwrite!(vidioc_enum_framesizes, VIDIOC, VIDIOC_ENUM_FRAMESIZES, V4l2Frmsizeenum);

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct V4l2PixFormat {
    pub width: u32,
    pub height: u32,
    pub pixelformat: u32,
    pub field: u32,
    pub bytesperline: u32,
    pub sizeimage: u32,
    pub colorspace: u32,
    pub priv_: u32,
    pub flags: u32,
    pub ycbcr_enc: u32,
    pub quantization: u32,
    pub xfer_func: u32,
}

/// The kernel union also holds pointer-bearing members, hence the alignment.
#[repr(C)]
pub union V4l2FormatUnion {
    pub pix: V4l2PixFormat,
    pub raw_data: [u8; 200],
    _align: [usize; 0],
}

#[repr(C)]
pub struct V4l2Format {
    pub typ: u32,
    pub fmt: V4l2FormatUnion,
}

impl V4l2Format {
    pub fn capture(pix: V4l2PixFormat) -> Self {
        let mut format = Self {
            typ: V4L2_BUF_TYPE_VIDEO_CAPTURE,
            fmt: V4l2FormatUnion { raw_data: [0; 200] },
        };
        format.fmt.pix = pix;
        format
    }
}

nix::ioctl_readwrite!(vidioc_s_fmt, VIDIOC, VIDIOC_S_FMT, V4l2Format);

#[repr(C)]
#[derive(Default)]
pub struct V4l2Requestbuffers {
    pub count: u32,
    pub typ: u32,
    pub memory: u32,
    pub capabilities: u32,
    pub flags: u8,
    pub reserved: [u8; 3],
}

nix::ioctl_readwrite!(vidioc_reqbufs, VIDIOC, VIDIOC_REQBUFS, V4l2Requestbuffers);

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct V4l2Timecode {
    pub typ: u32,
    pub flags: u32,
    pub frames: u8,
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    pub userbits: [u8; 4],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union V4l2BufferM {
    pub offset: u32,
    pub userptr: libc::c_ulong,
    pub planes: *mut c_void,
    pub fd: i32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct V4l2Buffer {
    pub index: u32,
    pub typ: u32,
    pub bytesused: u32,
    pub flags: u32,
    pub field: u32,
    pub timestamp: libc::timeval,
    pub timecode: V4l2Timecode,
    pub sequence: u32,
    pub memory: u32,
    pub m: V4l2BufferM,
    pub length: u32,
    pub reserved2: u32,
    pub request_fd: i32,
}

impl V4l2Buffer {
    /// An mmap capture buffer descriptor for `index`.
    pub fn mmap_capture(index: u32) -> Self {
        Self {
            index,
            typ: V4L2_BUF_TYPE_VIDEO_CAPTURE,
            bytesused: 0,
            flags: 0,
            field: 0,
            timestamp: libc::timeval {
                tv_sec: 0,
                tv_usec: 0,
            },
            timecode: V4l2Timecode::default(),
            sequence: 0,
            memory: V4L2_MEMORY_MMAP,
            m: V4l2BufferM { userptr: 0 },
            length: 0,
            reserved2: 0,
            request_fd: 0,
        }
    }
}

nix::ioctl_readwrite!(vidioc_querybuf, VIDIOC, VIDIOC_QUERYBUF, V4l2Buffer);
nix::ioctl_readwrite!(vidioc_qbuf, VIDIOC, VIDIOC_QBUF, V4l2Buffer);
nix::ioctl_readwrite!(vidioc_dqbuf, VIDIOC, VIDIOC_DQBUF, V4l2Buffer);
nix::ioctl_write_ptr!(vidioc_streamon, VIDIOC, VIDIOC_STREAMON, libc::c_int);
nix::ioctl_write_ptr!(vidioc_streamoff, VIDIOC, VIDIOC_STREAMOFF, libc::c_int);

#[repr(C)]
#[derive(Default)]
pub struct V4l2Control {
    pub id: u32,
    pub value: i32,
}

nix::ioctl_readwrite!(vidioc_g_ctrl, VIDIOC, VIDIOC_G_CTRL, V4l2Control);
nix::ioctl_readwrite!(vidioc_s_ctrl, VIDIOC, VIDIOC_S_CTRL, V4l2Control);

#[repr(C)]
#[derive(Default)]
pub struct V4l2Queryctrl {
    pub id: u32,
    pub ctrl_type: u32,
    pub name: [u8; 32],
    pub minimum: i32,
    pub maximum: i32,
    pub step: i32,
    pub default_value: i32,
    pub flags: u32,
    pub reserved: [u32; 2],
}

nix::ioctl_readwrite!(vidioc_queryctrl, VIDIOC, VIDIOC_QUERYCTRL, V4l2Queryctrl);
