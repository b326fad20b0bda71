//! V4L2 transport over a non-blocking device node with memory-mapped buffers

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::{AsFd, AsRawFd, IntoRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use memmap2::{MmapMut, MmapOptions};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use tracing::{debug, info, instrument};
use v4l::capability::Flags as CapFlags;

use crate::capture::controls::ControlId;
use crate::capture::frame::{FormatDescription, FrameSize, NegotiatedFormat, PixelFormat};
use crate::capture::ioctl::{self, *};
use crate::capture::transport::{Capabilities, ControlDescription, Dequeued, Transport};

/// Maps a nix result, treating `EINVAL` as the end of an enumeration.
fn enumerated<T>(result: nix::Result<libc::c_int>, value: impl FnOnce() -> T) -> io::Result<Option<T>> {
    match result {
        Ok(_) => Ok(Some(value())),
        Err(Errno::EINVAL) => Ok(None),
        Err(errno) => Err(errno.into()),
    }
}

/// Maps a dequeue result, treating `EAGAIN` as "no buffer filled yet".
fn dequeued<T>(result: nix::Result<libc::c_int>, value: impl FnOnce() -> T) -> io::Result<Option<T>> {
    match result {
        Ok(_) => Ok(Some(value())),
        Err(Errno::EAGAIN) => Ok(None),
        Err(errno) => Err(errno.into()),
    }
}

fn frame_size(size: &V4l2Frmsizeenum) -> io::Result<FrameSize> {
    match size.typ {
        V4L2_FRMSIZE_TYPE_DISCRETE => {
            let discrete = unsafe { size.frmsize.discrete };
            Ok(FrameSize::fixed(discrete.width, discrete.height))
        }
        V4L2_FRMSIZE_TYPE_STEPWISE | V4L2_FRMSIZE_TYPE_CONTINUOUS => {
            // Continuous ranges report a step of one
            let stepwise = unsafe { size.frmsize.stepwise };
            Ok(FrameSize {
                min_width: stepwise.min_width,
                max_width: stepwise.max_width,
                step_width: stepwise.step_width,
                min_height: stepwise.min_height,
                max_height: stepwise.max_height,
                step_height: stepwise.step_height,
            })
        }
        typ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unknown frame size type {typ}"),
        )),
    }
}

/// Whether a polled descriptor has a buffer to dequeue. Error conditions on
/// the queue are reported instead of being mistaken for readiness.
fn readable(revents: Option<PollFlags>) -> io::Result<bool> {
    let revents = revents.unwrap_or_else(PollFlags::empty);
    if revents.contains(PollFlags::POLLNVAL) {
        return Err(Errno::EBADF.into());
    }
    if revents.intersects(PollFlags::POLLERR | PollFlags::POLLHUP) {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!("device queue reported {revents:?}"),
        ));
    }
    Ok(revents.contains(PollFlags::POLLIN))
}

/// A device buffer mapped shared into process memory.
pub struct MappedBuffer {
    map: MmapMut,
}

impl AsRef<[u8]> for MappedBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.map[..]
    }
}

/// Linux V4L2 device.
pub struct V4l2Transport {
    path: PathBuf,
    file: File,
}

impl V4l2Transport {
    /// Open the device node read-write and non-blocking.
    #[instrument]
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)?;
        info!("Opened V4L2 device {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl Transport for V4l2Transport {
    type Region = MappedBuffer;

    fn capabilities(&self) -> io::Result<Capabilities> {
        let mut caps = V4l2Capability::default();
        unsafe { vidioc_querycap(self.fd(), &mut caps) }?;

        // device_caps describes this node; capabilities covers the whole device
        let flags = CapFlags::from_bits_truncate(if caps.device_caps != 0 {
            caps.device_caps
        } else {
            caps.capabilities
        });

        Ok(Capabilities {
            driver: ioctl::c_string(&caps.driver),
            card: ioctl::c_string(&caps.card),
            bus_info: ioctl::c_string(&caps.bus_info),
            video_capture: flags.contains(CapFlags::VIDEO_CAPTURE),
            streaming: flags.contains(CapFlags::STREAMING),
        })
    }

    fn enum_format(&self, index: u32) -> io::Result<Option<FormatDescription>> {
        let mut desc = V4l2Fmtdesc {
            index,
            typ: V4L2_BUF_TYPE_VIDEO_CAPTURE,
            ..Default::default()
        };
        let result = unsafe { vidioc_enum_fmt(self.fd(), &mut desc) };
        enumerated(result, || FormatDescription {
            format: PixelFormat::from_code(desc.pixel_format),
            description: ioctl::c_string(&desc.description),
        })
    }

    fn enum_frame_size(&self, index: u32, format: PixelFormat) -> io::Result<Option<FrameSize>> {
        let mut size = V4l2Frmsizeenum::new(index, format.code());
        let result = unsafe { vidioc_enum_framesizes(self.fd(), &mut size) };
        match enumerated(result, || size)? {
            Some(size) => frame_size(&size).map(Some),
            None => Ok(None),
        }
    }

    fn set_format(
        &mut self,
        format: PixelFormat,
        width: u32,
        height: u32,
    ) -> io::Result<NegotiatedFormat> {
        let mut fmt = V4l2Format::capture(V4l2PixFormat {
            width,
            height,
            pixelformat: format.code(),
            field: V4L2_FIELD_ANY,
            ..Default::default()
        });
        unsafe { vidioc_s_fmt(self.fd(), &mut fmt) }?;

        let pix = unsafe { fmt.fmt.pix };
        Ok(NegotiatedFormat {
            format: PixelFormat::from_code(pix.pixelformat),
            width: pix.width,
            height: pix.height,
            bytes_per_line: pix.bytesperline,
            size_image: pix.sizeimage,
        })
    }

    fn enum_controls(&self) -> io::Result<Vec<ControlDescription>> {
        let mut controls = Vec::new();
        let mut id = V4L2_CTRL_FLAG_NEXT_CTRL;

        loop {
            let mut query = V4l2Queryctrl {
                id,
                ..Default::default()
            };
            match unsafe { vidioc_queryctrl(self.fd(), &mut query) } {
                Ok(_) => {}
                Err(Errno::EINVAL) => break,
                Err(errno) => return Err(errno.into()),
            }
            id = query.id | V4L2_CTRL_FLAG_NEXT_CTRL;

            if query.flags & V4L2_CTRL_FLAG_DISABLED != 0
                || query.ctrl_type == V4L2_CTRL_TYPE_CTRL_CLASS
            {
                continue;
            }
            controls.push(ControlDescription {
                id: ControlId(query.id),
                name: ioctl::c_string(&query.name),
                min: query.minimum,
                max: query.maximum,
            });
        }

        Ok(controls)
    }

    fn control(&self, id: ControlId) -> io::Result<i32> {
        let mut ctrl = V4l2Control { id: id.0, value: 0 };
        unsafe { vidioc_g_ctrl(self.fd(), &mut ctrl) }?;
        Ok(ctrl.value)
    }

    fn set_control(&mut self, id: ControlId, value: i32) -> io::Result<()> {
        let mut ctrl = V4l2Control { id: id.0, value };
        unsafe { vidioc_s_ctrl(self.fd(), &mut ctrl) }?;
        if ctrl.value != value {
            debug!(%id, requested = value, actual = ctrl.value, "V4L2 control value was clamped");
        }
        Ok(())
    }

    fn request_buffers(&mut self, count: u32) -> io::Result<u32> {
        let mut req = V4l2Requestbuffers {
            count,
            typ: V4L2_BUF_TYPE_VIDEO_CAPTURE,
            memory: V4L2_MEMORY_MMAP,
            ..Default::default()
        };
        unsafe { vidioc_reqbufs(self.fd(), &mut req) }?;
        Ok(req.count)
    }

    fn map_buffer(&mut self, index: u32) -> io::Result<MappedBuffer> {
        let mut buf = V4l2Buffer::mmap_capture(index);
        unsafe { vidioc_querybuf(self.fd(), &mut buf) }?;

        let offset = unsafe { buf.m.offset };
        // The region is shared with the driver; it only writes while the
        // buffer sits in the device queue.
        let map = unsafe {
            MmapOptions::new()
                .offset(u64::from(offset))
                .len(buf.length as usize)
                .map_mut(&self.file)
        }?;
        debug!(index, offset, length = buf.length, "Mapped buffer");
        Ok(MappedBuffer { map })
    }

    fn unmap_buffer(&mut self, region: MappedBuffer) -> io::Result<()> {
        drop(region);
        Ok(())
    }

    fn enqueue_buffer(&mut self, index: u32) -> io::Result<()> {
        let mut buf = V4l2Buffer::mmap_capture(index);
        unsafe { vidioc_qbuf(self.fd(), &mut buf) }?;
        Ok(())
    }

    fn dequeue_buffer(&mut self) -> io::Result<Option<Dequeued>> {
        let mut buf = V4l2Buffer::mmap_capture(0);
        let result = unsafe { vidioc_dqbuf(self.fd(), &mut buf) };
        dequeued(result, || Dequeued {
            index: buf.index,
            bytes_used: buf.bytesused,
            sequence: buf.sequence,
            timestamp: Duration::from_secs(buf.timestamp.tv_sec.max(0) as u64)
                + Duration::from_micros(buf.timestamp.tv_usec.max(0) as u64),
        })
    }

    fn stream_on(&mut self) -> io::Result<()> {
        let typ = V4L2_BUF_TYPE_VIDEO_CAPTURE as libc::c_int;
        unsafe { vidioc_streamon(self.fd(), &typ) }?;
        Ok(())
    }

    fn stream_off(&mut self) -> io::Result<()> {
        let typ = V4L2_BUF_TYPE_VIDEO_CAPTURE as libc::c_int;
        unsafe { vidioc_streamoff(self.fd(), &typ) }?;
        Ok(())
    }

    fn wait_readable(&self, timeout: Duration) -> io::Result<bool> {
        let millis = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        let timeout = PollTimeout::try_from(millis)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("{e:?}")))?;
        let mut fds = [PollFd::new(self.file.as_fd(), PollFlags::POLLIN)];
        loop {
            match poll(&mut fds, timeout) {
                Ok(0) => return Ok(false),
                Ok(_) => return readable(fds[0].revents()),
                Err(Errno::EINTR) => continue,
                Err(errno) => return Err(errno.into()),
            }
        }
    }

    fn close(self) -> io::Result<()> {
        let fd = self.file.into_raw_fd();
        if unsafe { libc::close(fd) } < 0 {
            return Err(io::Error::last_os_error());
        }
        info!("Closed V4L2 device {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn einval_ends_an_enumeration() {
        assert!(enumerated(Err(Errno::EINVAL), || ()).unwrap().is_none());
    }

    #[test]
    fn other_errnos_fail_an_enumeration() {
        let err = enumerated(Err(Errno::EIO), || ()).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EIO));
    }

    #[test]
    fn successful_enumeration_yields_the_entry() {
        assert_eq!(enumerated(Ok(0), || 7).unwrap(), Some(7));
    }

    #[test]
    fn eagain_on_dequeue_is_not_ready() {
        assert!(dequeued(Err(Errno::EAGAIN), || ()).unwrap().is_none());
        assert_eq!(dequeued(Ok(0), || 3).unwrap(), Some(3));
    }

    #[test]
    fn other_errnos_fail_a_dequeue() {
        for errno in [Errno::EIO, Errno::EINVAL, Errno::EPIPE] {
            let err = dequeued(Err(errno), || ()).unwrap_err();
            assert_eq!(err.raw_os_error(), Some(errno as i32));
        }
    }

    #[test]
    fn frame_size_types_are_decoded() {
        let mut size = V4l2Frmsizeenum::new(0, PixelFormat::YUYV.code());
        size.typ = V4L2_FRMSIZE_TYPE_DISCRETE;
        size.frmsize.discrete = V4l2FrmsizeDiscrete {
            width: 640,
            height: 480,
        };
        assert_eq!(frame_size(&size).unwrap(), FrameSize::fixed(640, 480));

        size.typ = V4L2_FRMSIZE_TYPE_CONTINUOUS;
        size.frmsize.stepwise = V4l2FrmsizeStepwise {
            min_width: 16,
            max_width: 1920,
            step_width: 1,
            min_height: 16,
            max_height: 1080,
            step_height: 1,
        };
        let continuous = frame_size(&size).unwrap();
        assert_eq!((continuous.min_width, continuous.max_height), (16, 1080));
        assert!(!continuous.is_fixed());

        size.typ = 9;
        let err = frame_size(&size).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn poll_errors_are_not_readiness() {
        assert!(readable(Some(PollFlags::POLLIN)).unwrap());
        assert!(!readable(Some(PollFlags::empty())).unwrap());
        assert!(!readable(None).unwrap());
        assert!(readable(Some(PollFlags::POLLERR)).is_err());
        assert!(readable(Some(PollFlags::POLLIN | PollFlags::POLLERR)).is_err());
        assert!(readable(Some(PollFlags::POLLHUP)).is_err());
        let err = readable(Some(PollFlags::POLLNVAL)).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EBADF));
    }
}
