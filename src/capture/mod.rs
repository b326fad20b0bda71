pub mod controls;
pub mod frame;
mod ioctl;
pub mod pool;
pub mod session;
pub mod transport;
pub mod v4l2;

pub use controls::{BooleanControl, Control, ControlId, ToggleMapping};
pub use frame::{FormatDescription, Frame, FrameSize, NegotiatedFormat, PixelFormat};
pub use pool::Owner;
pub use session::{Session, StreamState, DEFAULT_BUFFER_COUNT};
pub use transport::{Capabilities, ControlDescription, Dequeued, Transport};
pub use v4l2::{MappedBuffer, V4l2Transport};
