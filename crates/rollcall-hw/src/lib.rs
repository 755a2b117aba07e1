//! rollcall-hw: webcam capture for the attendance tool.
//!
//! Provides V4L2-based camera access and the [`FrameSource`] trait that the
//! capture and tracking sessions consume.

pub mod camera;
pub mod frame;
pub mod source;

pub use camera::{Camera, CameraError, CameraStream, DeviceInfo, PixelFormat};
pub use frame::Frame;
pub use source::FrameSource;
