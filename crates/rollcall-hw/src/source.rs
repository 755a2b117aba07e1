use crate::camera::CameraError;
use crate::frame::Frame;

/// Anything that yields grayscale frames one at a time.
///
/// Implemented by [`CameraStream`](crate::CameraStream); sessions are generic
/// over it so they can run against recorded or synthetic frames.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Frame, CameraError>;

    /// Discard `count` frames so auto-exposure can settle.
    fn warm_up(&mut self, count: usize) {
        for _ in 0..count {
            if let Err(e) = self.next_frame() {
                tracing::debug!(error = %e, "warmup frame failed");
            }
        }
    }
}
