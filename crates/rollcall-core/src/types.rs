use image::GrayImage;
use serde::{Deserialize, Serialize};

/// A detected face in frame coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl FaceBox {
    /// Integer pixel region of this face, clipped to a `frame_width` x `frame_height` frame.
    ///
    /// Returns `None` when nothing of the box lies inside the frame.
    pub fn region(&self, frame_width: u32, frame_height: u32) -> Option<Region> {
        let x0 = self.x.max(0.0).floor() as u32;
        let y0 = self.y.max(0.0).floor() as u32;
        let x1 = ((self.x + self.width).ceil().max(0.0) as u32).min(frame_width);
        let y1 = ((self.y + self.height).ceil().max(0.0) as u32).min(frame_height);

        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        Some(Region {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        })
    }
}

/// Axis-aligned pixel rectangle inside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    /// Copy this region out of a row-major grayscale buffer `frame_width` pixels wide.
    pub fn crop(&self, gray: &[u8], frame_width: u32) -> GrayImage {
        let stride = frame_width as usize;
        GrayImage::from_fn(self.width, self.height, |x, y| {
            image::Luma([gray[(self.y + y) as usize * stride + (self.x + x) as usize]])
        })
    }

    /// Shortest side, used to reject faces too small to recognize.
    pub fn min_side(&self) -> u32 {
        self.width.min(self.height)
    }
}
