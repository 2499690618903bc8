use image::{imageops, RgbaImage};

use crate::error::{EngineError, Result};
use crate::media::frame::Frame;
use crate::media::reader::FrameSequence;
use crate::processing::Processor;

/// Axis-aligned pixel rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// The whole area of a `width` x `height` image
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Smallest rectangle containing both; an empty side yields the other
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Rect::new(x, y, self.right().max(other.right()) - x, self.bottom().max(other.bottom()) - y)
    }

    /// This rectangle cut down to fit inside a `width` x `height` image
    pub fn clamp_to(&self, width: u32, height: u32) -> Rect {
        let x = self.x.min(width);
        let y = self.y.min(height);
        Rect::new(x, y, self.right().min(width) - x, self.bottom().min(height) - y)
    }
}

/// Crop every frame to a fixed rectangle
pub struct CropProcessor {
    rect: Rect,
}

impl CropProcessor {
    pub fn new(rect: Rect) -> Self {
        Self { rect }
    }
}

impl Processor<RgbaImage> for CropProcessor {
    type Constant = Rect;

    fn name(&self) -> &str {
        "crop"
    }

    fn constant_data(
        &self,
        first: &Frame<RgbaImage>,
        _frames: &mut dyn FrameSequence<RgbaImage>,
        _format: &str,
    ) -> Result<Rect> {
        let (width, height) = first.content.dimensions();
        let rect = self.rect.clamp_to(width, height);
        if rect.is_empty() {
            return Err(EngineError::unsupported("crop area lies outside the image"));
        }
        Ok(rect)
    }

    fn transform(&self, frame: Frame<RgbaImage>, rect: &Rect) -> Result<RgbaImage> {
        if *rect == Rect::full(frame.content.width(), frame.content.height()) {
            return Ok(frame.content);
        }
        Ok(imageops::crop_imm(&frame.content, rect.x, rect.y, rect.width, rect.height).to_image())
    }
}
