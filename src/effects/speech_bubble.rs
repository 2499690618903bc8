use image::{Rgba, RgbaImage};

use crate::composite;
use crate::error::Result;
use crate::media::frame::Frame;
use crate::media::reader::FrameSequence;
use crate::processing::Processor;

/// Share of the frame height taken by the bubble body
const BODY_HEIGHT: f64 = 0.2;

/// Tail length as a share of the frame height, below the body
const TAIL_HEIGHT: f64 = 0.12;

/// Cut a speech bubble shape out of the top of every frame
///
/// The bubble is an ellipse spanning the frame width with a tail pointing
/// down-left. It is stamped as a solid `fill`, transparent by default, which
/// turns the frame into a "reply" image.
pub struct SpeechBubbleProcessor {
    fill: [u8; 4],
}

impl SpeechBubbleProcessor {
    pub fn new() -> Self {
        Self { fill: [0, 0, 0, 0] }
    }

    pub fn with_fill(fill: Rgba<u8>) -> Self {
        Self { fill: fill.0 }
    }
}

impl Default for SpeechBubbleProcessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Opaque-where-cut mask for a frame of `width` x `height`
pub fn bubble_mask(width: u32, height: u32) -> RgbaImage {
    let body = ((height as f64 * BODY_HEIGHT).round() as u32).max(1);
    let tail = (height as f64 * TAIL_HEIGHT).round() as u32;
    let mut mask = RgbaImage::new(width, (body + tail).min(height.max(1)));
    let opaque = Rgba([255, 255, 255, 255]);

    // Ellipse centred above the frame so only its lower half shows
    let (cx, rx, ry) = (width as f64 / 2.0, width as f64 * 0.75, body as f64);
    for y in 0..body.min(mask.height()) {
        let dy = (y as f64 + 0.5) / ry;
        for x in 0..width {
            let dx = (x as f64 + 0.5 - cx) / rx;
            if dx * dx + dy * dy <= 1.0 {
                mask.put_pixel(x, y, opaque);
            }
        }
    }

    // Tail: a triangle narrowing from the body's lower edge
    let tip_x = width as f64 * 0.35;
    let base_left = width as f64 * 0.3;
    let base_right = width as f64 * 0.45;
    for y in body..mask.height() {
        let progress = (y - body) as f64 / tail.max(1) as f64;
        let left = base_left + (tip_x - base_left) * progress;
        let right = base_right + (tip_x - base_right) * progress;
        let (from, to) = (left.floor().max(0.0) as u32, (right.ceil() as u32).min(width));
        for x in from..to {
            mask.put_pixel(x, y, opaque);
        }
    }

    mask
}

impl Processor<RgbaImage> for SpeechBubbleProcessor {
    type Constant = RgbaImage;

    fn name(&self) -> &str {
        "speech_bubble"
    }

    fn constant_data(
        &self,
        first: &Frame<RgbaImage>,
        _frames: &mut dyn FrameSequence<RgbaImage>,
        _format: &str,
    ) -> Result<RgbaImage> {
        Ok(bubble_mask(first.content.width(), first.content.height()))
    }

    fn transform(&self, frame: Frame<RgbaImage>, mask: &RgbaImage) -> Result<RgbaImage> {
        let mut image = frame.content;
        let width = image.width();
        composite::cutout(&mut image, width, mask, mask.width(), (0, 0), self.fill);
        Ok(image)
    }
}
