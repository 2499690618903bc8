use image::{Rgba, RgbaImage};

use crate::composite;
use crate::error::{EngineError, Result};
use crate::media::frame::Frame;
use crate::media::reader::FrameSequence;
use crate::processing::Processor;

/// Rotate each frame by an angle proportional to its timestamp
///
/// Every frame is drawn on the same square canvas, as wide as the first
/// frame's diagonal, so the image never clips while it turns.
pub struct SpinProcessor {
    degrees_per_second: f64,
    fill: Option<Rgba<u8>>,
}

impl SpinProcessor {
    pub fn new(degrees_per_second: f64) -> Self {
        Self {
            degrees_per_second,
            fill: None,
        }
    }

    /// Colour for the corners exposed by the rotation (transparent by default)
    pub fn with_fill(mut self, fill: Rgba<u8>) -> Self {
        self.fill = Some(fill);
        self
    }

    pub fn angle_at(&self, frame: &Frame<RgbaImage>) -> f64 {
        (frame.timestamp.as_secs_f64() * self.degrees_per_second) % 360.0
    }
}

impl Processor<RgbaImage> for SpinProcessor {
    type Constant = u32;

    fn name(&self) -> &str {
        "spin"
    }

    fn constant_data(
        &self,
        first: &Frame<RgbaImage>,
        _frames: &mut dyn FrameSequence<RgbaImage>,
        _format: &str,
    ) -> Result<u32> {
        if !self.degrees_per_second.is_finite() {
            return Err(EngineError::unsupported("spin speed must be a number"));
        }
        let (width, height) = first.content.dimensions();
        let diagonal = ((width as f64).hypot(height as f64)).ceil() as u32;
        Ok(diagonal.max(1))
    }

    fn transform(&self, frame: Frame<RgbaImage>, side: &u32) -> Result<RgbaImage> {
        let angle = self.angle_at(&frame);
        Ok(composite::rotate(&frame.content, angle, Some((*side, *side)), self.fill))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::backends::memory::test_support::*;
    use crate::processing::{process, FrameProcessor};
    use std::time::Duration;

    #[test]
    fn test_constant_canvas() {
        let mut reader = tagged_reader(&[500, 500, 500]);
        let mut sizes = Vec::new();
        process(&mut reader, &FrameProcessor::new(SpinProcessor::new(90.0)), "gif", |frame| {
            sizes.push(frame.content.dimensions());
            Ok(())
        })
        .unwrap();
        assert_eq!(sizes, vec![(6, 6); 3]);
    }

    #[test]
    fn test_angle_from_timestamp() {
        let spin = SpinProcessor::new(180.0);
        let frame = Frame::new(tagged_image(0, 2, 2), Duration::from_millis(100), Duration::from_millis(1500));
        assert!((spin.angle_at(&frame) - 270.0).abs() < 1e-9);
        let late = Frame::new(tagged_image(0, 2, 2), Duration::from_millis(100), Duration::from_secs(4));
        assert!(spin.angle_at(&late).abs() < 1e-9);
    }
}
