use image::{imageops, RgbaImage};

use crate::error::Result;
use crate::media::frame::Frame;
use crate::media::reader::FrameSequence;
use crate::processing::Processor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipAxis {
    /// Mirror left to right
    Horizontal,
    /// Mirror top to bottom
    Vertical,
}

pub struct FlipProcessor {
    axis: FlipAxis,
}

impl FlipProcessor {
    pub fn new(axis: FlipAxis) -> Self {
        Self { axis }
    }
}

impl Processor<RgbaImage> for FlipProcessor {
    type Constant = ();

    fn name(&self) -> &str {
        match self.axis {
            FlipAxis::Horizontal => "flip",
            FlipAxis::Vertical => "flop",
        }
    }

    fn constant_data(
        &self,
        _first: &Frame<RgbaImage>,
        _frames: &mut dyn FrameSequence<RgbaImage>,
        _format: &str,
    ) -> Result<()> {
        Ok(())
    }

    fn transform(&self, frame: Frame<RgbaImage>, _: &()) -> Result<RgbaImage> {
        let mut image = frame.content;
        match self.axis {
            FlipAxis::Horizontal => imageops::flip_horizontal_in_place(&mut image),
            FlipAxis::Vertical => imageops::flip_vertical_in_place(&mut image),
        }
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::time::Duration;

    fn marked() -> Frame<RgbaImage> {
        let mut image = RgbaImage::new(3, 2);
        image.put_pixel(0, 0, Rgba([255, 255, 255, 255]));
        Frame::new(image, Duration::from_millis(10), Duration::ZERO)
    }

    #[test]
    fn test_horizontal() {
        let out = FlipProcessor::new(FlipAxis::Horizontal).transform(marked(), &()).unwrap();
        assert_eq!(out.get_pixel(2, 0)[3], 255);
        assert_eq!(out.get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn test_vertical() {
        let out = FlipProcessor::new(FlipAxis::Vertical).transform(marked(), &()).unwrap();
        assert_eq!(out.get_pixel(0, 1)[3], 255);
    }
}
