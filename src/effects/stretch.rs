use image::RgbaImage;

use crate::composite;
use crate::error::{EngineError, Result};
use crate::media::frame::Frame;
use crate::media::reader::FrameSequence;
use crate::processing::Processor;

/// Output size of a stretch
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StretchSize {
    /// Exact pixel size
    Absolute(u32, u32),
    /// Multiples of the input width and height
    Relative(f64, f64),
}

/// Resize every frame to one size worked out from the first frame
pub struct StretchProcessor {
    size: StretchSize,
}

impl StretchProcessor {
    pub fn new(size: StretchSize) -> Self {
        Self { size }
    }
}

impl Processor<RgbaImage> for StretchProcessor {
    type Constant = (u32, u32);

    fn name(&self) -> &str {
        "stretch"
    }

    fn constant_data(
        &self,
        first: &Frame<RgbaImage>,
        _frames: &mut dyn FrameSequence<RgbaImage>,
        _format: &str,
    ) -> Result<(u32, u32)> {
        let (width, height) = first.content.dimensions();
        let size = match self.size {
            StretchSize::Absolute(w, h) => (w, h),
            StretchSize::Relative(fx, fy) => {
                if !(fx > 0.0 && fy > 0.0) {
                    return Err(EngineError::unsupported("stretch factors must be positive"));
                }
                (
                    ((width as f64 * fx).round() as u32).max(1),
                    ((height as f64 * fy).round() as u32).max(1),
                )
            }
        };

        if size.0 == 0 || size.1 == 0 {
            return Err(EngineError::unsupported("cannot stretch to an empty size"));
        }
        Ok(size)
    }

    fn transform(&self, frame: Frame<RgbaImage>, size: &(u32, u32)) -> Result<RgbaImage> {
        Ok(composite::stretch(frame.content, *size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::backends::memory::test_support::*;
    use crate::processing::{process, FrameProcessor};

    fn sizes(size: StretchSize) -> Result<Vec<(u32, u32)>> {
        let mut reader = tagged_reader(&[10, 10]);
        let mut out = Vec::new();
        process(&mut reader, &FrameProcessor::new(StretchProcessor::new(size)), "gif", |frame| {
            out.push(frame.content.dimensions());
            Ok(())
        })?;
        Ok(out)
    }

    #[test]
    fn test_absolute() {
        assert_eq!(sizes(StretchSize::Absolute(10, 2)).unwrap(), vec![(10, 2), (10, 2)]);
    }

    #[test]
    fn test_relative() {
        assert_eq!(sizes(StretchSize::Relative(2.0, 0.5)).unwrap(), vec![(8, 2), (8, 2)]);
    }

    #[test]
    fn test_invalid_sizes() {
        assert!(sizes(StretchSize::Absolute(0, 4)).is_err());
        assert!(sizes(StretchSize::Relative(-1.0, 1.0)).is_err());
    }
}
