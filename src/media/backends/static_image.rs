use std::time::Duration;

use image::RgbaImage;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::media::decorators::speed;
use crate::media::frame::Frame;
use crate::media::reader::{BoxedReader, FrameIter, MediaReader};
use crate::source::ByteSource;

/// A still raster image presented as a single short frame
///
/// Reversal is the identity and speed changes only stretch the one frame.
pub struct StaticImageReader {
    image: Option<RgbaImage>,
    frame_duration: Duration,
}

impl StaticImageReader {
    pub fn open(source: &ByteSource, frame_duration: Duration) -> Result<Self> {
        let bytes = source.read_all()?;
        let image = image::load_from_memory(&bytes).map_err(|e| {
            debug!("Still image decode of {} failed: {}", source.name(), e);
            EngineError::unreadable(source.name())
        })?;
        Ok(Self::from_image(image.to_rgba8(), frame_duration))
    }

    pub fn from_image(image: RgbaImage, frame_duration: Duration) -> Self {
        Self {
            image: Some(image),
            frame_duration,
        }
    }

    fn frame(&self) -> Result<Frame<RgbaImage>> {
        let image = self
            .image
            .as_ref()
            .ok_or_else(|| EngineError::unsupported("reader is closed"))?;
        Ok(Frame::new(image.clone(), self.frame_duration, Duration::ZERO))
    }
}

impl MediaReader<RgbaImage> for StaticImageReader {
    fn frame_count(&self) -> usize {
        usize::from(self.image.is_some())
    }

    fn frame_rate(&self) -> f64 {
        0.0
    }

    fn duration(&self) -> Duration {
        if self.image.is_some() {
            self.frame_duration
        } else {
            Duration::ZERO
        }
    }

    fn frame_duration(&self) -> Duration {
        self.frame_duration
    }

    fn width(&self) -> u32 {
        self.image.as_ref().map(|i| i.width()).unwrap_or(0)
    }

    fn height(&self) -> u32 {
        self.image.as_ref().map(|i| i.height()).unwrap_or(0)
    }

    fn loop_count(&self) -> i32 {
        -1
    }

    fn read_frame_at(&mut self, _timestamp: Duration) -> Result<Frame<RgbaImage>> {
        self.frame()
    }

    fn frames(&mut self) -> Result<FrameIter<'_, RgbaImage>> {
        Ok(Box::new(std::iter::once(self.frame())))
    }

    fn reversed(self: Box<Self>) -> Result<BoxedReader<RgbaImage>> {
        Ok(self)
    }

    fn change_speed(self: Box<Self>, speed: f64) -> Result<BoxedReader<RgbaImage>> {
        speed::change(self, speed)
    }

    fn close(&mut self) -> Result<()> {
        self.image = None;
        Ok(())
    }
}
