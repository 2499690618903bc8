use std::time::Duration;

use tracing::debug;

use crate::error::Result;
use crate::media::backends::MemoryReader;
use crate::media::decorators::speed;
use crate::media::frame::{Frame, FrameContent};
use crate::media::reader::{BoxedReader, FrameIter, MediaReader};

/// Generic reversal for readers without a cheap native one
///
/// The forward sequence is decoded once, on first access, and both access
/// modes are served from that cache afterwards. Reversing a `Reversed`
/// hands back the wrapped reader instead of stacking another layer.
pub struct Reversed<E: FrameContent> {
    inner: BoxedReader<E>,
    cache: Option<MemoryReader<E>>,
}

impl<E: FrameContent> Reversed<E> {
    pub fn wrap(inner: BoxedReader<E>) -> BoxedReader<E> {
        Box::new(Self { inner, cache: None })
    }

    fn materialized(&mut self) -> Result<&mut MemoryReader<E>> {
        let cache = match self.cache.take() {
            Some(cache) => cache,
            None => {
                let frames = self.inner.frames()?.collect::<Result<Vec<Frame<E>>>>()?;
                debug!("Materialized {} frames for reversal", frames.len());
                MemoryReader::from_frames(
                    frames,
                    self.inner.width(),
                    self.inner.height(),
                    self.inner.loop_count(),
                )
                .with_audio(
                    self.inner.audio_channels(),
                    self.inner.audio_sample_rate(),
                    self.inner.audio_bitrate(),
                )
                .into_reversed()
            }
        };
        Ok(self.cache.insert(cache))
    }
}

impl<E: FrameContent> MediaReader<E> for Reversed<E> {
    fn frame_count(&self) -> usize {
        self.inner.frame_count()
    }

    fn frame_rate(&self) -> f64 {
        self.inner.frame_rate()
    }

    fn duration(&self) -> Duration {
        self.inner.duration()
    }

    fn frame_duration(&self) -> Duration {
        self.inner.frame_duration()
    }

    fn width(&self) -> u32 {
        self.inner.width()
    }

    fn height(&self) -> u32 {
        self.inner.height()
    }

    fn loop_count(&self) -> i32 {
        self.inner.loop_count()
    }

    fn audio_channels(&self) -> u16 {
        self.inner.audio_channels()
    }

    fn audio_sample_rate(&self) -> u32 {
        self.inner.audio_sample_rate()
    }

    fn audio_bitrate(&self) -> u32 {
        self.inner.audio_bitrate()
    }

    fn read_frame_at(&mut self, timestamp: Duration) -> Result<Frame<E>> {
        self.materialized()?.read_frame(timestamp)
    }

    fn frames(&mut self) -> Result<FrameIter<'_, E>> {
        self.materialized()?.frames()
    }

    fn reversed(self: Box<Self>) -> Result<BoxedReader<E>> {
        Ok(self.inner)
    }

    fn change_speed(self: Box<Self>, speed: f64) -> Result<BoxedReader<E>> {
        speed::change(self, speed)
    }

    fn close(&mut self) -> Result<()> {
        self.cache = None;
        self.inner.close()
    }
}
