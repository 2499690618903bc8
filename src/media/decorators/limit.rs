use std::time::Duration;

use tracing::debug;

use crate::error::Result;
use crate::media::decorators::{speed, Reversed};
use crate::media::frame::{Frame, FrameContent};
use crate::media::reader::{BoxedReader, FrameIter, MediaReader};

/// Truncate a reader to at most `max` of playback
///
/// Readers already within the limit are returned unchanged.
pub fn limit<E: FrameContent>(reader: BoxedReader<E>, max: Duration) -> Result<BoxedReader<E>> {
    if reader.duration() <= max {
        return Ok(reader);
    }
    Ok(Box::new(DurationLimited::new(reader, max)?))
}

/// Reader cut off after the last frame that fits within a time budget
///
/// The first frame is always kept, even when it alone is longer than the
/// budget, so a non-empty input never becomes empty.
pub struct DurationLimited<E: FrameContent> {
    inner: BoxedReader<E>,
    count: usize,
    duration: Duration,
}

impl<E: FrameContent> DurationLimited<E> {
    pub fn new(mut inner: BoxedReader<E>, max: Duration) -> Result<Self> {
        let mut count = 0;
        let mut elapsed = Duration::ZERO;

        for frame in inner.frames()? {
            let frame = frame?;
            let end = elapsed + frame.duration;
            if count > 0 && end > max {
                break;
            }
            count += 1;
            elapsed = end;
        }

        debug!(
            "Limited {} frames to {} ({:?} of {:?})",
            inner.frame_count(),
            count,
            elapsed,
            inner.duration()
        );

        Ok(Self {
            inner,
            count,
            duration: elapsed,
        })
    }
}

impl<E: FrameContent> MediaReader<E> for DurationLimited<E> {
    fn frame_count(&self) -> usize {
        self.count
    }

    fn frame_rate(&self) -> f64 {
        let seconds = self.duration.as_secs_f64();
        if seconds == 0.0 {
            return 0.0;
        }
        self.count as f64 / seconds
    }

    fn duration(&self) -> Duration {
        self.duration
    }

    fn frame_duration(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        self.duration / self.count as u32
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

    fn is_animated(&self) -> bool {
        self.count > 1
    }

    fn read_frame_at(&mut self, timestamp: Duration) -> Result<Frame<E>> {
        self.inner.read_frame(timestamp)
    }

    fn frames(&mut self) -> Result<FrameIter<'_, E>> {
        let count = self.count;
        Ok(Box::new(self.inner.frames()?.take(count)))
    }

    fn reversed(self: Box<Self>) -> Result<BoxedReader<E>> {
        Ok(Reversed::wrap(self))
    }

    fn change_speed(self: Box<Self>, speed: f64) -> Result<BoxedReader<E>> {
        speed::change(self, speed)
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}
