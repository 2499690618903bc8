use std::time::Duration;

use crate::error::{EngineError, Result};
use crate::media::decorators::{speed, Reversed};
use crate::media::frame::{Frame, FrameContent};
use crate::media::reader::{BoxedReader, FrameIter, MediaReader};

/// Resample a reader onto a fixed frame grid
///
/// Every output frame lasts exactly `frame_duration` and shows whichever
/// source frame covers its start time. `total` overrides the source duration,
/// which lets a still image be laid over a longer timeline; times past the
/// source's end wrap around it.
pub struct ConstantFrameDuration<E: FrameContent> {
    inner: BoxedReader<E>,
    frame_duration: Duration,
    total: Duration,
    count: usize,
}

impl<E: FrameContent> ConstantFrameDuration<E> {
    pub fn new(inner: BoxedReader<E>, frame_duration: Duration) -> Result<Self> {
        let total = inner.duration();
        Self::with_total(inner, frame_duration, total)
    }

    pub fn with_total(inner: BoxedReader<E>, frame_duration: Duration, total: Duration) -> Result<Self> {
        if frame_duration.is_zero() {
            return Err(EngineError::unsupported("frame duration must be positive"));
        }

        let count = if inner.frame_count() == 0 {
            0
        } else {
            ((total.as_nanos() / frame_duration.as_nanos()) as usize).max(1)
        };

        Ok(Self {
            inner,
            frame_duration,
            total,
            count,
        })
    }

    fn slot_start(&self, index: usize) -> Duration {
        self.frame_duration * index as u32
    }
}

impl<E: FrameContent> MediaReader<E> for ConstantFrameDuration<E> {
    fn frame_count(&self) -> usize {
        self.count
    }

    fn frame_rate(&self) -> f64 {
        1.0 / self.frame_duration.as_secs_f64()
    }

    fn duration(&self) -> Duration {
        self.slot_start(self.count)
    }

    fn frame_duration(&self) -> Duration {
        self.frame_duration
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
        let index = (timestamp.as_nanos() / self.frame_duration.as_nanos()) as usize;
        let start = self.slot_start(index);
        let source = self.inner.read_frame(start)?;
        Ok(Frame::new(source.content, self.frame_duration, start))
    }

    fn frames(&mut self) -> Result<FrameIter<'_, E>> {
        let count = self.count;
        if self.total > self.inner.duration() {
            return Ok(Box::new(
                (0..count).map(move |index| self.read_frame_at(self.slot_start(index))),
            ));
        }

        let frame_duration = self.frame_duration;
        let mut source = self.inner.frames()?;
        let current = source.next().transpose()?;
        let upcoming = source.next().transpose()?;
        Ok(Box::new(Resample {
            source,
            current,
            upcoming,
            index: 0,
            count,
            frame_duration,
        }))
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

/// Single forward walk over the source, repeating or skipping frames to fit the grid
struct Resample<'a, E> {
    source: FrameIter<'a, E>,
    current: Option<Frame<E>>,
    upcoming: Option<Frame<E>>,
    index: usize,
    count: usize,
    frame_duration: Duration,
}

impl<E: Clone> Resample<'_, E> {
    fn advance_to(&mut self, start: Duration) -> Result<()> {
        while matches!(&self.upcoming, Some(next) if next.timestamp <= start) {
            self.current = self.upcoming.take();
            self.upcoming = self.source.next().transpose()?;
        }
        Ok(())
    }
}

impl<E: Clone> Iterator for Resample<'_, E> {
    type Item = Result<Frame<E>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.count {
            return None;
        }
        let start = self.frame_duration * self.index as u32;
        self.index += 1;

        if let Err(e) = self.advance_to(start) {
            self.index = self.count;
            return Some(Err(e));
        }

        self.current
            .as_ref()
            .map(|frame| Ok(Frame::new(frame.content.clone(), self.frame_duration, start)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::backends::memory::test_support::*;

    #[test]
    fn test_resample_to_fixed_grid() {
        let inner = Box::new(tagged_reader(&[100, 200, 100]));
        let mut resampled = ConstantFrameDuration::new(inner, Duration::from_millis(50)).unwrap();

        assert_eq!(resampled.frame_count(), 8);
        assert_eq!(resampled.duration(), Duration::from_millis(400));
        assert_eq!(tags(&mut resampled), vec![0, 0, 1, 1, 1, 1, 2, 2]);

        let frames: Vec<_> = resampled.frames().unwrap().map(|f| f.unwrap()).collect();
        assert!(frames.iter().all(|f| f.duration == Duration::from_millis(50)));
        assert_eq!(frames[5].timestamp, Duration::from_millis(250));
    }

    #[test]
    fn test_random_access_matches_sequence() {
        let inner = Box::new(tagged_reader(&[100, 200, 100]));
        let mut resampled = ConstantFrameDuration::new(inner, Duration::from_millis(70)).unwrap();
        let sequential = tags(&mut resampled);

        for (index, tag) in sequential.iter().enumerate() {
            let frame = resampled.read_frame(Duration::from_millis(70 * index as u64 + 5)).unwrap();
            assert_eq!(tag_of(&frame.content), *tag);
        }
    }

    #[test]
    fn test_still_image_stretched_over_timeline() {
        let inner = Box::new(tagged_reader(&[1]));
        let mut stretched =
            ConstantFrameDuration::with_total(inner, Duration::from_millis(100), Duration::from_secs(1))
                .unwrap();
        assert_eq!(stretched.frame_count(), 10);
        assert!(stretched.is_animated());
        assert_eq!(tags(&mut stretched), vec![0; 10]);
    }

    #[test]
    fn test_zero_frame_duration_rejected() {
        let inner = Box::new(tagged_reader(&[100]));
        assert!(ConstantFrameDuration::new(inner, Duration::ZERO).is_err());
    }
}
