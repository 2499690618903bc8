use std::time::Duration;

use crate::error::{EngineError, Result};
use crate::media::frame::{div_duration, mul_duration, Frame, FrameContent};
use crate::media::reader::{BoxedReader, FrameIter, MediaReader};

/// Apply a speed multiplier to any reader
///
/// This is the shared implementation behind every reader's
/// [`MediaReader::change_speed`].
pub fn change<E: FrameContent>(reader: BoxedReader<E>, speed: f64) -> Result<BoxedReader<E>> {
    if speed == 1.0 {
        return Ok(reader);
    }
    if speed == 0.0 || !speed.is_finite() {
        return Err(EngineError::unsupported(format!(
            "speed multiplier must be a non-zero number, got {}",
            speed
        )));
    }
    if speed < 0.0 {
        return reader.reversed()?.change_speed(-speed);
    }
    Ok(Box::new(SpeedChanged::new(reader, speed)))
}

/// Reader played back `speed` times faster (or slower, below 1.0)
pub struct SpeedChanged<E: FrameContent> {
    inner: BoxedReader<E>,
    speed: f64,
}

impl<E: FrameContent> SpeedChanged<E> {
    fn new(inner: BoxedReader<E>, speed: f64) -> Self {
        Self { inner, speed }
    }

    fn retime(frame: Frame<E>, speed: f64) -> Frame<E> {
        Frame::new(
            frame.content.with_speed(speed),
            div_duration(frame.duration, speed),
            div_duration(frame.timestamp, speed),
        )
    }
}

impl<E: FrameContent> MediaReader<E> for SpeedChanged<E> {
    fn frame_count(&self) -> usize {
        self.inner.frame_count()
    }

    fn frame_rate(&self) -> f64 {
        self.inner.frame_rate() * self.speed
    }

    fn duration(&self) -> Duration {
        div_duration(self.inner.duration(), self.speed)
    }

    fn frame_duration(&self) -> Duration {
        div_duration(self.inner.frame_duration(), self.speed)
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
        (self.inner.audio_sample_rate() as f64 * self.speed).round() as u32
    }

    fn audio_bitrate(&self) -> u32 {
        self.inner.audio_bitrate()
    }

    fn read_frame_at(&mut self, timestamp: Duration) -> Result<Frame<E>> {
        let frame = self.inner.read_frame(mul_duration(timestamp, self.speed))?;
        Ok(Self::retime(frame, self.speed))
    }

    fn frames(&mut self) -> Result<FrameIter<'_, E>> {
        let speed = self.speed;
        Ok(Box::new(
            self.inner
                .frames()?
                .map(move |frame| frame.map(|f| Self::retime(f, speed))),
        ))
    }

    fn reversed(self: Box<Self>) -> Result<BoxedReader<E>> {
        // Push the reversal down so a backend's cheap reversal is used
        let speed = self.speed;
        Ok(Box::new(SpeedChanged::new(self.inner.reversed()?, speed)))
    }

    fn change_speed(self: Box<Self>, speed: f64) -> Result<BoxedReader<E>> {
        if speed == 1.0 {
            return Ok(self);
        }
        if speed == 0.0 || !speed.is_finite() {
            return change(self, speed);
        }
        let combined = self.speed * speed;
        change(self.inner, combined)
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::backends::memory::test_support::*;
    use crate::media::backends::MemoryReader;
    use crate::media::frame::AudioChunk;

    fn address<E: FrameContent>(reader: &BoxedReader<E>) -> *const u8 {
        &**reader as *const dyn MediaReader<E> as *const u8
    }

    #[test]
    fn test_unit_speed_returns_same_instance() {
        let reader: BoxedReader<_> = Box::new(tagged_reader(&[100, 100]));
        let before = address(&reader);
        let after = reader.change_speed(1.0).unwrap();
        assert_eq!(before, address(&after));
    }

    #[test]
    fn test_unit_speed_on_decorator_returns_same_instance() {
        let reader: BoxedReader<_> = Box::new(tagged_reader(&[100, 100]));
        let fast = reader.change_speed(2.0).unwrap();
        let before = address(&fast);
        let after = fast.change_speed(1.0).unwrap();
        assert_eq!(before, address(&after));
    }

    #[test]
    fn test_zero_speed_is_unsupported() {
        let reader: BoxedReader<_> = Box::new(tagged_reader(&[100]));
        assert!(matches!(
            reader.change_speed(0.0),
            Err(EngineError::UnsupportedOperation { .. })
        ));
    }

    #[test]
    fn test_double_speed_halves_timing() {
        let reader: BoxedReader<_> = Box::new(tagged_reader(&[100, 200, 100]));
        let mut fast = reader.change_speed(2.0).unwrap();

        assert_eq!(fast.duration(), Duration::from_millis(200));
        assert_eq!(fast.frame_count(), 3);

        let frames: Vec<_> = fast.frames().unwrap().map(|f| f.unwrap()).collect();
        assert_eq!(frames[1].timestamp, Duration::from_millis(50));
        assert_eq!(frames[1].duration, Duration::from_millis(100));

        let frame = fast.read_frame(Duration::from_millis(60)).unwrap();
        assert_eq!(tag_of(&frame.content), 1);
        assert_eq!(frame.timestamp, Duration::from_millis(50));
    }

    #[test]
    fn test_negative_speed_matches_reverse_then_speed() {
        let a: BoxedReader<_> = Box::new(tagged_reader(&[100, 200, 300, 50]));
        let b: BoxedReader<_> = Box::new(tagged_reader(&[100, 200, 300, 50]));

        let mut negative = a.change_speed(-1.5).unwrap();
        let mut manual = b.reversed().unwrap().change_speed(1.5).unwrap();

        assert_eq!(tags(negative.as_mut()), tags(manual.as_mut()));
        assert_eq!(tags(negative.as_mut()), vec![3, 2, 1, 0]);
        assert_eq!(negative.duration(), manual.duration());
    }

    #[test]
    fn test_speeds_combine_back_to_inner() {
        let reader: BoxedReader<_> = Box::new(tagged_reader(&[100, 100]));
        let combined = reader.change_speed(2.0).unwrap().change_speed(0.5).unwrap();
        assert_eq!(combined.duration(), Duration::from_millis(200));
    }

    #[test]
    fn test_audio_sample_rate_follows_speed() {
        let chunk = AudioChunk::new(vec![0.0; 441], 1, 44_100);
        let reader: BoxedReader<AudioChunk> = Box::new(
            MemoryReader::new(vec![(chunk, Duration::from_millis(10))], 0, 0, -1)
                .with_audio(1, 44_100, 0),
        );
        let mut fast = reader.change_speed(2.0).unwrap();
        assert_eq!(fast.audio_sample_rate(), 88_200);
        let frame = fast.frames().unwrap().next().unwrap().unwrap();
        assert_eq!(frame.content.sample_rate, 88_200);
    }
}
