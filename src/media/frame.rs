use std::time::Duration;

use image::RgbaImage;

/// Anything that can be carried by a [`Frame`]
///
/// Content kinds decide for themselves what reversal and a speed change
/// mean at the sample level. Images are unaffected by both; audio flips its
/// sample order and rescales its sample rate.
pub trait FrameContent: Clone + Send + Sync + 'static {
    /// Content as it would sound/look when played backwards
    fn reversed(&self) -> Self;

    /// Content after the playback speed is multiplied by `speed`
    fn with_speed(self, speed: f64) -> Self;
}

impl FrameContent for RgbaImage {
    fn reversed(&self) -> Self {
        self.clone()
    }

    fn with_speed(self, _speed: f64) -> Self {
        self
    }
}

/// A chunk of interleaved `f32` audio samples
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl AudioChunk {
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        Self {
            samples,
            channels,
            sample_rate,
        }
    }

    /// Number of sample frames (one sample per channel)
    pub fn len(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback time of this chunk at its own sample rate
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let nanos = self.len() as u128 * 1_000_000_000 / u128::from(self.sample_rate);
        Duration::from_nanos(nanos as u64)
    }
}

impl FrameContent for AudioChunk {
    fn reversed(&self) -> Self {
        let channels = self.channels.max(1) as usize;
        let samples = self
            .samples
            .chunks(channels)
            .rev()
            .flat_map(|frame| frame.iter().copied())
            .collect();
        Self::new(samples, self.channels, self.sample_rate)
    }

    fn with_speed(mut self, speed: f64) -> Self {
        self.sample_rate = (self.sample_rate as f64 * speed).round().max(1.0) as u32;
        self
    }
}

impl<A: FrameContent, B: FrameContent> FrameContent for (A, B) {
    fn reversed(&self) -> Self {
        (self.0.reversed(), self.1.reversed())
    }

    fn with_speed(self, speed: f64) -> Self {
        (self.0.with_speed(speed), self.1.with_speed(speed))
    }
}

/// One decoded unit of media with its place on the timeline
#[derive(Debug, Clone, PartialEq)]
pub struct Frame<E> {
    pub content: E,
    pub duration: Duration,
    pub timestamp: Duration,
}

impl<E> Frame<E> {
    pub fn new(content: E, duration: Duration, timestamp: Duration) -> Self {
        Self {
            content,
            duration,
            timestamp,
        }
    }

    /// Same timing, different content
    pub fn with_content<T>(&self, content: T) -> Frame<T> {
        Frame::new(content, self.duration, self.timestamp)
    }

    /// End of this frame on the timeline
    pub fn end(&self) -> Duration {
        self.timestamp + self.duration
    }
}

/// Reduce `timestamp` modulo `duration`; zero durations leave it untouched
pub fn wrap_timestamp(timestamp: Duration, duration: Duration) -> Duration {
    if duration.is_zero() || timestamp < duration {
        return timestamp;
    }
    let wrapped = timestamp.as_nanos() % duration.as_nanos();
    Duration::from_nanos(wrapped as u64)
}

/// Index of the frame covering `timestamp` given sorted frame start times
///
/// Times before the first frame map to the first frame.
pub fn frame_index_at(timestamps: &[Duration], timestamp: Duration) -> usize {
    match timestamps.binary_search(&timestamp) {
        Ok(index) => index,
        Err(0) => 0,
        Err(insert) => insert - 1,
    }
}

/// Scale a duration by `1 / divisor`
pub fn div_duration(duration: Duration, divisor: f64) -> Duration {
    Duration::from_secs_f64(duration.as_secs_f64() / divisor)
}

/// Scale a duration by `factor`
pub fn mul_duration(duration: Duration, factor: f64) -> Duration {
    Duration::from_secs_f64(duration.as_secs_f64() * factor)
}
