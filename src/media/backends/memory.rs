use std::time::Duration;

use crate::error::{EngineError, Result};
use crate::media::decorators::speed;
use crate::media::frame::{frame_index_at, Frame, FrameContent};
use crate::media::reader::{BoxedReader, FrameIter, MediaReader};

/// Reader over frames that are already decoded and held in memory
///
/// Reversal is cheap here: the frame list is flipped in place.
#[derive(Debug, Clone)]
pub struct MemoryReader<E> {
    frames: Vec<Frame<E>>,
    starts: Vec<Duration>,
    width: u32,
    height: u32,
    loop_count: i32,
    audio: AudioInfo,
}

#[derive(Debug, Clone, Copy, Default)]
struct AudioInfo {
    channels: u16,
    sample_rate: u32,
    bitrate: u32,
}

impl<E: FrameContent> MemoryReader<E> {
    /// Build a reader from contents and their durations, laid end to end
    pub fn new(contents: Vec<(E, Duration)>, width: u32, height: u32, loop_count: i32) -> Self {
        let mut timestamp = Duration::ZERO;
        let frames = contents
            .into_iter()
            .map(|(content, duration)| {
                let frame = Frame::new(content, duration, timestamp);
                timestamp += duration;
                frame
            })
            .collect();
        Self::from_frames(frames, width, height, loop_count)
    }

    /// Build a reader from frames that already carry timestamps
    pub fn from_frames(frames: Vec<Frame<E>>, width: u32, height: u32, loop_count: i32) -> Self {
        let starts = frames.iter().map(|f| f.timestamp).collect();
        Self {
            frames,
            starts,
            width,
            height,
            loop_count,
            audio: AudioInfo::default(),
        }
    }

    pub fn with_audio(mut self, channels: u16, sample_rate: u32, bitrate: u32) -> Self {
        self.audio = AudioInfo {
            channels,
            sample_rate,
            bitrate,
        };
        self
    }

    /// Same frames in reverse order, contents reversed, timestamps rebuilt
    pub fn into_reversed(self) -> Self {
        let contents = self
            .frames
            .into_iter()
            .rev()
            .map(|frame| (frame.content.reversed(), frame.duration))
            .collect();
        Self {
            audio: self.audio,
            ..Self::new(contents, self.width, self.height, self.loop_count)
        }
    }

    pub fn into_frames(self) -> Vec<Frame<E>> {
        self.frames
    }
}

impl<E: FrameContent> MediaReader<E> for MemoryReader<E> {
    fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn frame_rate(&self) -> f64 {
        let seconds = self.duration().as_secs_f64();
        if seconds == 0.0 || !self.is_animated() {
            return 0.0;
        }
        self.frames.len() as f64 / seconds
    }

    fn duration(&self) -> Duration {
        self.frames.last().map(Frame::end).unwrap_or_default()
    }

    fn frame_duration(&self) -> Duration {
        if self.frames.is_empty() {
            return Duration::ZERO;
        }
        self.duration() / self.frames.len() as u32
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn loop_count(&self) -> i32 {
        self.loop_count
    }

    fn audio_channels(&self) -> u16 {
        self.audio.channels
    }

    fn audio_sample_rate(&self) -> u32 {
        self.audio.sample_rate
    }

    fn audio_bitrate(&self) -> u32 {
        self.audio.bitrate
    }

    fn read_frame_at(&mut self, timestamp: Duration) -> Result<Frame<E>> {
        if self.frames.is_empty() {
            return Err(EngineError::unsupported("cannot read a frame from empty media"));
        }
        Ok(self.frames[frame_index_at(&self.starts, timestamp)].clone())
    }

    fn frames(&mut self) -> Result<FrameIter<'_, E>> {
        Ok(Box::new(self.frames.iter().cloned().map(Ok)))
    }

    fn reversed(self: Box<Self>) -> Result<BoxedReader<E>> {
        Ok(Box::new(self.into_reversed()))
    }

    fn change_speed(self: Box<Self>, speed: f64) -> Result<BoxedReader<E>> {
        speed::change(self, speed)
    }

    fn close(&mut self) -> Result<()> {
        self.frames.clear();
        self.starts.clear();
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use image::{Rgba, RgbaImage};

    /// Solid-colored frame whose red channel encodes `tag`
    pub fn tagged_image(tag: u8, width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba([tag, 0, 0, 255]))
    }

    pub fn tag_of(image: &RgbaImage) -> u8 {
        image.get_pixel(0, 0)[0]
    }

    /// Reader whose frames are tagged 0..n with the given durations in ms
    pub fn tagged_reader(durations_ms: &[u64]) -> MemoryReader<RgbaImage> {
        let contents = durations_ms
            .iter()
            .enumerate()
            .map(|(i, ms)| (tagged_image(i as u8, 4, 4), Duration::from_millis(*ms)))
            .collect();
        MemoryReader::new(contents, 4, 4, 0)
    }

    pub fn tags(reader: &mut dyn MediaReader<RgbaImage>) -> Vec<u8> {
        reader
            .frames()
            .unwrap()
            .map(|f| tag_of(&f.unwrap().content))
            .collect()
    }
}
