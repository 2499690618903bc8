use std::time::Duration;

use crate::error::Result;
use crate::media::frame::{wrap_timestamp, Frame, FrameContent};

/// Lazy, finite pass over a reader's frames
pub type FrameIter<'a, E> = Box<dyn Iterator<Item = Result<Frame<E>>> + 'a>;

/// Type-erased reader, the currency passed between registries, decorators and tasks
pub type BoxedReader<E> = Box<dyn MediaReader<E>>;

/// Uniform access to decoded media
///
/// A reader describes a finite frame sequence with fixed structural
/// properties and offers two access modes: random access by timestamp, and
/// a lazy sequential pass that can be restarted by calling [`frames`] again.
/// Both modes borrow the reader mutably, so no two frames of the same
/// reader are ever decoded concurrently.
///
/// A reader owns whatever native handle or temp file it opened and releases
/// it in [`close`]. Decorators own the reader they wrap and forward `close`
/// to it exactly once.
///
/// [`frames`]: MediaReader::frames
/// [`close`]: MediaReader::close
pub trait MediaReader<E: FrameContent>: Send {
    /// Number of frames; zero if and only if there is no content
    fn frame_count(&self) -> usize;

    fn frame_rate(&self) -> f64;

    /// Total playback time, never shorter than the end of the last frame
    fn duration(&self) -> Duration;

    /// Nominal duration of one frame
    fn frame_duration(&self) -> Duration;

    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// 0 = loop forever, -1 = play once, N = repeat N times
    fn loop_count(&self) -> i32;

    fn audio_channels(&self) -> u16 {
        0
    }

    fn audio_sample_rate(&self) -> u32 {
        0
    }

    fn audio_bitrate(&self) -> u32 {
        0
    }

    fn is_animated(&self) -> bool {
        self.frame_count() > 1
    }

    /// Frame covering `timestamp`, which is already reduced below `duration()`
    fn read_frame_at(&mut self, timestamp: Duration) -> Result<Frame<E>>;

    /// Lazy pass over every frame in timestamp order
    fn frames(&mut self) -> Result<FrameIter<'_, E>>;

    /// This reader played backwards
    ///
    /// Consumes the reader; reversing the result again hands back an
    /// equivalent of the original without stacking wrappers.
    fn reversed(self: Box<Self>) -> Result<BoxedReader<E>>;

    /// This reader played at `speed` times the original rate
    ///
    /// `1.0` returns the same instance, `0.0` is rejected, and negative
    /// values reverse first.
    fn change_speed(self: Box<Self>, speed: f64) -> Result<BoxedReader<E>>;

    /// Release any handle or temp file held by this reader
    fn close(&mut self) -> Result<()>;

    /// Frame covering `timestamp`, wrapping circularly past the end
    fn read_frame(&mut self, timestamp: Duration) -> Result<Frame<E>> {
        let wrapped = wrap_timestamp(timestamp, self.duration());
        self.read_frame_at(wrapped)
    }
}

/// Something that can replay a sequence of frames on demand
///
/// Processors receive one of these when computing their constant data so
/// that they can scan the whole input (or the output of an earlier
/// processor) before the per-frame pass starts.
pub trait FrameSequence<E> {
    fn iter_frames(&mut self) -> Result<FrameIter<'_, E>>;
}

/// Adapts a reader to [`FrameSequence`]
pub struct ReaderSequence<'a, E: FrameContent> {
    reader: &'a mut dyn MediaReader<E>,
}

impl<'a, E: FrameContent> ReaderSequence<'a, E> {
    pub fn new(reader: &'a mut dyn MediaReader<E>) -> Self {
        Self { reader }
    }
}

impl<E: FrameContent> FrameSequence<E> for ReaderSequence<'_, E> {
    fn iter_frames(&mut self) -> Result<FrameIter<'_, E>> {
        self.reader.frames()
    }
}

/// Take the first frame of a reader, if there is one
pub fn first_frame<E: FrameContent>(reader: &mut dyn MediaReader<E>) -> Result<Option<Frame<E>>> {
    reader.frames()?.next().transpose()
}
