use std::time::Duration;

use crate::error::Result;
use crate::media::decorators::{speed, Reversed};
use crate::media::frame::{Frame, FrameContent};
use crate::media::reader::{BoxedReader, FrameIter, MediaReader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Controller {
    First,
    Second,
    Neither,
}

/// Two independently timed readers played side by side
///
/// The animated reader with the shorter (or equal) frame duration drives the
/// timing and donates its dimensions and frame rate. For every frame it
/// produces, the other reader is sampled at the same timestamp, wrapping
/// around its own duration. The controller loops as many times as needed to
/// cover an animated partner's full duration.
pub struct Zipped<A: FrameContent, B: FrameContent> {
    first: BoxedReader<A>,
    second: BoxedReader<B>,
    controller: Controller,
    loops: u32,
    first_cache: Option<Vec<Frame<A>>>,
    second_cache: Option<Vec<Frame<B>>>,
}

impl<A: FrameContent, B: FrameContent> Zipped<A, B> {
    pub fn new(first: BoxedReader<A>, second: BoxedReader<B>) -> Self {
        let controller = match (first.is_animated(), second.is_animated()) {
            (true, true) if first.frame_duration() <= second.frame_duration() => Controller::First,
            (true, true) => Controller::Second,
            (true, false) => Controller::First,
            (false, true) => Controller::Second,
            (false, false) => Controller::Neither,
        };

        let loops = match controller {
            Controller::First if second.is_animated() => loops_to_cover(first.duration(), second.duration()),
            Controller::Second if first.is_animated() => loops_to_cover(second.duration(), first.duration()),
            _ => 1,
        };

        Self {
            first,
            second,
            controller,
            loops,
            first_cache: None,
            second_cache: None,
        }
    }

    fn controller_duration(&self) -> Duration {
        match self.controller {
            Controller::First => self.first.duration(),
            Controller::Second => self.second.duration(),
            Controller::Neither => self.first.duration().max(self.second.duration()),
        }
    }
}

fn loops_to_cover(controller: Duration, other: Duration) -> u32 {
    if controller.is_zero() {
        return 1;
    }
    let loops = other.as_nanos().div_ceil(controller.as_nanos());
    loops.clamp(1, u32::MAX as u128) as u32
}

/// Walk the controller's frames, pairing each with the other reader's frame at the same time
fn zip_frames<'a, C, O, T>(
    controller: &'a mut dyn MediaReader<C>,
    other: &'a mut dyn MediaReader<O>,
    cache: &'a mut Option<Vec<Frame<C>>>,
    loops: u32,
    pair: fn(C, O) -> T,
) -> Result<FrameIter<'a, T>>
where
    C: FrameContent,
    O: FrameContent,
    T: FrameContent,
{
    if loops <= 1 {
        return Ok(Box::new(controller.frames()?.map(move |frame| {
            let frame = frame?;
            let sampled = other.read_frame(frame.timestamp)?;
            Ok(Frame::new(pair(frame.content, sampled.content), frame.duration, frame.timestamp))
        })));
    }

    let period = controller.duration();
    if cache.is_none() {
        *cache = Some(controller.frames()?.collect::<Result<Vec<_>>>()?);
    }
    let cache: &'a Option<Vec<Frame<C>>> = cache;
    let frames: &'a [Frame<C>] = cache.as_deref().unwrap_or(&[]);

    Ok(Box::new((0..loops).flat_map(move |lap| {
        frames.iter().map(move |frame| (period * lap + frame.timestamp, frame))
    }).map(move |(timestamp, frame)| {
        let sampled = other.read_frame(timestamp)?;
        Ok(Frame::new(pair(frame.content.clone(), sampled.content), frame.duration, timestamp))
    })))
}

impl<A: FrameContent, B: FrameContent> MediaReader<(A, B)> for Zipped<A, B> {
    fn frame_count(&self) -> usize {
        match self.controller {
            Controller::First => self.first.frame_count() * self.loops as usize,
            Controller::Second => self.second.frame_count() * self.loops as usize,
            Controller::Neither => self.first.frame_count().min(self.second.frame_count()).min(1),
        }
    }

    fn frame_rate(&self) -> f64 {
        match self.controller {
            Controller::First => self.first.frame_rate(),
            Controller::Second => self.second.frame_rate(),
            Controller::Neither => 0.0,
        }
    }

    fn duration(&self) -> Duration {
        self.controller_duration() * self.loops
    }

    fn frame_duration(&self) -> Duration {
        match self.controller {
            Controller::First => self.first.frame_duration(),
            Controller::Second => self.second.frame_duration(),
            Controller::Neither => self.controller_duration(),
        }
    }

    fn width(&self) -> u32 {
        match self.controller {
            Controller::First => self.first.width(),
            Controller::Second => self.second.width(),
            Controller::Neither => 0,
        }
    }

    fn height(&self) -> u32 {
        match self.controller {
            Controller::First => self.first.height(),
            Controller::Second => self.second.height(),
            Controller::Neither => 0,
        }
    }

    fn loop_count(&self) -> i32 {
        match self.controller {
            Controller::First => self.first.loop_count(),
            Controller::Second => self.second.loop_count(),
            Controller::Neither => -1,
        }
    }

    fn read_frame_at(&mut self, timestamp: Duration) -> Result<Frame<(A, B)>> {
        match self.controller {
            Controller::First => {
                let period = self.first.duration();
                let lap = lap_start(timestamp, period);
                let frame = self.first.read_frame(timestamp)?;
                let at = lap + frame.timestamp;
                let sampled = self.second.read_frame(at)?;
                Ok(Frame::new((frame.content, sampled.content), frame.duration, at))
            }
            Controller::Second => {
                let period = self.second.duration();
                let lap = lap_start(timestamp, period);
                let frame = self.second.read_frame(timestamp)?;
                let at = lap + frame.timestamp;
                let sampled = self.first.read_frame(at)?;
                Ok(Frame::new((sampled.content, frame.content), frame.duration, at))
            }
            Controller::Neither => {
                let a = self.first.read_frame(Duration::ZERO)?;
                let b = self.second.read_frame(Duration::ZERO)?;
                Ok(Frame::new((a.content, b.content), self.duration(), Duration::ZERO))
            }
        }
    }

    fn frames(&mut self) -> Result<FrameIter<'_, (A, B)>> {
        match self.controller {
            Controller::First => zip_frames(
                self.first.as_mut(),
                self.second.as_mut(),
                &mut self.first_cache,
                self.loops,
                |a, b| (a, b),
            ),
            Controller::Second => zip_frames(
                self.second.as_mut(),
                self.first.as_mut(),
                &mut self.second_cache,
                self.loops,
                |b, a| (a, b),
            ),
            Controller::Neither => {
                let frame = self.read_frame_at(Duration::ZERO);
                Ok(Box::new(std::iter::once(frame)))
            }
        }
    }

    fn reversed(self: Box<Self>) -> Result<BoxedReader<(A, B)>> {
        Ok(Reversed::wrap(self))
    }

    fn change_speed(self: Box<Self>, speed: f64) -> Result<BoxedReader<(A, B)>> {
        speed::change(self, speed)
    }

    fn close(&mut self) -> Result<()> {
        self.first_cache = None;
        self.second_cache = None;
        let first = self.first.close();
        let second = self.second.close();
        first.and(second)
    }
}

fn lap_start(timestamp: Duration, period: Duration) -> Duration {
    if period.is_zero() {
        return Duration::ZERO;
    }
    let laps = timestamp.as_nanos() / period.as_nanos();
    Duration::from_nanos((laps * period.as_nanos()) as u64)
}
