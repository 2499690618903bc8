use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::media::frame::{Frame, FrameContent};
use crate::media::reader::{FrameIter, FrameSequence};

/// Two-phase per-frame transform
///
/// `constant_data` runs once per input, before any frame is transformed. It
/// sees the first frame and can replay the whole sequence, which is where
/// expensive layout work (measuring, fitting, decoding a fixed overlay)
/// belongs. `transform` then runs on every frame, the first one included.
pub trait Processor<E: FrameContent>: Send + Sync {
    /// Precomputed state shared by every `transform` call of one run
    type Constant: 'static;

    fn name(&self) -> &str;

    /// Compute the per-run constant data
    ///
    /// # Arguments
    ///
    /// * `first` - The first frame of the input
    /// * `frames` - Replayable view of every input frame
    /// * `format` - Token of the container the result will be written as
    fn constant_data(
        &self,
        first: &Frame<E>,
        frames: &mut dyn FrameSequence<E>,
        format: &str,
    ) -> Result<Self::Constant>;

    fn transform(&self, frame: Frame<E>, constant: &Self::Constant) -> Result<E>;

    /// Release anything the processor holds open
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A processor with its constant data already computed
pub type Prepared<'a, E> = Box<dyn Fn(Frame<E>) -> Result<E> + 'a>;

/// Object-safe face of [`Processor`], with the constant data type hidden
pub trait Prepare<E: FrameContent>: Send + Sync {
    fn name(&self) -> &str;

    fn prepare<'a>(
        &'a self,
        first: &Frame<E>,
        frames: &mut dyn FrameSequence<E>,
        format: &str,
    ) -> Result<Prepared<'a, E>>;

    fn close(&self) -> Result<()>;
}

impl<E: FrameContent, P: Processor<E>> Prepare<E> for P {
    fn name(&self) -> &str {
        Processor::name(self)
    }

    fn prepare<'a>(
        &'a self,
        first: &Frame<E>,
        frames: &mut dyn FrameSequence<E>,
        format: &str,
    ) -> Result<Prepared<'a, E>> {
        let constant = self.constant_data(first, frames, format)?;
        Ok(Box::new(move |frame| self.transform(frame, &constant)))
    }

    fn close(&self) -> Result<()> {
        Processor::close(self)
    }
}

/// Apply a prepared transform while keeping the frame's timing
fn apply<E>(transform: &dyn Fn(Frame<E>) -> Result<E>, frame: Frame<E>) -> Result<Frame<E>> {
    let (duration, timestamp) = (frame.duration, frame.timestamp);
    Ok(Frame::new(transform(frame)?, duration, timestamp))
}

/// A sequence seen through an already prepared transform
struct MappedSequence<'s, E> {
    inner: &'s mut dyn FrameSequence<E>,
    transform: &'s (dyn Fn(Frame<E>) -> Result<E> + 's),
}

impl<E: FrameContent> FrameSequence<E> for MappedSequence<'_, E> {
    fn iter_frames(&mut self) -> Result<FrameIter<'_, E>> {
        let transform = self.transform;
        Ok(Box::new(
            self.inner
                .iter_frames()?
                .map(move |frame| apply(transform, frame?)),
        ))
    }
}

/// Two processors run back to back on every frame
///
/// The second processor's constant data is computed from the first one's
/// output, so it lays itself out against what it will actually receive.
struct Chain<E: FrameContent> {
    first: Arc<dyn Prepare<E>>,
    second: Arc<dyn Prepare<E>>,
    name: String,
}

impl<E: FrameContent> Prepare<E> for Chain<E> {
    fn name(&self) -> &str {
        &self.name
    }

    fn prepare<'a>(
        &'a self,
        first_frame: &Frame<E>,
        frames: &mut dyn FrameSequence<E>,
        format: &str,
    ) -> Result<Prepared<'a, E>> {
        let first = self.first.prepare(first_frame, frames, format)?;
        let second = {
            let intermediate = apply(&*first, first_frame.clone())?;
            let mut mapped = MappedSequence {
                inner: frames,
                transform: &*first,
            };
            self.second.prepare(&intermediate, &mut mapped, format)?
        };

        Ok(Box::new(move |frame| second(apply(&*first, frame)?)))
    }

    fn close(&self) -> Result<()> {
        debug!("Closing processor chain {}", self.name);
        let first = self.first.close();
        let second = self.second.close();
        first.and(second)
    }
}

/// A frame processor, or the absence of one
///
/// Composition is closed over these two cases: chaining anything with
/// `Identity` returns the other side unchanged.
pub enum FrameProcessor<E: FrameContent> {
    Identity,
    Active(Arc<dyn Prepare<E>>),
}

impl<E: FrameContent> Clone for FrameProcessor<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Identity => Self::Identity,
            Self::Active(inner) => Self::Active(Arc::clone(inner)),
        }
    }
}

impl<E: FrameContent> FrameProcessor<E> {
    pub fn new<P: Processor<E> + 'static>(processor: P) -> Self {
        Self::Active(Arc::new(processor))
    }

    /// Run `self` first, then `next`, on every frame
    pub fn then(self, next: FrameProcessor<E>) -> FrameProcessor<E> {
        match (self, next) {
            (Self::Identity, other) | (other, Self::Identity) => other,
            (Self::Active(first), Self::Active(second)) => {
                let name = format!("{}+{}", first.name(), second.name());
                Self::Active(Arc::new(Chain {
                    first,
                    second,
                    name,
                }))
            }
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Identity)
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Identity => "identity",
            Self::Active(inner) => inner.name(),
        }
    }

    pub fn prepare<'a>(
        &'a self,
        first: &Frame<E>,
        frames: &mut dyn FrameSequence<E>,
        format: &str,
    ) -> Result<Prepared<'a, E>> {
        match self {
            Self::Identity => Ok(Box::new(|frame: Frame<E>| Ok(frame.content))),
            Self::Active(inner) => inner.prepare(first, frames, format),
        }
    }

    pub fn close(&self) -> Result<()> {
        match self {
            Self::Identity => Ok(()),
            Self::Active(inner) => inner.close(),
        }
    }
}
