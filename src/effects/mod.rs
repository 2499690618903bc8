//! Frame processors for the effects users can request
//!
//! Each effect is a [`Processor`](crate::processing::Processor) over RGBA
//! frames. Wrap one in a [`FrameProcessor`](crate::processing::FrameProcessor)
//! to chain it with others.

pub mod crop;
pub mod flip;
pub mod speech_bubble;
pub mod spin;
pub mod stretch;
pub mod template;

pub use crop::{CropProcessor, Rect};
pub use flip::{FlipAxis, FlipProcessor};
pub use speech_bubble::SpeechBubbleProcessor;
pub use spin::SpinProcessor;
pub use stretch::{StretchProcessor, StretchSize};
pub use template::{Placement, TemplateProcessor};
