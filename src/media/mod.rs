//! Uniform, timestamped access to decoded media
//!
//! - [`frame`] - the frame primitive and its content kinds
//! - [`reader`] - the reader contract shared by every backend and decorator
//! - [`backends`] - format-specific readers
//! - [`decorators`] - reversal, speed, duration limit, resampling, zipping
//! - [`registry`] - format token to backend lookup

pub mod backends;
pub mod decorators;
pub mod frame;
pub mod reader;
pub mod registry;

pub use frame::{AudioChunk, Frame, FrameContent};
pub use reader::{BoxedReader, FrameIter, FrameSequence, MediaReader, ReaderSequence};
pub use registry::{audio_registry, image_registry, ReaderRegistry};
