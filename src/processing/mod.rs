//! Two-phase frame processing
//!
//! A [`Processor`] computes constant data once from the first frame and then
//! transforms every frame with it. Processors compose through
//! [`FrameProcessor::then`] so that any number of effects run in one decode
//! pass, and a [`ProcessingConfig`] binds a processor to its output naming
//! and container policy.

pub mod config;
pub mod pipeline;
pub mod processor;

pub use config::{container_for, OutputFormat, ProcessingConfig, RetimeConfig};
pub use pipeline::process;
pub use processor::{FrameProcessor, Prepare, Prepared, Processor};
