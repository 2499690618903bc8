//! # Media Engine
//!
//! Decode arbitrary media into timestamped frames, run chains of effects over
//! them in a single pass, and re-encode the result under a byte ceiling.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use media_engine::{
//!     config::EngineConfig,
//!     effects::{FlipAxis, FlipProcessor},
//!     processing::{FrameProcessor, OutputFormat, ProcessingConfig},
//!     source::ByteSource,
//!     task::{run_task, FileTask, ProcessingTask, TaskContext},
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = EngineConfig::default();
//! let context = TaskContext::new(config.clone())?;
//!
//! let flip = ProcessingConfig::simple(
//!     "flipped",
//!     FrameProcessor::new(FlipProcessor::new(FlipAxis::Horizontal)),
//!     OutputFormat::Input,
//! );
//! let task = ProcessingTask::new(context, flip, config.max_output_bytes);
//!
//! let inputs = vec![ByteSource::from_path("cat.gif")];
//! let (outputs, mut task) = run_task(Box::new(task), inputs, config.max_fetch_bytes).await?;
//! println!("wrote {}", outputs[0].name());
//! task.cleanup()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`source`] - byte handles in memory, on disk or behind a URL
//! - [`media`] - readers, backends, decorators and the format registry
//! - [`container`] - byte-level GIF and WebP scanners, including the GIF loop editor
//! - [`processing`] - two-phase frame processors, configs and the pipeline
//! - [`effects`] - the processors users can ask for
//! - [`composite`] - overlay, rotation and cutout helpers
//! - [`encode`] - size-bounded writers
//! - [`task`] - chainable units of work
//! - [`config`] - configuration management

pub mod composite;
pub mod config;
pub mod container;
pub mod effects;
pub mod encode;
pub mod error;
pub mod media;
pub mod processing;
pub mod source;
pub mod task;

// Re-export commonly used types for convenience
pub use crate::{
    config::EngineConfig,
    error::{EngineError, Result},
    media::{Frame, MediaReader},
    processing::{FrameProcessor, Processor},
    source::ByteSource,
    task::{chain, run_task, FileTask, TaskContext},
};
