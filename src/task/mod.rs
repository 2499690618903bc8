//! Outward units of work
//!
//! A [`FileTask`] takes byte sources in and hands byte sources back,
//! keeping track of the temporaries behind its outputs until
//! [`FileTask::cleanup`]. Tasks compose with [`chain`], which fuses
//! compatible pairs into a single pass before falling back to running them
//! one after the other.

pub mod crop;
pub mod generate;
pub mod loop_count;
pub mod process;

use std::sync::Arc;

use image::RgbaImage;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::media::frame::AudioChunk;
use crate::media::registry::{audio_registry, image_registry, ReaderRegistry};
use crate::source::{self, ByteSource};

pub use crop::{AutoCropTask, BorderDetector};
pub use generate::{FetchTask, UrlTask};
pub use loop_count::GifLoopTask;
pub use process::ProcessingTask;

/// Shared, read-only state every task runs against
pub struct TaskContext {
    pub config: EngineConfig,
    pub images: ReaderRegistry<RgbaImage>,
    pub audio: ReaderRegistry<AudioChunk>,
    pool: rayon::ThreadPool,
}

impl TaskContext {
    pub fn new(config: EngineConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.processing_threads)
            .thread_name(|i| format!("media-engine-scan-{}", i))
            .build()
            .map_err(|e| {
                warn!("Could not start scan thread pool: {}", e);
                EngineError::unsupported("processing threads are unavailable")
            })?;

        Ok(Arc::new(Self {
            images: image_registry(config.clone()),
            audio: audio_registry(config.clone()),
            config,
            pool,
        }))
    }

    /// Run `work` on the scan thread pool
    pub fn install<R: Send, F: FnOnce() -> R + Send>(&self, work: F) -> R {
        self.pool.install(work)
    }
}

/// Unit of work invoked by the bot layer
pub trait FileTask: Send {
    fn name(&self) -> &str;

    /// Whether `run` needs at least one input
    fn requires_input(&self) -> bool;

    /// Produce outputs from `inputs`
    ///
    /// Any failure aborts the whole task. Outputs may point at temporaries
    /// that stay alive until [`cleanup`](FileTask::cleanup).
    fn run(&mut self, inputs: Vec<ByteSource>) -> Result<Vec<ByteSource>>;

    /// Delete every temporary this task created; safe to call repeatedly
    fn cleanup(&mut self) -> Result<()>;

    /// Expose the concrete kind so [`chain`] can fuse compatible tasks
    fn into_kind(self: Box<Self>) -> TaskKind;
}

/// Tasks that [`chain`] knows how to fuse
pub enum TaskKind {
    Processing(ProcessingTask),
    Crop(AutoCropTask),
    Other(Box<dyn FileTask>),
}

impl TaskKind {
    pub fn into_task(self) -> Box<dyn FileTask> {
        match self {
            Self::Processing(task) => Box::new(task),
            Self::Crop(task) => Box::new(task),
            Self::Other(task) => task,
        }
    }
}

/// Combine two tasks so that `second` runs on the output of `first`
///
/// Two simple processing tasks become one processing pass, and two
/// auto-crop tasks become one crop over the union of what each detects.
/// Any other pair runs sequentially. `second` must take input.
pub fn chain(first: Box<dyn FileTask>, second: Box<dyn FileTask>) -> Result<Box<dyn FileTask>> {
    if !second.requires_input() {
        return Err(EngineError::unsupported(format!(
            "'{}' does not take input and cannot follow '{}'",
            second.name(),
            first.name()
        )));
    }

    let chained: Box<dyn FileTask> = match (first.into_kind(), second.into_kind()) {
        (TaskKind::Processing(a), TaskKind::Processing(b)) => match a.merge(b) {
            Ok(merged) => {
                debug!("Merged processing tasks into '{}'", merged.name());
                Box::new(merged)
            }
            Err((a, b)) => Box::new(ChainedTask::new(Box::new(a), Box::new(b))),
        },
        (TaskKind::Crop(a), TaskKind::Crop(b)) => Box::new(a.merge(b)),
        (a, b) => Box::new(ChainedTask::new(a.into_task(), b.into_task())),
    };
    Ok(chained)
}

/// Two tasks run back to back
pub struct ChainedTask {
    first: Box<dyn FileTask>,
    second: Box<dyn FileTask>,
    name: String,
}

impl ChainedTask {
    pub fn new(first: Box<dyn FileTask>, second: Box<dyn FileTask>) -> Self {
        let name = format!("{}+{}", first.name(), second.name());
        Self { first, second, name }
    }
}

impl FileTask for ChainedTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires_input(&self) -> bool {
        self.first.requires_input()
    }

    fn run(&mut self, inputs: Vec<ByteSource>) -> Result<Vec<ByteSource>> {
        let intermediate = self.first.run(inputs)?;
        if intermediate.is_empty() {
            return Err(EngineError::EmptyOutput {
                task: self.first.name().to_string(),
            });
        }
        self.second.run(intermediate)
    }

    fn cleanup(&mut self) -> Result<()> {
        let first = self.first.cleanup();
        let second = self.second.cleanup();
        first.and(second)
    }

    fn into_kind(self: Box<Self>) -> TaskKind {
        TaskKind::Other(self)
    }
}

/// Run a task from async code
///
/// Remote inputs are downloaded concurrently first, then the task runs on
/// the blocking pool. On success the task comes back with its outputs so
/// the caller can clean up after using them; on failure it has already
/// been cleaned up.
pub async fn run_task(
    task: Box<dyn FileTask>,
    inputs: Vec<ByteSource>,
    max_fetch_bytes: u64,
) -> Result<(Vec<ByteSource>, Box<dyn FileTask>)> {
    let mut task = task;
    let inputs = match source::resolve_all(inputs, max_fetch_bytes).await {
        Ok(inputs) => inputs,
        Err(e) => {
            warn!("Inputs for task '{}' could not be resolved: {}", task.name(), e);
            if let Err(cleanup) = task.cleanup() {
                warn!("Cleanup after unresolved inputs of '{}' also failed: {}", task.name(), cleanup);
            }
            return Err(e);
        }
    };

    let name = task.name().to_string();
    info!("Running task '{}' on {} inputs", name, inputs.len());

    let (result, mut task) = tokio::task::spawn_blocking(move || {
        let result = task.run(inputs);
        (result, task)
    })
    .await
    .map_err(|e| {
        warn!("Task '{}' panicked: {}", name, e);
        EngineError::unsupported("the task stopped unexpectedly")
    })?;

    match result {
        Ok(outputs) if outputs.is_empty() => {
            task.cleanup()?;
            Err(EngineError::EmptyOutput { task: name })
        }
        Ok(outputs) => {
            info!("Task '{}' produced {} outputs", name, outputs.len());
            Ok((outputs, task))
        }
        Err(e) => {
            warn!("Task '{}' failed: {}", name, e);
            if let Err(cleanup) = task.cleanup() {
                warn!("Cleanup after failed task '{}' also failed: {}", name, cleanup);
            }
            Err(e)
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    /// Task that records its runs and returns a fixed list of outputs
    pub struct Recording {
        pub name: String,
        pub requires_input: bool,
        pub outputs: Vec<ByteSource>,
        pub seen: Arc<std::sync::Mutex<Vec<Vec<String>>>>,
        pub cleanups: Arc<AtomicUsize>,
        pub failing_cleanup: bool,
    }

    impl Recording {
        pub fn new(name: &str, requires_input: bool, outputs: Vec<ByteSource>) -> Self {
            Self {
                name: name.to_string(),
                requires_input,
                outputs,
                seen: Arc::default(),
                cleanups: Arc::default(),
                failing_cleanup: false,
            }
        }
    }

    impl FileTask for Recording {
        fn name(&self) -> &str {
            &self.name
        }

        fn requires_input(&self) -> bool {
            self.requires_input
        }

        fn run(&mut self, inputs: Vec<ByteSource>) -> Result<Vec<ByteSource>> {
            let names = inputs.iter().map(|s| s.name().to_string()).collect();
            self.seen.lock().unwrap().push(names);
            Ok(self.outputs.clone())
        }

        fn cleanup(&mut self) -> Result<()> {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
            if self.failing_cleanup {
                return Err(EngineError::encode("scratch files could not be removed"));
            }
            Ok(())
        }

        fn into_kind(self: Box<Self>) -> TaskKind {
            TaskKind::Other(self)
        }
    }
}
