use std::path::PathBuf;
use std::sync::Arc;

use image::RgbaImage;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::encode::{self, FrameWriter};
use crate::error::{EngineError, Result};
use crate::media::frame::{AudioChunk, FrameContent};
use crate::media::reader::BoxedReader;
use crate::processing::{container_for, process, FrameProcessor, ProcessingConfig};
use crate::source::{self, ByteSource};
use crate::task::{FileTask, TaskContext, TaskKind};

/// Format tokens routed to the audio registry
const AUDIO_FORMATS: [&str; 8] = ["wav", "mp3", "ogg", "flac", "m4a", "aac", "opus", "oga"];

pub fn is_audio_format(format: &str) -> bool {
    AUDIO_FORMATS.contains(&format)
}

/// One processing config applied to every input
///
/// Image inputs are decoded through the image registry, processed and
/// re-encoded in the container picked by the config's output policy. Audio
/// inputs only accept retiming and are always written as WAV.
pub struct ProcessingTask {
    context: Arc<TaskContext>,
    config: ProcessingConfig<RgbaImage>,
    max_bytes: u64,
    workdir: Option<TempDir>,
    closed: bool,
}

impl ProcessingTask {
    pub fn new(context: Arc<TaskContext>, config: ProcessingConfig<RgbaImage>, max_bytes: u64) -> Self {
        Self {
            context,
            config,
            max_bytes,
            workdir: None,
            closed: false,
        }
    }

    pub fn config(&self) -> &ProcessingConfig<RgbaImage> {
        &self.config
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Fold `next` into this task when both configs merge
    ///
    /// The merged task keeps the tighter byte ceiling. Tasks that cannot
    /// merge are handed back unchanged.
    pub fn merge(self, next: ProcessingTask) -> std::result::Result<ProcessingTask, (ProcessingTask, ProcessingTask)> {
        let ProcessingTask {
            context,
            config,
            max_bytes,
            ..
        } = self;
        let ProcessingTask {
            context: next_context,
            config: next_config,
            max_bytes: next_max,
            ..
        } = next;

        match config.merge(next_config) {
            Ok(merged) => Ok(ProcessingTask::new(context, merged, max_bytes.min(next_max))),
            Err((first, second)) => Err((
                ProcessingTask::new(context, first, max_bytes),
                ProcessingTask::new(next_context, second, next_max),
            )),
        }
    }

    fn output_path(&mut self, index: usize, extension: &str) -> Result<PathBuf> {
        if self.workdir.is_none() {
            self.workdir = Some(tempfile::Builder::new().prefix("media_engine_task_").tempdir()?);
        }
        let dir = self
            .workdir
            .as_ref()
            .ok_or_else(|| EngineError::unsupported("task has no working directory"))?;

        let stem = match index {
            0 => self.config.name().to_string(),
            n => format!("{}_{}", self.config.name(), n),
        };
        Ok(dir.path().join(format!("{}.{}", stem, extension)))
    }

    fn run_image(&mut self, index: usize, input: &ByteSource, format: &str) -> Result<ByteSource> {
        let reader = self.context.images.open(input)?;
        let mut reader = self.config.prepare_reader(reader)?;

        let container = container_for(&self.config.output_format(), format, reader.is_animated());
        let path = self.output_path(index, &container)?;
        let writer = encode::image_writer(
            &container,
            &path,
            self.max_bytes,
            reader.loop_count(),
            &self.context.config.tools,
        )?;

        let processor = self.config.processor();
        encode_all(&mut reader, &processor, &container, writer)?;
        Ok(ByteSource::from_path(path))
    }

    fn run_audio(&mut self, index: usize, input: &ByteSource) -> Result<ByteSource> {
        let retime = self.config.retiming().cloned().ok_or_else(|| {
            EngineError::unsupported(format!("'{}' cannot be applied to audio", self.config.name()))
        })?;

        let reader = self.context.audio.open(input)?;
        let mut reader = retime.apply(reader)?;
        let path = self.output_path(index, "wav")?;
        let writer = encode::audio_writer("wav", &path, self.max_bytes)?;

        encode_all(&mut reader, &FrameProcessor::<AudioChunk>::Identity, "wav", writer)?;
        Ok(ByteSource::from_path(path))
    }

    fn close_processor(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.config.close()
    }
}

/// Decode, process and encode one reader, closing it whatever happens
fn encode_all<E: FrameContent>(
    reader: &mut BoxedReader<E>,
    processor: &FrameProcessor<E>,
    container: &str,
    mut writer: Box<dyn FrameWriter<E>>,
) -> Result<u64> {
    let processed = process(reader.as_mut(), processor, container, |frame| writer.write_frame(&frame));
    let closed = reader.close();

    let frames = processed?;
    closed?;
    if frames == 0 {
        return Err(EngineError::EmptyOutput {
            task: processor.name().to_string(),
        });
    }

    let size = writer.finish()?;
    debug!("Encoded {} frames into {} bytes of {}", frames, size, container);
    Ok(size)
}

impl FileTask for ProcessingTask {
    fn name(&self) -> &str {
        self.config.name()
    }

    fn requires_input(&self) -> bool {
        true
    }

    fn run(&mut self, inputs: Vec<ByteSource>) -> Result<Vec<ByteSource>> {
        let inputs = source::resolve_blocking(inputs, self.context.config.max_fetch_bytes)?;
        info!("Processing task '{}' on {} inputs", self.name(), inputs.len());

        let mut outputs = Vec::with_capacity(inputs.len());
        let mut result = Ok(());
        for (index, input) in inputs.iter().enumerate() {
            let format = input.format();
            let output = if is_audio_format(&format) {
                self.run_audio(index, input)
            } else {
                self.run_image(index, input, &format)
            };

            match output {
                Ok(output) => outputs.push(output),
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }

        let closed = self.close_processor();
        result?;
        closed?;
        Ok(outputs)
    }

    fn cleanup(&mut self) -> Result<()> {
        let closed = self.close_processor();
        if let Some(dir) = self.workdir.take() {
            debug!("Removing {:?}", dir.path());
            if let Err(e) = dir.close() {
                warn!("Failed to remove task directory: {}", e);
                return Err(e.into());
            }
        }
        closed
    }

    fn into_kind(self: Box<Self>) -> TaskKind {
        TaskKind::Processing(*self)
    }
}
