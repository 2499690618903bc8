use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::encode::{encoder_error, enforce_limit, ByteCounter, FrameWriter, LimitedWriter, TimestampOrder};
use crate::error::{EngineError, Result};
use crate::media::frame::{AudioChunk, Frame};

type Sink = hound::WavWriter<LimitedWriter<BufWriter<File>>>;

/// 16-bit PCM WAV output through hound
///
/// The header is written when the first chunk arrives, using that chunk's
/// channel count and sample rate. A speed change is therefore audible as a
/// pitch change in the result.
pub struct WavWriter {
    path: PathBuf,
    limit: u64,
    sink: Option<Sink>,
    counter: ByteCounter,
    layout: Option<(u16, u32)>,
    order: TimestampOrder,
}

impl WavWriter {
    pub fn create(path: &Path, limit: u64) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            limit,
            sink: None,
            counter: ByteCounter::default(),
            layout: None,
            order: TimestampOrder::default(),
        })
    }

    fn ensure_sink(&mut self, chunk: &AudioChunk) -> Result<()> {
        if let Some((channels, rate)) = self.layout {
            if (channels, rate) != (chunk.channels, chunk.sample_rate) {
                return Err(EngineError::encode("audio layout changed mid-stream"));
            }
            return Ok(());
        }

        let spec = hound::WavSpec {
            channels: chunk.channels.max(1),
            sample_rate: chunk.sample_rate.max(1),
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = LimitedWriter::new(BufWriter::new(File::create(&self.path)?), self.limit);
        self.counter = writer.counter();
        let sink = hound::WavWriter::new(writer, spec).map_err(|e| encoder_error(&self.counter, self.limit, e))?;
        self.sink = Some(sink);
        self.layout = Some((chunk.channels, chunk.sample_rate));
        Ok(())
    }
}

fn to_pcm16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
}

impl FrameWriter<AudioChunk> for WavWriter {
    fn write_frame(&mut self, frame: &Frame<AudioChunk>) -> Result<()> {
        self.order.check(frame.timestamp)?;
        self.ensure_sink(&frame.content)?;

        let (counter, limit) = (&self.counter, self.limit);
        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| EngineError::encode("audio writer is closed"))?;
        for sample in &frame.content.samples {
            sink.write_sample(to_pcm16(*sample))
                .map_err(|e| encoder_error(counter, limit, e))?;
        }
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<u64> {
        let Some(sink) = self.sink.take() else {
            return Ok(0);
        };
        sink.finalize().map_err(|e| encoder_error(&self.counter, self.limit, e))?;

        let size = enforce_limit(&self.path, self.limit)?;
        info!("Wrote WAV {:?}: {} bytes", self.path, size);
        Ok(size)
    }
}
