use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use gif::{DisposalMethod, Encoder, Repeat};
use image::RgbaImage;
use tracing::info;

use crate::encode::{encoder_error, enforce_limit, io_error, ByteCounter, FrameWriter, LimitedWriter, TimestampOrder};
use crate::error::{EngineError, Result};
use crate::media::frame::Frame;

/// NeuQuant sampling factor, 1 is slowest and 30 fastest
const QUANTIZE_SPEED: i32 = 10;

type Sink = LimitedWriter<BufWriter<File>>;

/// Animated GIF output through the `gif` encoder
///
/// The logical screen takes the size of the first frame, so the encoder is
/// only started once that frame arrives.
pub struct GifWriter {
    path: PathBuf,
    limit: u64,
    sink: Option<Sink>,
    encoder: Option<Encoder<Sink>>,
    repeat: Option<Repeat>,
    counter: ByteCounter,
    order: TimestampOrder,
    frames: usize,
}

/// Map a reader loop count onto the NETSCAPE repeat setting
///
/// `None` means no loop extension is written at all.
pub fn repeat_for(loop_count: i32) -> Option<Repeat> {
    match loop_count {
        0 => Some(Repeat::Infinite),
        n if n > 0 => Some(Repeat::Finite(n.min(i32::from(u16::MAX)) as u16)),
        _ => None,
    }
}

fn delay_cs(duration: Duration) -> u16 {
    let centis = (duration.as_millis() + 5) / 10;
    centis.min(u128::from(u16::MAX)) as u16
}

impl GifWriter {
    pub fn create(path: &Path, limit: u64, loop_count: i32) -> Result<Self> {
        let sink = LimitedWriter::new(BufWriter::new(File::create(path)?), limit);
        let counter = sink.counter();

        Ok(Self {
            path: path.to_path_buf(),
            limit,
            sink: Some(sink),
            encoder: None,
            repeat: repeat_for(loop_count),
            counter,
            order: TimestampOrder::default(),
            frames: 0,
        })
    }

    fn start(&mut self, width: u16, height: u16) -> Result<&mut Encoder<Sink>> {
        if self.encoder.is_none() {
            let sink = self
                .sink
                .take()
                .ok_or_else(|| EngineError::encode("GIF writer has no output left"))?;
            let mut encoder =
                Encoder::new(sink, width, height, &[]).map_err(|e| encoder_error(&self.counter, self.limit, e))?;
            if let Some(repeat) = self.repeat {
                encoder
                    .set_repeat(repeat)
                    .map_err(|e| encoder_error(&self.counter, self.limit, e))?;
            }
            self.encoder = Some(encoder);
        }
        self.encoder
            .as_mut()
            .ok_or_else(|| EngineError::encode("GIF encoder did not start"))
    }
}

impl FrameWriter<RgbaImage> for GifWriter {
    fn write_frame(&mut self, frame: &Frame<RgbaImage>) -> Result<()> {
        self.order.check(frame.timestamp)?;

        let (width, height) = frame.content.dimensions();
        let (Ok(width), Ok(height)) = (u16::try_from(width), u16::try_from(height)) else {
            return Err(EngineError::unsupported("GIF frames cannot be wider or taller than 65535 pixels"));
        };

        let mut pixels = frame.content.as_raw().clone();
        let mut gif_frame = gif::Frame::from_rgba_speed(width, height, &mut pixels, QUANTIZE_SPEED);
        gif_frame.delay = delay_cs(frame.duration);
        // Every frame covers the whole screen, so transparent pixels must not show the last one
        gif_frame.dispose = DisposalMethod::Background;

        let (counter, limit) = (self.counter.clone(), self.limit);
        self.start(width, height)?
            .write_frame(&gif_frame)
            .map_err(|e| encoder_error(&counter, limit, e))?;
        self.frames += 1;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<u64> {
        let sink = match self.encoder.take() {
            // Writes the trailer
            Some(encoder) => encoder.into_inner().map_err(io_error)?,
            None => self
                .sink
                .take()
                .ok_or_else(|| EngineError::encode("GIF writer has no output left"))?,
        };
        let mut file = sink.into_inner();
        file.flush()?;
        drop(file);

        let size = enforce_limit(&self.path, self.limit)?;
        info!("Wrote GIF {:?}: {} frames, {} bytes", self.path, self.frames, size);
        Ok(size)
    }
}
