use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use gif::DisposalMethod;
use image::{Rgba, RgbaImage};
use tracing::{debug, warn};

use crate::container;
use crate::error::{EngineError, Result};
use crate::media::decorators::{speed, Reversed};
use crate::media::frame::{frame_index_at, Frame};
use crate::media::reader::{BoxedReader, FrameIter, MediaReader};
use crate::source::ByteSource;

/// Delays this short are played back at 100 ms by browsers, so we do the same
const MIN_DELAY_CS: u16 = 1;
const DEFAULT_DELAY_CS: u16 = 10;

/// Animated GIF backend
///
/// Frame timing is read from the graphic control extensions up front,
/// without decompressing any image data. Pixels are composited on demand
/// by a forward cursor: reading a later frame continues from where the
/// previous read stopped, and only a backward seek starts decoding over.
pub struct GifReader {
    name: String,
    bytes: Option<Arc<[u8]>>,
    width: u32,
    height: u32,
    durations: Vec<Duration>,
    starts: Vec<Duration>,
    loop_count: i32,
    cursor: Option<Compositor>,
    last: Option<(usize, RgbaImage)>,
    restarts: usize,
}

/// Streaming decoder plus the canvas that disposal leaves behind
struct Compositor {
    decoder: gif::Decoder<Cursor<Arc<[u8]>>>,
    canvas: RgbaImage,
    next: usize,
}

impl Compositor {
    fn start(bytes: Arc<[u8]>, width: u32, height: u32) -> std::result::Result<Self, gif::DecodingError> {
        let mut options = gif::DecodeOptions::new();
        options.set_color_output(gif::ColorOutput::RGBA);
        let decoder = options.read_info(Cursor::new(bytes))?;
        Ok(Self {
            decoder,
            canvas: RgbaImage::new(width, height),
            next: 0,
        })
    }

    /// Composite the next frame onto the canvas, `None` past the last frame
    fn advance(&mut self) -> std::result::Result<Option<RgbaImage>, gif::DecodingError> {
        let (width, height) = self.canvas.dimensions();
        let Some(frame) = self.decoder.read_next_frame()? else {
            return Ok(None);
        };

        let mut current = RgbaImage::new(width, height);
        let (left, top) = (u32::from(frame.left), u32::from(frame.top));
        let frame_width = u32::from(frame.width);
        if frame_width > 0 {
            for (i, px) in frame.buffer.chunks_exact(4).enumerate() {
                let x = left + i as u32 % frame_width;
                let y = top + i as u32 / frame_width;
                if x < width && y < height {
                    current.put_pixel(x, y, Rgba([px[0], px[1], px[2], px[3]]));
                }
            }
        }
        let dispose = frame.dispose;

        for (previous, pixel) in self.canvas.pixels_mut().zip(current.pixels_mut()) {
            if pixel[3] == 0 {
                *pixel = *previous;
            }
            match dispose {
                DisposalMethod::Background => *previous = Rgba([0, 0, 0, 0]),
                DisposalMethod::Previous => {}
                _ => *previous = *pixel,
            }
        }

        self.next += 1;
        Ok(Some(current))
    }
}

fn normalize_delay(delay_cs: u16) -> Duration {
    let delay = if delay_cs <= MIN_DELAY_CS {
        DEFAULT_DELAY_CS
    } else {
        delay_cs
    };
    Duration::from_millis(u64::from(delay) * 10)
}

impl GifReader {
    pub fn open(source: &ByteSource) -> Result<Self> {
        let bytes: Arc<[u8]> = Arc::from(source.read_all()?);
        let unreadable = |e: &dyn std::fmt::Display| {
            debug!("GIF decode of {} failed: {}", source.name(), e);
            EngineError::unreadable(source.name())
        };

        let mut options = gif::DecodeOptions::new();
        options.set_color_output(gif::ColorOutput::Indexed);
        let mut decoder = options
            .read_info(Cursor::new(&bytes[..]))
            .map_err(|e| unreadable(&e))?;

        let width = u32::from(decoder.width());
        let height = u32::from(decoder.height());
        let mut durations = Vec::new();
        while let Some(frame) = decoder.next_frame_info().map_err(|e| unreadable(&e))? {
            durations.push(normalize_delay(frame.delay));
        }

        let loop_count = match container::gif::loop_count(&bytes) {
            Ok(count) => count,
            Err(e) => {
                warn!("Could not read loop count of {}: {}", source.name(), e);
                -1
            }
        };

        let mut starts = Vec::with_capacity(durations.len());
        let mut elapsed = Duration::ZERO;
        for duration in &durations {
            starts.push(elapsed);
            elapsed += *duration;
        }

        debug!(
            "Opened GIF {} ({}x{}, {} frames, loop {})",
            source.name(),
            width,
            height,
            durations.len(),
            loop_count
        );

        Ok(Self {
            name: source.name().to_string(),
            bytes: Some(bytes),
            width,
            height,
            durations,
            starts,
            loop_count,
            cursor: None,
            last: None,
            restarts: 0,
        })
    }

    fn compositor(&self) -> Result<Compositor> {
        let bytes = self
            .bytes
            .clone()
            .ok_or_else(|| EngineError::unsupported("reader is closed"))?;
        Compositor::start(bytes, self.width, self.height).map_err(|e| self.decode_error(&e))
    }

    fn decode_error(&self, e: &gif::DecodingError) -> EngineError {
        debug!("GIF decode of {} failed: {}", self.name, e);
        EngineError::unreadable(self.name.as_str())
    }

    fn frame(&self, index: usize, image: RgbaImage) -> Frame<RgbaImage> {
        Frame::new(image, self.durations[index], self.starts[index])
    }
}

impl MediaReader<RgbaImage> for GifReader {
    fn frame_count(&self) -> usize {
        self.durations.len()
    }

    fn frame_rate(&self) -> f64 {
        let seconds = self.duration().as_secs_f64();
        if seconds == 0.0 {
            return 0.0;
        }
        self.durations.len() as f64 / seconds
    }

    fn duration(&self) -> Duration {
        self.durations.iter().sum()
    }

    fn frame_duration(&self) -> Duration {
        if self.durations.is_empty() {
            return Duration::ZERO;
        }
        self.duration() / self.durations.len() as u32
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn loop_count(&self) -> i32 {
        self.loop_count
    }

    fn read_frame_at(&mut self, timestamp: Duration) -> Result<Frame<RgbaImage>> {
        if self.durations.is_empty() {
            return Err(EngineError::unsupported("cannot read a frame from empty media"));
        }
        let index = frame_index_at(&self.starts, timestamp);
        if let Some((cached, image)) = &self.last {
            if *cached == index {
                return Ok(self.frame(index, image.clone()));
            }
        }

        let mut cursor = match self.cursor.take() {
            Some(cursor) if cursor.next <= index => cursor,
            _ => {
                self.restarts += 1;
                debug!("Decoding {} from the start for frame {} (pass {})", self.name, index, self.restarts);
                self.compositor()?
            }
        };

        let image = loop {
            let position = cursor.next;
            let image = cursor
                .advance()
                .map_err(|e| self.decode_error(&e))?
                .ok_or_else(|| EngineError::unreadable(self.name.as_str()))?;
            if position == index {
                break image;
            }
        };

        self.cursor = Some(cursor);
        self.last = Some((index, image.clone()));
        Ok(self.frame(index, image))
    }

    fn frames(&mut self) -> Result<FrameIter<'_, RgbaImage>> {
        let mut cursor = self.compositor()?;
        let this = &*self;
        Ok(Box::new((0..this.durations.len()).map(move |index| {
            let image = cursor
                .advance()
                .map_err(|e| this.decode_error(&e))?
                .ok_or_else(|| EngineError::unreadable(this.name.as_str()))?;
            Ok(this.frame(index, image))
        })))
    }

    fn reversed(self: Box<Self>) -> Result<BoxedReader<RgbaImage>> {
        Ok(Reversed::wrap(self))
    }

    fn change_speed(self: Box<Self>, speed: f64) -> Result<BoxedReader<RgbaImage>> {
        speed::change(self, speed)
    }

    fn close(&mut self) -> Result<()> {
        self.bytes = None;
        self.cursor = None;
        self.last = None;
        Ok(())
    }
}
