//! Size-bounded encoders
//!
//! Every writer sends its bytes through a [`LimitedWriter`], so an encode
//! that would pass the caller's ceiling stops with
//! [`EngineError::TooLarge`] instead of producing an oversized file. Frames
//! must arrive in non-decreasing timestamp order.

pub mod gif;
pub mod still;
pub mod video;
pub mod wav;

use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;
use tracing::debug;

use crate::config::ToolsConfig;
use crate::error::{EngineError, Result};
use crate::media::frame::{AudioChunk, Frame, FrameContent};

pub use self::gif::GifWriter;
pub use self::still::StillWriter;
pub use self::video::VideoWriter;
pub use self::wav::WavWriter;

/// Sink for encoded frames
pub trait FrameWriter<E: FrameContent>: Send {
    fn write_frame(&mut self, frame: &Frame<E>) -> Result<()>;

    /// Flush everything and return the size of the finished file
    fn finish(self: Box<Self>) -> Result<u64>;
}

/// Shared view of how many bytes a [`LimitedWriter`] has produced
#[derive(Debug, Clone, Default)]
pub struct ByteCounter {
    written: Arc<AtomicU64>,
    exceeded: Arc<AtomicBool>,
}

impl ByteCounter {
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::SeqCst)
    }

    pub fn exceeded(&self) -> bool {
        self.exceeded.load(Ordering::SeqCst)
    }
}

/// Marker carried inside the `io::Error` raised when the ceiling is hit
#[derive(Debug, thiserror::Error)]
#[error("output exceeds {limit} bytes")]
pub struct SizeExceeded {
    pub limit: u64,
}

/// `Write + Seek` passthrough that refuses to grow past `limit` bytes
///
/// The size is the furthest offset ever written, so headers patched in
/// place after a seek are not counted twice.
pub struct LimitedWriter<W> {
    inner: W,
    limit: u64,
    position: u64,
    counter: ByteCounter,
}

impl<W> LimitedWriter<W> {
    pub fn new(inner: W, limit: u64) -> Self {
        Self {
            inner,
            limit,
            position: 0,
            counter: ByteCounter::default(),
        }
    }

    /// Handle that keeps reporting the size after the writer moved into an encoder
    pub fn counter(&self) -> ByteCounter {
        self.counter.clone()
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for LimitedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let end = self.position + buf.len() as u64;
        if end > self.limit {
            self.counter.exceeded.store(true, Ordering::SeqCst);
            return Err(io::Error::new(
                io::ErrorKind::Other,
                SizeExceeded { limit: self.limit },
            ));
        }

        let written = self.inner.write(buf)?;
        self.position += written as u64;
        self.counter.written.fetch_max(self.position, Ordering::SeqCst);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Seek> Seek for LimitedWriter<W> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.position = self.inner.seek(pos)?;
        Ok(self.position)
    }
}

/// Turn an I/O failure from a limited write into the matching engine error
pub fn io_error(e: io::Error) -> EngineError {
    let exceeded = e
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<SizeExceeded>())
        .map(|marker| marker.limit);
    match exceeded {
        Some(limit) => EngineError::TooLarge { limit },
        None => EngineError::Io(e),
    }
}

/// Classify an encoder failure, preferring the size ceiling when it was hit
pub(crate) fn encoder_error<D: std::fmt::Display>(counter: &ByteCounter, limit: u64, e: D) -> EngineError {
    if counter.exceeded() {
        return EngineError::TooLarge { limit };
    }
    debug!("Encoder failed: {}", e);
    EngineError::encode("the encoder rejected a frame")
}

/// Rejects frames that go back in time
#[derive(Debug, Default)]
pub struct TimestampOrder {
    last: Option<Duration>,
}

impl TimestampOrder {
    pub fn check(&mut self, timestamp: Duration) -> Result<()> {
        if let Some(last) = self.last {
            if timestamp < last {
                return Err(EngineError::encode(format!(
                    "frame at {:?} arrived after a frame at {:?}",
                    timestamp, last
                )));
            }
        }
        self.last = Some(timestamp);
        Ok(())
    }
}

/// Check a finished file against the ceiling, deleting it when it is over
pub(crate) fn enforce_limit(path: &Path, limit: u64) -> Result<u64> {
    let size = std::fs::metadata(path)?.len();
    if size > limit {
        let _ = std::fs::remove_file(path);
        return Err(EngineError::TooLarge { limit });
    }
    Ok(size)
}

/// Writer for an image container token
///
/// # Arguments
///
/// * `container` - Output container token ("gif", "png", "jpg", "mp4")
/// * `path` - File to create
/// * `limit` - Byte ceiling for the finished file
/// * `loop_count` - Loop count in reader convention (0 = forever, -1 = once)
/// * `tools` - External tool locations for the video writer
pub fn image_writer(
    container: &str,
    path: &Path,
    limit: u64,
    loop_count: i32,
    tools: &ToolsConfig,
) -> Result<Box<dyn FrameWriter<RgbaImage>>> {
    debug!("Opening {} writer at {:?}", container, path);
    match container {
        "gif" => Ok(Box::new(GifWriter::create(path, limit, loop_count)?)),
        "png" | "jpg" | "jpeg" => Ok(Box::new(StillWriter::create(path, limit, container)?)),
        "mp4" => Ok(Box::new(VideoWriter::create(path, limit, &tools.ffmpeg)?)),
        other => Err(EngineError::unsupported(format!("cannot write {} files", other))),
    }
}

/// Writer for an audio container token
pub fn audio_writer(container: &str, path: &Path, limit: u64) -> Result<Box<dyn FrameWriter<AudioChunk>>> {
    match container {
        "wav" => Ok(Box::new(WavWriter::create(path, limit)?)),
        other => Err(EngineError::unsupported(format!("cannot write {} audio", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_limited_writer_stops_at_ceiling() {
        let mut writer = LimitedWriter::new(Vec::new(), 4);
        let counter = writer.counter();
        writer.write_all(&[1, 2, 3]).unwrap();

        let err = writer.write_all(&[4, 5]).unwrap_err();
        assert!(counter.exceeded());
        assert!(matches!(io_error(err), EngineError::TooLarge { limit: 4 }));
        assert_eq!(writer.into_inner(), vec![1, 2, 3]);
    }

    #[test]
    fn test_seek_back_is_not_counted_twice() {
        let mut writer = LimitedWriter::new(Cursor::new(Vec::new()), 8);
        let counter = writer.counter();
        writer.write_all(&[0; 6]).unwrap();
        writer.seek(SeekFrom::Start(0)).unwrap();
        writer.write_all(&[9; 2]).unwrap();
        assert_eq!(counter.written(), 6);
        assert!(!counter.exceeded());
    }

    #[test]
    fn test_other_io_errors_pass_through() {
        let err = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        assert!(matches!(io_error(err), EngineError::Io(_)));
    }

    #[test]
    fn test_timestamp_order() {
        let mut order = TimestampOrder::default();
        order.check(Duration::from_millis(10)).unwrap();
        order.check(Duration::from_millis(10)).unwrap();
        order.check(Duration::from_millis(30)).unwrap();
        assert!(matches!(
            order.check(Duration::from_millis(20)),
            Err(EngineError::Encode { .. })
        ));
    }

    #[test]
    fn test_unknown_container() {
        let dir = tempfile::tempdir().unwrap();
        let result = image_writer("webp", &dir.path().join("x.webp"), 1024, 0, &ToolsConfig::default());
        assert!(matches!(result, Err(EngineError::UnsupportedOperation { .. })));
    }
}
