use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageOutputFormat, RgbaImage};
use tracing::{debug, info};

use crate::encode::{encoder_error, enforce_limit, io_error, FrameWriter, LimitedWriter, TimestampOrder};
use crate::error::Result;
use crate::media::frame::Frame;

const JPEG_QUALITY: u8 = 90;

/// Single-image output (PNG or JPEG)
///
/// Only the first frame is encoded; later frames are counted and dropped.
pub struct StillWriter {
    path: PathBuf,
    limit: u64,
    format: ImageOutputFormat,
    first: Option<RgbaImage>,
    dropped: usize,
    order: TimestampOrder,
}

impl StillWriter {
    pub fn create(path: &Path, limit: u64, container: &str) -> Result<Self> {
        let format = match container {
            "jpg" | "jpeg" => ImageOutputFormat::Jpeg(JPEG_QUALITY),
            _ => ImageOutputFormat::Png,
        };

        Ok(Self {
            path: path.to_path_buf(),
            limit,
            format,
            first: None,
            dropped: 0,
            order: TimestampOrder::default(),
        })
    }
}

impl FrameWriter<RgbaImage> for StillWriter {
    fn write_frame(&mut self, frame: &Frame<RgbaImage>) -> Result<()> {
        self.order.check(frame.timestamp)?;
        if self.first.is_none() {
            self.first = Some(frame.content.clone());
        } else {
            self.dropped += 1;
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<u64> {
        let image = match self.first {
            Some(image) => image,
            None => return Ok(0),
        };
        if self.dropped > 0 {
            debug!("Still output keeps the first frame, dropped {}", self.dropped);
        }

        // JPEG has no alpha channel
        let image = match self.format {
            ImageOutputFormat::Jpeg(_) => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(image).to_rgb8()),
            _ => DynamicImage::ImageRgba8(image),
        };

        let mut writer = LimitedWriter::new(BufWriter::new(File::create(&self.path)?), self.limit);
        let counter = writer.counter();
        image
            .write_to(&mut writer, self.format.clone())
            .map_err(|e| encoder_error(&counter, self.limit, e))?;
        writer.flush().map_err(io_error)?;
        drop(writer);

        let size = enforce_limit(&self.path, self.limit)?;
        info!("Wrote still image {:?}: {} bytes", self.path, size);
        Ok(size)
    }
}
