use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use image::RgbaImage;
use tempfile::{TempDir, TempPath};
use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::media::decorators::{speed, Reversed};
use crate::media::frame::Frame;
use crate::media::reader::{BoxedReader, FrameIter, MediaReader};
use crate::source::ByteSource;

const PAGE_DURATION: Duration = Duration::from_secs(1);

/// PDF document rendered one page per second through poppler's `pdftoppm`
pub struct PdfReader {
    name: String,
    path: PathBuf,
    input: Option<TempPath>,
    workdir: Option<TempDir>,
    pdftoppm: PathBuf,
    dpi: u32,
    pages: usize,
    width: u32,
    height: u32,
}

impl PdfReader {
    pub fn open(source: &ByteSource, pdfinfo: &Path, pdftoppm: &Path, dpi: u32) -> Result<Self> {
        let (path, input) = source.materialize()?;
        let pages = count_pages(pdfinfo, &path).ok_or_else(|| EngineError::unreadable(source.name()))?;
        let workdir = tempfile::Builder::new().prefix("media_engine_pdf_").tempdir()?;

        let mut reader = Self {
            name: source.name().to_string(),
            path,
            input,
            workdir: Some(workdir),
            pdftoppm: pdftoppm.to_path_buf(),
            dpi,
            pages,
            width: 0,
            height: 0,
        };

        if pages > 0 {
            let first = reader.render(0)?;
            reader.width = first.width();
            reader.height = first.height();
        }

        debug!(
            "Opened PDF {} ({} pages, {}x{} at {} dpi)",
            reader.name, pages, reader.width, reader.height, dpi
        );
        Ok(reader)
    }

    fn render(&self, page: usize) -> Result<RgbaImage> {
        let workdir = self
            .workdir
            .as_ref()
            .ok_or_else(|| EngineError::unsupported("reader is closed"))?;
        let prefix = workdir.path().join(format!("page_{}", page));
        let page_number = (page + 1).to_string();

        let status = Command::new(&self.pdftoppm)
            .args(["-f", page_number.as_str(), "-l", page_number.as_str()])
            .arg("-r")
            .arg(self.dpi.to_string())
            .args(["-png", "-singlefile"])
            .arg(&self.path)
            .arg(&prefix)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| {
                warn!("Could not start pdftoppm: {}", e);
                EngineError::unreadable(self.name.as_str())
            })?;

        if !status.success() {
            warn!("pdftoppm failed on page {} of {}", page_number, self.name);
            return Err(EngineError::unreadable(self.name.as_str()));
        }

        let rendered = prefix.with_extension("png");
        let image = image::open(&rendered).map_err(|e| {
            debug!("Rendered page {} unreadable: {}", page_number, e);
            EngineError::unreadable(self.name.as_str())
        })?;
        std::fs::remove_file(&rendered)?;
        Ok(image.to_rgba8())
    }

    fn page_frame(&self, page: usize) -> Result<Frame<RgbaImage>> {
        Ok(Frame::new(self.render(page)?, PAGE_DURATION, PAGE_DURATION * page as u32))
    }
}

fn count_pages(pdfinfo: &Path, path: &Path) -> Option<usize> {
    let output = Command::new(pdfinfo)
        .arg(path)
        .stderr(Stdio::null())
        .output()
        .map_err(|e| warn!("Could not start pdfinfo: {}", e))
        .ok()?;
    if !output.status.success() {
        return None;
    }
    parse_page_count(&String::from_utf8_lossy(&output.stdout))
}

fn parse_page_count(info: &str) -> Option<usize> {
    info.lines()
        .find_map(|line| line.strip_prefix("Pages:"))
        .and_then(|value| value.trim().parse().ok())
}

impl MediaReader<RgbaImage> for PdfReader {
    fn frame_count(&self) -> usize {
        self.pages
    }

    fn frame_rate(&self) -> f64 {
        if self.pages > 1 {
            1.0
        } else {
            0.0
        }
    }

    fn duration(&self) -> Duration {
        PAGE_DURATION * self.pages as u32
    }

    fn frame_duration(&self) -> Duration {
        PAGE_DURATION
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn loop_count(&self) -> i32 {
        -1
    }

    fn read_frame_at(&mut self, timestamp: Duration) -> Result<Frame<RgbaImage>> {
        if self.pages == 0 {
            return Err(EngineError::unsupported("cannot read a frame from empty media"));
        }
        let page = (timestamp.as_secs() as usize).min(self.pages - 1);
        self.page_frame(page)
    }

    fn frames(&mut self) -> Result<FrameIter<'_, RgbaImage>> {
        let this = &*self;
        Ok(Box::new((0..this.pages).map(move |page| this.page_frame(page))))
    }

    fn reversed(self: Box<Self>) -> Result<BoxedReader<RgbaImage>> {
        Ok(Reversed::wrap(self))
    }

    fn change_speed(self: Box<Self>, speed: f64) -> Result<BoxedReader<RgbaImage>> {
        speed::change(self, speed)
    }

    fn close(&mut self) -> Result<()> {
        if let Some(workdir) = self.workdir.take() {
            workdir.close()?;
        }
        if let Some(input) = self.input.take() {
            input.close()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_page_count() {
        let info = "Title:          Slides\nPages:          12\nEncrypted:      no\n";
        assert_eq!(parse_page_count(info), Some(12));
        assert_eq!(parse_page_count("Producer: x\n"), None);
    }

    #[test]
    fn test_missing_tool_is_unreadable() {
        let source = ByteSource::from_bytes("doc.pdf", b"%PDF-1.4\n%%EOF\n".to_vec());
        let result = PdfReader::open(
            &source,
            Path::new("/nonexistent/pdfinfo"),
            Path::new("/nonexistent/pdftoppm"),
            72,
        );
        assert!(matches!(result, Err(EngineError::UnreadableInput { .. })));
    }
}
