use std::sync::Arc;

use image::{Rgba, RgbaImage};
use tracing::{debug, info};

use crate::effects::{CropProcessor, Rect};
use crate::error::Result;
use crate::media::reader::MediaReader;
use crate::processing::{FrameProcessor, OutputFormat, ProcessingConfig};
use crate::source::{self, ByteSource};
use crate::task::{FileTask, ProcessingTask, TaskContext, TaskKind};

/// Finds the area of a frame that differs from its border color
///
/// The border color is the top-left pixel. A pixel belongs to the content
/// when any of its channels is more than `tolerance` away from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BorderDetector {
    pub tolerance: u8,
}

impl Default for BorderDetector {
    fn default() -> Self {
        Self { tolerance: 8 }
    }
}

impl BorderDetector {
    pub fn new(tolerance: u8) -> Self {
        Self { tolerance }
    }

    fn differs(&self, pixel: &Rgba<u8>, background: &Rgba<u8>) -> bool {
        pixel
            .0
            .iter()
            .zip(background.0.iter())
            .any(|(a, b)| a.abs_diff(*b) > self.tolerance)
    }

    fn row_differs(&self, image: &RgbaImage, y: u32, background: &Rgba<u8>) -> bool {
        (0..image.width()).any(|x| self.differs(image.get_pixel(x, y), background))
    }

    fn column_differs(&self, image: &RgbaImage, x: u32, background: &Rgba<u8>) -> bool {
        (0..image.height()).any(|y| self.differs(image.get_pixel(x, y), background))
    }

    /// Content rectangle of `image`; empty when the whole frame is border
    ///
    /// The four edges are scanned in parallel.
    pub fn detect(&self, image: &RgbaImage) -> Rect {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Rect::new(0, 0, 0, 0);
        }
        let background = *image.get_pixel(0, 0);

        let ((top, bottom), (left, right)) = rayon::join(
            || {
                rayon::join(
                    || (0..height).find(|&y| self.row_differs(image, y, &background)),
                    || (0..height).rev().find(|&y| self.row_differs(image, y, &background)),
                )
            },
            || {
                rayon::join(
                    || (0..width).find(|&x| self.column_differs(image, x, &background)),
                    || (0..width).rev().find(|&x| self.column_differs(image, x, &background)),
                )
            },
        );

        match (top, bottom, left, right) {
            (Some(top), Some(bottom), Some(left), Some(right)) => {
                Rect::new(left, top, right - left + 1, bottom - top + 1)
            }
            _ => Rect::new(0, 0, 0, 0),
        }
    }
}

/// Crop every input to the area its border detectors agree on
///
/// The rectangle is the union over every frame and every detector, so an
/// animation never loses content that only appears in some frames.
pub struct AutoCropTask {
    context: Arc<TaskContext>,
    detectors: Vec<BorderDetector>,
    max_bytes: u64,
    passes: Vec<ProcessingTask>,
}

impl AutoCropTask {
    pub fn new(context: Arc<TaskContext>, detector: BorderDetector, max_bytes: u64) -> Self {
        Self {
            context,
            detectors: vec![detector],
            max_bytes,
            passes: Vec::new(),
        }
    }

    pub fn detectors(&self) -> &[BorderDetector] {
        &self.detectors
    }

    /// One crop over the union of what both tasks detect
    pub fn merge(mut self, next: AutoCropTask) -> AutoCropTask {
        self.detectors.extend(next.detectors);
        self.max_bytes = self.max_bytes.min(next.max_bytes);
        self
    }

    /// Union of the detected areas over every frame of `input`
    pub fn detect(&self, input: &ByteSource) -> Result<Rect> {
        let mut reader = self.context.images.open(input)?;
        let full = Rect::full(reader.width(), reader.height());

        let detected = self.scan(reader.as_mut());
        let closed = reader.close();
        let detected = detected?;
        closed?;

        if detected.is_empty() {
            debug!("Nothing to crop in {}", input.name());
            return Ok(full);
        }
        Ok(detected)
    }

    fn scan(&self, reader: &mut dyn MediaReader<RgbaImage>) -> Result<Rect> {
        let mut area = Rect::new(0, 0, 0, 0);
        for frame in reader.frames()? {
            let frame = frame?;
            for detector in &self.detectors {
                let found = self.context.install(|| detector.detect(&frame.content));
                area = area.union(&found);
            }
        }
        Ok(area)
    }
}

impl FileTask for AutoCropTask {
    fn name(&self) -> &str {
        "autocrop"
    }

    fn requires_input(&self) -> bool {
        true
    }

    fn run(&mut self, inputs: Vec<ByteSource>) -> Result<Vec<ByteSource>> {
        let inputs = source::resolve_blocking(inputs, self.context.config.max_fetch_bytes)?;
        let mut outputs = Vec::with_capacity(inputs.len());

        for (index, input) in inputs.into_iter().enumerate() {
            let rect = self.detect(&input)?;
            info!("Auto-crop of {} detected {:?}", input.name(), rect);

            // One pass per input, so the index keeps the output names apart
            let name = match index {
                0 => self.name().to_string(),
                n => format!("{}_{}", self.name(), n),
            };
            let config = ProcessingConfig::simple(
                name,
                FrameProcessor::new(CropProcessor::new(rect)),
                OutputFormat::Input,
            );
            let mut pass = ProcessingTask::new(Arc::clone(&self.context), config, self.max_bytes);
            let result = pass.run(vec![input]);
            self.passes.push(pass);
            outputs.extend(result?);
        }
        Ok(outputs)
    }

    fn cleanup(&mut self) -> Result<()> {
        let mut result = Ok(());
        for mut pass in self.passes.drain(..) {
            result = result.and(pass.cleanup());
        }
        result
    }

    fn into_kind(self: Box<Self>) -> TaskKind {
        TaskKind::Crop(*self)
    }
}
