use std::sync::Mutex;
use std::time::Duration;

use image::{Rgba, RgbaImage};
use tracing::debug;

use crate::composite::{self, Layer, OverlayGeometry};
use crate::error::{EngineError, Result};
use crate::media::frame::{frame_index_at, wrap_timestamp, Frame};
use crate::media::reader::{BoxedReader, FrameSequence, MediaReader};
use crate::media::registry::ReaderRegistry;
use crate::processing::Processor;
use crate::source::ByteSource;

/// Where and how a template asset is drawn onto each frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Asset top-left corner relative to the frame's
    pub offset: (i64, i64),
    /// Grow the canvas instead of clipping the asset
    pub expand: bool,
    pub layer: Layer,
    /// Resize the asset to this size before placing it
    pub asset_size: Option<(u32, u32)>,
    /// Colour of canvas areas neither image covers
    pub fill: Option<Rgba<u8>>,
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            offset: (0, 0),
            expand: false,
            layer: Layer::OverlayOnTop,
            asset_size: None,
            fill: None,
        }
    }
}

/// Decoded asset frames and the geometry shared by every output frame
pub struct TemplateLayout {
    frames: Vec<RgbaImage>,
    starts: Vec<Duration>,
    duration: Duration,
    geometry: OverlayGeometry,
}

impl TemplateLayout {
    pub fn geometry(&self) -> &OverlayGeometry {
        &self.geometry
    }

    /// Asset frame showing at `timestamp`, looping the asset as needed
    fn asset_at(&self, timestamp: Duration) -> &RgbaImage {
        let index = frame_index_at(&self.starts, wrap_timestamp(timestamp, self.duration));
        &self.frames[index.min(self.frames.len() - 1)]
    }
}

/// Draw a fixed or animated asset over (or under) every frame
///
/// The asset is decoded once per run in the constant data; an animated
/// asset loops on its own timeline independently of the input's.
pub struct TemplateProcessor {
    asset: Mutex<Option<BoxedReader<RgbaImage>>>,
    placement: Placement,
}

impl TemplateProcessor {
    pub fn new(asset: BoxedReader<RgbaImage>, placement: Placement) -> Self {
        Self {
            asset: Mutex::new(Some(asset)),
            placement,
        }
    }

    /// Open the asset through the image registry
    pub fn open(source: &ByteSource, registry: &ReaderRegistry<RgbaImage>, placement: Placement) -> Result<Self> {
        Ok(Self::new(registry.open(source)?, placement))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<BoxedReader<RgbaImage>>>> {
        self.asset
            .lock()
            .map_err(|_| EngineError::unsupported("template asset is unavailable"))
    }
}

impl Processor<RgbaImage> for TemplateProcessor {
    type Constant = TemplateLayout;

    fn name(&self) -> &str {
        "template"
    }

    fn constant_data(
        &self,
        first: &Frame<RgbaImage>,
        _frames: &mut dyn FrameSequence<RgbaImage>,
        _format: &str,
    ) -> Result<TemplateLayout> {
        let mut guard = self.lock()?;
        let asset = guard
            .as_mut()
            .ok_or_else(|| EngineError::unsupported("template asset was already closed"))?;

        let mut frames = Vec::with_capacity(asset.frame_count());
        let mut starts = Vec::with_capacity(asset.frame_count());
        for frame in asset.frames()? {
            let frame = frame?;
            starts.push(frame.timestamp);
            frames.push(match self.placement.asset_size {
                Some(size) => composite::stretch(frame.content, size),
                None => frame.content,
            });
        }

        let asset_dims = frames
            .first()
            .map(|image| image.dimensions())
            .ok_or_else(|| EngineError::unsupported("template asset has no frames"))?;
        let geometry = composite::overlay_geometry(
            first.content.dimensions(),
            asset_dims,
            self.placement.offset,
            self.placement.expand,
        );

        debug!(
            "Template layout: {} asset frames, canvas {}x{}",
            frames.len(),
            geometry.width,
            geometry.height
        );

        Ok(TemplateLayout {
            frames,
            starts,
            duration: asset.duration(),
            geometry,
        })
    }

    fn transform(&self, frame: Frame<RgbaImage>, layout: &TemplateLayout) -> Result<RgbaImage> {
        let asset = layout.asset_at(frame.timestamp);
        Ok(composite::overlay(
            &frame.content,
            asset,
            &layout.geometry,
            self.placement.layer,
            self.placement.fill,
        ))
    }

    fn close(&self) -> Result<()> {
        match self.lock()?.take() {
            Some(mut asset) => asset.close(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::backends::memory::test_support::*;
    use crate::media::backends::StaticImageReader;
    use crate::processing::{process, FrameProcessor};

    fn run(asset: BoxedReader<RgbaImage>, placement: Placement, durations: &[u64]) -> Vec<RgbaImage> {
        let mut reader = tagged_reader(durations);
        let processor = FrameProcessor::new(TemplateProcessor::new(asset, placement));
        let mut out = Vec::new();
        process(&mut reader, &processor, "gif", |frame| {
            out.push(frame.content);
            Ok(())
        })
        .unwrap();
        processor.close().unwrap();
        out
    }

    #[test]
    fn test_still_asset_on_top() {
        let asset = StaticImageReader::from_image(tagged_image(200, 2, 2), Duration::from_millis(1));
        let placement = Placement {
            offset: (1, 1),
            ..Placement::default()
        };
        let out = run(Box::new(asset), placement, &[10, 10]);
        assert_eq!(out[1].dimensions(), (4, 4));
        assert_eq!(out[1].get_pixel(2, 2)[0], 200);
        assert_eq!(out[1].get_pixel(0, 0)[0], 1);
    }

    #[test]
    fn test_animated_asset_loops_on_its_own_timeline() {
        // Asset frames 0 and 1, 100ms each; input frames every 100ms
        let asset = tagged_reader(&[100, 100]);
        let placement = Placement {
            expand: true,
            offset: (4, 0),
            ..Placement::default()
        };
        let out = run(Box::new(asset), placement, &[100, 100, 100]);
        let asset_tags: Vec<u8> = out.iter().map(|image| image.get_pixel(5, 0)[0]).collect();
        assert_eq!(asset_tags, vec![0, 1, 0]);
        assert_eq!(out[0].dimensions(), (8, 4));
    }

    #[test]
    fn test_close_releases_asset_once() {
        let processor = TemplateProcessor::new(Box::new(tagged_reader(&[10])), Placement::default());
        Processor::close(&processor).unwrap();
        Processor::close(&processor).unwrap();
        assert!(processor.lock().unwrap().is_none());
    }
}
