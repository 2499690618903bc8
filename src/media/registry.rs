use std::collections::HashMap;

use image::RgbaImage;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::media::backends::{self, FfmpegReader, GifReader, PdfReader, StaticImageReader, SymphoniaReader};
use crate::media::frame::{AudioChunk, FrameContent};
use crate::media::reader::BoxedReader;
use crate::source::ByteSource;

/// Constructor for one backend
pub type ReaderFactory<E> =
    Box<dyn Fn(&ByteSource, &EngineConfig) -> Result<BoxedReader<E>> + Send + Sync>;

/// Registry mapping format tokens to reader backends
///
/// Tokens are lowercase ("gif", "webp", "mp4"). Formats without a dedicated
/// backend go to the fallback decoder. Whatever goes wrong while a backend
/// is being built surfaces as [`EngineError::UnreadableInput`]; the
/// underlying cause is only logged.
pub struct ReaderRegistry<E: FrameContent> {
    backends: HashMap<String, ReaderFactory<E>>,
    fallback: ReaderFactory<E>,
    config: EngineConfig,
}

impl<E: FrameContent> ReaderRegistry<E> {
    /// Create an empty registry that sends everything to `fallback`
    pub fn with_fallback<F>(config: EngineConfig, fallback: F) -> Self
    where
        F: Fn(&ByteSource, &EngineConfig) -> Result<BoxedReader<E>> + Send + Sync + 'static,
    {
        Self {
            backends: HashMap::new(),
            fallback: Box::new(fallback),
            config,
        }
    }

    /// Register a backend for a format token, replacing any previous one
    ///
    /// # Arguments
    ///
    /// * `format` - Format token, matched case-insensitively
    /// * `factory` - Function that opens a reader for that format
    pub fn register<F>(&mut self, format: &str, factory: F)
    where
        F: Fn(&ByteSource, &EngineConfig) -> Result<BoxedReader<E>> + Send + Sync + 'static,
    {
        self.backends.insert(format.to_lowercase(), Box::new(factory));
    }

    /// Open a reader, taking the format token from the source itself
    pub fn open(&self, source: &ByteSource) -> Result<BoxedReader<E>> {
        self.open_as(source, &source.format())
    }

    /// Open a reader for an explicit format token
    pub fn open_as(&self, source: &ByteSource, format: &str) -> Result<BoxedReader<E>> {
        let format = format.to_lowercase();
        let factory = match self.backends.get(&format) {
            Some(factory) => factory,
            None => {
                debug!("No backend for '{}', using fallback decoder", format);
                &self.fallback
            }
        };

        factory(source, &self.config).map_err(|e| {
            warn!("Could not open {} as '{}': {}", source.name(), format, e);
            match e {
                EngineError::UnreadableInput { .. } => e,
                _ => EngineError::unreadable(source.name()),
            }
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Check if a dedicated backend is registered for a token
    pub fn has_backend(&self, format: &str) -> bool {
        self.backends.contains_key(&format.to_lowercase())
    }

    pub fn available_formats(&self) -> Vec<String> {
        let mut formats: Vec<String> = self.backends.keys().cloned().collect();
        formats.sort();
        formats
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

const STATIC_FORMATS: [&str; 7] = ["png", "jpg", "jpeg", "bmp", "tif", "tiff", "ico"];

/// Registry of every image-capable backend, falling back to ffmpeg
pub fn image_registry(config: EngineConfig) -> ReaderRegistry<RgbaImage> {
    let mut registry = ReaderRegistry::with_fallback(config, |source, config| {
        Ok(Box::new(FfmpegReader::open(source, &config.tools)?) as BoxedReader<RgbaImage>)
    });

    for format in STATIC_FORMATS {
        registry.register(format, |source, config| {
            let reader = StaticImageReader::open(source, config.static_frame_duration())?;
            Ok(Box::new(reader))
        });
    }

    registry.register("gif", |source, _| Ok(Box::new(GifReader::open(source)?)));

    registry.register("webp", |source, config| {
        backends::webp::open(source, config.static_frame_duration())
    });

    registry.register("pdf", |source, config| {
        let reader = PdfReader::open(source, &config.tools.pdfinfo, &config.tools.pdftoppm, config.pdf_dpi)?;
        Ok(Box::new(reader))
    });

    registry
}

/// Registry of every audio-capable backend, falling back to symphonia
pub fn audio_registry(config: EngineConfig) -> ReaderRegistry<AudioChunk> {
    let mut registry = ReaderRegistry::with_fallback(config, |source, _| {
        Ok(Box::new(SymphoniaReader::open(source)?) as BoxedReader<AudioChunk>)
    });

    registry.register("wav", |source, _| Ok(Box::new(backends::wav::open(source)?)));

    registry
}
