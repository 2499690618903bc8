use std::time::Duration;

use tracing::debug;

use crate::error::Result;
use crate::media::decorators::{self, ConstantFrameDuration};
use crate::media::frame::FrameContent;
use crate::media::reader::BoxedReader;
use crate::processing::processor::FrameProcessor;

/// Video containers the MP4 writer accepts as input tokens
const VIDEO_FORMATS: [&str; 7] = ["mp4", "mov", "webm", "mkv", "avi", "m4v", "flv"];

/// Still containers written back as themselves
const STILL_FORMATS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Output container policy of one processing stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    /// Keep whatever the input was, as far as a writer exists for it
    Input,
    /// Always write this container
    Force(String),
}

impl OutputFormat {
    pub fn force<S: Into<String>>(format: S) -> Self {
        Self::Force(format.into().to_lowercase())
    }

    /// Policy of this stage followed by `later`; a later forced container wins
    pub fn then(self, later: OutputFormat) -> OutputFormat {
        match later {
            Self::Force(format) => Self::Force(format),
            Self::Input => self,
        }
    }
}

/// Pick the container to write for an input token
///
/// # Arguments
///
/// * `policy` - Output policy of the config being run
/// * `input` - Format token of the input
/// * `animated` - Whether the processed result has more than one frame
pub fn container_for(policy: &OutputFormat, input: &str, animated: bool) -> String {
    if let OutputFormat::Force(format) = policy {
        return format.clone();
    }

    let input = input.to_lowercase();
    let container = if animated {
        if input == "gif" {
            "gif".to_string()
        } else if VIDEO_FORMATS.contains(&input.as_str()) {
            "mp4".to_string()
        } else {
            "gif".to_string()
        }
    } else if STILL_FORMATS.contains(&input.as_str()) {
        input.clone()
    } else {
        "png".to_string()
    };

    debug!("Container for '{}' (animated: {}): {}", input, animated, container);
    container
}

/// Reader-level retiming: reversal, speed, duration cap, fixed frame rate
#[derive(Debug, Clone, PartialEq)]
pub struct RetimeConfig {
    pub reverse: bool,
    /// Playback speed multiplier, 1.0 leaves timing untouched
    pub speed: f64,
    pub max_duration: Option<Duration>,
    pub frame_duration: Option<Duration>,
    /// Total length when resampling; only used with `frame_duration`
    pub stretch_to: Option<Duration>,
}

impl Default for RetimeConfig {
    fn default() -> Self {
        Self {
            reverse: false,
            speed: 1.0,
            max_duration: None,
            frame_duration: None,
            stretch_to: None,
        }
    }
}

impl RetimeConfig {
    pub fn reverse() -> Self {
        Self {
            reverse: true,
            ..Self::default()
        }
    }

    pub fn speed(speed: f64) -> Self {
        Self {
            speed,
            ..Self::default()
        }
    }

    pub fn limit(max: Duration) -> Self {
        Self {
            max_duration: Some(max),
            ..Self::default()
        }
    }

    /// Wrap `reader` in the decorators this config asks for
    ///
    /// Order: reversal, speed, resampling, then the duration cap, so the cap
    /// always applies to the timeline that is finally written.
    pub fn apply<E: FrameContent>(&self, reader: BoxedReader<E>) -> Result<BoxedReader<E>> {
        let mut reader = reader;
        if self.reverse {
            reader = reader.reversed()?;
        }
        reader = reader.change_speed(self.speed)?;

        if let Some(frame_duration) = self.frame_duration {
            let total = self.stretch_to.unwrap_or_else(|| reader.duration());
            reader = Box::new(ConstantFrameDuration::with_total(reader, frame_duration, total)?);
        }

        if let Some(max) = self.max_duration {
            reader = decorators::limit(reader, max)?;
        }

        Ok(reader)
    }
}

/// A unit of processing bound to its output naming and container policy
pub enum ProcessingConfig<E: FrameContent> {
    /// One frame processor run over the decoded input
    Simple {
        name: String,
        processor: FrameProcessor<E>,
        format: OutputFormat,
    },
    /// Decorators applied to the reader, frames left as they are
    Retime { name: String, retime: RetimeConfig },
}

impl<E: FrameContent> ProcessingConfig<E> {
    pub fn simple<S: Into<String>>(name: S, processor: FrameProcessor<E>, format: OutputFormat) -> Self {
        Self::Simple {
            name: name.into(),
            processor,
            format,
        }
    }

    pub fn retime<S: Into<String>>(name: S, retime: RetimeConfig) -> Self {
        Self::Retime {
            name: name.into(),
            retime,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Simple { name, .. } | Self::Retime { name, .. } => name,
        }
    }

    pub fn is_simple(&self) -> bool {
        matches!(self, Self::Simple { .. })
    }

    pub fn output_format(&self) -> OutputFormat {
        match self {
            Self::Simple { format, .. } => format.clone(),
            Self::Retime { .. } => OutputFormat::Input,
        }
    }

    pub fn processor(&self) -> FrameProcessor<E> {
        match self {
            Self::Simple { processor, .. } => processor.clone(),
            Self::Retime { .. } => FrameProcessor::Identity,
        }
    }

    pub fn retiming(&self) -> Option<&RetimeConfig> {
        match self {
            Self::Simple { .. } => None,
            Self::Retime { retime, .. } => Some(retime),
        }
    }

    /// Decorate the reader before processing starts
    pub fn prepare_reader(&self, reader: BoxedReader<E>) -> Result<BoxedReader<E>> {
        match self {
            Self::Simple { .. } => Ok(reader),
            Self::Retime { retime, .. } => retime.apply(reader),
        }
    }

    /// Fold `next` into this config so both run in one pass
    ///
    /// Only two simple configs merge. Anything else hands both configs back
    /// so the caller can run them one after the other.
    pub fn merge(self, next: ProcessingConfig<E>) -> std::result::Result<Self, (Self, Self)> {
        match (self, next) {
            (
                Self::Simple {
                    processor: first,
                    format: first_format,
                    ..
                },
                Self::Simple {
                    name,
                    processor: second,
                    format: second_format,
                },
            ) => Ok(Self::Simple {
                name,
                processor: first.then(second),
                format: first_format.then(second_format),
            }),
            (first, second) => Err((first, second)),
        }
    }

    pub fn close(&self) -> Result<()> {
        match self {
            Self::Simple { processor, .. } => processor.close(),
            Self::Retime { .. } => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::backends::memory::test_support::*;
    use crate::media::reader::MediaReader;
    use crate::processing::processor::test_support::AddRed;
    use image::RgbaImage;

    #[test]
    fn test_forced_container_wins() {
        let policy = OutputFormat::force("PNG");
        assert_eq!(container_for(&policy, "gif", true), "png");
    }

    #[test]
    fn test_input_container_mapping() {
        let input = OutputFormat::Input;
        assert_eq!(container_for(&input, "gif", true), "gif");
        assert_eq!(container_for(&input, "mov", true), "mp4");
        assert_eq!(container_for(&input, "webp", true), "gif");
        assert_eq!(container_for(&input, "webp", false), "png");
        assert_eq!(container_for(&input, "gif", false), "png");
        assert_eq!(container_for(&input, "JPG", false), "jpg");
        assert_eq!(container_for(&input, "tiff", false), "png");
    }

    #[test]
    fn test_later_forced_format_overrides() {
        let policy = OutputFormat::force("gif").then(OutputFormat::Input);
        assert_eq!(policy, OutputFormat::Force("gif".to_string()));
        let policy = OutputFormat::force("gif").then(OutputFormat::force("mp4"));
        assert_eq!(policy, OutputFormat::Force("mp4".to_string()));
    }

    #[test]
    fn test_simple_configs_merge() {
        let first = ProcessingConfig::<RgbaImage>::simple(
            "first",
            FrameProcessor::new(AddRed::new(1)),
            OutputFormat::force("gif"),
        );
        let second = ProcessingConfig::simple("second", FrameProcessor::new(AddRed::new(2)), OutputFormat::Input);

        let merged = first.merge(second).ok().unwrap();
        assert_eq!(merged.name(), "second");
        assert_eq!(merged.output_format(), OutputFormat::Force("gif".to_string()));
        assert_eq!(merged.processor().name(), "add_red+add_red");
    }

    #[test]
    fn test_retime_does_not_merge() {
        let first = ProcessingConfig::<RgbaImage>::retime("reverse", RetimeConfig::reverse());
        let second = ProcessingConfig::simple("crop", FrameProcessor::Identity, OutputFormat::Input);
        let (first, second) = first.merge(second).err().unwrap();
        assert_eq!(first.name(), "reverse");
        assert_eq!(second.name(), "crop");
    }

    #[test]
    fn test_retime_applies_decorators() {
        let retime = RetimeConfig {
            reverse: true,
            speed: 2.0,
            max_duration: Some(Duration::from_millis(100)),
            ..RetimeConfig::default()
        };
        let reader: BoxedReader<RgbaImage> = Box::new(tagged_reader(&[100, 100, 100, 100]));
        let mut reader = retime.apply(reader).unwrap();

        assert_eq!(reader.duration(), Duration::from_millis(100));
        assert_eq!(tags(reader.as_mut()), vec![3, 2]);
    }

    #[test]
    fn test_resample_over_stretched_total() {
        let retime = RetimeConfig {
            frame_duration: Some(Duration::from_millis(50)),
            stretch_to: Some(Duration::from_millis(200)),
            ..RetimeConfig::default()
        };
        let reader: BoxedReader<RgbaImage> = Box::new(tagged_reader(&[100]));
        let reader = retime.apply(reader).unwrap();
        assert_eq!(reader.frame_count(), 4);
        assert_eq!(reader.duration(), Duration::from_millis(200));
    }
}
