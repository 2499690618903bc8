use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use image::RgbaImage;
use serde::Serialize;
use tracing::{info, warn, Level};

use media_engine::{
    config::EngineConfig,
    effects::{
        CropProcessor, FlipAxis, FlipProcessor, Placement, Rect, SpeechBubbleProcessor, SpinProcessor,
        StretchProcessor, StretchSize, TemplateProcessor,
    },
    processing::{FrameProcessor, OutputFormat, ProcessingConfig, RetimeConfig},
    source::{self, ByteSource},
    task::{
        chain, run_task, AutoCropTask, BorderDetector, FetchTask, FileTask, GifLoopTask, ProcessingTask,
        TaskContext, UrlTask,
    },
};

#[derive(Parser)]
#[command(
    name = "media-engine",
    version,
    about = "Apply chained effects to images, GIFs, videos and audio",
    long_about = "Media Engine decodes each input into timestamped frames, runs every requested effect over them in as few passes as possible and writes the result under a size ceiling."
)]
struct Cli {
    /// Input files or http(s) URLs
    #[arg(short, long)]
    input: Vec<String>,

    /// Directory the results are written to
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Effect to apply, as name[=argument]; repeat to chain effects
    ///
    /// crop=x,y,w,h  autocrop[=tolerance]  stretch=WxH|factor  flip  flop
    /// spin[=deg/s]  reverse  speed=factor  limit=seconds  fps=rate
    /// loop=count  template=path[@x,y]  bubble  format=ext
    /// url=address  fetch=address,address
    #[arg(short, long = "effect", required = true)]
    effects: Vec<String>,

    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print a JSON summary of the written files
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Serialize)]
struct Written {
    name: String,
    path: PathBuf,
    bytes: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(log_level).init();

    info!("Starting Media Engine v{}", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            EngineConfig::from_file(config_path)?
        }
        None => {
            info!("Using default configuration");
            EngineConfig::default()
        }
    };
    let context = TaskContext::new(config.clone())?;

    let mut tasks = cli.effects.iter().map(|effect| build_task(&context, effect));
    let first = tasks.next().ok_or_else(|| anyhow!("No effect given"))??;
    let task = tasks.try_fold(first, |task, next| -> Result<Box<dyn FileTask>> {
        Ok(chain(task, next?)?)
    })?;
    info!("Running '{}'", task.name());

    if task.requires_input() && cli.input.is_empty() {
        bail!("'{}' needs at least one --input", task.name());
    }
    let inputs = cli.input.iter().map(|input| input_source(input)).collect();

    let (outputs, mut task) = match run_task(task, inputs, config.max_fetch_bytes).await {
        Ok(done) => done,
        Err(e) => bail!(e.user_message()),
    };

    let written = save_outputs(outputs, &cli.output_dir, config.max_fetch_bytes).await;
    if let Err(e) = task.cleanup() {
        warn!("Cleanup failed: {}", e);
    }
    let written = written?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&written)?);
    }
    info!("Wrote {} files to {:?}", written.len(), cli.output_dir);
    Ok(())
}

fn input_source(input: &str) -> ByteSource {
    if input.starts_with("http://") || input.starts_with("https://") {
        ByteSource::remote(input)
    } else {
        ByteSource::from_path(input)
    }
}

/// Copy task outputs out of the task's temporaries before cleanup
async fn save_outputs(outputs: Vec<ByteSource>, dir: &Path, max_fetch_bytes: u64) -> Result<Vec<Written>> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Cannot create {:?}", dir))?;

    let outputs = source::resolve_all(outputs, max_fetch_bytes).await?;
    let mut written = Vec::with_capacity(outputs.len());
    for output in outputs {
        let path = dir.join(output.name());
        let bytes = match output.path() {
            Some(from) => tokio::fs::copy(from, &path).await?,
            None => {
                let bytes = output.read_all()?;
                tokio::fs::write(&path, &bytes).await?;
                bytes.len() as u64
            }
        };
        info!("Saved {:?} ({} bytes)", path, bytes);
        written.push(Written {
            name: output.name().to_string(),
            path,
            bytes,
        });
    }
    Ok(written)
}

/// Turn one `name[=argument]` effect into a task
fn build_task(context: &Arc<TaskContext>, effect: &str) -> Result<Box<dyn FileTask>> {
    let (name, argument) = match effect.split_once('=') {
        Some((name, argument)) => (name.trim(), Some(argument.trim())),
        None => (effect.trim(), None),
    };
    let name = name.to_lowercase();
    let max_bytes = context.config.max_output_bytes;
    let require = || argument.ok_or_else(|| anyhow!("Effect '{}' needs an argument", name));

    let simple = |processor: FrameProcessor<RgbaImage>| -> Box<dyn FileTask> {
        let config = ProcessingConfig::simple(name.as_str(), processor, OutputFormat::Input);
        Box::new(ProcessingTask::new(Arc::clone(context), config, max_bytes))
    };
    let retime = |retime: RetimeConfig| -> Box<dyn FileTask> {
        let config = ProcessingConfig::retime(name.as_str(), retime);
        Box::new(ProcessingTask::new(Arc::clone(context), config, max_bytes))
    };

    let task: Box<dyn FileTask> = match name.as_str() {
        "crop" => {
            let values = parse_list::<u32>(require()?)?;
            let &[x, y, width, height] = values.as_slice() else {
                bail!("crop takes x,y,width,height");
            };
            simple(FrameProcessor::new(CropProcessor::new(Rect::new(x, y, width, height))))
        }
        "autocrop" => {
            let detector = match argument {
                Some(tolerance) => BorderDetector::new(tolerance.parse().context("autocrop tolerance must be 0-255")?),
                None => BorderDetector::default(),
            };
            Box::new(AutoCropTask::new(Arc::clone(context), detector, max_bytes))
        }
        "stretch" => simple(FrameProcessor::new(StretchProcessor::new(parse_stretch(require()?)?))),
        "flip" => simple(FrameProcessor::new(FlipProcessor::new(FlipAxis::Horizontal))),
        "flop" => simple(FrameProcessor::new(FlipProcessor::new(FlipAxis::Vertical))),
        "spin" => {
            let speed = match argument {
                Some(speed) => speed.parse().context("spin takes degrees per second")?,
                None => 360.0,
            };
            simple(FrameProcessor::new(SpinProcessor::new(speed)))
        }
        "bubble" => simple(FrameProcessor::new(SpeechBubbleProcessor::new())),
        "template" => {
            let (path, offset) = match require()?.split_once('@') {
                Some((path, offset)) => (path, Some(offset)),
                None => (require()?, None),
            };
            let mut placement = Placement::default();
            if let Some(offset) = offset {
                let values = parse_list::<i64>(offset)?;
                let &[x, y] = values.as_slice() else {
                    bail!("template offset is x,y");
                };
                placement.offset = (x, y);
                placement.expand = true;
            }
            let asset = TemplateProcessor::open(&ByteSource::from_path(path), &context.images, placement)?;
            simple(FrameProcessor::new(asset))
        }
        "format" => {
            let config = ProcessingConfig::simple("format", FrameProcessor::Identity, OutputFormat::force(require()?));
            Box::new(ProcessingTask::new(Arc::clone(context), config, max_bytes))
        }
        "reverse" => retime(RetimeConfig::reverse()),
        "speed" => retime(RetimeConfig::speed(require()?.parse().context("speed takes a number")?)),
        "limit" => {
            let seconds: f64 = require()?.parse().context("limit takes seconds")?;
            retime(RetimeConfig::limit(seconds_to_duration(seconds)?))
        }
        "fps" => {
            let rate: f64 = require()?.parse().context("fps takes a frame rate")?;
            if rate <= 0.0 {
                bail!("fps must be positive");
            }
            retime(RetimeConfig {
                frame_duration: Some(seconds_to_duration(1.0 / rate)?),
                ..RetimeConfig::default()
            })
        }
        "loop" => {
            let count = require()?.parse().context("loop takes a count (0 = once, -1 = forever)")?;
            Box::new(GifLoopTask::new(Arc::clone(context), count, max_bytes))
        }
        "url" => Box::new(UrlTask::new(require()?)),
        "fetch" => {
            let urls = require()?.split(',').map(|url| url.trim().to_string()).collect();
            Box::new(FetchTask::new(Arc::clone(context), urls))
        }
        other => bail!("Unknown effect: {}", other),
    };
    Ok(task)
}

fn parse_list<T: std::str::FromStr>(argument: &str) -> Result<Vec<T>> {
    argument
        .split(',')
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| anyhow!("'{}' is not a valid number", value))
        })
        .collect()
}

fn parse_stretch(argument: &str) -> Result<StretchSize> {
    if let Some((width, height)) = argument.split_once('x') {
        if let (Ok(width), Ok(height)) = (width.parse::<u32>(), height.parse::<u32>()) {
            return Ok(StretchSize::Absolute(width, height));
        }
        let width: f64 = width.parse().context("stretch width")?;
        let height: f64 = height.parse().context("stretch height")?;
        return Ok(StretchSize::Relative(width, height));
    }
    let factor: f64 = argument.parse().context("stretch takes WxH or a factor")?;
    Ok(StretchSize::Relative(factor, factor))
}

fn seconds_to_duration(seconds: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(seconds).map_err(|_| anyhow!("'{}' is not a valid number of seconds", seconds))
}
