use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::time::Duration;

use image::RgbaImage;
use serde::Deserialize;
use tempfile::TempPath;
use tracing::{debug, info, warn};

use crate::config::ToolsConfig;
use crate::error::{EngineError, Result};
use crate::media::decorators::{speed, Reversed};
use crate::media::frame::Frame;
use crate::media::reader::{BoxedReader, FrameIter, MediaReader};
use crate::source::ByteSource;

#[derive(Debug, Deserialize)]
struct Probe {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    frames: Vec<ProbeFrame>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFrame {
    best_effort_timestamp_time: Option<String>,
    duration_time: Option<String>,
    pkt_duration_time: Option<String>,
}

fn parse_seconds(value: Option<&String>) -> Option<f64> {
    value
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
}

fn parse_rate(value: &str) -> Option<f64> {
    let (numer, denom) = value.split_once('/').unwrap_or((value, "1"));
    let numer: f64 = numer.parse().ok()?;
    let denom: f64 = denom.parse().ok()?;
    if denom == 0.0 || numer <= 0.0 {
        return None;
    }
    Some(numer / denom)
}

/// Per-frame timing relative to the first frame
#[derive(Debug, Clone, PartialEq)]
struct Timeline {
    origin: f64,
    starts: Vec<Duration>,
    durations: Vec<Duration>,
}

impl Timeline {
    fn from_probe(frames: &[ProbeFrame], frame_rate: f64) -> Self {
        let fallback = if frame_rate > 0.0 { 1.0 / frame_rate } else { 0.04 };
        let raw: Vec<f64> = frames
            .iter()
            .scan(0.0, |previous, frame| {
                let at = parse_seconds(frame.best_effort_timestamp_time.as_ref()).unwrap_or(*previous);
                *previous = at;
                Some(at)
            })
            .collect();
        let origin = raw.first().copied().unwrap_or(0.0);

        let mut starts = Vec::with_capacity(raw.len());
        let mut durations = Vec::with_capacity(raw.len());
        for (index, at) in raw.iter().enumerate() {
            let own = parse_seconds(frames[index].duration_time.as_ref())
                .or_else(|| parse_seconds(frames[index].pkt_duration_time.as_ref()));
            let length = match raw.get(index + 1) {
                Some(next) if *next > *at => next - at,
                _ => own.unwrap_or(fallback),
            };
            starts.push(Duration::from_secs_f64((at - origin).max(0.0)));
            durations.push(Duration::from_secs_f64(length.max(0.0)));
        }

        Self {
            origin,
            starts,
            durations,
        }
    }

    /// First frame starting at or after `timestamp`, or the last frame
    fn index_at_or_after(&self, timestamp: Duration) -> usize {
        let index = self.starts.partition_point(|start| *start < timestamp);
        index.min(self.starts.len().saturating_sub(1))
    }

    fn duration(&self) -> Duration {
        match (self.starts.last(), self.durations.last()) {
            (Some(start), Some(length)) => *start + *length,
            _ => Duration::ZERO,
        }
    }
}

/// General-purpose video backend driving external `ffmpeg` and `ffprobe`
///
/// Opening probes every frame once to learn the exact frame count and
/// timing. Random access seeks and decodes a single frame; the sequential
/// pass streams raw RGBA frames out of one ffmpeg process.
pub struct FfmpegReader {
    name: String,
    path: PathBuf,
    input: Option<TempPath>,
    ffmpeg: PathBuf,
    width: u32,
    height: u32,
    frame_rate: f64,
    timeline: Timeline,
}

impl FfmpegReader {
    pub fn open(source: &ByteSource, tools: &ToolsConfig) -> Result<Self> {
        let (path, input) = source.materialize()?;
        let probe = probe(&tools.ffprobe, &path).ok_or_else(|| EngineError::unreadable(source.name()))?;

        let stream = probe
            .streams
            .first()
            .ok_or_else(|| EngineError::unreadable(source.name()))?;
        let width = stream.width.unwrap_or(0);
        let height = stream.height.unwrap_or(0);
        if width == 0 || height == 0 {
            return Err(EngineError::unreadable(source.name()));
        }
        let frame_rate = stream
            .avg_frame_rate
            .as_deref()
            .and_then(parse_rate)
            .unwrap_or(0.0);
        let timeline = Timeline::from_probe(&probe.frames, frame_rate);

        info!(
            "Video {}: {}x{} @ {:.2}fps, {} frames",
            source.name(),
            width,
            height,
            frame_rate,
            timeline.starts.len()
        );

        Ok(Self {
            name: source.name().to_string(),
            path,
            input,
            ffmpeg: tools.ffmpeg.clone(),
            width,
            height,
            frame_rate,
            timeline,
        })
    }

    fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    fn to_image(&self, bytes: Vec<u8>) -> Result<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, bytes)
            .ok_or_else(|| EngineError::unreadable(self.name.as_str()))
    }

    fn decoder_command(&self) -> Command {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-v", "error", "-nostdin"]);
        cmd
    }

    fn frame(&self, index: usize, image: RgbaImage) -> Frame<RgbaImage> {
        Frame::new(image, self.timeline.durations[index], self.timeline.starts[index])
    }
}

fn probe(ffprobe: &Path, path: &Path) -> Option<Probe> {
    let output = Command::new(ffprobe)
        .args(["-v", "error", "-select_streams", "v:0"])
        .args(["-show_entries", "stream=width,height,avg_frame_rate"])
        .args([
            "-show_entries",
            "frame=best_effort_timestamp_time,duration_time,pkt_duration_time",
        ])
        .args(["-of", "json"])
        .arg(path)
        .stderr(Stdio::null())
        .output()
        .map_err(|e| warn!("Could not start ffprobe: {}", e))
        .ok()?;

    if !output.status.success() {
        warn!("ffprobe failed for {}", path.display());
        return None;
    }

    serde_json::from_slice(&output.stdout)
        .map_err(|e| warn!("Unexpected ffprobe output for {}: {}", path.display(), e))
        .ok()
}

impl MediaReader<RgbaImage> for FfmpegReader {
    fn frame_count(&self) -> usize {
        self.timeline.starts.len()
    }

    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn duration(&self) -> Duration {
        self.timeline.duration()
    }

    fn frame_duration(&self) -> Duration {
        match self.frame_count() {
            0 => Duration::ZERO,
            count => self.duration() / count as u32,
        }
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn loop_count(&self) -> i32 {
        0
    }

    fn read_frame_at(&mut self, timestamp: Duration) -> Result<Frame<RgbaImage>> {
        if self.frame_count() == 0 {
            return Err(EngineError::unsupported("cannot read a frame from empty media"));
        }
        let index = self.timeline.index_at_or_after(timestamp);
        let seek = self.timeline.origin + self.timeline.starts[index].as_secs_f64();

        let output = self
            .decoder_command()
            .arg("-ss")
            .arg(format!("{:.6}", seek))
            .arg("-i")
            .arg(&self.path)
            .args(["-frames:v", "1", "-f", "rawvideo", "-pix_fmt", "rgba", "-"])
            .stderr(Stdio::null())
            .output()?;

        if !output.status.success() || output.stdout.len() < self.frame_bytes() {
            warn!("ffmpeg could not decode {} at {:.3}s", self.name, seek);
            return Err(EngineError::unreadable(self.name.as_str()));
        }

        let mut bytes = output.stdout;
        bytes.truncate(self.frame_bytes());
        let image = self.to_image(bytes)?;
        Ok(self.frame(index, image))
    }

    fn frames(&mut self) -> Result<FrameIter<'_, RgbaImage>> {
        let mut child = self
            .decoder_command()
            .arg("-i")
            .arg(&self.path)
            .args(["-vsync", "0", "-f", "rawvideo", "-pix_fmt", "rgba", "-"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::unreadable(self.name.as_str()))?;

        debug!("Streaming {} frames of {}", self.frame_count(), self.name);
        Ok(Box::new(RawFrames {
            reader: &*self,
            child,
            stdout,
            index: 0,
        }))
    }

    fn reversed(self: Box<Self>) -> Result<BoxedReader<RgbaImage>> {
        Ok(Reversed::wrap(self))
    }

    fn change_speed(self: Box<Self>, speed: f64) -> Result<BoxedReader<RgbaImage>> {
        speed::change(self, speed)
    }

    fn close(&mut self) -> Result<()> {
        if let Some(input) = self.input.take() {
            input.close()?;
        }
        Ok(())
    }
}

/// Sequential pass over one ffmpeg decode process
struct RawFrames<'a> {
    reader: &'a FfmpegReader,
    child: Child,
    stdout: ChildStdout,
    index: usize,
}

impl Iterator for RawFrames<'_> {
    type Item = Result<Frame<RgbaImage>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.reader.frame_count() {
            return None;
        }

        let mut bytes = vec![0u8; self.reader.frame_bytes()];
        if let Err(e) = self.stdout.read_exact(&mut bytes) {
            warn!(
                "ffmpeg stream of {} ended at frame {}: {}",
                self.reader.name, self.index, e
            );
            self.index = self.reader.frame_count();
            return Some(Err(EngineError::unreadable(self.reader.name.as_str())));
        }

        let index = self.index;
        self.index += 1;
        Some(
            self.reader
                .to_image(bytes)
                .map(|image| self.reader.frame(index, image)),
        )
    }
}

impl Drop for RawFrames<'_> {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
