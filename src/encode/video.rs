use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use image::RgbaImage;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::encode::{enforce_limit, FrameWriter, TimestampOrder};
use crate::error::{EngineError, Result};
use crate::media::frame::Frame;

/// Smallest possible MP4: `ftyp` plus a `moov` with one track
const CONTAINER_FLOOR: u64 = 256;
/// Sample size entry plus the NAL length prefix of every frame
const PER_FRAME_FLOOR: u64 = 8;

/// Size no MP4 holding `frames` frames can come in under
fn size_floor(frames: u64) -> u64 {
    CONTAINER_FLOOR + PER_FRAME_FLOOR * frames
}

/// H.264 MP4 output through an external ffmpeg
///
/// Frames are staged as PNG files in a scratch directory together with a
/// concat list carrying each frame's own duration, then encoded in one
/// ffmpeg run on `finish`. Staging stops as soon as the frame count alone
/// rules out fitting the ceiling, and ffmpeg itself is capped with `-fs`
/// just past the ceiling so an oversized encode is cut short. The scratch
/// directory is removed when the writer is dropped.
pub struct VideoWriter {
    path: PathBuf,
    limit: u64,
    ffmpeg: PathBuf,
    workdir: TempDir,
    staged: Vec<(PathBuf, Duration)>,
    staged_bytes: u64,
    order: TimestampOrder,
}

impl VideoWriter {
    pub fn create(path: &Path, limit: u64, ffmpeg: &Path) -> Result<Self> {
        let workdir = tempfile::Builder::new().prefix("media_engine_mp4_").tempdir()?;
        debug!("Staging MP4 frames in {:?}", workdir.path());

        Ok(Self {
            path: path.to_path_buf(),
            limit,
            ffmpeg: ffmpeg.to_path_buf(),
            workdir,
            staged: Vec::new(),
            staged_bytes: 0,
            order: TimestampOrder::default(),
        })
    }

    fn write_frame_list(&self) -> Result<PathBuf> {
        let list_path = self.workdir.path().join("frame_list.txt");
        let mut file = BufWriter::new(File::create(&list_path)?);

        for (frame_path, duration) in &self.staged {
            writeln!(file, "file '{}'", frame_path.display())?;
            writeln!(file, "duration {:.6}", duration.as_secs_f64())?;
        }

        // The concat demuxer ignores the duration of the final entry
        if let Some((last, _)) = self.staged.last() {
            writeln!(file, "file '{}'", last.display())?;
        }

        file.flush()?;
        Ok(list_path)
    }
}

impl FrameWriter<RgbaImage> for VideoWriter {
    fn write_frame(&mut self, frame: &Frame<RgbaImage>) -> Result<()> {
        self.order.check(frame.timestamp)?;
        if size_floor(self.staged.len() as u64 + 1) > self.limit {
            debug!("{} frames cannot fit in {} bytes", self.staged.len() + 1, self.limit);
            return Err(EngineError::TooLarge { limit: self.limit });
        }

        let frame_path = self.workdir.path().join(format!("frame_{:06}.png", self.staged.len()));
        frame.content.save(&frame_path).map_err(|e| {
            warn!("Failed to stage frame {:?}: {}", frame_path, e);
            EngineError::encode("could not stage a video frame")
        })?;

        self.staged_bytes += std::fs::metadata(&frame_path)?.len();
        self.staged.push((frame_path, frame.duration));
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<u64> {
        if self.staged.is_empty() {
            return Ok(0);
        }
        let list_path = self.write_frame_list()?;

        let output = Command::new(&self.ffmpeg)
            .arg("-f")
            .arg("concat")
            .arg("-safe")
            .arg("0")
            .arg("-i")
            .arg(&list_path)
            .arg("-vf")
            .arg("pad=ceil(iw/2)*2:ceil(ih/2)*2")
            .arg("-c:v")
            .arg("libx264")
            .arg("-pix_fmt")
            .arg("yuv420p")
            .arg("-vsync")
            .arg("vfr")
            .arg("-movflags")
            .arg("+faststart")
            .arg("-fs")
            .arg(self.limit.saturating_add(1).to_string())
            .arg("-y")
            .arg(&self.path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                warn!("Failed to start {:?}: {}", self.ffmpeg, e);
                EngineError::encode("video encoder is not available")
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("FFmpeg failed: {}", stderr);
            // Hitting -fs can make the faststart rewrite fail
            let oversized = std::fs::metadata(&self.path).map_or(false, |m| m.len() > self.limit);
            let _ = std::fs::remove_file(&self.path);
            if oversized {
                return Err(EngineError::TooLarge { limit: self.limit });
            }
            return Err(EngineError::encode("video encoding failed"));
        }

        let size = enforce_limit(&self.path, self.limit)?;
        info!(
            "Wrote MP4 {:?}: {} frames ({} staged bytes), {} bytes",
            self.path,
            self.staged.len(),
            self.staged_bytes,
            size
        );
        Ok(size)
    }
}
