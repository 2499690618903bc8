use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};
use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::media::decorators::{speed, Reversed};
use crate::media::frame::{AudioChunk, Frame};
use crate::media::reader::{BoxedReader, FrameIter, MediaReader};
use crate::source::ByteSource;

/// One decoding session over an in-memory audio file
struct Decoding {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    time_base: Option<TimeBase>,
}

impl Decoding {
    fn open(bytes: Arc<[u8]>, extension: &str) -> std::result::Result<Self, SymphoniaError> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

        let mut hint = Hint::new();
        if !extension.is_empty() {
            hint.with_extension(extension);
        }

        let probed = symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(SymphoniaError::Unsupported("no decodable audio track"))?;
        let track_id = track.id;
        let time_base = track.codec_params.time_base;
        let decoder = symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

        Ok(Self {
            format,
            decoder,
            track_id,
            time_base,
        })
    }

    /// Seek near `target`, returning where decoding actually resumes
    fn seek(&mut self, target: Duration) -> Option<Duration> {
        let time = Time::new(target.as_secs(), f64::from(target.subsec_nanos()) / 1e9);
        let seeked = self
            .format
            .seek(
                SeekMode::Coarse,
                SeekTo::Time {
                    time,
                    track_id: Some(self.track_id),
                },
            )
            .ok()?;
        self.decoder.reset();

        let resumed = self.time_base?.calc_time(seeked.actual_ts);
        Some(Duration::from_secs(resumed.seconds) + Duration::from_secs_f64(resumed.frac))
    }

    fn next_chunk(&mut self) -> std::result::Result<Option<AudioChunk>, SymphoniaError> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(None)
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(e),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    buffer.copy_interleaved_ref(decoded);
                    return Ok(Some(AudioChunk::new(
                        buffer.samples().to_vec(),
                        spec.channels.count() as u16,
                        spec.rate,
                    )));
                }
                Err(SymphoniaError::DecodeError(reason)) => {
                    debug!("Skipping undecodable audio packet: {}", reason);
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// General-purpose audio backend built on symphonia
///
/// Opening decodes the whole stream once to learn the chunk layout.
/// Random access seeks close to the target and decodes forward from there;
/// reversal has to buffer every decoded sample.
pub struct SymphoniaReader {
    name: String,
    bytes: Option<Arc<[u8]>>,
    extension: String,
    channels: u16,
    sample_rate: u32,
    bitrate: u32,
    starts: Vec<Duration>,
    durations: Vec<Duration>,
}

impl SymphoniaReader {
    pub fn open(source: &ByteSource) -> Result<Self> {
        let bytes: Arc<[u8]> = Arc::from(source.read_all()?);
        let extension = source.format();
        let unreadable = |e: SymphoniaError| {
            debug!("Audio decode of {} failed: {}", source.name(), e);
            EngineError::unreadable(source.name())
        };

        let mut decoding = Decoding::open(bytes.clone(), &extension).map_err(unreadable)?;
        let mut starts = Vec::new();
        let mut durations = Vec::new();
        let mut channels = 0;
        let mut sample_rate = 0;
        let mut elapsed = Duration::ZERO;

        while let Some(chunk) = decoding.next_chunk().map_err(unreadable)? {
            channels = chunk.channels;
            sample_rate = chunk.sample_rate;
            starts.push(elapsed);
            durations.push(chunk.duration());
            elapsed += chunk.duration();
        }

        let seconds = elapsed.as_secs_f64();
        let bitrate = if seconds > 0.0 {
            (bytes.len() as f64 * 8.0 / seconds) as u32
        } else {
            0
        };

        info!(
            "Audio {}: {} channels @ {} Hz, {:.2}s in {} chunks",
            source.name(),
            channels,
            sample_rate,
            seconds,
            starts.len()
        );

        Ok(Self {
            name: source.name().to_string(),
            bytes: Some(bytes),
            extension,
            channels,
            sample_rate,
            bitrate,
            starts,
            durations,
        })
    }

    fn session(&self) -> Result<Decoding> {
        let bytes = self
            .bytes
            .clone()
            .ok_or_else(|| EngineError::unsupported("reader is closed"))?;
        Decoding::open(bytes, &self.extension).map_err(|e| self.decode_error(e))
    }

    fn decode_error(&self, e: SymphoniaError) -> EngineError {
        debug!("Audio decode of {} failed: {}", self.name, e);
        EngineError::unreadable(self.name.as_str())
    }

    fn frame(&self, index: usize, chunk: AudioChunk) -> Frame<AudioChunk> {
        Frame::new(chunk, self.durations[index], self.starts[index])
    }
}

impl MediaReader<AudioChunk> for SymphoniaReader {
    fn frame_count(&self) -> usize {
        self.starts.len()
    }

    fn frame_rate(&self) -> f64 {
        let seconds = self.duration().as_secs_f64();
        if seconds == 0.0 {
            return 0.0;
        }
        self.starts.len() as f64 / seconds
    }

    fn duration(&self) -> Duration {
        match (self.starts.last(), self.durations.last()) {
            (Some(start), Some(length)) => *start + *length,
            _ => Duration::ZERO,
        }
    }

    fn frame_duration(&self) -> Duration {
        match self.frame_count() {
            0 => Duration::ZERO,
            count => self.duration() / count as u32,
        }
    }

    fn width(&self) -> u32 {
        0
    }

    fn height(&self) -> u32 {
        0
    }

    fn loop_count(&self) -> i32 {
        -1
    }

    fn audio_channels(&self) -> u16 {
        self.channels
    }

    fn audio_sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn audio_bitrate(&self) -> u32 {
        self.bitrate
    }

    fn read_frame_at(&mut self, timestamp: Duration) -> Result<Frame<AudioChunk>> {
        if self.starts.is_empty() {
            return Err(EngineError::unsupported("cannot read a frame from empty media"));
        }
        let target = self
            .starts
            .partition_point(|start| *start < timestamp)
            .min(self.starts.len() - 1);

        let mut session = self.session()?;
        let mut index = match session.seek(self.starts[target]) {
            Some(resumed) => self.starts.partition_point(|start| *start < resumed),
            None => 0,
        };
        if index > target {
            session = self.session()?;
            index = 0;
        }

        while let Some(chunk) = session.next_chunk().map_err(|e| self.decode_error(e))? {
            if index >= target {
                return Ok(self.frame(target, chunk));
            }
            index += 1;
        }
        Err(EngineError::unreadable(self.name.as_str()))
    }

    fn frames(&mut self) -> Result<FrameIter<'_, AudioChunk>> {
        let mut session = self.session()?;
        let this = &*self;
        let mut index = 0;
        Ok(Box::new(std::iter::from_fn(move || {
            if index >= this.starts.len() {
                return None;
            }
            let next = match session.next_chunk() {
                Ok(Some(chunk)) => Ok(this.frame(index, chunk)),
                Ok(None) => Err(EngineError::unreadable(this.name.as_str())),
                Err(e) => Err(this.decode_error(e)),
            };
            index = if next.is_ok() { index + 1 } else { this.starts.len() };
            Some(next)
        })))
    }

    fn reversed(self: Box<Self>) -> Result<BoxedReader<AudioChunk>> {
        Ok(Reversed::wrap(self))
    }

    fn change_speed(self: Box<Self>, speed: f64) -> Result<BoxedReader<AudioChunk>> {
        speed::change(self, speed)
    }

    fn close(&mut self) -> Result<()> {
        self.bytes = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::backends::wav::test_support::encode_wav;

    fn ramp_source() -> ByteSource {
        let samples: Vec<i16> = (0..8_000).map(|i| (i % 1000) as i16).collect();
        ByteSource::from_bytes("ramp.wav", encode_wav(&samples, 1, 8_000))
    }

    #[test]
    fn test_probe_structure() {
        let reader = SymphoniaReader::open(&ramp_source()).unwrap();
        assert!(reader.frame_count() > 0);
        assert_eq!(reader.audio_channels(), 1);
        assert_eq!(reader.audio_sample_rate(), 8_000);
        assert_eq!(reader.duration(), Duration::from_secs(1));
        assert_eq!((reader.width(), reader.height()), (0, 0));
    }

    #[test]
    fn test_sequential_pass_covers_all_samples() {
        let mut reader = SymphoniaReader::open(&ramp_source()).unwrap();
        let total: usize = reader
            .frames()
            .unwrap()
            .map(|f| f.unwrap().content.samples.len())
            .sum();
        assert_eq!(total, 8_000);
    }

    #[test]
    fn test_random_access_matches_sequence() {
        let mut reader = SymphoniaReader::open(&ramp_source()).unwrap();
        let frames: Vec<_> = reader.frames().unwrap().map(|f| f.unwrap()).collect();
        let last = frames.last().unwrap().clone();

        let frame = reader.read_frame(last.timestamp).unwrap();
        assert_eq!(frame.timestamp, last.timestamp);
        assert_eq!(frame.content.samples, last.content.samples);
    }

    #[test]
    fn test_garbage_is_unreadable() {
        let source = ByteSource::from_bytes("noise.mp3", vec![7u8; 64]);
        assert!(matches!(
            SymphoniaReader::open(&source),
            Err(EngineError::UnreadableInput { .. })
        ));
    }
}
