use std::io::Cursor;
use std::time::Duration;

use tracing::debug;

use crate::error::{EngineError, Result};
use crate::media::backends::MemoryReader;
use crate::media::frame::AudioChunk;
use crate::source::ByteSource;

/// Sample frames per chunk handed out by the reader
const CHUNK_FRAMES: usize = 1024;

/// Decode a WAV file fully with hound and serve it from memory
pub fn open(source: &ByteSource) -> Result<MemoryReader<AudioChunk>> {
    let bytes = source.read_all()?;
    let unreadable = |e: hound::Error| {
        debug!("WAV decode of {} failed: {}", source.name(), e);
        EngineError::unreadable(source.name())
    };

    let reader = hound::WavReader::new(Cursor::new(bytes)).map_err(unreadable)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(unreadable)?,
        hound::SampleFormat::Int => {
            let bits = spec.bits_per_sample;
            reader
                .into_samples::<i32>()
                .map(|sample| sample.map(|s| int_to_float(s, bits)))
                .collect::<std::result::Result<_, _>>()
                .map_err(unreadable)?
        }
    };

    let channels = spec.channels.max(1);
    let contents: Vec<(AudioChunk, Duration)> = samples
        .chunks(CHUNK_FRAMES * channels as usize)
        .map(|chunk| {
            let chunk = AudioChunk::new(chunk.to_vec(), channels, spec.sample_rate);
            let duration = chunk.duration();
            (chunk, duration)
        })
        .collect();

    let bitrate = spec.sample_rate * u32::from(spec.bits_per_sample) * u32::from(channels);
    debug!(
        "Decoded WAV {}: {} chunks, {} Hz, {} channels",
        source.name(),
        contents.len(),
        spec.sample_rate,
        channels
    );

    Ok(MemoryReader::new(contents, 0, 0, -1).with_audio(channels, spec.sample_rate, bitrate))
}

/// Scale an integer PCM sample into [-1.0, 1.0]
fn int_to_float(sample: i32, bits: u16) -> f32 {
    let max = (1i64 << (bits.clamp(1, 32) - 1)) as f32;
    sample as f32 / max
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::Cursor;

    /// 16-bit PCM WAV bytes
    pub fn encode_wav(samples: &[i16], channels: u16, sample_rate: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for sample in samples {
                writer.write_sample(*sample).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::media::reader::MediaReader;

    #[test]
    fn test_stereo_wav_chunks() {
        let samples: Vec<i16> = (0..4_000).map(|i| i as i16).collect();
        let source = ByteSource::from_bytes("tone.wav", encode_wav(&samples, 2, 1_000));
        let mut reader = open(&source).unwrap();

        assert_eq!(reader.audio_channels(), 2);
        assert_eq!(reader.audio_sample_rate(), 1_000);
        assert_eq!(reader.audio_bitrate(), 32_000);
        assert_eq!(reader.frame_count(), 2);
        assert_eq!(reader.duration(), Duration::from_secs(2));

        let first = reader.read_frame(Duration::ZERO).unwrap();
        assert_eq!(first.content.len(), 1024);
        assert!((first.content.samples[1] - 1.0 / 32768.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_reversal_reverses_per_channel_frame() {
        let source = ByteSource::from_bytes("lr.wav", encode_wav(&[1, 2, 3, 4], 2, 100));
        let reader: crate::media::reader::BoxedReader<AudioChunk> = Box::new(open(&source).unwrap());
        let mut reversed = reader.reversed().unwrap();
        let frame = reversed.frames().unwrap().next().unwrap().unwrap();
        let expected: Vec<f32> = [3, 4, 1, 2].iter().map(|s| *s as f32 / 32768.0).collect();
        assert_eq!(frame.content.samples, expected);
    }

    #[test]
    fn test_int_to_float_range() {
        assert_eq!(int_to_float(-32768, 16), -1.0);
        assert_eq!(int_to_float(0, 24), 0.0);
    }

    #[test]
    fn test_not_a_wav() {
        let source = ByteSource::from_bytes("x.wav", b"RIFF....WAVEjunk".to_vec());
        assert!(matches!(open(&source), Err(EngineError::UnreadableInput { .. })));
    }
}
