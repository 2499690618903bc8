use std::io::Cursor;
use std::time::Duration;

use image::codecs::webp::WebPDecoder;
use image::{AnimationDecoder, ImageFormat, RgbaImage};
use tracing::{debug, warn};

use crate::container::webp::{self as riff, WebpInfo};
use crate::error::{EngineError, Result};
use crate::media::backends::{MemoryReader, StaticImageReader};
use crate::media::reader::BoxedReader;
use crate::source::ByteSource;

/// Open a WebP file, animated or still
///
/// Animated files are decoded in full and served from memory. Timing comes
/// from the file's own `ANMF` chunks; if those are missing or disagree with
/// the decoder, the decoder's delays are used. Anything that cannot be
/// decoded as an animation falls back to a single still frame.
pub fn open(source: &ByteSource, static_frame_duration: Duration) -> Result<BoxedReader<RgbaImage>> {
    let bytes = source.read_all()?;
    let info = riff::scan(&bytes).map_err(|e| {
        debug!("WebP scan of {} failed: {}", source.name(), e);
        EngineError::unreadable(source.name())
    })?;

    if info.animated {
        match decode_animation(&bytes, &info) {
            Ok(reader) => return Ok(Box::new(reader)),
            Err(e) => warn!(
                "Animated decode of {} failed, using first frame only: {}",
                source.name(),
                e
            ),
        }
    }

    let still = image::load_from_memory_with_format(&bytes, ImageFormat::WebP).map_err(|e| {
        debug!("WebP decode of {} failed: {}", source.name(), e);
        EngineError::unreadable(source.name())
    })?;
    let mut image = still.to_rgba8();
    force_opacity_if_blank(&mut image);
    Ok(Box::new(StaticImageReader::from_image(image, static_frame_duration)))
}

fn decode_animation(bytes: &[u8], info: &WebpInfo) -> image::ImageResult<MemoryReader<RgbaImage>> {
    let decoder = WebPDecoder::new(Cursor::new(bytes))?;
    let frames = decoder.into_frames().collect_frames()?;
    let use_container_timing = info.frame_durations.len() == frames.len();

    let mut width = info.canvas_width;
    let mut height = info.canvas_height;
    let contents: Vec<(RgbaImage, Duration)> = frames
        .into_iter()
        .enumerate()
        .map(|(index, frame)| {
            let duration = if use_container_timing {
                info.frame_durations[index]
            } else {
                let (numer, denom) = frame.delay().numer_denom_ms();
                Duration::from_millis(u64::from(numer / denom.max(1)))
            };
            let mut image = frame.into_buffer();
            force_opacity_if_blank(&mut image);
            width = width.max(image.width());
            height = height.max(image.height());
            (image, duration)
        })
        .collect();

    debug!("Decoded animated WebP with {} frames", contents.len());
    Ok(MemoryReader::new(contents, width, height, info.loop_count()))
}

/// Make a frame opaque when it is fully transparent but carries color
///
/// Some encoders emit such frames; left alone they punch holes through
/// whatever they are composited over.
pub fn force_opacity_if_blank(image: &mut RgbaImage) {
    let all_transparent = image.pixels().all(|p| p[3] == 0);
    let has_color = image.pixels().any(|p| p[0] != 0 || p[1] != 0 || p[2] != 0);
    if all_transparent && has_color {
        for pixel in image.pixels_mut() {
            pixel[3] = 255;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::webp::test_support::*;
    use crate::media::reader::MediaReader;
    use image::Rgba;

    #[test]
    fn test_blank_colored_frame_made_opaque() {
        let mut image = RgbaImage::from_pixel(3, 3, Rgba([200, 10, 10, 0]));
        force_opacity_if_blank(&mut image);
        assert!(image.pixels().all(|p| p[3] == 255));
    }

    #[test]
    fn test_black_transparent_frame_untouched() {
        let mut image = RgbaImage::from_pixel(3, 3, Rgba([0, 0, 0, 0]));
        force_opacity_if_blank(&mut image);
        assert!(image.pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn test_partially_transparent_frame_untouched() {
        let mut image = RgbaImage::from_pixel(2, 1, Rgba([9, 9, 9, 0]));
        image.put_pixel(1, 0, Rgba([9, 9, 9, 128]));
        force_opacity_if_blank(&mut image);
        assert_eq!(image.get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn test_undecodable_webp_is_unreadable() {
        let bytes = riff(&[chunk(b"VP8 ", &[1, 2, 3, 4])]);
        let source = ByteSource::from_bytes("bad.webp", bytes);
        let result = open(&source, Duration::from_millis(1));
        assert!(matches!(result, Err(EngineError::UnreadableInput { .. })));
    }

    #[test]
    fn test_not_riff_is_unreadable() {
        let source = ByteSource::from_bytes("bad.webp", b"GIF89a".to_vec());
        match open(&source, Duration::from_millis(1)) {
            Err(EngineError::UnreadableInput { name }) => assert_eq!(name, "bad.webp"),
            Err(other) => panic!("unexpected error {other:?}"),
            Ok(reader) => panic!("opened {} frames", reader.frame_count()),
        }
    }
}
