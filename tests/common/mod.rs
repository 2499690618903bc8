#![allow(dead_code)]

use std::io::Cursor;
use std::time::Duration;

use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame as ImageFrame, ImageFormat, Rgba, RgbaImage};

use media_engine::media::backends::MemoryReader;
use media_engine::media::MediaReader;

/// Solid image whose red channel identifies it
pub fn tagged(tag: u8, width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba([tag, 0, 0, 255]))
}

pub fn tag_of(image: &RgbaImage) -> u8 {
    image.get_pixel(0, 0)[0]
}

/// In-memory animation with one tagged frame per duration
pub fn tagged_reader(durations_ms: &[u64]) -> MemoryReader<RgbaImage> {
    let contents = durations_ms
        .iter()
        .enumerate()
        .map(|(i, ms)| (tagged(i as u8, 4, 4), Duration::from_millis(*ms)))
        .collect();
    MemoryReader::new(contents, 4, 4, 0)
}

pub fn tags(reader: &mut dyn MediaReader<RgbaImage>) -> Vec<u8> {
    reader
        .frames()
        .unwrap()
        .map(|frame| tag_of(&frame.unwrap().content))
        .collect()
}

/// Animated GIF with solid frames tagged 0, 40, 80...
pub fn gif_bytes(delays_ms: &[u32], repeat: Option<Repeat>) -> Vec<u8> {
    let mut bytes = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut bytes);
        if let Some(repeat) = repeat {
            encoder.set_repeat(repeat).unwrap();
        }
        for (i, delay) in delays_ms.iter().enumerate() {
            let frame = ImageFrame::from_parts(
                tagged((i * 40) as u8, 8, 8),
                0,
                0,
                Delay::from_numer_denom_ms(*delay, 1),
            );
            encoder.encode_frame(frame).unwrap();
        }
    }
    bytes
}

/// PNG with a gradient so geometric effects are visible in the pixels
pub fn gradient_png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 255 / width.max(1)) as u8, (y * 255 / height.max(1)) as u8, 128, 255])
    });
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png).unwrap();
    bytes.into_inner()
}

pub fn decode_png(bytes: &[u8]) -> RgbaImage {
    image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .unwrap()
        .to_rgba8()
}
