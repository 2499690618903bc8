mod common;

use std::time::Duration;

use image::codecs::gif::Repeat;
use image::RgbaImage;

use common::*;
use media_engine::config::EngineConfig;
use media_engine::media::decorators::{self, Zipped};
use media_engine::media::{image_registry, BoxedReader, MediaReader};
use media_engine::source::ByteSource;
use media_engine::EngineError;

fn gif_reader(delays_ms: &[u32]) -> BoxedReader<RgbaImage> {
    let registry = image_registry(EngineConfig::default());
    let source = ByteSource::from_bytes("anim.gif", gif_bytes(delays_ms, Some(Repeat::Infinite)));
    registry.open(&source).unwrap()
}

#[test]
fn test_read_past_end_wraps_around() {
    let mut readers: Vec<BoxedReader<RgbaImage>> = vec![
        Box::new(tagged_reader(&[100, 200, 100])),
        gif_reader(&[100, 200, 100]),
    ];

    for reader in readers.iter_mut() {
        let duration = reader.duration();
        assert_eq!(duration, Duration::from_millis(400));
        for ms in [0u64, 150, 350] {
            let t = Duration::from_millis(ms);
            let inside = reader.read_frame(t).unwrap();
            let wrapped = reader.read_frame(t + duration).unwrap();
            let twice = reader.read_frame(t + duration * 2).unwrap();
            assert_eq!(inside.content, wrapped.content);
            assert_eq!(inside.content, twice.content);
        }
    }
}

#[test]
fn test_double_reversal_restores_order() {
    let reader: BoxedReader<RgbaImage> = Box::new(tagged_reader(&[100, 50, 70, 10]));
    let mut twice = reader.reversed().unwrap().reversed().unwrap();
    assert_eq!(tags(twice.as_mut()), vec![0, 1, 2, 3]);

    let mut gif = gif_reader(&[100, 100, 100]).reversed().unwrap().reversed().unwrap();
    assert_eq!(tags(gif.as_mut()), vec![0, 40, 80]);
}

#[test]
fn test_speed_contract() {
    let reader: BoxedReader<RgbaImage> = Box::new(tagged_reader(&[100, 100]));
    let before = &*reader as *const dyn MediaReader<RgbaImage> as *const u8;
    let same = reader.change_speed(1.0).unwrap();
    assert_eq!(before, &*same as *const dyn MediaReader<RgbaImage> as *const u8);

    assert!(matches!(
        same.change_speed(0.0),
        Err(EngineError::UnsupportedOperation { .. })
    ));

    let mut negative = gif_reader(&[100, 200, 300]).change_speed(-2.0).unwrap();
    let mut manual = gif_reader(&[100, 200, 300]).reversed().unwrap().change_speed(2.0).unwrap();
    assert_eq!(tags(negative.as_mut()), tags(manual.as_mut()));
    assert_eq!(negative.duration(), Duration::from_millis(300));
}

#[test]
fn test_limit_below_first_frame_keeps_one_frame() {
    let reader: BoxedReader<RgbaImage> = Box::new(tagged_reader(&[100, 100, 100]));
    let mut limited = decorators::limit(reader, Duration::from_millis(40)).unwrap();
    assert_eq!(limited.frame_count(), 1);
    assert_eq!(tags(limited.as_mut()), vec![0]);
}

#[test]
fn test_zip_follows_the_animated_side() {
    let registry = image_registry(EngineConfig::default());
    let still_bytes = gradient_png(4, 4);
    let still = || registry.open(&ByteSource::from_bytes("still.png", still_bytes.clone())).unwrap();
    let animated = || -> BoxedReader<RgbaImage> { Box::new(tagged_reader(&[100, 200, 100])) };

    let forward = Zipped::new(animated(), still());
    let backward = Zipped::new(still(), animated());

    for zipped in [
        (forward.frame_count(), forward.frame_rate(), forward.duration()),
        (backward.frame_count(), backward.frame_rate(), backward.duration()),
    ] {
        let reference = animated();
        assert_eq!(zipped, (reference.frame_count(), reference.frame_rate(), reference.duration()));
    }
}

#[test]
fn test_gif_loop_count_is_reported() {
    let registry = image_registry(EngineConfig::default());
    let forever = ByteSource::from_bytes("a.gif", gif_bytes(&[100, 100], Some(Repeat::Infinite)));
    let once = ByteSource::from_bytes("b.gif", gif_bytes(&[100, 100], None));
    assert_eq!(registry.open(&forever).unwrap().loop_count(), 0);
    assert_eq!(registry.open(&once).unwrap().loop_count(), -1);
}
