mod common;

use image::codecs::gif::Repeat;

use common::gif_bytes;
use media_engine::container::gif::{loop_count, set_loop_count};
use media_engine::EngineError;

const NETSCAPE: &[u8] = b"NETSCAPE2.0";

fn netscape_blocks(bytes: &[u8]) -> Vec<usize> {
    bytes
        .windows(NETSCAPE.len())
        .enumerate()
        .filter(|(_, window)| *window == NETSCAPE)
        .map(|(offset, _)| offset)
        .collect()
}

#[test]
fn test_loop_forever_inserts_one_extension() {
    let input = gif_bytes(&[100, 100], None);
    assert!(netscape_blocks(&input).is_empty());

    let output = set_loop_count(&input, -1).unwrap();
    let blocks = netscape_blocks(&output);
    assert_eq!(blocks.len(), 1);

    // sub-block id, then a zero 16-bit count for "forever"
    let data = blocks[0] + NETSCAPE.len();
    assert_eq!(&output[data..data + 5], &[0x03, 0x01, 0x00, 0x00, 0x00]);
    assert_eq!(output.len(), input.len() + 19);
    assert_eq!(loop_count(&output).unwrap(), 0);
}

#[test]
fn test_play_once_removes_extension() {
    let input = gif_bytes(&[100, 100], Some(Repeat::Infinite));
    assert_eq!(netscape_blocks(&input).len(), 1);

    let output = set_loop_count(&input, 0).unwrap();
    assert!(netscape_blocks(&output).is_empty());
    assert_eq!(output.len(), input.len() - 19);
    assert_eq!(loop_count(&output).unwrap(), -1);
}

#[test]
fn test_rewriting_twice_leaves_one_extension() {
    let input = gif_bytes(&[100, 100, 100], Some(Repeat::Finite(2)));
    let once = set_loop_count(&input, 5).unwrap();
    let twice = set_loop_count(&once, 7).unwrap();

    assert_eq!(netscape_blocks(&twice).len(), 1);
    assert_eq!(loop_count(&twice).unwrap(), 7);
    assert_eq!(twice.len(), once.len());
}

#[test]
fn test_pixels_survive_the_rewrite() {
    let input = gif_bytes(&[100, 200], None);
    let output = set_loop_count(&input, 3).unwrap();

    let before = image::load_from_memory(&input).unwrap().to_rgba8();
    let after = image::load_from_memory(&output).unwrap().to_rgba8();
    assert_eq!(before, after);
}

#[test]
fn test_rejects_bad_input() {
    assert!(matches!(
        set_loop_count(b"PNG not a gif", -1),
        Err(EngineError::MalformedContainer { .. })
    ));
    assert!(matches!(
        set_loop_count(&gif_bytes(&[100], None), 70_000),
        Err(EngineError::UnsupportedOperation { .. })
    ));

    let mut truncated = gif_bytes(&[100, 100], None);
    truncated.truncate(truncated.len() - 6);
    assert!(matches!(
        set_loop_count(&truncated, -1),
        Err(EngineError::MalformedContainer { .. })
    ));
}
