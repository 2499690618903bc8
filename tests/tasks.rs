mod common;

use std::sync::Arc;

use image::codecs::gif::Repeat;
use image::RgbaImage;

use common::*;
use media_engine::config::EngineConfig;
use media_engine::effects::{CropProcessor, FlipAxis, FlipProcessor, Rect, StretchProcessor, StretchSize};
use media_engine::processing::{FrameProcessor, OutputFormat, ProcessingConfig, RetimeConfig};
use media_engine::source::ByteSource;
use media_engine::task::{chain, run_task, FileTask, GifLoopTask, ProcessingTask, TaskContext};
use media_engine::{EngineError, MediaReader};

fn context() -> Arc<TaskContext> {
    TaskContext::new(EngineConfig::default()).unwrap()
}

fn simple(context: &Arc<TaskContext>, name: &str, processor: FrameProcessor<RgbaImage>) -> ProcessingTask {
    let config = ProcessingConfig::simple(name, processor, OutputFormat::Input);
    ProcessingTask::new(Arc::clone(context), config, 1 << 20)
}

fn flip(context: &Arc<TaskContext>) -> ProcessingTask {
    simple(context, "flip", FrameProcessor::new(FlipProcessor::new(FlipAxis::Horizontal)))
}

fn crop(context: &Arc<TaskContext>) -> ProcessingTask {
    simple(context, "crop", FrameProcessor::new(CropProcessor::new(Rect::new(3, 2, 9, 7))))
}

fn stretch(context: &Arc<TaskContext>) -> ProcessingTask {
    simple(context, "stretch", FrameProcessor::new(StretchProcessor::new(StretchSize::Relative(2.0, 0.5))))
}

#[test]
fn test_merged_pass_matches_separate_passes() {
    let context = context();
    let input = ByteSource::from_bytes("photo.png", gradient_png(20, 14));

    let merged = chain(Box::new(flip(&context)), Box::new(crop(&context))).unwrap();
    let mut merged = chain(merged, Box::new(stretch(&context))).unwrap();
    let single = merged.run(vec![input.clone()]).unwrap();
    assert_eq!(single.len(), 1);

    let mut first = flip(&context);
    let intermediate = first.run(vec![input]).unwrap();
    let mut second = crop(&context);
    let intermediate = second.run(intermediate).unwrap();
    let mut third = stretch(&context);
    let separate = third.run(intermediate).unwrap();

    let a = decode_png(&single[0].read_all().unwrap());
    let b = decode_png(&separate[0].read_all().unwrap());
    assert_eq!(a.dimensions(), (18, 4));
    assert_eq!(a, b);

    merged.cleanup().unwrap();
    for task in [&mut first as &mut dyn FileTask, &mut second, &mut third] {
        task.cleanup().unwrap();
    }
}

#[test]
fn test_merged_processing_keeps_later_name() {
    let context = context();
    let merged = chain(Box::new(flip(&context)), Box::new(crop(&context))).unwrap();
    assert_eq!(merged.name(), "crop");
}

#[test]
fn test_retime_then_effect_runs_sequentially() {
    let context = context();
    let config = ProcessingConfig::retime("reverse", RetimeConfig::reverse());
    let reverse = ProcessingTask::new(Arc::clone(&context), config, 1 << 20);

    let mut task = chain(Box::new(reverse), Box::new(flip(&context))).unwrap();
    assert_eq!(task.name(), "reverse+flip");

    let input = ByteSource::from_bytes("anim.gif", gif_bytes(&[100, 200, 300], Some(Repeat::Infinite)));
    let outputs = task.run(vec![input]).unwrap();
    assert_eq!(outputs[0].name(), "flip.gif");

    let mut reader = context.images.open(&outputs[0]).unwrap();
    assert_eq!(tags(reader.as_mut()), vec![80, 40, 0]);
    assert_eq!(reader.duration().as_millis(), 600);
    task.cleanup().unwrap();
}

#[test]
fn test_loop_task_after_processing() {
    let context = context();
    let loop_once = GifLoopTask::new(Arc::clone(&context), 0, 1 << 20);
    let mut task = chain(Box::new(flip(&context)), Box::new(loop_once)).unwrap();

    let input = ByteSource::from_bytes("anim.gif", gif_bytes(&[100, 100], Some(Repeat::Infinite)));
    let outputs = task.run(vec![input]).unwrap();
    let reader = context.images.open(&outputs[0]).unwrap();
    assert_eq!(reader.loop_count(), -1);
    task.cleanup().unwrap();
}

#[test]
fn test_output_ceiling_is_enforced() {
    let context = context();
    let config = ProcessingConfig::simple(
        "flip",
        FrameProcessor::new(FlipProcessor::new(FlipAxis::Vertical)),
        OutputFormat::Input,
    );
    let mut task = ProcessingTask::new(context, config, 40);
    let input = ByteSource::from_bytes("photo.png", gradient_png(64, 64));
    assert!(matches!(task.run(vec![input]), Err(EngineError::TooLarge { limit: 40 })));
    task.cleanup().unwrap();
}

#[tokio::test]
async fn test_run_task_end_to_end() {
    let context = context();
    let task = flip(&context);
    let input = ByteSource::from_bytes("photo.png", gradient_png(10, 6));

    let (outputs, mut task) = run_task(Box::new(task), vec![input], 1 << 20).await.unwrap();
    let path = outputs[0].path().unwrap().to_path_buf();
    assert!(path.exists());

    let image = decode_png(&outputs[0].read_all().unwrap());
    assert_eq!(image.dimensions(), (10, 6));
    task.cleanup().unwrap();
    assert!(!path.exists());
}

#[tokio::test]
async fn test_unreadable_input_fails_the_task() {
    let task = flip(&context());
    let input = ByteSource::from_bytes("broken.png", vec![0x89, b'P', b'N', b'G', 0, 0]);
    let result = run_task(Box::new(task), vec![input], 1 << 20).await;
    assert!(matches!(result, Err(EngineError::UnreadableInput { .. })));
}
