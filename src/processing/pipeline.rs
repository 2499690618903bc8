use tracing::{debug, info};

use crate::error::Result;
use crate::media::frame::{Frame, FrameContent};
use crate::media::reader::{first_frame, MediaReader, ReaderSequence};
use crate::processing::processor::FrameProcessor;

/// Run one decode/process pass, handing every transformed frame to `sink`
///
/// The processor's constant data is computed once from the first frame,
/// then every frame (the first included) is transformed in timestamp
/// order. Any failure aborts the pass. Returns the number of frames emitted.
///
/// # Arguments
///
/// * `reader` - Frame source, already wrapped in whatever decorators apply
/// * `processor` - Transform to run on each frame
/// * `format` - Token of the container the frames will be written as
/// * `sink` - Receives each output frame
pub fn process<E, F>(
    reader: &mut dyn MediaReader<E>,
    processor: &FrameProcessor<E>,
    format: &str,
    mut sink: F,
) -> Result<usize>
where
    E: FrameContent,
    F: FnMut(Frame<E>) -> Result<()>,
{
    let first = match first_frame(reader)? {
        Some(frame) => frame,
        None => {
            debug!("Reader has no frames, nothing to process");
            return Ok(0);
        }
    };

    let transform = processor.prepare(&first, &mut ReaderSequence::new(&mut *reader), format)?;
    drop(first);

    info!(
        "Processing {} frames with '{}' into {}",
        reader.frame_count(),
        processor.name(),
        format
    );

    let mut emitted = 0;
    for frame in reader.frames()? {
        let frame = frame?;
        let (duration, timestamp) = (frame.duration, frame.timestamp);
        sink(Frame::new(transform(frame)?, duration, timestamp))?;
        emitted += 1;
    }

    debug!("Emitted {} frames", emitted);
    Ok(emitted)
}
