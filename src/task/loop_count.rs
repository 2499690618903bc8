use std::sync::Arc;

use tracing::info;

use crate::container::gif;
use crate::error::{EngineError, Result};
use crate::source::{self, ByteSource};
use crate::task::{FileTask, TaskContext, TaskKind};

/// Rewrite the loop behavior of GIF inputs without re-encoding them
///
/// `loop_count` is 0 to play once, -1 to loop forever, N to repeat N times.
pub struct GifLoopTask {
    context: Arc<TaskContext>,
    loop_count: i32,
    max_bytes: u64,
}

impl GifLoopTask {
    pub fn new(context: Arc<TaskContext>, loop_count: i32, max_bytes: u64) -> Self {
        Self {
            context,
            loop_count,
            max_bytes,
        }
    }

    fn rewrite(&self, input: &ByteSource) -> Result<Vec<u8>> {
        if input.format() != "gif" {
            return Err(EngineError::unsupported(format!(
                "{} is not a GIF, its loop count cannot be changed",
                input.name()
            )));
        }
        if input.size_hint().is_some_and(|size| size > self.max_bytes + 19) {
            return Err(EngineError::TooLarge { limit: self.max_bytes });
        }

        let bytes = input.read_all()?;
        let output = gif::set_loop_count(&bytes, self.loop_count)?;
        if output.len() as u64 > self.max_bytes {
            return Err(EngineError::TooLarge { limit: self.max_bytes });
        }
        Ok(output)
    }
}

impl FileTask for GifLoopTask {
    fn name(&self) -> &str {
        "loop"
    }

    fn requires_input(&self) -> bool {
        true
    }

    fn run(&mut self, inputs: Vec<ByteSource>) -> Result<Vec<ByteSource>> {
        let inputs = source::resolve_blocking(inputs, self.context.config.max_fetch_bytes)?;
        info!("Setting loop count {} on {} inputs", self.loop_count, inputs.len());

        inputs
            .iter()
            .enumerate()
            .map(|(index, input)| {
                let bytes = self.rewrite(input)?;
                let name = match index {
                    0 => "loop.gif".to_string(),
                    n => format!("loop_{}.gif", n),
                };
                Ok(ByteSource::from_bytes(name, bytes))
            })
            .collect()
    }

    fn cleanup(&mut self) -> Result<()> {
        Ok(())
    }

    fn into_kind(self: Box<Self>) -> TaskKind {
        TaskKind::Other(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::container::gif::test_support::{count_netscape, tiny_gif};

    fn task(loop_count: i32, max_bytes: u64) -> GifLoopTask {
        let context = TaskContext::new(EngineConfig::default()).unwrap();
        GifLoopTask::new(context, loop_count, max_bytes)
    }

    #[test]
    fn test_sets_infinite_loop() {
        let mut task = task(-1, 1 << 20);
        let outputs = task.run(vec![ByteSource::from_bytes("a.gif", tiny_gif())]).unwrap();

        assert_eq!(outputs[0].name(), "loop.gif");
        let bytes = outputs[0].read_all().unwrap();
        assert_eq!(count_netscape(&bytes), 1);
        assert_eq!(gif::loop_count(&bytes).unwrap(), 0);
    }

    #[test]
    fn test_rejects_other_formats() {
        let mut task = task(3, 1 << 20);
        let input = ByteSource::from_bytes("a.png", vec![0x89, b'P', b'N', b'G']);
        assert!(matches!(
            task.run(vec![input]),
            Err(EngineError::UnsupportedOperation { .. })
        ));
    }

    #[test]
    fn test_output_ceiling() {
        let mut task = task(-1, 8);
        let input = ByteSource::from_bytes("a.gif", tiny_gif());
        assert!(matches!(task.run(vec![input]), Err(EngineError::TooLarge { limit: 8 })));
    }
}
