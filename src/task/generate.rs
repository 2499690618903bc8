use std::sync::Arc;

use tracing::info;

use crate::error::{EngineError, Result};
use crate::source::{self, ByteSource};
use crate::task::{FileTask, TaskContext, TaskKind};

/// Generator that hands out a fixed URL as its only output
///
/// Nothing is downloaded here; whoever consumes the output fetches it.
pub struct UrlTask {
    url: String,
}

impl UrlTask {
    pub fn new<S: Into<String>>(url: S) -> Self {
        Self { url: url.into() }
    }
}

impl FileTask for UrlTask {
    fn name(&self) -> &str {
        "url"
    }

    fn requires_input(&self) -> bool {
        false
    }

    fn run(&mut self, _inputs: Vec<ByteSource>) -> Result<Vec<ByteSource>> {
        Ok(vec![ByteSource::remote(self.url.as_str())])
    }

    fn cleanup(&mut self) -> Result<()> {
        Ok(())
    }

    fn into_kind(self: Box<Self>) -> TaskKind {
        TaskKind::Other(self)
    }
}

/// Generator that downloads a list of URLs concurrently
pub struct FetchTask {
    context: Arc<TaskContext>,
    urls: Vec<String>,
}

impl FetchTask {
    pub fn new(context: Arc<TaskContext>, urls: Vec<String>) -> Self {
        Self { context, urls }
    }
}

impl FileTask for FetchTask {
    fn name(&self) -> &str {
        "fetch"
    }

    fn requires_input(&self) -> bool {
        false
    }

    fn run(&mut self, _inputs: Vec<ByteSource>) -> Result<Vec<ByteSource>> {
        if self.urls.is_empty() {
            return Err(EngineError::EmptyOutput {
                task: self.name().to_string(),
            });
        }

        info!("Fetching {} URLs", self.urls.len());
        let sources = self.urls.iter().map(ByteSource::remote).collect();
        source::resolve_blocking(sources, self.context.config.max_fetch_bytes)
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
    use crate::task::chain;
    use crate::task::test_support::Recording;

    #[test]
    fn test_url_task_ignores_input() {
        let mut task = UrlTask::new("https://cdn.example.com/x/cat.gif?v=2");
        assert!(!task.requires_input());
        let outputs = task.run(Vec::new()).unwrap();
        assert_eq!(outputs[0].name(), "cat.gif");
        assert_eq!(outputs[0].url(), Some("https://cdn.example.com/x/cat.gif?v=2"));
    }

    #[test]
    fn test_generator_cannot_follow_another_task() {
        let first = Recording::new("crop", true, Vec::new());
        let result = chain(Box::new(first), Box::new(UrlTask::new("https://example.com/a.png")));
        assert!(matches!(result, Err(EngineError::UnsupportedOperation { .. })));
    }

    #[test]
    fn test_fetch_without_urls_is_empty() {
        let context = TaskContext::new(EngineConfig::default()).unwrap();
        let mut task = FetchTask::new(context, Vec::new());
        assert!(matches!(task.run(Vec::new()), Err(EngineError::EmptyOutput { .. })));
    }
}
