//! # Byte Sources
//!
//! Opaque handles to input and output bytes. Readers borrow a [`ByteSource`]
//! for the duration of their construction and never take ownership of it.

use std::fs::File;
use std::io::{BufReader, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempPath;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};

/// A handle to bytes living in memory, on disk, or behind a URL
#[derive(Debug, Clone)]
pub enum ByteSource {
    Memory { name: String, bytes: Arc<[u8]> },
    File { name: String, path: PathBuf },
    Remote { name: String, url: String },
}

impl ByteSource {
    pub fn from_bytes<S: Into<String>>(name: S, bytes: Vec<u8>) -> Self {
        Self::Memory {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn from_path<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file")
            .to_string();
        Self::File { name, path }
    }

    pub fn remote<S: Into<String>>(url: S) -> Self {
        let url = url.into();
        let name = name_from_url(&url);
        Self::Remote { name, url }
    }

    /// File name (or last URL path segment) of this source
    pub fn name(&self) -> &str {
        match self {
            Self::Memory { name, .. } | Self::File { name, .. } | Self::Remote { name, .. } => name,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File { path, .. } => Some(path),
            _ => None,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Remote { url, .. } => Some(url),
            _ => None,
        }
    }

    /// Known length in bytes, if it can be determined without reading
    pub fn size_hint(&self) -> Option<u64> {
        match self {
            Self::Memory { bytes, .. } => Some(bytes.len() as u64),
            Self::File { path, .. } => std::fs::metadata(path).ok().map(|m| m.len()),
            Self::Remote { .. } => None,
        }
    }

    /// Open a fresh byte stream positioned at the start
    pub fn open(&self) -> Result<Box<dyn Read + Send>> {
        match self {
            Self::Memory { bytes, .. } => Ok(Box::new(Cursor::new(Arc::clone(bytes)))),
            Self::File { path, .. } => Ok(Box::new(BufReader::new(File::open(path)?))),
            Self::Remote { url, .. } => Err(EngineError::unsupported(format!(
                "remote source {} must be fetched before it can be read",
                url
            ))),
        }
    }

    pub fn read_all(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(self.size_hint().unwrap_or(0) as usize);
        self.open()?.read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    /// Lowercase format token derived from the name, falling back to content sniffing
    pub fn format(&self) -> String {
        if let Some(ext) = extension_of(self.name()) {
            return ext;
        }

        let mut head = [0u8; 16];
        let read = self
            .open()
            .ok()
            .and_then(|mut reader| read_head(&mut reader, &mut head).ok())
            .unwrap_or(0);
        sniff_format(&head[..read]).unwrap_or_default().to_string()
    }

    /// Expose the bytes as a filesystem path, writing a temp file if needed
    ///
    /// The returned `TempPath` (if any) owns the file; dropping or closing it
    /// deletes the file.
    pub fn materialize(&self) -> Result<(PathBuf, Option<TempPath>)> {
        if let Self::File { path, .. } = self {
            return Ok((path.clone(), None));
        }

        let suffix = format!(".{}", self.format());
        let mut file = tempfile::Builder::new()
            .prefix("media_engine_in_")
            .suffix(&suffix)
            .tempfile()?;
        std::io::copy(&mut self.open()?, &mut file)?;
        file.flush()?;

        let temp_path = file.into_temp_path();
        debug!("Materialized {} to {:?}", self.name(), temp_path);
        Ok((temp_path.to_path_buf(), Some(temp_path)))
    }
}

fn read_head(reader: &mut dyn Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

fn extension_of(name: &str) -> Option<String> {
    let name = name.split(['?', '#']).next().unwrap_or(name);
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

fn name_from_url(url: &str) -> String {
    url.split(['?', '#'])
        .next()
        .and_then(|path| path.rsplit('/').find(|segment| !segment.is_empty()))
        .unwrap_or("download")
        .to_string()
}

/// Recognize a handful of containers from their magic bytes
pub fn sniff_format(head: &[u8]) -> Option<&'static str> {
    if head.starts_with(b"GIF8") {
        Some("gif")
    } else if head.len() >= 12 && &head[0..4] == b"RIFF" && &head[8..12] == b"WEBP" {
        Some("webp")
    } else if head.starts_with(b"%PDF") {
        Some("pdf")
    } else if head.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some("png")
    } else if head.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("jpg")
    } else if head.len() >= 12 && &head[0..4] == b"RIFF" && &head[8..12] == b"WAVE" {
        Some("wav")
    } else {
        None
    }
}

/// Download a remote source into memory, aborting once `max_bytes` is exceeded
pub async fn fetch(url: &str, max_bytes: u64) -> Result<ByteSource> {
    let fetch_error = |e: reqwest::Error| {
        warn!("Download of {} failed: {}", url, e);
        EngineError::Fetch {
            url: url.to_string(),
        }
    };

    let mut response = reqwest::get(url)
        .await
        .and_then(|r| r.error_for_status())
        .map_err(fetch_error)?;

    if let Some(length) = response.content_length() {
        if length > max_bytes {
            return Err(EngineError::TooLarge { limit: max_bytes });
        }
    }

    let mut buffer = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(fetch_error)? {
        if buffer.len() as u64 + chunk.len() as u64 > max_bytes {
            return Err(EngineError::TooLarge { limit: max_bytes });
        }
        buffer.extend_from_slice(&chunk);
    }

    info!("Downloaded {} ({} bytes)", url, buffer.len());
    Ok(ByteSource::from_bytes(name_from_url(url), buffer))
}

/// Fetch every remote source concurrently; local sources pass through untouched
///
/// Output order matches input order.
pub async fn resolve_all(sources: Vec<ByteSource>, max_bytes: u64) -> Result<Vec<ByteSource>> {
    let mut resolved: Vec<Option<ByteSource>> = Vec::with_capacity(sources.len());
    let mut downloads = JoinSet::new();

    for (index, source) in sources.into_iter().enumerate() {
        match source {
            ByteSource::Remote { url, .. } => {
                resolved.push(None);
                downloads.spawn(async move { (index, fetch(&url, max_bytes).await) });
            }
            local => resolved.push(Some(local)),
        }
    }

    while let Some(joined) = downloads.join_next().await {
        let (index, result) = joined.map_err(|e| {
            warn!("Download task panicked: {}", e);
            EngineError::Fetch {
                url: "unknown".to_string(),
            }
        })?;
        resolved[index] = Some(result?);
    }

    Ok(resolved.into_iter().flatten().collect())
}

/// Blocking counterpart of [`resolve_all`] for code running off the async executor
///
/// Inside `spawn_blocking` the surrounding runtime is reused; elsewhere a
/// throwaway current-thread runtime is started. Must not be called from an
/// async task.
pub fn resolve_blocking(sources: Vec<ByteSource>, max_bytes: u64) -> Result<Vec<ByteSource>> {
    if !sources.iter().any(|s| matches!(s, ByteSource::Remote { .. })) {
        return Ok(sources);
    }

    match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle.block_on(resolve_all(sources, max_bytes)),
        Err(_) => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(resolve_all(sources, max_bytes))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_name_is_lowercase() {
        let source = ByteSource::from_bytes("Cat.GIF", vec![1, 2, 3]);
        assert_eq!(source.format(), "gif");
    }

    #[test]
    fn test_format_from_url_ignores_query() {
        let source = ByteSource::remote("https://cdn.example.com/a/b/clip.mp4?width=300");
        assert_eq!(source.name(), "clip.mp4");
        assert_eq!(source.format(), "mp4");
    }

    #[test]
    fn test_format_sniffed_without_extension() {
        let source = ByteSource::from_bytes("upload", b"GIF89a\x01\x00\x01\x00".to_vec());
        assert_eq!(source.format(), "gif");

        let unknown = ByteSource::from_bytes("upload", vec![0, 0, 0]);
        assert_eq!(unknown.format(), "");
    }

    #[test]
    fn test_open_is_restartable() {
        let source = ByteSource::from_bytes("a.bin", vec![1, 2, 3, 4]);
        assert_eq!(source.read_all().unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(source.read_all().unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(source.size_hint(), Some(4));
    }

    #[test]
    fn test_remote_cannot_be_opened_directly() {
        let source = ByteSource::remote("https://example.com/x.gif");
        assert!(matches!(
            source.open(),
            Err(EngineError::UnsupportedOperation { .. })
        ));
    }

    #[test]
    fn test_materialize_memory_source() {
        let source = ByteSource::from_bytes("clip.mp4", vec![9; 32]);
        let (path, temp) = source.materialize().unwrap();
        assert!(temp.is_some());
        assert_eq!(std::fs::read(&path).unwrap(), vec![9; 32]);
        assert_eq!(path.extension().unwrap(), "mp4");

        drop(temp);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_resolve_all_keeps_local_sources() {
        let sources = vec![
            ByteSource::from_bytes("a.png", vec![1]),
            ByteSource::from_bytes("b.png", vec![2]),
        ];
        let resolved = resolve_all(sources, 1024).await.unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[1].name(), "b.png");
    }

    #[test]
    fn test_resolve_blocking_without_remote_sources() {
        let sources = vec![ByteSource::from_bytes("a.gif", vec![1, 2])];
        let resolved = resolve_blocking(sources, 1024).unwrap();
        assert_eq!(resolved[0].read_all().unwrap(), vec![1, 2]);
    }
}
