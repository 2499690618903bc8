use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Main configuration for the media engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound for any encoded output, in bytes
    pub max_output_bytes: u64,

    /// Upper bound for a single remote download, in bytes
    pub max_fetch_bytes: u64,

    /// Resolution used when rasterizing PDF pages
    pub pdf_dpi: u32,

    /// Duration of the synthetic frame produced for still images
    pub static_frame_duration_ms: u64,

    /// Worker threads for parallel pixel scans
    pub processing_threads: usize,

    /// External tool locations
    pub tools: ToolsConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_output_bytes: 8 * 1024 * 1024,
            max_fetch_bytes: 25 * 1024 * 1024,
            pdf_dpi: 72,
            static_frame_duration_ms: 1,
            processing_threads: num_cpus::get(),
            tools: ToolsConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;

        let config: EngineConfig = toml::from_str(&content).map_err(|_| ConfigError::ParseFailed {
            path: path.display().to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidValue {
            key: "config".to_string(),
            value: e.to_string(),
        })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_output_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_output_bytes".to_string(),
                value: self.max_output_bytes.to_string(),
            }
            .into());
        }

        if self.max_fetch_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_fetch_bytes".to_string(),
                value: self.max_fetch_bytes.to_string(),
            }
            .into());
        }

        if self.pdf_dpi == 0 {
            return Err(ConfigError::InvalidValue {
                key: "pdf_dpi".to_string(),
                value: self.pdf_dpi.to_string(),
            }
            .into());
        }

        if self.static_frame_duration_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "static_frame_duration_ms".to_string(),
                value: self.static_frame_duration_ms.to_string(),
            }
            .into());
        }

        if self.processing_threads == 0 {
            return Err(ConfigError::InvalidValue {
                key: "processing_threads".to_string(),
                value: self.processing_threads.to_string(),
            }
            .into());
        }

        Ok(())
    }

    pub fn static_frame_duration(&self) -> Duration {
        Duration::from_millis(self.static_frame_duration_ms)
    }
}

/// Paths to the external programs the engine shells out to
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub pdftoppm: PathBuf,
    pub pdfinfo: PathBuf,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            pdftoppm: PathBuf::from("pdftoppm"),
            pdfinfo: PathBuf::from("pdfinfo"),
        }
    }
}

impl ToolsConfig {
    /// Check whether a tool can be started at all
    pub fn is_available(program: &Path) -> bool {
        std::process::Command::new(program)
            .arg("-version")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .is_ok()
    }
}
