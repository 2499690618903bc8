use thiserror::Error;

/// Main error type for the media engine
///
/// Every variant carries a message that is safe to show to the person who
/// requested the effect. Internal causes are logged where they occur and
/// never embedded here.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Unreadable input: {name}")]
    UnreadableInput { name: String },

    #[error("Unsupported operation: {reason}")]
    UnsupportedOperation { reason: String },

    #[error("Output too large: limit is {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("Malformed container: {reason}")]
    MalformedContainer { reason: String },

    #[error("Task produced no output: {task}")]
    EmptyOutput { task: String },

    #[error("Encoding failed: {reason}")]
    Encode { reason: String },

    #[error("Download failed: {url}")]
    Fetch { url: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    pub fn unreadable<S: Into<String>>(name: S) -> Self {
        Self::UnreadableInput { name: name.into() }
    }

    pub fn unsupported<S: Into<String>>(reason: S) -> Self {
        Self::UnsupportedOperation {
            reason: reason.into(),
        }
    }

    pub fn malformed<S: Into<String>>(reason: S) -> Self {
        Self::MalformedContainer {
            reason: reason.into(),
        }
    }

    pub fn encode<S: Into<String>>(reason: S) -> Self {
        Self::Encode {
            reason: reason.into(),
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::UnreadableInput { name } => {
                format!("Could not read '{}'. The file may be corrupt or in an unsupported format.", name)
            }
            Self::TooLarge { limit } => {
                format!("The result would be larger than {} KB. Try a shorter or smaller input.", limit / 1024)
            }
            Self::MalformedContainer { .. } => {
                "The file is not a valid GIF.".to_string()
            }
            Self::EmptyOutput { .. } => "Nothing was produced. Please try again.".to_string(),
            Self::Io(_) => "An internal error occurred.".to_string(),
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_hides_io_cause() {
        let err = EngineError::from(std::io::Error::new(
            std::io::ErrorKind::Other,
            "/tmp/secret/path missing",
        ));
        assert!(!err.user_message().contains("secret"));
    }

    #[test]
    fn test_too_large_message_in_kilobytes() {
        let err = EngineError::TooLarge { limit: 8 * 1024 * 1024 };
        assert!(err.user_message().contains("8192 KB"));
    }
}
