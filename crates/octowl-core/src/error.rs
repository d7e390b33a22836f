use thiserror::Error;

/// Core error types for octowl dataset handling
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid Part-10 file: {message}")]
    InvalidPart10 { message: String },

    #[error("Unsupported transfer syntax: {0}")]
    UnsupportedTransferSyntax(String),

    #[error("Unknown value representation '{0}'")]
    UnknownVr(String),

    #[error("Invalid value for {tag}: {message}")]
    InvalidValue { tag: String, message: String },
}

impl CoreError {
    /// Create a new InvalidPart10 error
    pub fn invalid_part10(message: impl Into<String>) -> Self {
        Self::InvalidPart10 {
            message: message.into(),
        }
    }

    /// Create a new UnsupportedTransferSyntax error
    pub fn unsupported_transfer_syntax(uid: impl Into<String>) -> Self {
        Self::UnsupportedTransferSyntax(uid.into())
    }

    /// Create a new InvalidValue error
    pub fn invalid_value(tag: impl std::fmt::Display, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            tag: tag.to_string(),
            message: message.into(),
        }
    }

    /// Check if the error came from the file contents rather than the filesystem
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidPart10 { .. }
                | Self::UnsupportedTransferSyntax(_)
                | Self::UnknownVr(_)
                | Self::InvalidValue { .. }
        )
    }

    /// Get error category for logging/monitoring
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Io(_) => ErrorCategory::Io,
            Self::InvalidPart10 { .. } | Self::UnknownVr(_) | Self::InvalidValue { .. } => {
                ErrorCategory::Format
            }
            Self::UnsupportedTransferSyntax(_) => ErrorCategory::Unsupported,
        }
    }
}

/// Error categories for monitoring and classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Io,
    Format,
    Unsupported,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io => write!(f, "io"),
            Self::Format => write!(f, "format"),
            Self::Unsupported => write!(f, "unsupported"),
        }
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
