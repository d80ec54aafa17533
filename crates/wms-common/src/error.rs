//! Error types for the WMS registry.

use thiserror::Error;

/// Result type alias using WmsError.
pub type WmsResult<T> = Result<T, WmsError>;

/// Primary error type for WMS synchronization.
#[derive(Debug, Error)]
pub enum WmsError {
    // === Remote server errors ===
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Service exception{}: {message}", exception_code(.code))]
    Service {
        code: Option<String>,
        message: String,
    },

    // === Preview errors ===
    #[error("No usable GetMap format advertised")]
    FormatUnavailable,

    #[error("Invalid image: {0}")]
    Validation(String),

    // === Local errors ===
    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl WmsError {
    /// Short label for log fields and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            WmsError::Transport(_) => "transport",
            WmsError::Protocol(_) => "protocol",
            WmsError::Service { .. } => "service",
            WmsError::FormatUnavailable => "format_unavailable",
            WmsError::Validation(_) => "validation",
            WmsError::InvalidParameter { .. } => "invalid_parameter",
            WmsError::Persistence(_) => "persistence",
            WmsError::Storage(_) => "storage",
        }
    }

    /// True for the failures that mean "the remote capabilities could not be
    /// obtained": transport, malformed response, or a service exception.
    pub fn is_capabilities_unavailable(&self) -> bool {
        matches!(
            self,
            WmsError::Transport(_) | WmsError::Protocol(_) | WmsError::Service { .. }
        )
    }

    pub fn invalid(param: impl Into<String>, message: impl Into<String>) -> Self {
        WmsError::InvalidParameter {
            param: param.into(),
            message: message.into(),
        }
    }
}

fn exception_code(code: &Option<String>) -> String {
    code.as_deref()
        .map(|c| format!(" [{}]", c))
        .unwrap_or_default()
}

impl From<std::io::Error> for WmsError {
    fn from(err: std::io::Error) -> Self {
        WmsError::Storage(err.to_string())
    }
}
