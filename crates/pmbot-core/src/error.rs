//! Error kinds shared by every component that talks to the outside world.

use thiserror::Error;

/// Coarse classification callers use to pick retry, report, or degrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BotErrorKind {
    TransientIo,
    InvalidInput,
    UpstreamUnavailable,
    DataIntegrity,
}

impl BotErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TransientIo => "transient_io",
            Self::InvalidInput => "invalid_input",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::DataIntegrity => "data_integrity",
        }
    }
}

#[derive(Debug, Error)]
pub enum BotError {
    #[error("transient i/o failure during {operation}: {message}")]
    TransientIo { operation: String, message: String },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{service} unavailable: {message}")]
    UpstreamUnavailable { service: String, message: String },
    #[error("data integrity failure in {source_name}: {message}")]
    DataIntegrity {
        source_name: String,
        message: String,
    },
}

impl BotError {
    pub fn transient(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TransientIo {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn unavailable(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn integrity(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DataIntegrity {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> BotErrorKind {
        match self {
            Self::TransientIo { .. } => BotErrorKind::TransientIo,
            Self::InvalidInput(_) => BotErrorKind::InvalidInput,
            Self::UpstreamUnavailable { .. } => BotErrorKind::UpstreamUnavailable,
            Self::DataIntegrity { .. } => BotErrorKind::DataIntegrity,
        }
    }

    /// Only transient network failures are worth an immediate retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), BotErrorKind::TransientIo)
    }
}
