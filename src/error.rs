use thiserror::Error;

use crate::providers::ProviderKind;

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Config(String),

    #[error("{} API key is not configured.", .0.key_label())]
    ApiKeyMissing(ProviderKind),

    #[error("Source text is empty.")]
    EmptySourceText,

    #[error("{0}")]
    Validation(String),

    /// Non-2xx response surfaced by the shared HTTP helper before any
    /// provider-specific enrichment.
    #[error("{message}")]
    Http {
        status: u16,
        body: String,
        message: String,
    },

    #[error("{message}")]
    ProviderRequestFailed {
        provider: ProviderKind,
        status: u16,
        message: String,
    },

    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("Request was cancelled.")]
    Cancelled,

    #[error("storage error: {0}")]
    Storage(String),
}

impl ServiceError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, ServiceError::ApiKeyMissing(_) | ServiceError::Config(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ServiceError::EmptySourceText | ServiceError::Validation(_)
        )
    }

    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ServiceError::Http { .. }
                | ServiceError::ProviderRequestFailed { .. }
                | ServiceError::Transport(_)
                | ServiceError::Cancelled
        )
    }
}
