use thiserror::Error;

pub type Result<T> = std::result::Result<T, StudioError>;

#[derive(Debug, Error)]
pub enum StudioError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("generation provider error: {0}")]
    Provider(String),

    #[error("no {0} returned by the model")]
    EmptyResult(&'static str),

    #[error("session not found: {0}")]
    SessionNotFound(uuid::Uuid),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("network request failed: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("internal error: {0}")]
    Other(String),
}

impl StudioError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Errors raised before any provider call was issued.
    #[cfg(test)]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }
}

impl From<anyhow::Error> for StudioError {
    fn from(value: anyhow::Error) -> Self {
        Self::Other(value.to_string())
    }
}
