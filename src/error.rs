use thiserror::Error;

/// Błąd wywołania API platformy (odczyt lub zapis).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("permission denied")]
    PermissionDenied,
    #[error("not found")]
    NotFound,
    #[error("rate limited")]
    RateLimited,
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
}

pub type PlatformResult<T> = std::result::Result<T, PlatformError>;
