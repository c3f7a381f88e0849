use thiserror::Error;

/// The error taxonomy SPEC_FULL §7 defines. Transport errors are normalized into these
/// at the adapter boundary; nothing upstream matches on raw HTTP status codes.
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("transient provider error: {0}")]
    TransientProviderError(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("auth error: {0}")]
    AuthError(String),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("budget exhausted")]
    BudgetExhausted,

    #[error("deadline exceeded for priority {0}")]
    DeadlineExceeded(String),

    #[error("persistence error for ticker {ticker}: {message}")]
    PersistenceError { ticker: String, message: String },

    #[error("configuration error: {0}")]
    ConfigurationError(String),

    #[error("no credential available for provider {0}")]
    NoCredentialAvailable(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
