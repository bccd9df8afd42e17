/// Custom error type for provider operations
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Helper type for Results that use ProviderError
pub type Result<T> = std::result::Result<T, ProviderError>;
