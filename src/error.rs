//! Gateway Error Types
//!
//! Every failure the gateway reports to a caller is a [`GatewayError`].
//! Each variant has a stable machine-readable kind used on the wire.

/// Error types surfaced by admission, the token registry and the backend
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    /// Token is unknown to the registry
    #[error("Token not found: {token}")]
    TokenNotFound { token: String },

    /// Token was rejected during admission
    #[error("Invalid token: {token}")]
    InvalidToken { token: String },

    /// Token has no quota left in the current window
    #[error("API limit exceeded for token {token}")]
    QuotaExceeded { token: String },

    /// Requested language has no formatter
    #[error("Language not supported: {language}")]
    UnsupportedLanguage { language: String },

    /// Input was empty after trimming whitespace
    #[error("Input is empty")]
    EmptyInput,

    /// Email already has an account
    #[error("Email already used: {email}")]
    EmailAlreadyUsed { email: String },

    /// Backend did not answer within the configured timeout
    #[error("Generation backend timed out after {timeout_ms}ms")]
    BackendTimeout { timeout_ms: u64 },

    /// Backend could not be reached or returned an error status
    #[error("Generation backend unavailable: {reason}")]
    BackendUnavailable { reason: String },

    /// Token store could not be written; the mutation was rolled back
    #[error("Token store write failed: {reason}")]
    Persistence { reason: String },
}

impl GatewayError {
    /// Machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::TokenNotFound { .. } => "TokenNotFoundError",
            GatewayError::InvalidToken { .. } => "InvalidTokenError",
            GatewayError::QuotaExceeded { .. } => "QuotaExceededError",
            GatewayError::UnsupportedLanguage { .. } => "UnsupportedLanguageError",
            GatewayError::EmptyInput => "EmptyInputError",
            GatewayError::EmailAlreadyUsed { .. } => "EmailAlreadyUsedError",
            GatewayError::BackendTimeout { .. } => "BackendTimeoutError",
            GatewayError::BackendUnavailable { .. } => "BackendUnavailableError",
            GatewayError::Persistence { .. } => "PersistenceError",
        }
    }

    /// Token the error refers to, if any
    pub fn token(&self) -> Option<&str> {
        match self {
            GatewayError::TokenNotFound { token }
            | GatewayError::InvalidToken { token }
            | GatewayError::QuotaExceeded { token } => Some(token),
            _ => None,
        }
    }

    /// Email the error refers to, if any
    pub fn email(&self) -> Option<&str> {
        match self {
            GatewayError::EmailAlreadyUsed { email } => Some(email),
            _ => None,
        }
    }

    /// Language the error refers to, if any
    pub fn language(&self) -> Option<&str> {
        match self {
            GatewayError::UnsupportedLanguage { language } => Some(language),
            _ => None,
        }
    }
}
