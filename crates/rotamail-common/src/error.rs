//! Error types for Rotamail

use thiserror::Error;

/// Main error type for Rotamail
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("SMTP error: {0}")]
    Smtp(String),

    #[error("OAuth error: {0}")]
    OAuth(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No usable sending account")]
    NoUsableAccount,

    #[error("Signature mismatch")]
    SignatureMismatch,

    #[error("Invalid redirect target: {0}")]
    InvalidTarget(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for Rotamail
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Config(_) => 500,
            Error::Database(_) => 500,
            Error::Smtp(_) => 500,
            Error::OAuth(_) => 502,
            Error::Validation(_) => 422,
            Error::NotFound(_) => 404,
            Error::NoUsableAccount => 503,
            Error::SignatureMismatch => 400,
            Error::InvalidTarget(_) => 400,
            Error::Queue(_) => 500,
            Error::Internal(_) => 500,
            Error::Other(_) => 500,
        }
    }

    /// Returns the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "CONFIG_ERROR",
            Error::Database(_) => "DATABASE_ERROR",
            Error::Smtp(_) => "SMTP_ERROR",
            Error::OAuth(_) => "OAUTH_ERROR",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::NotFound(_) => "NOT_FOUND",
            Error::NoUsableAccount => "NO_USABLE_ACCOUNT",
            Error::SignatureMismatch => "SIGNATURE_MISMATCH",
            Error::InvalidTarget(_) => "INVALID_TARGET",
            Error::Queue(_) => "QUEUE_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
            Error::Other(_) => "INTERNAL_ERROR",
        }
    }
}
