//! Error types for csrfguard
//!
//! Only configuration problems are errors. Verification failures on the
//! request path are ordinary values (see [`Failure`](crate::Failure)) that
//! end up in the error handler's response.

use thiserror::Error;

/// Result type alias for configuration operations
pub type Result<T, E = ConfigError> = std::result::Result<T, E>;

/// Configuration errors.
///
/// Every variant is fatal at startup: an engine that cannot be built must
/// never be mounted in front of request handlers.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Token signing is enabled but no secret key was supplied.
    #[error("token signing is enabled but no secret key was configured")]
    MissingSecret,

    /// The secret key is too short to sign tokens safely.
    #[error("secret key must be at least {min} bytes, got {actual}")]
    SecretTooShort {
        /// Minimum accepted length
        min: usize,
        /// Length of the supplied key
        actual: usize,
    },

    /// A configured header name is not a valid HTTP header name.
    #[error("invalid header name `{0}`")]
    InvalidHeaderName(String),

    /// A header rule is not of the form `Name=value`.
    #[error("invalid header rule `{0}`, expected `Name=value` or `Name=*`")]
    InvalidHeaderRule(String),

    /// Unknown SameSite policy.
    #[error("invalid SameSite value `{0}`, expected `strict`, `lax` or `none`")]
    InvalidSameSite(String),

    /// The token name is empty.
    #[error("token name must not be empty")]
    EmptyTokenName,

    /// The body buffer is zero bytes, so no body token could ever be found.
    #[error("post body buffer must be greater than zero")]
    ZeroBodyBuffer,

    /// Environment variable deserialization failed.
    #[error("configuration error: {0}")]
    Env(#[from] envy::Error),
}
