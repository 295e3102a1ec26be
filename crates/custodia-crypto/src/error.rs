use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error("password verification failed")]
    PasswordMismatch,

    #[error("malformed token")]
    MalformedToken,

    #[error("token signature verification failed")]
    BadSignature,

    #[error("token has expired")]
    TokenExpired,

    #[error("invalid base64: {0}")]
    Base64(String),

    #[error("invalid json: {0}")]
    Json(String),
}
