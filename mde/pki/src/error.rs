use thiserror::Error;

/**
    Errors raised while issuing a device identity certificate.
*/
#[derive(Debug, Clone, Error)]
pub enum IssuanceError {
    // ── Certificate request ───────────────────────────────────────────
    #[error("malformed certificate request: {0}")]
    MalformedCsr(String),
    #[error("certificate request carries no usable public key")]
    MissingPublicKey,

    // ── Subject ────────────────────────────────────────────────────────
    #[error("invalid certificate subject: {0}")]
    InvalidSubject(String),

    // ── Signing ────────────────────────────────────────────────────────
    #[error("failed to sign certificate: {0}")]
    SigningFailure(String),
}

pub type IssuanceResult<T> = Result<T, IssuanceError>;

/**
    Errors raised while loading the certificate authority identity.
*/
#[derive(Debug, Clone, Error)]
pub enum CaError {
    #[error("failed to read {path}: {reason}")]
    Io { path: String, reason: String },
    #[error("invalid CA certificate: {0}")]
    InvalidCertificate(String),
    #[error("unrecognized CA private key format")]
    InvalidKey,
    #[error("CA private key does not match the CA certificate")]
    KeyMismatch,
}

pub type CaResult<T> = Result<T, CaError>;
