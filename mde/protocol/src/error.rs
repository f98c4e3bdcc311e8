use thiserror::Error;

use mde_xml::{ValidationIssues, XmlError};

/**
    Errors raised while decoding enrollment messages or building responses.
*/
#[derive(Debug, Clone, Error)]
pub enum ProtocolError {
    // ── Envelope ───────────────────────────────────────────────────────
    #[error(transparent)]
    Xml(#[from] XmlError),
    #[error("invalid message: {0}")]
    Validation(#[from] ValidationIssues),
    #[error("action {found} is not handled by this endpoint (expected {expected})")]
    ActionMismatch {
        expected: &'static str,
        found: String,
    },

    // ── Payload ────────────────────────────────────────────────────────
    #[error("invalid base64 in {0}")]
    InvalidBase64(&'static str),

    // ── Provisioning profile ──────────────────────────────────────────
    #[error("invalid provisioning tree at {path}: {reason}")]
    InvalidProfile { path: String, reason: String },
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
