use thiserror::Error;

/**
    Errors produced while reading or writing an XML document.

    Schema mismatches are not errors at this level, they are
    collected as [`crate::ValidationIssues`] by the decoder.
*/
#[derive(Debug, Clone, Error)]
pub enum XmlError {
    // ── Reading ────────────────────────────────────────────────────────
    #[error("malformed XML: {0}")]
    Malformed(String),
    #[error("document has no root element")]
    NoRoot,
    #[error("element <{0}> is never closed")]
    Unclosed(String),
    #[error("content found outside the root element")]
    ContentOutsideRoot,
    #[error("document is not valid UTF-8")]
    InvalidUtf8,

    // ── Writing ────────────────────────────────────────────────────────
    #[error("failed to write XML: {0}")]
    Write(String),
}

pub type XmlResult<T> = Result<T, XmlError>;
