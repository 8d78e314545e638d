/// Errors from parsing or constructing foundation types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TypeError {
    /// A hex string could not be decoded.
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// Decoded bytes had the wrong length.
    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// A change key was malformed (missing `I` prefix or bad length).
    #[error("invalid change key: {0}")]
    InvalidChangeKey(String),

    /// A patch-set reference name did not follow the expected layout.
    #[error("invalid patch-set ref: {0}")]
    InvalidPatchSetRef(String),
}
