//! Errors raised while decoding a tab-separated record body.

use thiserror::Error;

/// Result type alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Wire-level decoding failures.
///
/// These are protocol failures: a body that cannot be decoded is never
/// coerced into an empty record list.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The content-type does not end in one of the known encoding markers.
    #[error("unknown content-type: {0:?}")]
    UnknownContentType(String),

    /// A non-empty line carried no tab between key and value.
    #[error("line {line}: missing tab separator")]
    MissingSeparator { line: usize },

    /// A field advertised as base64 failed to decode.
    #[error("line {line}: invalid base64 field: {source}")]
    InvalidBase64 {
        line: usize,
        #[source]
        source: base64::DecodeError,
    },
}
