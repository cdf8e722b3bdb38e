//! Error taxonomy for the sync client.

use std::time::Duration;

use kt_common::CodecError;
use thiserror::Error;

/// Result type for the sync client.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the sync client.
///
/// Expected misses (404 on get/remove, 450 on cas/check) are not errors; they
/// only appear here through the strict operation variants.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection refused, reset, timed out, or otherwise failed in HTTP.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Host/port did not form a valid base URL.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// No pooled connection became available within the acquire timeout.
    #[error("connection pool exhausted after {timeout:?}")]
    PoolExhausted { timeout: Duration },

    /// Response body could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] CodecError),

    /// RPC failed; `message` is the server's `ERROR` field verbatim.
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// REST call answered with a status outside its documented set.
    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// A successful reply lacked a field the operation needs.
    #[error("response is missing field {0:?}")]
    MissingField(&'static str),

    /// A reply field did not hold the expected number.
    #[error("field {field:?} holds invalid value {value:?}")]
    InvalidField { field: &'static str, value: String },

    /// Strict lookup or removal found no record.
    #[error("record not found: {key}")]
    NotFound { key: String },

    /// Strict compare-and-swap precondition did not hold.
    #[error("compare and swap failed for {key}")]
    CasFailed { key: String },

    /// Request rejected before reaching the server.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Client configuration cannot be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}
