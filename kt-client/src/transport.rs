//! # Transport Dispatcher
//!
//! Purpose: Issue exactly one request per call on a pooled handle, in one of
//! two shapes:
//!
//! - **RPC**: `POST /rpc/<procedure>` with a codec-encoded record list; the
//!   reply is decoded using its own content-type.
//! - **REST**: `GET`/`PUT`/`DELETE /<escaped key>` with the raw value as
//!   body; the reply body is passed through untouched.
//!
//! The handle is released as soon as the response body has been read, so no
//! caller holds a connection across round trips.

use bytes::Bytes;
use kt_common::{codec, KvRecord};
use percent_encoding::{percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::Method;
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::pool::ConnectionPool;

/// Key bytes kept literal in a REST path. `/` is escaped so a key is always
/// a single path segment.
const KEY_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Fixed RPC procedures understood by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Procedure {
    Status,
    Clear,
    Vacuum,
    Set,
    GetBulk,
    SetBulk,
    RemoveBulk,
    MatchPrefix,
    Cas,
    Check,
}

impl Procedure {
    /// Endpoint path of the procedure.
    pub const fn path(self) -> &'static str {
        match self {
            Procedure::Status => "/rpc/status",
            Procedure::Clear => "/rpc/clear",
            Procedure::Vacuum => "/rpc/vacuum",
            Procedure::Set => "/rpc/set",
            Procedure::GetBulk => "/rpc/get_bulk",
            Procedure::SetBulk => "/rpc/set_bulk",
            Procedure::RemoveBulk => "/rpc/remove_bulk",
            Procedure::MatchPrefix => "/rpc/match_prefix",
            Procedure::Cas => "/rpc/cas",
            Procedure::Check => "/rpc/check",
        }
    }
}

/// HTTP verbs used by the single-key REST interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestMethod {
    Get,
    Put,
    Delete,
}

impl From<RestMethod> for Method {
    fn from(method: RestMethod) -> Self {
        match method {
            RestMethod::Get => Method::GET,
            RestMethod::Put => Method::PUT,
            RestMethod::Delete => Method::DELETE,
        }
    }
}

/// Decoded reply of an RPC call.
#[derive(Debug, Clone)]
pub struct RpcReply {
    pub status: u16,
    pub records: Vec<KvRecord>,
}

/// Raw reply of a REST call.
#[derive(Debug, Clone)]
pub struct RestReply {
    pub status: u16,
    pub body: Bytes,
}

/// Builds the REST path for `key`: `/` followed by the percent-escaped key.
///
/// ```
/// assert_eq!(kt_client::rest_path(b"to/be/removed"), "/to%2Fbe%2Fremoved");
/// ```
pub fn rest_path(key: &[u8]) -> String {
    let mut path = String::with_capacity(key.len() + 1);
    path.push('/');
    // Non-UTF-8 keys are escaped byte by byte.
    for chunk in percent_encode(key, KEY_SEGMENT) {
        path.push_str(chunk);
    }
    path
}

/// Dispatches requests over the shared pool.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    pool: ConnectionPool,
}

impl Dispatcher {
    pub(crate) fn new(pool: ConnectionPool) -> Self {
        Dispatcher { pool }
    }

    /// Posts `records` to `procedure` and decodes the reply.
    pub(crate) fn rpc(&self, procedure: Procedure, records: &[KvRecord]) -> ClientResult<RpcReply> {
        let (body, content_type) = codec::encode(records);
        let response = {
            let mut conn = self.pool.acquire()?;
            conn.send(Method::POST, procedure.path(), Some(content_type), Some(body))?
        };

        let reply_type = response.content_type.as_deref().unwrap_or_default();
        debug!(
            procedure = procedure.path(),
            request_encoding = content_type,
            status = response.status,
            reply_type,
            bytes = response.body.len(),
            "rpc call"
        );
        let records = codec::decode(&response.body, reply_type)?;
        Ok(RpcReply {
            status: response.status,
            records,
        })
    }

    /// Issues a single-key REST request with `value` as the literal body.
    pub(crate) fn rest(
        &self,
        method: RestMethod,
        key: &[u8],
        value: Option<&[u8]>,
    ) -> ClientResult<RestReply> {
        // URL resolution treats these segments as navigation, so they would
        // address `/` instead of the key.
        if key == b"." || key == b".." {
            return Err(ClientError::InvalidArgument(
                "keys \".\" and \"..\" cannot be addressed over REST",
            ));
        }
        let path = rest_path(key);
        let response = {
            let mut conn = self.pool.acquire()?;
            conn.send(method.into(), &path, None, value.map(<[u8]>::to_vec))?
        };
        debug!(?method, path = %path, status = response.status, bytes = response.body.len(), "rest call");
        Ok(RestReply {
            status: response.status,
            body: response.body,
        })
    }
}
