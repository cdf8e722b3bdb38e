//! # Synchronous Client API
//!
//! Purpose: Expose the server's verbs as a compact, blocking API on top of the
//! pooled dispatcher.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `KtClient` hides pooling, paths, and the codec.
//! 2. **Borrow-Friendly API**: Keys and values are accepted as `&[u8]`-like
//!    borrows and never copied more than once into a request.
//! 3. **Omission Over Placeholders**: Optional request fields (`oval`,
//!    `nval`, `xt`) are left out of the record list when absent, never sent
//!    empty.
//! 4. **Two Tiers**: Base operations report misses as values; strict variants
//!    convert them into `NotFound` / `CasFailed` errors.
//!
//! ## Status Codes
//!
//! ```text
//! RPC   200 ok        450 precondition failed / logical miss
//! REST  200 get ok    201 put ok    204 delete ok    404 miss
//! ```

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use kt_common::{find_record, KvRecord, ERROR_FIELD};
use tracing::warn;
use url::Url;

use crate::error::{ClientError, ClientResult};
use crate::pool::{ConnectionPool, PoolConfig};
use crate::transport::{Dispatcher, Procedure, RestMethod, RestReply};

const STATUS_OK: u16 = 200;
const STATUS_CREATED: u16 = 201;
const STATUS_NO_CONTENT: u16 = 204;
const STATUS_NOT_FOUND: u16 = 404;
const STATUS_LOGICAL_MISS: u16 = 450;

/// `ttl`/`pttl` result for a key that does not exist.
pub const TTL_MISSING: i64 = -2;

/// `ttl`/`pttl` result for a key stored without expiration.
pub const TTL_NO_EXPIRY: i64 = -1;

/// Expiration state of a key as reported by `/rpc/check`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// Key is missing or already expired.
    Missing,
    /// Key exists without expiration.
    NoExpiry,
    /// Key expires after the provided duration.
    ExpiresIn(Duration),
}

impl KeyTtl {
    /// Remaining whole seconds, or the `TTL_*` sentinel.
    pub fn as_secs(self) -> i64 {
        match self {
            KeyTtl::Missing => TTL_MISSING,
            KeyTtl::NoExpiry => TTL_NO_EXPIRY,
            KeyTtl::ExpiresIn(left) => i64::try_from(left.as_secs()).unwrap_or(i64::MAX),
        }
    }

    /// Remaining milliseconds, or the `TTL_*` sentinel.
    pub fn as_millis(self) -> i64 {
        match self {
            KeyTtl::Missing => TTL_MISSING,
            KeyTtl::NoExpiry => TTL_NO_EXPIRY,
            KeyTtl::ExpiresIn(left) => i64::try_from(left.as_millis()).unwrap_or(i64::MAX),
        }
    }

    /// Builds the state from an `xt` field (epoch seconds) at time `now`.
    ///
    /// An expiry already in the past clamps to zero.
    fn from_expiry(xt: &str, now: Duration) -> ClientResult<Self> {
        let invalid = || ClientError::InvalidField {
            field: "xt",
            value: xt.to_string(),
        };
        let expires_at: f64 = xt.trim().parse().map_err(|_| invalid())?;
        if !expires_at.is_finite() {
            return Err(invalid());
        }
        let left = (expires_at - now.as_secs_f64()).max(0.0);
        let left = Duration::try_from_secs_f64(left).map_err(|_| invalid())?;
        Ok(KeyTtl::ExpiresIn(left))
    }
}

/// Configuration for the synchronous client and its pool.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server host name or address.
    pub host: String,
    /// Server HTTP port.
    pub port: u16,
    /// Maximum number of pooled connections.
    pub pool_size: usize,
    /// How long a call waits for a pooled connection.
    pub timeout: Duration,
    /// Optional timeout for each HTTP request.
    pub request_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            host: "127.0.0.1".to_string(),
            port: 1978,
            pool_size: 5,
            timeout: Duration::from_secs(5),
            request_timeout: None,
        }
    }
}

impl ClientConfig {
    /// Root URL of the server, e.g. `http://127.0.0.1:1978/`.
    pub fn base_url(&self) -> ClientResult<Url> {
        let host = if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        Ok(Url::parse(&format!("http://{}:{}/", host, self.port))?)
    }
}

/// Synchronous client with connection pooling.
///
/// Cloning is cheap and shares the pool. Each call acquires a connection,
/// executes one request, and returns the connection to the pool.
#[derive(Clone)]
pub struct KtClient {
    dispatcher: Dispatcher,
}

impl KtClient {
    /// Creates a client for `host:port` with default pool settings.
    pub fn connect(host: impl Into<String>, port: u16) -> ClientResult<Self> {
        Self::with_config(ClientConfig {
            host: host.into(),
            port,
            ..ClientConfig::default()
        })
    }

    /// Creates a client with a custom configuration.
    ///
    /// No connection is opened until the first call.
    pub fn with_config(config: ClientConfig) -> ClientResult<Self> {
        let pool = ConnectionPool::new(PoolConfig {
            base_url: config.base_url()?,
            size: config.pool_size,
            acquire_timeout: config.timeout,
            request_timeout: config.request_timeout,
        })?;
        Ok(KtClient {
            dispatcher: Dispatcher::new(pool),
        })
    }

    /// Returns the number of records in the database.
    pub fn count(&self) -> ClientResult<u64> {
        let records = self.rpc_ok(Procedure::Status, &[])?;
        number_field(&records, "count")
    }

    /// Removes every record in the database.
    pub fn clear(&self) -> ClientResult<()> {
        self.rpc_ok(Procedure::Clear, &[]).map(drop)
    }

    /// Triggers collection of expired records.
    pub fn vacuum(&self) -> ClientResult<()> {
        self.rpc_ok(Procedure::Vacuum, &[]).map(drop)
    }

    /// Fetches a value by key.
    ///
    /// Returns `Ok(None)` when the key is missing.
    pub fn get(&self, key: &[u8]) -> ClientResult<Option<Vec<u8>>> {
        let reply = self.dispatcher.rest(RestMethod::Get, key, None)?;
        match reply.status {
            STATUS_OK => Ok(Some(reply.body.to_vec())),
            STATUS_NOT_FOUND => Ok(None),
            _ => Err(unexpected_status(reply)),
        }
    }

    /// Fetches a value by key, failing with `NotFound` when missing.
    pub fn get_strict(&self, key: &[u8]) -> ClientResult<Vec<u8>> {
        self.get(key)?.ok_or_else(|| not_found(key))
    }

    /// Stores a value without expiration.
    pub fn set(&self, key: &[u8], value: &[u8]) -> ClientResult<()> {
        self.store(key, value, None)
    }

    /// Stores a value that expires `expire` from now.
    ///
    /// The expiry travels as an absolute `xt` field in epoch seconds.
    pub fn set_with_expiry(&self, key: &[u8], value: &[u8], expire: Duration) -> ClientResult<()> {
        let expires_at = (now() + expire).as_secs();
        self.store(key, value, Some(expires_at))
    }

    fn store(&self, key: &[u8], value: &[u8], expires_at: Option<u64>) -> ClientResult<()> {
        let mut request = vec![KvRecord::new("key", key), KvRecord::new("value", value)];
        if let Some(xt) = expires_at {
            request.push(KvRecord::new("xt", xt.to_string()));
        }
        self.rpc_ok(Procedure::Set, &request).map(drop)
    }

    /// Stores a value through the REST interface (`PUT /<key>`).
    pub fn put(&self, key: &[u8], value: &[u8]) -> ClientResult<()> {
        let reply = self.dispatcher.rest(RestMethod::Put, key, Some(value))?;
        match reply.status {
            STATUS_CREATED => Ok(()),
            _ => Err(unexpected_status(reply)),
        }
    }

    /// Deletes a key. Returns false when the key did not exist.
    pub fn remove(&self, key: &[u8]) -> ClientResult<bool> {
        let reply = self.dispatcher.rest(RestMethod::Delete, key, None)?;
        match reply.status {
            STATUS_NO_CONTENT => Ok(true),
            STATUS_NOT_FOUND => Ok(false),
            _ => Err(unexpected_status(reply)),
        }
    }

    /// Deletes a key, failing with `NotFound` when it did not exist.
    pub fn remove_strict(&self, key: &[u8]) -> ClientResult<()> {
        if self.remove(key)? {
            Ok(())
        } else {
            Err(not_found(key))
        }
    }

    /// Fetches several keys at once.
    ///
    /// The map holds only keys present on the server; reply metadata such as
    /// `num` never appears in it.
    pub fn get_bulk<I, K>(&self, keys: I) -> ClientResult<HashMap<Vec<u8>, Vec<u8>>>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        let request: Vec<KvRecord> = keys.into_iter().map(|key| KvRecord::bulk(key, "")).collect();
        let records = self.rpc_ok(Procedure::GetBulk, &request)?;

        Ok(records
            .into_iter()
            .filter_map(|record| {
                let key = record.bulk_key()?.to_vec();
                Some((key, record.value))
            })
            .collect())
    }

    /// Stores several key/value pairs. Returns the number stored.
    pub fn set_bulk<I, K, V>(&self, entries: I) -> ClientResult<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let request: Vec<KvRecord> = entries
            .into_iter()
            .map(|(key, value)| KvRecord::bulk(key, value))
            .collect();
        let records = self.rpc_ok(Procedure::SetBulk, &request)?;
        number_field(&records, "num")
    }

    /// Deletes several keys. Returns the number removed.
    pub fn remove_bulk<I, K>(&self, keys: I) -> ClientResult<u64>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        let request: Vec<KvRecord> = keys.into_iter().map(|key| KvRecord::bulk(key, "")).collect();
        let records = self.rpc_ok(Procedure::RemoveBulk, &request)?;
        number_field(&records, "num")
    }

    /// Lists keys starting with `prefix`, in server order.
    ///
    /// `max` caps the number of keys; `None` asks for all of them.
    pub fn match_prefix(&self, prefix: &[u8], max: Option<usize>) -> ClientResult<Vec<Vec<u8>>> {
        let max = max.map_or_else(|| "-1".to_string(), |max| max.to_string());
        let request = [KvRecord::new("prefix", prefix), KvRecord::new("max", max)];
        let records = self.rpc_ok(Procedure::MatchPrefix, &request)?;

        Ok(records
            .iter()
            .filter_map(|record| record.bulk_key().map(<[u8]>::to_vec))
            .collect())
    }

    /// Compare-and-swap.
    ///
    /// - `oval` and `nval`: swap to `nval` if the current value is `oval`.
    /// - only `nval`: store `nval` if the key is absent.
    /// - only `oval`: delete the key if the current value is `oval`.
    ///
    /// Returns false when the precondition failed. Omitting both values is
    /// rejected with `InvalidArgument` before any request is sent.
    pub fn cas(&self, key: &[u8], oval: Option<&[u8]>, nval: Option<&[u8]>) -> ClientResult<bool> {
        if oval.is_none() && nval.is_none() {
            return Err(ClientError::InvalidArgument(
                "cas requires an old value, a new value, or both",
            ));
        }

        let mut request = vec![KvRecord::new("key", key)];
        if let Some(oval) = oval {
            request.push(KvRecord::new("oval", oval));
        }
        if let Some(nval) = nval {
            request.push(KvRecord::new("nval", nval));
        }

        let reply = self.dispatcher.rpc(Procedure::Cas, &request)?;
        match reply.status {
            STATUS_OK => Ok(true),
            STATUS_LOGICAL_MISS => Ok(false),
            status => Err(server_error(Procedure::Cas, status, &reply.records)),
        }
    }

    /// Compare-and-swap, failing with `CasFailed` when the precondition fails.
    pub fn cas_strict(
        &self,
        key: &[u8],
        oval: Option<&[u8]>,
        nval: Option<&[u8]>,
    ) -> ClientResult<()> {
        if self.cas(key, oval, nval)? {
            Ok(())
        } else {
            Err(ClientError::CasFailed {
                key: String::from_utf8_lossy(key).into_owned(),
            })
        }
    }

    /// Reports whether `key` exists and when it expires.
    pub fn check(&self, key: &[u8]) -> ClientResult<KeyTtl> {
        let request = [KvRecord::new("key", key)];
        let reply = self.dispatcher.rpc(Procedure::Check, &request)?;
        match reply.status {
            STATUS_OK => match find_record(&reply.records, b"xt") {
                Some(xt) => KeyTtl::from_expiry(&xt.value_str(), now()),
                None => Ok(KeyTtl::NoExpiry),
            },
            STATUS_LOGICAL_MISS => Ok(KeyTtl::Missing),
            status => Err(server_error(Procedure::Check, status, &reply.records)),
        }
    }

    /// Remaining time to live in seconds.
    ///
    /// Returns `TTL_MISSING` (-2) for absent keys and `TTL_NO_EXPIRY` (-1)
    /// for keys without expiration.
    pub fn ttl(&self, key: &[u8]) -> ClientResult<i64> {
        self.check(key).map(KeyTtl::as_secs)
    }

    /// Remaining time to live in milliseconds, with the same sentinels as
    /// [`KtClient::ttl`].
    pub fn pttl(&self, key: &[u8]) -> ClientResult<i64> {
        self.check(key).map(KeyTtl::as_millis)
    }

    fn rpc_ok(&self, procedure: Procedure, request: &[KvRecord]) -> ClientResult<Vec<KvRecord>> {
        let reply = self.dispatcher.rpc(procedure, request)?;
        if reply.status != STATUS_OK {
            return Err(server_error(procedure, reply.status, &reply.records));
        }
        Ok(reply.records)
    }
}

fn now() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

fn number_field(records: &[KvRecord], field: &'static str) -> ClientResult<u64> {
    let record = find_record(records, field.as_bytes()).ok_or(ClientError::MissingField(field))?;
    let value = record.value_str();
    value.trim().parse().map_err(|_| ClientError::InvalidField {
        field,
        value: value.into_owned(),
    })
}

fn server_error(procedure: Procedure, status: u16, records: &[KvRecord]) -> ClientError {
    let message = match find_record(records, ERROR_FIELD) {
        Some(record) => record.value_str().into_owned(),
        None => "unknown error".to_string(),
    };
    warn!(procedure = procedure.path(), status, message = %message, "server reported an error");
    ClientError::Server { status, message }
}

fn unexpected_status(reply: RestReply) -> ClientError {
    ClientError::UnexpectedStatus {
        status: reply.status,
        body: String::from_utf8_lossy(&reply.body).into_owned(),
    }
}

fn not_found(key: &[u8]) -> ClientError {
    ClientError::NotFound {
        key: String::from_utf8_lossy(key).into_owned(),
    }
}
