//! # Connection Pool
//!
//! Purpose: Share a bounded set of HTTP handles to one server between
//! concurrent callers.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Handles are created lazily up to `size` and
//!    reused afterwards.
//! 2. **Minimal Locking**: The mutex guards only the idle queue and the slot
//!    count; handle creation and requests run unlocked.
//! 3. **Bounded Waiting**: A caller waits on a condvar for a free handle and
//!    gives up with `PoolExhausted` once `acquire_timeout` elapses.
//! 4. **No Liveness Checks**: Reused handles are not checked; a broken one
//!    surfaces as a transport error and is discarded.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use reqwest::blocking::Client;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use tracing::{trace, warn};
use url::Url;

use crate::error::{ClientError, ClientResult};

/// Pool configuration for the sync client.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Server root, e.g. `http://127.0.0.1:1978/`.
    pub base_url: Url,
    /// Maximum number of handles (idle + in use).
    pub size: usize,
    /// How long `acquire` waits for a free handle.
    pub acquire_timeout: Duration,
    /// Optional per-request HTTP timeout.
    pub request_timeout: Option<Duration>,
}

struct PoolState {
    idle: VecDeque<Connection>,
    total: usize,
}

struct PoolInner {
    config: PoolConfig,
    state: Mutex<PoolState>,
    available: Condvar,
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // Every critical section is a single push, pop, or counter update,
        // so a poisoned lock still guards consistent state.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn return_connection(&self, conn: Connection) {
        self.lock().idle.push_back(conn);
        self.available.notify_one();
    }

    fn release_slot(&self) {
        let mut state = self.lock();
        state.total = state.total.saturating_sub(1);
        drop(state);
        self.available.notify_one();
    }
}

/// Connection pool handle.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

enum Checkout {
    Idle(Connection),
    Reserved,
}

impl ConnectionPool {
    /// Creates a new connection pool with the provided configuration.
    pub fn new(config: PoolConfig) -> ClientResult<Self> {
        if config.size == 0 {
            return Err(ClientError::InvalidConfig("pool size must be at least 1"));
        }
        let state = PoolState {
            idle: VecDeque::with_capacity(config.size),
            total: 0,
        };
        Ok(ConnectionPool {
            inner: Arc::new(PoolInner {
                config,
                state: Mutex::new(state),
                available: Condvar::new(),
            }),
        })
    }

    /// Acquires a connection, waiting up to the configured timeout.
    pub fn acquire(&self) -> ClientResult<PooledConnection> {
        match self.checkout()? {
            Checkout::Idle(conn) => Ok(PooledConnection::new(self.inner.clone(), conn)),
            Checkout::Reserved => match Connection::connect(&self.inner.config) {
                Ok(conn) => Ok(PooledConnection::new(self.inner.clone(), conn)),
                Err(err) => {
                    self.inner.release_slot();
                    Err(err)
                }
            },
        }
    }

    fn checkout(&self) -> ClientResult<Checkout> {
        let timeout = self.inner.config.acquire_timeout;
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.lock();
        loop {
            if let Some(conn) = state.idle.pop_front() {
                return Ok(Checkout::Idle(conn));
            }
            if state.total < self.inner.config.size {
                state.total += 1;
                return Ok(Checkout::Reserved);
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(size = self.inner.config.size, ?timeout, "connection pool exhausted");
                return Err(ClientError::PoolExhausted { timeout });
            }
            state = self
                .inner
                .available
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    #[cfg(test)]
    fn counts(&self) -> (usize, usize) {
        let state = self.inner.lock();
        (state.idle.len(), state.total)
    }
}

/// RAII wrapper returning a connection to the pool on drop.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    conn: Option<Connection>,
    valid: bool,
}

impl PooledConnection {
    fn new(pool: Arc<PoolInner>, conn: Connection) -> Self {
        PooledConnection {
            pool,
            conn: Some(conn),
            valid: true,
        }
    }

    /// Issues one HTTP request on this handle.
    pub fn send(
        &mut self,
        method: Method,
        path: &str,
        content_type: Option<&'static str>,
        body: Option<Vec<u8>>,
    ) -> ClientResult<RawResponse> {
        let conn = self.conn.as_ref().expect("connection exists");
        let response = conn.send(method, path, content_type, body);
        if response.is_err() {
            // If the transport fails, do not return this handle to the pool.
            self.valid = false;
        }
        response
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => return,
        };

        if self.valid {
            self.pool.return_connection(conn);
        } else {
            drop(conn);
            self.pool.release_slot();
        }
    }
}

/// Status, content-type, and body of one HTTP exchange.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// One reusable HTTP handle.
///
/// Each handle keeps at most one idle keep-alive socket, so the pool size
/// bounds the number of open connections to the server.
struct Connection {
    http: Client,
    base_url: Url,
}

impl Connection {
    fn connect(config: &PoolConfig) -> ClientResult<Self> {
        let mut builder = Client::builder().pool_max_idle_per_host(1).tcp_nodelay(true);
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;
        trace!(base_url = %config.base_url, "created pooled http handle");

        Ok(Connection {
            http,
            base_url: config.base_url.clone(),
        })
    }

    fn send(
        &self,
        method: Method,
        path: &str,
        content_type: Option<&'static str>,
        body: Option<Vec<u8>>,
    ) -> ClientResult<RawResponse> {
        let url = self.base_url.join(path)?;
        let mut request = self.http.request(method, url);
        if let Some(content_type) = content_type {
            request = request.header(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send()?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.bytes()?;

        Ok(RawResponse {
            status,
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn pool(size: usize, acquire_timeout: Duration) -> ConnectionPool {
        ConnectionPool::new(PoolConfig {
            base_url: Url::parse("http://127.0.0.1:1978/").unwrap(),
            size,
            acquire_timeout,
            request_timeout: None,
        })
        .unwrap()
    }

    #[test]
    fn rejects_zero_size() {
        let result = ConnectionPool::new(PoolConfig {
            base_url: Url::parse("http://127.0.0.1:1978/").unwrap(),
            size: 0,
            acquire_timeout: Duration::from_millis(10),
            request_timeout: None,
        });
        assert!(matches!(result, Err(ClientError::InvalidConfig(_))));
    }

    #[test]
    fn creates_lazily_and_reuses_released_handles() {
        let pool = pool(2, Duration::from_millis(50));
        assert_eq!(pool.counts(), (0, 0));

        let first = pool.acquire().unwrap();
        assert_eq!(pool.counts(), (0, 1));
        drop(first);
        assert_eq!(pool.counts(), (1, 1));

        let _again = pool.acquire().unwrap();
        assert_eq!(pool.counts(), (0, 1));
    }

    #[test]
    fn exhausted_pool_times_out() {
        let pool = pool(1, Duration::from_millis(50));
        let _held = pool.acquire().unwrap();

        let started = Instant::now();
        let result = pool.acquire();
        assert!(matches!(result, Err(ClientError::PoolExhausted { .. })));
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn waiter_wakes_when_handle_is_released() {
        let pool = pool(1, Duration::from_secs(5));
        let held = pool.acquire().unwrap();

        let waiter = {
            let pool = pool.clone();
            thread::spawn(move || pool.acquire().map(|_| ()))
        };
        thread::sleep(Duration::from_millis(50));
        drop(held);

        assert!(waiter.join().unwrap().is_ok());
        assert_eq!(pool.counts(), (1, 1));
    }

    #[test]
    fn invalid_handle_frees_its_slot() {
        let pool = pool(1, Duration::from_millis(50));
        let mut conn = pool.acquire().unwrap();
        conn.valid = false;
        drop(conn);
        assert_eq!(pool.counts(), (0, 0));
        assert!(pool.acquire().is_ok());
    }
}
