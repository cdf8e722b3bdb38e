//! # Kyoto Tycoon Sync Client
//!
//! Purpose: Provide a blocking client for a key-value server that speaks
//! tab-separated records over HTTP, with connection pooling shared by
//! concurrent callers.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Reuse HTTP handles to avoid repeated connects.
//! 2. **Two Transports**: Single-key REST calls carry raw bodies; RPC calls
//!    carry codec-encoded record lists.
//! 3. **Totals First**: Misses are values (`None`, `false`, sentinels); the
//!    `*_strict` variants turn them into errors.
//! 4. **Fail Fast**: Protocol violations surface immediately as errors.

mod client;
mod error;
mod pool;
mod transport;

pub use client::{ClientConfig, KeyTtl, KtClient, TTL_MISSING, TTL_NO_EXPIRY};
pub use error::{ClientError, ClientResult};
pub use kt_common::KvRecord;
pub use transport::{rest_path, Procedure, RestMethod};
