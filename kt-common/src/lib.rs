// kt-common - Record types and the tab-separated wire codec
//
// This crate is pure: no sockets, no clocks. Both the client and any test
// fakes share these definitions so the wire format lives in one place.

pub mod codec;
pub mod error;
pub mod record;

// Re-export for convenience
pub use codec::*;
pub use error::*;
pub use record::*;
