//! Utilities shared across database drivers.
//!
//! - [`tls`]: TLS setup for PostgreSQL connections

pub mod tls;

pub use tls::{SslMode, TlsBuilder};
