//! HTTP/JSON query surface over one DySART [`Laboratory`](dysart_engine::Laboratory).
//!
//! Remote clients invoke exposed feature methods, load projects, and
//! inspect the audit trail. Every invocation is persisted as a request
//! record that the call records it causes point back to.

pub mod config;
pub mod error;
pub mod handlers;
pub mod router;
pub mod schema;
pub mod state;
