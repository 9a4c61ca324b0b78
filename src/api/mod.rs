//! Platform API surface: resilient transport, typed errors, and the
//! offline-first cached client.

pub mod actions;
pub mod api_types;
pub mod cache;
pub mod cached_client;
pub mod client;
pub mod error;
pub mod retry;
pub mod types;
