//! Per-client state shared by every exchange.
//!
//! - [`context`]: [`ClientContext`](context::ClientContext) and its configuration
//! - [`redirectcache`]: permanent-redirect cache
//! - [`deferred`]: deferred-retry table for streamed bodies

pub mod context;
pub mod deferred;
pub mod redirectcache;
