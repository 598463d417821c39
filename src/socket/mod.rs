//! Credentials and proxies.
//!
//! - [`authcache`]: credential store and per-proxy credential cache
//! - [`proxy`]: forward proxy settings

pub mod authcache;
pub mod proxy;
