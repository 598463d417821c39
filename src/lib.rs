//! # modulenet
//!
//! An embeddable HTTP client core that drives every exchange through an
//! ordered chain of protocol modules.
//!
//! Each module sees the request before it is sent and the response in three
//! phases after it arrives. In the decision phase a module may resend the
//! request, possibly on a different connection. Two modules ship with the crate:
//!
//! - **Redirection**: 301/302/303/307 following, 305 Use Proxy, a
//!   permanent-redirect cache and a redirect depth cap of 15.
//! - **Authorization**: Basic and Digest answers to `401`/`407`
//!   challenges, preemptive credentials, proxy credentials and a guard that
//!   turns a refuse/retry loop into an error after 10 attempts.
//!
//! Requests whose body is a one-shot output stream cannot be resent by the
//! pipeline itself. When the client defers such exchanges, the module parks
//! its state under the stream's ticket and asks the caller to resend.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use modulenet::Client;
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = Client::new();
//!     client.add_basic_auth("example.com", 80, "staff", "alice", "secret");
//!
//!     let mut response = client.get("http://example.com/private")
//!         .send()
//!         .await
//!         .unwrap();
//!     println!("Status: {}", response.status());
//!     println!("Body: {}", response.text().await.unwrap());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error codes and load states
//! - [`http`] - Request/response model, module contract and pipeline engine
//! - [`socket`] - Credential store and proxy settings
//! - [`urlrequest`] - The per-client context and its caches
//! - [`client`] - High-level request API

pub mod base;
pub mod client;
pub mod http;
pub mod socket;
pub mod urlrequest;

pub use base::neterror::NetError;
pub use client::{Client, ClientBuilder, RequestBuilder};
pub use crate::http::{HttpResponse, Pipeline};
pub use urlrequest::context::{ClientContext, ClientContextConfig};
