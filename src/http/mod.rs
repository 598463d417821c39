//! HTTP request/response model and the module pipeline.
//!
//! - [`transaction`]: the pipeline engine driving one exchange
//! - [`module`]: the contract every protocol module implements
//! - [`authorization`], [`redirection`]: the two built-in modules
//! - [`streamfactory`]: the built-in HTTP/1.1 transport

pub mod authhandler;
pub mod authorization;
pub mod challenge;
pub mod connection;
pub mod digestauth;
pub mod module;
pub mod orderedheaders;
pub mod redirection;
pub mod request;
pub mod requestbody;
pub mod response;
pub mod responsebody;
pub mod streamfactory;
pub mod transaction;

// Re-exports for convenience
pub use connection::{Connection, ConnectionSettings, ProxyChoice};
pub use module::{Module, ModuleFactory, Phase1Outcome, RequestOutcome, ResponseOutcome};
pub use orderedheaders::OrderedHeaders;
pub use request::Request;
pub use requestbody::{BufferedOutputStream, OutputStream, RequestBody, StreamBody};
pub use response::{HttpResponse, Response};
pub use responsebody::ResponseBody;
pub use streamfactory::HttpConnection;
pub use transaction::{HttpTransaction, Pipeline};
