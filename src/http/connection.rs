//! The transport contract consumed by the pipeline.
//!
//! A [`Connection`] names one origin (scheme, host, port), optionally
//! reached through a forward proxy, and knows how to run one exchange on it.
//! Modules never build connections from scratch: they [`derive`] a new one
//! from the current connection so transport policy travels with redirects.
//!
//! [`derive`]: Connection::derive

use crate::base::neterror::NetError;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::socket::proxy::ProxySettings;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::SystemTime;
use url::Url;

/// Alias for the `Future` returned by [`Connection::dispatch`].
pub type Dispatching<'a> = Pin<Box<dyn Future<Output = Result<Response, NetError>> + Send + 'a>>;

/// Clock used by a connection for its timing metrics.
pub trait TimeAuthority: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl TimeAuthority for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Transport policy carried from a connection to every connection derived
/// from it.
#[derive(Clone)]
pub struct ConnectionSettings {
    /// Verify TLS peers.
    pub verify_tls: bool,
    /// Check certificates against the trust store.
    pub check_certificates: bool,
    /// Give an idle connection a chance to observe a peer close before
    /// deciding to reuse it.
    pub test_connection_health: bool,
    /// Clock for time-to-first-byte.
    pub time_authority: Arc<dyn TimeAuthority>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            verify_tls: true,
            check_certificates: true,
            test_connection_health: false,
            time_authority: Arc::new(SystemClock),
        }
    }
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("verify_tls", &self.verify_tls)
            .field("check_certificates", &self.check_certificates)
            .field("test_connection_health", &self.test_connection_health)
            .finish_non_exhaustive()
    }
}

/// Proxy to use for a derived connection.
#[derive(Debug, Clone)]
pub enum ProxyChoice {
    /// Keep the current connection's proxy.
    Inherit,
    /// Route through this proxy (305 Use Proxy).
    Use(ProxySettings),
}

pub trait Connection: Send + Sync + fmt::Debug {
    fn scheme(&self) -> &str;

    fn host(&self) -> &str;

    fn port(&self) -> u16;

    fn proxy(&self) -> Option<&ProxySettings>;

    fn settings(&self) -> &ConnectionSettings;

    /// Send `request` and return the response once the status line and
    /// headers are known. The body stays on the wire.
    fn dispatch<'a>(&'a self, request: &'a Request) -> Dispatching<'a>;

    /// Build a connection of the same kind for `target`, carrying over
    /// [`ConnectionSettings`].
    fn derive(&self, target: &Url, proxy: ProxyChoice) -> Result<Arc<dyn Connection>, NetError>;

    /// Same scheme, host and port.
    fn is_compatible_with(&self, uri: &Url) -> bool {
        uri.scheme().eq_ignore_ascii_case(self.scheme())
            && uri
                .host_str()
                .is_some_and(|h| h.eq_ignore_ascii_case(self.host()))
            && uri.port_or_known_default() == Some(self.port())
    }

    /// `scheme://host:port/`
    fn base_url(&self) -> Result<Url, NetError> {
        Url::parse(&format!("{}://{}:{}/", self.scheme(), self.host(), self.port()))
            .map_err(|_| NetError::InvalidUrl)
    }

    /// `host:port` of the forward proxy, the key of the proxy
    /// authorization cache.
    fn proxy_key(&self) -> Option<String> {
        self.proxy().and_then(|p| p.authority_key())
    }
}
