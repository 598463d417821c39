//! Built-in plain HTTP/1.1 transport.
//!
//! One [`HttpConnection`] per origin. The hyper sender of the last exchange
//! is kept for reuse unless the request asks not to pipeline; no lock is
//! held while a request is on the wire.

use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use crate::http::connection::{Connection, ConnectionSettings, Dispatching, ProxyChoice};
use crate::http::request::{path_and_query, Request};
use crate::http::response::Response;
use crate::http::responsebody::ResponseBody;
use crate::socket::proxy::ProxySettings;
use bytes::Bytes;
use http::header::{HeaderValue, HOST};
use http::{Method, Version};
use http_body_util::Full;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpStream;
use url::Url;

type Sender = http1::SendRequest<Full<Bytes>>;

pub struct HttpConnection {
    scheme: String,
    host: String,
    port: u16,
    proxy: Option<ProxySettings>,
    settings: ConnectionSettings,
    idle: Mutex<Option<Sender>>,
}

impl fmt::Debug for HttpConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpConnection")
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("proxy", &self.proxy.as_ref().and_then(|p| p.authority_key()))
            .finish()
    }
}

impl HttpConnection {
    /// Connection to the origin of `url`. Only `http` is supported.
    pub fn new(url: &Url) -> Result<Self, NetError> {
        if url.scheme() != "http" {
            return Err(NetError::DisallowedUrlScheme(url.scheme().to_string()));
        }
        let host = url.host_str().filter(|h| !h.is_empty()).ok_or(NetError::InvalidUrl)?;
        let port = url.port_or_known_default().ok_or(NetError::InvalidUrl)?;
        Ok(Self {
            scheme: url.scheme().to_string(),
            host: host.to_ascii_lowercase(),
            port,
            proxy: None,
            settings: ConnectionSettings::default(),
            idle: Mutex::new(None),
        })
    }

    pub fn with_proxy(mut self, proxy: ProxySettings) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_settings(mut self, settings: ConnectionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// `Host` header value: port omitted when it is the default.
    fn host_header(&self) -> String {
        if self.port == 80 {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Request-target on the wire: absolute-form through a proxy,
    /// origin-form otherwise.
    fn wire_target(&self, request: &Request, uri: &Url) -> String {
        if *request.method() == Method::CONNECT || request.target() == "*" {
            request.target().to_string()
        } else if self.proxy.is_some() {
            uri.as_str().to_string()
        } else {
            path_and_query(uri)
        }
    }

    fn build(&self, request: &Request, uri: &Url) -> Result<http::Request<Full<Bytes>>, NetError> {
        let mut headers = request.headers().to_header_map()?;
        if !headers.contains_key(HOST) {
            let host = HeaderValue::from_str(&self.host_header()).map_err(|_| NetError::InvalidHeader)?;
            headers.insert(HOST, host);
        }

        let mut req = http::Request::builder()
            .method(request.method().clone())
            .uri(self.wire_target(request, uri))
            .version(Version::HTTP_11)
            .body(Full::new(request.body().to_bytes()))
            .map_err(|_| NetError::InvalidUrl)?;
        *req.headers_mut() = headers;
        Ok(req)
    }

    /// An idle sender that can take a request right now, if any.
    async fn checkout(&self) -> Option<Sender> {
        let sender = self.idle.lock().ok().and_then(|mut idle| idle.take())?;
        if self.settings.test_connection_health {
            // Let the connection driver notice a close from the peer first.
            tokio::task::yield_now().await;
        }
        if sender.is_ready() {
            tracing::trace!(host = %self.host, "reusing idle connection");
            Some(sender)
        } else {
            None
        }
    }

    fn checkin(&self, sender: Sender) {
        if let Ok(mut idle) = self.idle.lock() {
            *idle = Some(sender);
        }
    }

    fn send_error(&self, e: hyper::Error) -> NetError {
        tracing::debug!(error = %e, host = %self.host, "request failed");
        if e.is_incomplete_message() {
            NetError::EmptyResponse
        } else {
            NetError::ConnectionClosed
        }
    }

    async fn connect(&self) -> Result<Sender, NetError> {
        let (host, port) = match &self.proxy {
            Some(proxy) => {
                let (host, port) = proxy.host_port().ok_or(NetError::InvalidUrl)?;
                (host.to_string(), port)
            }
            None => (self.host.clone(), self.port),
        };

        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), port))
            .await
            .dns_context(&host)?
            .collect();
        let stream = TcpStream::connect(&addrs[..])
            .await
            .connection_context(&host, port)?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, %host, port, "could not set TCP_NODELAY");
        }

        let (sender, conn) = http1::handshake(TokioIo::new(stream)).await.map_err(|e| {
            tracing::debug!(error = %e, %host, port, "handshake failed");
            if self.proxy.is_some() {
                NetError::ProxyConnectionFailed
            } else {
                NetError::ConnectionFailed
            }
        })?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!(error = %e, "connection driver ended with error");
            }
        });
        Ok(sender)
    }
}

impl Connection for HttpConnection {
    fn scheme(&self) -> &str {
        &self.scheme
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn proxy(&self) -> Option<&ProxySettings> {
        self.proxy.as_ref()
    }

    fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    fn dispatch<'a>(&'a self, request: &'a Request) -> Dispatching<'a> {
        Box::pin(async move {
            let uri = request.absolute_uri()?;

            let idle = if request.dont_pipeline() {
                None
            } else {
                self.checkout().await
            };
            let (mut sender, reused) = match idle {
                Some(sender) => (sender, true),
                None => (self.connect().await?, false),
            };

            let started = self.settings.time_authority.now();
            let resp = match sender.send_request(self.build(request, &uri)?).await {
                Ok(resp) => resp,
                // The server may have dropped an idle connection; one more try
                // on a fresh one.
                Err(e) if reused => {
                    tracing::debug!(error = %e, host = %self.host, "idle connection failed, reconnecting");
                    sender = self.connect().await?;
                    sender
                        .send_request(self.build(request, &uri)?)
                        .await
                        .map_err(|e| self.send_error(e))?
                }
                Err(e) => return Err(self.send_error(e)),
            };
            let ttfb = self
                .settings
                .time_authority
                .now()
                .duration_since(started)
                .unwrap_or_default();

            if !request.dont_pipeline() {
                self.checkin(sender);
            }

            let (parts, body) = resp.into_parts();
            let reason = parts
                .extensions
                .get::<hyper::ext::ReasonPhrase>()
                .and_then(|r| std::str::from_utf8(r.as_bytes()).ok())
                .or_else(|| parts.status.canonical_reason())
                .unwrap_or_default()
                .to_string();

            Ok(Response::new(parts.status, uri)
                .with_reason(&reason)
                .with_version(parts.version)
                .with_headers(parts.headers)
                .with_body(ResponseBody::new(body))
                .with_ttfb(ttfb))
        })
    }

    fn derive(&self, target: &Url, proxy: ProxyChoice) -> Result<Arc<dyn Connection>, NetError> {
        let mut conn = HttpConnection::new(target)?.with_settings(self.settings.clone());
        conn.proxy = match proxy {
            ProxyChoice::Inherit => self.proxy.clone(),
            ProxyChoice::Use(proxy) => Some(proxy),
        };
        Ok(Arc::new(conn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_rejects_https() {
        let err = HttpConnection::new(&url("https://example.com/")).unwrap_err();
        assert_eq!(err, NetError::DisallowedUrlScheme("https".into()));
    }

    #[test]
    fn test_origin_form_and_host_header() {
        let conn = Arc::new(HttpConnection::new(&url("http://example.com:8080/")).unwrap());
        let req = Request::new(conn.clone(), Method::GET, "/a?b=1");
        let built = conn.build(&req, &req.absolute_uri().unwrap()).unwrap();
        assert_eq!(built.uri(), "/a?b=1");
        assert_eq!(built.headers()[HOST], "example.com:8080");
    }

    #[test]
    fn test_absolute_form_through_proxy() {
        let proxy = ProxySettings::from_host_port("proxy.local", 3128).unwrap();
        let conn = Arc::new(HttpConnection::new(&url("http://example.com/")).unwrap().with_proxy(proxy));
        let req = Request::new(conn.clone(), Method::GET, "/a");
        let built = conn.build(&req, &req.absolute_uri().unwrap()).unwrap();
        assert_eq!(built.uri(), "http://example.com/a");
        assert_eq!(built.headers()[HOST], "example.com");
    }

    #[test]
    fn test_derive_carries_settings_and_proxy() {
        let settings = ConnectionSettings {
            verify_tls: false,
            ..Default::default()
        };
        let proxy = ProxySettings::from_host_port("proxy.local", 3128).unwrap();
        let conn = HttpConnection::new(&url("http://a/"))
            .unwrap()
            .with_settings(settings)
            .with_proxy(proxy);

        let derived = conn.derive(&url("http://b:81/"), ProxyChoice::Inherit).unwrap();
        assert_eq!(derived.host(), "b");
        assert_eq!(derived.port(), 81);
        assert!(!derived.settings().verify_tls);
        assert_eq!(derived.proxy_key().as_deref(), Some("proxy.local:3128"));
    }
}
