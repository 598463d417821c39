//! HTTP responses: the in-flight [`Response`] that modules inspect and the
//! finalized [`HttpResponse`] handed to the caller.

use crate::base::neterror::NetError;
use crate::http::module::Module;
use crate::http::request::Request;
use crate::http::responsebody::ResponseBody;
use crate::urlrequest::context::ClientContext;
use bytes::Bytes;
use http::{HeaderMap, StatusCode, Version};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// A response while the pipeline is still working on it.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    reason: String,
    version: Version,
    headers: HeaderMap,
    trailers: Option<HeaderMap>,
    original_uri: Url,
    effective_uri: Option<Url>,
    body: ResponseBody,
    retry_request: bool,
    ttfb: Option<Duration>,
}

impl Response {
    pub fn new(status: StatusCode, original_uri: Url) -> Self {
        Self {
            status,
            reason: status.canonical_reason().unwrap_or("").to_string(),
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            trailers: None,
            original_uri,
            effective_uri: None,
            body: ResponseBody::Empty,
            retry_request: false,
            ttfb: None,
        }
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = reason.to_string();
        self
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<ResponseBody>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_ttfb(mut self, ttfb: Duration) -> Self {
        self.ttfb = Some(ttfb);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// First value of `name` as text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Trailers, if the transport already received them.
    pub fn trailers(&self) -> Option<&HeaderMap> {
        self.trailers.as_ref()
    }

    pub fn set_trailers(&mut self, trailers: HeaderMap) {
        self.trailers = Some(trailers);
    }

    /// The URI this response was dispatched to.
    pub fn original_uri(&self) -> &Url {
        &self.original_uri
    }

    /// Where the data came from; the dispatched URI unless a redirect
    /// module stamped another one.
    pub fn effective_uri(&self) -> &Url {
        self.effective_uri.as_ref().unwrap_or(&self.original_uri)
    }

    pub fn set_effective_uri(&mut self, uri: Url) {
        self.effective_uri = Some(uri);
    }

    /// Set by a module that deferred a resend to the caller.
    pub fn retry_request(&self) -> bool {
        self.retry_request
    }

    pub fn set_retry_request(&mut self, retry: bool) {
        self.retry_request = retry;
    }

    pub fn body_mut(&mut self) -> &mut ResponseBody {
        &mut self.body
    }

    pub fn close_body(&mut self) {
        self.body.close();
    }

    pub fn time_to_first_byte(&self) -> Option<Duration> {
        self.ttfb
    }

    /// Status and headers, kept for replaying a challenge later.
    pub fn head(&self) -> ResponseHead {
        ResponseHead {
            status: self.status,
            headers: self.headers.clone(),
            uri: self.effective_uri().clone(),
        }
    }

    pub(crate) fn finalize(self, hooks: Option<TrailerHooks>) -> HttpResponse {
        let effective_uri = Some(self.effective_uri().clone());
        HttpResponse {
            status: self.status,
            reason: self.reason,
            version: self.version,
            headers: self.headers,
            original_uri: self.original_uri,
            effective_uri,
            body: Some(self.body),
            buffered: None,
            trailers: self.trailers,
            retry_request: self.retry_request,
            ttfb: self.ttfb,
            hooks,
            pending: None,
        }
    }
}

/// The parts of a response a challenge handler needs.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub uri: Url,
}

impl ResponseHead {
    /// All values of `name`, joined with `, `.
    pub fn joined(&self, name: &str) -> Option<String> {
        let values: Vec<&str> = self
            .headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.join(", "))
        }
    }
}

/// Modules whose trailer handlers still have to run once the caller has
/// read the body.
pub(crate) struct TrailerHooks {
    pub(crate) modules: Vec<Box<dyn Module>>,
    pub(crate) request: Request,
    pub(crate) context: Arc<ClientContext>,
}

impl TrailerHooks {
    fn run(mut self, trailers: &HeaderMap) -> Result<(), NetError> {
        for module in self.modules.iter_mut() {
            module.trailer_handler(trailers, &self.request, &self.context)?;
        }
        Ok(())
    }
}

/// HTTP Response with accessible body.
/// This is the user-facing response type that owns the body.
pub struct HttpResponse {
    status: StatusCode,
    reason: String,
    version: Version,
    headers: HeaderMap,
    original_uri: Url,
    effective_uri: Option<Url>,
    body: Option<ResponseBody>,
    buffered: Option<Bytes>,
    trailers: Option<HeaderMap>,
    retry_request: bool,
    ttfb: Option<Duration>,
    hooks: Option<TrailerHooks>,
    pending: Option<Request>,
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("version", &self.version)
            .field("original_uri", &self.original_uri.as_str())
            .field("effective_uri", &self.effective_uri().as_str())
            .field("retry_request", &self.retry_request)
            .finish_non_exhaustive()
    }
}

impl HttpResponse {
    /// Get the status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Get the HTTP version.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Get a reference to the headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The URI the caller asked for, before any module rewrote it.
    pub fn original_uri(&self) -> &Url {
        &self.original_uri
    }

    pub fn effective_uri(&self) -> &Url {
        self.effective_uri.as_ref().unwrap_or(&self.original_uri)
    }

    /// A module asked the caller to resend the request (deferred retry).
    pub fn retry_request(&self) -> bool {
        self.retry_request
    }

    pub fn time_to_first_byte(&self) -> Option<Duration> {
        self.ttfb
    }

    /// Trailers; only known after the body was read.
    pub fn trailers(&self) -> Option<&HeaderMap> {
        self.trailers.as_ref()
    }

    /// Request a module wants sent next, for internal subrequests.
    pub fn take_pending_request(&mut self) -> Option<Request> {
        self.pending.take()
    }

    pub(crate) fn with_original_uri(mut self, uri: Url) -> Self {
        self.original_uri = uri;
        self
    }

    pub(crate) fn with_pending_request(mut self, request: Request) -> Self {
        self.pending = Some(request);
        self
    }

    /// Take the response body for consumption.
    /// Can only be called once - subsequent calls return None.
    pub fn take_body(&mut self) -> Option<ResponseBody> {
        self.body.take()
    }

    /// Read the body. The first call drains the stream and runs trailer
    /// handlers; later calls return the same bytes.
    pub async fn bytes(&mut self) -> Result<Bytes, NetError> {
        if let Some(buffered) = &self.buffered {
            return Ok(buffered.clone());
        }
        let body = self.body.take().ok_or(NetError::HttpBodyError)?;
        let (data, trailers) = body.collect().await?;
        if trailers.is_some() {
            self.trailers = trailers;
        }
        self.buffered = Some(data.clone());

        let hooks = self.hooks.take();
        if let (Some(hooks), Some(trailers)) = (hooks, self.trailers.as_ref()) {
            hooks.run(trailers)?;
        }
        Ok(data)
    }

    /// Convenience method to consume body as text.
    pub async fn text(&mut self) -> Result<String, NetError> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(|_| NetError::InvalidUtf8)
    }

    /// Convenience method to consume body as JSON.
    #[cfg(feature = "json")]
    pub async fn json<T: serde::de::DeserializeOwned>(&mut self) -> Result<T, NetError> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|_| NetError::JsonParseError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::responsebody::Prebuffered;

    fn uri() -> Url {
        Url::parse("http://example.com/a").unwrap()
    }

    #[test]
    fn test_effective_uri_defaults_to_original() {
        let mut resp = Response::new(StatusCode::OK, uri());
        assert_eq!(resp.effective_uri(), &uri());
        let moved = Url::parse("http://example.com/b").unwrap();
        resp.set_effective_uri(moved.clone());
        assert_eq!(resp.effective_uri(), &moved);
        assert_eq!(resp.original_uri(), &uri());
    }

    #[test]
    fn test_head_joins_repeated_headers() {
        let mut headers = HeaderMap::new();
        headers.append("www-authenticate", "Basic realm=\"x\"".parse().unwrap());
        headers.append("www-authenticate", "Digest realm=\"y\", nonce=\"n\"".parse().unwrap());
        let resp = Response::new(StatusCode::UNAUTHORIZED, uri())
            .with_headers(headers)
            .with_body("secret page");
        let head = resp.head();
        assert_eq!(head.status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            head.joined("WWW-Authenticate").as_deref(),
            Some("Basic realm=\"x\", Digest realm=\"y\", nonce=\"n\"")
        );
        assert!(head.joined("Proxy-Authenticate").is_none());
    }

    #[tokio::test]
    async fn test_bytes_cached_and_trailers_exposed() {
        let mut trailers = HeaderMap::new();
        trailers.insert("x-done", "1".parse().unwrap());
        let mut resp = Response::new(StatusCode::OK, uri())
            .with_body(ResponseBody::from_source(Prebuffered {
                data: Bytes::from_static(b"hello"),
                trailers: Some(trailers),
            }))
            .finalize(None);

        assert!(resp.trailers().is_none());
        assert_eq!(resp.text().await.unwrap(), "hello");
        assert_eq!(resp.trailers().unwrap()["x-done"], "1");
        assert_eq!(resp.bytes().await.unwrap(), Bytes::from_static(b"hello"));
    }

    #[test]
    fn test_finalize_keeps_dispatched_uri_as_effective() {
        let dispatched = Url::parse("http://h/b").unwrap();
        let resp = Response::new(StatusCode::OK, dispatched.clone())
            .finalize(None)
            .with_original_uri(uri());
        assert_eq!(resp.original_uri(), &uri());
        assert_eq!(resp.effective_uri(), &dispatched);
    }

    #[tokio::test]
    async fn test_taken_body_is_gone() {
        let mut resp = Response::new(StatusCode::OK, uri())
            .with_body("x")
            .finalize(None);
        assert!(resp.take_body().is_some());
        assert_eq!(resp.bytes().await, Err(NetError::HttpBodyError));
    }
}
