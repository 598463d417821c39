//! The mutable request handed through the module pipeline.
//!
//! Modules may rewrite headers, the target, the method, the body and even
//! the connection in place. A read-only view is simply `&Request`.

use crate::base::neterror::NetError;
use crate::http::connection::Connection;
use crate::http::orderedheaders::OrderedHeaders;
use crate::http::requestbody::{RequestBody, StreamBody};
use http::Method;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use url::Url;

/// Cancels an exchange from another task or thread.
///
/// Aborting is a flag: the pipeline checks it before every module call and
/// skips the remaining modules, but a module call already running is not
/// interrupted.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    connection: Arc<dyn Connection>,
    method: Method,
    target: String,
    headers: OrderedHeaders,
    body: RequestBody,
    allow_ui: bool,
    num_retries: u32,
    dont_pipeline: bool,
    abort: AbortHandle,
    internal_subrequest: bool,
}

impl Request {
    pub fn new(connection: Arc<dyn Connection>, method: Method, target: &str) -> Self {
        let target = normalize_target(&method, target);
        Self {
            connection,
            method,
            target,
            headers: OrderedHeaders::new(),
            body: RequestBody::Empty,
            allow_ui: true,
            num_retries: 0,
            dont_pipeline: false,
            abort: AbortHandle::default(),
            internal_subrequest: false,
        }
    }

    pub fn with_headers(mut self, headers: OrderedHeaders) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = body.into();
        self
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    pub fn set_connection(&mut self, connection: Arc<dyn Connection>) {
        self.connection = connection;
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    /// Request-URI as sent on the request line.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn set_target(&mut self, target: &str) {
        self.target = normalize_target(&self.method, target);
    }

    pub fn headers(&self) -> &OrderedHeaders {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut OrderedHeaders {
        &mut self.headers
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    pub fn set_body(&mut self, body: RequestBody) {
        self.body = body;
    }

    /// The output stream, if the entity is streamed.
    pub fn stream(&self) -> Option<&StreamBody> {
        self.body.stream()
    }

    /// May modules prompt the user?
    pub fn allow_ui(&self) -> bool {
        self.allow_ui
    }

    pub fn set_allow_ui(&mut self, allow_ui: bool) {
        self.allow_ui = allow_ui;
    }

    /// Module-driven resends so far.
    pub fn num_retries(&self) -> u32 {
        self.num_retries
    }

    pub(crate) fn record_retry(&mut self) {
        self.num_retries += 1;
    }

    pub fn dont_pipeline(&self) -> bool {
        self.dont_pipeline
    }

    pub fn set_dont_pipeline(&mut self, dont_pipeline: bool) {
        self.dont_pipeline = dont_pipeline;
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_aborted()
    }

    pub fn is_internal_subrequest(&self) -> bool {
        self.internal_subrequest
    }

    pub fn set_internal_subrequest(&mut self, internal: bool) {
        self.internal_subrequest = internal;
    }

    /// Replace everything with a previously saved copy.
    pub fn copy_from(&mut self, saved: Request) {
        *self = saved;
    }

    /// The absolute URI this request addresses, without fragment.
    pub fn absolute_uri(&self) -> Result<Url, NetError> {
        if is_absolute(&self.target) {
            let mut url = Url::parse(&self.target).map_err(|_| NetError::InvalidUrl)?;
            url.set_fragment(None);
            return Ok(url);
        }

        let mut url = self.connection.base_url()?;
        if self.target == "*" {
            return Ok(url);
        }

        let target = self.target.split('#').next().unwrap_or("/");
        match target.split_once('?') {
            Some((path, query)) => {
                url.set_path(path);
                url.set_query(Some(query));
            }
            None => url.set_path(target),
        }
        Ok(url)
    }
}

/// Normalize a request target: empty becomes `/`, and a leading `/` is
/// added unless the target is absolute, `*`, or this is a CONNECT.
pub fn normalize_target(method: &Method, target: &str) -> String {
    let target = target.trim();
    if target.is_empty() {
        return "/".to_string();
    }
    if target.starts_with('/') || target == "*" || *method == Method::CONNECT || is_absolute(target)
    {
        target.to_string()
    } else {
        format!("/{}", target)
    }
}

/// A scheme is present if a `:` comes before any of `/?#`.
fn is_absolute(target: &str) -> bool {
    target
        .chars()
        .find(|c| matches!(c, ':' | '/' | '?' | '#'))
        .is_some_and(|c| c == ':')
}

/// `path[?query]` of a URL.
pub fn path_and_query(url: &Url) -> String {
    match url.query() {
        Some(q) => format!("{}?{}", url.path(), q),
        None => url.path().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::streamfactory::HttpConnection;

    fn conn(url: &str) -> Arc<dyn Connection> {
        Arc::new(HttpConnection::new(&Url::parse(url).unwrap()).unwrap())
    }

    #[test]
    fn test_target_normalization() {
        assert_eq!(normalize_target(&Method::GET, ""), "/");
        assert_eq!(normalize_target(&Method::GET, "  "), "/");
        assert_eq!(normalize_target(&Method::GET, "index.html"), "/index.html");
        assert_eq!(normalize_target(&Method::GET, "/a?b"), "/a?b");
        assert_eq!(normalize_target(&Method::OPTIONS, "*"), "*");
        assert_eq!(
            normalize_target(&Method::GET, "http://h/x"),
            "http://h/x"
        );
        assert_eq!(normalize_target(&Method::CONNECT, "h:443"), "h:443");
    }

    #[test]
    fn test_absolute_uri_from_connection() {
        let req = Request::new(conn("http://host:1234/"), Method::GET, "/old/path?q=1#frag");
        assert_eq!(
            req.absolute_uri().unwrap().as_str(),
            "http://host:1234/old/path?q=1"
        );
    }

    #[test]
    fn test_absolute_uri_from_absolute_target() {
        let req = Request::new(conn("http://proxy/"), Method::GET, "http://origin:8080/x");
        assert_eq!(req.absolute_uri().unwrap().as_str(), "http://origin:8080/x");
    }

    #[test]
    fn test_clone_deep_copies_headers() {
        let mut req = Request::new(conn("http://h/"), Method::GET, "/");
        req.headers_mut().set("X-A", "1").unwrap();
        let saved = req.clone();
        req.headers_mut().set("X-A", "2").unwrap();
        assert_eq!(saved.headers().get("X-A"), Some("1"));
    }

    #[test]
    fn test_abort_shared_between_clones() {
        let req = Request::new(conn("http://h/"), Method::GET, "/");
        let handle = req.abort_handle();
        let copy = req.clone();
        handle.abort();
        assert!(req.is_aborted());
        assert!(copy.is_aborted());
    }

    #[test]
    fn test_path_and_query() {
        let url = Url::parse("http://h/p?q").unwrap();
        assert_eq!(path_and_query(&url), "/p?q");
    }
}
