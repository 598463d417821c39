//! HTTP Client with builder pattern.
//!
//! Provides a high-level API on top of the module pipeline: every request
//! made through one [`Client`] shares its [`ClientContext`], so credentials,
//! permanent redirects and deferred retries carry over between requests.
//!
//! # Example
//!
//! ```rust,ignore
//! use modulenet::Client;
//!
//! let client = Client::builder().max_redirects(5).build();
//! client.add_basic_auth("example.com", 80, "staff", "alice", "secret");
//!
//! let mut resp = client.get("http://example.com/private")
//!     .send()
//!     .await?;
//! println!("{} from {}", resp.status(), resp.effective_uri());
//! ```

use crate::base::neterror::NetError;
use crate::http::authhandler::AuthHandler;
use crate::http::connection::{Connection, ConnectionSettings};
use crate::http::orderedheaders::OrderedHeaders;
use crate::http::request::{path_and_query, Request};
use crate::http::requestbody::{RequestBody, StreamBody};
use crate::http::response::HttpResponse;
use crate::http::streamfactory::HttpConnection;
use crate::http::transaction::Pipeline;
use crate::socket::authcache::{AuthPrompter, Credential};
use crate::socket::proxy::ProxySettings;
use crate::urlrequest::context::{ClientContext, ClientContextConfig};
use dashmap::DashMap;
use http::Method;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// HTTP Client for making requests.
///
/// Use [`Client::builder()`] to configure and create a client. Cloning is
/// cheap; clones share the context and the idle connections.
#[derive(Clone, Debug)]
pub struct Client {
    context: Arc<ClientContext>,
    pipeline: Pipeline,
    proxy: Option<ProxySettings>,
    settings: ConnectionSettings,
    timeout: Option<Duration>,
    connections: Arc<DashMap<String, Arc<dyn Connection>>>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// Create a new client with default settings.
    pub fn new() -> Self {
        ClientBuilder::default().build()
    }

    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    pub fn context(&self) -> &Arc<ClientContext> {
        &self.context
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Register a Basic credential for `realm` on `host:port`.
    pub fn add_basic_auth(&self, host: &str, port: u16, realm: &str, user: &str, pass: &str) {
        self.context.auth_cache().add_basic(host, port, realm, user, pass);
    }

    /// Register a Digest credential for `realm` on `host:port`.
    pub fn add_digest_auth(&self, host: &str, port: u16, realm: &str, user: &str, pass: &str) {
        self.context.auth_cache().add_digest(host, port, realm, user, pass);
    }

    /// Start building a GET request.
    pub fn get<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    /// Start building a POST request.
    pub fn post<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    /// Start building a PUT request.
    pub fn put<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::PUT, url)
    }

    /// Start building a DELETE request.
    pub fn delete<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::DELETE, url)
    }

    /// Start building a HEAD request.
    pub fn head<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::HEAD, url)
    }

    /// Start building a request with custom method.
    pub fn request<U: AsRef<str>>(&self, method: Method, url: U) -> RequestBuilder {
        RequestBuilder {
            client: self.clone(),
            method,
            url: url.as_ref().to_string(),
            headers: OrderedHeaders::new(),
            header_error: None,
            body: RequestBody::Empty,
            allow_ui: None,
            dont_pipeline: false,
        }
    }

    /// Connection for the origin of `url`, shared between requests.
    pub fn connection_for(&self, url: &Url) -> Result<Arc<dyn Connection>, NetError> {
        let origin = url.origin().ascii_serialization();
        if let Some(conn) = self.connections.get(&origin) {
            return Ok(Arc::clone(conn.value()));
        }

        let mut conn = HttpConnection::new(url)?.with_settings(self.settings.clone());
        if let Some(proxy) = &self.proxy {
            conn = conn.with_proxy(proxy.clone());
        }
        let conn: Arc<dyn Connection> = Arc::new(conn);
        self.connections.insert(origin, Arc::clone(&conn));
        Ok(conn)
    }

    /// Run a prepared request through the pipeline.
    pub async fn execute(&self, request: Request) -> Result<HttpResponse, NetError> {
        let processing = self.pipeline.process(request, &self.context);
        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, processing)
                .await
                .map_err(|_| NetError::ConnectionTimedOut)?,
            None => processing.await,
        }
    }
}

/// Builder for creating a [`Client`].
#[derive(Default)]
pub struct ClientBuilder {
    config: ClientContextConfig,
    context: Option<Arc<ClientContext>>,
    pipeline: Option<Pipeline>,
    proxy: Option<ProxySettings>,
    settings: ConnectionSettings,
    prompter: Option<Arc<dyn AuthPrompter>>,
    auth_handler: Option<Arc<dyn AuthHandler>>,
    timeout: Option<Duration>,
}

impl ClientBuilder {
    /// Replace the whole context configuration.
    pub fn config(mut self, config: ClientContextConfig) -> Self {
        self.config = config;
        self
    }

    /// Park module state for streamed bodies instead of leaving
    /// redirects and challenges unhandled.
    pub fn defer_streamed(mut self, defer: bool) -> Self {
        self.config.defer_streamed = defer;
        self
    }

    pub fn max_redirects(mut self, max: u32) -> Self {
        self.config.max_redirects = max;
        self
    }

    /// Allow modules to prompt for credentials.
    pub fn allow_ui(mut self, allow: bool) -> Self {
        self.config.allow_ui = allow;
        self
    }

    /// Share an existing context instead of creating one. Context-related
    /// builder options are then ignored.
    pub fn context(mut self, context: Arc<ClientContext>) -> Self {
        self.context = Some(context);
        self
    }

    /// Set the module pipeline (defaults to redirection + authorization).
    pub fn pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Set proxy. Credentials given via [`ProxySettings::with_auth`] are
    /// sent preemptively.
    pub fn proxy(mut self, proxy: ProxySettings) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Transport policy for every connection of this client.
    pub fn connection_settings(mut self, settings: ConnectionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn prompter(mut self, prompter: Arc<dyn AuthPrompter>) -> Self {
        self.prompter = Some(prompter);
        self
    }

    pub fn auth_handler(mut self, handler: Arc<dyn AuthHandler>) -> Self {
        self.auth_handler = Some(handler);
        self
    }

    /// Set request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the client.
    pub fn build(self) -> Client {
        let context = self.context.unwrap_or_else(|| {
            let mut context = ClientContext::with_config(self.config);
            if let Some(handler) = self.auth_handler {
                context = context.with_auth_handler(handler);
            }
            if let Some(prompter) = self.prompter {
                context = context.with_prompter(prompter);
            }
            Arc::new(context)
        });

        if let Some(proxy) = &self.proxy {
            if let (Some((host, port)), Some(key), Some(user), Some(pass)) = (
                proxy.host_port(),
                proxy.authority_key(),
                proxy.username.as_deref(),
                proxy.password.as_deref(),
            ) {
                context
                    .proxy_auth()
                    .insert(&key, Credential::basic(host, port, "", user, pass));
            }
        }

        Client {
            context,
            pipeline: self.pipeline.unwrap_or_default(),
            proxy: self.proxy,
            settings: self.settings,
            timeout: self.timeout,
            connections: Arc::new(DashMap::new()),
        }
    }
}

/// Builder for a single request.
pub struct RequestBuilder {
    client: Client,
    method: Method,
    url: String,
    headers: OrderedHeaders,
    header_error: Option<NetError>,
    body: RequestBody,
    allow_ui: Option<bool>,
    dont_pipeline: bool,
}

impl RequestBuilder {
    /// Add a header. Invalid names or values fail the request on send.
    pub fn header<K: AsRef<str>, V: AsRef<str>>(mut self, key: K, value: V) -> Self {
        if let Err(e) = self.headers.append(key.as_ref(), value.as_ref()) {
            self.header_error.get_or_insert(e);
        }
        self
    }

    /// Set request body.
    pub fn body<B: Into<RequestBody>>(mut self, body: B) -> Self {
        self.body = body.into();
        self
    }

    /// Set JSON body.
    #[cfg(feature = "json")]
    pub fn json<T: serde::Serialize>(mut self, json: &T) -> Self {
        match serde_json::to_vec(json) {
            Ok(bytes) => {
                self.body = RequestBody::from(bytes);
                if let Err(e) = self.headers.set("Content-Type", "application/json") {
                    self.header_error.get_or_insert(e);
                }
            }
            Err(_) => {
                self.header_error.get_or_insert(NetError::HttpBodyError);
            }
        }
        self
    }

    /// Send the body from an output stream. Redirects and challenges on
    /// such requests are only handled when the client defers them.
    pub fn stream_body(mut self, stream: StreamBody) -> Self {
        self.body = RequestBody::Stream(stream);
        self
    }

    /// Allow or forbid credential prompting for this request.
    pub fn allow_ui(mut self, allow: bool) -> Self {
        self.allow_ui = Some(allow);
        self
    }

    /// Always open a fresh connection.
    pub fn dont_pipeline(mut self, dont_pipeline: bool) -> Self {
        self.dont_pipeline = dont_pipeline;
        self
    }

    /// Build the request without sending it.
    pub fn build(self) -> Result<(Client, Request), NetError> {
        if let Some(e) = self.header_error {
            return Err(e);
        }
        let url = Url::parse(&self.url).map_err(|_| NetError::InvalidUrl)?;
        let connection = self.client.connection_for(&url)?;

        let mut request = Request::new(connection, self.method, &path_and_query(&url))
            .with_headers(self.headers)
            .with_body(self.body);
        let allow_ui = self
            .allow_ui
            .unwrap_or(self.client.context.config().allow_ui);
        request.set_allow_ui(allow_ui);
        request.set_dont_pipeline(self.dont_pipeline);
        Ok((self.client, request))
    }

    /// Send the request.
    pub async fn send(self) -> Result<HttpResponse, NetError> {
        let (client, request) = self.build()?;
        client.execute(request).await
    }
}
