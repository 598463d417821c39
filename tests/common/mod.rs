//! Shared helpers for integration tests.

#![allow(dead_code)]

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use modulenet::http::connection::{Connection, ConnectionSettings, Dispatching, ProxyChoice};
use modulenet::http::orderedheaders::OrderedHeaders;
use modulenet::http::request::Request;
use modulenet::http::response::Response;
use modulenet::http::responsebody::{Prebuffered, ResponseBody};
use modulenet::socket::proxy::ProxySettings;
use modulenet::NetError;
use std::fmt;
use std::sync::{Arc, Mutex, Once};
use url::Url;

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// One request as the scripted transport saw it.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub method: Method,
    pub uri: Url,
    pub headers: OrderedHeaders,
    pub body: Bytes,
    pub proxy: Option<String>,
}

impl Exchange {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }
}

/// Canned response.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub trailers: Option<HeaderMap>,
}

impl Reply {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
            trailers: None,
        }
    }

    pub fn ok(body: &'static str) -> Self {
        Self::new(200).body(body)
    }

    pub fn redirect(status: u16, location: &str) -> Self {
        Self::new(status).header("Location", location)
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: &'static str) -> Self {
        self.body = Bytes::from_static(body.as_bytes());
        self
    }

    pub fn trailer(mut self, name: &'static str, value: &'static str) -> Self {
        self.trailers
            .get_or_insert_with(HeaderMap::new)
            .insert(HeaderName::from_static(name), HeaderValue::from_static(value));
        self
    }
}

type Handler = dyn Fn(&Exchange) -> Reply + Send + Sync;

/// Server behavior shared by a connection and everything derived from it.
pub struct Script {
    handler: Box<Handler>,
    log: Mutex<Vec<Exchange>>,
}

impl Script {
    pub fn new(handler: impl Fn(&Exchange) -> Reply + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            log: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.log.lock().unwrap().len()
    }

    pub fn exchanges(&self) -> Vec<Exchange> {
        self.log.lock().unwrap().clone()
    }

    pub fn last(&self) -> Exchange {
        self.log.lock().unwrap().last().cloned().unwrap()
    }

    /// Paths requested so far, in order.
    pub fn paths(&self) -> Vec<String> {
        self.exchanges().iter().map(|e| e.uri.path().to_string()).collect()
    }
}

pub struct ScriptedConnection {
    scheme: String,
    host: String,
    port: u16,
    proxy: Option<ProxySettings>,
    settings: ConnectionSettings,
    script: Arc<Script>,
}

impl fmt::Debug for ScriptedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedConnection")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

impl ScriptedConnection {
    pub fn new(url: &str, script: &Arc<Script>) -> Arc<dyn Connection> {
        Arc::new(Self::build(&Url::parse(url).unwrap(), script))
    }

    pub fn with_proxy(url: &str, proxy: ProxySettings, script: &Arc<Script>) -> Arc<dyn Connection> {
        let mut conn = Self::build(&Url::parse(url).unwrap(), script);
        conn.proxy = Some(proxy);
        Arc::new(conn)
    }

    fn build(url: &Url, script: &Arc<Script>) -> Self {
        Self {
            scheme: url.scheme().to_string(),
            host: url.host_str().unwrap_or_default().to_string(),
            port: url.port_or_known_default().unwrap_or(80),
            proxy: None,
            settings: ConnectionSettings::default(),
            script: Arc::clone(script),
        }
    }
}

impl Connection for ScriptedConnection {
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
            let exchange = Exchange {
                method: request.method().clone(),
                uri: uri.clone(),
                headers: request.headers().clone(),
                body: request.body().to_bytes(),
                proxy: self.proxy_key(),
            };
            let reply = (self.script.handler)(&exchange);
            self.script.log.lock().unwrap().push(exchange);

            let mut headers = HeaderMap::new();
            for (name, value) in &reply.headers {
                let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| NetError::InvalidHeader)?;
                let value = HeaderValue::from_str(value).map_err(|_| NetError::InvalidHeader)?;
                headers.append(name, value);
            }
            let status = StatusCode::from_u16(reply.status).map_err(|_| NetError::InvalidResponse)?;
            let body = ResponseBody::from_source(Prebuffered {
                data: reply.body,
                trailers: reply.trailers,
            });
            Ok(Response::new(status, uri).with_headers(headers).with_body(body))
        })
    }

    fn derive(&self, target: &Url, proxy: ProxyChoice) -> Result<Arc<dyn Connection>, NetError> {
        let mut conn = Self::build(target, &self.script);
        conn.settings = self.settings.clone();
        conn.proxy = match proxy {
            ProxyChoice::Inherit => self.proxy.clone(),
            ProxyChoice::Use(proxy) => Some(proxy),
        };
        Ok(Arc::new(conn))
    }
}

/// GET request for `url` on a scripted connection.
pub fn get(url: &str, script: &Arc<Script>) -> Request {
    request(Method::GET, url, script)
}

pub fn request(method: Method, url: &str, script: &Arc<Script>) -> Request {
    let parsed = Url::parse(url).unwrap();
    let target = match parsed.query() {
        Some(q) => format!("{}?{}", parsed.path(), q),
        None => parsed.path().to_string(),
    };
    Request::new(ScriptedConnection::new(url, script), method, &target)
}
