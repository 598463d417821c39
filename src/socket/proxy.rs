use crate::base::neterror::NetError;
use url::Url;
use zeroize::Zeroizing;

/// Forward proxy configuration.
#[derive(Debug, Clone)]
pub struct ProxySettings {
    /// Proxy URL (e.g., `http://proxy.com:8080`)
    pub url: Url,
    /// Proxy username for authentication
    pub username: Option<String>,
    /// Proxy password (zeroized on drop)
    pub password: Option<Zeroizing<String>>,
}

impl ProxySettings {
    /// Create proxy settings from URL string.
    pub fn new(url_str: &str) -> Option<Self> {
        let url = Url::parse(url_str).ok()?;
        url.host_str()?;
        Some(Self {
            url,
            username: None,
            password: None,
        })
    }

    /// Proxy reached over plain HTTP at `host:port`.
    pub fn from_host_port(host: &str, port: u16) -> Result<Self, NetError> {
        let url = Url::parse(&format!("http://{}:{}", host, port))
            .map_err(|_| NetError::InvalidUrl)?;
        Ok(Self {
            url,
            username: None,
            password: None,
        })
    }

    /// Create proxy from environment variables.
    ///
    /// Checks `HTTP_PROXY`/`http_proxy`.
    pub fn from_env() -> Option<Self> {
        let url_str = std::env::var("HTTP_PROXY")
            .or_else(|_| std::env::var("http_proxy"))
            .ok()?;
        Self::new(&url_str)
    }

    /// Add authentication credentials.
    pub fn with_auth(mut self, user: &str, pass: &str) -> Self {
        self.username = Some(user.to_string());
        self.password = Some(Zeroizing::new(pass.to_string()));
        self
    }

    /// Check if this proxy carries credentials.
    pub fn requires_auth(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    /// Get proxy host and port.
    pub fn host_port(&self) -> Option<(&str, u16)> {
        let host = self.url.host_str()?;
        let port = self.url.port_or_known_default().unwrap_or(80);
        Some((host, port))
    }

    /// `host:port`, lowercased.
    pub fn authority_key(&self) -> Option<String> {
        self.host_port()
            .map(|(h, p)| format!("{}:{}", h.to_ascii_lowercase(), p))
    }
}
