//! HTTP Authentication Cache for proxy and server credentials.
//!
//! Caches authentication credentials to avoid re-prompting users.
//! Entries are keyed by host, port, realm and scheme; each entry also
//! remembers the paths it was accepted for so later requests below the
//! same directory can send it preemptively.

use crate::base::neterror::NetError;
use crate::http::challenge::Challenge;
use crate::http::digestauth::DigestAuthHandler;
use crate::http::request::Request;
use base64::{engine::general_purpose, Engine as _};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use zeroize::Zeroizing;

/// Authentication scheme.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AuthScheme {
    /// Basic authentication (base64 encoded)
    Basic,
    /// Digest authentication (challenge-response)
    Digest,
    /// Anything else; needs a custom [`AuthHandler`](crate::http::authhandler::AuthHandler).
    Other(String),
}

impl AuthScheme {
    pub fn parse(name: &str) -> Self {
        if name.eq_ignore_ascii_case("basic") {
            AuthScheme::Basic
        } else if name.eq_ignore_ascii_case("digest") {
            AuthScheme::Digest
        } else {
            AuthScheme::Other(name.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            AuthScheme::Basic => "Basic",
            AuthScheme::Digest => "Digest",
            AuthScheme::Other(name) => name,
        }
    }

    /// Case-insensitive scheme comparison.
    pub fn matches(&self, other: &AuthScheme) -> bool {
        self.as_str().eq_ignore_ascii_case(other.as_str())
    }
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A credential for one host, realm and scheme.
///
/// `Display` renders the header value to send.
#[derive(Clone)]
pub struct Credential {
    pub host: String,
    pub port: u16,
    pub scheme: AuthScheme,
    pub realm: String,
    pub username: String,
    password: Zeroizing<String>,
    /// Precomputed header value; takes precedence when rendering.
    pub token: Option<String>,
    /// Digest state (nonce, nonce count) for this credential.
    pub digest: Option<DigestAuthHandler>,
}

impl Credential {
    pub fn new(
        host: &str,
        port: u16,
        scheme: AuthScheme,
        realm: &str,
        username: &str,
        password: &str,
    ) -> Self {
        Self {
            host: host.to_ascii_lowercase(),
            port,
            scheme,
            realm: realm.to_string(),
            username: username.to_string(),
            password: Zeroizing::new(password.to_string()),
            token: None,
            digest: None,
        }
    }

    /// Create a new basic auth entry.
    pub fn basic(host: &str, port: u16, realm: &str, username: &str, password: &str) -> Self {
        Self::new(host, port, AuthScheme::Basic, realm, username, password)
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Same host, port, realm and scheme.
    pub fn same_slot(&self, other: &Credential) -> bool {
        self.host == other.host
            && self.port == other.port
            && self.realm == other.realm
            && self.scheme.matches(&other.scheme)
    }

    fn key(&self) -> String {
        cache_key(&self.host, self.port, &self.realm, &self.scheme)
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(token) = &self.token {
            return f.write_str(token);
        }
        match self.scheme {
            AuthScheme::Basic => {
                let creds = format!("{}:{}", self.username, self.password.as_str());
                let creds = Zeroizing::new(creds);
                write!(f, "Basic {}", general_purpose::STANDARD.encode(creds.as_bytes()))
            }
            _ => write!(
                f,
                "{} username=\"{}\", realm=\"{}\"",
                self.scheme, self.username, self.realm
            ),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("scheme", &self.scheme)
            .field("realm", &self.realm)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// Interactive source of credentials.
pub trait AuthPrompter: Send + Sync {
    /// Ask for a username and password; `None` declines.
    fn prompt(&self, challenge: &Challenge) -> Option<(String, String)>;
}

fn cache_key(host: &str, port: u16, realm: &str, scheme: &AuthScheme) -> String {
    format!(
        "{}:{}:{}:{}",
        host.to_ascii_lowercase(),
        port,
        scheme.as_str().to_ascii_lowercase(),
        realm
    )
}

#[derive(Debug, Clone)]
struct AuthEntry {
    credential: Credential,
    paths: Vec<String>,
}

/// Thread-safe authentication cache.
#[derive(Clone, Default)]
pub struct AuthCache {
    entries: Arc<DashMap<String, AuthEntry>>,
}

impl fmt::Debug for AuthCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthCache")
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl AuthCache {
    /// Create a new empty auth cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a credential, keeping any paths already learned for its slot.
    pub fn store(&self, credential: Credential) {
        match self.entries.entry(credential.key()) {
            Entry::Occupied(mut entry) => entry.get_mut().credential = credential,
            Entry::Vacant(entry) => {
                entry.insert(AuthEntry {
                    credential,
                    paths: Vec::new(),
                });
            }
        }
    }

    pub fn add_basic(&self, host: &str, port: u16, realm: &str, username: &str, password: &str) {
        self.store(Credential::basic(host, port, realm, username, password));
    }

    pub fn add_digest(&self, host: &str, port: u16, realm: &str, username: &str, password: &str) {
        self.store(Credential::new(
            host,
            port,
            AuthScheme::Digest,
            realm,
            username,
            password,
        ));
    }

    /// Lookup cached credentials for a host, realm and scheme.
    pub fn lookup(&self, host: &str, port: u16, realm: &str, scheme: &AuthScheme) -> Option<Credential> {
        self.entries
            .get(&cache_key(host, port, realm, scheme))
            .map(|e| e.credential.clone())
    }

    /// Credential for a challenge, if one is stored for its slot.
    pub fn get_authorization(&self, challenge: &Challenge) -> Option<Credential> {
        self.lookup(&challenge.host, challenge.port, &challenge.realm, &challenge.scheme)
    }

    /// Best credential to send preemptively: one learned for exactly this
    /// path, else the one whose learned directory is the longest prefix.
    pub fn find_best(&self, request: &Request) -> Option<Credential> {
        let uri = request.absolute_uri().ok()?;
        let host = uri.host_str()?.to_ascii_lowercase();
        let port = uri.port_or_known_default()?;
        let path = uri.path();

        let mut best: Option<(usize, Credential)> = None;
        for entry in self.entries.iter() {
            let cred = &entry.credential;
            if cred.host != host || cred.port != port {
                continue;
            }
            for learned in &entry.paths {
                if learned == path {
                    return Some(cred.clone());
                }
                let dir = match learned.rfind('/') {
                    Some(i) => &learned[..=i],
                    None => continue,
                };
                if path.starts_with(dir) && best.as_ref().map_or(true, |(len, _)| dir.len() > *len) {
                    best = Some((dir.len(), cred.clone()));
                }
            }
        }
        best.map(|(_, c)| c)
    }

    /// Ask the prompter for a credential matching `challenge`.
    ///
    /// Returns `Ok(None)` without a prompter or when the request forbids
    /// UI, and fails for schemes no built-in handler understands.
    pub fn query_prompter(
        &self,
        challenge: &Challenge,
        request: &Request,
        prompter: Option<&dyn AuthPrompter>,
    ) -> Result<Option<Credential>, NetError> {
        let Some(prompter) = prompter else {
            return Ok(None);
        };
        if let AuthScheme::Other(name) = &challenge.scheme {
            return Err(NetError::UnsupportedAuthScheme(name.clone()));
        }
        if !request.allow_ui() {
            return Ok(None);
        }

        let Some((username, password)) = prompter.prompt(challenge) else {
            tracing::debug!(challenge = %challenge, "prompt declined");
            return Ok(None);
        };
        let password = Zeroizing::new(password);
        let credential = Credential::new(
            &challenge.host,
            challenge.port,
            challenge.scheme.clone(),
            &challenge.realm,
            &username,
            &password,
        );
        self.store(credential.clone());
        Ok(Some(credential))
    }

    /// Forget the credential stored in `credential`'s slot.
    pub fn remove(&self, credential: &Credential) {
        self.entries.remove(&credential.key());
    }

    /// Record that `credential` was accepted for `path`, storing it if
    /// its slot is empty. Digest state travels with it.
    pub fn add_path(&self, credential: &Credential, path: &str) {
        let path = path.split(['?', '#']).next().unwrap_or(path);
        let mut entry = self
            .entries
            .entry(credential.key())
            .or_insert_with(|| AuthEntry {
                credential: credential.clone(),
                paths: Vec::new(),
            });
        if credential.digest.is_some() {
            entry.credential.digest = credential.digest.clone();
        }
        if !entry.paths.iter().any(|p| p == path) {
            entry.paths.push(path.to_string());
        }
    }

    /// Keep the digest state (nonce count) of a credential that was sent.
    pub fn update_digest(&self, credential: &Credential) {
        if let Some(mut entry) = self.entries.get_mut(&credential.key()) {
            if credential.digest.is_some() {
                entry.credential.digest = credential.digest.clone();
            }
        }
    }

    /// Apply a server-issued `nextnonce`.
    pub fn update_nonce(&self, credential: &Credential, nonce: &str) {
        if let Some(mut entry) = self.entries.get_mut(&credential.key()) {
            if let Some(digest) = entry.credential.digest.as_mut() {
                digest.set_nonce(nonce);
            }
        }
    }

    /// Paths learned for `credential`'s slot.
    pub fn paths(&self, credential: &Credential) -> Vec<String> {
        self.entries
            .get(&credential.key())
            .map(|e| e.paths.clone())
            .unwrap_or_default()
    }

    /// Clear all cached credentials.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Get number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Last credential that worked for each forward proxy, keyed by the
/// proxy's `host:port`.
#[derive(Clone, Default)]
pub struct ProxyAuthCache {
    entries: Arc<DashMap<String, Credential>>,
}

impl fmt::Debug for ProxyAuthCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyAuthCache")
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl ProxyAuthCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, proxy_key: &str) -> Option<Credential> {
        self.entries
            .get(&proxy_key.to_ascii_lowercase())
            .map(|c| c.clone())
    }

    pub fn insert(&self, proxy_key: &str, credential: Credential) {
        self.entries.insert(proxy_key.to_ascii_lowercase(), credential);
    }

    pub fn remove(&self, proxy_key: &str) -> Option<Credential> {
        self.entries
            .remove(&proxy_key.to_ascii_lowercase())
            .map(|(_, c)| c)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::challenge::parse_challenges;
    use crate::http::streamfactory::HttpConnection;
    use http::Method;
    use url::Url;

    fn request(url: &str) -> Request {
        let url = Url::parse(url).unwrap();
        let conn = Arc::new(HttpConnection::new(&url).unwrap());
        Request::new(conn, Method::GET, url.path())
    }

    #[test]
    fn test_store_and_lookup() {
        let cache = AuthCache::new();
        cache.add_basic("proxy.example.com", 8080, "MyRealm", "user", "pass");

        let found = cache
            .lookup("proxy.example.com", 8080, "MyRealm", &AuthScheme::Basic)
            .unwrap();
        assert_eq!(found.username, "user");
        assert_eq!(found.password(), "pass");
        assert!(cache
            .lookup("proxy.example.com", 8080, "MyRealm", &AuthScheme::Digest)
            .is_none());
    }

    #[test]
    fn test_case_insensitive_host() {
        let cache = AuthCache::new();
        cache.add_basic("Proxy.COM", 80, "Realm", "u", "p");

        assert!(cache.lookup("proxy.com", 80, "Realm", &AuthScheme::Basic).is_some());
        assert!(cache.lookup("PROXY.COM", 80, "Realm", &AuthScheme::Basic).is_some());
    }

    #[test]
    fn test_basic_header_value() {
        let cred = Credential::basic("h", 80, "Realm", "user", "pass");
        // base64("user:pass") = "dXNlcjpwYXNz"
        assert_eq!(cred.to_string(), "Basic dXNlcjpwYXNz");
    }

    #[test]
    fn test_debug_redacts_password() {
        let cred = Credential::basic("h", 80, "Realm", "user", "hunter2");
        let text = format!("{:?}", cred);
        assert!(text.contains("user"));
        assert!(!text.contains("hunter2"));
    }

    #[test]
    fn test_get_authorization_by_challenge() {
        let cache = AuthCache::new();
        cache.add_basic("example.com", 80, "R", "u", "p");
        let ch = parse_challenges(r#"Basic realm="R""#, "EXAMPLE.com", 80);
        assert_eq!(cache.get_authorization(&ch[0]).unwrap().username, "u");
        let other = parse_challenges(r#"Basic realm="Other""#, "example.com", 80);
        assert!(cache.get_authorization(&other[0]).is_none());
    }

    #[test]
    fn test_find_best_needs_learned_path() {
        let cache = AuthCache::new();
        cache.add_basic("example.com", 80, "R", "u", "p");
        assert!(cache.find_best(&request("http://example.com/docs/a.html")).is_none());

        let cred = cache.lookup("example.com", 80, "R", &AuthScheme::Basic).unwrap();
        cache.add_path(&cred, "/docs/a.html?x=1");
        assert_eq!(cache.paths(&cred), vec!["/docs/a.html".to_string()]);
        assert!(cache.find_best(&request("http://example.com/docs/b.html")).is_some());
        assert!(cache.find_best(&request("http://example.com/other/b.html")).is_none());
        assert!(cache.find_best(&request("http://example.com:8080/docs/b.html")).is_none());
    }

    #[test]
    fn test_find_best_prefers_longest_prefix() {
        let cache = AuthCache::new();
        cache.add_basic("example.com", 80, "outer", "outer-user", "p");
        cache.add_basic("example.com", 80, "inner", "inner-user", "p");
        let outer = cache.lookup("example.com", 80, "outer", &AuthScheme::Basic).unwrap();
        let inner = cache.lookup("example.com", 80, "inner", &AuthScheme::Basic).unwrap();
        cache.add_path(&outer, "/a/index.html");
        cache.add_path(&inner, "/a/b/index.html");

        let best = cache.find_best(&request("http://example.com/a/b/c.html")).unwrap();
        assert_eq!(best.username, "inner-user");
        let best = cache.find_best(&request("http://example.com/a/c.html")).unwrap();
        assert_eq!(best.username, "outer-user");
    }

    #[test]
    fn test_remove() {
        let cache = AuthCache::new();
        cache.add_basic("a.com", 80, "R", "u", "p");
        let cred = cache.lookup("a.com", 80, "R", &AuthScheme::Basic).unwrap();
        cache.remove(&cred);
        assert!(cache.is_empty());
    }

    struct FixedPrompter;

    impl AuthPrompter for FixedPrompter {
        fn prompt(&self, _challenge: &Challenge) -> Option<(String, String)> {
            Some(("typed".into(), "secret".into()))
        }
    }

    #[test]
    fn test_query_prompter() {
        let cache = AuthCache::new();
        let req = request("http://example.com/");
        let basic = &parse_challenges(r#"Basic realm="R""#, "example.com", 80)[0];
        let ntlm = &parse_challenges("NTLM", "example.com", 80)[0];

        assert!(cache.query_prompter(basic, &req, None).unwrap().is_none());
        assert!(matches!(
            cache.query_prompter(ntlm, &req, Some(&FixedPrompter)),
            Err(NetError::UnsupportedAuthScheme(s)) if s == "NTLM"
        ));

        let cred = cache
            .query_prompter(basic, &req, Some(&FixedPrompter))
            .unwrap()
            .unwrap();
        assert_eq!(cred.username, "typed");
        assert!(cache.get_authorization(basic).is_some());

        let mut quiet = req.clone();
        quiet.set_allow_ui(false);
        cache.clear();
        assert!(cache
            .query_prompter(basic, &quiet, Some(&FixedPrompter))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_proxy_cache_keys_lowercased() {
        let cache = ProxyAuthCache::new();
        cache.insert("Proxy:3128", Credential::basic("proxy", 3128, "", "u", "p"));
        assert!(cache.get("proxy:3128").is_some());
        assert_eq!(cache.len(), 1);
    }
}
