//! HTTP Digest Authentication (RFC 7616).
//!
//! A [`DigestAuthHandler`] is built from a `Digest` challenge and travels
//! with the credential it answers, so later requests in the same protection
//! space can reuse the nonce with an increasing nonce count.
//!
//! ## Supported Features
//! - MD5 and SHA-256 algorithms, plus their `-sess` variants
//! - qop=auth (auth-int is never chosen)
//! - Nonce counting and `nextnonce` rollover

use crate::base::neterror::NetError;
use crate::http::challenge::{parse_challenges, Challenge};
use md5::Md5;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Digest authentication algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestAlgorithm {
    /// No `algorithm` parameter; hashed as MD5 and not echoed back.
    #[default]
    Unspecified,
    Md5,
    Md5Sess,
    Sha256,
    Sha256Sess,
}

impl DigestAlgorithm {
    fn parse(value: &str) -> Option<Self> {
        [
            ("MD5", Self::Md5),
            ("MD5-sess", Self::Md5Sess),
            ("SHA-256", Self::Sha256),
            ("SHA-256-sess", Self::Sha256Sess),
        ]
        .into_iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(value))
        .map(|(_, algorithm)| algorithm)
    }

    /// Name as echoed in the `algorithm` parameter.
    fn name(self) -> Option<&'static str> {
        match self {
            Self::Unspecified => None,
            Self::Md5 => Some("MD5"),
            Self::Md5Sess => Some("MD5-sess"),
            Self::Sha256 => Some("SHA-256"),
            Self::Sha256Sess => Some("SHA-256-sess"),
        }
    }

    fn is_session(self) -> bool {
        matches!(self, Self::Md5Sess | Self::Sha256Sess)
    }

    /// Lowercase hex digest of `input`.
    fn hex(self, input: &str) -> String {
        let bytes = match self {
            Self::Sha256 | Self::Sha256Sess => Sha256::digest(input.as_bytes()).to_vec(),
            Self::Unspecified | Self::Md5 | Self::Md5Sess => Md5::digest(input.as_bytes()).to_vec(),
        };
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

/// Quality of protection the handler answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Qop {
    /// Legacy RFC 2069 digest without nc/cnonce.
    #[default]
    Unspecified,
    Auth,
}

/// Digest state for one protection space.
#[derive(Debug, Clone)]
pub struct DigestAuthHandler {
    pub realm: String,
    nonce: String,
    opaque: Option<String>,
    algorithm: DigestAlgorithm,
    qop: Qop,
    stale: bool,
    userhash: bool,
    nonce_count: u32,
}

impl DigestAuthHandler {
    /// Build from a parsed `Digest` challenge. A challenge without a nonce
    /// or with an unknown algorithm is rejected.
    pub fn from_challenge(challenge: &Challenge) -> Result<Self, NetError> {
        let algorithm = match challenge.param("algorithm") {
            Some(value) => DigestAlgorithm::parse(value).ok_or(NetError::InvalidResponse)?,
            None => DigestAlgorithm::Unspecified,
        };
        let nonce = challenge
            .param("nonce")
            .filter(|n| !n.is_empty())
            .ok_or(NetError::InvalidResponse)?;
        let qop = match challenge.param("qop") {
            Some(list) if list.split(',').any(|q| q.trim().eq_ignore_ascii_case("auth")) => Qop::Auth,
            _ => Qop::Unspecified,
        };
        let flag = |name: &str| challenge.param(name).is_some_and(|v| v.eq_ignore_ascii_case("true"));

        Ok(Self {
            realm: challenge.realm.clone(),
            nonce: nonce.to_string(),
            opaque: challenge.param("opaque").map(str::to_string),
            algorithm,
            qop,
            stale: flag("stale"),
            userhash: flag("userhash"),
            nonce_count: 0,
        })
    }

    /// Parse the parameters of a `WWW-Authenticate: Digest` header (the
    /// part after the `Digest ` prefix).
    pub fn parse_challenge(header: &str) -> Result<Self, NetError> {
        let challenges = parse_challenges(&format!("Digest {}", header), "", 0);
        let challenge = challenges.first().ok_or(NetError::InvalidResponse)?;
        Self::from_challenge(challenge)
    }

    /// Count one more use of the nonce and return the complete
    /// `Authorization` value, `Digest ` prefix included.
    pub fn generate_auth_token(
        &mut self,
        method: &str,
        uri: &str,
        username: &str,
        password: &str,
    ) -> String {
        self.nonce_count += 1;
        let nc = format!("{:08x}", self.nonce_count);
        let cnonce = cnonce();
        let response = self.response(method, uri, username, password, &cnonce, &nc);

        let mut params = vec![
            format!("username=\"{}\"", username),
            format!("realm=\"{}\"", self.realm),
            format!("nonce=\"{}\"", self.nonce),
            format!("uri=\"{}\"", uri),
        ];
        if let Some(name) = self.algorithm.name() {
            params.push(format!("algorithm={}", name));
        }
        params.push(format!("response=\"{}\"", response));
        if let Some(opaque) = &self.opaque {
            params.push(format!("opaque=\"{}\"", opaque));
        }
        if self.qop == Qop::Auth {
            params.push(format!("qop=auth, nc={}, cnonce=\"{}\"", nc, cnonce));
        }
        if self.userhash {
            params.push("userhash=true".to_string());
        }
        format!("Digest {}", params.join(", "))
    }

    /// The `response` parameter.
    fn response(
        &self,
        method: &str,
        uri: &str,
        username: &str,
        password: &str,
        cnonce: &str,
        nc: &str,
    ) -> String {
        let h = |s: &str| self.algorithm.hex(s);

        let mut ha1 = h(&format!("{}:{}:{}", username, self.realm, password));
        if self.algorithm.is_session() {
            ha1 = h(&format!("{}:{}:{}", ha1, self.nonce, cnonce));
        }
        let ha2 = h(&format!("{}:{}", method, uri));

        match self.qop {
            Qop::Auth => h(&format!("{}:{}:{}:{}:auth:{}", ha1, self.nonce, nc, cnonce, ha2)),
            Qop::Unspecified => h(&format!("{}:{}:{}", ha1, self.nonce, ha2)),
        }
    }

    /// The server flagged the nonce as expired; the password may be fine.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    pub fn nonce_count(&self) -> u32 {
        self.nonce_count
    }

    /// Switch to the server's `nextnonce`; the count restarts.
    pub fn set_nonce(&mut self, nonce: &str) {
        if self.nonce != nonce {
            self.nonce = nonce.to_string();
            self.nonce_count = 0;
        }
    }
}

/// 16 hex chars, unique within the process.
fn cnonce() -> String {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let seq = SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{:016x}", nanos ^ seq.rotate_left(32))
}
