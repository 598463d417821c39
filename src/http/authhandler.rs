//! Scheme-specific credential handling.
//!
//! The authorization module only knows how to pick a credential for a
//! challenge. Turning it into the exact header value for one request
//! (Digest's per-request response hash, for instance) is the job of an
//! [`AuthHandler`].

use crate::base::neterror::NetError;
use crate::http::challenge::{parse_params, Challenge};
use crate::http::digestauth::DigestAuthHandler;
use crate::http::request::Request;
use crate::http::response::{Response, ResponseHead};
use crate::socket::authcache::{AuthCache, AuthScheme, Credential};
use http::HeaderMap;

/// Credential fixup hook.
pub trait AuthHandler: Send + Sync {
    /// Adapt `credential` to `request`. `challenge` and `response` are
    /// `None` when the credential is sent preemptively. `Ok(None)` rejects
    /// the credential; an unknown scheme is
    /// [`NetError::UnsupportedAuthScheme`].
    fn fixup(
        &self,
        credential: Credential,
        request: &Request,
        challenge: Option<&Challenge>,
        response: Option<&ResponseHead>,
    ) -> Result<Option<Credential>, NetError>;

    /// Look at authentication-related response headers.
    fn handle_auth_headers(
        &self,
        _response: &Response,
        _request: &Request,
        _auth_sent: Option<&Credential>,
        _prxy_sent: Option<&Credential>,
        _cache: &AuthCache,
    ) -> Result<(), NetError> {
        Ok(())
    }

    /// Same as [`handle_auth_headers`](AuthHandler::handle_auth_headers)
    /// for trailers.
    fn handle_auth_trailers(
        &self,
        _trailers: &HeaderMap,
        _request: &Request,
        _auth_sent: Option<&Credential>,
        _prxy_sent: Option<&Credential>,
        _cache: &AuthCache,
    ) -> Result<(), NetError> {
        Ok(())
    }
}

/// Basic and Digest.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAuthHandler;

impl DefaultAuthHandler {
    fn apply_auth_info(
        headers: &HeaderMap,
        auth_sent: Option<&Credential>,
        prxy_sent: Option<&Credential>,
        cache: &AuthCache,
    ) {
        let pairs = [
            ("authentication-info", auth_sent),
            ("proxy-authentication-info", prxy_sent),
        ];
        for (name, sent) in pairs {
            let Some(cred) = sent.filter(|c| c.scheme == AuthScheme::Digest) else {
                continue;
            };
            let Some(info) = headers.get(name).and_then(|v| v.to_str().ok()) else {
                continue;
            };
            if let Some((_, next)) = parse_params(info).into_iter().find(|(n, _)| n == "nextnonce") {
                tracing::debug!(realm = %cred.realm, "digest nextnonce received");
                cache.update_nonce(cred, &next);
            }
        }
    }
}

impl AuthHandler for DefaultAuthHandler {
    fn fixup(
        &self,
        mut credential: Credential,
        request: &Request,
        challenge: Option<&Challenge>,
        _response: Option<&ResponseHead>,
    ) -> Result<Option<Credential>, NetError> {
        match credential.scheme.clone() {
            AuthScheme::Basic => Ok(Some(credential)),
            AuthScheme::Digest => {
                let mut digest = match (challenge, credential.digest.take()) {
                    (Some(ch), existing) => {
                        let fresh = DigestAuthHandler::from_challenge(ch)?;
                        match existing {
                            Some(d) if d.nonce() == fresh.nonce() => d,
                            _ => fresh,
                        }
                    }
                    (None, Some(existing)) => existing,
                    // Nothing to hash against until the server sends a nonce.
                    (None, None) => return Ok(None),
                };
                let token = digest.generate_auth_token(
                    request.method().as_str(),
                    request.target(),
                    &credential.username,
                    credential.password(),
                );
                credential.token = Some(token);
                credential.digest = Some(digest);
                Ok(Some(credential))
            }
            AuthScheme::Other(name) => Err(NetError::UnsupportedAuthScheme(name)),
        }
    }

    fn handle_auth_headers(
        &self,
        response: &Response,
        _request: &Request,
        auth_sent: Option<&Credential>,
        prxy_sent: Option<&Credential>,
        cache: &AuthCache,
    ) -> Result<(), NetError> {
        Self::apply_auth_info(response.headers(), auth_sent, prxy_sent, cache);
        Ok(())
    }

    fn handle_auth_trailers(
        &self,
        trailers: &HeaderMap,
        _request: &Request,
        auth_sent: Option<&Credential>,
        prxy_sent: Option<&Credential>,
        cache: &AuthCache,
    ) -> Result<(), NetError> {
        Self::apply_auth_info(trailers, auth_sent, prxy_sent, cache);
        Ok(())
    }
}
