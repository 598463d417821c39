//! Authorization module.
//!
//! Answers `401`/`407` challenges with credentials from the context's
//! credential store (or the prompter), and sends known credentials
//! preemptively. Servers may offer several challenges at once; each
//! resend tries the next one, so a rejected credential does not loop.

use crate::base::neterror::NetError;
use crate::http::challenge::{parse_challenges, Challenge};
use crate::http::module::{Module, Phase1Outcome, RequestOutcome, ResponseOutcome};
use crate::http::request::Request;
use crate::http::response::{Response, ResponseHead};
use crate::socket::authcache::{AuthScheme, Credential};
use crate::urlrequest::context::ClientContext;
use crate::urlrequest::deferred::{DeferredEntry, DeferredKind, DeferredState};
use http::{HeaderMap, StatusCode};
use std::sync::Arc;

const AUTHORIZATION: &str = "Authorization";
const PROXY_AUTHORIZATION: &str = "Proxy-Authorization";

/// Position in the challenge list of the last response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChallengeCursor {
    /// Next challenge to answer from the store; `None` once all were tried.
    pub next: Option<usize>,
    /// Next challenge to prompt for; wraps around.
    pub prompt: usize,
}

impl Default for ChallengeCursor {
    fn default() -> Self {
        Self {
            next: Some(0),
            prompt: 0,
        }
    }
}

/// Per-exchange state of the authorization module.
#[derive(Debug, Clone, Default)]
pub struct AuthState {
    pub auth: ChallengeCursor,
    pub prxy: ChallengeCursor,
    pub auth_sent: Option<Credential>,
    pub prxy_sent: Option<Credential>,
    /// The credential went out in answer to a challenge, not preemptively.
    pub auth_from_4xx: bool,
    pub prxy_from_4xx: bool,
    pub num_tries: u32,
    /// Header values this module put on the request.
    installed_auth: Option<String>,
    installed_prxy: Option<String>,
}

/// Parked state of a deferred challenge.
#[derive(Debug, Clone)]
pub struct AuthSnapshot {
    pub state: AuthState,
    pub response: ResponseHead,
}

#[derive(Debug, Default)]
pub struct AuthorizationModule {
    state: AuthState,
}

impl AuthorizationModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    fn handle_auth_challenge(
        &mut self,
        request: &mut Request,
        response: &ResponseHead,
        context: &ClientContext,
    ) -> Result<(), NetError> {
        let connection = Arc::clone(request.connection());
        let origin = request.absolute_uri()?;
        let origin_host = origin.host_str().unwrap_or(connection.host()).to_string();
        let origin_port = origin.port_or_known_default().unwrap_or(connection.port());

        let www = response.joined("www-authenticate");
        let mut cursor = self.state.auth;
        let prev = self.state.auth_sent.take();
        self.state.auth_sent = set_auth_headers(
            www.as_deref(),
            (&origin_host, origin_port),
            AUTHORIZATION,
            &mut cursor,
            prev.as_ref(),
            &mut self.state.installed_auth,
            request,
            response,
            context,
        )?;
        if self.state.auth_sent.is_some() {
            self.state.auth_from_4xx = true;
            self.state.auth = cursor;
        } else {
            self.state.auth = ChallengeCursor::default();
        }

        let prxy = response.joined("proxy-authenticate");
        let (proxy_host, proxy_port) = match connection.proxy().and_then(|p| p.host_port()) {
            Some((h, p)) => (h.to_string(), p),
            None => (origin_host, origin_port),
        };
        let mut cursor = self.state.prxy;
        let prev = self.state.prxy_sent.take();
        self.state.prxy_sent = set_auth_headers(
            prxy.as_deref(),
            (&proxy_host, proxy_port),
            PROXY_AUTHORIZATION,
            &mut cursor,
            prev.as_ref(),
            &mut self.state.installed_prxy,
            request,
            response,
            context,
        )?;
        if self.state.prxy_sent.is_some() {
            self.state.prxy_from_4xx = true;
            self.state.prxy = cursor;
        } else {
            self.state.prxy = ChallengeCursor::default();
        }

        if let (Some(cred), Some(key)) = (&self.state.prxy_sent, connection.proxy_key()) {
            context.proxy_auth().insert(&key, cred.clone());
        }

        if self.state.auth_sent.is_none()
            && self.state.prxy_sent.is_none()
            && www.is_none()
            && prxy.is_none()
        {
            let missing = if response.status == StatusCode::UNAUTHORIZED {
                "Missing WWW-Authenticate header"
            } else {
                "Missing Proxy-Authenticate header"
            };
            return Err(NetError::Protocol(missing.to_string()));
        }
        Ok(())
    }
}

/// Run a credential through the fixup hook, treating an unknown scheme as
/// "no credential".
fn fixup(
    context: &ClientContext,
    credential: Credential,
    request: &Request,
    challenge: Option<&Challenge>,
    response: Option<&ResponseHead>,
) -> Result<Option<Credential>, NetError> {
    match context
        .auth_handler()
        .fixup(credential, request, challenge, response)
    {
        Err(NetError::UnsupportedAuthScheme(scheme)) => {
            tracing::debug!(%scheme, "fixup rejected scheme");
            Ok(None)
        }
        other => other,
    }
}

fn install(
    request: &mut Request,
    header: &str,
    credential: &Credential,
    installed: &mut Option<String>,
) -> Result<(), NetError> {
    let value = credential.to_string();
    request.headers_mut().set(header, &value)?;
    *installed = Some(value);
    Ok(())
}

/// Drop a header this module put there earlier. Caller-supplied values
/// stay.
fn remove_stale(request: &mut Request, header: &str, installed: &mut Option<String>) {
    if let Some(value) = installed.take() {
        request.headers_mut().remove_value(header, &value);
    }
}

/// Pick a credential for the challenges in `header` and install it.
#[allow(clippy::too_many_arguments)]
fn set_auth_headers(
    header: Option<&str>,
    (host, port): (&str, u16),
    header_name: &str,
    cursor: &mut ChallengeCursor,
    prev: Option<&Credential>,
    installed: &mut Option<String>,
    request: &mut Request,
    response: &ResponseHead,
    context: &ClientContext,
) -> Result<Option<Credential>, NetError> {
    let Some(header) = header else {
        return Ok(None);
    };
    let challenges = parse_challenges(header, host, port);
    tracing::debug!(
        count = challenges.len(),
        header = header_name,
        "parsed challenges"
    );
    if challenges.is_empty() {
        return Ok(None);
    }

    // A repeated challenge for the realm we just answered means the Basic
    // credential was refused. Digest's stale nonces are left to the
    // fixup hook.
    if let Some(prev) = prev.filter(|p| p.scheme == AuthScheme::Basic) {
        if challenges
            .iter()
            .any(|c| c.realm == prev.realm && c.scheme.matches(&prev.scheme))
        {
            tracing::debug!(realm = %prev.realm, "invalidating refused credential");
            context.auth_cache().remove(prev);
        }
    }

    let mut credential = None;
    while credential.is_none() {
        let Some(idx) = cursor.next.filter(|i| *i < challenges.len()) else {
            break;
        };
        let challenge = &challenges[idx];
        if let Some(cached) = context.auth_cache().get_authorization(challenge) {
            credential = fixup(context, cached, request, Some(challenge), Some(response))?;
        }
        cursor.next = if idx + 1 == challenges.len() {
            None
        } else {
            Some(idx + 1)
        };
    }

    if credential.is_none() {
        for attempt in 0..challenges.len() {
            if cursor.prompt >= challenges.len() {
                cursor.prompt = 0;
            }
            let challenge = &challenges[cursor.prompt];
            cursor.prompt += 1;
            match context
                .auth_cache()
                .query_prompter(challenge, request, context.prompter())
            {
                Ok(Some(prompted)) => {
                    credential = fixup(context, prompted, request, Some(challenge), Some(response))?;
                    break;
                }
                Ok(None) => break,
                Err(NetError::UnsupportedAuthScheme(_)) if attempt + 1 < challenges.len() => {}
                Err(e) => return Err(e),
            }
        }
    }

    let Some(credential) = credential else {
        return Ok(None);
    };
    install(request, header_name, &credential, installed)?;
    Ok(Some(credential))
}

impl Module for AuthorizationModule {
    fn name(&self) -> &'static str {
        "authorization"
    }

    fn request_handler(
        &mut self,
        request: &mut Request,
        context: &ClientContext,
    ) -> Result<RequestOutcome, NetError> {
        if let Some(ticket) = request.stream().map(|s| s.ticket()) {
            if let Some(entry) = context.deferred().take(ticket, DeferredKind::Authorization) {
                if let DeferredState::Authorization(snapshot) = entry.state {
                    let AuthSnapshot { state, response } = *snapshot;
                    self.state = state;
                    request.copy_from(entry.request);
                    tracing::debug!(ticket = ticket.id(), "handling deferred auth challenge");
                    self.handle_auth_challenge(request, &response, context)?;
                    return Ok(RequestOutcome::Restart);
                }
            }
        }

        let connection = Arc::clone(request.connection());
        if let Some(key) = connection.proxy_key() {
            if !self.state.prxy_from_4xx {
                let guess = match context.proxy_auth().get(&key) {
                    Some(cred) => fixup(context, cred, request, None, None)?,
                    None => None,
                };
                match guess {
                    Some(cred) => {
                        install(request, PROXY_AUTHORIZATION, &cred, &mut self.state.installed_prxy)?;
                        tracing::debug!(proxy = %key, "preemptively sending Proxy-Authorization");
                        self.state.prxy_sent = Some(cred);
                        self.state.prxy_from_4xx = false;
                    }
                    None => remove_stale(request, PROXY_AUTHORIZATION, &mut self.state.installed_prxy),
                }
            }
        }

        if !self.state.auth_from_4xx {
            let guess = match context.auth_cache().find_best(request) {
                Some(cred) => fixup(context, cred, request, None, None)?,
                None => None,
            };
            match guess {
                Some(cred) => {
                    install(request, AUTHORIZATION, &cred, &mut self.state.installed_auth)?;
                    context.auth_cache().update_digest(&cred);
                    tracing::debug!(realm = %cred.realm, "preemptively sending Authorization");
                    self.state.auth_sent = Some(cred);
                    self.state.auth_from_4xx = false;
                }
                None => remove_stale(request, AUTHORIZATION, &mut self.state.installed_auth),
            }
        }

        Ok(RequestOutcome::Continue)
    }

    fn response_phase1(
        &mut self,
        response: &mut Response,
        request: &Request,
        context: &ClientContext,
    ) -> Result<Phase1Outcome, NetError> {
        let status = response.status();
        if status != StatusCode::UNAUTHORIZED && status != StatusCode::PROXY_AUTHENTICATION_REQUIRED {
            if self.state.auth_from_4xx {
                if let Some(sent) = &self.state.auth_sent {
                    let path = request
                        .absolute_uri()
                        .map(|u| u.path().to_string())
                        .unwrap_or_else(|_| request.target().to_string());
                    context.auth_cache().add_path(sent, &path);
                }
            }
            self.state.num_tries = 0;
        }

        self.state.auth_from_4xx = false;
        self.state.prxy_from_4xx = false;
        if !response.headers().contains_key(http::header::WWW_AUTHENTICATE) {
            self.state.auth = ChallengeCursor::default();
        }
        if !response.headers().contains_key(http::header::PROXY_AUTHENTICATE) {
            self.state.prxy = ChallengeCursor::default();
        }
        Ok(Phase1Outcome::Continue)
    }

    fn response_phase2(
        &mut self,
        response: &mut Response,
        request: &mut Request,
        context: &ClientContext,
    ) -> Result<ResponseOutcome, NetError> {
        context.auth_handler().handle_auth_headers(
            response,
            request,
            self.state.auth_sent.as_ref(),
            self.state.prxy_sent.as_ref(),
            context.auth_cache(),
        )?;

        let status = response.status();
        if status != StatusCode::UNAUTHORIZED && status != StatusCode::PROXY_AUTHENTICATION_REQUIRED {
            return Ok(ResponseOutcome::Continue);
        }

        self.state.num_tries += 1;
        let max = context.config().max_auth_attempts;
        if self.state.num_tries > max {
            tracing::warn!(attempts = self.state.num_tries, "server keeps refusing credentials");
            return Err(NetError::TooManyAuthAttempts(max));
        }

        if let Some(stream) = request.stream() {
            if !context.config().defer_streamed {
                tracing::debug!(status = status.as_u16(), "not handled: request has an output stream");
                return Ok(ResponseOutcome::Continue);
            }
            let ticket = stream.ticket();
            stream.reset()?;
            context.deferred().defer(
                ticket,
                DeferredEntry {
                    request: request.clone(),
                    state: DeferredState::Authorization(Box::new(AuthSnapshot {
                        state: self.state.clone(),
                        response: response.head(),
                    })),
                },
            );
            response.set_retry_request(true);
            tracing::debug!(status = status.as_u16(), "challenge deferred: request has an output stream");
            return Ok(ResponseOutcome::Continue);
        }

        tracing::debug!(status = status.as_u16(), reason = response.reason(), "handling challenge");
        let head = response.head();
        self.handle_auth_challenge(request, &head, context)?;

        if self.state.auth_sent.is_some() || self.state.prxy_sent.is_some() {
            response.close_body();
            return Ok(ResponseOutcome::Resend);
        }
        tracing::debug!(status = status.as_u16(), "no credentials found; challenge not handled");
        Ok(ResponseOutcome::Continue)
    }

    fn trailer_handler(
        &mut self,
        trailers: &HeaderMap,
        request: &Request,
        context: &ClientContext,
    ) -> Result<(), NetError> {
        context.auth_handler().handle_auth_trailers(
            trailers,
            request,
            self.state.auth_sent.as_ref(),
            self.state.prxy_sent.as_ref(),
            context.auth_cache(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::streamfactory::HttpConnection;
    use http::Method;
    use url::Url;

    fn request(url: &str) -> Request {
        let url = Url::parse(url).unwrap();
        let conn = Arc::new(HttpConnection::new(&url).unwrap());
        Request::new(conn, Method::GET, url.path())
    }

    fn challenge(status: StatusCode, header: &str, value: &str) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::HeaderName::from_bytes(header.as_bytes()).unwrap(),
            value.parse().unwrap(),
        );
        Response::new(status, Url::parse("http://example.com/").unwrap()).with_headers(headers)
    }

    #[test]
    fn test_answers_basic_challenge_from_store() {
        let ctx = ClientContext::new();
        ctx.auth_cache().add_basic("example.com", 80, "R", "user", "pass");
        let mut req = request("http://example.com/a");
        let mut resp = challenge(StatusCode::UNAUTHORIZED, "www-authenticate", r#"Basic realm="R""#);

        let mut module = AuthorizationModule::new();
        module.response_phase1(&mut resp, &req, &ctx).unwrap();
        let outcome = module.response_phase2(&mut resp, &mut req, &ctx).unwrap();

        assert_eq!(outcome, ResponseOutcome::Resend);
        assert_eq!(req.headers().get("Authorization"), Some("Basic dXNlcjpwYXNz"));
        assert!(module.state().auth_from_4xx);
    }

    #[test]
    fn test_unknown_realm_left_unhandled() {
        let ctx = ClientContext::new();
        let mut req = request("http://example.com/a");
        let mut resp = challenge(StatusCode::UNAUTHORIZED, "www-authenticate", r#"Basic realm="R""#);

        let mut module = AuthorizationModule::new();
        let outcome = module.response_phase2(&mut resp, &mut req, &ctx).unwrap();
        assert_eq!(outcome, ResponseOutcome::Continue);
        assert!(!req.headers().contains("Authorization"));
    }

    #[test]
    fn test_missing_challenge_header_is_protocol_error() {
        let ctx = ClientContext::new();
        let mut req = request("http://example.com/a");
        let mut resp = Response::new(StatusCode::UNAUTHORIZED, Url::parse("http://example.com/").unwrap());

        let err = AuthorizationModule::new()
            .response_phase2(&mut resp, &mut req, &ctx)
            .unwrap_err();
        assert_eq!(err, NetError::Protocol("Missing WWW-Authenticate header".into()));
    }

    #[test]
    fn test_guard_trips_after_ten() {
        let ctx = ClientContext::new();
        ctx.auth_cache().add_basic("example.com", 80, "R", "user", "pass");
        let mut req = request("http://example.com/a");
        let mut module = AuthorizationModule::new();

        for _ in 0..10 {
            ctx.auth_cache().add_basic("example.com", 80, "R", "user", "pass");
            let mut resp = challenge(StatusCode::UNAUTHORIZED, "www-authenticate", r#"Basic realm="R""#);
            module.response_phase1(&mut resp, &req, &ctx).unwrap();
            module.response_phase2(&mut resp, &mut req, &ctx).unwrap();
        }
        let mut resp = challenge(StatusCode::UNAUTHORIZED, "www-authenticate", r#"Basic realm="R""#);
        module.response_phase1(&mut resp, &req, &ctx).unwrap();
        assert_eq!(
            module.response_phase2(&mut resp, &mut req, &ctx).unwrap_err(),
            NetError::TooManyAuthAttempts(10)
        );
    }

    #[test]
    fn test_refused_basic_credential_invalidated() {
        let ctx = ClientContext::new();
        ctx.auth_cache().add_basic("example.com", 80, "R", "user", "wrong");
        let mut req = request("http://example.com/a");
        let mut module = AuthorizationModule::new();

        let mut resp = challenge(StatusCode::UNAUTHORIZED, "www-authenticate", r#"Basic realm="R""#);
        module.response_phase1(&mut resp, &req, &ctx).unwrap();
        assert_eq!(module.response_phase2(&mut resp, &mut req, &ctx).unwrap(), ResponseOutcome::Resend);

        let mut resp = challenge(StatusCode::UNAUTHORIZED, "www-authenticate", r#"Basic realm="R""#);
        module.response_phase1(&mut resp, &req, &ctx).unwrap();
        assert_eq!(module.response_phase2(&mut resp, &mut req, &ctx).unwrap(), ResponseOutcome::Continue);
        assert!(ctx.auth_cache().is_empty());
    }

    #[test]
    fn test_success_learns_path_for_preemptive_use() {
        let ctx = ClientContext::new();
        ctx.auth_cache().add_basic("example.com", 80, "R", "user", "pass");
        let mut req = request("http://example.com/docs/a.html");
        let mut module = AuthorizationModule::new();

        let mut resp = challenge(StatusCode::UNAUTHORIZED, "www-authenticate", r#"Basic realm="R""#);
        module.response_phase1(&mut resp, &req, &ctx).unwrap();
        module.response_phase2(&mut resp, &mut req, &ctx).unwrap();

        let mut ok = Response::new(StatusCode::OK, Url::parse("http://example.com/").unwrap());
        module.response_phase1(&mut ok, &req, &ctx).unwrap();

        let mut next = request("http://example.com/docs/b.html");
        let mut fresh = AuthorizationModule::new();
        assert_eq!(fresh.request_handler(&mut next, &ctx).unwrap(), RequestOutcome::Continue);
        assert_eq!(next.headers().get("Authorization"), Some("Basic dXNlcjpwYXNz"));
    }

    #[test]
    fn test_caller_header_survives_request_phase() {
        let ctx = ClientContext::new();
        let mut req = request("http://example.com/a");
        req.headers_mut().set("Authorization", "Bearer token").unwrap();
        AuthorizationModule::new().request_handler(&mut req, &ctx).unwrap();
        assert_eq!(req.headers().get("Authorization"), Some("Bearer token"));
    }
}
