//! Redirection module.
//!
//! Follows 301/302/303/307 redirects and 305 Use Proxy, remembers 301
//! mappings in the context's permanent-redirect cache, and stamps the
//! final response with the URI it actually came from.

use crate::base::neterror::NetError;
use crate::http::connection::ProxyChoice;
use crate::http::module::{Module, Phase1Outcome, RequestOutcome, ResponseOutcome};
use crate::http::request::{path_and_query, Request};
use crate::http::requestbody::RequestBody;
use crate::http::response::Response;
use crate::socket::proxy::ProxySettings;
use crate::urlrequest::context::ClientContext;
use crate::urlrequest::deferred::{DeferredEntry, DeferredKind, DeferredState};
use http::{Method, StatusCode};
use std::sync::Arc;
use url::Url;

/// Per-exchange redirect state, also what a deferred redirect parks.
#[derive(Debug, Clone, Default)]
pub struct RedirectSnapshot {
    /// Redirects followed so far.
    pub level: u32,
    /// Target of the last followed redirect.
    pub last_uri: Option<Url>,
    /// The last redirect switched connections.
    pub new_con: bool,
}

#[derive(Debug, Default)]
pub struct RedirectionModule {
    state: RedirectSnapshot,
}

fn is_redirect(status: StatusCode) -> bool {
    (301..=307).contains(&status.as_u16()) && status != StatusCode::NOT_MODIFIED
}

/// Resolve `location` against `base`; the result must name a host.
fn resolve_location(base: &Url, location: &str) -> Result<Url, NetError> {
    let invalid = |reason: String| NetError::InvalidRedirect {
        location: location.to_string(),
        reason,
    };
    let mut target = base.join(location.trim()).map_err(|e| invalid(e.to_string()))?;
    if target.host_str().map_or(true, str::is_empty) {
        return Err(invalid("no host in redirect target".to_string()));
    }
    target.set_fragment(None);
    Ok(target)
}

impl RedirectionModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &RedirectSnapshot {
        &self.state
    }

    /// A redirect that is not followed still came from the last target.
    fn stamp(&self, response: &mut Response) {
        if let Some(last) = &self.state.last_uri {
            response.set_effective_uri(last.clone());
        }
    }

    fn location(response: &Response) -> Option<String> {
        response
            .header("location")
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
    }

    /// The request cannot be resent by the pipeline itself: park the state
    /// for the caller's resend, or leave the response alone.
    fn park(
        &self,
        response: &mut Response,
        request: &Request,
        context: &ClientContext,
    ) -> Result<ResponseOutcome, NetError> {
        if let Some(stream) = request.stream() {
            stream.reset()?;
            context.deferred().defer(
                stream.ticket(),
                DeferredEntry {
                    request: request.clone(),
                    state: DeferredState::Redirection(self.state.clone()),
                },
            );
            response.set_retry_request(true);
            tracing::debug!(status = response.status().as_u16(), "redirect deferred: request has an output stream");
        }
        Ok(ResponseOutcome::Continue)
    }

    /// Common follow logic for 301/302/303/307.
    fn follow(
        &mut self,
        response: &mut Response,
        request: &mut Request,
        context: &ClientContext,
        downgrade: bool,
    ) -> Result<ResponseOutcome, NetError> {
        let status = response.status();
        let max = context.config().max_redirects;
        let Some(location) = Self::location(response) else {
            tracing::debug!(status = status.as_u16(), "redirect without Location; not followed");
            self.stamp(response);
            return Ok(ResponseOutcome::Continue);
        };
        if self.state.level >= max {
            tracing::debug!(level = self.state.level, "redirect depth exhausted; not followed");
            self.stamp(response);
            return Ok(ResponseOutcome::Continue);
        }
        // A downgraded redirect drops the stream, so only a kept body blocks it.
        if !downgrade && request.stream().is_some() && !context.config().defer_streamed {
            tracing::debug!(status = status.as_u16(), "not handled: request has an output stream");
            self.stamp(response);
            return Ok(ResponseOutcome::Continue);
        }

        let current = request.absolute_uri()?;
        let target = resolve_location(&current, &location)?;
        self.state.level += 1;

        if status == StatusCode::MOVED_PERMANENTLY {
            context.redirects().insert(&current, &target);
        }

        if downgrade {
            if *request.method() != Method::HEAD {
                request.set_method(Method::GET);
            }
            request.set_body(RequestBody::Empty);
            request.headers_mut().remove("Content-Type");
            request.headers_mut().remove("Content-Length");
        }

        let connection = Arc::clone(request.connection());
        self.state.new_con = !connection.is_compatible_with(&target);
        if self.state.new_con {
            request.set_connection(connection.derive(&target, ProxyChoice::Inherit)?);
            request.headers_mut().remove("Authorization");
        }
        request.set_target(&path_and_query(&target));
        if request.headers().contains("Referer") {
            request.headers_mut().set("Referer", current.as_str())?;
        }

        tracing::debug!(
            status = status.as_u16(),
            from = %current,
            to = %target,
            level = self.state.level,
            "following redirect"
        );
        self.state.last_uri = Some(target);

        if request.stream().is_some() {
            return self.park(response, request, context);
        }

        response.close_body();
        let with_body = !request.body().is_empty();
        Ok(match (self.state.new_con, with_body) {
            (false, false) => ResponseOutcome::Resend,
            (true, false) => ResponseOutcome::ResendNewCon,
            (false, true) => ResponseOutcome::Send,
            (true, true) => ResponseOutcome::SendNewCon,
        })
    }

    fn use_proxy(
        &mut self,
        response: &mut Response,
        request: &mut Request,
        context: &ClientContext,
    ) -> Result<ResponseOutcome, NetError> {
        let connection = Arc::clone(request.connection());
        if connection.proxy().is_some() {
            tracing::debug!("305 Use Proxy received while already proxied; not followed");
            self.stamp(response);
            return Ok(ResponseOutcome::Continue);
        }
        let Some(location) = Self::location(response) else {
            self.stamp(response);
            return Ok(ResponseOutcome::Continue);
        };
        if request.stream().is_some() && !context.config().defer_streamed {
            tracing::debug!("not handled: request has an output stream");
            self.stamp(response);
            return Ok(ResponseOutcome::Continue);
        }

        let current = request.absolute_uri()?;
        let proxy_uri = resolve_location(&current, &location)?;
        let (host, port) = match (proxy_uri.host_str(), proxy_uri.port_or_known_default()) {
            (Some(host), Some(port)) => (host.to_string(), port),
            _ => {
                return Err(NetError::InvalidRedirect {
                    location,
                    reason: "no proxy authority".to_string(),
                })
            }
        };
        let proxy = ProxySettings::from_host_port(&host, port)?;
        request.set_connection(connection.derive(&current, ProxyChoice::Use(proxy))?);
        self.state.new_con = true;
        tracing::debug!(proxy = %format!("{}:{}", host, port), "switching to proxy from 305");

        if request.stream().is_some() {
            return self.park(response, request, context);
        }
        response.close_body();
        Ok(if request.body().is_empty() {
            ResponseOutcome::ResendNewCon
        } else {
            ResponseOutcome::SendNewCon
        })
    }
}

impl Module for RedirectionModule {
    fn name(&self) -> &'static str {
        "redirection"
    }

    fn request_handler(
        &mut self,
        request: &mut Request,
        context: &ClientContext,
    ) -> Result<RequestOutcome, NetError> {
        if let Some(ticket) = request.stream().map(|s| s.ticket()) {
            if let Some(entry) = context.deferred().take(ticket, DeferredKind::Redirection) {
                if let DeferredState::Redirection(state) = entry.state {
                    self.state = state;
                    request.copy_from(entry.request);
                    tracing::debug!(ticket = ticket.id(), "resuming deferred redirect");
                    return Ok(if self.state.new_con {
                        RequestOutcome::NewConRestart
                    } else {
                        RequestOutcome::Restart
                    });
                }
            }
        }

        let current = request.absolute_uri()?;
        let Some(target) = context.redirects().lookup(&current) else {
            return Ok(RequestOutcome::Continue);
        };
        tracing::debug!(from = %current, to = %target, "using cached permanent redirect");

        let connection = Arc::clone(request.connection());
        request.set_target(&path_and_query(&target));
        self.state.last_uri = Some(target.clone());
        if connection.is_compatible_with(&target) {
            Ok(RequestOutcome::Restart)
        } else {
            request.set_connection(connection.derive(&target, ProxyChoice::Inherit)?);
            request.headers_mut().remove("Authorization");
            Ok(RequestOutcome::NewConRestart)
        }
    }

    fn response_phase1(
        &mut self,
        response: &mut Response,
        _request: &Request,
        _context: &ClientContext,
    ) -> Result<Phase1Outcome, NetError> {
        // Redirect statuses are stamped in phase 2, once it is known
        // whether they are followed.
        if !is_redirect(response.status()) {
            self.stamp(response);
        }
        Ok(Phase1Outcome::Continue)
    }

    fn response_phase2(
        &mut self,
        response: &mut Response,
        request: &mut Request,
        context: &ClientContext,
    ) -> Result<ResponseOutcome, NetError> {
        let status = response.status();
        if !is_redirect(status) {
            return Ok(ResponseOutcome::Continue);
        }
        let method = request.method().clone();
        let safe = method == Method::GET || method == Method::HEAD;

        match status.as_u16() {
            301 if !safe => {
                if let Some(location) = Self::location(response) {
                    let current = request.absolute_uri()?;
                    let target = resolve_location(&current, &location)?;
                    context.redirects().insert(&current, &target);
                }
                tracing::debug!(%method, "301 on unsafe method; cached, not followed");
                self.stamp(response);
                Ok(ResponseOutcome::Continue)
            }
            301 | 307 => self.follow(response, request, context, false),
            302 => {
                let downgrade = method == Method::POST || method == Method::PUT;
                self.follow(response, request, context, downgrade)
            }
            303 => self.follow(response, request, context, true),
            305 => self.use_proxy(response, request, context),
            _ => {
                self.stamp(response);
                Ok(ResponseOutcome::Continue)
            }
        }
    }
}
