//! Client Context - the state one logical client shares across requests.
//!
//! Bundles the caches both protocol modules consult (credentials, proxy
//! credentials, permanent redirects, deferred retries) together with the
//! credential hooks and tuning knobs. Two contexts never see each other's
//! cache entries.

use crate::http::authhandler::{AuthHandler, DefaultAuthHandler};
use crate::socket::authcache::{AuthCache, AuthPrompter, ProxyAuthCache};
use crate::urlrequest::deferred::DeferredRetries;
use crate::urlrequest::redirectcache::RedirectCache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Configuration options for ClientContext.
#[derive(Debug, Clone)]
pub struct ClientContextConfig {
    /// Park module state for streamed bodies instead of leaving 3xx/401/407
    /// responses unhandled.
    pub defer_streamed: bool,

    /// May modules prompt for credentials at all.
    pub allow_ui: bool,

    /// Redirects followed per exchange.
    pub max_redirects: u32,

    /// 401/407 responses tolerated per exchange before giving up.
    pub max_auth_attempts: u32,

    /// Request-phase restarts tolerated per send.
    pub max_request_restarts: u32,
}

impl Default for ClientContextConfig {
    fn default() -> Self {
        Self {
            defer_streamed: false,
            allow_ui: true,
            max_redirects: 15,
            max_auth_attempts: 10,
            max_request_restarts: 32,
        }
    }
}

/// Opaque identity of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ContextId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

pub struct ClientContext {
    id: ContextId,
    config: ClientContextConfig,
    auth_cache: AuthCache,
    proxy_auth: ProxyAuthCache,
    redirects: RedirectCache,
    deferred: DeferredRetries,
    auth_handler: Arc<dyn AuthHandler>,
    prompter: Option<Arc<dyn AuthPrompter>>,
}

impl std::fmt::Debug for ClientContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientContext")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("auth_cache", &self.auth_cache)
            .field("proxy_auth", &self.proxy_auth)
            .field("redirects", &self.redirects.len())
            .field("deferred", &self.deferred.len())
            .field("prompter", &self.prompter.is_some())
            .finish()
    }
}

impl ClientContext {
    /// Create a new ClientContext with default configuration.
    pub fn new() -> Self {
        Self::with_config(ClientContextConfig::default())
    }

    /// Create a new ClientContext with custom configuration.
    pub fn with_config(config: ClientContextConfig) -> Self {
        Self {
            id: ContextId::next(),
            config,
            auth_cache: AuthCache::new(),
            proxy_auth: ProxyAuthCache::new(),
            redirects: RedirectCache::new(),
            deferred: DeferredRetries::new(),
            auth_handler: Arc::new(DefaultAuthHandler),
            prompter: None,
        }
    }

    /// Replace the credential fixup hook.
    pub fn with_auth_handler(mut self, handler: Arc<dyn AuthHandler>) -> Self {
        self.auth_handler = handler;
        self
    }

    pub fn with_prompter(mut self, prompter: Arc<dyn AuthPrompter>) -> Self {
        self.prompter = Some(prompter);
        self
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn config(&self) -> &ClientContextConfig {
        &self.config
    }

    pub fn auth_cache(&self) -> &AuthCache {
        &self.auth_cache
    }

    pub fn proxy_auth(&self) -> &ProxyAuthCache {
        &self.proxy_auth
    }

    pub fn redirects(&self) -> &RedirectCache {
        &self.redirects
    }

    pub fn deferred(&self) -> &DeferredRetries {
        &self.deferred
    }

    pub fn auth_handler(&self) -> &dyn AuthHandler {
        self.auth_handler.as_ref()
    }

    /// The prompter, unless UI is disabled for this context.
    pub fn prompter(&self) -> Option<&dyn AuthPrompter> {
        if self.config.allow_ui {
            self.prompter.as_deref()
        } else {
            None
        }
    }
}

impl Default for ClientContext {
    fn default() -> Self {
        Self::new()
    }
}
