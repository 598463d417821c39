//! The pipeline engine.
//!
//! One [`HttpTransaction`] drives one logical exchange: the request phase,
//! dispatch, then the three response phases, looping whenever a module
//! asks for a restart or a resend.

use crate::base::loadstate::LoadState;
use crate::base::neterror::NetError;
use crate::http::authorization::AuthorizationModule;
use crate::http::module::{Module, ModuleFactory, Phase1Outcome, RequestOutcome, ResponseOutcome};
use crate::http::redirection::RedirectionModule;
use crate::http::request::Request;
use crate::http::response::{HttpResponse, Response, TrailerHooks};
use crate::urlrequest::context::ClientContext;
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Ordered list of module factories. Cheap to clone and shared by every
/// exchange of a client.
#[derive(Clone)]
pub struct Pipeline {
    factories: Vec<Arc<dyn ModuleFactory>>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("modules", &self.factories.len())
            .finish()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl Pipeline {
    /// A pipeline without modules: requests go straight to the wire.
    pub fn empty() -> Self {
        Self {
            factories: Vec::new(),
        }
    }

    /// Redirection, then Authorization.
    pub fn with_defaults() -> Self {
        Self::empty()
            .with_module(|| Box::new(RedirectionModule::new()) as Box<dyn Module>)
            .with_module(|| Box::new(AuthorizationModule::new()) as Box<dyn Module>)
    }

    /// Append a module; it runs after the ones already present.
    pub fn with_module(mut self, factory: impl ModuleFactory + 'static) -> Self {
        self.factories.push(Arc::new(factory));
        self
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    fn create_modules(&self) -> Vec<Box<dyn Module>> {
        self.factories.iter().map(|f| f.create()).collect()
    }

    /// Run `request` through fresh modules and return the settled response.
    pub async fn process(
        &self,
        request: Request,
        context: &Arc<ClientContext>,
    ) -> Result<HttpResponse, NetError> {
        HttpTransaction::new(self, request, Arc::clone(context))
            .start()
            .await
    }
}

/// Internal state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    RequestPhase,
    Dispatch,
    Phase1,
    Phase2,
    Phase3,
    Done,
}

impl State {
    /// Map internal state to public LoadState.
    fn to_load_state(self) -> LoadState {
        match self {
            State::Idle => LoadState::Idle,
            State::RequestPhase => LoadState::RunningRequestModules,
            State::Dispatch => LoadState::WaitingForResponse,
            State::Phase1 => LoadState::ObservingResponse,
            State::Phase2 => LoadState::HandlingResponse,
            State::Phase3 => LoadState::FinishingResponse,
            State::Done => LoadState::Done,
        }
    }
}

/// How phase 2 settled.
enum Settled {
    /// Processing is over; `run_phase3` is false after a short circuit.
    Finish { run_phase3: bool },
    Restart,
    Resend(ResponseOutcome),
}

pub struct HttpTransaction {
    modules: Vec<Box<dyn Module>>,
    request: Request,
    context: Arc<ClientContext>,
    state: State,
    /// The caller's URI, fixed before any module runs.
    original_uri: Option<Url>,
}

impl fmt::Debug for HttpTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransaction")
            .field("state", &self.state)
            .field("modules", &self.modules.len())
            .field("request", &self.request)
            .finish()
    }
}

impl HttpTransaction {
    pub fn new(pipeline: &Pipeline, request: Request, context: Arc<ClientContext>) -> Self {
        Self {
            modules: pipeline.create_modules(),
            original_uri: request.absolute_uri().ok(),
            request,
            context,
            state: State::Idle,
        }
    }

    /// Get the current load state (for progress reporting).
    pub fn get_load_state(&self) -> LoadState {
        self.state.to_load_state()
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    fn enter(&mut self, state: State) {
        tracing::trace!(from = ?self.state, to = ?state, "transaction state");
        self.state = state;
    }

    /// Run the exchange to completion.
    pub async fn start(mut self) -> Result<HttpResponse, NetError> {
        self.run_request_phase()?;
        let mut response = self.dispatch().await?;
        let max_restarts = self.context.config().max_request_restarts;
        let mut restarts = 0u32;

        loop {
            if self.run_phase1(&mut response)? == Phase1Outcome::Restart {
                restarts += 1;
                if restarts > max_restarts {
                    return Err(NetError::TooManyRequestRestarts(max_restarts));
                }
                continue;
            }

            match self.run_phase2(&mut response)? {
                Settled::Finish { run_phase3 } => {
                    if run_phase3 {
                        self.run_phase3(&mut response)?;
                    }
                    break;
                }
                Settled::Restart => {
                    restarts += 1;
                    if restarts > max_restarts {
                        return Err(NetError::TooManyRequestRestarts(max_restarts));
                    }
                }
                Settled::Resend(outcome) => {
                    response.close_body();
                    self.flush_trailers(&response)?;
                    self.request.record_retry();

                    if self.request.is_internal_subrequest() {
                        tracing::debug!(?outcome, "returning resend to internal caller");
                        let pending = self.request.clone();
                        return Ok(self.finish(response).with_pending_request(pending));
                    }

                    tracing::debug!(
                        ?outcome,
                        retries = self.request.num_retries(),
                        "resending request"
                    );
                    if outcome.reruns_request_phase() {
                        self.run_request_phase()?;
                    }
                    response = self.dispatch().await?;
                    restarts = 0;
                }
            }
        }

        Ok(self.finish(response))
    }

    fn run_request_phase(&mut self) -> Result<(), NetError> {
        self.enter(State::RequestPhase);
        let max_restarts = self.context.config().max_request_restarts;
        let mut restarts = 0u32;

        'restart: loop {
            for module in self.modules.iter_mut() {
                if self.request.is_aborted() {
                    return Ok(());
                }
                match module.request_handler(&mut self.request, &self.context)? {
                    RequestOutcome::Continue => {}
                    outcome @ (RequestOutcome::Restart | RequestOutcome::NewConRestart) => {
                        restarts += 1;
                        tracing::debug!(module = module.name(), ?outcome, restarts, "request phase restart");
                        if restarts > max_restarts {
                            return Err(NetError::TooManyRequestRestarts(max_restarts));
                        }
                        continue 'restart;
                    }
                }
            }
            return Ok(());
        }
    }

    async fn dispatch(&mut self) -> Result<Response, NetError> {
        self.enter(State::Dispatch);
        let connection = Arc::clone(self.request.connection());
        tracing::debug!(
            method = %self.request.method(),
            host = connection.host(),
            port = connection.port(),
            target = self.request.target(),
            "dispatching request"
        );
        let response = connection.dispatch(&self.request).await?;
        tracing::debug!(status = response.status().as_u16(), "response head received");
        Ok(response)
    }

    fn run_phase1(&mut self, response: &mut Response) -> Result<Phase1Outcome, NetError> {
        self.enter(State::Phase1);
        for module in self.modules.iter_mut() {
            if self.request.is_aborted() {
                break;
            }
            if module.response_phase1(response, &self.request, &self.context)? == Phase1Outcome::Restart {
                tracing::debug!(module = module.name(), "phase 1 restart");
                return Ok(Phase1Outcome::Restart);
            }
        }
        Ok(Phase1Outcome::Continue)
    }

    fn run_phase2(&mut self, response: &mut Response) -> Result<Settled, NetError> {
        self.enter(State::Phase2);
        for module in self.modules.iter_mut() {
            if self.request.is_aborted() {
                break;
            }
            let outcome = module.response_phase2(response, &mut self.request, &self.context)?;
            tracing::trace!(module = module.name(), ?outcome, "phase 2");
            match outcome {
                ResponseOutcome::Continue => {}
                ResponseOutcome::Restart => return Ok(Settled::Restart),
                ResponseOutcome::ShortCircuit => return Ok(Settled::Finish { run_phase3: false }),
                resend => return Ok(Settled::Resend(resend)),
            }
        }
        Ok(Settled::Finish { run_phase3: true })
    }

    fn run_phase3(&mut self, response: &mut Response) -> Result<(), NetError> {
        self.enter(State::Phase3);
        for module in self.modules.iter_mut() {
            if self.request.is_aborted() {
                break;
            }
            module.response_phase3(response, &self.request, &self.context)?;
        }
        Ok(())
    }

    /// Run trailer handlers for a response being abandoned, if its
    /// trailers are already known.
    fn flush_trailers(&mut self, response: &Response) -> Result<(), NetError> {
        let Some(trailers) = response.trailers() else {
            return Ok(());
        };
        for module in self.modules.iter_mut() {
            if self.request.is_aborted() {
                break;
            }
            module.trailer_handler(trailers, &self.request, &self.context)?;
        }
        Ok(())
    }

    fn finish(mut self, response: Response) -> HttpResponse {
        self.enter(State::Done);
        let original_uri = self.original_uri.take();
        let hooks = if self.request.is_aborted() {
            None
        } else {
            Some(TrailerHooks {
                modules: self.modules,
                request: self.request,
                context: self.context,
            })
        };
        let response = response.finalize(hooks);
        match original_uri {
            Some(uri) => response.with_original_uri(uri),
            None => response,
        }
    }
}
