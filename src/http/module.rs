//! The contract between the pipeline engine and its protocol modules.
//!
//! A module sees every exchange four times: once before the request is
//! sent and three times after the response head arrives. Each call returns
//! a small outcome enum that tells the engine how to proceed.

use crate::base::neterror::NetError;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::urlrequest::context::ClientContext;
use http::HeaderMap;

/// Result of the request phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Continue,
    /// Run the request phase again from the first module.
    Restart,
    /// Like `Restart`; the module already swapped `Request::connection`.
    NewConRestart,
}

/// Result of response phase 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase1Outcome {
    Continue,
    /// Redo phase 1 from the first module.
    Restart,
}

/// Result of response phase 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseOutcome {
    Continue,
    /// Re-enter the response loop at phase 1, first module.
    Restart,
    /// Stop phase 2 here and skip phase 3.
    ShortCircuit,
    /// Re-run the request phase, then send on the same connection.
    Resend,
    /// Re-run the request phase, then send on the connection the module
    /// installed.
    ResendNewCon,
    /// Send the request as modified, skipping the request phase.
    Send,
    /// `Send` on the connection the module installed.
    SendNewCon,
}

impl ResponseOutcome {
    /// True for outcomes that put a new request on the wire.
    pub fn is_resend(self) -> bool {
        matches!(
            self,
            ResponseOutcome::Resend
                | ResponseOutcome::ResendNewCon
                | ResponseOutcome::Send
                | ResponseOutcome::SendNewCon
        )
    }

    /// True if the request phase runs before the resend.
    pub fn reruns_request_phase(self) -> bool {
        matches!(self, ResponseOutcome::Resend | ResponseOutcome::ResendNewCon)
    }
}

/// A protocol behavior plugged into the pipeline.
///
/// One instance serves exactly one exchange; state that must outlive the
/// exchange goes through the caches on [`ClientContext`].
pub trait Module: Send {
    fn name(&self) -> &'static str;

    fn request_handler(
        &mut self,
        request: &mut Request,
        context: &ClientContext,
    ) -> Result<RequestOutcome, NetError>;

    /// Observe the response head. No resends from here.
    fn response_phase1(
        &mut self,
        response: &mut Response,
        request: &Request,
        context: &ClientContext,
    ) -> Result<Phase1Outcome, NetError>;

    /// Decide what happens to the response.
    fn response_phase2(
        &mut self,
        response: &mut Response,
        request: &mut Request,
        context: &ClientContext,
    ) -> Result<ResponseOutcome, NetError>;

    /// Cleanup once processing has settled.
    fn response_phase3(
        &mut self,
        _response: &mut Response,
        _request: &Request,
        _context: &ClientContext,
    ) -> Result<(), NetError> {
        Ok(())
    }

    /// Called once the body has been read and trailers are known.
    fn trailer_handler(
        &mut self,
        _trailers: &HeaderMap,
        _request: &Request,
        _context: &ClientContext,
    ) -> Result<(), NetError> {
        Ok(())
    }
}

/// Creates a fresh module for each exchange.
pub trait ModuleFactory: Send + Sync {
    fn create(&self) -> Box<dyn Module>;
}

impl<F> ModuleFactory for F
where
    F: Fn() -> Box<dyn Module> + Send + Sync,
{
    fn create(&self) -> Box<dyn Module> {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resend_classification() {
        assert!(ResponseOutcome::Resend.is_resend());
        assert!(ResponseOutcome::SendNewCon.is_resend());
        assert!(!ResponseOutcome::Restart.is_resend());
        assert!(!ResponseOutcome::ShortCircuit.is_resend());

        assert!(ResponseOutcome::ResendNewCon.reruns_request_phase());
        assert!(!ResponseOutcome::Send.reruns_request_phase());
    }
}
