/// Progress of one request/response exchange through the module pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    /// The exchange has not started.
    #[default]
    Idle,

    /// Modules are inspecting or rewriting the outgoing request.
    RunningRequestModules,

    /// The request has been handed to the connection; waiting for the
    /// status line and headers.
    WaitingForResponse,

    /// Response phase 1 (observation only).
    ObservingResponse,

    /// Response phase 2 (modules may force a resend).
    HandlingResponse,

    /// Response phase 3 (cleanup).
    FinishingResponse,

    /// The response has been finalized and handed to the caller.
    Done,
}

impl LoadState {
    /// True while the pipeline is still driving the exchange.
    pub fn is_active(self) -> bool {
        !matches!(self, LoadState::Idle | LoadState::Done)
    }
}
