//! Deferred-retry table.
//!
//! When a module cannot resend a request because its body is a one-shot
//! stream, it parks its state here under the stream's ticket and asks the
//! caller to resend. The next request carrying the same ticket picks the
//! state up again. Each entry is taken exactly once.

use crate::http::authorization::AuthSnapshot;
use crate::http::redirection::RedirectSnapshot;
use crate::http::request::Request;
use crate::http::requestbody::StreamTicket;
use dashmap::DashMap;
use std::sync::Arc;

/// Which module parked the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeferredKind {
    Authorization,
    Redirection,
}

#[derive(Debug, Clone)]
pub enum DeferredState {
    Authorization(Box<AuthSnapshot>),
    Redirection(RedirectSnapshot),
}

impl DeferredState {
    pub fn kind(&self) -> DeferredKind {
        match self {
            DeferredState::Authorization(_) => DeferredKind::Authorization,
            DeferredState::Redirection(_) => DeferredKind::Redirection,
        }
    }
}

/// Module state plus the request as it was when handling was deferred.
#[derive(Debug, Clone)]
pub struct DeferredEntry {
    pub request: Request,
    pub state: DeferredState,
}

#[derive(Debug, Clone, Default)]
pub struct DeferredRetries {
    entries: Arc<DashMap<(StreamTicket, DeferredKind), DeferredEntry>>,
}

impl DeferredRetries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn defer(&self, ticket: StreamTicket, entry: DeferredEntry) {
        let kind = entry.state.kind();
        tracing::debug!(ticket = ticket.id(), ?kind, "deferring module state");
        self.entries.insert((ticket, kind), entry);
    }

    /// Remove and return the entry for `ticket`, if any.
    pub fn take(&self, ticket: StreamTicket, kind: DeferredKind) -> Option<DeferredEntry> {
        self.entries.remove(&(ticket, kind)).map(|(_, entry)| entry)
    }

    pub fn contains(&self, ticket: StreamTicket, kind: DeferredKind) -> bool {
        self.entries.contains_key(&(ticket, kind))
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
    use crate::http::requestbody::{BufferedOutputStream, StreamBody};
    use crate::http::streamfactory::HttpConnection;
    use http::Method;
    use url::Url;

    #[test]
    fn test_take_once() {
        let url = Url::parse("http://h/").unwrap();
        let stream = StreamBody::register(Arc::new(BufferedOutputStream::new()));
        let ticket = stream.ticket();
        let request = Request::new(Arc::new(HttpConnection::new(&url).unwrap()), Method::PUT, "/")
            .with_body(stream);

        let table = DeferredRetries::new();
        table.defer(
            ticket,
            DeferredEntry {
                request,
                state: DeferredState::Redirection(RedirectSnapshot::default()),
            },
        );

        assert!(table.contains(ticket, DeferredKind::Redirection));
        assert!(table.take(ticket, DeferredKind::Authorization).is_none());
        assert!(table.take(ticket, DeferredKind::Redirection).is_some());
        assert!(table.take(ticket, DeferredKind::Redirection).is_none());
        assert!(table.is_empty());
    }
}
