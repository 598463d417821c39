//! Request body for POST/PUT operations.
//!
//! A body is either in memory or a one-shot output stream that only the
//! caller can refill. Streamed bodies are registered once and receive a
//! [`StreamTicket`]; the ticket, not the stream's address, identifies the
//! request in the deferred-retry table.

use crate::base::neterror::NetError;
use bytes::Bytes;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A caller-owned output stream carrying the request entity.
///
/// The pipeline only ever calls [`reset`](OutputStream::reset); transports
/// read the written bytes through [`contents`](OutputStream::contents).
pub trait OutputStream: Send + Sync {
    /// Rewind the stream so the caller can write the entity again.
    fn reset(&self) -> Result<(), NetError>;

    /// Bytes written so far.
    fn contents(&self) -> Bytes;
}

/// Identity of a registered output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamTicket(u64);

impl StreamTicket {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        StreamTicket(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// A registered output stream. Clones share the ticket and the stream.
#[derive(Clone)]
pub struct StreamBody {
    ticket: StreamTicket,
    stream: Arc<dyn OutputStream>,
}

impl StreamBody {
    /// Register a stream and hand out its ticket.
    pub fn register(stream: Arc<dyn OutputStream>) -> Self {
        Self {
            ticket: StreamTicket::next(),
            stream,
        }
    }

    pub fn ticket(&self) -> StreamTicket {
        self.ticket
    }

    pub fn reset(&self) -> Result<(), NetError> {
        self.stream.reset()
    }

    pub fn contents(&self) -> Bytes {
        self.stream.contents()
    }
}

impl fmt::Debug for StreamBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamBody")
            .field("ticket", &self.ticket)
            .finish()
    }
}

/// In-memory [`OutputStream`].
#[derive(Debug, Default)]
pub struct BufferedOutputStream {
    buf: Mutex<Vec<u8>>,
    resets: AtomicUsize,
}

impl BufferedOutputStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes to the entity.
    pub fn write(&self, data: &[u8]) -> Result<(), NetError> {
        self.buf
            .lock()
            .map_err(|_| NetError::HttpBodyError)?
            .extend_from_slice(data);
        Ok(())
    }

    /// How many times the pipeline asked for a rewind.
    pub fn reset_count(&self) -> usize {
        self.resets.load(Ordering::Relaxed)
    }
}

impl OutputStream for BufferedOutputStream {
    fn reset(&self) -> Result<(), NetError> {
        self.buf
            .lock()
            .map_err(|e| NetError::StreamReset(e.to_string()))?
            .clear();
        self.resets.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn contents(&self) -> Bytes {
        self.buf
            .lock()
            .map(|b| Bytes::copy_from_slice(&b))
            .unwrap_or_default()
    }
}

/// Request body for HTTP methods that send data.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    /// No body (GET, HEAD, DELETE).
    #[default]
    Empty,
    /// Body with raw bytes.
    Bytes(Bytes),
    /// Body written by the caller to an output stream.
    Stream(StreamBody),
}

impl From<String> for RequestBody {
    fn from(s: String) -> Self {
        RequestBody::Bytes(Bytes::from(s))
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(v: Vec<u8>) -> Self {
        RequestBody::Bytes(Bytes::from(v))
    }
}

impl From<&str> for RequestBody {
    fn from(s: &str) -> Self {
        RequestBody::Bytes(Bytes::from(s.to_owned()))
    }
}

impl From<Bytes> for RequestBody {
    fn from(b: Bytes) -> Self {
        RequestBody::Bytes(b)
    }
}

impl From<StreamBody> for RequestBody {
    fn from(s: StreamBody) -> Self {
        RequestBody::Stream(s)
    }
}

impl RequestBody {
    /// Check if the body is empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, RequestBody::Empty)
    }

    /// The stream, if this body is streamed.
    pub fn stream(&self) -> Option<&StreamBody> {
        match self {
            RequestBody::Stream(s) => Some(s),
            _ => None,
        }
    }

    /// Bytes to put on the wire.
    pub fn to_bytes(&self) -> Bytes {
        match self {
            RequestBody::Empty => Bytes::new(),
            RequestBody::Bytes(b) => b.clone(),
            RequestBody::Stream(s) => s.contents(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_body() {
        let body = RequestBody::Empty;
        assert!(body.is_empty());
        assert!(body.to_bytes().is_empty());
        assert!(body.stream().is_none());
    }

    #[test]
    fn test_from_string() {
        let body: RequestBody = "hello world".to_string().into();
        assert_eq!(body.to_bytes().len(), 11);
    }

    #[test]
    fn test_from_vec() {
        let body: RequestBody = vec![1u8, 2, 3, 4].into();
        assert_eq!(body.to_bytes().as_ref(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_tickets_are_unique() {
        let a = StreamBody::register(Arc::new(BufferedOutputStream::new()));
        let b = StreamBody::register(Arc::new(BufferedOutputStream::new()));
        assert_ne!(a.ticket(), b.ticket());
        assert_eq!(a.clone().ticket(), a.ticket());
    }

    #[test]
    fn test_stream_body_contents_and_reset() {
        let out = Arc::new(BufferedOutputStream::new());
        out.write(b"payload").unwrap();
        let body: RequestBody = StreamBody::register(out.clone()).into();

        assert_eq!(body.to_bytes(), Bytes::from_static(b"payload"));
        body.stream().unwrap().reset().unwrap();
        assert!(body.to_bytes().is_empty());
        assert_eq!(out.reset_count(), 1);
    }
}
