//! Response body access.
//!
//! A body is either already in memory or still on the wire. Reading it
//! consumes the live stream; trailers only become known once the whole
//! body has been read.

use crate::base::neterror::NetError;
use bytes::Bytes;
use http::HeaderMap;
use hyper::body::Incoming;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Alias for the `Future` returned by [`BodySource::collect`].
pub type Collecting = Pin<Box<dyn Future<Output = Result<(Bytes, Option<HeaderMap>), NetError>> + Send>>;

/// A body still being received.
pub trait BodySource: Send {
    /// Read to the end, returning the data and any trailers.
    fn collect(self: Box<Self>) -> Collecting;
}

impl BodySource for Incoming {
    fn collect(self: Box<Self>) -> Collecting {
        Box::pin(async move {
            use http_body_util::BodyExt;
            let collected = BodyExt::collect(*self)
                .await
                .map_err(|_| NetError::HttpBodyError)?;
            let trailers = collected.trailers().cloned();
            Ok((collected.to_bytes(), trailers))
        })
    }
}

/// A fully received body that still reports trailers, for transports that
/// buffer internally.
#[derive(Debug, Clone, Default)]
pub struct Prebuffered {
    pub data: Bytes,
    pub trailers: Option<HeaderMap>,
}

impl BodySource for Prebuffered {
    fn collect(self: Box<Self>) -> Collecting {
        Box::pin(async move { Ok((self.data, self.trailers)) })
    }
}

#[derive(Default)]
pub enum ResponseBody {
    #[default]
    Empty,
    Buffered(Bytes),
    Streaming(Box<dyn BodySource>),
    /// Dropped before it was read.
    Closed,
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Empty => f.write_str("Empty"),
            ResponseBody::Buffered(b) => f.debug_tuple("Buffered").field(&b.len()).finish(),
            ResponseBody::Streaming(_) => f.write_str("Streaming"),
            ResponseBody::Closed => f.write_str("Closed"),
        }
    }
}

impl ResponseBody {
    /// Wrap a hyper body still on the wire.
    pub fn new(inner: Incoming) -> Self {
        ResponseBody::Streaming(Box::new(inner))
    }

    pub fn from_source(source: impl BodySource + 'static) -> Self {
        ResponseBody::Streaming(Box::new(source))
    }

    /// Drop the live stream without reading it.
    pub fn close(&mut self) {
        if matches!(self, ResponseBody::Streaming(_)) {
            *self = ResponseBody::Closed;
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, ResponseBody::Closed)
    }

    /// Read the entire body together with its trailers.
    pub async fn collect(self) -> Result<(Bytes, Option<HeaderMap>), NetError> {
        match self {
            ResponseBody::Empty => Ok((Bytes::new(), None)),
            ResponseBody::Buffered(b) => Ok((b, None)),
            ResponseBody::Streaming(source) => source.collect().await,
            ResponseBody::Closed => Err(NetError::HttpBodyError),
        }
    }

    /// Read entire body as bytes.
    pub async fn bytes(self) -> Result<Bytes, NetError> {
        Ok(self.collect().await?.0)
    }

    /// Read body as UTF-8 string.
    pub async fn text(self) -> Result<String, NetError> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(|_| NetError::InvalidUtf8)
    }

    /// Read body as JSON, deserializing to type T.
    #[cfg(feature = "json")]
    pub async fn json<T: serde::de::DeserializeOwned>(self) -> Result<T, NetError> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|_| NetError::JsonParseError)
    }
}

impl From<Bytes> for ResponseBody {
    fn from(b: Bytes) -> Self {
        ResponseBody::Buffered(b)
    }
}

impl From<&'static str> for ResponseBody {
    fn from(s: &'static str) -> Self {
        ResponseBody::Buffered(Bytes::from_static(s.as_bytes()))
    }
}
