use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum NetError {
    // Connection Errors
    #[error("Connection closed (TCP FIN)")]
    ConnectionClosed,
    #[error("Connection reset (TCP RST)")]
    ConnectionReset,
    #[error("Connection refused")]
    ConnectionRefused,
    #[error("Connection aborted")]
    ConnectionAborted,
    #[error("Connection failed")]
    ConnectionFailed,
    #[error("Name not resolved")]
    NameNotResolved,
    #[error("Connection timed out")]
    ConnectionTimedOut,
    #[error("Connection to {host}:{port} failed: {reason}")]
    ConnectionFailedTo {
        host: String,
        port: u16,
        reason: String,
    },
    #[error("Could not resolve {domain}: {reason}")]
    NameNotResolvedFor { domain: String, reason: String },
    #[error("Proxy connection failed")]
    ProxyConnectionFailed,

    // HTTP Errors
    #[error("Invalid URL")]
    InvalidUrl,
    #[error("Invalid header")]
    InvalidHeader,
    #[error("Disallowed URL scheme: {0}")]
    DisallowedUrlScheme(String),
    #[error("Malformed URL in Location header `{location}`: {reason}")]
    InvalidRedirect { location: String, reason: String },
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Invalid response")]
    InvalidResponse,
    #[error("Empty response")]
    EmptyResponse,
    #[error("Unsupported auth scheme: {0}")]
    UnsupportedAuthScheme(String),
    #[error("Response body is not available")]
    HttpBodyError,
    #[error("Output stream could not be reset: {0}")]
    StreamReset(String),
    #[error("Response body is not valid UTF-8")]
    InvalidUtf8,
    #[error("Response body is not valid JSON")]
    JsonParseError,

    // Defects: never retried
    #[error("Bug in authorization handling: server refused the given info {0} times")]
    TooManyAuthAttempts(u32),
    #[error("Request phase restarted {0} times without settling")]
    TooManyRequestRestarts(u32),

    #[error("Unknown error: {0}")]
    Unknown(i32),
}

impl NetError {
    pub fn as_i32(&self) -> i32 {
        match self {
            NetError::ConnectionClosed => -100,
            NetError::ConnectionReset => -101,
            NetError::ConnectionRefused => -102,
            NetError::ConnectionAborted => -103,
            NetError::ConnectionFailed => -104,
            NetError::NameNotResolved => -105,
            NetError::ConnectionTimedOut => -118,
            NetError::ProxyConnectionFailed => -130,

            NetError::InvalidUrl => -300,
            NetError::DisallowedUrlScheme(_) => -301,
            NetError::InvalidRedirect { .. } => -303,
            NetError::InvalidResponse => -320,
            NetError::EmptyResponse => -324,
            NetError::UnsupportedAuthScheme(_) => -339,
            NetError::TooManyAuthAttempts(_) => -375,
            // Custom codes outside Chromium's ranges
            NetError::ConnectionFailedTo { .. } => -10001,
            NetError::NameNotResolvedFor { .. } => -10002,
            NetError::InvalidHeader => -10003,
            NetError::Protocol(_) => -10004,
            NetError::HttpBodyError => -10005,
            NetError::StreamReset(_) => -10006,
            NetError::TooManyRequestRestarts(_) => -10007,
            NetError::InvalidUtf8 => -10008,
            NetError::JsonParseError => -10009,
            NetError::Unknown(code) => *code,
        }
    }

    /// Defects are surfaced immediately and never retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            NetError::TooManyAuthAttempts(_) | NetError::TooManyRequestRestarts(_)
        )
    }

    /// True for failures that originate in the transport (I/O, name resolution).
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            NetError::ConnectionClosed
                | NetError::ConnectionReset
                | NetError::ConnectionRefused
                | NetError::ConnectionAborted
                | NetError::ConnectionFailed
                | NetError::NameNotResolved
                | NetError::ConnectionTimedOut
                | NetError::ConnectionFailedTo { .. }
                | NetError::NameNotResolvedFor { .. }
                | NetError::ProxyConnectionFailed
                | NetError::EmptyResponse
        )
    }

    pub(crate) fn connection_failed_to(host: &str, port: u16, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::ConnectionRefused => NetError::ConnectionRefused,
            std::io::ErrorKind::ConnectionReset => NetError::ConnectionReset,
            std::io::ErrorKind::ConnectionAborted => NetError::ConnectionAborted,
            std::io::ErrorKind::TimedOut => NetError::ConnectionTimedOut,
            _ => NetError::ConnectionFailedTo {
                host: host.to_string(),
                port,
                reason: err.to_string(),
            },
        }
    }

    pub(crate) fn dns_failed(domain: &str, err: std::io::Error) -> Self {
        NetError::NameNotResolvedFor {
            domain: domain.to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<i32> for NetError {
    fn from(code: i32) -> Self {
        match code {
            -100 => NetError::ConnectionClosed,
            -101 => NetError::ConnectionReset,
            -102 => NetError::ConnectionRefused,
            -103 => NetError::ConnectionAborted,
            -104 => NetError::ConnectionFailed,
            -105 => NetError::NameNotResolved,
            -118 => NetError::ConnectionTimedOut,
            -130 => NetError::ProxyConnectionFailed,
            -300 => NetError::InvalidUrl,
            -320 => NetError::InvalidResponse,
            -324 => NetError::EmptyResponse,
            -10003 => NetError::InvalidHeader,
            -10005 => NetError::HttpBodyError,
            _ => NetError::Unknown(code),
        }
    }
}
