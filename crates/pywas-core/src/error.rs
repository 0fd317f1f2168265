//! Error types shared by the bridge crates.

use thiserror::Error;

/// Failure while pulling request body bytes.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("request body read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("request body ended after {received} of {expected} bytes")]
    Truncated { received: u64, expected: u64 },

    #[error("transport error while reading request body: {0}")]
    Transport(String),
}

/// Failure while building a [`Response`](crate::Response).
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("could not parse Content-Length header: '{0}'")]
    InvalidContentLength(String),
}

/// Failure while handing a response to an [`OutputSink`](crate::OutputSink).
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("invalid HTTP response status: {0}")]
    InvalidStatus(u16),

    #[error("response headers were already committed")]
    AlreadyCommitted,

    #[error("response body written before headers were committed")]
    NotCommitted,

    #[error("chunked transfer coding is not supported")]
    ChunkedTransfer,

    #[error("attempting to send {attempted} bytes, but only {remaining} bytes left to send ({excess} bytes over Content-Length)")]
    Overflow {
        attempted: u64,
        remaining: u64,
        excess: u64,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("output error: {0}")]
    Io(#[from] std::io::Error),
}

/// The single failure type crossing the [`RequestHandler`](crate::RequestHandler)
/// boundary. The driver aborts the exchange on any variant.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("application error: {0}")]
    Application(String),

    #[error("start_response was never called")]
    StartResponseNotCalled,

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Input(#[from] InputError),
}
