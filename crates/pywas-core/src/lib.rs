//! pywas-core: Shared vocabulary for the WAS ⇄ WSGI bridge.
//!
//! The protocol side (`pywas-was`) builds a [`Request`] per exchange and
//! hands it, together with an [`OutputSink`], to a [`RequestHandler`]. The
//! handler (normally `pywas-wsgi`) fills a [`Response`] and streams the body
//! back through the sink.
//!
//! # Data flow
//!
//! ```text
//! transport ──► Request ──► RequestHandler::process ──► OutputSink
//!                  │                                      │
//!                  └── InputStream (body, read once)      ├── commit_headers(Response)
//!                                                         └── write_body(bytes)*
//! ```
//!
//! All strings that come off the wire (paths, header names and values) are
//! kept as raw bytes. Conversion to the hosted runtime's text type happens at
//! the calling-convention boundary, not here.

pub mod body;
pub mod config;
pub mod error;
pub mod handler;
pub mod header;
pub mod http;
pub mod request;
pub mod response;

pub use body::{BufferedInput, EmptyInput, InputStream};
pub use config::BridgeConfig;
pub use error::{HandlerError, InputError, ResponseError, SinkError};
pub use handler::{OutputSink, RequestHandler, SharedSink};
pub use header::{Header, HeaderMap};
pub use http::{Method, Scheme};
pub use request::{Request, Uri};
pub use response::Response;
