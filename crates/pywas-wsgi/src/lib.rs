//! pywas-wsgi: The PEP 3333 calling convention on top of pywas-core.
//!
//! ```text
//! Request ──► environ (dict) ─┐
//!                             ├──► app(environ, start_response) ──► iterable
//! SharedSink ◄── CallContext ◄┘                                       │
//!      ▲                                                              │
//!      └──────────── commit on first non-empty chunk / exhaustion ◄───┘
//! ```
//!
//! [`WsgiHandler`] implements [`RequestHandler`](pywas_core::RequestHandler);
//! everything else in this crate is the machinery it drives for one
//! exchange.

pub mod context;
pub mod environ;
pub mod handler;
pub mod input;
pub mod start_response;

pub use context::{CallContext, CommitState};
pub use environ::{build_environ, translate_header, SERVER_SOFTWARE};
pub use handler::WsgiHandler;
pub use input::WsgiInput;
pub use start_response::StartResponse;
