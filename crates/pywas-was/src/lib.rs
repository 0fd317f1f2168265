//! pywas-was: The Web Application Socket side of the bridge.
//!
//! A WAS peer (the web server) talks to one application process over three
//! pipes:
//!
//! ```text
//!              control (fd 3, bidirectional packets)
//! web server ◄══════════════════════════════════════► pywas
//!            ───── request body  (fd 0) ────────────►
//!            ◄──── response body (fd 1) ─────────────
//! ```
//!
//! Layers, bottom-up:
//!
//! - [`protocol`]: packet framing and payload codecs
//! - [`transport`]: the [`Transport`] trait the driver consumes
//! - [`connection`]: [`WasConnection`], a blocking `Transport` over pipes
//! - [`input`] / [`sink`]: request body stream and response sink on top of a
//!   shared transport
//! - [`driver`]: the accept loop that turns exchanges into
//!   [`Request`](pywas_core::Request)s for a
//!   [`RequestHandler`](pywas_core::RequestHandler)

pub mod connection;
pub mod driver;
pub mod error;
pub mod input;
pub mod protocol;
pub mod sink;
pub mod transport;

#[cfg(test)]
mod testing;

pub use connection::WasConnection;
pub use driver::{Driver, ExchangeOutcome};
pub use error::{ProtocolError, TransportError};
pub use input::WasInput;
pub use protocol::Command;
pub use sink::WasResponder;
pub use transport::Transport;
