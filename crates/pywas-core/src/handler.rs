//! The seams between the protocol driver and the request handler.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{HandlerError, SinkError};
use crate::request::Request;
use crate::response::Response;

/// Two-phase response destination for one exchange.
///
/// `commit_headers` is called exactly once, then `write_body` any number of
/// times. Implementations reject out-of-order calls.
pub trait OutputSink {
    fn commit_headers(&mut self, response: Response) -> Result<(), SinkError>;

    fn write_body(&mut self, data: &[u8]) -> Result<(), SinkError>;

    fn headers_committed(&self) -> bool;
}

/// A sink shared between the driver and whatever the handler hands it to.
///
/// Everything runs on one thread; the `RefCell` is never borrowed across a
/// call into the hosted application.
pub type SharedSink = Rc<RefCell<dyn OutputSink>>;

/// Processes one exchange start-to-finish.
pub trait RequestHandler {
    fn process(&self, request: Request, sink: SharedSink) -> Result<(), HandlerError>;
}

impl<F> RequestHandler for F
where
    F: Fn(Request, SharedSink) -> Result<(), HandlerError>,
{
    fn process(&self, request: Request, sink: SharedSink) -> Result<(), HandlerError> {
        self(request, sink)
    }
}
