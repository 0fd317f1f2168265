use std::cell::RefCell;
use std::rc::Rc;

use pyo3::prelude::*;

use pywas_core::{EmptyInput, HandlerError, Request, RequestHandler, SharedSink};
use pywas_host::error::exception_message;
use pywas_host::strings::to_byte_sequence;
use pywas_host::Application;

use crate::context::CallContext;
use crate::environ::build_environ;
use crate::input::WsgiInput;
use crate::start_response::StartResponse;

/// Serves every exchange with one WSGI application.
pub struct WsgiHandler {
    app: Application,
}

impl WsgiHandler {
    pub fn new(app: Application) -> Self {
        Self { app }
    }

    pub fn application(&self) -> &Application {
        &self.app
    }

    fn process_with_gil(
        &self,
        py: Python<'_>,
        mut request: Request,
        sink: SharedSink,
    ) -> Result<(), HandlerError> {
        let body = request.take_body();
        let content_length = body.as_ref().and_then(|b| b.content_length());
        let input = Bound::new(py, WsgiInput::new(body.unwrap_or_else(|| Box::new(EmptyInput))))
            .map_err(|e| application_error(py, e))?;

        let context = Rc::new(RefCell::new(CallContext::new(sink)));
        let result = self.call_application(py, &request, &input, content_length, &context);

        // The application may keep references to either object past this
        // point; both must refuse further use.
        context.borrow_mut().invalidate();
        if let Ok(mut input) = input.try_borrow_mut() {
            input.release();
        }
        result
    }

    fn call_application(
        &self,
        py: Python<'_>,
        request: &Request,
        input: &Bound<'_, WsgiInput>,
        content_length: Option<u64>,
        context: &Rc<RefCell<CallContext>>,
    ) -> Result<(), HandlerError> {
        let environ = build_environ(py, request, input, content_length).map_err(|e| application_error(py, e))?;
        let start_response =
            Bound::new(py, StartResponse::new(context.clone())).map_err(|e| application_error(py, e))?;

        let iterable = self
            .app
            .bind(py)
            .call1((environ, start_response))
            .map_err(|e| application_error(py, e))?;

        let drained = drain(py, &iterable, context).and_then(|()| context.borrow_mut().finish());
        let closed = close(py, &iterable);
        drained?;
        closed
    }
}

impl RequestHandler for WsgiHandler {
    fn process(&self, request: Request, sink: SharedSink) -> Result<(), HandlerError> {
        Python::with_gil(|py| self.process_with_gil(py, request, sink))
    }
}

/// Write every non-empty chunk of the result, committing headers first.
fn drain(py: Python<'_>, iterable: &Bound<'_, PyAny>, context: &Rc<RefCell<CallContext>>) -> Result<(), HandlerError> {
    let chunks = iterable.try_iter().map_err(|e| application_error(py, e))?;
    for chunk in chunks {
        let chunk = chunk.map_err(|e| application_error(py, e))?;
        let bytes = to_byte_sequence(&chunk).map_err(|e| application_error(py, e))?;
        if bytes.is_empty() {
            continue;
        }
        context.borrow_mut().write(&bytes)?;
    }
    Ok(())
}

/// Call `close()` on the result if it has one.
fn close(py: Python<'_>, iterable: &Bound<'_, PyAny>) -> Result<(), HandlerError> {
    if !iterable.hasattr("close").map_err(|e| application_error(py, e))? {
        return Ok(());
    }
    iterable
        .call_method0("close")
        .map(drop)
        .map_err(|e| application_error(py, e))
}

/// Print the traceback to `sys.stderr` and keep the message.
fn application_error(py: Python<'_>, err: PyErr) -> HandlerError {
    err.display(py);
    HandlerError::Application(exception_message(py, &err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::{recording_sink, RecordingSink};
    use pyo3::types::PyModule;
    use pywas_core::{BufferedInput, Method, Uri};
    use pywas_host::AppLocator;
    use std::ffi::CStr;

    fn handler(py: Python<'_>, source: &CStr, name: &CStr) -> WsgiHandler {
        let module = PyModule::from_code(py, source, c"pywas_wsgi_test.py", name).unwrap();
        py.import("sys")
            .unwrap()
            .getattr("modules")
            .unwrap()
            .set_item(name.to_str().unwrap(), module)
            .unwrap();
        let app = AppLocator::new()
            .locate(py, Some(name.to_str().unwrap()), None)
            .unwrap();
        WsgiHandler::new(app)
    }

    fn serve(handler: &WsgiHandler, request: Request) -> (Rc<RefCell<RecordingSink>>, Result<(), HandlerError>) {
        let (sink, shared) = recording_sink();
        let result = handler.process(request, shared);
        (sink, result)
    }

    fn get() -> Request {
        Request::new(Method::Get, Uri::parse("/"))
    }

    #[test]
    fn empty_body_still_commits_headers() {
        let handler = Python::with_gil(|py| {
            handler(
                py,
                c"def app(environ, start_response):\n    start_response('200 OK', [])\n    return []\n",
                c"pywas_wsgi_empty",
            )
        });
        let (sink, result) = serve(&handler, get());
        result.unwrap();

        let sink = sink.borrow();
        assert_eq!(sink.commits.len(), 1);
        assert_eq!(sink.commits[0].status, 200);
        assert_eq!(sink.commits[0].content_length, Some(0));
        assert_eq!(sink.writes, 0);
    }

    #[test]
    fn body_chunks_are_streamed_in_order() {
        let handler = Python::with_gil(|py| {
            handler(
                py,
                c"def app(environ, start_response):
    start_response('200 OK', [('Content-Type', 'text/plain')])
    yield b''
    yield b'hello, '
    yield bytearray(b'world')
",
                c"pywas_wsgi_stream",
            )
        });
        let (sink, result) = serve(&handler, get());
        result.unwrap();

        let sink = sink.borrow();
        assert_eq!(sink.body, b"hello, world");
        assert_eq!(sink.writes, 2);
        assert_eq!(sink.commits[0].content_length, None);
    }

    #[test]
    fn start_response_inside_generator_is_deferred() {
        let handler = Python::with_gil(|py| {
            handler(
                py,
                c"def app(environ, start_response):
    def body():
        start_response('202 Accepted', [])
        yield b'later'
    return body()
",
                c"pywas_wsgi_deferred",
            )
        });
        let (sink, result) = serve(&handler, get());
        result.unwrap();
        assert_eq!(sink.borrow().commits[0].status, 202);
        assert_eq!(sink.borrow().body, b"later");
    }

    #[test]
    fn missing_start_response_is_reported() {
        let handler = Python::with_gil(|py| {
            handler(
                py,
                c"def app(environ, start_response):\n    return [b'orphan']\n",
                c"pywas_wsgi_orphan",
            )
        });
        let (sink, result) = serve(&handler, get());
        assert!(matches!(result, Err(HandlerError::StartResponseNotCalled)));
        assert!(sink.borrow().commits.is_empty());
    }

    #[test]
    fn application_exception_becomes_handler_error() {
        let handler = Python::with_gil(|py| {
            handler(
                py,
                c"def app(environ, start_response):\n    raise RuntimeError('kaput')\n",
                c"pywas_wsgi_raise",
            )
        });
        let (_, result) = serve(&handler, get());
        match result {
            Err(HandlerError::Application(msg)) => assert_eq!(msg, "kaput"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn close_is_called_even_on_error() {
        let handler = Python::with_gil(|py| {
            handler(
                py,
                c"closed = []

class Result:
    def __iter__(self):
        yield b'partial'
        raise ValueError('mid-stream')
    def close(self):
        closed.append(True)

def app(environ, start_response):
    start_response('200 OK', [])
    return Result()
",
                c"pywas_wsgi_close",
            )
        });
        let (sink, result) = serve(&handler, get());
        assert!(matches!(result, Err(HandlerError::Application(_))));
        assert_eq!(sink.borrow().body, b"partial");

        Python::with_gil(|py| {
            let closed = py
                .import("pywas_wsgi_close")
                .unwrap()
                .getattr("closed")
                .unwrap()
                .len()
                .unwrap();
            assert_eq!(closed, 1);
        });
    }

    #[test]
    fn request_body_is_readable_and_released_afterwards() {
        let handler = Python::with_gil(|py| {
            handler(
                py,
                c"kept = []

def app(environ, start_response):
    body = environ['wsgi.input'].read()
    kept.append(environ['wsgi.input'])
    start_response('200 OK', [('Content-Length', str(len(body)))])
    return [body]
",
                c"pywas_wsgi_echo",
            )
        });
        let mut request = Request::new(Method::Put, Uri::parse("/"));
        request.headers.insert("Content-Type", "application/json");
        request.body = Some(Box::new(BufferedInput::new(&b"{\"key\":\"value\"}"[..])));
        let (sink, result) = serve(&handler, request);
        result.unwrap();
        assert_eq!(sink.borrow().commits[0].content_length, Some(15));
        assert_eq!(sink.borrow().body, b"{\"key\":\"value\"}");

        Python::with_gil(|py| {
            let kept = py.import("pywas_wsgi_echo").unwrap().getattr("kept").unwrap();
            let err = kept.get_item(0).unwrap().call_method0("read").unwrap_err();
            assert!(err.is_instance_of::<pyo3::exceptions::PyValueError>(py));
        });
    }

    #[test]
    fn late_start_response_fails_safely() {
        let handler = Python::with_gil(|py| {
            handler(
                py,
                c"saved = []

def app(environ, start_response):
    saved.append(start_response)
    start_response('204 No Content', [])
    return []
",
                c"pywas_wsgi_late",
            )
        });
        serve(&handler, get()).1.unwrap();

        Python::with_gil(|py| {
            let saved = py.import("pywas_wsgi_late").unwrap().getattr("saved").unwrap();
            let err = saved
                .get_item(0)
                .unwrap()
                .call1(("200 OK", pyo3::types::PyList::empty(py)))
                .unwrap_err();
            assert!(err.is_instance_of::<pyo3::exceptions::PyRuntimeError>(py));
        });
    }

    #[test]
    fn error_page_replaces_response_before_output() {
        let handler = Python::with_gil(|py| {
            handler(
                py,
                c"import sys

def app(environ, start_response):
    start_response('200 OK', [('Content-Type', 'text/html')])
    try:
        raise LookupError('missing')
    except LookupError:
        start_response('500 Internal Server Error', [('Content-Type', 'text/plain')], sys.exc_info())
        return [b'error']
",
                c"pywas_wsgi_errpage",
            )
        });
        let (sink, result) = serve(&handler, get());
        result.unwrap();
        let sink = sink.borrow();
        assert_eq!(sink.commits[0].status, 500);
        assert_eq!(sink.commits[0].headers().get("Content-Type"), Some(&b"text/plain"[..]));
        assert_eq!(sink.body, b"error");
    }
}
