//! The WSGI `environ` dictionary.

use pyo3::prelude::*;
use pyo3::types::{PyDict, PyString};

use pywas_core::header::header_match;
use pywas_core::{Request, Scheme};
use pywas_host::strings::{decode_latin1, to_native_string};

use crate::input::WsgiInput;

pub const SERVER_SOFTWARE: &str = concat!("pywas/", env!("CARGO_PKG_VERSION"));

/// `HTTP_` + the header name uppercased, every non-alphanumeric byte as `_`.
pub fn translate_header(name: &[u8]) -> String {
    let mut key = String::with_capacity(name.len() + 5);
    key.push_str("HTTP_");
    key.extend(name.iter().map(|&b| {
        if b.is_ascii_alphanumeric() {
            char::from(b.to_ascii_uppercase())
        } else {
            '_'
        }
    }));
    key
}

/// Build the environ for `request`. `input` becomes `wsgi.input`.
pub fn build_environ<'py>(
    py: Python<'py>,
    request: &Request,
    input: &Bound<'py, WsgiInput>,
    content_length: Option<u64>,
) -> PyResult<Bound<'py, PyDict>> {
    let environ = PyDict::new(py);
    let native = |bytes: &[u8]| to_native_string(py, bytes);

    environ.set_item("REMOTE_ADDR", native(&request.remote_addr))?;
    environ.set_item("REQUEST_METHOD", request.method.as_str())?;
    environ.set_item("SCRIPT_NAME", native(&request.script_name))?;
    environ.set_item("PATH_INFO", native(request.uri.path()))?;
    environ.set_item("QUERY_STRING", native(request.uri.query()))?;
    environ.set_item(
        "CONTENT_TYPE",
        native(request.find_header("Content-Type").unwrap_or_default()),
    )?;
    environ.set_item(
        "CONTENT_LENGTH",
        content_length.map(|n| n.to_string()).unwrap_or_default(),
    )?;
    environ.set_item("SERVER_NAME", native(&request.server_name))?;
    environ.set_item("SERVER_PORT", native(&request.server_port))?;
    environ.set_item("SERVER_PROTOCOL", &request.protocol)?;
    environ.set_item("SERVER_SOFTWARE", SERVER_SOFTWARE)?;
    environ.set_item(
        "HTTPS",
        if request.scheme == Scheme::Https { "on" } else { "" },
    )?;

    environ.set_item("wsgi.version", (1, 0))?;
    environ.set_item("wsgi.url_scheme", request.scheme.as_str())?;
    environ.set_item("wsgi.input", input)?;
    environ.set_item("wsgi.errors", py.import("sys")?.getattr("stderr")?)?;
    environ.set_item("wsgi.multithread", false)?;
    environ.set_item("wsgi.multiprocess", true)?;
    environ.set_item("wsgi.run_once", false)?;
    environ.set_item("wsgi.input_terminated", true)?;

    for header in request.headers.iter() {
        if is_cgi_header(&header.name) {
            continue;
        }
        let key = translate_header(&header.name);
        let value = decode_latin1(&header.value);
        // Repeated headers collapse into one comma-separated value.
        let value = match environ.get_item(&key)? {
            Some(existing) => format!("{},{value}", existing.downcast::<PyString>()?.to_cow()?),
            None => value,
        };
        environ.set_item(key, value)?;
    }

    Ok(environ)
}

/// Whether `name` is one of the two headers surfaced without `HTTP_`.
pub fn is_cgi_header(name: &[u8]) -> bool {
    header_match(name, b"Content-Type") || header_match(name, b"Content-Length")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pywas_core::{BufferedInput, EmptyInput, Method, Uri};

    fn environ_for<'py>(py: Python<'py>, request: &mut Request) -> Bound<'py, PyDict> {
        let body = request.take_body();
        let length = body.as_ref().and_then(|b| b.content_length());
        let stream = body.unwrap_or_else(|| Box::new(EmptyInput));
        let input = Bound::new(py, WsgiInput::new(stream)).unwrap();
        build_environ(py, request, &input, length).unwrap()
    }

    fn get(environ: &Bound<'_, PyDict>, key: &str) -> String {
        environ.get_item(key).unwrap().unwrap().extract().unwrap()
    }

    #[test]
    fn header_translation() {
        assert_eq!(translate_header(b"Accept-Encoding"), "HTTP_ACCEPT_ENCODING");
        assert_eq!(translate_header(b"x-cm4all.test"), "HTTP_X_CM4ALL_TEST");
    }

    #[test]
    fn cgi_headers_are_recognized() {
        assert!(is_cgi_header(b"content-type"));
        assert!(is_cgi_header(b"CONTENT-LENGTH"));
        assert!(!is_cgi_header(b"Content-Encoding"));
    }

    #[test]
    fn get_request_environ() {
        Python::with_gil(|py| {
            let mut request = Request::new(Method::Get, Uri::parse("/hello?name=world"));
            request.remote_addr = b"192.0.2.1".to_vec();
            request.headers.insert("Accept", "text/html");
            let environ = environ_for(py, &mut request);

            assert_eq!(get(&environ, "REQUEST_METHOD"), "GET");
            assert_eq!(get(&environ, "PATH_INFO"), "/hello");
            assert_eq!(get(&environ, "QUERY_STRING"), "name=world");
            assert_eq!(get(&environ, "REMOTE_ADDR"), "192.0.2.1");
            assert_eq!(get(&environ, "CONTENT_TYPE"), "");
            assert_eq!(get(&environ, "CONTENT_LENGTH"), "");
            assert_eq!(get(&environ, "SERVER_NAME"), "localhost");
            assert_eq!(get(&environ, "SERVER_PORT"), "80");
            assert_eq!(get(&environ, "SERVER_PROTOCOL"), "HTTP/1.1");
            assert_eq!(get(&environ, "SERVER_SOFTWARE"), SERVER_SOFTWARE);
            assert_eq!(get(&environ, "HTTPS"), "");
            assert_eq!(get(&environ, "wsgi.url_scheme"), "http");
            assert_eq!(get(&environ, "HTTP_ACCEPT"), "text/html");

            let version: (i32, i32) = environ.get_item("wsgi.version").unwrap().unwrap().extract().unwrap();
            assert_eq!(version, (1, 0));
            let flag = |k: &str| -> bool { environ.get_item(k).unwrap().unwrap().extract().unwrap() };
            assert!(!flag("wsgi.multithread"));
            assert!(flag("wsgi.multiprocess"));
            assert!(!flag("wsgi.run_once"));
            assert!(flag("wsgi.input_terminated"));
        });
    }

    #[test]
    fn put_request_exposes_body_metadata() {
        Python::with_gil(|py| {
            let mut request = Request::new(Method::Put, Uri::parse("/"));
            request.headers.insert("Content-Type", "application/json");
            request.headers.insert("Content-Length", "15");
            request.body = Some(Box::new(BufferedInput::new(&b"{\"key\":\"value\"}"[..])));
            let environ = environ_for(py, &mut request);

            assert_eq!(get(&environ, "REQUEST_METHOD"), "PUT");
            assert_eq!(get(&environ, "CONTENT_TYPE"), "application/json");
            assert_eq!(get(&environ, "CONTENT_LENGTH"), "15");
            assert!(environ.get_item("HTTP_CONTENT_TYPE").unwrap().is_none());
            assert!(environ.get_item("HTTP_CONTENT_LENGTH").unwrap().is_none());

            let input = environ.get_item("wsgi.input").unwrap().unwrap();
            let body: Vec<u8> = input.call_method0("read").unwrap().extract().unwrap();
            assert_eq!(body, b"{\"key\":\"value\"}");
            let again: Vec<u8> = input.call_method0("read").unwrap().extract().unwrap();
            assert!(again.is_empty());
        });
    }

    #[test]
    fn https_scheme_sets_flag() {
        Python::with_gil(|py| {
            let mut request = Request::new(Method::Get, Uri::parse("/"));
            request.scheme = Scheme::Https;
            let environ = environ_for(py, &mut request);
            assert_eq!(get(&environ, "HTTPS"), "on");
            assert_eq!(get(&environ, "wsgi.url_scheme"), "https");
        });
    }

    #[test]
    fn duplicate_headers_are_joined() {
        Python::with_gil(|py| {
            let mut request = Request::new(Method::Get, Uri::parse("/"));
            request.headers.insert("Accept", "text/html");
            request.headers.insert("accept", "application/json");
            let environ = environ_for(py, &mut request);
            assert_eq!(get(&environ, "HTTP_ACCEPT"), "text/html,application/json");
        });
    }

    #[test]
    fn header_values_are_latin1() {
        Python::with_gil(|py| {
            let mut request = Request::new(Method::Get, Uri::parse(&b"/caf\xe9"[..]));
            request.headers.insert("X-Name", &b"J\xfcrgen"[..]);
            let environ = environ_for(py, &mut request);
            assert_eq!(get(&environ, "HTTP_X_NAME"), "J\u{fc}rgen");
            assert_eq!(get(&environ, "PATH_INFO"), "/caf\u{e9}");
        });
    }
}
