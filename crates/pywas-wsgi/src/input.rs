//! `wsgi.input`: a file-like view of the request body.
//!
//! Reads pull from the exchange's [`InputStream`] on demand. A line read
//! may over-read, the surplus stays in `pending` for the next call. After
//! the exchange ends the stream is dropped and every method raises
//! `ValueError`.

use pyo3::exceptions::{PyOSError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyBytes, PyList};

use pywas_core::body::DEFAULT_CHUNK_SIZE;
use pywas_core::{InputError, InputStream};

#[pyclass(unsendable, module = "pywas")]
pub struct WsgiInput {
    stream: Option<Box<dyn InputStream>>,
    pending: Vec<u8>,
    eof: bool,
}

impl WsgiInput {
    pub fn new(stream: Box<dyn InputStream>) -> Self {
        Self {
            stream: Some(stream),
            pending: Vec::new(),
            eof: false,
        }
    }

    /// Drop the body stream. Later reads raise `ValueError`.
    pub fn release(&mut self) {
        self.stream = None;
        self.pending.clear();
    }

    pub fn is_released(&self) -> bool {
        self.stream.is_none()
    }

    /// Read up to `size` bytes, or everything when `size` is `None`.
    ///
    /// Returns fewer than `size` bytes only at end of stream.
    pub fn read_bytes(&mut self, size: Option<usize>) -> PyResult<Vec<u8>> {
        self.stream()?;
        match size {
            Some(size) => {
                self.fill_to(size)?;
                let n = size.min(self.pending.len());
                Ok(self.pending.drain(..n).collect())
            }
            None => {
                let mut out = std::mem::take(&mut self.pending);
                if !self.eof {
                    self.stream()?.read_to_end(&mut out).map_err(input_error)?;
                    self.eof = true;
                }
                Ok(out)
            }
        }
    }

    /// Read through the next `\n` (inclusive), at most `limit` bytes.
    pub fn read_line_bytes(&mut self, limit: Option<usize>) -> PyResult<Vec<u8>> {
        self.stream()?;
        let mut scanned = 0;
        loop {
            if let Some(pos) = self.pending[scanned..].iter().position(|&b| b == b'\n') {
                let end = scanned + pos + 1;
                let end = limit.map_or(end, |limit| end.min(limit));
                return Ok(self.pending.drain(..end).collect());
            }
            if let Some(limit) = limit {
                if self.pending.len() >= limit {
                    return Ok(self.pending.drain(..limit).collect());
                }
            }
            if self.eof {
                return Ok(std::mem::take(&mut self.pending));
            }
            scanned = self.pending.len();
            self.read_chunk()?;
        }
    }

    fn stream(&mut self) -> PyResult<&mut Box<dyn InputStream>> {
        self.stream.as_mut().ok_or_else(released)
    }

    fn fill_to(&mut self, size: usize) -> PyResult<()> {
        while self.pending.len() < size && !self.eof {
            self.read_chunk()?;
        }
        Ok(())
    }

    fn read_chunk(&mut self) -> PyResult<()> {
        let start = self.pending.len();
        self.pending.resize(start + DEFAULT_CHUNK_SIZE, 0);
        let Some(stream) = self.stream.as_mut() else {
            self.pending.truncate(start);
            return Err(released());
        };
        let result = stream.read(&mut self.pending[start..]);
        let n = match result {
            Ok(n) => n,
            Err(err) => {
                self.pending.truncate(start);
                return Err(input_error(err));
            }
        };
        self.pending.truncate(start + n);
        if n == 0 {
            self.eof = true;
        }
        Ok(())
    }
}

fn released() -> PyErr {
    PyValueError::new_err("I/O operation on a request body that is no longer available")
}

fn input_error(err: InputError) -> PyErr {
    PyOSError::new_err(err.to_string())
}

/// Negative sizes mean "no limit", as with `io.RawIOBase`.
fn size_hint(size: Option<isize>) -> Option<usize> {
    size.and_then(|s| usize::try_from(s).ok())
}

#[pymethods]
impl WsgiInput {
    #[pyo3(signature = (size = None))]
    fn read<'py>(&mut self, py: Python<'py>, size: Option<isize>) -> PyResult<Bound<'py, PyBytes>> {
        let data = self.read_bytes(size_hint(size))?;
        Ok(PyBytes::new(py, &data))
    }

    #[pyo3(signature = (size = None))]
    fn readline<'py>(&mut self, py: Python<'py>, size: Option<isize>) -> PyResult<Bound<'py, PyBytes>> {
        let line = self.read_line_bytes(size_hint(size))?;
        Ok(PyBytes::new(py, &line))
    }

    /// Lines until end of stream, stopping early once `hint` bytes are read.
    #[pyo3(signature = (hint = None))]
    fn readlines<'py>(&mut self, py: Python<'py>, hint: Option<isize>) -> PyResult<Bound<'py, PyList>> {
        let hint = size_hint(hint).filter(|&h| h > 0);
        let lines = PyList::empty(py);
        let mut total = 0;
        loop {
            let line = self.read_line_bytes(None)?;
            if line.is_empty() {
                break;
            }
            total += line.len();
            lines.append(PyBytes::new(py, &line))?;
            if hint.is_some_and(|h| total >= h) {
                break;
            }
        }
        Ok(lines)
    }

    fn __iter__(slf: PyRef<'_, Self>) -> PyRef<'_, Self> {
        slf
    }

    fn __next__<'py>(&mut self, py: Python<'py>) -> PyResult<Option<Bound<'py, PyBytes>>> {
        let line = self.read_line_bytes(None)?;
        if line.is_empty() {
            return Ok(None);
        }
        Ok(Some(PyBytes::new(py, &line)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pywas_core::{BufferedInput, EmptyInput};

    fn input(data: &'static [u8]) -> WsgiInput {
        WsgiInput::new(Box::new(BufferedInput::new(data)))
    }

    /// Yields at most `step` bytes per read.
    struct Trickle {
        data: Vec<u8>,
        step: usize,
    }

    impl InputStream for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, InputError> {
            let n = self.step.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data.drain(..n);
            Ok(n)
        }

        fn content_length(&self) -> Option<u64> {
            None
        }
    }

    #[test]
    fn empty_body_reads_nothing_repeatedly() {
        let mut input = WsgiInput::new(Box::new(EmptyInput));
        assert!(input.read_bytes(None).unwrap().is_empty());
        assert!(input.read_bytes(Some(10)).unwrap().is_empty());
        assert!(input.read_line_bytes(None).unwrap().is_empty());
        assert!(input.read_bytes(None).unwrap().is_empty());
    }

    #[test]
    fn sized_reads_fill_across_short_reads() {
        let mut input = WsgiInput::new(Box::new(Trickle {
            data: b"abcdefghij".to_vec(),
            step: 3,
        }));
        assert_eq!(input.read_bytes(Some(7)).unwrap(), b"abcdefg");
        assert_eq!(input.read_bytes(Some(7)).unwrap(), b"hij");
        assert!(input.read_bytes(Some(7)).unwrap().is_empty());
    }

    #[test]
    fn read_all_after_partial_read() {
        let mut input = input(b"{\"key\":\"value\"}");
        assert_eq!(input.read_bytes(Some(1)).unwrap(), b"{");
        assert_eq!(input.read_bytes(None).unwrap(), b"\"key\":\"value\"}");
        assert!(input.read_bytes(None).unwrap().is_empty());
    }

    #[test]
    fn lines_split_on_newline() {
        let mut input = WsgiInput::new(Box::new(Trickle {
            data: b"one\ntwo\nthree".to_vec(),
            step: 2,
        }));
        assert_eq!(input.read_line_bytes(None).unwrap(), b"one\n");
        assert_eq!(input.read_line_bytes(None).unwrap(), b"two\n");
        assert_eq!(input.read_line_bytes(None).unwrap(), b"three");
        assert!(input.read_line_bytes(None).unwrap().is_empty());
    }

    #[test]
    fn line_limit_is_honored() {
        let mut input = input(b"abcdef\nxyz");
        assert_eq!(input.read_line_bytes(Some(4)).unwrap(), b"abcd");
        assert_eq!(input.read_line_bytes(Some(10)).unwrap(), b"ef\n");
        assert_eq!(input.read_bytes(None).unwrap(), b"xyz");
    }

    #[test]
    fn released_input_raises_value_error() {
        let mut input = input(b"data");
        input.release();
        assert!(input.is_released());
        Python::with_gil(|py| {
            let err = input.read_bytes(Some(1)).unwrap_err();
            assert!(err.is_instance_of::<PyValueError>(py));
            let err = input.read_line_bytes(None).unwrap_err();
            assert!(err.is_instance_of::<PyValueError>(py));
        });
    }

    #[test]
    fn python_file_protocol() {
        Python::with_gil(|py| {
            let obj = Bound::new(py, input(b"a\nb\nc\n")).unwrap();
            let first = obj.call_method0("readline").unwrap();
            assert_eq!(first.extract::<Vec<u8>>().unwrap(), b"a\n");
            let rest: Vec<Vec<u8>> = obj
                .try_iter()
                .unwrap()
                .map(|line| line.unwrap().extract().unwrap())
                .collect();
            assert_eq!(rest, vec![b"b\n".to_vec(), b"c\n".to_vec()]);
        });
    }

    #[test]
    fn readlines_respects_hint() {
        Python::with_gil(|py| {
            let obj = Bound::new(py, input(b"aa\nbb\ncc\n")).unwrap();
            let lines = obj.call_method1("readlines", (4,)).unwrap();
            assert_eq!(lines.len().unwrap(), 2);
            let rest = obj.call_method0("read").unwrap();
            assert_eq!(rest.extract::<Vec<u8>>().unwrap(), b"cc\n");
        });
    }
}
