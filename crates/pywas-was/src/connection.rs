//! A blocking WAS connection over the three inherited pipes.
//!
//! ```text
//! accept ──► REQUEST METHOD URI … HEADER* (NO_DATA | DATA [LENGTH])
//!
//!                     ┌───────────── set_length(0) ──► NoBody ─┐
//! Idle ── status ──► Headers ── set_length(n) ──► Body ────────┼──► end / abort
//!                     └──────────── write ───────────► Body ───┘
//! ```
//!
//! Unread request body is drained on `end`/`abort` when its length is
//! known; otherwise STOP is sent and the peer's PREMATURE (or LENGTH) is
//! consumed at the next `accept`, discarding whatever was still in flight.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};

use pywas_core::http::{STATUS_INTERNAL_SERVER_ERROR, STATUS_NO_CONTENT};
use pywas_core::{HeaderMap, Method};

use crate::error::{ProtocolError, TransportError};
use crate::protocol::{method_from_wire, pair_payload, parse_packet, read_packet, write_packet, Command, Packet};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestBody {
    None,
    Streaming {
        length: Option<u64>,
        received: u64,
        /// The peer sent PREMATURE; `length` is what it actually sent.
        premature: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseState {
    Idle,
    Headers,
    NoBody,
    Body { length: Option<u64>, sent: u64 },
    Finished,
}

impl ResponseState {
    fn describe(self) -> &'static str {
        match self {
            ResponseState::Idle => "before the status was sent",
            ResponseState::Headers => "while sending headers",
            ResponseState::NoBody => "after NO_DATA was sent",
            ResponseState::Body { .. } => "while sending the body",
            ResponseState::Finished => "after the response was finished",
        }
    }
}

struct RequestInfo {
    uri: Vec<u8>,
    method: Method,
    script_name: Option<Vec<u8>>,
    path_info: Option<Vec<u8>>,
    query_string: Option<Vec<u8>>,
    remote_host: Option<Vec<u8>>,
    headers: HeaderMap,
    parameters: HeaderMap,
    has_body: bool,
}

impl Default for RequestInfo {
    fn default() -> Self {
        Self {
            uri: Vec::new(),
            method: Method::Get,
            script_name: None,
            path_info: None,
            query_string: None,
            remote_host: None,
            headers: HeaderMap::new(),
            parameters: HeaderMap::new(),
            has_body: false,
        }
    }
}

pub struct WasConnection<C = File, I = File, W = File> {
    control_in: BufReader<C>,
    control_out: W,
    input: I,
    output: W,
    request: RequestInfo,
    body: RequestBody,
    response: ResponseState,
    in_exchange: bool,
    stop_requested: bool,
    /// STOP was sent for an unbounded request body; the bytes read so far.
    stopped_at: Option<u64>,
}

#[cfg(unix)]
impl WasConnection<File, File, File> {
    pub const CONTROL_FD: i32 = 3;
    pub const INPUT_FD: i32 = 0;
    pub const OUTPUT_FD: i32 = 1;

    /// Take over the pipes a WAS server hands its child process.
    ///
    /// # Safety
    ///
    /// Descriptors 0, 1 and 3 must be open and not owned by anything else
    /// in this process.
    pub unsafe fn from_inherited_fds() -> io::Result<Self> {
        use std::os::fd::FromRawFd;

        // SAFETY: the caller guarantees exclusive ownership of these fds.
        let (control, input, output) = unsafe {
            (
                File::from_raw_fd(Self::CONTROL_FD),
                File::from_raw_fd(Self::INPUT_FD),
                File::from_raw_fd(Self::OUTPUT_FD),
            )
        };
        let control_out = control.try_clone()?;
        Ok(Self::new(control, control_out, input, output))
    }
}

impl<C: Read, I: Read, W: Write> WasConnection<C, I, W> {
    pub fn new(control_in: C, control_out: W, input: I, output: W) -> Self {
        Self {
            control_in: BufReader::new(control_in),
            control_out,
            input,
            output,
            request: RequestInfo::default(),
            body: RequestBody::None,
            response: ResponseState::Idle,
            in_exchange: false,
            stop_requested: false,
            stopped_at: None,
        }
    }

    pub fn uri(&self) -> &[u8] {
        &self.request.uri
    }

    /// PARAMETER packets of the current request.
    pub fn parameters(&self) -> &HeaderMap {
        &self.request.parameters
    }

    pub fn control_out(&self) -> &W {
        &self.control_out
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    // ── Control channel ─────────────────────────────────────────────

    fn send(&mut self, command: Command, payload: &[u8]) -> Result<(), TransportError> {
        write_packet(&mut self.control_out, command, payload)
    }

    fn next_packet(&mut self, context: &'static str) -> Result<Packet, TransportError> {
        read_packet(&mut self.control_in)?.ok_or_else(|| {
            TransportError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("control channel closed {context}"),
            ))
        })
    }

    /// Handle packets that already arrived, without blocking. Stops at the
    /// first packet that does not belong to the running exchange.
    fn poll_buffered(&mut self) -> Result<(), TransportError> {
        while let Some((packet, used)) = parse_packet(self.control_in.buffer())? {
            if !matches!(
                packet.command,
                Command::Nop | Command::Length | Command::Premature | Command::Stop
            ) {
                break;
            }
            self.control_in.consume(used);
            self.handle_in_exchange(packet)?;
        }
        Ok(())
    }

    /// Packets the peer may send while an exchange is in progress.
    fn handle_in_exchange(&mut self, packet: Packet) -> Result<(), TransportError> {
        match (packet.command, &mut self.body) {
            (Command::Nop, _) => {}
            (Command::Length, RequestBody::Streaming { length: length @ None, received, .. }) => {
                let announced = packet.u64()?;
                if announced < *received {
                    return Err(ProtocolError::Malformed {
                        command: Command::Length,
                        reason: "length is smaller than the data already received",
                    }
                    .into());
                }
                *length = Some(announced);
            }
            (Command::Premature, RequestBody::Streaming { length, premature, .. }) => {
                *length = Some(packet.u64()?);
                *premature = true;
            }
            (Command::Stop, _) => {
                tracing::debug!("peer requested STOP of the response body");
                self.stop_requested = true;
            }
            (command, _) => {
                return Err(ProtocolError::Unexpected {
                    command,
                    context: "during an exchange",
                }
                .into());
            }
        }
        Ok(())
    }

    fn read_request(&mut self) -> Result<(), TransportError> {
        loop {
            let packet = self.next_packet("inside a request")?;
            match packet.command {
                Command::Nop => {}
                Command::Method => self.request.method = method_from_wire(packet.u32()?),
                Command::Uri => self.request.uri = packet.payload,
                Command::ScriptName => self.request.script_name = Some(packet.payload),
                Command::PathInfo => self.request.path_info = Some(packet.payload),
                Command::QueryString => self.request.query_string = Some(packet.payload),
                Command::RemoteHost => self.request.remote_host = Some(packet.payload),
                Command::Header => {
                    let (name, value) = packet.pair()?;
                    self.request.headers.insert(name, value);
                }
                Command::Parameter => {
                    let (name, value) = packet.pair()?;
                    self.request.parameters.insert(name, value);
                }
                Command::NoData => return Ok(()),
                Command::Data => {
                    self.request.has_body = true;
                    self.body = RequestBody::Streaming {
                        length: None,
                        received: 0,
                        premature: false,
                    };
                    // LENGTH usually travels right behind DATA.
                    return self.poll_buffered();
                }
                command => {
                    return Err(ProtocolError::Unexpected {
                        command,
                        context: "inside a request",
                    }
                    .into());
                }
            }
        }
    }

    // ── Request body bookkeeping ────────────────────────────────────

    fn discard_input(&mut self, count: u64) -> Result<(), TransportError> {
        let discarded = io::copy(&mut (&mut self.input).take(count), &mut io::sink())?;
        if discarded < count {
            return Err(TransportError::Truncated {
                received: discarded,
                expected: count,
            });
        }
        tracing::trace!(bytes = count, "discarded unread request body");
        Ok(())
    }

    /// Leave the input pipe at a packet boundary for the next exchange.
    fn finish_request_body(&mut self) -> Result<(), TransportError> {
        let body = std::mem::replace(&mut self.body, RequestBody::None);
        match body {
            RequestBody::Streaming {
                length: Some(length),
                received,
                ..
            } => self.discard_input(length - received),
            RequestBody::Streaming {
                length: None, received, ..
            } => {
                self.send(Command::Stop, &[])?;
                self.stopped_at = Some(received);
                Ok(())
            }
            RequestBody::None => Ok(()),
        }
    }

    /// The peer's answer to STOP: the total it sent.
    fn resolve_stop(&mut self, total: u64) -> Result<(), TransportError> {
        if let Some(received) = self.stopped_at.take() {
            self.discard_input(total.saturating_sub(received))?;
        }
        Ok(())
    }

    // ── Response helpers ────────────────────────────────────────────

    fn invalid(&self, operation: &'static str) -> TransportError {
        TransportError::InvalidState {
            operation,
            state: self.response.describe(),
        }
    }

    fn close_exchange(&mut self) -> Result<(), TransportError> {
        self.response = ResponseState::Finished;
        self.in_exchange = false;
        let drained = self.finish_request_body();
        self.control_out.flush()?;
        self.output.flush()?;
        drained
    }
}

impl<C: Read, I: Read, W: Write> Transport for WasConnection<C, I, W> {
    fn accept(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        if self.in_exchange {
            tracing::warn!("previous exchange was not finished; ending it");
            self.end()?;
        }
        self.request = RequestInfo::default();
        self.body = RequestBody::None;
        self.response = ResponseState::Idle;
        self.stop_requested = false;

        loop {
            let Some(packet) = read_packet(&mut self.control_in)? else {
                return Ok(None);
            };
            match packet.command {
                Command::Nop => {}
                Command::Request => break,
                Command::Premature | Command::Length if self.stopped_at.is_some() => {
                    self.resolve_stop(packet.u64()?)?;
                }
                // The response it referred to is already finished.
                Command::Stop => {}
                command => {
                    return Err(ProtocolError::Unexpected {
                        command,
                        context: "before REQUEST",
                    }
                    .into());
                }
            }
        }
        if self.stopped_at.take().is_some() {
            tracing::warn!("peer did not answer STOP before the next request");
        }

        self.read_request()?;
        self.in_exchange = true;
        Ok(Some(self.request.uri.clone()))
    }

    fn method(&self) -> Method {
        self.request.method
    }

    fn script_name(&self) -> Option<&[u8]> {
        self.request.script_name.as_deref()
    }

    fn path_info(&self) -> Option<&[u8]> {
        self.request.path_info.as_deref()
    }

    fn query_string(&self) -> Option<&[u8]> {
        self.request.query_string.as_deref()
    }

    fn remote_host(&self) -> Option<&[u8]> {
        self.request.remote_host.as_deref()
    }

    fn headers(&self) -> &HeaderMap {
        &self.request.headers
    }

    fn has_body(&self) -> bool {
        self.request.has_body
    }

    fn input_remaining(&mut self) -> Option<u64> {
        if let Err(err) = self.poll_buffered() {
            tracing::warn!(error = %err, "control channel error while checking request length");
            return None;
        }
        match self.body {
            RequestBody::Streaming {
                length: Some(length),
                received,
                ..
            } => Some(length - received),
            _ => None,
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.poll_buffered()?;
        let RequestBody::Streaming {
            length,
            received,
            premature,
        } = self.body
        else {
            return Ok(0);
        };

        let want = match length {
            Some(length) if received == length => {
                return if premature {
                    Err(TransportError::Premature { received })
                } else {
                    Ok(0)
                };
            }
            Some(length) => buf.len().min(usize::try_from(length - received).unwrap_or(usize::MAX)),
            None => buf.len(),
        };
        if want == 0 {
            return Ok(0);
        }

        let n = loop {
            match self.input.read(&mut buf[..want]) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => break other?,
            }
        };
        if n == 0 {
            return Err(TransportError::Truncated {
                received,
                expected: length.unwrap_or(received),
            });
        }
        if let RequestBody::Streaming { received, .. } = &mut self.body {
            *received += n as u64;
        }
        Ok(n)
    }

    fn set_status(&mut self, status: u16) -> Result<(), TransportError> {
        if !self.in_exchange || self.response != ResponseState::Idle {
            return Err(self.invalid("set_status"));
        }
        self.send(Command::Status, &u32::from(status).to_ne_bytes())?;
        self.response = ResponseState::Headers;
        Ok(())
    }

    fn set_header(&mut self, name: &[u8], value: &[u8]) -> Result<(), TransportError> {
        if self.response != ResponseState::Headers {
            return Err(self.invalid("set_header"));
        }
        self.send(Command::Header, &pair_payload(name, value))
    }

    fn set_length(&mut self, length: u64) -> Result<(), TransportError> {
        match self.response {
            ResponseState::Headers if length == 0 => {
                self.send(Command::NoData, &[])?;
                self.response = ResponseState::NoBody;
            }
            ResponseState::Headers => {
                self.send(Command::Data, &[])?;
                self.send(Command::Length, &length.to_ne_bytes())?;
                self.response = ResponseState::Body {
                    length: Some(length),
                    sent: 0,
                };
            }
            ResponseState::Body { length: None, sent } => {
                if length < sent {
                    return Err(TransportError::LengthExceeded {
                        announced: length,
                        attempted: sent,
                    });
                }
                self.send(Command::Length, &length.to_ne_bytes())?;
                self.response = ResponseState::Body {
                    length: Some(length),
                    sent,
                };
            }
            _ => return Err(self.invalid("set_length")),
        }
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.poll_buffered()?;
        if self.stop_requested {
            match self.response {
                ResponseState::Headers => {
                    self.send(Command::Data, &[])?;
                    self.send(Command::Premature, &0u64.to_ne_bytes())?;
                }
                ResponseState::Body { sent, .. } => {
                    self.send(Command::Premature, &sent.to_ne_bytes())?;
                }
                _ => {}
            }
            self.control_out.flush()?;
            self.response = ResponseState::Finished;
            return Err(TransportError::Stopped);
        }

        let (length, sent) = match self.response {
            ResponseState::Headers => {
                self.send(Command::Data, &[])?;
                (None, 0)
            }
            ResponseState::NoBody if data.is_empty() => return Ok(()),
            ResponseState::Body { length, sent } => (length, sent),
            _ => return Err(self.invalid("write")),
        };
        self.response = ResponseState::Body { length, sent };

        let attempted = sent + data.len() as u64;
        if let Some(announced) = length {
            if attempted > announced {
                return Err(TransportError::LengthExceeded { announced, attempted });
            }
        }
        self.output.write_all(data)?;
        self.response = ResponseState::Body {
            length,
            sent: attempted,
        };
        Ok(())
    }

    fn end(&mut self) -> Result<(), TransportError> {
        if !self.in_exchange {
            return Ok(());
        }
        match self.response {
            ResponseState::Idle => {
                tracing::warn!("exchange ended without a status; sending 204");
                self.send(Command::Status, &u32::from(STATUS_NO_CONTENT).to_ne_bytes())?;
                self.send(Command::NoData, &[])?;
            }
            ResponseState::Headers => self.send(Command::NoData, &[])?,
            ResponseState::Body { length: None, sent } => {
                self.send(Command::Length, &sent.to_ne_bytes())?;
            }
            ResponseState::Body {
                length: Some(length),
                sent,
            } if sent < length => {
                tracing::warn!(sent, length, "response body shorter than announced");
                self.send(Command::Premature, &sent.to_ne_bytes())?;
            }
            ResponseState::Body { .. } | ResponseState::NoBody | ResponseState::Finished => {}
        }
        self.close_exchange()
    }

    fn abort(&mut self) -> Result<(), TransportError> {
        if !self.in_exchange {
            return Ok(());
        }
        match self.response {
            ResponseState::Idle => {
                self.send(Command::Status, &u32::from(STATUS_INTERNAL_SERVER_ERROR).to_ne_bytes())?;
                self.send(Command::NoData, &[])?;
            }
            ResponseState::Headers => {
                self.send(Command::Data, &[])?;
                self.send(Command::Premature, &0u64.to_ne_bytes())?;
            }
            ResponseState::Body { sent, .. } => {
                self.send(Command::Premature, &sent.to_ne_bytes())?;
            }
            ResponseState::NoBody | ResponseState::Finished => {}
        }
        self.close_exchange()
    }
}
