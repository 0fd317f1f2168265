//! WAS control-channel framing.
//!
//! Every packet is a 4-byte header followed by the payload:
//!
//! ```text
//! ┌──────────────┬───────────────┬──────────────────────┐
//! │ length (u16) │ command (u16) │ payload (length B)   │
//! └──────────────┴───────────────┴──────────────────────┘
//! ```
//!
//! Integers are in host byte order; both ends always live on the same
//! machine.

use std::io::{self, Read, Write};

use pywas_core::Method;

use crate::error::{ProtocolError, TransportError};

pub const HEADER_SIZE: usize = 4;
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Command {
    Nop = 0,
    Request = 1,
    Method = 2,
    Uri = 3,
    ScriptName = 4,
    PathInfo = 5,
    QueryString = 6,
    Header = 7,
    Parameter = 8,
    Status = 9,
    NoData = 10,
    Data = 11,
    Length = 12,
    Stop = 13,
    Premature = 14,
    RemoteHost = 15,
    Metric = 16,
}

impl TryFrom<u16> for Command {
    type Error = ProtocolError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Command::Nop,
            1 => Command::Request,
            2 => Command::Method,
            3 => Command::Uri,
            4 => Command::ScriptName,
            5 => Command::PathInfo,
            6 => Command::QueryString,
            7 => Command::Header,
            8 => Command::Parameter,
            9 => Command::Status,
            10 => Command::NoData,
            11 => Command::Data,
            12 => Command::Length,
            13 => Command::Stop,
            14 => Command::Premature,
            15 => Command::RemoteHost,
            16 => Command::Metric,
            other => return Err(ProtocolError::UnknownCommand(other)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub command: Command,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(command: Command, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            command,
            payload: payload.into(),
        }
    }

    pub fn u32(&self) -> Result<u32, ProtocolError> {
        let bytes: [u8; 4] = self.payload.as_slice().try_into().map_err(|_| ProtocolError::Malformed {
            command: self.command,
            reason: "expected a 4 byte integer",
        })?;
        Ok(u32::from_ne_bytes(bytes))
    }

    pub fn u64(&self) -> Result<u64, ProtocolError> {
        let bytes: [u8; 8] = self.payload.as_slice().try_into().map_err(|_| ProtocolError::Malformed {
            command: self.command,
            reason: "expected an 8 byte integer",
        })?;
        Ok(u64::from_ne_bytes(bytes))
    }

    /// Split a `name=value` payload.
    pub fn pair(&self) -> Result<(&[u8], &[u8]), ProtocolError> {
        let eq = self
            .payload
            .iter()
            .position(|&b| b == b'=')
            .filter(|&i| i > 0)
            .ok_or(ProtocolError::Malformed {
                command: self.command,
                reason: "expected name=value",
            })?;
        Ok((&self.payload[..eq], &self.payload[eq + 1..]))
    }
}

/// Serialize one packet into `out`.
pub fn encode_packet(out: &mut Vec<u8>, command: Command, payload: &[u8]) -> Result<(), ProtocolError> {
    let length = u16::try_from(payload.len()).map_err(|_| ProtocolError::PayloadTooLarge(payload.len()))?;
    out.extend_from_slice(&length.to_ne_bytes());
    out.extend_from_slice(&(command as u16).to_ne_bytes());
    out.extend_from_slice(payload);
    Ok(())
}

pub fn write_packet<W: Write>(writer: &mut W, command: Command, payload: &[u8]) -> Result<(), TransportError> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    encode_packet(&mut buf, command, payload)?;
    writer.write_all(&buf)?;
    Ok(())
}

/// `name=value` payload for HEADER / PARAMETER.
pub fn pair_payload(name: &[u8], value: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(name.len() + 1 + value.len());
    payload.extend_from_slice(name);
    payload.push(b'=');
    payload.extend_from_slice(value);
    payload
}

/// Read one packet. `Ok(None)` on a clean end of stream between packets.
pub fn read_packet<R: Read>(reader: &mut R) -> Result<Option<Packet>, TransportError> {
    let mut header = [0u8; HEADER_SIZE];
    let mut filled = 0;
    while filled < HEADER_SIZE {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "control channel closed mid-packet").into());
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    let (length, command) = decode_header(&header)?;
    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload)?;
    Ok(Some(Packet { command, payload }))
}

/// Decode one packet from the front of `buf` without blocking.
///
/// Returns the packet and the number of bytes it occupied, or `None` if
/// `buf` does not hold a complete packet yet.
pub fn parse_packet(buf: &[u8]) -> Result<Option<(Packet, usize)>, ProtocolError> {
    let Some(header) = buf.get(..HEADER_SIZE) else {
        return Ok(None);
    };
    let header: [u8; HEADER_SIZE] = [header[0], header[1], header[2], header[3]];
    let (length, command) = decode_header(&header)?;
    let total = HEADER_SIZE + length;
    let Some(payload) = buf.get(HEADER_SIZE..total) else {
        return Ok(None);
    };
    Ok(Some((Packet::new(command, payload), total)))
}

fn decode_header(header: &[u8; HEADER_SIZE]) -> Result<(usize, Command), ProtocolError> {
    let length = u16::from_ne_bytes([header[0], header[1]]) as usize;
    let command = Command::try_from(u16::from_ne_bytes([header[2], header[3]]))?;
    Ok((length, command))
}

/// Wire numbering of `METHOD`. `0` and anything unknown are invalid.
pub fn method_from_wire(value: u32) -> Method {
    match value {
        1 => Method::Head,
        2 => Method::Get,
        3 => Method::Post,
        4 => Method::Put,
        5 => Method::Delete,
        6 => Method::Options,
        7 => Method::Trace,
        8 => Method::Propfind,
        9 => Method::Proppatch,
        10 => Method::Mkcol,
        11 => Method::Copy,
        12 => Method::Move,
        13 => Method::Lock,
        14 => Method::Unlock,
        15 => Method::Patch,
        16 => Method::Report,
        _ => Method::Invalid,
    }
}

pub fn method_to_wire(method: Method) -> u32 {
    match method {
        Method::Invalid => 0,
        Method::Head => 1,
        Method::Get => 2,
        Method::Post => 3,
        Method::Put => 4,
        Method::Delete => 5,
        Method::Options => 6,
        Method::Trace => 7,
        Method::Propfind => 8,
        Method::Proppatch => 9,
        Method::Mkcol => 10,
        Method::Copy => 11,
        Method::Move => 12,
        Method::Lock => 13,
        Method::Unlock => 14,
        Method::Patch => 15,
        Method::Report => 16,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_numbers() {
        assert_eq!(Command::try_from(0).unwrap(), Command::Nop);
        assert_eq!(Command::try_from(9).unwrap(), Command::Status);
        assert_eq!(Command::try_from(16).unwrap(), Command::Metric);
        assert!(matches!(Command::try_from(17), Err(ProtocolError::UnknownCommand(17))));
    }

    #[test]
    fn packet_layout() {
        let mut buf = Vec::new();
        encode_packet(&mut buf, Command::Status, &200u32.to_ne_bytes()).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE + 4);
        assert_eq!(&buf[..2], &4u16.to_ne_bytes());
        assert_eq!(&buf[2..4], &9u16.to_ne_bytes());
        assert_eq!(&buf[4..], &200u32.to_ne_bytes());
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let mut buf = Vec::new();
        let payload = vec![b'x'; MAX_PAYLOAD + 1];
        assert!(matches!(
            encode_packet(&mut buf, Command::Header, &payload),
            Err(ProtocolError::PayloadTooLarge(_))
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn read_packets_until_clean_eof() {
        let mut buf = Vec::new();
        encode_packet(&mut buf, Command::Request, b"").unwrap();
        encode_packet(&mut buf, Command::Uri, b"/index.html").unwrap();
        let mut reader = &buf[..];

        assert_eq!(read_packet(&mut reader).unwrap().unwrap(), Packet::new(Command::Request, b""));
        assert_eq!(read_packet(&mut reader).unwrap().unwrap(), Packet::new(Command::Uri, &b"/index.html"[..]));
        assert!(read_packet(&mut reader).unwrap().is_none());
    }

    #[test]
    fn truncated_packet_is_an_error() {
        let mut buf = Vec::new();
        encode_packet(&mut buf, Command::Uri, b"/index.html").unwrap();
        let mut reader = &buf[..buf.len() - 3];
        assert!(matches!(read_packet(&mut reader), Err(TransportError::Io(_))));

        let mut reader = &buf[..2];
        assert!(matches!(read_packet(&mut reader), Err(TransportError::Io(_))));
    }

    #[test]
    fn parse_needs_a_complete_packet() {
        let mut buf = Vec::new();
        encode_packet(&mut buf, Command::Length, &15u64.to_ne_bytes()).unwrap();
        assert!(parse_packet(&buf[..3]).unwrap().is_none());
        assert!(parse_packet(&buf[..10]).unwrap().is_none());

        let (packet, used) = parse_packet(&buf).unwrap().unwrap();
        assert_eq!(used, buf.len());
        assert_eq!(packet.u64().unwrap(), 15);
    }

    #[test]
    fn payload_codecs() {
        assert_eq!(Packet::new(Command::Method, 4u32.to_ne_bytes().to_vec()).u32().unwrap(), 4);
        assert!(Packet::new(Command::Method, vec![1, 2]).u32().is_err());
        assert!(Packet::new(Command::Length, vec![0; 4]).u64().is_err());

        let header = Packet::new(Command::Header, pair_payload(b"Content-Type", b"a=b"));
        let (name, value) = header.pair().unwrap();
        assert_eq!(name, b"Content-Type");
        assert_eq!(value, b"a=b");
        assert!(Packet::new(Command::Header, &b"=value"[..]).pair().is_err());
        assert!(Packet::new(Command::Header, &b"novalue"[..]).pair().is_err());
    }

    #[test]
    fn method_numbering() {
        assert_eq!(method_from_wire(0), Method::Invalid);
        assert_eq!(method_from_wire(2), Method::Get);
        assert_eq!(method_from_wire(4), Method::Put);
        assert_eq!(method_from_wire(17), Method::Invalid);
        for wire in 1..=16 {
            assert_eq!(method_to_wire(method_from_wire(wire)), wire);
        }
    }
}
