use thiserror::Error;

use crate::protocol::Command;

/// The peer sent something the protocol does not allow.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown control command {0}")]
    UnknownCommand(u16),

    #[error("malformed {command:?} packet: {reason}")]
    Malformed {
        command: Command,
        reason: &'static str,
    },

    #[error("unexpected {command:?} packet {context}")]
    Unexpected {
        command: Command,
        context: &'static str,
    },

    #[error("control packet payload of {0} bytes exceeds the 65535 byte limit")]
    PayloadTooLarge(usize),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("WAS I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("{operation} is not allowed {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("response body of {attempted} bytes exceeds the announced length of {announced} bytes")]
    LengthExceeded { announced: u64, attempted: u64 },

    #[error("request body pipe closed after {received} of {expected} bytes")]
    Truncated { received: u64, expected: u64 },

    #[error("the peer cut the request body short after {received} bytes")]
    Premature { received: u64 },

    #[error("the peer stopped the response body")]
    Stopped,
}
