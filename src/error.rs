//! Every error kind the crate surfaces, as one plain enum.
//!
//! No `thiserror`: `Error` is a bare `#[derive(Debug)] enum` with a
//! hand-written `Display` and `std::error::Error` impl, so `?` can compose
//! across socket/codec/pool boundaries without pulling in a macro crate for
//! a dozen match arms.

use std::fmt;
use std::io;

/// Everything that can go wrong, spanning setup, transport, protocol, and
/// API-misuse errors.
#[derive(Debug)]
pub enum Error {
    /// Name resolution failed before a `connect`/`listen` could pick an address.
    Resolve(io::Error),
    /// `bind()` failed.
    Bind(io::Error),
    /// `listen()` failed.
    Listen(io::Error),
    /// Every resolved address refused `connect()`; carries the last attempt's error.
    Connect(io::Error),
    /// `accept()` failed (not the same as "nothing pending" in non-blocking mode).
    Accept(io::Error),
    /// Setting a socket option failed.
    SocketOption(io::Error),
    /// A runtime socket failure; the owning connection moves to `ConnState::Error`.
    Transport(TransportError),
    /// A decoded frame violated the codec contract.
    Protocol(ProtocolError),
    /// A send or receive queue has a limit and is full.
    QueueFull,
    /// The worker pool's waiting list is full (and no slot was idle).
    PoolFull,
    /// Attempted to add a connection to a pool it already belongs to.
    AlreadyMember,
    /// Attempted to remove a connection from a pool it does not belong to.
    NotMember,
    /// `start_engine` called on a connection whose engine already started.
    AlreadyStarted,
    /// `stop_engine`/an engine operation called before `start_engine`.
    NotStarted,
    /// Caller passed a value the API rejects (e.g. an empty send payload).
    InvalidArgument(&'static str),
    /// `wait_receive`/`accept` with a deadline, and nothing arrived in time.
    Timeout,
}

/// Runtime socket failures, classified by underlying cause.
#[derive(Debug)]
pub enum TransportError {
    /// Peer sent `ECONNRESET`.
    ResetByPeer,
    /// Peer closed the connection (`recv` returned 0, or `ENOTCONN`).
    Disconnected,
    /// A read returned fewer bytes than requested and the stream ended.
    ShortRead,
    /// A write could not complete.
    ShortWrite,
    /// Any other OS-level transport failure.
    Other(io::Error),
}

/// A decoded frame violates the typed-message codec contract.
#[derive(Debug)]
pub enum ProtocolError {
    /// Popped from a sub-sequence (ints/doubles/buffers) that had nothing left.
    Underflow,
    /// A count header in the payload implies more data than the payload holds.
    CountExceedsPayload,
    /// The payload ended in the middle of a fixed-width field.
    Truncated,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Resolve(e) => write!(f, "address resolution failed: {e}"),
            Error::Bind(e) => write!(f, "bind failed: {e}"),
            Error::Listen(e) => write!(f, "listen failed: {e}"),
            Error::Connect(e) => write!(f, "connect failed: {e}"),
            Error::Accept(e) => write!(f, "accept failed: {e}"),
            Error::SocketOption(e) => write!(f, "setsockopt failed: {e}"),
            Error::Transport(t) => write!(f, "transport error: {t}"),
            Error::Protocol(p) => write!(f, "protocol error: {p}"),
            Error::QueueFull => write!(f, "queue is full"),
            Error::PoolFull => write!(f, "worker pool waiting list is full"),
            Error::AlreadyMember => write!(f, "connection is already a member of this pool"),
            Error::NotMember => write!(f, "connection is not a member of this pool"),
            Error::AlreadyStarted => write!(f, "engine already started"),
            Error::NotStarted => write!(f, "engine not started"),
            Error::InvalidArgument(why) => write!(f, "invalid argument: {why}"),
            Error::Timeout => write!(f, "timed out"),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::ResetByPeer => write!(f, "connection reset by peer"),
            TransportError::Disconnected => write!(f, "peer disconnected"),
            TransportError::ShortRead => write!(f, "short read"),
            TransportError::ShortWrite => write!(f, "short write"),
            TransportError::Other(e) => write!(f, "{e}"),
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::Underflow => write!(f, "popped an empty sub-sequence"),
            ProtocolError::CountExceedsPayload => {
                write!(f, "count header exceeds payload size")
            }
            ProtocolError::Truncated => write!(f, "payload truncated"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Resolve(e)
            | Error::Bind(e)
            | Error::Listen(e)
            | Error::Connect(e)
            | Error::Accept(e)
            | Error::SocketOption(e) => Some(e),
            Error::Transport(TransportError::Other(e)) => Some(e),
            _ => None,
        }
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Error {
        Error::Protocol(e)
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Error {
        Error::Transport(e)
    }
}

impl From<nix::Error> for Error {
    fn from(e: nix::Error) -> Error {
        Error::SocketOption(io::Error::from(e))
    }
}

/// Classify a raw I/O error from a socket read/write as a [`TransportError`].
pub fn classify_io_error(e: io::Error) -> TransportError {
    match e.kind() {
        io::ErrorKind::ConnectionReset => TransportError::ResetByPeer,
        io::ErrorKind::NotConnected | io::ErrorKind::BrokenPipe => TransportError::Disconnected,
        io::ErrorKind::UnexpectedEof => TransportError::ShortRead,
        io::ErrorKind::WriteZero => TransportError::ShortWrite,
        _ => TransportError::Other(e),
    }
}
