//! The wire-facing event types exchanged with the embedder.

use bytes::Bytes;

use crate::headers::HeaderList;

/// Which side of the exchange a [`crate::Connection`] plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    pub(crate) fn other(self) -> Role {
        match self {
            Role::Client => Role::Server,
            Role::Server => Role::Client,
        }
    }
}

/// A per-role position in the exchange. See the module docs of
/// [`crate::state`] for the transition rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    SendResponse,
    SendBody,
    Done,
    MustClose,
    Closed,
    Error,
    MightSwitchProtocol,
    SwitchedProtocol,
}

/// Why [`Event::Paused`] was emitted; informational only, never consulted
/// by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    /// Our peer is `DONE` and more bytes arrived before we reused the
    /// connection or closed it.
    Done,
    /// A protocol switch has been proposed and not yet resolved.
    MightSwitchProtocol,
    /// A protocol switch has been committed; remaining bytes belong to the
    /// successor protocol.
    SwitchedProtocol,
}

/// A minimal, byte-exact HTTP version. Only 1.0 and 1.1 are representable:
/// this engine has no notion of negotiating any other version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HttpVersion(pub(crate) u8);

impl HttpVersion {
    pub const HTTP_10: HttpVersion = HttpVersion(0);
    pub const HTTP_11: HttpVersion = HttpVersion(1);

    pub(crate) fn parse(bytes: &[u8]) -> Option<HttpVersion> {
        match bytes {
            b"1.0" => Some(HttpVersion::HTTP_10),
            b"1.1" => Some(HttpVersion::HTTP_11),
            _ => None,
        }
    }

    pub(crate) fn from_httparse(minor: u8) -> HttpVersion {
        if minor == 0 {
            HttpVersion::HTTP_10
        } else {
            HttpVersion::HTTP_11
        }
    }

    pub(crate) fn as_bytes(self) -> Bytes {
        if self == HttpVersion::HTTP_10 {
            Bytes::from_static(b"1.0")
        } else {
            Bytes::from_static(b"1.1")
        }
    }
}

/// One protocol-level occurrence on a connection.
///
/// `Request`, `InformationalResponse`, and `Response` carry their
/// start-line fields as raw bytes rather than typed values (`http::Method`,
/// `http::StatusCode`, ...): this engine is a pass-through codec, not a
/// validator of application semantics, and keeping the wire bytes intact
/// lets an embedder forward an exotic method or an out-of-range status
/// untouched if it chooses to.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Request {
        method: Bytes,
        target: Bytes,
        headers: HeaderList,
        http_version: Bytes,
    },
    InformationalResponse {
        status_code: u16,
        headers: HeaderList,
        http_version: Bytes,
    },
    Response {
        status_code: u16,
        headers: HeaderList,
        http_version: Bytes,
    },
    Data {
        data: Bytes,
    },
    EndOfMessage {
        headers: HeaderList,
    },
    ConnectionClosed,
    Paused {
        reason: PauseReason,
    },
}

impl Event {
    pub(crate) fn end_of_message_empty() -> Event {
        Event::EndOfMessage {
            headers: Vec::new(),
        }
    }
}
