//! Error and Result module.

use std::error::Error as StdError;
use std::fmt;

/// Result type returned from methods that can fail with a [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

type Cause = Box<dyn StdError + Send + Sync>;

/// A protocol error: the peer, or the caller, did something the engine
/// cannot reconcile with RFC 7230.
///
/// There is only one error kind at the public API boundary -- every failure
/// mode in this crate is a violation of the wire protocol or of the
/// connection's own state machine, and all of them are reported the same
/// way: as an `Error` carrying a human-readable message and, where RFC 7230
/// suggests one, the HTTP status code a server would send back.
pub struct Error {
    inner: Box<ErrorImpl>,
}

struct ErrorImpl {
    kind: Kind,
    cause: Option<Cause>,
}

#[derive(Debug)]
pub(crate) enum Kind {
    /// The request-line, status-line, or header block could not be parsed.
    Parse(Parse),
    /// The declared Content-Length was exceeded by the body actually sent.
    BodyLengthExceeded,
    /// The connection closed before a message in progress could complete.
    IncompleteMessage,
    /// An event was sent or received that the current state does not allow.
    UnexpectedMessage,
    /// `receive_data` was fed more bytes than `max_buffer_size` permits
    /// without completing a parseable event.
    BufferTooLong,
    /// `send` or `receive_data` was called while the corresponding role was
    /// already in the `ERROR` state.
    AlreadyInError,
    /// `prepare_to_reuse` was called while either role was not `DONE`, or
    /// `keep_alive` was already false.
    NotReadyToReuse,
    /// A request with `Expect: 100-continue` was sent while already waiting
    /// for the peer's interim response.
    AlreadyWaitingFor100Continue,
}

#[derive(Debug)]
pub(crate) enum Parse {
    RequestLine,
    StatusLine,
    Version,
    Header(Header),
    ChunkSize,
    TooLarge,
}

#[derive(Debug)]
pub(crate) enum Header {
    Token,
    ObsoleteLineFolding,
    ContentLengthInvalid,
    ContentLengthConflict,
    TransferEncodingInvalid,
    InvalidTrailerField,
}

impl Error {
    /// Returns true if this was a parse error in the start line or headers.
    pub fn is_parse(&self) -> bool {
        matches!(self.inner.kind, Kind::Parse(_))
    }

    /// Returns true if this was a parse error caused by a message that
    /// exceeded `max_buffer_size`.
    pub fn is_parse_too_large(&self) -> bool {
        matches!(self.inner.kind, Kind::Parse(Parse::TooLarge))
    }

    /// Returns true if the connection closed before a message in progress
    /// could complete.
    pub fn is_incomplete_message(&self) -> bool {
        matches!(self.inner.kind, Kind::IncompleteMessage)
    }

    /// Returns the HTTP status code RFC 7230 suggests reporting to the peer
    /// for this error, if any.
    pub fn status_hint(&self) -> Option<u16> {
        match self.inner.kind {
            Kind::BufferTooLong => Some(431),
            Kind::Parse(Parse::TooLarge) => Some(431),
            Kind::Parse(_) => Some(400),
            Kind::BodyLengthExceeded => Some(400),
            _ => None,
        }
    }

    /// Consumes the error, returning its underlying cause, if any.
    pub fn into_cause(self) -> Option<Box<dyn StdError + Send + Sync>> {
        self.inner.cause
    }

    pub(crate) fn new(kind: Kind) -> Error {
        Error {
            inner: Box::new(ErrorImpl { kind, cause: None }),
        }
    }

    pub(crate) fn with<C: Into<Cause>>(mut self, cause: C) -> Error {
        self.inner.cause = Some(cause.into());
        self
    }

    pub(crate) fn kind(&self) -> &Kind {
        &self.inner.kind
    }

    pub(crate) fn new_parse(parse: Parse) -> Error {
        Error::new(Kind::Parse(parse))
    }

    pub(crate) fn new_too_large() -> Error {
        Error::new(Kind::Parse(Parse::TooLarge))
    }

    pub(crate) fn new_buffer_too_long() -> Error {
        Error::new(Kind::BufferTooLong)
    }

    pub(crate) fn new_incomplete() -> Error {
        Error::new(Kind::IncompleteMessage)
    }

    pub(crate) fn new_unexpected_message() -> Error {
        Error::new(Kind::UnexpectedMessage)
    }

    pub(crate) fn new_body_length_exceeded() -> Error {
        Error::new(Kind::BodyLengthExceeded)
    }

    pub(crate) fn new_already_in_error() -> Error {
        Error::new(Kind::AlreadyInError)
    }

    pub(crate) fn new_not_ready_to_reuse() -> Error {
        Error::new(Kind::NotReadyToReuse)
    }

    pub(crate) fn new_already_waiting_for_100_continue() -> Error {
        Error::new(Kind::AlreadyWaitingFor100Continue)
    }

    pub(crate) fn new_invalid_trailer_field() -> Error {
        Error::new(Kind::Parse(Parse::Header(Header::InvalidTrailerField)))
    }

    fn description(&self) -> &str {
        match self.inner.kind {
            Kind::Parse(Parse::RequestLine) => "invalid request-line",
            Kind::Parse(Parse::StatusLine) => "invalid status-line",
            Kind::Parse(Parse::Version) => "invalid HTTP version",
            Kind::Parse(Parse::Header(Header::Token)) => "invalid header field",
            Kind::Parse(Parse::Header(Header::ObsoleteLineFolding)) => {
                "obsolete line folding in header block"
            }
            Kind::Parse(Parse::Header(Header::ContentLengthInvalid)) => {
                "invalid content-length"
            }
            Kind::Parse(Parse::Header(Header::ContentLengthConflict)) => {
                "multiple conflicting content-length values"
            }
            Kind::Parse(Parse::Header(Header::TransferEncodingInvalid)) => {
                "transfer-encoding present but not exactly \"chunked\""
            }
            Kind::Parse(Parse::Header(Header::InvalidTrailerField)) => {
                "trailer block contains a header field that may not appear as a trailer"
            }
            Kind::Parse(Parse::ChunkSize) => "invalid chunk size line",
            Kind::Parse(Parse::TooLarge) => "message head is too large",
            Kind::BodyLengthExceeded => "body exceeded declared content-length",
            Kind::IncompleteMessage => "connection closed before message completed",
            Kind::UnexpectedMessage => "event is not valid in the current state",
            Kind::BufferTooLong => "receive buffer exceeded max_buffer_size",
            Kind::AlreadyInError => "operation attempted while role is already in ERROR",
            Kind::NotReadyToReuse => "prepare_to_reuse called while not both sides are DONE",
            Kind::AlreadyWaitingFor100Continue => {
                "100-continue request sent while already waiting for one"
            }
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_tuple("h1_engine::Error");
        f.field(&self.inner.kind);
        if let Some(ref cause) = self.inner.cause {
            f.field(cause);
        }
        f.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref cause) = self.inner.cause {
            write!(f, "{}: {}", self.description(), cause)
        } else {
            f.write_str(self.description())
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner
            .cause
            .as_ref()
            .map(|cause| &**cause as &(dyn StdError + 'static))
    }
}

impl From<httparse::Error> for Parse {
    fn from(err: httparse::Error) -> Parse {
        match err {
            httparse::Error::HeaderName
            | httparse::Error::HeaderValue
            | httparse::Error::NewLine
            | httparse::Error::Token => Parse::Header(Header::Token),
            httparse::Error::Status => Parse::StatusLine,
            httparse::Error::TooManyHeaders => Parse::TooLarge,
            httparse::Error::Version => Parse::Version,
        }
    }
}

#[doc(hidden)]
trait AssertSendSync: Send + Sync + 'static {}
#[doc(hidden)]
impl AssertSendSync for Error {}
