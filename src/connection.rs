//! The connection façade: the public `Connection` type that dispatches
//! events to the state machine and swaps readers/writers as the exchange
//! progresses. This is the only module that touches [`ReceiveBuffer`]
//! directly, the only place a `(role, state)` pair is turned into a live
//! reader or writer, and the only place header cleanup for outgoing
//! responses happens.

use bytes::{Bytes, BytesMut};
use http::header::{CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING};
use http::HeaderValue;

use crate::buffer::ReceiveBuffer;
use crate::error::Error;
use crate::event::{Event, HttpVersion, PauseReason, Role, State};
use crate::framing::{self, Framing};
use crate::headers::{get_comma_header, set_comma_header, HeaderList};
use crate::proto::h1::{
    write_informational, write_request, write_response, ChunkedReader, Encoder, HeadKind,
    HeadReader, Http10Reader, LengthReader,
};
use crate::state::ConnectionState;
use crate::trace::{debug, trace};

/// The default cap on buffered-but-unparsed bytes: a 16 KiB head is larger
/// than any of the common server defaults (Apache, nginx, IIS, node.js) and
/// still small enough to bound memory use per idle connection.
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 16384;

/// A sans-I/O HTTP/1.1 connection: bytes in, [`Event`]s out, and vice
/// versa. Owns no socket and performs no I/O of its own; see the crate
/// docs for the embedder's responsibilities.
#[derive(Debug)]
pub struct Connection {
    state: ConnectionState,
    buf: ReceiveBuffer,
    receive_buffer_closed: bool,
    max_buffer_size: usize,
    reader: ReaderSlot,
    writer: WriterSlot,
}

#[derive(Debug)]
enum ReaderSlot {
    Head(HeadReader),
    Chunked(ChunkedReader),
    Length(LengthReader),
    Http10(Http10Reader),
}

impl ReaderSlot {
    fn head(role: Role) -> ReaderSlot {
        ReaderSlot::Head(HeadReader::new(head_kind(role)))
    }

    fn from_framing(framing: Framing) -> ReaderSlot {
        match framing {
            Framing::Chunked => ReaderSlot::Chunked(ChunkedReader::new()),
            Framing::ContentLength(len) => ReaderSlot::Length(LengthReader::new(len)),
            Framing::Http10 => ReaderSlot::Http10(Http10Reader::new()),
        }
    }

    fn read(
        &mut self,
        buf: &mut ReceiveBuffer,
        max_buffer_size: usize,
    ) -> Result<Option<Event>, Error> {
        match self {
            ReaderSlot::Head(r) => r.read(buf, max_buffer_size),
            ReaderSlot::Chunked(r) => r.read(buf),
            ReaderSlot::Length(r) => r.read(buf),
            ReaderSlot::Http10(r) => r.read(buf),
        }
    }

    fn read_eof(&mut self) -> Result<Event, Error> {
        match self {
            ReaderSlot::Head(r) => r.read_eof(),
            ReaderSlot::Chunked(r) => r.read_eof(),
            ReaderSlot::Length(r) => r.read_eof(),
            ReaderSlot::Http10(r) => r.read_eof(),
        }
    }
}

#[derive(Debug)]
enum WriterSlot {
    /// Between messages: the next `send()` must be a `Request` or
    /// `Response`/`InformationalResponse`, serialized directly from the
    /// event without any per-writer state.
    Head,
    Body(Encoder),
}

fn head_kind(role: Role) -> HeadKind {
    match role {
        Role::Client => HeadKind::Request,
        Role::Server => HeadKind::Response,
    }
}

fn encode_with(writer: &mut WriterSlot, event: &Event) -> Result<Vec<Bytes>, Error> {
    match event {
        Event::Request {
            method,
            target,
            headers,
            ..
        } => Ok(vec![write_request(method, target, headers)]),
        Event::InformationalResponse {
            status_code,
            headers,
            ..
        } => Ok(vec![write_informational(*status_code, headers)]),
        Event::Response {
            status_code,
            headers,
            ..
        } => Ok(vec![write_response(*status_code, headers)]),
        Event::Data { data } => match writer {
            WriterSlot::Body(enc) => {
                let mut out = Vec::new();
                enc.encode_data(data.clone(), &mut out)?;
                Ok(out)
            }
            WriterSlot::Head => Err(Error::new_unexpected_message()),
        },
        Event::EndOfMessage { headers } => match writer {
            WriterSlot::Body(enc) => {
                let mut out = Vec::new();
                enc.encode_end(headers, &mut out)?;
                Ok(out)
            }
            WriterSlot::Head => Err(Error::new_unexpected_message()),
        },
        Event::ConnectionClosed | Event::Paused { .. } => {
            unreachable!("handled by the caller before reaching the writer")
        }
    }
}

impl Encoder {
    fn from_framing(framing: Framing) -> Encoder {
        match framing {
            Framing::Chunked => Encoder::Chunked,
            Framing::ContentLength(len) => Encoder::Length(len),
            Framing::Http10 => Encoder::Http10,
        }
    }
}

impl Connection {
    /// Builds a connection playing `our_role`, with the default
    /// [`DEFAULT_MAX_BUFFER_SIZE`] cap on buffered head bytes.
    pub fn new(our_role: Role) -> Connection {
        Connection::with_max_buffer_size(our_role, DEFAULT_MAX_BUFFER_SIZE)
    }

    /// Builds a connection playing `our_role`, capping buffered-but-
    /// unparsed bytes at `max_buffer_size`.
    pub fn with_max_buffer_size(our_role: Role, max_buffer_size: usize) -> Connection {
        let state = ConnectionState::new(our_role);
        let reader = ReaderSlot::head(state.their_role());
        Connection {
            state,
            buf: ReceiveBuffer::new(),
            receive_buffer_closed: false,
            max_buffer_size,
            reader,
            writer: WriterSlot::Head,
        }
    }

    /// The state of `role`.
    pub fn state_of(&self, role: Role) -> State {
        self.state.state_of(role)
    }

    /// The client-side state, regardless of which role we are.
    pub fn client_state(&self) -> State {
        self.state.state_of(Role::Client)
    }

    /// The server-side state, regardless of which role we are.
    pub fn server_state(&self) -> State {
        self.state.state_of(Role::Server)
    }

    /// Our own state.
    pub fn our_state(&self) -> State {
        self.state.our_state()
    }

    /// Our peer's state.
    pub fn their_state(&self) -> State {
        self.state.their_state()
    }

    /// The last HTTP version observed from our peer, if any.
    pub fn their_http_version(&self) -> Option<HttpVersion> {
        self.state.their_http_version()
    }

    /// True if the client has sent a request with `Expect: 100-continue`
    /// and has not yet seen any response. Only meaningful for a `Server`-role
    /// `Connection`: the client is never "them" from its own side.
    pub fn they_are_waiting_for_100_continue(&self) -> bool {
        self.state.our_role() == Role::Server && self.state.client_is_waiting_for_100_continue()
    }

    /// The bytes buffered past a successful protocol switch (or a clean
    /// close), and whether the peer's side of the stream has closed.
    pub fn trailing_data(&self) -> (&[u8], bool) {
        (self.buf.as_slice(), self.receive_buffer_closed)
    }

    /// Feeds bytes into the connection and returns every event they
    /// produced.
    ///
    /// `Some(&[])` records that the peer has half-closed its send
    /// direction; `None` triggers a reparse pass with no new bytes
    /// (used right after [`Connection::prepare_to_reuse`], to drain
    /// whatever was pipelined ahead of the next request).
    pub fn receive_data(&mut self, data: Option<&[u8]>) -> Result<Vec<Event>, Error> {
        if self.state.their_state() == State::Error {
            return Err(Error::new_already_in_error());
        }
        if self.state.their_state() == State::Closed {
            return Ok(Vec::new());
        }
        match self.receive_data_inner(data) {
            Ok(events) => {
                trace!("receive_data: {} event(s)", events.len());
                Ok(events)
            }
            Err(e) => {
                debug!("receive_data: {:?} poisoned {:?}", e, self.state.their_role());
                self.state.process_error(self.state.their_role());
                Err(e)
            }
        }
    }

    fn receive_data_inner(&mut self, data: Option<&[u8]>) -> Result<Vec<Event>, Error> {
        match data {
            None => {}
            Some(d) if d.is_empty() => self.receive_buffer_closed = true,
            Some(d) => self.buf.extend(d),
        }

        let mut events = Vec::new();
        loop {
            let event = match self.next_receive_event()? {
                Some(event) => event,
                None => break,
            };

            if matches!(event, Event::Paused { .. }) {
                events.push(event);
                break;
            }

            let pending_reader = self.next_reader_for_receive(&event)?;
            self.state.apply(self.state.their_role(), &event)?;
            if let Some(reader) = pending_reader {
                self.reader = reader;
            }

            let is_closed = matches!(event, Event::ConnectionClosed);
            events.push(event);
            if is_closed {
                break;
            }
        }

        self.buf.compact();

        let paused = matches!(events.last(), Some(Event::Paused { .. }));
        if !paused && self.buf.len() > self.max_buffer_size {
            return Err(Error::new_buffer_too_long());
        }
        if self.receive_buffer_closed {
            let tail_ok = matches!(
                events.last(),
                Some(Event::Paused { .. }) | Some(Event::ConnectionClosed)
            );
            if !tail_ok {
                return Err(Error::new_incomplete());
            }
        }
        Ok(events)
    }

    fn next_receive_event(&mut self) -> Result<Option<Event>, Error> {
        match self.state.their_state() {
            State::Done if !self.buf.is_empty() => {
                return Ok(Some(Event::Paused {
                    reason: PauseReason::Done,
                }))
            }
            State::MightSwitchProtocol => {
                return Ok(Some(Event::Paused {
                    reason: PauseReason::MightSwitchProtocol,
                }))
            }
            State::SwitchedProtocol => {
                return Ok(Some(Event::Paused {
                    reason: PauseReason::SwitchedProtocol,
                }))
            }
            _ => {}
        }

        if let Some(event) = self.reader.read(&mut self.buf, self.max_buffer_size)? {
            return Ok(Some(event));
        }
        if self.buf.is_empty() && self.receive_buffer_closed {
            return self.reader.read_eof().map(Some);
        }
        Ok(None)
    }

    /// Computes the reader that should be active *after* `event`, if it
    /// differs from the current one. Runs (and may fail, e.g. on a
    /// conflicting `Content-Length`) before the state machine is driven,
    /// so a framing error never leaves the connection in an inconsistent
    /// half-transitioned state.
    fn next_reader_for_receive(&self, event: &Event) -> Result<Option<ReaderSlot>, Error> {
        match event {
            Event::Request { headers, .. } => {
                let framing = framing::request_framing(headers)?;
                Ok(Some(ReaderSlot::from_framing(framing)))
            }
            Event::Response {
                status_code,
                headers,
                ..
            } => {
                if self.state.connect_would_commit(*status_code) {
                    Ok(Some(ReaderSlot::head(self.state.their_role())))
                } else {
                    let framing = framing::response_framing(
                        self.state.request_method(),
                        *status_code,
                        headers,
                    )?;
                    Ok(Some(ReaderSlot::from_framing(framing)))
                }
            }
            Event::EndOfMessage { .. } => Ok(Some(ReaderSlot::head(self.state.their_role()))),
            _ => Ok(None),
        }
    }

    /// Rejects if our own side is already `ERROR`, cleans up response
    /// headers, then routes to the appropriate writer. A protocol error
    /// transitions `our_state` to `ERROR` before propagating.
    pub fn send(&mut self, event: Event) -> Result<Option<Bytes>, Error> {
        let slices = self.send_with_data_passthrough(event)?;
        Ok(slices.map(concat_slices))
    }

    /// Like [`Connection::send`], but returns the pieces that were
    /// written without concatenating them, so a caller-owned `Data`
    /// payload is forwarded unchanged instead of being copied into a
    /// single buffer.
    pub fn send_with_data_passthrough(
        &mut self,
        event: Event,
    ) -> Result<Option<Vec<Bytes>>, Error> {
        if self.state.our_state() == State::Error {
            return Err(Error::new_already_in_error());
        }
        match self.send_inner(event) {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                debug!("send: {:?} poisoned {:?}", e, self.state.our_role());
                self.state.process_error(self.state.our_role());
                Err(e)
            }
        }
    }

    fn send_inner(&mut self, mut event: Event) -> Result<Option<Vec<Bytes>>, Error> {
        if let Event::Response {
            status_code,
            ref mut headers,
            ..
        } = event
        {
            *headers = self.clean_response_headers(status_code, headers)?;
        }

        if matches!(event, Event::ConnectionClosed) {
            self.state.apply(self.state.our_role(), &event)?;
            return Ok(None);
        }

        let pending_writer = self.next_writer_for_send(&event)?;

        let mut writer = std::mem::replace(&mut self.writer, WriterSlot::Head);
        if let Err(e) = self.state.apply(self.state.our_role(), &event) {
            self.writer = writer;
            return Err(e);
        }
        let bytes = match encode_with(&mut writer, &event) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.writer = pending_writer.unwrap_or(writer);
                return Err(e);
            }
        };
        self.writer = pending_writer.unwrap_or(writer);
        Ok(Some(bytes))
    }

    fn next_writer_for_send(&self, event: &Event) -> Result<Option<WriterSlot>, Error> {
        match event {
            Event::Request { headers, .. } => {
                let framing = framing::request_framing(headers)?;
                Ok(Some(WriterSlot::Body(Encoder::from_framing(framing))))
            }
            Event::Response {
                status_code,
                headers,
                ..
            } => {
                if self.state.connect_would_commit(*status_code) {
                    Ok(Some(WriterSlot::Head))
                } else {
                    let framing = framing::response_framing(
                        self.state.request_method(),
                        *status_code,
                        headers,
                    )?;
                    Ok(Some(WriterSlot::Body(Encoder::from_framing(framing))))
                }
            }
            Event::EndOfMessage { .. } => Ok(Some(WriterSlot::Head)),
            _ => Ok(None),
        }
    }

    /// Response header cleanup (outbound `Response` only): recomputes
    /// framing from `request_method` and the response, strips or adds
    /// `Content-Length`/`Transfer-Encoding` to match, and folds in
    /// `Connection: close` when keep-alive is off or the peer can't
    /// accept chunked framing. Never mutates the caller's header list.
    fn clean_response_headers(
        &self,
        status_code: u16,
        headers: &HeaderList,
    ) -> Result<HeaderList, Error> {
        let framing = framing::response_framing(self.state.request_method(), status_code, headers)?;
        let mut cleaned = headers.clone();
        let mut close_needed = false;

        match framing {
            Framing::ContentLength(_) => {}
            Framing::Chunked | Framing::Http10 => {
                set_comma_header(&mut cleaned, CONTENT_LENGTH, std::iter::empty());
                let peer_supports_chunked = self.state.their_http_version() == Some(HttpVersion::HTTP_11);
                if peer_supports_chunked {
                    set_comma_header(
                        &mut cleaned,
                        TRANSFER_ENCODING,
                        std::iter::once(HeaderValue::from_static("chunked")),
                    );
                } else {
                    set_comma_header(&mut cleaned, TRANSFER_ENCODING, std::iter::empty());
                    close_needed = true;
                }
            }
        }

        if close_needed || !self.state.keep_alive() {
            let mut tokens = get_comma_header(&cleaned, &CONNECTION);
            tokens.retain(|t| t != "keep-alive");
            if !tokens.iter().any(|t| t == "close") {
                tokens.push("close".to_string());
            }
            let values = tokens
                .into_iter()
                .map(|t| HeaderValue::from_str(&t).expect("comma-header tokens are valid header-value bytes"));
            set_comma_header(&mut cleaned, CONNECTION, values);
        }
        Ok(cleaned)
    }

    /// Resets both roles to `IDLE` for a new request/response pair on the
    /// same byte stream. Fails unless both sides are `DONE` and
    /// `keep_alive` is still true. Also resets the active reader/writer
    /// back to head-parsing/head-writing; any bytes already buffered past
    /// the previous message are reparsed on the next `receive_data(None)`.
    pub fn prepare_to_reuse(&mut self) -> Result<(), Error> {
        self.state.prepare_to_reuse()?;
        self.reader = ReaderSlot::head(self.state.their_role());
        self.writer = WriterSlot::Head;
        Ok(())
    }
}

fn concat_slices(slices: Vec<Bytes>) -> Bytes {
    match slices.len() {
        0 => Bytes::new(),
        1 => slices.into_iter().next().expect("len checked above"),
        _ => {
            let total = slices.iter().map(Bytes::len).sum();
            let mut out = BytesMut::with_capacity(total);
            for slice in slices {
                out.extend_from_slice(&slice);
            }
            out.freeze()
        }
    }
}
