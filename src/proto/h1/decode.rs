//! Readers: turn buffered bytes into [`Event`]s.
//!
//! Every reader is invoked with the connection's receive buffer and
//! returns `Ok(Some(event))` on a fully parsed event, `Ok(None)` if more
//! bytes are needed, or `Err` on a protocol violation. A reader consumes
//! exactly the bytes belonging to the event it returns; anything left over
//! stays buffered for the next call.

use bytes::{Buf, Bytes};
use http::header::HeaderName;
use http::HeaderValue;

use crate::buffer::ReceiveBuffer;
use crate::error::{Error, Header as HeaderErr, Parse};
use crate::event::{Event, HttpVersion};
use crate::headers::HeaderList;

/// Headers arrays are stack-allocated for `httparse`; this bounds how many
/// header fields a single message head (or trailer block) may contain.
const MAX_HEADERS: usize = 100;

/// Chunk-extension text (and a chunk-size line in general) longer than this
/// is rejected rather than buffered indefinitely.
const CHUNK_SIZE_LINE_LIMIT: usize = 1024 * 16;

/// Trailer header blocks longer than this are rejected.
const TRAILER_LIMIT: usize = 1024 * 16;

/// Which start line a [`HeadReader`] expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HeadKind {
    Request,
    Response,
}

#[derive(Debug)]
pub(crate) struct HeadReader {
    kind: HeadKind,
}

impl HeadReader {
    pub(crate) fn new(kind: HeadKind) -> HeadReader {
        HeadReader { kind }
    }

    pub(crate) fn read(
        &mut self,
        buf: &mut ReceiveBuffer,
        max_buffer_size: usize,
    ) -> Result<Option<Event>, Error> {
        let end = match buf.find(b"\r\n\r\n") {
            Some(pos) => pos + 4,
            None => {
                return if buf.len() >= max_buffer_size {
                    Err(Error::new_too_large())
                } else {
                    Ok(None)
                };
            }
        };

        reject_obsolete_folding(&buf.as_slice()[..end])?;

        let event = match self.kind {
            HeadKind::Request => parse_request(&buf.as_slice()[..end])?,
            HeadKind::Response => parse_response(&buf.as_slice()[..end])?,
        };
        buf.advance(end);
        Ok(Some(event))
    }

    /// Called only when the buffer is empty and the peer has half-closed.
    /// Since nothing is ever consumed from the buffer until a complete
    /// start line and header block are available, an empty buffer here
    /// always means no message was in progress: a clean close.
    pub(crate) fn read_eof(&mut self) -> Result<Event, Error> {
        Ok(Event::ConnectionClosed)
    }
}

fn reject_obsolete_folding(head: &[u8]) -> Result<(), Error> {
    let mut lines = head.split(|&b| b == b'\n');
    // Skip the start line; a leading space there is part of the request
    // target or reason phrase grammar, not folding.
    lines.next();
    for line in lines {
        if let Some((&first, _)) = line.split_first() {
            if first == b' ' || first == b'\t' {
                return Err(Error::new_parse(Parse::Header(
                    HeaderErr::ObsoleteLineFolding,
                )));
            }
        }
    }
    Ok(())
}

fn parse_request(head: &[u8]) -> Result<Event, Error> {
    let mut raw_headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut raw_headers);
    match req.parse(head) {
        Ok(httparse::Status::Complete(_)) => {}
        Ok(httparse::Status::Partial) => return Err(Error::new_parse(Parse::RequestLine)),
        Err(e) => return Err(Error::new_parse(Parse::from(e))),
    }

    let method = Bytes::copy_from_slice(
        req.method
            .ok_or_else(|| Error::new_parse(Parse::RequestLine))?
            .as_bytes(),
    );
    let target = Bytes::copy_from_slice(
        req.path
            .ok_or_else(|| Error::new_parse(Parse::RequestLine))?
            .as_bytes(),
    );
    let version =
        HttpVersion::from_httparse(req.version.ok_or_else(|| Error::new_parse(Parse::Version))?);
    let headers = collect_headers(req.headers)?;

    Ok(Event::Request {
        method,
        target,
        headers,
        http_version: version.as_bytes(),
    })
}

fn parse_response(head: &[u8]) -> Result<Event, Error> {
    let mut raw_headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut res = httparse::Response::new(&mut raw_headers);
    match res.parse(head) {
        Ok(httparse::Status::Complete(_)) => {}
        Ok(httparse::Status::Partial) => return Err(Error::new_parse(Parse::StatusLine)),
        Err(e) => return Err(Error::new_parse(Parse::from(e))),
    }

    let status_code = res.code.ok_or_else(|| Error::new_parse(Parse::StatusLine))?;
    let version =
        HttpVersion::from_httparse(res.version.ok_or_else(|| Error::new_parse(Parse::Version))?);
    let headers = collect_headers(res.headers)?;

    if (100..200).contains(&status_code) {
        Ok(Event::InformationalResponse {
            status_code,
            headers,
            http_version: version.as_bytes(),
        })
    } else {
        Ok(Event::Response {
            status_code,
            headers,
            http_version: version.as_bytes(),
        })
    }
}

fn collect_headers(raw: &[httparse::Header<'_>]) -> Result<HeaderList, Error> {
    let mut headers = Vec::with_capacity(raw.len());
    for h in raw {
        let name = HeaderName::from_bytes(h.name.as_bytes())
            .map_err(|_| Error::new_parse(Parse::Header(HeaderErr::Token)))?;
        let value = HeaderValue::from_bytes(h.value)
            .map_err(|_| Error::new_parse(Parse::Header(HeaderErr::Token)))?;
        headers.push((name, value));
    }
    Ok(headers)
}

/// Parses trailer-part header lines directly (no start line). Mirrors
/// [`collect_headers`] but drives `httparse::parse_headers`, which is the
/// right entry point for a header block with no preceding request or
/// status line.
fn parse_trailers(buf: &[u8]) -> Result<Option<(usize, HeaderList)>, Error> {
    let mut raw_headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    match httparse::parse_headers(buf, &mut raw_headers) {
        Ok(httparse::Status::Complete((consumed, raw))) => {
            Ok(Some((consumed, collect_headers(raw)?)))
        }
        Ok(httparse::Status::Partial) => {
            if buf.len() >= TRAILER_LIMIT {
                Err(Error::new_too_large())
            } else {
                Ok(None)
            }
        }
        Err(e) => Err(Error::new_parse(Parse::from(e))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedPhase {
    SizeLine,
    Data,
    DataCrlf,
    Trailer,
    Done,
}

#[derive(Debug)]
pub(crate) struct ChunkedReader {
    phase: ChunkedPhase,
    remaining: u64,
}

impl ChunkedReader {
    pub(crate) fn new() -> ChunkedReader {
        ChunkedReader {
            phase: ChunkedPhase::SizeLine,
            remaining: 0,
        }
    }

    pub(crate) fn read(&mut self, buf: &mut ReceiveBuffer) -> Result<Option<Event>, Error> {
        loop {
            match self.phase {
                ChunkedPhase::SizeLine => {
                    let crlf = match buf.find(b"\r\n") {
                        Some(pos) => pos,
                        None => {
                            return if buf.len() >= CHUNK_SIZE_LINE_LIMIT {
                                Err(Error::new_parse(Parse::ChunkSize))
                            } else {
                                Ok(None)
                            };
                        }
                    };
                    let line = &buf.as_slice()[..crlf];
                    let size = parse_chunk_size(line)?;
                    buf.advance(crlf + 2);
                    if size == 0 {
                        self.phase = ChunkedPhase::Trailer;
                    } else {
                        self.remaining = size;
                        self.phase = ChunkedPhase::Data;
                    }
                }
                ChunkedPhase::Data => {
                    if buf.is_empty() {
                        return Ok(None);
                    }
                    let take = std::cmp::min(self.remaining, buf.len() as u64) as usize;
                    let chunk = buf.split_to(take);
                    self.remaining -= take as u64;
                    if self.remaining == 0 {
                        self.phase = ChunkedPhase::DataCrlf;
                    }
                    return Ok(Some(Event::Data {
                        data: chunk.freeze(),
                    }));
                }
                ChunkedPhase::DataCrlf => {
                    if buf.len() < 2 {
                        return Ok(None);
                    }
                    if &buf.as_slice()[..2] != b"\r\n" {
                        return Err(Error::new_parse(Parse::ChunkSize));
                    }
                    buf.advance(2);
                    self.phase = ChunkedPhase::SizeLine;
                }
                ChunkedPhase::Trailer => {
                    let slice = buf.as_slice();
                    match parse_trailers(slice)? {
                        Some((consumed, trailers)) => {
                            buf.advance(consumed);
                            self.phase = ChunkedPhase::Done;
                            return Ok(Some(Event::EndOfMessage { headers: trailers }));
                        }
                        None => return Ok(None),
                    }
                }
                ChunkedPhase::Done => return Ok(None),
            }
        }
    }

    pub(crate) fn read_eof(&mut self) -> Result<Event, Error> {
        Err(Error::new_incomplete())
    }
}

fn parse_chunk_size(line: &[u8]) -> Result<u64, Error> {
    // Ignore chunk extensions (`;name=value`); they carry no semantics this
    // engine needs to act on.
    let digits = match line.iter().position(|&b| b == b';') {
        Some(pos) => &line[..pos],
        None => line,
    };
    if digits.is_empty() || digits.len() > 16 {
        return Err(Error::new_parse(Parse::ChunkSize));
    }
    let mut value: u64 = 0;
    for &b in digits {
        let digit = match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'f' => b - b'a' + 10,
            b'A'..=b'F' => b - b'A' + 10,
            _ => return Err(Error::new_parse(Parse::ChunkSize)),
        };
        value = value
            .checked_mul(16)
            .and_then(|v| v.checked_add(u64::from(digit)))
            .ok_or_else(|| Error::new_parse(Parse::ChunkSize))?;
    }
    Ok(value)
}

#[derive(Debug)]
pub(crate) struct LengthReader {
    remaining: u64,
}

impl LengthReader {
    pub(crate) fn new(len: u64) -> LengthReader {
        LengthReader { remaining: len }
    }

    pub(crate) fn read(&mut self, buf: &mut ReceiveBuffer) -> Result<Option<Event>, Error> {
        if self.remaining == 0 {
            return Ok(Some(Event::end_of_message_empty()));
        }
        if buf.is_empty() {
            return Ok(None);
        }
        let take = std::cmp::min(self.remaining, buf.len() as u64) as usize;
        let chunk = buf.split_to(take);
        self.remaining -= take as u64;
        Ok(Some(Event::Data {
            data: chunk.freeze(),
        }))
    }

    pub(crate) fn read_eof(&mut self) -> Result<Event, Error> {
        Err(Error::new_incomplete())
    }
}

#[derive(Debug)]
pub(crate) struct Http10Reader;

impl Http10Reader {
    pub(crate) fn new() -> Http10Reader {
        Http10Reader
    }

    pub(crate) fn read(&mut self, buf: &mut ReceiveBuffer) -> Result<Option<Event>, Error> {
        if buf.is_empty() {
            return Ok(None);
        }
        let all = buf.split_to(buf.len());
        Ok(Some(Event::Data { data: all.freeze() }))
    }

    pub(crate) fn read_eof(&mut self) -> Result<Event, Error> {
        Ok(Event::end_of_message_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buf_from(bytes: &[u8]) -> ReceiveBuffer {
        let mut b = ReceiveBuffer::new();
        b.extend(bytes);
        b
    }

    #[test]
    fn request_line_and_headers() {
        let mut buf = buf_from(b"GET /foo HTTP/1.1\r\nHost: example.com\r\n\r\n");
        let mut reader = HeadReader::new(HeadKind::Request);
        let event = reader.read(&mut buf, 16384).unwrap().unwrap();
        match event {
            Event::Request {
                method,
                target,
                headers,
                http_version,
            } => {
                assert_eq!(&method[..], b"GET");
                assert_eq!(&target[..], b"/foo");
                assert_eq!(&http_version[..], b"1.1");
                assert_eq!(headers.len(), 1);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_head_waits_for_more() {
        let mut buf = buf_from(b"GET /foo HTTP/1.1\r\nHost: e");
        let mut reader = HeadReader::new(HeadKind::Request);
        assert!(reader.read(&mut buf, 16384).unwrap().is_none());
    }

    #[test]
    fn oversized_head_is_rejected() {
        let mut buf = buf_from(b"GET / HTTP/1.1\r\nX:");
        let mut reader = HeadReader::new(HeadKind::Request);
        assert!(reader.read(&mut buf, 4).unwrap_err().is_parse_too_large());
    }

    #[test]
    fn obsolete_folding_rejected() {
        let mut buf = buf_from(b"GET / HTTP/1.1\r\nFoo: bar\r\n baz\r\n\r\n");
        let mut reader = HeadReader::new(HeadKind::Request);
        assert!(reader.read(&mut buf, 16384).unwrap_err().is_parse());
    }

    #[test]
    fn status_line_1xx_is_informational() {
        let mut buf = buf_from(b"HTTP/1.1 100 Continue\r\n\r\n");
        let mut reader = HeadReader::new(HeadKind::Response);
        let event = reader.read(&mut buf, 16384).unwrap().unwrap();
        assert!(matches!(
            event,
            Event::InformationalResponse {
                status_code: 100,
                ..
            }
        ));
    }

    #[test]
    fn chunked_body_splits_across_calls() {
        let mut buf = buf_from(b"3\r\nab");
        let mut reader = ChunkedReader::new();
        let first = reader.read(&mut buf).unwrap().unwrap();
        assert!(matches!(first, Event::Data { ref data } if &data[..] == b"ab"));
        assert!(reader.read(&mut buf).unwrap().is_none());
        buf.extend(b"c\r\n0\r\n\r\n");
        let second = reader.read(&mut buf).unwrap().unwrap();
        assert!(matches!(second, Event::Data { ref data } if &data[..] == b"c"));
        let end = reader.read(&mut buf).unwrap().unwrap();
        assert!(matches!(end, Event::EndOfMessage { .. }));
    }

    #[test]
    fn chunked_full_message() {
        let mut buf = buf_from(b"3\r\nabc\r\n2\r\nde\r\n0\r\n\r\n");
        let mut reader = ChunkedReader::new();
        let mut data = Vec::new();
        loop {
            match reader.read(&mut buf).unwrap() {
                Some(Event::Data { data: d }) => data.extend_from_slice(&d),
                Some(Event::EndOfMessage { headers }) => {
                    assert!(headers.is_empty());
                    break;
                }
                Some(other) => panic!("unexpected {:?}", other),
                None => panic!("need more data unexpectedly"),
            }
        }
        assert_eq!(data, b"abcde");
    }

    #[test]
    fn chunked_rejects_oversized_size_line() {
        let huge = vec![b'f'; CHUNK_SIZE_LINE_LIMIT + 1];
        let mut buf = ReceiveBuffer::new();
        buf.extend(&huge);
        let mut reader = ChunkedReader::new();
        assert!(reader.read(&mut buf).is_err());
    }

    #[test]
    fn content_length_zero_ends_immediately() {
        let mut buf = buf_from(b"");
        let mut reader = LengthReader::new(0);
        let event = reader.read(&mut buf).unwrap().unwrap();
        assert!(matches!(event, Event::EndOfMessage { .. }));
    }

    #[test]
    fn http10_reader_drains_then_eofs() {
        let mut buf = buf_from(b"hello");
        let mut reader = Http10Reader::new();
        let event = reader.read(&mut buf).unwrap().unwrap();
        assert!(matches!(event, Event::Data { .. }));
        assert!(buf.is_empty());
        assert!(reader.read(&mut buf).unwrap().is_none());
        assert!(matches!(
            reader.read_eof().unwrap(),
            Event::EndOfMessage { .. }
        ));
    }
}
