//! Writers: turn outbound events into wire bytes.
//!
//! Every writer returns a `Vec<Bytes>` rather than a single flat buffer: a
//! `Data` payload supplied by the caller is pushed in verbatim (so
//! `send_with_data_passthrough` can hand it back without copying), while
//! the framing bytes around it (chunk-size lines, trailers, start lines)
//! are built fresh. `send` simply concatenates the pieces for callers that
//! want one contiguous buffer.

use std::fmt::Write as _;

use bytes::{Bytes, BytesMut};
use http::header::HeaderName;

use crate::error::Error;
use crate::headers::HeaderList;

fn write_headers(buf: &mut BytesMut, headers: &HeaderList) {
    for (name, value) in headers {
        buf.extend_from_slice(name.as_str().as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(value.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    buf.extend_from_slice(b"\r\n");
}

/// Serializes a request line and header block. Requests are always written
/// as HTTP/1.1: this engine never generates HTTP/1.0 output.
pub(crate) fn write_request(method: &[u8], target: &[u8], headers: &HeaderList) -> Bytes {
    let mut buf = BytesMut::with_capacity(64 + headers.len() * 32);
    buf.extend_from_slice(method);
    buf.extend_from_slice(b" ");
    buf.extend_from_slice(target);
    buf.extend_from_slice(b" HTTP/1.1\r\n");
    write_headers(&mut buf, headers);
    buf.freeze()
}

/// Serializes a final (`>= 200`) status line and header block.
pub(crate) fn write_response(status_code: u16, headers: &HeaderList) -> Bytes {
    write_status_line(status_code, headers)
}

/// Serializes a 1xx informational status line and header block.
pub(crate) fn write_informational(status_code: u16, headers: &HeaderList) -> Bytes {
    write_status_line(status_code, headers)
}

fn write_status_line(status_code: u16, headers: &HeaderList) -> Bytes {
    let mut buf = BytesMut::with_capacity(48 + headers.len() * 32);
    buf.extend_from_slice(b"HTTP/1.1 ");
    let mut code_buf = itoa::Buffer::new();
    buf.extend_from_slice(code_buf.format(status_code).as_bytes());
    buf.extend_from_slice(b" ");
    buf.extend_from_slice(reason_phrase(status_code).as_bytes());
    buf.extend_from_slice(b"\r\n");
    write_headers(&mut buf, headers);
    buf.freeze()
}

/// A minimal standard reason-phrase table. The event model this crate
/// exchanges with its embedder has no room for a caller-supplied reason
/// phrase, so every status line uses the table's phrase (or the generic
/// fallback for codes it doesn't recognize).
fn reason_phrase(status_code: u16) -> &'static str {
    match status_code {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        409 => "Conflict",
        411 => "Length Required",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        417 => "Expectation Failed",
        426 => "Upgrade Required",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown",
    }
}

/// An outbound body writer, one per framing strategy. Keyed to the
/// connection's body-framing decision the same way [`super::decode`]'s
/// readers are.
#[derive(Debug)]
pub(crate) enum Encoder {
    Chunked,
    Length(u64),
    Http10,
}

impl Encoder {
    /// Appends the wire representation of one `Data` payload to `out`,
    /// without copying `data` itself.
    pub(crate) fn encode_data(&mut self, data: Bytes, out: &mut Vec<Bytes>) -> Result<(), Error> {
        if data.is_empty() {
            return Ok(());
        }
        match self {
            Encoder::Chunked => {
                // A u64 hex chunk-size is at most 16 digits; plus the CRLF.
                let mut size_line = BytesMut::with_capacity(18);
                write!(size_line, "{:x}\r\n", data.len()).expect("writing to BytesMut cannot fail");
                out.push(size_line.freeze());
                out.push(data);
                out.push(Bytes::from_static(b"\r\n"));
            }
            Encoder::Length(remaining) => {
                if data.len() as u64 > *remaining {
                    return Err(Error::new_body_length_exceeded());
                }
                *remaining -= data.len() as u64;
                out.push(data);
            }
            Encoder::Http10 => {
                out.push(data);
            }
        }
        Ok(())
    }

    /// Appends the wire representation of `EndOfMessage` (trailers, for
    /// chunked framing) to `out`.
    pub(crate) fn encode_end(
        &mut self,
        trailers: &HeaderList,
        out: &mut Vec<Bytes>,
    ) -> Result<(), Error> {
        match self {
            Encoder::Chunked => {
                let mut buf = BytesMut::with_capacity(16 + trailers.len() * 32);
                buf.extend_from_slice(b"0\r\n");
                for (name, value) in trailers {
                    if !is_valid_trailer_field(name) {
                        return Err(Error::new_invalid_trailer_field());
                    }
                    buf.extend_from_slice(name.as_str().as_bytes());
                    buf.extend_from_slice(b": ");
                    buf.extend_from_slice(value.as_bytes());
                    buf.extend_from_slice(b"\r\n");
                }
                buf.extend_from_slice(b"\r\n");
                out.push(buf.freeze());
                Ok(())
            }
            Encoder::Length(remaining) => {
                if *remaining != 0 {
                    Err(Error::new_body_length_exceeded())
                } else {
                    Ok(())
                }
            }
            Encoder::Http10 => Ok(()),
        }
    }
}

/// Header fields that carry framing or identity semantics and therefore
/// cannot legally appear as trailers (RFC 7230 §4.1.2).
fn is_valid_trailer_field(name: &HeaderName) -> bool {
    !matches!(
        name.as_str(),
        "authorization"
            | "cache-control"
            | "content-encoding"
            | "content-length"
            | "content-range"
            | "content-type"
            | "host"
            | "max-forwards"
            | "set-cookie"
            | "trailer"
            | "transfer-encoding"
            | "te"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{CONTENT_LENGTH, HOST};
    use http::HeaderValue;

    fn field(name: HeaderName, value: &str) -> (HeaderName, HeaderValue) {
        (name, HeaderValue::from_str(value).unwrap())
    }

    #[test]
    fn request_line_shape() {
        let headers = vec![field(HOST, "example.com")];
        let bytes = write_request(b"GET", b"/", &headers);
        assert_eq!(&bytes[..], b"GET / HTTP/1.1\r\nhost: example.com\r\n\r\n");
    }

    #[test]
    fn response_status_line_shape() {
        let bytes = write_response(200, &[]);
        assert_eq!(&bytes[..], b"HTTP/1.1 200 OK\r\n\r\n");
    }

    #[test]
    fn unknown_status_falls_back_to_generic_reason() {
        let bytes = write_response(599, &[]);
        assert_eq!(&bytes[..], b"HTTP/1.1 599 Unknown\r\n\r\n");
    }

    #[test]
    fn chunked_encoder_frames_each_call() {
        let mut enc = Encoder::Chunked;
        let mut out = Vec::new();
        enc.encode_data(Bytes::from_static(b"abc"), &mut out).unwrap();
        enc.encode_end(&[], &mut out).unwrap();
        let joined: Vec<u8> = out.iter().flat_map(|b| b.to_vec()).collect();
        assert_eq!(joined, b"3\r\nabc\r\n0\r\n\r\n");
    }

    #[test]
    fn length_encoder_rejects_overrun() {
        let mut enc = Encoder::Length(2);
        let mut out = Vec::new();
        assert!(enc.encode_data(Bytes::from_static(b"abc"), &mut out).is_err());
    }

    #[test]
    fn length_encoder_rejects_short_end() {
        let mut enc = Encoder::Length(5);
        let mut out = Vec::new();
        enc.encode_data(Bytes::from_static(b"ab"), &mut out).unwrap();
        assert!(enc.encode_end(&[], &mut out).is_err());
    }

    #[test]
    fn trailer_rejects_content_length() {
        let mut enc = Encoder::Chunked;
        let mut out = Vec::new();
        let trailers = vec![field(CONTENT_LENGTH, "5")];
        assert!(enc.encode_end(&trailers, &mut out).is_err());
    }
}
