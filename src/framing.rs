//! Body-framing decisions per RFC 7230 §3.3.3.

use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};

use crate::error::{Error, Header as HeaderErr, Parse};
use crate::headers::{get_all, get_comma_header, HeaderList};

/// How a message body's length is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Framing {
    /// A fixed number of bytes, known up front.
    ContentLength(u64),
    /// `Transfer-Encoding: chunked`.
    Chunked,
    /// No framing header present; body runs until the peer closes (only
    /// valid for responses).
    Http10,
}

/// Framing for an outbound or inbound request. Requests with neither
/// `Transfer-Encoding` nor `Content-Length` carry no body.
pub(crate) fn request_framing(headers: &HeaderList) -> Result<Framing, Error> {
    body_framing_from_headers(headers, Framing::ContentLength(0))
}

/// Framing for an outbound or inbound response, given the method of the
/// request it answers (needed for the HEAD/CONNECT special cases) and its
/// own status code.
pub(crate) fn response_framing(
    request_method: Option<&[u8]>,
    status_code: u16,
    headers: &HeaderList,
) -> Result<Framing, Error> {
    if status_code == 204 || status_code == 304 {
        return Ok(Framing::ContentLength(0));
    }
    if let Some(method) = request_method {
        if method.eq_ignore_ascii_case(b"HEAD") {
            return Ok(Framing::ContentLength(0));
        }
        if method.eq_ignore_ascii_case(b"CONNECT") && (200..300).contains(&status_code) {
            return Ok(Framing::ContentLength(0));
        }
    }
    body_framing_from_headers(headers, Framing::Http10)
}

fn body_framing_from_headers(headers: &HeaderList, default: Framing) -> Result<Framing, Error> {
    let transfer_encodings = get_comma_header(headers, &TRANSFER_ENCODING);
    if !transfer_encodings.is_empty() {
        return if transfer_encodings.len() == 1 && transfer_encodings[0] == "chunked" {
            Ok(Framing::Chunked)
        } else {
            // Any Transfer-Encoding value other than a lone "chunked" is
            // rejected outright, on both send and receive.
            Err(Error::new_parse(Parse::Header(
                HeaderErr::TransferEncodingInvalid,
            )))
        };
    }

    match content_length_parse_all_checked(headers)? {
        Some(len) => Ok(Framing::ContentLength(len)),
        None => Ok(default),
    }
}

/// Parses every `Content-Length` header present, requiring that if more
/// than one is present they all agree. Returns `Ok(None)` if no
/// `Content-Length` header is present at all.
fn content_length_parse_all_checked(headers: &HeaderList) -> Result<Option<u64>, Error> {
    let mut agreed: Option<u64> = None;
    let mut any = false;
    for value in get_all(headers, &CONTENT_LENGTH) {
        any = true;
        let parsed: u64 = value
            .to_str()
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                Error::new_parse(Parse::Header(HeaderErr::ContentLengthInvalid))
            })?;
        match agreed {
            None => agreed = Some(parsed),
            Some(prev) if prev == parsed => {}
            Some(_) => {
                return Err(Error::new_parse(Parse::Header(
                    HeaderErr::ContentLengthConflict,
                )))
            }
        }
    }
    if any {
        Ok(agreed)
    } else {
        Ok(None)
    }
}
