//! Header-list utilities.
//!
//! Events in this crate carry headers as an ordered list of `(HeaderName,
//! HeaderValue)` pairs rather than an `http::HeaderMap`: the wire protocol
//! cares about the exact order and repetition of header lines (duplicate
//! `Set-Cookie` lines, trailer ordering, etc.), and a `HeaderMap` does not
//! promise to preserve either across a `get_all`/iterate round trip the way
//! a plain `Vec` does.

use http::header::HeaderName;
use http::HeaderValue;

/// A single header field as it appeared (or will appear) on the wire.
pub type HeaderField = (HeaderName, HeaderValue);

/// An ordered list of header fields. Case-insensitive comparisons on the
/// name are the caller's responsibility via [`HeaderName`]'s own `PartialEq`,
/// which already ignores case.
pub type HeaderList = Vec<HeaderField>;

/// Returns an iterator over the values of every field whose name matches
/// `name`, in the order they occur in `headers`.
pub(crate) fn get_all<'a>(
    headers: &'a HeaderList,
    name: &'a HeaderName,
) -> impl Iterator<Item = &'a HeaderValue> {
    headers
        .iter()
        .filter(move |(n, _)| n == name)
        .map(|(_, v)| v)
}

/// Returns the concatenation of every value with the given name, split on
/// commas, each element trimmed of surrounding whitespace and lowercased.
/// Matches RFC 7230 §3.2.6's treatment of comma-separated list headers
/// (`Connection`, `Transfer-Encoding`, and similar).
pub(crate) fn get_comma_header(headers: &HeaderList, name: &HeaderName) -> Vec<String> {
    let mut out = Vec::new();
    for value in get_all(headers, name) {
        if let Ok(s) = value.to_str() {
            for part in s.split(',') {
                let part = part.trim();
                if !part.is_empty() {
                    out.push(part.to_ascii_lowercase());
                }
            }
        }
    }
    out
}

/// Removes every existing field named `name`, then appends one field per
/// value in `values` (already wire-encoded).
pub(crate) fn set_comma_header<I>(headers: &mut HeaderList, name: HeaderName, values: I)
where
    I: IntoIterator<Item = HeaderValue>,
{
    headers.retain(|(n, _)| *n != name);
    for value in values {
        headers.push((name.clone(), value));
    }
}

/// True iff `headers` contains a case-insensitive `Expect` field whose
/// comma-list contains `100-continue`, and `version` is HTTP/1.1 or newer.
/// HTTP/1.0 clients cannot rely on 100-continue, so the check is ignored
/// below 1.1 even if the header is present.
pub(crate) fn has_expect_100_continue(version: http::Version, headers: &HeaderList) -> bool {
    if version < http::Version::HTTP_11 {
        return false;
    }
    get_comma_header(headers, &http::header::EXPECT)
        .iter()
        .any(|v| v == "100-continue")
}

pub(crate) fn connection_keep_alive(value: &HeaderValue) -> bool {
    connection_has(value, "keep-alive")
}

pub(crate) fn connection_close(value: &HeaderValue) -> bool {
    connection_has(value, "close")
}

fn connection_has(value: &HeaderValue, needle: &str) -> bool {
    if let Ok(s) = value.to_str() {
        for val in s.split(',') {
            if val.trim().eq_ignore_ascii_case(needle) {
                return true;
            }
        }
    }
    false
}

/// Returns true if any `Connection` header field names `needle`.
pub(crate) fn connection_has_token(headers: &HeaderList, needle: &str) -> bool {
    get_all(headers, &http::header::CONNECTION).any(|v| connection_has(v, needle))
}
