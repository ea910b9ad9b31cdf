//! Readers ([`decode`]) and writers ([`encode`]), keyed by connection state
//! and by body-framing strategy the way the rest of this crate describes.

pub(crate) use self::decode::{ChunkedReader, HeadKind, HeadReader, Http10Reader, LengthReader};
pub(crate) use self::encode::{write_informational, write_request, write_response, Encoder};

mod decode;
mod encode;
