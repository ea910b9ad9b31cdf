//! The append-only receive buffer.
//!
//! Bytes handed to `receive_data` land here and stay until a reader has
//! consumed them. It never touches I/O of its own: it only ever grows by
//! `extend` and shrinks by `advance`, both driven by the connection façade.

use bytes::{Buf, BytesMut};

/// Default threshold above which [`ReceiveBuffer::compact`] bothers to
/// reallocate. Keeps compaction from running (and copying) on every single
/// `receive_data` call when the buffer is already small.
const COMPACT_SLACK: usize = 1024;

#[derive(Debug, Default)]
pub(crate) struct ReceiveBuffer {
    buf: BytesMut,
}

impl ReceiveBuffer {
    pub(crate) fn new() -> Self {
        ReceiveBuffer {
            buf: BytesMut::new(),
        }
    }

    pub(crate) fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub(crate) fn len(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Drops `cnt` bytes from the front of the buffer.
    pub(crate) fn advance(&mut self, cnt: usize) {
        self.buf.advance(cnt);
    }

    /// Splits off and returns the first `at` bytes, removing them from the
    /// buffer. Used by readers that hand a body slice back to the caller
    /// without copying it.
    pub(crate) fn split_to(&mut self, at: usize) -> BytesMut {
        self.buf.split_to(at)
    }

    /// Returns the byte offset of the first occurrence of `needle`, if any.
    pub(crate) fn find(&self, needle: &[u8]) -> Option<usize> {
        find_slice(&self.buf, needle)
    }

    /// Reclaims wasted front capacity left behind by `advance`. A no-op
    /// unless the gap between logical length and backing capacity has grown
    /// past [`COMPACT_SLACK`], so repeated small `receive_data` calls don't
    /// each pay for a reallocation.
    pub(crate) fn compact(&mut self) {
        if self.buf.is_empty() {
            self.buf = BytesMut::new();
            return;
        }
        let remaining = self.buf.len();
        if self.buf.capacity() > remaining + COMPACT_SLACK {
            let mut fresh = BytesMut::with_capacity(remaining);
            fresh.extend_from_slice(&self.buf);
            self.buf = fresh;
        }
    }
}

fn find_slice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
