//! Wire-level codecs: request/status lines, header blocks, chunked and
//! content-length bodies. See [`h1`] for the reader and writer registries
//! the connection façade dispatches through.

pub(crate) mod h1;
