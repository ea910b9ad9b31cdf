#![warn(missing_docs)]
#![deny(missing_debug_implementations)]
#![cfg_attr(test, deny(rust_2018_idioms))]

//! # h1-engine
//!
//! A sans-I/O HTTP/1.1 protocol engine: a [`Connection`] turns bytes on a
//! bidirectional stream into [`Event`]s, and [`Event`]s back into bytes,
//! without ever touching a socket, a thread, or an event loop.
//!
//! This crate implements the *core* of HTTP/1.1: request/status lines,
//! header blocks, chunked and content-length framing, keep-alive reuse,
//! and `Upgrade`/`CONNECT` protocol-switch negotiation. It does not open
//! connections, schedule tasks, route requests, or speak TLS, HTTP/2, or
//! HTTP/3 -- those are an embedder's job, built on top of the events this
//! crate produces.
//!
//! ## Shape of use
//!
//! ```
//! use h1_engine::{Connection, Event, Role};
//!
//! let mut client = Connection::new(Role::Client);
//! let head = client
//!     .send(Event::Request {
//!         method: "GET".into(),
//!         target: "/".into(),
//!         headers: vec![(
//!             http::header::HOST,
//!             http::HeaderValue::from_static("example.com"),
//!         )],
//!         http_version: "1.1".into(),
//!     })
//!     .unwrap()
//!     .unwrap();
//! client.send(Event::EndOfMessage { headers: vec![] }).unwrap();
//! assert!(head.starts_with(b"GET / HTTP/1.1"));
//! ```
//!
//! ## Concurrency
//!
//! `Connection` is neither `Sync` nor internally synchronized; it is
//! meant to be owned by one task per transport and driven synchronously.
//! `send` and `receive_data` may be interleaved in any order the embedder
//! chooses -- the two directions of a connection are modeled
//! independently.
//!
//! ## Errors
//!
//! Every failure mode -- malformed bytes, an event invalid for the
//! current state, a buffer that grew past its cap -- surfaces as a single
//! [`Error`] kind carrying a message and, where RFC 7230 suggests one, an
//! HTTP status hint. See [`Error::status_hint`].

#[doc(no_inline)]
pub use http;

mod buffer;
mod connection;
mod error;
mod event;
mod framing;
mod headers;
mod proto;
mod state;
mod trace;

pub use crate::connection::{Connection, DEFAULT_MAX_BUFFER_SIZE};
pub use crate::error::{Error, Result};
pub use crate::event::{Event, HttpVersion, PauseReason, Role, State};
