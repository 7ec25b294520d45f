//! Client-server communication protocol.
//!
//! This module defines how docwire clients and servers exchange queries: the
//! wire framing, the per-connection state machine, and the single-threaded
//! event loops that drive many connections over one readiness poller.
//!
//! # Overview
//!
//! Every message is one self-describing frame. A client opens a connection,
//! sends exactly one request and reads exactly one response; the server
//! answers each request from its [`DocumentStore`](crate::storage::DocumentStore)
//! and closes the connection once the response is flushed.
//!
//! Both sides run the same [`Connection`] type over non-blocking sockets. What
//! differs is its [`Role`]: the client's requester speaks first and keeps the
//! reply, the server's responder waits for a request and queues the answer.
//! A failure on one connection closes that connection only; the loop keeps
//! serving the others.
//!
//! # Key Components
//!
//! - [`FrameReader`]: Incremental decoder for inbound frames.
//! - [`Connection`]: Buffers and phase of one socket, specialised by a [`Role`].
//! - [`Multiplexer`]: Readiness poller owning every registered connection.
//! - [`Client`]: One-shot request sender.
//! - [`StorageServer`]: Accept loop dispatching requests to the store.
//! - [`Shutdown`]: Interrupt handle that wakes a blocked loop.
//!
//! # Binary Format
//!
//! ```text
//! +------------------+---------------------+-----------------------+
//! | header length    | header              | payload               |
//! | u16, big-endian  | UTF-8 JSON object   | content-length bytes  |
//! +------------------+---------------------+-----------------------+
//! ```
//!
//! The header carries `byteorder`, `content-type`, `content-encoding` and
//! `content-length`. A `text/json` payload is JSON text in the named encoding;
//! anything else travels as opaque bytes.
//!
//! # See Also
//!
//! - [`query`](crate::query): What the server does with a decoded request.
//! - [`storage`](crate::storage): Data layer that ultimately executes queries.
mod client;
mod codec;
mod connection;
mod multiplexer;
mod request;
mod response;
mod server;
mod shutdown;

pub use client::{Client, ClientError, Requester, send};
pub use codec::{
    FrameError, FrameReader, Header, JSON_CONTENT_TYPE, MAX_CONTENT_LENGTH, Payload,
    decode_header, decode_header_length, decode_payload, encode_frame, encode_json,
};
pub use connection::{Connection, ConnectionError, Phase, Role, Step};
pub use multiplexer::{Interest, Multiplexer, Pollable, Readiness};
pub use request::{Request, RequestContent};
pub use response::{QueryResult, Response};
pub use server::{Responder, ServerError, StorageServer};
pub use shutdown::Shutdown;
