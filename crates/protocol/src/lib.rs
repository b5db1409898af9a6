#![deny(unsafe_code)]

//! # Overview
//!
//! The wire protocol between storage peers: newline-delimited JSON records
//! over a paired read/write handle (a child process's stdio or a socket
//! pair). Requests are `{"cmd": "<op>", "param": [...]}`, responses are
//! `{"out": ...}` or `{"err": {"code", "message", "stack"}}`. Streaming
//! bodies interleave length-prefixed binary blocks - `{"size": N}` followed
//! by `N` raw bytes - with `{"size": 0}` terminating a stream and a negative
//! size aborting it.
//!
//! Requests and responses are strictly serialized on the pair; there is no
//! pipelining. An unexpected EOF from the peer surfaces as `ProtocolError`
//! naming the command that was in flight. Peer errors reproduce the remote
//! kind, message, and stack.

pub mod client;
pub mod frame;
pub mod server;

pub use client::ProtocolClient;
pub use frame::{read_error, write_error, FrameReader};
pub use server::{CommandHandler, PeerIo, ProtocolServer};
