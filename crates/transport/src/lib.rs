#![deny(unsafe_code)]

//! # Overview
//!
//! A blocking HTTP/1.1 client sized for object-store traffic. Sessions are
//! plain TCP or TLS, pooled per client and reused across requests while both
//! sides allow keep-alive. Request bodies are fixed `content-length`;
//! response bodies stream incrementally through [`ResponseBody`] in either
//! `content-length` or chunked framing, so a multi-gigabyte GET never
//! materializes in memory.
//!
//! One retry is attempted when a socket error occurs before the first status
//! byte of a response - the usual symptom of a pooled connection the server
//! quietly closed. After any response byte has been seen, errors surface.
//!
//! TLS defaults to platform trust roots with certificate verification on; a
//! CA file or directory can override the roots, and verification can be
//! switched off for test rigs.

pub mod client;
pub mod header;
pub mod query;
pub mod session;

pub use client::{HttpClient, HttpRequest, HttpResponse, ResponseBody};
pub use header::HttpHeader;
pub use query::HttpQuery;
pub use session::{HttpSession, TlsOptions, TransportConfig};
