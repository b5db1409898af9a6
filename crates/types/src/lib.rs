#![deny(unsafe_code)]

//! # Overview
//!
//! `types` provides the value types every other pgvault crate builds on: the
//! byte [`Buffer`] that moves data between stream filters, the [`Variant`]
//! sum type carried by filter results and the RPC wire, packed short-string
//! identifiers ([`StringId`]), a small XML element tree for object-store
//! responses, and the workspace-wide [`Error`]/[`ErrorKind`] taxonomy.
//!
//! The crate deliberately has no I/O of its own so it can sit at the bottom
//! of the dependency graph.

pub mod buffer;
pub mod error;
pub mod string_id;
pub mod variant;
pub mod xml;

pub use buffer::Buffer;
pub use error::{Error, ErrorKind, Result};
pub use string_id::{StringId, StringIdBits};
pub use variant::Variant;
pub use xml::{XmlDocument, XmlNode};
