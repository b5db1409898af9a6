//! # Overview
//!
//! The uniform storage API the backup engine moves file trees through. A
//! [`Storage`] owns a driver - local filesystem, S3-compatible object store,
//! or a remote peer reached over the RPC pair - and exposes the same
//! operations over each: streaming reads and writes that accept filter
//! chains, metadata queries, listing, removal, and path management.
//!
//! # Design
//!
//! Paths handed to a [`Storage`] are resolved against its root: relative
//! paths are joined, absolute paths must stay inside the root, and `<expr>`
//! tokens are rewritten through the optional path-expression callback.
//! Escaping the root is a programming error.
//!
//! Write atomicity is a driver property: the posix driver stages into a
//! sibling temp file and renames over the target on close, the S3 driver
//! buffers into a single PUT or a multipart upload, and the remote driver
//! forwards the stream to whatever driver the peer mounts. In every case an
//! abandoned write handle discards its partial state on drop.

pub mod info;
pub mod options;
pub mod posix;
pub mod read;
pub mod remote;
pub mod s3;
pub mod storage;
pub mod write;

pub use info::{InfoKind, StorageInfo};
pub use options::{
    ListOptions, PathCreateOptions, PathRemoveOptions, ReadOptions, RemoveOptions, StorageOptions,
    WriteOptions,
};
pub use read::StorageRead;
pub use storage::{DriverFeatures, PathExpressionFn, Storage, StorageDriver};
pub use write::StorageWrite;

/// Default mode for files the storage creates.
pub const MODE_FILE_DEFAULT: u32 = 0o640;

/// Default mode for paths the storage creates.
pub const MODE_PATH_DEFAULT: u32 = 0o750;
