//! Streaming write handle bound to a storage path.

use types::{Buffer, Result, StringId, Variant};
use vault_io::{FilterGroup, IoWrite};

/// A storage file open for streaming writes.
///
/// Dropping the handle without a successful [`Self::close`] discards the
/// partial write: the posix driver deletes its temp file, the S3 driver
/// aborts its multipart upload, the remote driver tells the peer to do the
/// same.
pub struct StorageWrite {
    name: String,
    io: IoWrite,
}

impl StorageWrite {
    pub(crate) fn new(name: String, io: IoWrite) -> Self {
        Self { name, io }
    }

    /// The resolved path this handle writes.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Filter chain, composable until open.
    pub fn filter_group_mut(&mut self) -> &mut FilterGroup {
        self.io.filter_group_mut()
    }

    /// Opens the destination.
    pub fn open(&mut self) -> Result<()> {
        self.io.open()
    }

    /// Writes a buffer through the chain.
    pub fn write(&mut self, input: &Buffer) -> Result<()> {
        self.io.write(input)
    }

    /// Flushes, commits, and publishes filter results.
    pub fn close(&mut self) -> Result<()> {
        self.io.close()
    }

    /// Terminal filter result, available after close.
    #[must_use]
    pub fn result(&self, kind: StringId) -> Option<&Variant> {
        self.io.result(kind)
    }

    /// The underlying stream handle.
    pub fn io_mut(&mut self) -> &mut IoWrite {
        &mut self.io
    }
}
