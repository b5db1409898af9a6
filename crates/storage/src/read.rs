//! Streaming read handle bound to a storage path.

use types::{Buffer, Result, StringId, Variant};
use vault_io::{FilterGroup, IoRead};

/// A storage file open for streaming reads.
///
/// Thin wrapper over [`IoRead`] that remembers the resolved path for
/// diagnostics. Filters are composed through [`Self::filter_group_mut`]
/// before [`Self::open`].
pub struct StorageRead {
    name: String,
    io: IoRead,
}

impl StorageRead {
    pub(crate) fn new(name: String, io: IoRead) -> Self {
        Self { name, io }
    }

    /// The resolved path this handle reads.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Filter chain, composable until open.
    pub fn filter_group_mut(&mut self) -> &mut FilterGroup {
        self.io.filter_group_mut()
    }

    /// Opens the file; `false` when missing and the read ignores that.
    pub fn open(&mut self) -> Result<bool> {
        self.io.open()
    }

    /// Reads into `out`; see [`IoRead::read`].
    pub fn read(&mut self, out: &mut Buffer) -> Result<usize> {
        self.io.read(out)
    }

    /// True once the stream is exhausted.
    #[must_use]
    pub fn eof(&self) -> bool {
        self.io.eof()
    }

    /// Closes the file and publishes filter results.
    pub fn close(&mut self) -> Result<()> {
        self.io.close()
    }

    /// Terminal filter result, available after close.
    #[must_use]
    pub fn result(&self, kind: StringId) -> Option<&Variant> {
        self.io.result(kind)
    }

    /// The underlying stream handle.
    pub fn io_mut(&mut self) -> &mut IoRead {
        &mut self.io
    }
}
