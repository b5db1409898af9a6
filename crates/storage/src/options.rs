//! Per-call option sets.

/// Options for [`crate::Storage::new_read`] and [`crate::Storage::get`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ReadOptions {
    /// Treat a missing file as an empty stream instead of an error.
    pub ignore_missing: bool,
}

impl ReadOptions {
    /// Default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppresses the missing-file error.
    #[must_use]
    pub const fn ignore_missing(mut self, ignore_missing: bool) -> Self {
        self.ignore_missing = ignore_missing;
        self
    }
}

/// Options for [`crate::Storage::new_write`] and [`crate::Storage::put`].
#[derive(Clone, Copy, Debug)]
pub struct WriteOptions {
    /// File mode; the storage default when unset.
    pub mode_file: Option<u32>,
    /// Mode for created parent paths; the storage default when unset.
    pub mode_path: Option<u32>,
    /// Create missing parent paths on open.
    pub create_path: bool,
    /// Sync the file before the atomic rename.
    pub sync_file: bool,
    /// Sync the parent path after the rename.
    pub sync_path: bool,
    /// Stage into a temp file and rename into place on close.
    pub atomic: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            mode_file: None,
            mode_path: None,
            create_path: true,
            sync_file: true,
            sync_path: true,
            atomic: true,
        }
    }
}

impl WriteOptions {
    /// Default options: atomic, synced, parents created.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the file mode.
    #[must_use]
    pub const fn mode_file(mut self, mode: u32) -> Self {
        self.mode_file = Some(mode);
        self
    }

    /// Overrides the created-path mode.
    #[must_use]
    pub const fn mode_path(mut self, mode: u32) -> Self {
        self.mode_path = Some(mode);
        self
    }

    /// Controls parent creation.
    #[must_use]
    pub const fn create_path(mut self, create_path: bool) -> Self {
        self.create_path = create_path;
        self
    }

    /// Controls the pre-rename file sync.
    #[must_use]
    pub const fn sync_file(mut self, sync_file: bool) -> Self {
        self.sync_file = sync_file;
        self
    }

    /// Controls the post-rename path sync.
    #[must_use]
    pub const fn sync_path(mut self, sync_path: bool) -> Self {
        self.sync_path = sync_path;
        self
    }

    /// Controls temp-and-rename staging.
    #[must_use]
    pub const fn atomic(mut self, atomic: bool) -> Self {
        self.atomic = atomic;
        self
    }
}

/// Options for [`crate::Storage::list`] and [`crate::Storage::info_list`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ListOptions {
    /// Error when the listed path does not exist; otherwise an empty list.
    pub error_on_missing: bool,
}

impl ListOptions {
    /// Default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Errors on a missing path.
    #[must_use]
    pub const fn error_on_missing(mut self, error_on_missing: bool) -> Self {
        self.error_on_missing = error_on_missing;
        self
    }
}

/// Options for [`crate::Storage::path_create`].
#[derive(Clone, Copy, Debug, Default)]
pub struct PathCreateOptions {
    /// Error when the path already exists.
    pub error_on_exists: bool,
    /// Do not create missing parents.
    pub no_parent_create: bool,
    /// Path mode; the storage default when unset.
    pub mode: Option<u32>,
}

impl PathCreateOptions {
    /// Default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Errors when the path exists.
    #[must_use]
    pub const fn error_on_exists(mut self, error_on_exists: bool) -> Self {
        self.error_on_exists = error_on_exists;
        self
    }

    /// Requires parents to exist already.
    #[must_use]
    pub const fn no_parent_create(mut self, no_parent_create: bool) -> Self {
        self.no_parent_create = no_parent_create;
        self
    }

    /// Overrides the path mode.
    #[must_use]
    pub const fn mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }
}

/// Options for [`crate::Storage::path_remove`].
#[derive(Clone, Copy, Debug, Default)]
pub struct PathRemoveOptions {
    /// Error when the path does not exist.
    pub error_on_missing: bool,
    /// Remove contents recursively.
    pub recurse: bool,
}

impl PathRemoveOptions {
    /// Default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Errors on a missing path.
    #[must_use]
    pub const fn error_on_missing(mut self, error_on_missing: bool) -> Self {
        self.error_on_missing = error_on_missing;
        self
    }

    /// Removes recursively.
    #[must_use]
    pub const fn recurse(mut self, recurse: bool) -> Self {
        self.recurse = recurse;
        self
    }
}

/// Options for [`crate::Storage::remove`].
#[derive(Clone, Copy, Debug, Default)]
pub struct RemoveOptions {
    /// Error when the file does not exist.
    pub error_on_missing: bool,
}

impl RemoveOptions {
    /// Default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Errors on a missing file.
    #[must_use]
    pub const fn error_on_missing(mut self, error_on_missing: bool) -> Self {
        self.error_on_missing = error_on_missing;
        self
    }
}

/// Storage-wide settings supplied at construction.
#[derive(Clone)]
pub struct StorageOptions {
    /// Default file mode.
    pub mode_file: u32,
    /// Default path mode.
    pub mode_path: u32,
    /// Whether write operations are allowed.
    pub write: bool,
    /// Buffer size for streaming handles.
    pub buffer_size: usize,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            mode_file: crate::MODE_FILE_DEFAULT,
            mode_path: crate::MODE_PATH_DEFAULT,
            write: false,
            buffer_size: vault_io::DEFAULT_BUFFER_SIZE,
        }
    }
}

impl StorageOptions {
    /// Default read-only options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allows writes.
    #[must_use]
    pub const fn write(mut self, write: bool) -> Self {
        self.write = write;
        self
    }

    /// Overrides the streaming buffer size.
    #[must_use]
    pub const fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Overrides the default file mode.
    #[must_use]
    pub const fn mode_file(mut self, mode_file: u32) -> Self {
        self.mode_file = mode_file;
        self
    }

    /// Overrides the default path mode.
    #[must_use]
    pub const fn mode_path(mut self, mode_path: u32) -> Self {
        self.mode_path = mode_path;
        self
    }
}
