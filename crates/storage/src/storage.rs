//! Storage facade and driver contract.

use types::{Buffer, Error, Result};
use vault_io::{IoRead, IoWrite};

use crate::info::StorageInfo;
use crate::options::{
    ListOptions, PathCreateOptions, PathRemoveOptions, ReadOptions, RemoveOptions, StorageOptions,
    WriteOptions,
};
use crate::read::StorageRead;
use crate::write::StorageWrite;

/// Driver capability flags.
///
/// The facade consults these to decide what to emulate: a driver without
/// native move gets copy-and-remove, a driver without real paths makes
/// `path_sync` a no-op.
#[derive(Clone, Copy, Debug)]
pub struct DriverFeatures {
    /// Paths exist as real entries (directories).
    pub paths: bool,
    /// `path_sync` does something.
    pub path_sync: bool,
    /// `move_file` works natively within the storage.
    pub move_native: bool,
    /// Symbolic links can appear in listings.
    pub links: bool,
}

/// Resolved parameters for a driver read.
#[derive(Clone, Debug)]
pub struct ReadParams {
    /// Fully resolved path.
    pub path: String,
    /// Missing file becomes an empty stream.
    pub ignore_missing: bool,
    /// Streaming buffer size.
    pub buffer_size: usize,
}

/// Resolved parameters for a driver write.
#[derive(Clone, Debug)]
pub struct WriteParams {
    /// Fully resolved path.
    pub path: String,
    /// File mode.
    pub mode_file: u32,
    /// Mode for created parent paths.
    pub mode_path: u32,
    /// Create missing parents on open.
    pub create_path: bool,
    /// Sync the file before rename.
    pub sync_file: bool,
    /// Sync the parent path after rename.
    pub sync_path: bool,
    /// Stage into a temp file and rename on close.
    pub atomic: bool,
    /// Streaming buffer size.
    pub buffer_size: usize,
}

/// Operations every storage driver provides.
///
/// Paths arriving here are already resolved by the facade. Drivers requiring
/// mutable state (connection pools, signing caches, the RPC pair) keep it
/// behind interior mutability so handles can share it.
pub trait StorageDriver {
    /// Driver name for diagnostics.
    fn kind(&self) -> &'static str;

    /// Capability flags.
    fn features(&self) -> DriverFeatures;

    /// True when an entry exists at `path`.
    fn exists(&self, path: &str) -> Result<bool>;

    /// Metadata for `path`; `None` when missing and `ignore_missing`.
    fn info(&self, path: &str, ignore_missing: bool) -> Result<Option<StorageInfo>>;

    /// Calls `callback` for each entry of `path`. Returns whether the path
    /// existed.
    fn info_list(
        &self,
        path: &str,
        error_on_missing: bool,
        callback: &mut dyn FnMut(StorageInfo) -> Result<()>,
    ) -> Result<bool>;

    /// Moves a file natively. `Ok(false)` means the driver cannot and the
    /// facade should fall back to copy-and-remove.
    fn move_file(&self, source: &str, destination: &str) -> Result<bool>;

    /// Opens a streaming read.
    fn new_read(&self, params: ReadParams) -> Result<IoRead>;

    /// Opens a streaming write.
    fn new_write(&self, params: WriteParams) -> Result<IoWrite>;

    /// Creates a path.
    fn path_create(
        &self,
        path: &str,
        error_on_exists: bool,
        no_parent_create: bool,
        mode: u32,
    ) -> Result<()>;

    /// Removes a path, optionally recursively.
    fn path_remove(&self, path: &str, error_on_missing: bool, recurse: bool) -> Result<()>;

    /// Syncs a path to stable store.
    fn path_sync(&self, path: &str) -> Result<()>;

    /// Removes a file.
    fn remove(&self, path: &str, error_on_missing: bool) -> Result<()>;
}

/// Rewrites `<expression>` tokens in supplied paths.
///
/// Receives the expression name and the remainder of the path; returns the
/// storage-relative replacement.
pub type PathExpressionFn = Box<dyn Fn(&str, &str) -> Result<String>>;

/// Uniform file and path API over a pluggable driver.
pub struct Storage {
    driver: Box<dyn StorageDriver>,
    root: String,
    options: StorageOptions,
    path_expression: Option<PathExpressionFn>,
}

impl Storage {
    /// Creates a storage rooted at `root`, which must be absolute.
    pub fn new(
        driver: Box<dyn StorageDriver>,
        root: impl Into<String>,
        options: StorageOptions,
    ) -> Result<Self> {
        let mut root = root.into();

        if !root.starts_with('/') {
            return Err(Error::assert(format!("storage root '{root}' must be absolute")));
        }

        while root.len() > 1 && root.ends_with('/') {
            root.pop();
        }

        Ok(Self {
            driver,
            root,
            options,
            path_expression: None,
        })
    }

    /// Installs the `<expression>` rewrite hook.
    #[must_use]
    pub fn with_path_expression(mut self, expression: PathExpressionFn) -> Self {
        self.path_expression = Some(expression);
        self
    }

    /// The storage root.
    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    /// The driver name.
    #[must_use]
    pub fn driver_kind(&self) -> &'static str {
        self.driver.kind()
    }

    /// Driver capability flags.
    #[must_use]
    pub fn features(&self) -> DriverFeatures {
        self.driver.features()
    }

    /// Resolves a caller path against the root.
    ///
    /// Relative paths are joined to the root; absolute paths must already be
    /// inside it; `<expr>` prefixes go through the expression callback. A
    /// path that would escape the root is a programming error.
    pub fn resolve(&self, path: &str) -> Result<String> {
        let expanded = if let Some(rest) = path.strip_prefix('<') {
            let Some(end) = rest.find('>') else {
                return Err(Error::assert(format!("invalid path expression '{path}'")));
            };

            let Some(callback) = &self.path_expression else {
                return Err(Error::assert(format!(
                    "path expression '{path}' used with no expression callback"
                )));
            };

            let remainder = rest[end + 1..].trim_start_matches('/');
            callback(&rest[..end], remainder)?
        } else {
            path.to_string()
        };

        if expanded.split('/').any(|component| component == "..") {
            return Err(Error::assert(format!("path '{path}' contains '..'")));
        }

        if expanded.starts_with('/') {
            let inside = expanded == self.root
                || self.root == "/"
                || expanded
                    .strip_prefix(self.root.as_str())
                    .is_some_and(|rest| rest.starts_with('/'));

            if !inside {
                return Err(Error::assert(format!(
                    "absolute path '{expanded}' is not in base path '{}'",
                    self.root
                )));
            }

            Ok(expanded)
        } else if expanded.is_empty() {
            Ok(self.root.clone())
        } else if self.root == "/" {
            Ok(format!("/{expanded}"))
        } else {
            Ok(format!("{}/{expanded}", self.root))
        }
    }

    fn check_write(&self) -> Result<()> {
        if !self.options.write {
            return Err(Error::assert("storage is not writable"));
        }

        Ok(())
    }

    /// True when an entry exists at `path`.
    pub fn exists(&self, path: &str) -> Result<bool> {
        self.driver.exists(&self.resolve(path)?)
    }

    /// Metadata for `path`; `None` when missing and `ignore_missing` was
    /// requested.
    pub fn info(&self, path: &str, options: ReadOptions) -> Result<Option<StorageInfo>> {
        self.driver.info(&self.resolve(path)?, options.ignore_missing)
    }

    /// Streams entry metadata for `path` to `callback`; returns whether the
    /// path existed.
    pub fn info_list(
        &self,
        path: &str,
        options: ListOptions,
        callback: &mut dyn FnMut(StorageInfo) -> Result<()>,
    ) -> Result<bool> {
        self.driver
            .info_list(&self.resolve(path)?, options.error_on_missing, callback)
    }

    /// Entry names under `path`, sorted.
    pub fn list(&self, path: &str, options: ListOptions) -> Result<Vec<String>> {
        let mut names = Vec::new();

        self.info_list(path, options, &mut |info| {
            names.push(info.name);
            Ok(())
        })?;

        names.sort();
        Ok(names)
    }

    /// Opens a streaming read handle.
    pub fn new_read(&self, path: &str, options: ReadOptions) -> Result<StorageRead> {
        let path = self.resolve(path)?;
        let io = self.driver.new_read(ReadParams {
            path: path.clone(),
            ignore_missing: options.ignore_missing,
            buffer_size: self.options.buffer_size,
        })?;

        Ok(StorageRead::new(path, io))
    }

    /// Opens a streaming write handle.
    pub fn new_write(&self, path: &str, options: WriteOptions) -> Result<StorageWrite> {
        self.check_write()?;

        let path = self.resolve(path)?;
        let io = self.driver.new_write(WriteParams {
            path: path.clone(),
            mode_file: options.mode_file.unwrap_or(self.options.mode_file),
            mode_path: options.mode_path.unwrap_or(self.options.mode_path),
            create_path: options.create_path,
            sync_file: options.sync_file,
            sync_path: options.sync_path,
            atomic: options.atomic,
            buffer_size: self.options.buffer_size,
        })?;

        Ok(StorageWrite::new(path, io))
    }

    /// Reads a whole file; `None` when missing and `ignore_missing`.
    pub fn get(&self, path: &str, options: ReadOptions) -> Result<Option<Vec<u8>>> {
        let mut read = self.new_read(path, options)?;

        if !read.open()? {
            return Ok(None);
        }

        let mut content = Vec::new();
        let mut chunk = Buffer::new(self.options.buffer_size);

        while !read.eof() {
            chunk.clear_used();
            read.read(&mut chunk)?;
            content.extend_from_slice(chunk.bytes());
        }

        read.close()?;
        Ok(Some(content))
    }

    /// Writes a whole file.
    pub fn put(&self, path: &str, content: &[u8], options: WriteOptions) -> Result<()> {
        let mut write = self.new_write(path, options)?;

        write.open()?;
        write.write(&Buffer::from_slice(content))?;
        write.close()
    }

    /// Pumps an open-ready read handle into a write handle; returns bytes
    /// copied (as seen by the destination), or `None` when the source was
    /// missing.
    pub fn copy(source: &mut StorageRead, destination: &mut StorageWrite) -> Result<Option<u64>> {
        if !source.open()? {
            return Ok(None);
        }

        destination.open()?;

        let mut copied = 0u64;
        let mut chunk = Buffer::new(vault_io::DEFAULT_BUFFER_SIZE);

        while !source.eof() {
            chunk.clear_used();
            source.read(&mut chunk)?;
            copied += chunk.used() as u64;
            destination.write(&chunk)?;
        }

        source.close()?;
        destination.close()?;

        Ok(Some(copied))
    }

    /// Moves a file, copying across when the driver cannot move natively.
    pub fn move_file(&self, source: &str, destination: &str) -> Result<()> {
        self.check_write()?;

        let source_path = self.resolve(source)?;
        let destination_path = self.resolve(destination)?;

        if self
            .driver
            .move_file(&source_path, &destination_path)?
        {
            return Ok(());
        }

        tracing::debug!(source = %source_path, destination = %destination_path, "move falls back to copy");

        let mut read = self.new_read(source, ReadOptions::new())?;
        let mut write = self.new_write(destination, WriteOptions::new())?;

        if Self::copy(&mut read, &mut write)?.is_none() {
            return Err(Error::new(
                types::ErrorKind::FileMissing,
                format!("unable to move missing file '{source_path}'"),
            ));
        }

        self.driver.remove(&source_path, false)
    }

    /// Creates a path.
    pub fn path_create(&self, path: &str, options: PathCreateOptions) -> Result<()> {
        self.check_write()?;

        self.driver.path_create(
            &self.resolve(path)?,
            options.error_on_exists,
            options.no_parent_create,
            options.mode.unwrap_or(self.options.mode_path),
        )
    }

    /// Removes a path.
    pub fn path_remove(&self, path: &str, options: PathRemoveOptions) -> Result<()> {
        self.check_write()?;

        self.driver
            .path_remove(&self.resolve(path)?, options.error_on_missing, options.recurse)
    }

    /// Syncs a path; a no-op on drivers without real paths.
    pub fn path_sync(&self, path: &str) -> Result<()> {
        if !self.features().path_sync {
            return Ok(());
        }

        self.driver.path_sync(&self.resolve(path)?)
    }

    /// Removes a file.
    pub fn remove(&self, path: &str, options: RemoveOptions) -> Result<()> {
        self.check_write()?;

        self.driver.remove(&self.resolve(path)?, options.error_on_missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posix;

    fn storage_at(root: &str) -> Storage {
        posix::storage(root, StorageOptions::new()).expect("storage")
    }

    #[test]
    fn relative_paths_join_the_root() {
        let storage = storage_at("/repo");

        assert_eq!(storage.resolve("a/b.txt").expect("resolve"), "/repo/a/b.txt");
        assert_eq!(storage.resolve("").expect("resolve"), "/repo");
        assert_eq!(storage.resolve("/repo/x").expect("resolve"), "/repo/x");
        assert_eq!(storage.resolve("/repo").expect("resolve"), "/repo");
    }

    #[test]
    fn escaping_the_root_is_an_error() {
        let storage = storage_at("/repo");

        let error = storage.resolve("/elsewhere/x").expect_err("outside root");
        assert_eq!(error.kind(), types::ErrorKind::Assert);

        let error = storage.resolve("/repository/x").expect_err("prefix collision");
        assert_eq!(error.kind(), types::ErrorKind::Assert);

        let error = storage.resolve("a/../../etc").expect_err("traversal");
        assert_eq!(error.kind(), types::ErrorKind::Assert);
    }

    #[test]
    fn expressions_are_rewritten() {
        let storage = storage_at("/repo").with_path_expression(Box::new(|expression, path| {
            match expression {
                "ARCHIVE" => Ok(if path.is_empty() {
                    "archive".to_string()
                } else {
                    format!("archive/{path}")
                }),
                _ => Err(Error::assert(format!("invalid expression '{expression}'"))),
            }
        }));

        assert_eq!(
            storage.resolve("<ARCHIVE>/9.6-1").expect("resolve"),
            "/repo/archive/9.6-1"
        );
        assert_eq!(storage.resolve("<ARCHIVE>").expect("resolve"), "/repo/archive");

        let error = storage.resolve("<BACKUP>/x").expect_err("unknown expression");
        assert_eq!(error.kind(), types::ErrorKind::Assert);
    }

    #[test]
    fn expression_without_callback_is_an_error() {
        let storage = storage_at("/repo");
        let error = storage.resolve("<ARCHIVE>/x").expect_err("no callback");
        assert_eq!(error.kind(), types::ErrorKind::Assert);
    }

    #[test]
    fn writes_require_the_write_flag() {
        let storage = storage_at("/repo");
        let error = storage.put("f", b"x", WriteOptions::new()).expect_err("read-only");
        assert_eq!(error.kind(), types::ErrorKind::Assert);
    }
}
