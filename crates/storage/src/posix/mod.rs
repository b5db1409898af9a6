//! Local filesystem driver.

use std::fs;
use std::os::unix::fs::{DirBuilderExt, MetadataExt};
use std::path::Path;

use types::{Error, ErrorKind, Result};
use vault_io::{IoRead, IoWrite};

use crate::info::{InfoKind, StorageInfo};
use crate::options::StorageOptions;
use crate::storage::{DriverFeatures, ReadParams, Storage, StorageDriver, WriteParams};

mod owner;
mod read;
#[cfg(test)]
mod tests;
mod write;

use read::PosixRead;
use write::PosixWrite;

/// Creates a [`Storage`] over the local filesystem rooted at `root`.
pub fn storage(root: impl Into<String>, options: StorageOptions) -> Result<Storage> {
    Storage::new(Box::new(PosixDriver), root, options)
}

pub(crate) struct PosixDriver;

fn not_found(error: &std::io::Error) -> bool {
    error.kind() == std::io::ErrorKind::NotFound
}

fn info_from_metadata(name: &str, path: &Path, metadata: &fs::Metadata) -> StorageInfo {
    let file_type = metadata.file_type();

    let (kind, link_target) = if file_type.is_symlink() {
        let target = fs::read_link(path)
            .ok()
            .map(|target| target.to_string_lossy().into_owned());
        (InfoKind::Link, target)
    } else if file_type.is_dir() {
        (InfoKind::Path, None)
    } else if file_type.is_file() {
        (InfoKind::File, None)
    } else {
        (InfoKind::Special, None)
    };

    StorageInfo {
        name: name.to_string(),
        kind,
        size: if kind == InfoKind::File { metadata.len() } else { 0 },
        mtime: metadata.mtime(),
        mode: metadata.mode() & 0o7777,
        user: owner::user_name(metadata.uid()),
        group: owner::group_name(metadata.gid()),
        link_target,
    }
}

impl StorageDriver for PosixDriver {
    fn kind(&self) -> &'static str {
        "posix"
    }

    fn features(&self) -> DriverFeatures {
        DriverFeatures {
            paths: true,
            path_sync: true,
            move_native: true,
            links: true,
        }
    }

    fn exists(&self, path: &str) -> Result<bool> {
        match fs::symlink_metadata(path) {
            Ok(_) => Ok(true),
            Err(error) if not_found(&error) => Ok(false),
            Err(error) => Err(Error::new(
                ErrorKind::FileOpen,
                format!("unable to stat '{path}': {error}"),
            )),
        }
    }

    fn info(&self, path: &str, ignore_missing: bool) -> Result<Option<StorageInfo>> {
        match fs::symlink_metadata(path) {
            Ok(metadata) => Ok(Some(info_from_metadata(path, Path::new(path), &metadata))),
            Err(error) if not_found(&error) => {
                if ignore_missing {
                    Ok(None)
                } else {
                    Err(Error::new(
                        ErrorKind::FileMissing,
                        format!("unable to get info for missing file '{path}'"),
                    ))
                }
            }
            Err(error) => Err(Error::new(
                ErrorKind::FileOpen,
                format!("unable to get info for '{path}': {error}"),
            )),
        }
    }

    fn info_list(
        &self,
        path: &str,
        error_on_missing: bool,
        callback: &mut dyn FnMut(StorageInfo) -> Result<()>,
    ) -> Result<bool> {
        let entries = match fs::read_dir(path) {
            Ok(entries) => entries,
            Err(error) if not_found(&error) => {
                if error_on_missing {
                    return Err(Error::new(
                        ErrorKind::PathMissing,
                        format!("unable to list missing path '{path}'"),
                    ));
                }

                return Ok(false);
            }
            Err(error) => {
                return Err(Error::new(
                    ErrorKind::PathOpen,
                    format!("unable to open path '{path}' for read: {error}"),
                ))
            }
        };

        let mut listed = Vec::new();

        for entry in entries {
            let entry = entry.map_err(|error| {
                Error::new(
                    ErrorKind::PathOpen,
                    format!("unable to read entry in '{path}': {error}"),
                )
            })?;

            listed.push(entry);
        }

        listed.sort_by_key(std::fs::DirEntry::file_name);

        for entry in listed {
            let name = entry.file_name().to_string_lossy().into_owned();
            let entry_path = entry.path();

            // Links are reported, not followed
            let metadata = fs::symlink_metadata(&entry_path).map_err(|error| {
                Error::new(
                    ErrorKind::FileOpen,
                    format!("unable to stat '{}': {error}", entry_path.display()),
                )
            })?;

            callback(info_from_metadata(&name, &entry_path, &metadata))?;
        }

        Ok(true)
    }

    fn move_file(&self, source: &str, destination: &str) -> Result<bool> {
        match fs::rename(source, destination) {
            Ok(()) => Ok(true),
            // Cross-device moves fall back to copy in the facade
            Err(error) if error.raw_os_error() == Some(libc::EXDEV) => Ok(false),
            Err(error) if not_found(&error) => Err(Error::new(
                ErrorKind::FileMissing,
                format!("unable to move '{source}' to '{destination}': {error}"),
            )),
            Err(error) => Err(Error::new(
                ErrorKind::FileWrite,
                format!("unable to move '{source}' to '{destination}': {error}"),
            )),
        }
    }

    fn new_read(&self, params: ReadParams) -> Result<IoRead> {
        let buffer_size = params.buffer_size;
        Ok(IoRead::with_buffer_size(Box::new(PosixRead::new(params)), buffer_size))
    }

    fn new_write(&self, params: WriteParams) -> Result<IoWrite> {
        let buffer_size = params.buffer_size;
        Ok(IoWrite::with_buffer_size(Box::new(PosixWrite::new(params)), buffer_size))
    }

    fn path_create(
        &self,
        path: &str,
        error_on_exists: bool,
        no_parent_create: bool,
        mode: u32,
    ) -> Result<()> {
        let mut builder = fs::DirBuilder::new();
        builder.mode(mode);

        if !no_parent_create {
            builder.recursive(true);

            // Recursive create swallows already-exists; check first when the
            // caller wants the error
            if error_on_exists && Path::new(path).exists() {
                return Err(Error::new(
                    ErrorKind::PathCreate,
                    format!("unable to create path '{path}': path already exists"),
                ));
            }
        }

        match builder.create(path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => {
                if error_on_exists {
                    Err(Error::new(
                        ErrorKind::PathCreate,
                        format!("unable to create path '{path}': path already exists"),
                    ))
                } else {
                    Ok(())
                }
            }
            Err(error) if not_found(&error) => Err(Error::new(
                ErrorKind::PathCreate,
                format!("unable to create path '{path}': parent path is missing"),
            )),
            Err(error) => Err(Error::new(
                ErrorKind::PathCreate,
                format!("unable to create path '{path}': {error}"),
            )),
        }
    }

    fn path_remove(&self, path: &str, error_on_missing: bool, recurse: bool) -> Result<()> {
        let removed = if recurse {
            fs::remove_dir_all(path)
        } else {
            fs::remove_dir(path)
        };

        match removed {
            Ok(()) => Ok(()),
            Err(error) if not_found(&error) => {
                if error_on_missing {
                    Err(Error::new(
                        ErrorKind::PathMissing,
                        format!("unable to remove missing path '{path}'"),
                    ))
                } else {
                    Ok(())
                }
            }
            Err(error) => Err(Error::new(
                ErrorKind::PathRemove,
                format!("unable to remove path '{path}': {error}"),
            )),
        }
    }

    fn path_sync(&self, path: &str) -> Result<()> {
        let directory = fs::File::open(path).map_err(|error| {
            if not_found(&error) {
                Error::new(ErrorKind::PathMissing, format!("unable to open missing path '{path}' for sync"))
            } else {
                Error::new(ErrorKind::PathOpen, format!("unable to open path '{path}' for sync: {error}"))
            }
        })?;

        directory.sync_all().map_err(|error| {
            Error::new(ErrorKind::PathOpen, format!("unable to sync path '{path}': {error}"))
        })
    }

    fn remove(&self, path: &str, error_on_missing: bool) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(error) if not_found(&error) => {
                if error_on_missing {
                    Err(Error::new(
                        ErrorKind::FileMissing,
                        format!("unable to remove missing file '{path}'"),
                    ))
                } else {
                    Ok(())
                }
            }
            Err(error) => Err(Error::new(
                ErrorKind::FileRemove,
                format!("unable to remove '{path}': {error}"),
            )),
        }
    }
}

/// Creates missing parent directories with `mode`.
pub(crate) fn create_parents(path: &Path, mode: u32) -> Result<()> {
    let Some(parent) = path.parent() else {
        return Err(Error::new(
            ErrorKind::PathCreate,
            format!("path '{}' has no parent", path.display()),
        ));
    };

    let mut builder = fs::DirBuilder::new();
    builder.recursive(true).mode(mode);

    builder.create(parent).map_err(|error| {
        Error::new(
            ErrorKind::PathCreate,
            format!("unable to create path '{}': {error}", parent.display()),
        )
    })
}
