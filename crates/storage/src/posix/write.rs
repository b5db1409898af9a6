//! Posix write driver with atomic temp-and-rename staging.

use std::fs::{self, File, OpenOptions, Permissions};
use std::io::Write;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use types::{Buffer, Error, ErrorKind, Result};
use vault_io::WriteDriver;

use crate::storage::WriteParams;

enum State {
    Idle,
    // Staged in a sibling temp file; dropping the handle before close
    // deletes it
    Staged(NamedTempFile),
    Direct(File),
    Closed,
}

pub(crate) struct PosixWrite {
    params: WriteParams,
    state: State,
}

impl PosixWrite {
    pub(crate) fn new(params: WriteParams) -> Self {
        Self {
            params,
            state: State::Idle,
        }
    }

    fn parent(&self) -> Result<PathBuf> {
        Path::new(&self.params.path)
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::FileOpen,
                    format!("file '{}' has no parent path", self.params.path),
                )
            })
    }

    fn open_staged(&self) -> Result<NamedTempFile> {
        let path = Path::new(&self.params.path);
        let parent = self.parent()?;

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::FileOpen,
                    format!("file '{}' has no name", self.params.path),
                )
            })?;

        let build = || {
            tempfile::Builder::new()
                .prefix(&format!("{file_name}.tmp"))
                .rand_bytes(6)
                .tempfile_in(&parent)
        };

        let staged = match build() {
            Ok(staged) => staged,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound && self.params.create_path => {
                super::create_parents(path, self.params.mode_path)?;
                build().map_err(|error| self.open_error(&error))?
            }
            Err(error) => return Err(self.open_error(&error)),
        };

        fs::set_permissions(staged.path(), Permissions::from_mode(self.params.mode_file))
            .map_err(|error| {
                Error::new(
                    ErrorKind::FileOpen,
                    format!("unable to set mode on '{}': {error}", staged.path().display()),
                )
            })?;

        Ok(staged)
    }

    fn open_direct(&self) -> Result<File> {
        let open = || {
            OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(self.params.mode_file)
                .open(&self.params.path)
        };

        match open() {
            Ok(file) => Ok(file),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound && self.params.create_path => {
                super::create_parents(Path::new(&self.params.path), self.params.mode_path)?;
                open().map_err(|error| self.open_error(&error))
            }
            Err(error) => Err(self.open_error(&error)),
        }
    }

    fn open_error(&self, error: &std::io::Error) -> Error {
        Error::new(
            ErrorKind::FileOpen,
            format!("unable to open '{}' for write: {error}", self.params.path),
        )
    }

    fn write_error(&self, error: &std::io::Error) -> Error {
        Error::new(
            ErrorKind::FileWrite,
            format!("unable to write '{}': {error}", self.params.path),
        )
    }
}

impl WriteDriver for PosixWrite {
    fn open(&mut self) -> Result<()> {
        self.state = if self.params.atomic {
            State::Staged(self.open_staged()?)
        } else {
            State::Direct(self.open_direct()?)
        };

        tracing::trace!(path = %self.params.path, atomic = self.params.atomic, "posix write open");
        Ok(())
    }

    fn write(&mut self, input: &Buffer) -> Result<()> {
        let result = match &mut self.state {
            State::Staged(staged) => staged.as_file_mut().write_all(input.bytes()),
            State::Direct(file) => file.write_all(input.bytes()),
            State::Idle | State::Closed => {
                return Err(Error::assert("posix write driver is not open"))
            }
        };

        result.map_err(|error| self.write_error(&error))
    }

    fn close(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, State::Closed) {
            State::Staged(staged) => {
                if self.params.sync_file {
                    staged.as_file().sync_all().map_err(|error| self.write_error(&error))?;
                }

                staged.persist(&self.params.path).map_err(|error| {
                    Error::new(
                        ErrorKind::FileWrite,
                        format!("unable to move temp file to '{}': {}", self.params.path, error.error),
                    )
                })?;

                if self.params.sync_path {
                    let parent = self.parent()?;
                    let directory = File::open(&parent).map_err(|error| {
                        Error::new(
                            ErrorKind::PathOpen,
                            format!("unable to open path '{}' for sync: {error}", parent.display()),
                        )
                    })?;

                    directory.sync_all().map_err(|error| {
                        Error::new(
                            ErrorKind::PathOpen,
                            format!("unable to sync path '{}': {error}", parent.display()),
                        )
                    })?;
                }

                Ok(())
            }
            State::Direct(file) => {
                if self.params.sync_file {
                    file.sync_all().map_err(|error| self.write_error(&error))?;
                }

                Ok(())
            }
            State::Idle | State::Closed => Err(Error::assert("posix write driver is not open")),
        }
    }
}
