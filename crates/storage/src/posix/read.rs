//! Posix read driver.

use std::fs::File;
use std::io::Read;

use types::{Buffer, Error, ErrorKind, Result};
use vault_io::ReadDriver;

use crate::storage::ReadParams;

pub(crate) struct PosixRead {
    params: ReadParams,
    file: Option<File>,
}

impl PosixRead {
    pub(crate) fn new(params: ReadParams) -> Self {
        Self { params, file: None }
    }
}

impl ReadDriver for PosixRead {
    fn open(&mut self) -> Result<bool> {
        match File::open(&self.params.path) {
            Ok(file) => {
                self.file = Some(file);
                Ok(true)
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                if self.params.ignore_missing {
                    Ok(false)
                } else {
                    Err(Error::new(
                        ErrorKind::FileMissing,
                        format!("unable to open '{}': No such file or directory", self.params.path),
                    ))
                }
            }
            Err(error) => Err(Error::new(
                ErrorKind::FileOpen,
                format!("unable to open '{}': {error}", self.params.path),
            )),
        }
    }

    fn read(&mut self, out: &mut Buffer) -> Result<usize> {
        let Some(file) = self.file.as_mut() else {
            return Ok(0);
        };

        let count = file.read(out.tail_mut()).map_err(|error| {
            Error::new(
                ErrorKind::FileRead,
                format!("unable to read '{}': {error}", self.params.path),
            )
        })?;

        out.add_used(count);
        Ok(count)
    }

    fn close(&mut self) -> Result<()> {
        self.file = None;
        Ok(())
    }
}
