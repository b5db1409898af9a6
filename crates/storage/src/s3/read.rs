//! S3 read driver: a streamed `GET`.

use std::rc::Rc;

use transport::{HttpHeader, HttpQuery, ResponseBody};
use types::{Buffer, Error, ErrorKind, Result};
use vault_io::ReadDriver;

use crate::storage::ReadParams;

use super::{request_error, S3Shared};

pub(crate) struct S3Read {
    shared: Rc<S3Shared>,
    params: ReadParams,
    body: Option<ResponseBody>,
}

impl S3Read {
    pub(crate) fn new(shared: Rc<S3Shared>, params: ReadParams) -> Self {
        Self {
            shared,
            params,
            body: None,
        }
    }
}

impl ReadDriver for S3Read {
    fn open(&mut self) -> Result<bool> {
        let uri = self.shared.uri(&self.params.path);
        let query = HttpQuery::new();
        let headers = HttpHeader::new();

        let mut response = self
            .shared
            .request("GET", &uri, query.clone(), headers.clone(), None)?;

        if response.code() == 404 {
            response.read_body()?;

            if self.params.ignore_missing {
                return Ok(false);
            }

            return Err(Error::new(
                ErrorKind::FileMissing,
                format!("unable to open '{}': No such file or directory", self.params.path),
            ));
        }

        if !response.success() {
            return Err(request_error("GET", &uri, &query, &headers, &mut response));
        }

        self.body = Some(response.into_body());
        Ok(true)
    }

    fn read(&mut self, out: &mut Buffer) -> Result<usize> {
        match self.body.as_mut() {
            Some(body) => body.read(out),
            None => Ok(0),
        }
    }

    fn close(&mut self) -> Result<()> {
        // Dropping an undrained body closes the connection rather than
        // returning it to the pool
        self.body = None;
        Ok(())
    }
}
