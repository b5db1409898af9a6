//! S3 write driver: single `PUT` or multipart upload.

use std::rc::Rc;

use transport::{HttpHeader, HttpQuery};
use types::{Buffer, Error, Result, XmlDocument};
use vault_io::WriteDriver;

use crate::storage::WriteParams;

use super::{xml_escape, S3Shared};

/// Buffers incoming data to the configured part size. Everything that fits
/// in one part ships as a single `PUT` with `content-md5`; larger streams
/// become a multipart upload whose parts ship as the buffer fills, with the
/// completion posted on close and the upload aborted on drop when close
/// never ran.
pub(crate) struct S3Write {
    shared: Rc<S3Shared>,
    params: WriteParams,
    buffer: Vec<u8>,
    upload_id: Option<String>,
    etags: Vec<String>,
    closed: bool,
}

impl S3Write {
    pub(crate) fn new(shared: Rc<S3Shared>, params: WriteParams) -> Self {
        Self {
            shared,
            params,
            buffer: Vec::new(),
            upload_id: None,
            etags: Vec::new(),
            closed: false,
        }
    }

    fn part_size(&self) -> usize {
        self.shared.config.part_size
    }

    fn uri(&self) -> String {
        self.shared.uri(&self.params.path)
    }

    /// Starts the multipart upload and captures its id.
    fn initiate(&mut self) -> Result<()> {
        let mut query = HttpQuery::new();
        query.put("uploads", "");

        let mut response =
            self.shared
                .request_success("POST", &self.uri(), query, HttpHeader::new(), None)?;

        let document = XmlDocument::from_bytes(&response.read_body()?)?;
        let upload_id = document
            .root()
            .child("UploadId", true)?
            .map(|node| node.text().to_string())
            .unwrap_or_default();

        if upload_id.is_empty() {
            return Err(Error::format("multipart initiate returned no UploadId"));
        }

        tracing::debug!(path = %self.params.path, upload_id = %upload_id, "multipart initiated");
        self.upload_id = Some(upload_id);
        Ok(())
    }

    /// Uploads one part and records its etag.
    fn upload_part(&mut self, part: Vec<u8>) -> Result<()> {
        if self.upload_id.is_none() {
            self.initiate()?;
        }

        let upload_id = self.upload_id.clone().unwrap_or_default();

        let mut query = HttpQuery::new();
        query.put("partNumber", (self.etags.len() + 1).to_string());
        query.put("uploadId", upload_id);

        let mut response =
            self.shared
                .request_success("PUT", &self.uri(), query, HttpHeader::new(), Some(part))?;

        let etag = response.headers().get("etag").unwrap_or_default().to_string();
        response.read_body()?;

        if etag.is_empty() {
            return Err(Error::format("part upload returned no etag"));
        }

        self.etags.push(etag);
        Ok(())
    }

    /// Posts the completion document listing parts in upload order.
    fn complete(&mut self, upload_id: &str) -> Result<()> {
        let mut body = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<CompleteMultipartUpload>",
        );

        for (index, etag) in self.etags.iter().enumerate() {
            body.push_str(&format!(
                "<Part><PartNumber>{}</PartNumber><ETag>{}</ETag></Part>",
                index + 1,
                xml_escape(etag)
            ));
        }

        body.push_str("</CompleteMultipartUpload>");

        let mut query = HttpQuery::new();
        query.put("uploadId", upload_id);

        let mut response = self.shared.request_success(
            "POST",
            &self.uri(),
            query,
            HttpHeader::new(),
            Some(body.into_bytes()),
        )?;

        response.read_body()?;
        tracing::debug!(path = %self.params.path, parts = self.etags.len(), "multipart complete");
        Ok(())
    }
}

impl WriteDriver for S3Write {
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn write(&mut self, input: &Buffer) -> Result<()> {
        self.buffer.extend_from_slice(input.bytes());

        while self.buffer.len() >= self.part_size() {
            let rest = self.buffer.split_off(self.part_size());
            let part = std::mem::replace(&mut self.buffer, rest);
            self.upload_part(part)?;
        }

        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        match self.upload_id.clone() {
            // Small enough for a single PUT
            None => {
                let body = std::mem::take(&mut self.buffer);
                let mut response = self.shared.request_success(
                    "PUT",
                    &self.uri(),
                    HttpQuery::new(),
                    HttpHeader::new(),
                    Some(body),
                )?;
                response.read_body()?;
            }
            Some(upload_id) => {
                if !self.buffer.is_empty() {
                    let part = std::mem::take(&mut self.buffer);
                    self.upload_part(part)?;
                }

                self.complete(&upload_id)?;
            }
        }

        self.closed = true;
        Ok(())
    }
}

impl Drop for S3Write {
    fn drop(&mut self) {
        // Abort an in-flight multipart upload so partial parts do not
        // accumulate billing on the bucket
        if self.closed {
            return;
        }

        if let Some(upload_id) = self.upload_id.clone() {
            let mut query = HttpQuery::new();
            query.put("uploadId", upload_id.clone());

            let result = self.shared.request_checked(
                "DELETE",
                &self.uri(),
                query,
                HttpHeader::new(),
                None,
                true,
            );

            match result {
                Ok(Some(mut response)) => {
                    let _ = response.read_body();
                }
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(path = %self.params.path, upload_id = %upload_id, %error, "multipart abort failed");
                }
            }
        }
    }
}
