//! S3-compatible object store driver.
//!
//! Requests are SigV4-signed HTTP against either a virtual-hosted
//! (`bucket.endpoint`) or path-style (`endpoint/bucket`) URI. Reads map to
//! `GET`, metadata to `HEAD`, writes to a single `PUT` below the part size
//! or a multipart upload above it, listing to paginated `list-type=2`, and
//! recursive path removal to batched `POST /?delete=`.
//!
//! The object store has no real directories: path create and sync are
//! no-ops, and listing materializes paths from common prefixes.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use base64::Engine;
use checksums::DigestAlgorithm;
use time::format_description::well_known::Rfc2822;
use time::OffsetDateTime;
use transport::{HttpClient, HttpHeader, HttpQuery, HttpRequest, HttpResponse, TlsOptions, TransportConfig};
use types::{Error, ErrorKind, Result, XmlDocument};
use vault_io::{IoRead, IoWrite};

use crate::info::StorageInfo;
use crate::options::StorageOptions;
use crate::storage::{DriverFeatures, ReadParams, Storage, StorageDriver, WriteParams};

mod auth;
mod read;
mod write;

use auth::SigningKeyCache;
use read::S3Read;
use write::S3Write;

/// Default multipart threshold and part size: 16 MiB.
pub const PART_SIZE_DEFAULT: usize = 16 * 1024 * 1024;

/// Maximum keys per bulk-delete request.
const DELETE_BATCH_MAX: usize = 1000;

/// How request URIs address the bucket.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UriStyle {
    /// `https://bucket.endpoint/key`
    Host,
    /// `https://endpoint/bucket/key`
    Path,
}

/// Connection and credential configuration for an S3 storage.
#[derive(Clone)]
pub struct S3Config {
    /// Bucket name.
    pub bucket: String,
    /// Endpoint host, e.g. `s3.amazonaws.com`.
    pub endpoint: String,
    /// Signing region.
    pub region: String,
    /// Access key id.
    pub access_key: String,
    /// Secret access key.
    pub secret_key: String,
    /// Session token for temporary credentials.
    pub security_token: Option<String>,
    /// Host override, when the connection target differs from the endpoint.
    pub host: Option<String>,
    /// Port override.
    pub port: Option<u16>,
    /// URI addressing style.
    pub uri_style: UriStyle,
    /// Multipart threshold and part size in bytes.
    pub part_size: usize,
    /// Per-call I/O timeout.
    pub timeout: Duration,
    /// Verify the server certificate.
    pub verify_tls: bool,
    /// CA bundle file override.
    pub ca_file: Option<PathBuf>,
    /// CA directory override.
    pub ca_path: Option<PathBuf>,
    /// Use TLS; plain HTTP exists for test rigs.
    pub tls: bool,
}

impl S3Config {
    /// Creates a configuration with conventional defaults.
    #[must_use]
    pub fn new(
        bucket: impl Into<String>,
        endpoint: impl Into<String>,
        region: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            endpoint: endpoint.into(),
            region: region.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            security_token: None,
            host: None,
            port: None,
            uri_style: UriStyle::Host,
            part_size: PART_SIZE_DEFAULT,
            timeout: Duration::from_secs(60),
            verify_tls: true,
            ca_file: None,
            ca_path: None,
            tls: true,
        }
    }

    /// Host the request is addressed to (and signed for).
    #[must_use]
    pub fn request_host(&self) -> String {
        match &self.host {
            Some(host) => host.clone(),
            None => match self.uri_style {
                UriStyle::Host => format!("{}.{}", self.bucket, self.endpoint),
                UriStyle::Path => self.endpoint.clone(),
            },
        }
    }

    fn connect_port(&self) -> u16 {
        self.port.unwrap_or(if self.tls { 443 } else { 80 })
    }
}

/// Creates a [`Storage`] over an S3-compatible object store.
pub fn storage(
    config: S3Config,
    root: impl Into<String>,
    options: StorageOptions,
) -> Result<Storage> {
    let transport = TransportConfig {
        host: config.request_host(),
        port: config.connect_port(),
        timeout: config.timeout,
        tls: config.tls.then(|| TlsOptions {
            verify: config.verify_tls,
            ca_file: config.ca_file.clone(),
            ca_path: config.ca_path.clone(),
        }),
    };

    let driver = S3Driver {
        shared: Rc::new(S3Shared {
            config,
            client: RefCell::new(HttpClient::new(transport)),
            signing: RefCell::new(SigningKeyCache::default()),
        }),
    };

    Storage::new(Box::new(driver), root, options)
}

pub(crate) struct S3Shared {
    pub(crate) config: S3Config,
    client: RefCell<HttpClient>,
    signing: RefCell<SigningKeyCache>,
}

impl S3Shared {
    /// URI for an object path, honoring the addressing style.
    pub(crate) fn uri(&self, path: &str) -> String {
        let encoded = transport::query::uri_encode(path, true);

        match self.config.uri_style {
            UriStyle::Host => encoded,
            UriStyle::Path => format!("/{}{encoded}", self.config.bucket),
        }
    }

    /// Executes one signed request.
    pub(crate) fn request(
        &self,
        verb: &str,
        uri: &str,
        query: HttpQuery,
        mut headers: HttpHeader,
        body: Option<Vec<u8>>,
    ) -> Result<HttpResponse> {
        let payload_hash = match &body {
            Some(body) => hex::encode(<sha2::Sha256 as sha2::Digest>::digest(body)),
            None => auth::EMPTY_PAYLOAD_SHA256.to_string(),
        };

        if let Some(body) = &body {
            let digest = checksums::digest(DigestAlgorithm::Md5, body);
            headers.put("content-md5", base64::engine::general_purpose::STANDARD.encode(digest));
            headers.put("content-length", body.len().to_string());
        }

        auth::sign(
            &self.config,
            &mut self.signing.borrow_mut(),
            verb,
            uri,
            &query,
            &auth::datetime_now(),
            &mut headers,
            &payload_hash,
        )?;

        let request = HttpRequest {
            verb: verb.to_string(),
            uri: uri.to_string(),
            query,
            headers,
            body,
        };

        self.client.borrow_mut().request(&request)
    }

    /// Executes a request and enforces a 2xx response; a 404 becomes
    /// `Ok(None)` when `allow_missing`.
    pub(crate) fn request_checked(
        &self,
        verb: &str,
        uri: &str,
        query: HttpQuery,
        headers: HttpHeader,
        body: Option<Vec<u8>>,
        allow_missing: bool,
    ) -> Result<Option<HttpResponse>> {
        let mut response = self.request(verb, uri, query.clone(), headers.clone(), body)?;

        if response.code() == 404 && allow_missing {
            response.read_body()?;
            return Ok(None);
        }

        if !response.success() {
            return Err(request_error(verb, uri, &query, &headers, &mut response));
        }

        Ok(Some(response))
    }

    /// Executes a request where missing is not an acceptable outcome.
    pub(crate) fn request_success(
        &self,
        verb: &str,
        uri: &str,
        query: HttpQuery,
        headers: HttpHeader,
        body: Option<Vec<u8>>,
    ) -> Result<HttpResponse> {
        self.request_checked(verb, uri, query, headers, body, false)?
            .ok_or_else(|| Error::assert("response missing without allow_missing"))
    }
}

/// Builds the error for a failed request: verb, URI, redacted headers, and
/// whatever the server said.
pub(crate) fn request_error(
    verb: &str,
    uri: &str,
    query: &HttpQuery,
    headers: &HttpHeader,
    response: &mut HttpResponse,
) -> Error {
    let body = response.read_body().unwrap_or_default();
    let body = String::from_utf8_lossy(&body);

    let target = if query.is_empty() {
        uri.to_string()
    } else {
        format!("{uri}?{}", query.render())
    };

    Error::protocol(format!(
        "S3 request failed: {verb} {target} [{} {}]\n*** request headers ***\n{headers}\n*** response ***\n{body}",
        response.code(),
        response.reason(),
    ))
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

struct S3Driver {
    shared: Rc<S3Shared>,
}

impl S3Driver {
    /// One page of `list-type=2` results.
    fn list_page(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
        continuation: Option<&str>,
    ) -> Result<XmlDocument> {
        let mut query = HttpQuery::new();
        query.put("list-type", "2");

        if !prefix.is_empty() {
            query.put("prefix", prefix);
        }

        if let Some(delimiter) = delimiter {
            query.put("delimiter", delimiter);
        }

        if let Some(token) = continuation {
            query.put("continuation-token", token);
        }

        let uri = self.shared.uri("/");
        let mut response = self
            .shared
            .request_success("GET", &uri, query, HttpHeader::new(), None)?;

        XmlDocument::from_bytes(&response.read_body()?)
    }

    fn prefix_for(path: &str) -> String {
        let mut prefix = path.trim_start_matches('/').to_string();

        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }

        prefix
    }

    /// Deletes up to [`DELETE_BATCH_MAX`] keys in one request, aggregating
    /// any per-object errors the 200 response may still carry.
    fn delete_batch(&self, keys: &[String]) -> Result<()> {
        let mut body = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Delete><Quiet>true</Quiet>",
        );

        for key in keys {
            body.push_str(&format!("<Object><Key>{}</Key></Object>", xml_escape(key)));
        }

        body.push_str("</Delete>");

        let mut query = HttpQuery::new();
        query.put("delete", "");

        let uri = self.shared.uri("/");
        let mut response = self
            .shared
            .request_success("POST", &uri, query, HttpHeader::new(), Some(body.into_bytes()))?;

        let document = XmlDocument::from_bytes(&response.read_body()?)?;
        let errors: Vec<String> = document
            .root()
            .children("Error")
            .iter()
            .map(|error| {
                let key = error
                    .child("Key", false)
                    .ok()
                    .flatten()
                    .map_or_else(String::new, |node| node.text().to_string());
                let message = error
                    .child("Message", false)
                    .ok()
                    .flatten()
                    .map_or_else(String::new, |node| node.text().to_string());

                format!("'{key}': {message}")
            })
            .collect();

        if !errors.is_empty() {
            return Err(Error::new(
                ErrorKind::FileRemove,
                format!("unable to remove files: {}", errors.join(", ")),
            ));
        }

        Ok(())
    }
}

impl StorageDriver for S3Driver {
    fn kind(&self) -> &'static str {
        "s3"
    }

    fn features(&self) -> DriverFeatures {
        DriverFeatures {
            paths: false,
            path_sync: false,
            move_native: false,
            links: false,
        }
    }

    fn exists(&self, path: &str) -> Result<bool> {
        let uri = self.shared.uri(path);
        let response = self.shared.request_checked(
            "HEAD",
            &uri,
            HttpQuery::new(),
            HttpHeader::new(),
            None,
            true,
        )?;

        Ok(response.is_some())
    }

    fn info(&self, path: &str, ignore_missing: bool) -> Result<Option<StorageInfo>> {
        let uri = self.shared.uri(path);
        let response = self.shared.request_checked(
            "HEAD",
            &uri,
            HttpQuery::new(),
            HttpHeader::new(),
            None,
            true,
        )?;

        let Some(response) = response else {
            if ignore_missing {
                return Ok(None);
            }

            return Err(Error::new(
                ErrorKind::FileMissing,
                format!("unable to get info for missing file '{path}'"),
            ));
        };

        let size = response
            .headers()
            .get("content-length")
            .and_then(|value| value.parse().ok())
            .unwrap_or(0);

        let mtime = response
            .headers()
            .get("last-modified")
            .and_then(|value| OffsetDateTime::parse(value, &Rfc2822).ok())
            .map_or(0, OffsetDateTime::unix_timestamp);

        let mut info = StorageInfo::file(path, size);
        info.mtime = mtime;
        Ok(Some(info))
    }

    fn info_list(
        &self,
        path: &str,
        _error_on_missing: bool,
        callback: &mut dyn FnMut(StorageInfo) -> Result<()>,
    ) -> Result<bool> {
        let prefix = Self::prefix_for(path);
        let mut continuation: Option<String> = None;

        loop {
            let page = self.list_page(&prefix, Some("/"), continuation.as_deref())?;
            let root = page.root();

            // Subpaths come back as common prefixes
            for common in root.children("CommonPrefixes") {
                if let Some(node) = common.child("Prefix", true)? {
                    let name = node
                        .text()
                        .strip_prefix(prefix.as_str())
                        .unwrap_or(node.text())
                        .trim_end_matches('/')
                        .to_string();

                    callback(StorageInfo::path(name))?;
                }
            }

            for contents in root.children("Contents") {
                let Some(key) = contents.child("Key", true)? else {
                    continue;
                };

                let name = key
                    .text()
                    .strip_prefix(prefix.as_str())
                    .unwrap_or(key.text())
                    .to_string();

                let size = contents
                    .child("Size", false)?
                    .and_then(|node| node.text().parse().ok())
                    .unwrap_or(0);

                callback(StorageInfo::file(name, size))?;
            }

            continuation = root
                .child("NextContinuationToken", false)?
                .map(|node| node.text().to_string());

            if continuation.is_none() {
                return Ok(true);
            }
        }
    }

    fn move_file(&self, _source: &str, _destination: &str) -> Result<bool> {
        Ok(false)
    }

    fn new_read(&self, params: ReadParams) -> Result<IoRead> {
        let buffer_size = params.buffer_size;

        Ok(IoRead::with_buffer_size(
            Box::new(S3Read::new(Rc::clone(&self.shared), params)),
            buffer_size,
        ))
    }

    fn new_write(&self, params: WriteParams) -> Result<IoWrite> {
        let buffer_size = params.buffer_size;

        Ok(IoWrite::with_buffer_size(
            Box::new(S3Write::new(Rc::clone(&self.shared), params)),
            buffer_size,
        ))
    }

    fn path_create(
        &self,
        _path: &str,
        _error_on_exists: bool,
        _no_parent_create: bool,
        _mode: u32,
    ) -> Result<()> {
        // Paths do not exist on the object store
        Ok(())
    }

    fn path_remove(&self, path: &str, _error_on_missing: bool, recurse: bool) -> Result<()> {
        if !recurse {
            // Nothing to remove: paths are virtual
            return Ok(());
        }

        let prefix = Self::prefix_for(path);
        let mut continuation: Option<String> = None;

        loop {
            // Full recursion: no delimiter, every key under the prefix
            let page = self.list_page(&prefix, None, continuation.as_deref())?;
            let root = page.root();

            let mut keys = Vec::new();

            for contents in root.children("Contents") {
                if let Some(key) = contents.child("Key", true)? {
                    keys.push(key.text().to_string());
                }
            }

            for batch in keys.chunks(DELETE_BATCH_MAX) {
                if !batch.is_empty() {
                    self.delete_batch(batch)?;
                }
            }

            continuation = root
                .child("NextContinuationToken", false)?
                .map(|node| node.text().to_string());

            if continuation.is_none() {
                return Ok(());
            }
        }
    }

    fn path_sync(&self, _path: &str) -> Result<()> {
        Ok(())
    }

    fn remove(&self, path: &str, error_on_missing: bool) -> Result<()> {
        if error_on_missing && !self.exists(path)? {
            return Err(Error::new(
                ErrorKind::FileRemove,
                format!("unable to remove missing file '{path}'"),
            ));
        }

        let uri = self.shared.uri(path);
        let response = self.shared.request_checked(
            "DELETE",
            &uri,
            HttpQuery::new(),
            HttpHeader::new(),
            None,
            false,
        )?;

        if let Some(mut response) = response {
            response.read_body()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
