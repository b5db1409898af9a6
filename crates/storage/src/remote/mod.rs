//! Remote storage driver.
//!
//! Forwards every storage operation to a peer process over the framed RPC
//! pair. The peer mounts a local driver and serves the
//! [`server`](crate::remote::server) loop; this side packs operations into
//! `{"cmd", "param"}` frames and streams file bodies through the chunk
//! sub-protocol. Filters are not forwarded: compression and encryption
//! compose in the caller's filter group as usual, so only transformed bytes
//! cross the wire when the caller wants that.

use std::cell::RefCell;
use std::rc::Rc;

use protocol::ProtocolClient;
use serde_json::{json, Value};
use types::{Error, Result};
use vault_io::{IoRead, IoWrite};

use crate::info::StorageInfo;
use crate::options::StorageOptions;
use crate::storage::{DriverFeatures, ReadParams, Storage, StorageDriver, WriteParams};

mod read;
pub mod server;
mod write;

use read::RemoteRead;
use write::RemoteWrite;

/// Creates a [`Storage`] forwarding operations to the peer behind `client`.
///
/// The peer must mount a storage whose root covers the same `root`.
pub fn storage(
    client: ProtocolClient,
    root: impl Into<String>,
    options: StorageOptions,
) -> Result<Storage> {
    let driver = RemoteDriver {
        client: Rc::new(RefCell::new(client)),
    };

    Storage::new(Box::new(driver), root, options)
}

pub(crate) type SharedClient = Rc<RefCell<ProtocolClient>>;

struct RemoteDriver {
    client: SharedClient,
}

fn expect_bool(value: &Value) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| Error::protocol(format!("expected boolean from peer but got '{value}'")))
}

impl StorageDriver for RemoteDriver {
    fn kind(&self) -> &'static str {
        "remote"
    }

    fn features(&self) -> DriverFeatures {
        // The peer serves a real filesystem; mirror its capabilities
        DriverFeatures {
            paths: true,
            path_sync: true,
            move_native: true,
            links: true,
        }
    }

    fn exists(&self, path: &str) -> Result<bool> {
        let output = self.client.borrow_mut().call("exists", vec![json!(path)])?;
        expect_bool(&output)
    }

    fn info(&self, path: &str, ignore_missing: bool) -> Result<Option<StorageInfo>> {
        let output = self
            .client
            .borrow_mut()
            .call("info", vec![json!(path), json!(ignore_missing)])?;

        if output.is_null() {
            return Ok(None);
        }

        StorageInfo::from_json(&output).map(Some)
    }

    fn info_list(
        &self,
        path: &str,
        error_on_missing: bool,
        callback: &mut dyn FnMut(StorageInfo) -> Result<()>,
    ) -> Result<bool> {
        let output = self
            .client
            .borrow_mut()
            .call("info-list", vec![json!(path), json!(error_on_missing)])?;

        let found = output
            .get("found")
            .and_then(Value::as_bool)
            .ok_or_else(|| Error::protocol("info-list response is missing 'found'"))?;

        if let Some(entries) = output.get("entries").and_then(Value::as_array) {
            for entry in entries {
                callback(StorageInfo::from_json(entry)?)?;
            }
        }

        Ok(found)
    }

    fn move_file(&self, source: &str, destination: &str) -> Result<bool> {
        self.client
            .borrow_mut()
            .call("move", vec![json!(source), json!(destination)])?;

        Ok(true)
    }

    fn new_read(&self, params: ReadParams) -> Result<IoRead> {
        let buffer_size = params.buffer_size;

        Ok(IoRead::with_buffer_size(
            Box::new(RemoteRead::new(Rc::clone(&self.client), params)),
            buffer_size,
        ))
    }

    fn new_write(&self, params: WriteParams) -> Result<IoWrite> {
        let buffer_size = params.buffer_size;

        Ok(IoWrite::with_buffer_size(
            Box::new(RemoteWrite::new(Rc::clone(&self.client), params)),
            buffer_size,
        ))
    }

    fn path_create(
        &self,
        path: &str,
        error_on_exists: bool,
        no_parent_create: bool,
        mode: u32,
    ) -> Result<()> {
        self.client.borrow_mut().call(
            "path-create",
            vec![
                json!(path),
                json!(error_on_exists),
                json!(no_parent_create),
                json!(mode),
            ],
        )?;

        Ok(())
    }

    fn path_remove(&self, path: &str, error_on_missing: bool, recurse: bool) -> Result<()> {
        self.client.borrow_mut().call(
            "path-remove",
            vec![json!(path), json!(error_on_missing), json!(recurse)],
        )?;

        Ok(())
    }

    fn path_sync(&self, path: &str) -> Result<()> {
        self.client.borrow_mut().call("path-sync", vec![json!(path)])?;
        Ok(())
    }

    fn remove(&self, path: &str, error_on_missing: bool) -> Result<()> {
        self.client
            .borrow_mut()
            .call("remove", vec![json!(path), json!(error_on_missing)])?;

        Ok(())
    }
}
