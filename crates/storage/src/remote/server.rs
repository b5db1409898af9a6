//! Serving side: mounts a local storage for a remote peer.
//!
//! Each arriving command runs inside a temporary memory context so whatever
//! scratch state a command accumulates is released when it finishes, error
//! or not.

use std::io::{Read, Write};

use protocol::{CommandHandler, PeerIo, ProtocolServer};
use serde_json::{json, Value};
use types::{Buffer, Error, Result};

use crate::options::{
    ListOptions, PathCreateOptions, PathRemoveOptions, ReadOptions, RemoveOptions, WriteOptions,
};
use crate::storage::Storage;

/// Serves a local [`Storage`] to one peer over a read/write pair.
pub struct RemoteServer {
    storage: Storage,
}

impl RemoteServer {
    /// Creates a server mounting `storage`.
    #[must_use]
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Serves until the peer disconnects or sends `exit`.
    pub fn run(
        &mut self,
        reader: Box<dyn Read + Send>,
        writer: Box<dyn Write + Send>,
    ) -> Result<()> {
        let mut server = ProtocolServer::new(reader, writer);
        let mut handler = RemoteHandler {
            storage: &self.storage,
        };

        server.run(&mut handler)
    }
}

struct RemoteHandler<'a> {
    storage: &'a Storage,
}

fn param<'a>(params: &'a [Value], index: usize) -> Result<&'a Value> {
    params
        .get(index)
        .ok_or_else(|| Error::protocol(format!("missing parameter {index}")))
}

fn param_str<'a>(params: &'a [Value], index: usize) -> Result<&'a str> {
    param(params, index)?
        .as_str()
        .ok_or_else(|| Error::protocol(format!("parameter {index} must be a string")))
}

fn param_bool(params: &[Value], index: usize) -> Result<bool> {
    param(params, index)?
        .as_bool()
        .ok_or_else(|| Error::protocol(format!("parameter {index} must be a boolean")))
}

fn write_options(value: &Value) -> WriteOptions {
    let mut options = WriteOptions::new();

    if let Some(mode) = value.get("mode_file").and_then(Value::as_u64) {
        options = options.mode_file(mode as u32);
    }

    if let Some(mode) = value.get("mode_path").and_then(Value::as_u64) {
        options = options.mode_path(mode as u32);
    }

    options
        .create_path(value.get("create_path").and_then(Value::as_bool).unwrap_or(true))
        .sync_file(value.get("sync_file").and_then(Value::as_bool).unwrap_or(true))
        .sync_path(value.get("sync_path").and_then(Value::as_bool).unwrap_or(true))
        .atomic(value.get("atomic").and_then(Value::as_bool).unwrap_or(true))
}

impl RemoteHandler<'_> {
    fn dispatch(&self, command: &str, params: &[Value], peer: &mut PeerIo<'_>) -> Result<Value> {
        match command {
            "exists" => Ok(json!(self.storage.exists(param_str(params, 0)?)?)),
            "info" => {
                let info = self.storage.info(
                    param_str(params, 0)?,
                    ReadOptions::new().ignore_missing(param_bool(params, 1)?),
                )?;

                Ok(info.map_or(Value::Null, |info| info.to_json()))
            }
            "info-list" => {
                let mut entries = Vec::new();

                let found = self.storage.info_list(
                    param_str(params, 0)?,
                    ListOptions::new().error_on_missing(param_bool(params, 1)?),
                    &mut |info| {
                        entries.push(info.to_json());
                        Ok(())
                    },
                )?;

                Ok(json!({ "found": found, "entries": entries }))
            }
            "move" => {
                self.storage
                    .move_file(param_str(params, 0)?, param_str(params, 1)?)?;
                Ok(Value::Null)
            }
            "path-create" => {
                let mut options = PathCreateOptions::new()
                    .error_on_exists(param_bool(params, 1)?)
                    .no_parent_create(param_bool(params, 2)?);

                if let Some(mode) = param(params, 3)?.as_u64() {
                    options = options.mode(mode as u32);
                }

                self.storage.path_create(param_str(params, 0)?, options)?;
                Ok(Value::Null)
            }
            "path-remove" => {
                self.storage.path_remove(
                    param_str(params, 0)?,
                    PathRemoveOptions::new()
                        .error_on_missing(param_bool(params, 1)?)
                        .recurse(param_bool(params, 2)?),
                )?;
                Ok(Value::Null)
            }
            "path-sync" => {
                self.storage.path_sync(param_str(params, 0)?)?;
                Ok(Value::Null)
            }
            "remove" => {
                self.storage.remove(
                    param_str(params, 0)?,
                    RemoveOptions::new().error_on_missing(param_bool(params, 1)?),
                )?;
                Ok(Value::Null)
            }
            "open-read" => self.serve_read(params, peer),
            "open-write" => self.serve_write(params, peer),
            _ => Err(Error::protocol(format!("invalid command '{command}'"))),
        }
    }

    /// Streams a file to the peer: found response, chunk blocks, completion.
    fn serve_read(&self, params: &[Value], peer: &mut PeerIo<'_>) -> Result<Value> {
        let mut read = self.storage.new_read(
            param_str(params, 0)?,
            ReadOptions::new().ignore_missing(param_bool(params, 1)?),
        )?;

        let found = read.open()?;
        peer.respond(json!(found))?;

        if !found {
            return Ok(Value::Null);
        }

        let mut chunk = Buffer::new(vault_io::DEFAULT_BUFFER_SIZE);

        while !read.eof() {
            chunk.clear_used();
            read.read(&mut chunk)?;

            if !chunk.empty() {
                peer.write_chunk(chunk.bytes())?;
            }
        }

        read.close()?;
        peer.end_chunks()?;
        peer.respond(Value::Null)?;

        Ok(Value::Null)
    }

    /// Receives a chunk stream into a local write handle: open response,
    /// chunk blocks from the peer, completion once the close committed.
    fn serve_write(&self, params: &[Value], peer: &mut PeerIo<'_>) -> Result<Value> {
        let options = write_options(param(params, 1)?);
        let mut write = self.storage.new_write(param_str(params, 0)?, options)?;

        write.open()?;
        peer.respond(Value::Null)?;

        // An abort marker surfaces as an error here, dropping the write
        // handle and its partial state
        while let Some(chunk) = peer.read_chunk()? {
            write.write(&Buffer::from_slice(&chunk))?;
        }

        write.close()?;
        peer.respond(Value::Null)?;

        Ok(Value::Null)
    }
}

impl CommandHandler for RemoteHandler<'_> {
    fn handle(&mut self, command: &str, params: &[Value], peer: &mut PeerIo<'_>) -> Result<Value> {
        // Per-command scratch lifetime
        arena::with_temp_context(|| self.dispatch(command, params, peer))
    }
}
